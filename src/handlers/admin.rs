// src/handlers/admin.rs
//
// Admin-only catalog management. Assessments hang off a subcategory and all
// points ledgers are keyed by the subcategory's parent category, so these two
// endpoints are the only catalog surface the platform needs.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    models::category::{Category, CreateCategoryRequest, CreateSubcategoryRequest, Subcategory},
    utils::html::clean_html,
};

/// Creates a new category.
/// Admin only.
pub async fn create_category(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let category = sqlx::query_as::<_, Category>(
        r#"
        INSERT INTO categories (name, description)
        VALUES (?, ?)
        RETURNING id, name, description
        "#,
    )
    .bind(&payload.name)
    .bind(clean_html(payload.description.as_deref().unwrap_or("")))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint") {
            AppError::Conflict(format!("Category '{}' already exists", payload.name))
        } else {
            tracing::error!("Failed to create category: {:?}", e);
            AppError::from(e)
        }
    })?;

    Ok((StatusCode::CREATED, Json(category)))
}

/// Creates a new subcategory under an existing category.
/// Admin only.
pub async fn create_subcategory(
    State(pool): State<SqlitePool>,
    Json(payload): Json<CreateSubcategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    sqlx::query_as::<_, Category>("SELECT id, name, description FROM categories WHERE id = ?")
        .bind(payload.category_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Category not found".to_string()))?;

    let subcategory = sqlx::query_as::<_, Subcategory>(
        r#"
        INSERT INTO subcategories (category_id, name, description)
        VALUES (?, ?, ?)
        RETURNING id, category_id, name, description
        "#,
    )
    .bind(payload.category_id)
    .bind(&payload.name)
    .bind(clean_html(payload.description.as_deref().unwrap_or("")))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint") {
            AppError::Conflict(format!("Subcategory '{}' already exists", payload.name))
        } else {
            tracing::error!("Failed to create subcategory: {:?}", e);
            AppError::from(e)
        }
    })?;

    Ok((StatusCode::CREATED, Json(subcategory)))
}
