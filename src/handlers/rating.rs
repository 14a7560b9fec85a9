// src/handlers/rating.rs
//
// Community difficulty ratings. One rating per (user, assessment), allowed
// only after a finished attempt; every change recomputes the assessment's
// community difficulty as the mean of the remaining rows.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    error::AppError,
    models::assessment::{DifficultyRating, RateDifficultyRequest},
    utils::jwt::Claims,
};

async fn recompute_community_difficulty(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    assessment_id: i64,
) -> Result<(), AppError> {
    // AVG over zero rows yields NULL, which readers treat as "no ratings yet"
    // and fall back to the author's difficulty.
    sqlx::query(
        "UPDATE assessments SET community_difficulty = \
         (SELECT AVG(difficulty) FROM assessment_difficulty_ratings WHERE assessment_id = ?) \
         WHERE id = ?",
    )
    .bind(assessment_id)
    .bind(assessment_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn has_finished_attempt(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: i64,
    assessment_id: i64,
) -> Result<bool, AppError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM attempts WHERE user_id = ? AND assessment_id = ? AND is_finished = 1",
    )
    .bind(user_id)
    .bind(assessment_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(count > 0)
}

/// Submits a difficulty rating for an assessment the caller has completed.
pub async fn create_rating(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<i64>,
    Json(payload): Json<RateDifficultyRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let mut tx = pool.begin().await?;

    let exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM assessments WHERE id = ?")
        .bind(assessment_id)
        .fetch_one(&mut *tx)
        .await?;
    if exists == 0 {
        return Err(AppError::NotFound("Assessment not found".to_string()));
    }

    if !has_finished_attempt(&mut tx, claims.sub, assessment_id).await? {
        return Err(AppError::Forbidden(
            "You must complete an attempt before rating this assessment".to_string(),
        ));
    }

    let now = chrono::Utc::now();
    let rating = sqlx::query_as::<_, DifficultyRating>(
        r#"
        INSERT INTO assessment_difficulty_ratings
            (assessment_id, user_id, difficulty, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id, assessment_id, user_id, difficulty, created_at, updated_at
        "#,
    )
    .bind(assessment_id)
    .bind(claims.sub)
    .bind(payload.difficulty)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint") {
            AppError::Conflict("You have already rated this assessment".to_string())
        } else {
            tracing::error!("Failed to create rating: {:?}", e);
            AppError::from(e)
        }
    })?;

    recompute_community_difficulty(&mut tx, assessment_id).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(rating)))
}

/// Updates the caller's rating. Only the difficulty value can change.
pub async fn update_rating(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<i64>,
    Json(payload): Json<RateDifficultyRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let mut tx = pool.begin().await?;

    let rating = sqlx::query_as::<_, DifficultyRating>(
        r#"
        UPDATE assessment_difficulty_ratings
        SET difficulty = ?, updated_at = ?
        WHERE assessment_id = ? AND user_id = ?
        RETURNING id, assessment_id, user_id, difficulty, created_at, updated_at
        "#,
    )
    .bind(payload.difficulty)
    .bind(chrono::Utc::now())
    .bind(assessment_id)
    .bind(claims.sub)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Rating not found".to_string()))?;

    recompute_community_difficulty(&mut tx, assessment_id).await?;
    tx.commit().await?;

    Ok(Json(rating))
}

/// Deletes the caller's rating.
pub async fn delete_rating(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let deleted = sqlx::query(
        "DELETE FROM assessment_difficulty_ratings WHERE assessment_id = ? AND user_id = ?",
    )
    .bind(assessment_id)
    .bind(claims.sub)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if deleted == 0 {
        return Err(AppError::NotFound("Rating not found".to_string()));
    }

    recompute_community_difficulty(&mut tx, assessment_id).await?;
    tx.commit().await?;

    Ok(Json(serde_json::json!({ "deleted": true })))
}
