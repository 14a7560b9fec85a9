// src/handlers/profile.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::{
        points::CategoryPoints,
        user::{MeResponse, User},
    },
    utils::jwt::Claims,
};

/// Get current user's profile: totals, averages and the per-category ledger.
pub async fn get_me(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, password, role, total_points, average_score, created_at \
         FROM users WHERE id = ?",
    )
    .bind(claims.sub)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    let categories = sqlx::query_as::<_, CategoryPoints>(
        r#"
        SELECT c.id AS category_id, c.name AS category_name,
               up.total_points, up.average_score
        FROM user_points up
        JOIN categories c ON c.id = up.category_id
        WHERE up.user_id = ?
        ORDER BY up.total_points DESC
        "#,
    )
    .bind(claims.sub)
    .fetch_all(&pool)
    .await?;

    Ok(Json(MeResponse {
        id: user.id,
        username: user.username,
        role: user.role,
        total_points: user.total_points,
        average_score: user.average_score,
        created_at: user.created_at,
        categories,
    }))
}
