// src/handlers/leaderboard.rs

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{config::LEADERBOARD_SIZE, error::AppError, models::points::LeaderboardEntry};

#[derive(Debug, Deserialize)]
pub struct LeaderboardParams {
    pub category_id: Option<i64>,
}

/// Top users by cumulative points.
///
/// With `category_id` the ranking comes from that category's ledger rows;
/// without it, from the users' overall totals.
pub async fn get_leaderboard(
    State(pool): State<SqlitePool>,
    Query(params): Query<LeaderboardParams>,
) -> Result<impl IntoResponse, AppError> {
    let entries = match params.category_id {
        Some(category_id) => {
            sqlx::query_as::<_, LeaderboardEntry>(
                r#"
                SELECT u.username, up.total_points, up.average_score
                FROM user_points up
                JOIN users u ON u.id = up.user_id
                WHERE up.category_id = ?
                ORDER BY up.total_points DESC
                LIMIT ?
                "#,
            )
            .bind(category_id)
            .bind(LEADERBOARD_SIZE)
            .fetch_all(&pool)
            .await
        }
        None => {
            sqlx::query_as::<_, LeaderboardEntry>(
                r#"
                SELECT username, total_points, average_score
                FROM users
                ORDER BY total_points DESC
                LIMIT ?
                "#,
            )
            .bind(LEADERBOARD_SIZE)
            .fetch_all(&pool)
            .await
        }
    }
    .map_err(|e| {
        tracing::error!("Failed to fetch leaderboard: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(entries))
}
