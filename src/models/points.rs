// src/models/points.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'user_points' table: the per-(user, category) ledger.
/// Only personal-best attempts add to `total_points`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserPoints {
    pub id: i64,
    pub user_id: i64,
    pub category_id: i64,
    pub total_points: f64,
    /// Mean of the user's best score per assessment within this category.
    pub average_score: f64,
}

/// A ledger row joined with its category name, for profile responses.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CategoryPoints {
    pub category_id: i64,
    pub category_name: String,
    pub total_points: f64,
    pub average_score: f64,
}

/// One leaderboard row, joined from `users` and (per category) `user_points`.
#[derive(Debug, Serialize, FromRow)]
pub struct LeaderboardEntry {
    pub username: String,
    pub total_points: f64,
    pub average_score: f64,
}
