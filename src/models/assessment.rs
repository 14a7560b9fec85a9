// src/models/assessment.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'assessments' table in the database.
///
/// `average_score` is maintained incrementally from `score_sum` and
/// `finished_attempts` inside the finalize transaction, so reads never
/// trigger a full rescan of the attempts table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Assessment {
    pub id: i64,
    pub user_id: i64,
    pub subcategory_id: i64,
    pub name: String,
    pub description: String,
    pub is_active: bool,

    /// Passing threshold, 60-90.
    pub min_score: i64,

    /// How many questions an exam sheet targets. The sheet holds
    /// `min(number_of_questions, active pool size)` questions but the score
    /// denominator is always this value.
    pub number_of_questions: i64,

    pub allowed_attempts: i64,

    /// Minutes from attempt creation until finalize is rejected.
    pub time_limit: i64,

    /// Author-set difficulty, 1.0-10.0.
    pub difficulty: f64,

    /// Mean of community ratings; `None` until the first rating lands, in
    /// which case `difficulty` is used wherever a value is needed.
    pub community_difficulty: Option<f64>,

    pub average_score: f64,
    #[serde(skip)]
    pub finished_attempts: i64,
    #[serde(skip)]
    pub score_sum: f64,
    pub attempts_count: i64,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating an assessment. The caller becomes the owner.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAssessmentRequest {
    pub subcategory_id: i64,

    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[validate(length(max = 5000))]
    pub description: Option<String>,

    #[validate(range(min = 60, max = 90))]
    pub min_score: Option<i64>,

    #[validate(range(min = 1, max = 50))]
    pub number_of_questions: Option<i64>,

    #[validate(range(min = 1, max = 10))]
    pub allowed_attempts: Option<i64>,

    /// Minutes.
    #[validate(range(min = 1, max = 120))]
    pub time_limit: Option<i64>,

    #[validate(range(min = 1.0, max = 10.0))]
    pub difficulty: Option<f64>,
}

/// DTO for submitting or editing a difficulty rating.
#[derive(Debug, Deserialize, Validate)]
pub struct RateDifficultyRequest {
    #[validate(range(min = 1.0, max = 10.0))]
    pub difficulty: f64,
}

/// A user-submitted difficulty rating row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DifficultyRating {
    pub id: i64,
    pub assessment_id: i64,
    pub user_id: i64,
    pub difficulty: f64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}
