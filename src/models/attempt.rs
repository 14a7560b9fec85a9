// src/models/attempt.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::question::DeliveredQuestion;

/// Represents the 'attempts' table in the database.
///
/// Lifecycle: created (pending) -> delivered (`questions_provided`) ->
/// finalized (`is_finished`, terminal). Finalize is one-shot; a second call
/// is rejected with 409.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub assessment_id: i64,
    pub user_id: i64,

    /// 1-based per (assessment, user); backed by a UNIQUE constraint so
    /// concurrent creates cannot slip past the quota.
    pub attempt_number: i64,

    pub score: f64,
    pub approved: bool,

    /// Flips false -> true exactly once, on the owner's first read.
    pub questions_provided: bool,

    pub is_finished: bool,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub points_obtained: f64,
}

#[derive(Debug, Deserialize)]
pub struct CreateAttemptRequest {
    pub assessment_id: i64,
}

/// Attempt with its delivered exam sheet. `questions` is `None` when the
/// viewer is the assessment owner (results only) or the sheet was never
/// delivered.
#[derive(Debug, Serialize)]
pub struct AttemptResponse {
    #[serde(flatten)]
    pub attempt: Attempt,
    /// Minutes, echoed from the assessment so clients can render a timer.
    pub time_limit: i64,
    pub questions: Option<Vec<DeliveredQuestion>>,
}

/// One submitted answer within a finalize payload.
#[derive(Debug, Deserialize)]
pub struct AnswerSubmission {
    pub question_id: i64,
    pub selected_choice_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub answers: Vec<AnswerSubmission>,
}
