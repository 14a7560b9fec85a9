// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub assessment_id: i64,
    pub description: String,

    /// Only active questions enter the sampling pool. Activation is gated by
    /// the structural checks in `grading::question_activation_error`.
    pub is_active: bool,

    /// Multiple-choice questions accept several selected choices; single
    /// choice questions have exactly one correct answer.
    pub is_multiple_choice: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'choices' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Choice {
    pub id: i64,
    pub question_id: i64,
    pub description: String,
    pub is_correct: bool,
}

/// A delivered question as seen by the attempting user: correctness flags
/// are stripped and choices come in the sheet's shuffled order.
#[derive(Debug, Serialize)]
pub struct DeliveredQuestion {
    pub id: i64,
    pub description: String,
    pub is_multiple_choice: bool,
    pub choices: Vec<DeliveredChoice>,
}

#[derive(Debug, Serialize)]
pub struct DeliveredChoice {
    pub id: i64,
    pub description: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub description: String,
    #[serde(default)]
    pub is_multiple_choice: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateChoiceRequest {
    #[validate(length(min = 1, max = 1000))]
    pub description: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// DTO for bulk question activation. All-or-nothing: if any question fails
/// the structural checks, nothing is activated and every failure is reported.
#[derive(Debug, Deserialize)]
pub struct BulkActivateRequest {
    pub question_ids: Vec<i64>,
}
