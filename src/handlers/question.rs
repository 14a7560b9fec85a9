// src/handlers/question.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;
use validator::Validate;

use crate::{
    error::AppError,
    grading::question_activation_error,
    handlers::assessment::fetch_assessment,
    models::question::{
        BulkActivateRequest, Choice, CreateChoiceRequest, CreateQuestionRequest, Question,
    },
    utils::{html::clean_html, jwt::Claims},
};

/// Helper row for the grouped choice-count query used by activation.
#[derive(sqlx::FromRow)]
struct QuestionCounts {
    id: i64,
    is_multiple_choice: bool,
    total_choices: i64,
    correct_choices: i64,
}

async fn fetch_question(pool: &SqlitePool, id: i64) -> Result<Question, AppError> {
    sqlx::query_as::<_, Question>(
        "SELECT id, assessment_id, description, is_active, is_multiple_choice, created_at \
         FROM questions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Question not found".to_string()))
}

/// Adds a question to an assessment. Owner only; questions start inactive.
pub async fn create_question(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let assessment = fetch_assessment(&pool, assessment_id).await?;
    if assessment.user_id != claims.sub {
        return Err(AppError::Forbidden(
            "Only the assessment owner can add questions".to_string(),
        ));
    }

    let question = sqlx::query_as::<_, Question>(
        r#"
        INSERT INTO questions (assessment_id, description, is_multiple_choice, created_at)
        VALUES (?, ?, ?, ?)
        RETURNING id, assessment_id, description, is_active, is_multiple_choice, created_at
        "#,
    )
    .bind(assessment_id)
    .bind(clean_html(&payload.description))
    .bind(payload.is_multiple_choice)
    .bind(chrono::Utc::now())
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::from(e)
    })?;

    Ok((StatusCode::CREATED, Json(question)))
}

/// Adds a choice to a question. Owner only.
pub async fn create_choice(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(question_id): Path<i64>,
    Json(payload): Json<CreateChoiceRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let question = fetch_question(&pool, question_id).await?;
    let assessment = fetch_assessment(&pool, question.assessment_id).await?;
    if assessment.user_id != claims.sub {
        return Err(AppError::Forbidden(
            "Only the assessment owner can add choices".to_string(),
        ));
    }

    let choice = sqlx::query_as::<_, Choice>(
        r#"
        INSERT INTO choices (question_id, description, is_correct)
        VALUES (?, ?, ?)
        RETURNING id, question_id, description, is_correct
        "#,
    )
    .bind(question_id)
    .bind(clean_html(&payload.description))
    .bind(payload.is_correct)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create choice: {:?}", e);
        AppError::from(e)
    })?;

    Ok((StatusCode::CREATED, Json(choice)))
}

/// Activates a single question once it passes the structural checks
/// (choice count and correct-choice count for its mode).
pub async fn activate_question(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(question_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let question = fetch_question(&pool, question_id).await?;
    let assessment = fetch_assessment(&pool, question.assessment_id).await?;
    if assessment.user_id != claims.sub {
        return Err(AppError::Forbidden(
            "Only the assessment owner can activate questions".to_string(),
        ));
    }

    let (total, correct) = sqlx::query_as::<_, (i64, i64)>(
        "SELECT COUNT(*), COALESCE(SUM(is_correct), 0) FROM choices WHERE question_id = ?",
    )
    .bind(question_id)
    .fetch_one(&pool)
    .await?;

    if let Some(reason) = question_activation_error(question.is_multiple_choice, total, correct) {
        return Err(AppError::validation(reason));
    }

    sqlx::query("UPDATE questions SET is_active = 1 WHERE id = ?")
        .bind(question_id)
        .execute(&pool)
        .await?;

    Ok(Json(serde_json::json!({ "id": question_id, "is_active": true })))
}

/// Bulk-activates questions of one assessment.
///
/// Counts are gathered in a single grouped query rather than per-question
/// lookups. All-or-nothing: every failing question is reported in one
/// response and nothing is activated until the whole batch passes.
pub async fn bulk_activate_questions(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<i64>,
    Json(payload): Json<BulkActivateRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.question_ids.is_empty() {
        return Err(AppError::BadRequest("No question ids provided".to_string()));
    }

    let assessment = fetch_assessment(&pool, assessment_id).await?;
    if assessment.user_id != claims.sub {
        return Err(AppError::Forbidden(
            "Only the assessment owner can activate questions".to_string(),
        ));
    }

    let mut query_builder = QueryBuilder::<Sqlite>::new(
        "SELECT q.id, q.is_multiple_choice, \
         COUNT(c.id) AS total_choices, \
         COALESCE(SUM(c.is_correct), 0) AS correct_choices \
         FROM questions q \
         LEFT JOIN choices c ON c.question_id = q.id \
         WHERE q.assessment_id = ",
    );
    query_builder.push_bind(assessment_id);
    query_builder.push(" AND q.id IN (");
    let mut separated = query_builder.separated(",");
    for id in &payload.question_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") GROUP BY q.id");

    let counts: Vec<QuestionCounts> = query_builder.build_query_as().fetch_all(&pool).await?;

    let by_id: HashMap<i64, &QuestionCounts> = counts.iter().map(|c| (c.id, c)).collect();

    let mut errors = Vec::new();
    for id in &payload.question_ids {
        match by_id.get(id) {
            None => errors.push(serde_json::json!({
                "question_id": id,
                "error": "Question not found in this assessment",
            })),
            Some(c) => {
                if let Some(reason) = question_activation_error(
                    c.is_multiple_choice,
                    c.total_choices,
                    c.correct_choices,
                ) {
                    errors.push(serde_json::json!({
                        "question_id": id,
                        "error": reason,
                    }));
                }
            }
        }
    }

    if !errors.is_empty() {
        return Err(AppError::ValidationFailed(serde_json::Value::Array(errors)));
    }

    let mut update = QueryBuilder::<Sqlite>::new("UPDATE questions SET is_active = 1 WHERE id IN (");
    let mut separated = update.separated(",");
    for id in &payload.question_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
    update.build().execute(&pool).await?;

    Ok(Json(serde_json::json!({
        "activated": payload.question_ids.len(),
    })))
}
