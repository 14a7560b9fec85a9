// src/handlers/assessment.rs

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
    grading::question_activation_error,
    models::assessment::{Assessment, CreateAssessmentRequest},
    utils::{html::clean_html, jwt::Claims},
};

const ASSESSMENT_COLUMNS: &str = "id, user_id, subcategory_id, name, description, is_active, \
     min_score, number_of_questions, allowed_attempts, time_limit, difficulty, \
     community_difficulty, average_score, finished_attempts, score_sum, attempts_count, \
     created_at, updated_at";

/// Fetches an assessment row or 404s.
pub(crate) async fn fetch_assessment<'e, E>(executor: E, id: i64) -> Result<Assessment, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query_as::<_, Assessment>(&format!(
        "SELECT {ASSESSMENT_COLUMNS} FROM assessments WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or(AppError::NotFound("Assessment not found".to_string()))
}

/// Creates a new assessment owned by the caller. Assessments start inactive;
/// activation requires enough valid active questions.
pub async fn create_assessment(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateAssessmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let subcategory_exists =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM subcategories WHERE id = ?")
            .bind(payload.subcategory_id)
            .fetch_one(&pool)
            .await?;
    if subcategory_exists == 0 {
        return Err(AppError::NotFound("Subcategory not found".to_string()));
    }

    let now = chrono::Utc::now();
    let assessment = sqlx::query_as::<_, Assessment>(&format!(
        r#"
        INSERT INTO assessments
            (user_id, subcategory_id, name, description, min_score, number_of_questions,
             allowed_attempts, time_limit, difficulty, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING {ASSESSMENT_COLUMNS}
        "#
    ))
    .bind(claims.sub)
    .bind(payload.subcategory_id)
    .bind(&payload.name)
    .bind(clean_html(payload.description.as_deref().unwrap_or("")))
    .bind(payload.min_score.unwrap_or(70))
    .bind(payload.number_of_questions.unwrap_or(10))
    .bind(payload.allowed_attempts.unwrap_or(2))
    .bind(payload.time_limit.unwrap_or(20))
    .bind(payload.difficulty.unwrap_or(5.0))
    .bind(now)
    .bind(now)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create assessment: {:?}", e);
        AppError::from(e)
    })?;

    Ok((StatusCode::CREATED, Json(assessment)))
}

/// Lists active assessments, newest first.
pub async fn list_assessments(
    State(pool): State<SqlitePool>,
) -> Result<impl IntoResponse, AppError> {
    let assessments = sqlx::query_as::<_, Assessment>(&format!(
        "SELECT {ASSESSMENT_COLUMNS} FROM assessments WHERE is_active = 1 ORDER BY id DESC"
    ))
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list assessments: {:?}", e);
        AppError::from(e)
    })?;

    Ok(Json(assessments))
}

/// Fetches one assessment with its derived statistics.
pub async fn get_assessment(
    State(pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let assessment = fetch_assessment(&pool, id).await?;
    Ok(Json(assessment))
}

/// Activates an assessment.
///
/// Only the owner may activate, and only while the assessment has at least
/// `number_of_questions` active questions that each still pass the
/// structural checks.
pub async fn activate_assessment(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let assessment = fetch_assessment(&pool, id).await?;
    if assessment.user_id != claims.sub {
        return Err(AppError::Forbidden(
            "Only the assessment owner can activate it".to_string(),
        ));
    }

    // One grouped pass over the active questions and their choice counts.
    let rows = sqlx::query_as::<_, (i64, bool, i64, i64)>(
        r#"
        SELECT q.id, q.is_multiple_choice,
               COUNT(c.id) AS total_choices,
               COALESCE(SUM(c.is_correct), 0) AS correct_choices
        FROM questions q
        LEFT JOIN choices c ON c.question_id = q.id
        WHERE q.assessment_id = ? AND q.is_active = 1
        GROUP BY q.id
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let valid_count = rows
        .iter()
        .filter(|(_, multi, total, correct)| {
            question_activation_error(*multi, *total, *correct).is_none()
        })
        .count() as i64;

    if valid_count < assessment.number_of_questions {
        return Err(AppError::validation(format!(
            "Assessment needs {} valid active questions to be activated, found {}",
            assessment.number_of_questions, valid_count
        )));
    }

    sqlx::query("UPDATE assessments SET is_active = 1, updated_at = ? WHERE id = ?")
        .bind(chrono::Utc::now())
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(Json(serde_json::json!({ "is_active": true })))
}

/// Deactivates an assessment. Owner only.
pub async fn deactivate_assessment(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let assessment = fetch_assessment(&pool, id).await?;
    if assessment.user_id != claims.sub {
        return Err(AppError::Forbidden(
            "Only the assessment owner can deactivate it".to_string(),
        ));
    }

    sqlx::query("UPDATE assessments SET is_active = 0, updated_at = ? WHERE id = ?")
        .bind(chrono::Utc::now())
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(Json(serde_json::json!({ "is_active": false })))
}
