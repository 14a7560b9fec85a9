// src/handlers/attempt.rs
//
// The attempt lifecycle: create (quota-guarded), retrieve with one-time
// question delivery, and finalize (grade, points, aggregates). Every state
// change runs inside a single transaction so readers never observe a
// half-graded attempt.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};

use crate::{
    config::FINALIZE_GRACE_SECONDS,
    error::AppError,
    grading::{compute_points, compute_score, is_answer_correct, points_delta},
    models::{
        assessment::Assessment,
        attempt::{Attempt, AttemptResponse, CreateAttemptRequest, FinalizeRequest},
        question::{DeliveredChoice, DeliveredQuestion},
    },
    sampler::sample_exam_sheet,
    utils::jwt::Claims,
};

const ATTEMPT_COLUMNS: &str = "id, assessment_id, user_id, attempt_number, score, approved, \
     questions_provided, is_finished, start_time, end_time, points_obtained";

/// One row of the flattened exam sheet join.
#[derive(sqlx::FromRow)]
struct SheetRow {
    question_id: i64,
    description: String,
    is_multiple_choice: bool,
    choice_id: i64,
    choice_description: String,
}

/// Choice row used to build the correctness sets at finalize.
#[derive(sqlx::FromRow)]
struct ChoiceKey {
    id: i64,
    question_id: i64,
    is_correct: bool,
}

async fn fetch_attempt<'e, E>(executor: E, id: i64) -> Result<Attempt, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query_as::<_, Attempt>(&format!(
        "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or(AppError::NotFound("Attempt not found".to_string()))
}

/// Creates a new attempt on an active assessment.
///
/// The quota check and the insert share one transaction, and the
/// `(assessment_id, user_id, attempt_number)` UNIQUE constraint turns a
/// concurrent double-create at the quota boundary into a 409 instead of an
/// over-quota attempt.
pub async fn create_attempt(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub;

    let mut tx = pool.begin().await?;

    let assessment = sqlx::query_as::<_, Assessment>(
        "SELECT id, user_id, subcategory_id, name, description, is_active, min_score, \
         number_of_questions, allowed_attempts, time_limit, difficulty, community_difficulty, \
         average_score, finished_attempts, score_sum, attempts_count, created_at, updated_at \
         FROM assessments WHERE id = ? AND is_active = 1",
    )
    .bind(payload.assessment_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound(
        "The specified assessment does not exist or is not active".to_string(),
    ))?;

    if assessment.user_id == user_id {
        return Err(AppError::Forbidden(
            "You cannot attempt your own assessment".to_string(),
        ));
    }

    let previous_attempts =
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM attempts WHERE assessment_id = ? AND user_id = ?",
        )
        .bind(assessment.id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

    if previous_attempts >= assessment.allowed_attempts {
        return Err(AppError::Forbidden(
            "You don't have any attempts left for this assessment".to_string(),
        ));
    }

    let attempt = sqlx::query_as::<_, Attempt>(&format!(
        r#"
        INSERT INTO attempts (assessment_id, user_id, attempt_number, start_time)
        VALUES (?, ?, ?, ?)
        RETURNING {ATTEMPT_COLUMNS}
        "#
    ))
    .bind(assessment.id)
    .bind(user_id)
    .bind(previous_attempts + 1)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if e.to_string().contains("UNIQUE constraint") {
            AppError::Conflict("An attempt was created concurrently, try again".to_string())
        } else {
            tracing::error!("Failed to create attempt: {:?}", e);
            AppError::from(e)
        }
    })?;

    sqlx::query("UPDATE assessments SET attempts_count = attempts_count + 1 WHERE id = ?")
        .bind(assessment.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(AttemptResponse {
            attempt,
            time_limit: assessment.time_limit,
            questions: None,
        }),
    ))
}

/// Retrieves an attempt.
///
/// The attempt owner's first read triggers sampling: the exam sheet is drawn
/// from the active question pool, persisted, and `questions_provided` flips
/// to true. Every later read returns the stored sheet, never a fresh sample.
/// The assessment owner may also read the attempt but only sees results.
pub async fn get_attempt(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut tx = pool.begin().await?;

    let mut attempt = fetch_attempt(&mut *tx, id).await?;

    let assessment_owner = sqlx::query_scalar::<_, i64>(
        "SELECT user_id FROM assessments WHERE id = ?",
    )
    .bind(attempt.assessment_id)
    .fetch_one(&mut *tx)
    .await?;

    let is_attempt_owner = attempt.user_id == claims.sub;
    if !is_attempt_owner && assessment_owner != claims.sub {
        return Err(AppError::Forbidden(
            "You are not allowed to view this attempt".to_string(),
        ));
    }

    let time_limit = sqlx::query_scalar::<_, i64>(
        "SELECT time_limit FROM assessments WHERE id = ?",
    )
    .bind(attempt.assessment_id)
    .fetch_one(&mut *tx)
    .await?;

    if is_attempt_owner && !attempt.questions_provided && !attempt.is_finished {
        deliver_exam_sheet(&mut tx, &attempt).await?;
        attempt.questions_provided = true;
    }

    let questions = if is_attempt_owner && attempt.questions_provided {
        Some(load_exam_sheet(&mut tx, attempt.id).await?)
    } else {
        None
    };

    tx.commit().await?;

    Ok(Json(AttemptResponse {
        attempt,
        time_limit,
        questions,
    }))
}

/// Samples the exam sheet and persists it as the attempt's snapshot.
async fn deliver_exam_sheet(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    attempt: &Attempt,
) -> Result<(), AppError> {
    let target = sqlx::query_scalar::<_, i64>(
        "SELECT number_of_questions FROM assessments WHERE id = ?",
    )
    .bind(attempt.assessment_id)
    .fetch_one(&mut **tx)
    .await?;

    let choice_rows = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT c.question_id, c.id
        FROM choices c
        JOIN questions q ON q.id = c.question_id
        WHERE q.assessment_id = ? AND q.is_active = 1
        ORDER BY c.question_id, c.id
        "#,
    )
    .bind(attempt.assessment_id)
    .fetch_all(&mut **tx)
    .await?;

    let mut pool_map: HashMap<i64, Vec<i64>> = HashMap::new();
    for (question_id, choice_id) in choice_rows {
        pool_map.entry(question_id).or_default().push(choice_id);
    }
    let pool: Vec<(i64, Vec<i64>)> = pool_map.into_iter().collect();

    // The RNG must not be held across an await point.
    let sheet = {
        let mut rng = rand::thread_rng();
        sample_exam_sheet(&mut rng, pool, target as usize)
    };

    tracing::debug!(
        attempt_id = attempt.id,
        questions = sheet.len(),
        "delivering exam sheet"
    );

    for (position, sampled) in sheet.iter().enumerate() {
        let sheet_row_id = sqlx::query(
            "INSERT INTO attempt_questions (attempt_id, question_id, position) VALUES (?, ?, ?)",
        )
        .bind(attempt.id)
        .bind(sampled.question_id)
        .bind(position as i64)
        .execute(&mut **tx)
        .await?
        .last_insert_rowid();

        for (choice_position, choice_id) in sampled.choice_ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO attempt_question_choices (attempt_question_id, choice_id, position) \
                 VALUES (?, ?, ?)",
            )
            .bind(sheet_row_id)
            .bind(choice_id)
            .bind(choice_position as i64)
            .execute(&mut **tx)
            .await?;
        }
    }

    let updated = sqlx::query(
        "UPDATE attempts SET questions_provided = 1 WHERE id = ? AND questions_provided = 0",
    )
    .bind(attempt.id)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(AppError::Conflict(
            "Exam sheet was already delivered".to_string(),
        ));
    }

    Ok(())
}

/// Loads the persisted exam sheet in its stored question and choice order.
async fn load_exam_sheet(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    attempt_id: i64,
) -> Result<Vec<DeliveredQuestion>, AppError> {
    let rows = sqlx::query_as::<_, SheetRow>(
        r#"
        SELECT q.id AS question_id, q.description, q.is_multiple_choice,
               c.id AS choice_id, c.description AS choice_description
        FROM attempt_questions aq
        JOIN questions q ON q.id = aq.question_id
        JOIN attempt_question_choices aqc ON aqc.attempt_question_id = aq.id
        JOIN choices c ON c.id = aqc.choice_id
        WHERE aq.attempt_id = ?
        ORDER BY aq.position, aqc.position
        "#,
    )
    .bind(attempt_id)
    .fetch_all(&mut **tx)
    .await?;

    let mut questions: Vec<DeliveredQuestion> = Vec::new();
    for row in rows {
        match questions.last_mut() {
            Some(last) if last.id == row.question_id => last.choices.push(DeliveredChoice {
                id: row.choice_id,
                description: row.choice_description,
            }),
            _ => questions.push(DeliveredQuestion {
                id: row.question_id,
                description: row.description,
                is_multiple_choice: row.is_multiple_choice,
                choices: vec![DeliveredChoice {
                    id: row.choice_id,
                    description: row.choice_description,
                }],
            }),
        }
    }

    Ok(questions)
}

/// Finalizes an attempt: grades the submitted answers against the delivered
/// sheet, persists the graded rows, computes score and points, credits the
/// best-attempt delta to the ledgers and refreshes the aggregates. One-shot;
/// an already-finished attempt is rejected with 409.
pub async fn finalize_attempt(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<FinalizeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    let attempt = fetch_attempt(&mut *tx, id).await?;

    if attempt.user_id != claims.sub {
        return Err(AppError::Forbidden(
            "Only the attempt owner can finalize it".to_string(),
        ));
    }

    if attempt.is_finished {
        return Err(AppError::Conflict(
            "Attempt has already been finalized".to_string(),
        ));
    }

    let assessment = sqlx::query_as::<_, Assessment>(
        "SELECT id, user_id, subcategory_id, name, description, is_active, min_score, \
         number_of_questions, allowed_attempts, time_limit, difficulty, community_difficulty, \
         average_score, finished_attempts, score_sum, attempts_count, created_at, updated_at \
         FROM assessments WHERE id = ?",
    )
    .bind(attempt.assessment_id)
    .fetch_one(&mut *tx)
    .await?;

    let deadline = attempt.start_time
        + Duration::minutes(assessment.time_limit)
        + Duration::seconds(FINALIZE_GRACE_SECONDS);
    if now > deadline {
        return Err(AppError::DeadlineExceeded(
            "The attempt exceeded the allowed time limit".to_string(),
        ));
    }

    // Correctness sets for every question on the delivered sheet.
    let choice_rows = sqlx::query_as::<_, ChoiceKey>(
        r#"
        SELECT c.id, c.question_id, c.is_correct
        FROM choices c
        JOIN attempt_questions aq ON aq.question_id = c.question_id
        WHERE aq.attempt_id = ?
        "#,
    )
    .bind(attempt.id)
    .fetch_all(&mut *tx)
    .await?;

    let mut known_choices: HashMap<i64, HashSet<i64>> = HashMap::new();
    let mut correct_choices: HashMap<i64, HashSet<i64>> = HashMap::new();
    for row in choice_rows {
        known_choices.entry(row.question_id).or_default().insert(row.id);
        let correct = correct_choices.entry(row.question_id).or_default();
        if row.is_correct {
            correct.insert(row.id);
        }
    }

    // Validate the whole payload before persisting anything: finalize is
    // all-or-nothing for a malformed submission.
    let mut seen_questions = HashSet::new();
    let mut graded: Vec<(i64, Vec<i64>, bool)> = Vec::new();
    for answer in &payload.answers {
        if !seen_questions.insert(answer.question_id) {
            return Err(AppError::BadRequest(format!(
                "Duplicate answer for question {}",
                answer.question_id
            )));
        }

        let known = known_choices.get(&answer.question_id).ok_or_else(|| {
            AppError::BadRequest(format!(
                "Question {} is not part of this attempt",
                answer.question_id
            ))
        })?;

        let selected: HashSet<i64> = answer.selected_choice_ids.iter().copied().collect();
        if let Some(unknown) = selected.iter().find(|c| !known.contains(c)) {
            return Err(AppError::BadRequest(format!(
                "Choice {} does not belong to question {}",
                unknown, answer.question_id
            )));
        }

        let correct = correct_choices
            .get(&answer.question_id)
            .cloned()
            .unwrap_or_default();
        let is_correct = is_answer_correct(&correct, &selected);
        graded.push((
            answer.question_id,
            answer.selected_choice_ids.clone(),
            is_correct,
        ));
    }

    // Persist the graded rows as one batch, then their selected choices.
    for (question_id, selected_choice_ids, is_correct) in &graded {
        let question_attempt_id = sqlx::query(
            "INSERT INTO question_attempts (attempt_id, question_id, is_correct) VALUES (?, ?, ?)",
        )
        .bind(attempt.id)
        .bind(question_id)
        .bind(is_correct)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for choice_id in selected_choice_ids {
            sqlx::query(
                "INSERT INTO question_attempt_choices (question_attempt_id, choice_id) VALUES (?, ?)",
            )
            .bind(question_attempt_id)
            .bind(choice_id)
            .execute(&mut *tx)
            .await?;
        }
    }

    let correct_count = graded.iter().filter(|(_, _, correct)| *correct).count();
    let score = compute_score(correct_count, assessment.number_of_questions);
    let approved = score >= assessment.min_score as f64;
    let points = compute_points(score, assessment.difficulty, assessment.community_difficulty);

    // Terminal transition, guarded against a concurrent finalize.
    let updated = sqlx::query(
        "UPDATE attempts SET score = ?, approved = ?, end_time = ?, points_obtained = ?, \
         is_finished = 1 WHERE id = ? AND is_finished = 0",
    )
    .bind(score)
    .bind(approved)
    .bind(now)
    .bind(points)
    .bind(attempt.id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(AppError::Conflict(
            "Attempt has already been finalized".to_string(),
        ));
    }

    // Best-attempt ledger: credit only the improvement over the prior best.
    let best_prior = sqlx::query_scalar::<_, Option<f64>>(
        "SELECT MAX(points_obtained) FROM attempts \
         WHERE user_id = ? AND assessment_id = ? AND is_finished = 1 AND id != ?",
    )
    .bind(attempt.user_id)
    .bind(assessment.id)
    .bind(attempt.id)
    .fetch_one(&mut *tx)
    .await?;

    let delta = points_delta(points, best_prior);

    let category_id =
        sqlx::query_scalar::<_, i64>("SELECT category_id FROM subcategories WHERE id = ?")
            .bind(assessment.subcategory_id)
            .fetch_one(&mut *tx)
            .await?;

    update_user_aggregates(&mut tx, attempt.user_id, category_id, delta).await?;

    // Assessment average, maintained incrementally from the running sums.
    sqlx::query(
        "UPDATE assessments SET finished_attempts = finished_attempts + 1, \
         score_sum = score_sum + ? WHERE id = ?",
    )
    .bind(score)
    .bind(assessment.id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE assessments SET average_score = score_sum / finished_attempts WHERE id = ?",
    )
    .bind(assessment.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        attempt_id = attempt.id,
        score,
        approved,
        points,
        credited = delta,
        "attempt finalized"
    );

    Ok(Json(serde_json::json!({
        "detail": "Attempt finalized successfully",
        "score": score,
        "approved": approved,
        "points_obtained": points,
        "points_credited": delta,
        "correct_count": correct_count,
        "total_questions": assessment.number_of_questions,
    })))
}

/// Refreshes the user's totals and averages plus the per-category ledger row.
///
/// The user average is the mean of the best score per distinct assessment
/// (best performance, not attempt volume); the category ledger average is the
/// same mean restricted to assessments in that category.
async fn update_user_aggregates(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: i64,
    category_id: i64,
    delta: f64,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE users SET
            total_points = total_points + ?,
            average_score = COALESCE((
                SELECT AVG(best_score) FROM (
                    SELECT MAX(score) AS best_score
                    FROM attempts
                    WHERE user_id = ? AND is_finished = 1
                    GROUP BY assessment_id
                )
            ), 0)
        WHERE id = ?
        "#,
    )
    .bind(delta)
    .bind(user_id)
    .bind(user_id)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO user_points (user_id, category_id) VALUES (?, ?) \
         ON CONFLICT (user_id, category_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(category_id)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE user_points SET
            total_points = total_points + ?,
            average_score = COALESCE((
                SELECT AVG(best_score) FROM (
                    SELECT MAX(a.score) AS best_score
                    FROM attempts a
                    JOIN assessments s ON s.id = a.assessment_id
                    JOIN subcategories sc ON sc.id = s.subcategory_id
                    WHERE a.user_id = ? AND a.is_finished = 1 AND sc.category_id = ?
                    GROUP BY a.assessment_id
                )
            ), 0)
        WHERE user_id = ? AND category_id = ?
        "#,
    )
    .bind(delta)
    .bind(user_id)
    .bind(category_id)
    .bind(user_id)
    .bind(category_id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
