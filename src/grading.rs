// src/grading.rs
//
// Pure scoring rules for the attempt lifecycle. Everything here operates on
// plain values so the rules can be unit tested without a database.

use std::collections::HashSet;

/// Checks whether a question is structurally eligible for activation.
///
/// * Multiple choice: at least 3 choices, at least 2 of them correct.
/// * Single choice: at least 2 choices, exactly 1 of them correct.
///
/// Returns the rejection reason, or `None` when the question is valid.
pub fn question_activation_error(
    is_multiple_choice: bool,
    total_choices: i64,
    correct_choices: i64,
) -> Option<String> {
    if is_multiple_choice {
        if total_choices < 3 {
            return Some(format!(
                "A multiple-choice question needs at least 3 choices, found {}",
                total_choices
            ));
        }
        if correct_choices < 2 {
            return Some(format!(
                "A multiple-choice question needs at least 2 correct choices, found {}",
                correct_choices
            ));
        }
    } else {
        if total_choices < 2 {
            return Some(format!(
                "A single-choice question needs at least 2 choices, found {}",
                total_choices
            ));
        }
        if correct_choices != 1 {
            return Some(format!(
                "A single-choice question needs exactly 1 correct choice, found {}",
                correct_choices
            ));
        }
    }
    None
}

/// An answer is correct only when the selected choice ids match the correct
/// set exactly. A superset or subset of the correct choices is wrong.
pub fn is_answer_correct(correct: &HashSet<i64>, selected: &HashSet<i64>) -> bool {
    correct == selected
}

/// Score over the assessment's configured question count, not over the number
/// of answers submitted, so under-submission lowers the score.
pub fn compute_score(correct_count: usize, number_of_questions: i64) -> f64 {
    if number_of_questions <= 0 {
        return 0.0;
    }
    (correct_count as f64 / number_of_questions as f64) * 100.0
}

/// Weighted points for a finished attempt. The community difficulty falls
/// back to the author's difficulty until the first rating lands, so with
/// score in [0, 100] and difficulties in [1, 10] the result stays in [0, 100].
pub fn compute_points(score: f64, difficulty: f64, community_difficulty: Option<f64>) -> f64 {
    score * (difficulty + community_difficulty.unwrap_or(difficulty)) / 20.0
}

/// How many points a finished attempt adds to the user's ledgers.
///
/// Only the best attempt per (user, assessment) counts: a new personal best
/// credits the difference over the prior best, anything else credits nothing.
pub fn points_delta(new_points: f64, best_prior_points: Option<f64>) -> f64 {
    match best_prior_points {
        Some(best) if new_points > best => new_points - best,
        Some(_) => 0.0,
        None => new_points,
    }
}
