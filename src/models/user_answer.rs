// src/models/user_answer.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'user_answers' table: one scoring event.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserAnswer {
    pub id: i64,
    pub user_id: i64,
    pub question_id: i64,
    /// `None` when the submission timed out before an option counted.
    pub answer_id: Option<i64>,
    pub is_correct: bool,
    pub points_earned: i64,
    /// Seconds the player took, if the client reported it.
    pub response_time: Option<f64>,
    pub answered_at: DateTime<Utc>,
    /// Set once a double-answer retry rewrote this row.
    pub retried: bool,
}

impl UserAnswer {
    /// Whether a double-answer retry may still rewrite the user's history
    /// for a question: nothing answered yet, or one first attempt not yet retried.
    pub fn retry_available(prior: &[UserAnswer]) -> bool {
        match prior {
            [] => true,
            [only] => !only.retried,
            _ => false,
        }
    }
}

/// A scoring event to persist together with its effect on `users.points`.
#[derive(Debug, Clone)]
pub enum AnswerWrite {
    /// Appends a row and adds `points_earned` (when positive) to the user.
    Insert {
        user_id: i64,
        question_id: i64,
        answer_id: Option<i64>,
        is_correct: bool,
        points_earned: i64,
        response_time: Option<f64>,
        answered_at: DateTime<Utc>,
    },
    /// Double-answer retry: rewrites the existing row, marks it retried and
    /// applies the difference between the new and the previous points.
    /// Fails with `Conflict` if the row was already retried.
    Overwrite {
        row_id: i64,
        user_id: i64,
        answer_id: i64,
        is_correct: bool,
        points_earned: i64,
        response_time: Option<f64>,
    },
}

impl AnswerWrite {
    pub fn user_id(&self) -> i64 {
        match self {
            AnswerWrite::Insert { user_id, .. } | AnswerWrite::Overwrite { user_id, .. } => {
                *user_id
            }
        }
    }
}

/// What the store did for an `AnswerWrite`.
#[derive(Debug, Clone)]
pub struct RecordedAnswer {
    pub answer: UserAnswer,
    /// Change applied to `users.points`. Negative only for a worse retry.
    pub points_delta: i64,
}

/// Answer submission DTO.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitAnswerRequest {
    pub question_id: i64,
    pub answer_id: i64,
    pub response_time: Option<f64>,
}

/// Same as `SubmitAnswerRequest` with the question taken from the path.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerOnlyRequest {
    pub answer_id: i64,
    pub response_time: Option<f64>,
}

/// Outcome of judging one submission.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EvaluationResult {
    pub is_correct: bool,
    pub points_earned: i64,
    pub current_points: i64,
    /// Withheld (`None`) when a wrong first attempt may still be retried.
    pub correct_answer_id: Option<i64>,
    pub response_time: Option<f64>,
    pub second_chance: bool,
    pub is_second_attempt: bool,
    pub timed_out: bool,
    pub message: String,
}
