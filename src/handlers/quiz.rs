// src/handlers/quiz.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    error::AppError,
    models::{quiz::StartQuizRequest, user_answer::SubmitAnswerRequest},
    services::{
        ledger::JokerLedger,
        scoring::{ScoringEngine, SubmissionContext},
        session::SessionBuilder,
    },
    utils::jwt::AuthUser,
};

/// Starts a quiz session in a category.
///
/// * Refuses once the daily quota of the category is used up.
/// * Prefers questions the user has not seen in the last week.
/// * Options are shuffled and their correctness hidden.
pub async fn start_quiz(
    State(sessions): State<SessionBuilder>,
    auth: AuthUser,
    Json(payload): Json<StartQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = sessions
        .create_session(auth.id, payload.category_id, payload.count)
        .await?;
    Ok(Json(json!({
        "success": true,
        "questions": session.questions,
        "daily_limit_info": session.daily_limit_info,
    })))
}

/// Submits one answer of a running quiz.
/// Answers slower than the question time limit score zero.
pub async fn submit_answer(
    State(scoring): State<ScoringEngine>,
    auth: AuthUser,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = scoring
        .submit_answer(
            auth.id,
            payload.question_id,
            payload.answer_id,
            payload.response_time,
            SubmissionContext::Quiz,
        )
        .await?;
    Ok(Json(json!({ "success": true, "result": result })))
}

pub async fn daily_limit(
    State(ledger): State<JokerLedger>,
    auth: AuthUser,
    Path(category_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let info = ledger.check_daily_limit(auth.id, category_id).await?;
    Ok(Json(json!({ "success": true, "daily_limit_info": info })))
}
