// src/handlers/questions.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    error::AppError,
    models::{
        question::{PublicAnswer, QuestionFilter},
        user_answer::AnswerOnlyRequest,
    },
    services::{
        question_bank::QuestionBank,
        scoring::{ScoringEngine, SubmissionContext},
    },
    utils::jwt::AuthUser,
};

/// Lists questions with `user_type`, `category_id` and `difficulty` filters.
/// A `user_type` filter also matches questions meant for both levels.
pub async fn list_questions(
    State(bank): State<QuestionBank>,
    Query(filter): Query<QuestionFilter>,
) -> Result<impl IntoResponse, AppError> {
    let (questions, total) = bank.list_questions(&filter).await?;
    Ok(Json(json!({
        "success": true,
        "questions": questions,
        "total": total,
    })))
}

/// One question with its options in stored order.
/// Correctness flags are only included for admins.
pub async fn get_question(
    State(bank): State<QuestionBank>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let detail = bank.get_question(id).await?;

    if auth.is_admin {
        return Ok(Json(json!({ "success": true, "question": detail })));
    }

    let answers: Vec<PublicAnswer> = detail.answers.iter().map(PublicAnswer::from).collect();
    Ok(Json(json!({
        "success": true,
        "question": {
            "id": detail.question.id,
            "question_text": detail.question.question_text,
            "user_type": detail.question.user_type,
            "category_id": detail.question.category_id,
            "difficulty": detail.question.difficulty,
            "points": detail.question.points,
            "created_at": detail.question.created_at,
            "answers": answers,
        },
    })))
}

/// Answers a single question outside a timed quiz.
pub async fn answer_question(
    State(scoring): State<ScoringEngine>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<AnswerOnlyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = scoring
        .submit_answer(
            auth.id,
            id,
            payload.answer_id,
            payload.response_time,
            SubmissionContext::Standalone,
        )
        .await?;
    Ok(Json(json!({ "success": true, "result": result })))
}
