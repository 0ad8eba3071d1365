// src/handlers/jokers.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    error::AppError,
    models::joker::UseJokerRequest,
    services::ledger::JokerLedger,
    utils::jwt::AuthUser,
};

/// Today's joker quotas for a category.
pub async fn joker_status(
    State(ledger): State<JokerLedger>,
    auth: AuthUser,
    Path(category_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let status = ledger.check_joker_status(auth.id, category_id).await?;
    Ok(Json(json!({ "success": true, "jokers": status })))
}

/// Returns two incorrect options for the client to disable.
pub async fn use_fifty_percent(
    State(ledger): State<JokerLedger>,
    auth: AuthUser,
    Json(payload): Json<UseJokerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = ledger
        .use_fifty_percent(auth.id, payload.category_id, payload.question_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "eliminated_answer_ids": outcome.eliminated_answer_ids,
        "jokers": outcome.status,
    })))
}

pub async fn use_double_answer(
    State(ledger): State<JokerLedger>,
    auth: AuthUser,
    Json(payload): Json<UseJokerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let status = ledger
        .use_double_answer(auth.id, payload.category_id, payload.question_id)
        .await?;
    Ok(Json(json!({ "success": true, "jokers": status })))
}

pub async fn double_answer_status(
    State(ledger): State<JokerLedger>,
    auth: AuthUser,
    Path(question_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let active = ledger.is_double_answer_active(auth.id, question_id).await?;
    Ok(Json(json!({ "success": true, "active": active })))
}
