// src/handlers/categories.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::{error::AppError, services::question_bank::QuestionBank};

pub async fn list_categories(
    State(bank): State<QuestionBank>,
) -> Result<impl IntoResponse, AppError> {
    let categories = bank.list_categories().await?;
    Ok(Json(json!({ "success": true, "categories": categories })))
}

pub async fn get_category(
    State(bank): State<QuestionBank>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let category = bank.get_category(id).await?;
    Ok(Json(json!({ "success": true, "category": category })))
}
