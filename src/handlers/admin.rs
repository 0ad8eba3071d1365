// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        category::CategoryRequest,
        question::QuestionRequest,
        school::SchoolRequest,
        user::UserListParams,
    },
    services::{
        SharedStore, accounts::Accounts, aggregates::AggregatePropagator,
        question_bank::QuestionBank,
    },
    utils::{html::clean_html, jwt::AuthUser},
};

/// Lists users, newest first.
/// Admin only.
pub async fn list_users(
    State(accounts): State<Accounts>,
    Query(params): Query<UserListParams>,
) -> Result<impl IntoResponse, AppError> {
    let (users, total) = accounts.list_users(params.limit, params.offset).await?;
    Ok(Json(json!({ "success": true, "users": users, "total": total })))
}

/// Deletes a user and their whole history.
/// Admin only. Admins cannot delete themselves.
pub async fn delete_user(
    State(accounts): State<Accounts>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    accounts.delete_user(auth.id, id).await?;
    Ok(Json(json!({ "success": true, "message": "User deleted" })))
}

/// Rebuilds a user's points from their recorded answers.
/// Admin only.
pub async fn resync_user(
    State(accounts): State<Accounts>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let points = accounts.resync_points(id).await?;
    Ok(Json(json!({ "success": true, "points": points })))
}

fn sanitize_school(mut payload: SchoolRequest) -> Result<SchoolRequest, AppError> {
    payload.validate()?;
    payload.name = clean_html(&payload.name);
    payload.city = payload.city.trim().to_string();
    payload.district = payload.district.trim().to_string();
    payload.school_type = payload.school_type.trim().to_string();
    if payload.name.is_empty() || payload.city.is_empty() || payload.district.is_empty() {
        return Err(AppError::BadRequest(
            "School name, city and district are required".to_string(),
        ));
    }
    Ok(payload)
}

/// Admin only.
pub async fn create_school(
    State(store): State<SharedStore>,
    Json(payload): Json<SchoolRequest>,
) -> Result<impl IntoResponse, AppError> {
    let school = store.create_school(sanitize_school(payload)?).await?;
    tracing::info!("School {} created", school.id);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "school": school })),
    ))
}

/// Admin only.
pub async fn update_school(
    State(store): State<SharedStore>,
    Path(id): Path<i64>,
    Json(payload): Json<SchoolRequest>,
) -> Result<impl IntoResponse, AppError> {
    let school = store
        .update_school(id, sanitize_school(payload)?)
        .await?
        .ok_or(AppError::NotFound("School not found".to_string()))?;
    Ok(Json(json!({ "success": true, "school": school })))
}

/// Recomputes a school's totals right away.
/// Admin only.
pub async fn refresh_school(
    State(aggregates): State<AggregatePropagator>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let school = aggregates.refresh_school(id).await?;
    Ok(Json(json!({ "success": true, "school": school })))
}

/// Admin only.
pub async fn create_category(
    State(bank): State<QuestionBank>,
    Json(payload): Json<CategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let category = bank.create_category(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "category": category })),
    ))
}

/// Admin only.
pub async fn update_category(
    State(bank): State<QuestionBank>,
    Path(id): Path<i64>,
    Json(payload): Json<CategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let category = bank.update_category(id, payload).await?;
    Ok(Json(json!({ "success": true, "category": category })))
}

/// Deletes a category with its questions, their answers and joker history.
/// Admin only.
pub async fn delete_category(
    State(bank): State<QuestionBank>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    bank.delete_category(id).await?;
    Ok(Json(json!({ "success": true, "message": "Category deleted" })))
}

/// Creates a question with its options.
/// Admin only.
pub async fn create_question(
    State(bank): State<QuestionBank>,
    Json(payload): Json<QuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let question = bank.create_question(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "question": question })),
    ))
}

/// Replaces a question and all of its options.
/// Admin only.
pub async fn update_question(
    State(bank): State<QuestionBank>,
    Path(id): Path<i64>,
    Json(payload): Json<QuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let question = bank.update_question(id, payload).await?;
    Ok(Json(json!({ "success": true, "question": question })))
}

/// Admin only.
pub async fn delete_question(
    State(bank): State<QuestionBank>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    bank.delete_question(id).await?;
    Ok(Json(json!({ "success": true, "message": "Question deleted" })))
}
