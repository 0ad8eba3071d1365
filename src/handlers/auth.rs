// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::{
    error::AppError,
    models::user::{LoginRequest, RegisterRequest},
    services::accounts::Accounts,
};

/// Registers a new student account.
///
/// The password is hashed with Argon2 before it is stored.
/// Returns 201 Created and the user (without the hash).
pub async fn register(
    State(accounts): State<Accounts>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = accounts.register(payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "user": user })),
    ))
}

/// Authenticates a user and returns a JWT token.
pub async fn login(
    State(accounts): State<Accounts>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (token, user) = accounts.login(payload).await?;

    Ok(Json(json!({
        "success": true,
        "token": token,
        "user": user,
    })))
}
