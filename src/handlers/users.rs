// src/handlers/users.rs

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    error::AppError,
    models::{ranking::LeaderboardParams, user::UpdateProfileRequest},
    services::{accounts::Accounts, rankings::Rankings},
    utils::jwt::AuthUser,
};

/// Current user's profile.
pub async fn get_me(
    State(accounts): State<Accounts>,
    auth: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user = accounts.get_user(auth.id).await?;
    Ok(Json(json!({ "success": true, "user": user })))
}

/// Partial profile update. A school change moves the user between rosters.
pub async fn update_me(
    State(accounts): State<Accounts>,
    auth: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = accounts.update_profile(auth.id, payload).await?;
    Ok(Json(json!({ "success": true, "user": user })))
}

pub async fn my_stats(
    State(accounts): State<Accounts>,
    auth: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let stats = accounts.user_stats(auth.id).await?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}

pub async fn my_rankings(
    State(rankings): State<Rankings>,
    auth: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let rankings = rankings.user_rankings(auth.id).await?;
    Ok(Json(json!({ "success": true, "rankings": rankings })))
}

/// Top users of a scope (`nation`, `city`, `district` or `school`).
pub async fn leaderboard(
    State(rankings): State<Rankings>,
    Query(params): Query<LeaderboardParams>,
) -> Result<impl IntoResponse, AppError> {
    let entries = rankings.user_leaderboard(&params).await?;
    Ok(Json(json!({ "success": true, "leaderboard": entries })))
}
