// src/handlers/schools.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    error::AppError,
    models::{ranking::LeaderboardParams, school::SchoolFilter},
    services::{SharedStore, rankings::Rankings},
};

/// Lists schools, optionally narrowed by city, district and type.
pub async fn list_schools(
    State(store): State<SharedStore>,
    Query(filter): Query<SchoolFilter>,
) -> Result<impl IntoResponse, AppError> {
    let schools = store.list_schools(&filter).await?;
    Ok(Json(json!({ "success": true, "schools": schools })))
}

pub async fn get_school(
    State(store): State<SharedStore>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let school = store
        .get_school(id)
        .await?
        .ok_or(AppError::NotFound("School not found".to_string()))?;
    Ok(Json(json!({ "success": true, "school": school })))
}

pub async fn school_rankings(
    State(rankings): State<Rankings>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let rankings = rankings.school_rankings(id).await?;
    Ok(Json(json!({ "success": true, "rankings": rankings })))
}

/// Top schools of a scope (`nation`, `city` or `district`).
pub async fn leaderboard(
    State(rankings): State<Rankings>,
    Query(params): Query<LeaderboardParams>,
) -> Result<impl IntoResponse, AppError> {
    let entries = rankings.school_leaderboard(&params).await?;
    Ok(Json(json!({ "success": true, "leaderboard": entries })))
}
