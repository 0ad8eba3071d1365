// src/models/school.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use url::Url;
use validator::Validate;

/// Represents the 'schools' table in the database.
/// `total_points` and `total_students` are derived from the member users
/// and only ever written by a full recompute.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct School {
    pub id: i64,
    pub name: String,
    pub city: String,
    pub district: String,
    pub school_type: String,
    pub website: Option<String>,
    pub info_link: Option<String>,
    pub map_link: Option<String>,
    pub total_points: i64,
    pub total_students: i64,
    pub created_at: DateTime<Utc>,
}

/// DTO for creating or replacing a school.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SchoolRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub district: String,
    #[validate(length(min = 1, max = 50))]
    pub school_type: String,
    #[validate(length(max = 500), custom(function = validate_url_string))]
    pub website: Option<String>,
    #[validate(length(max = 500), custom(function = validate_url_string))]
    pub info_link: Option<String>,
    #[validate(length(max = 500), custom(function = validate_url_string))]
    pub map_link: Option<String>,
}

/// Query parameters for listing schools.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchoolFilter {
    pub city: Option<String>,
    pub district: Option<String>,
    pub school_type: Option<String>,
}

fn validate_url_string(url: &str) -> Result<(), validator::ValidationError> {
    if Url::parse(url).is_err() {
        return Err(validator::ValidationError::new("invalid_url"));
    }
    Ok(())
}
