// src/models/user.rs

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::ParseEnumError;

/// Class labels like "7", "7-A", "11B".
static CLASS_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[1-9]|1[0-2])(?:[-/ ]?[A-Za-zÇĞİÖŞÜçğıöşü])?$").expect("valid regex"));

/// School level of a student. Questions target one of these or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    /// Middle school.
    Ortaokul,
    /// High school.
    Lise,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Ortaokul => "ortaokul",
            UserType::Lise => "lise",
        }
    }
}

impl TryFrom<String> for UserType {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "ortaokul" => Ok(UserType::Ortaokul),
            "lise" => Ok(UserType::Lise),
            _ => Err(ParseEnumError::new("user_type", value)),
        }
    }
}

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    pub name: String,

    /// Unique, stored lowercase.
    pub email: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    pub birth_date: Option<NaiveDate>,

    #[sqlx(try_from = "String")]
    pub user_type: UserType,

    pub school_id: Option<i64>,

    pub class_label: Option<String>,

    pub gender: Option<String>,

    /// Running total of `points_earned` over the user's answers. Never negative.
    pub points: i64,

    pub is_admin: bool,

    pub created_at: DateTime<Utc>,

    pub last_login_at: Option<DateTime<Utc>>,
}

/// Insert payload for the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub birth_date: Option<NaiveDate>,
    pub user_type: UserType,
    pub school_id: Option<i64>,
    pub class_label: Option<String>,
    pub gender: Option<String>,
    pub is_admin: bool,
}

/// Partial profile update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 2, max = 100))]
    pub name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub user_type: Option<UserType>,
    pub school_id: Option<i64>,
    #[validate(custom(function = validate_class_label))]
    pub class_label: Option<String>,
    #[validate(length(max = 20))]
    pub gender: Option<String>,
}

impl UpdateProfileRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.birth_date.is_none()
            && self.user_type.is_none()
            && self.school_id.is_none()
            && self.class_label.is_none()
            && self.gender.is_none()
    }
}

/// DTO for creating a new user (Registration).
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(
        min = 2,
        max = 100,
        message = "Name length must be between 2 and 100 characters."
    ))]
    pub name: String,
    #[validate(email(message = "A valid email address is required."))]
    pub email: String,
    #[validate(length(
        min = 6,
        max = 128,
        message = "Password length must be between 6 and 128 characters."
    ))]
    pub password: String,
    pub birth_date: Option<NaiveDate>,
    pub user_type: UserType,
    pub school_id: Option<i64>,
    #[validate(custom(function = validate_class_label))]
    pub class_label: Option<String>,
    #[validate(length(max = 20))]
    pub gender: Option<String>,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// Answer statistics for a profile page.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserStats {
    pub total_answers: i64,
    pub correct_answers: i64,
    /// Percentage of correct answers, one decimal. 0 when nothing was answered.
    pub accuracy: f64,
    pub points: i64,
}

impl UserStats {
    pub fn new(total_answers: i64, correct_answers: i64, points: i64) -> Self {
        let accuracy = if total_answers > 0 {
            ((correct_answers as f64 / total_answers as f64) * 1000.0).round() / 10.0
        } else {
            0.0
        };
        Self {
            total_answers,
            correct_answers,
            accuracy,
            points,
        }
    }
}

/// Query parameters for the admin user listing.
#[derive(Debug, Deserialize)]
pub struct UserListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn validate_class_label(label: &str) -> Result<(), validator::ValidationError> {
    if !CLASS_LABEL.is_match(label.trim()) {
        return Err(validator::ValidationError::new("invalid_class_label"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_labels() {
        assert!(validate_class_label("7").is_ok());
        assert!(validate_class_label("11-B").is_ok());
        assert!(validate_class_label("9Ç").is_ok());
        assert!(validate_class_label("13").is_err());
        assert!(validate_class_label("seventh").is_err());
    }

    #[test]
    fn accuracy_is_rounded_and_guarded() {
        assert_eq!(UserStats::new(3, 2, 10).accuracy, 66.7);
        assert_eq!(UserStats::new(0, 0, 0).accuracy, 0.0);
    }

    #[test]
    fn user_type_parses_stored_labels() {
        assert_eq!(UserType::try_from("lise".to_string()).unwrap(), UserType::Lise);
        assert!(UserType::try_from("both".to_string()).is_err());
    }
}
