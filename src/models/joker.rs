// src/models/joker.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JokerKind {
    /// Arms a second, half-value attempt at the same question.
    DoubleAnswer,
    /// Eliminates two incorrect options.
    FiftyPercent,
}

impl JokerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JokerKind::DoubleAnswer => "double_answer",
            JokerKind::FiftyPercent => "fifty_percent",
        }
    }
}

impl TryFrom<String> for JokerKind {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "double_answer" => Ok(JokerKind::DoubleAnswer),
            "fifty_percent" => Ok(JokerKind::FiftyPercent),
            _ => Err(ParseEnumError::new("joker_type", value)),
        }
    }
}

/// Represents the 'daily_joker_states' table.
/// One row per (user, category, day), created on first look.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DailyJokerState {
    pub id: i64,
    pub user_id: i64,
    pub category_id: i64,
    pub usage_date: NaiveDate,
    pub double_answer_used: i64,
    pub fifty_percent_used: i64,
}

impl DailyJokerState {
    pub fn used(&self, kind: JokerKind) -> i64 {
        match kind {
            JokerKind::DoubleAnswer => self.double_answer_used,
            JokerKind::FiftyPercent => self.fifty_percent_used,
        }
    }
}

/// Represents the 'joker_usage_logs' audit table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JokerUsage {
    pub id: i64,
    pub user_id: i64,
    pub category_id: i64,
    pub question_id: i64,
    #[sqlx(try_from = "String")]
    pub joker_type: JokerKind,
    pub used_at: DateTime<Utc>,
}

/// A joker activation for the store to apply atomically:
/// check the daily counter, bump it, append the audit entry.
#[derive(Debug, Clone)]
pub struct JokerActivation {
    pub user_id: i64,
    pub category_id: i64,
    pub question_id: i64,
    pub kind: JokerKind,
    pub usage_date: NaiveDate,
    pub daily_limit: i64,
    pub used_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct JokerQuota {
    pub limit: i64,
    pub used: i64,
    pub remaining: i64,
}

impl JokerQuota {
    pub fn new(limit: i64, used: i64) -> Self {
        Self {
            limit,
            used,
            remaining: (limit - used).max(0),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct JokerStatus {
    pub double_answer: JokerQuota,
    pub fifty_percent: JokerQuota,
}

/// Request body for both joker activations.
#[derive(Debug, Clone, Deserialize)]
pub struct UseJokerRequest {
    pub category_id: i64,
    pub question_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FiftyPercentOutcome {
    /// The two options the client should disable.
    pub eliminated_answer_ids: Vec<i64>,
    pub status: JokerStatus,
}
