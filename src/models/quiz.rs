// src/models/quiz.rs

use serde::{Deserialize, Serialize};

use crate::models::question::{Difficulty, PublicAnswer};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyLimitInfo {
    pub daily_limit: i64,
    pub answered_today: i64,
    pub remaining: i64,
    pub limit_reached: bool,
}

impl DailyLimitInfo {
    pub fn new(daily_limit: i64, answered_today: i64) -> Self {
        let remaining = (daily_limit - answered_today).max(0);
        Self {
            daily_limit,
            answered_today,
            remaining,
            limit_reached: remaining == 0,
        }
    }
}

/// A question as handed to a player: options shuffled, correctness hidden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: i64,
    pub question_text: String,
    pub category_id: i64,
    pub difficulty: Difficulty,
    pub points: i64,
    /// Seconds allowed for this question.
    pub time_limit: u32,
    pub answers: Vec<PublicAnswer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizSession {
    pub questions: Vec<QuizQuestion>,
    /// Snapshot taken before the session was built.
    pub daily_limit_info: DailyLimitInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartQuizRequest {
    pub category_id: i64,
    pub count: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_never_goes_negative() {
        let info = DailyLimitInfo::new(30, 34);
        assert_eq!(info.remaining, 0);
        assert!(info.limit_reached);
    }

    #[test]
    fn fresh_day_has_full_quota() {
        let info = DailyLimitInfo::new(30, 0);
        assert_eq!(info.remaining, 30);
        assert!(!info.limit_reached);
    }
}
