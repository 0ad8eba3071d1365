// src/config.rs

use std::env;

use chrono::Duration;
use dotenvy::dotenv;

/// Maximum number of questions a user may answer per category per calendar day.
pub const DAILY_QUESTION_LIMIT: i64 = 30;

/// Questions answered within this many days are kept out of the primary draw.
pub const RECENT_WINDOW_DAYS: i64 = 7;

/// Seconds a client gets per quiz question. Slower submissions auto-fail.
pub const QUESTION_TIME_LIMIT_SECS: f64 = 20.0;

/// Correct answers at or under this many seconds earn a speed bonus.
pub const SPEED_BONUS_WINDOW_SECS: f64 = 10.0;

pub const FIFTY_PERCENT_DAILY_LIMIT: i64 = 1;
pub const DOUBLE_ANSWER_DAILY_LIMIT: i64 = 2;

/// Default lifetime of an armed double-answer joker.
pub const DOUBLE_ANSWER_WINDOW_MINUTES: i64 = 60;

pub const DEFAULT_SESSION_SIZE: usize = 10;

/// Game rules shared by the ledger, the session builder and the scoring engine.
#[derive(Debug, Clone)]
pub struct QuizRules {
    pub daily_question_limit: i64,
    pub recent_window: Duration,
    pub question_time_limit: f64,
    pub speed_bonus_window: f64,
    pub fifty_percent_limit: i64,
    pub double_answer_limit: i64,
    pub double_answer_window: Duration,
}

impl Default for QuizRules {
    fn default() -> Self {
        Self {
            daily_question_limit: DAILY_QUESTION_LIMIT,
            recent_window: Duration::days(RECENT_WINDOW_DAYS),
            question_time_limit: QUESTION_TIME_LIMIT_SECS,
            speed_bonus_window: SPEED_BONUS_WINDOW_SECS,
            fifty_percent_limit: FIFTY_PERCENT_DAILY_LIMIT,
            double_answer_limit: DOUBLE_ANSWER_DAILY_LIMIT,
            double_answer_window: Duration::minutes(DOUBLE_ANSWER_WINDOW_MINUTES),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub port: u16,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub rules: QuizRules,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(86_400);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(3000);

        let admin_email = env::var("ADMIN_EMAIL").ok().filter(|v| !v.is_empty());
        let admin_password = env::var("ADMIN_PASSWORD").ok().filter(|v| !v.is_empty());

        let mut rules = QuizRules::default();
        if let Some(minutes) = env::var("DOUBLE_ANSWER_WINDOW_MINUTES")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|v| *v > 0)
        {
            rules.double_answer_window = Duration::minutes(minutes);
        }

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            port,
            admin_email,
            admin_password,
            rules,
        }
    }
}
