// src/models/mod.rs

pub mod category;
pub mod joker;
pub mod question;
pub mod quiz;
pub mod ranking;
pub mod school;
pub mod user;
pub mod user_answer;

/// A stored enum label that does not match any known variant.
#[derive(Debug, thiserror::Error)]
#[error("unknown {field} value '{value}'")]
pub struct ParseEnumError {
    pub field: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(field: &'static str, value: String) -> Self {
        Self { field, value }
    }
}
