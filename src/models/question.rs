// src/models/question.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

use crate::models::{ParseEnumError, user::UserType};

/// Question difficulty. Determines the base points of a correct answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Difficulty {
    /// Easy.
    Kolay,
    /// Medium. Also what unknown labels fall back to.
    #[default]
    Orta,
    /// Hard.
    Zor,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Kolay => "kolay",
            Difficulty::Orta => "orta",
            Difficulty::Zor => "zor",
        }
    }

    /// Base points for a correct answer.
    pub fn points(&self) -> i64 {
        match self {
            Difficulty::Kolay => 5,
            Difficulty::Orta => 10,
            Difficulty::Zor => 20,
        }
    }
}

impl From<String> for Difficulty {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "kolay" => Difficulty::Kolay,
            "zor" => Difficulty::Zor,
            _ => Difficulty::Orta,
        }
    }
}

/// Which students a question is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Ortaokul,
    Lise,
    Both,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Ortaokul => "ortaokul",
            Audience::Lise => "lise",
            Audience::Both => "both",
        }
    }

    /// Permissive filter match: `Both` rows satisfy every filter.
    pub fn matches(&self, filter: Audience) -> bool {
        *self == filter || *self == Audience::Both
    }
}

impl From<UserType> for Audience {
    fn from(value: UserType) -> Self {
        match value {
            UserType::Ortaokul => Audience::Ortaokul,
            UserType::Lise => Audience::Lise,
        }
    }
}

impl TryFrom<String> for Audience {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "ortaokul" => Ok(Audience::Ortaokul),
            "lise" => Ok(Audience::Lise),
            "both" => Ok(Audience::Both),
            _ => Err(ParseEnumError::new("user_type", value)),
        }
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    pub question_text: String,

    #[sqlx(try_from = "String")]
    pub user_type: Audience,

    pub category_id: i64,

    #[sqlx(try_from = "String")]
    pub difficulty: Difficulty,

    /// Derived from `difficulty` whenever the question is written.
    pub points: i64,

    pub created_at: DateTime<Utc>,
}

/// Represents the 'answers' table: one option of a question.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub question_id: i64,
    pub answer_text: String,
    pub is_correct: bool,
}

/// A question together with its options, in insertion order.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionDetail {
    #[serde(flatten)]
    pub question: Question,
    pub answers: Vec<Answer>,
}

impl QuestionDetail {
    pub fn correct_answer_id(&self) -> Option<i64> {
        self.answers.iter().find(|a| a.is_correct).map(|a| a.id)
    }

    pub fn answer(&self, answer_id: i64) -> Option<&Answer> {
        self.answers.iter().find(|a| a.id == answer_id)
    }
}

/// DTO for sending an option to a player (no correctness flag).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicAnswer {
    pub id: i64,
    pub answer_text: String,
}

impl From<&Answer> for PublicAnswer {
    fn from(answer: &Answer) -> Self {
        PublicAnswer {
            id: answer.id,
            answer_text: answer.answer_text.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerInput {
    pub answer_text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// DTO for creating or replacing a question with its options.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuestionRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question_text: String,
    pub user_type: Audience,
    pub category_id: i64,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[validate(custom(function = validate_answers))]
    pub answers: Vec<AnswerInput>,
}

/// Write payload for the store, already sanitized.
#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub question_text: String,
    pub user_type: Audience,
    pub category_id: i64,
    pub difficulty: Difficulty,
    pub answers: Vec<AnswerInput>,
}

/// Query parameters for listing questions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionFilter {
    pub user_type: Option<Audience>,
    pub category_id: Option<i64>,
    pub difficulty: Option<Difficulty>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// At least two options, at least one of them correct.
fn validate_answers(answers: &[AnswerInput]) -> Result<(), validator::ValidationError> {
    if answers
        .iter()
        .any(|a| a.answer_text.trim().is_empty() || a.answer_text.len() > 500)
    {
        return Err(validator::ValidationError::new("answer_text_length"));
    }
    if answers.len() < 2 {
        return Err(validator::ValidationError::new("at_least_two_answers_required"));
    }
    if !answers.iter().any(|a| a.is_correct) {
        return Err(validator::ValidationError::new("correct_answer_required"));
    }
    Ok(())
}
