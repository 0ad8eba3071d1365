// src/store/mod.rs

//! Storage handle injected into every service.
//!
//! Each method is one unit of work: methods that touch more than one table
//! (`create_question`, `delete_category`, `record_answer`, `consume_joker`, ...)
//! either apply completely or not at all.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    error::AppError,
    models::{
        category::Category,
        joker::{DailyJokerState, JokerActivation, JokerKind},
        question::{NewQuestion, Question, QuestionDetail, QuestionFilter},
        ranking::{RankScope, SchoolLeaderboardEntry, UserLeaderboardEntry},
        school::{School, SchoolFilter, SchoolRequest},
        user::{NewUser, UpdateProfileRequest, User, UserStats},
        user_answer::{AnswerWrite, RecordedAnswer, UserAnswer},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Side effects of a cascading delete that callers must propagate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionReport {
    /// Schools whose members lost points with the removed answers.
    pub affected_school_ids: Vec<i64>,
}

#[async_trait]
pub trait QuizStore: Send + Sync {
    // ---- users ----

    /// Fails with `Conflict` on a duplicate email.
    async fn create_user(&self, user: NewUser) -> Result<User, AppError>;
    async fn get_user(&self, id: i64) -> Result<Option<User>, AppError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn list_users(&self, limit: i64, offset: i64) -> Result<(Vec<User>, i64), AppError>;
    async fn update_user(&self, id: i64, changes: UpdateProfileRequest)
        -> Result<Option<User>, AppError>;
    async fn touch_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError>;
    /// Removes joker logs, joker states, answers, then the user.
    /// Returns the removed user.
    async fn delete_user(&self, id: i64) -> Result<Option<User>, AppError>;
    /// Sets `points` to the sum of the user's `points_earned`.
    async fn resync_user_points(&self, id: i64) -> Result<Option<i64>, AppError>;
    async fn user_stats(&self, id: i64) -> Result<Option<UserStats>, AppError>;

    // ---- schools ----

    async fn create_school(&self, school: SchoolRequest) -> Result<School, AppError>;
    async fn update_school(&self, id: i64, school: SchoolRequest)
        -> Result<Option<School>, AppError>;
    async fn get_school(&self, id: i64) -> Result<Option<School>, AppError>;
    async fn list_schools(&self, filter: &SchoolFilter) -> Result<Vec<School>, AppError>;
    /// Recomputes `total_points` and `total_students` from the member users.
    async fn refresh_school_totals(&self, id: i64) -> Result<Option<School>, AppError>;

    // ---- categories ----

    async fn create_category(&self, name: String, description: Option<String>)
        -> Result<Category, AppError>;
    async fn update_category(
        &self,
        id: i64,
        name: String,
        description: Option<String>,
    ) -> Result<Option<Category>, AppError>;
    async fn get_category(&self, id: i64) -> Result<Option<Category>, AppError>;
    async fn list_categories(&self) -> Result<Vec<Category>, AppError>;
    /// Removes every question of the category (with their joker logs,
    /// user answers and options), its joker states, then the category.
    /// Points of the removed answers are taken back from their users.
    async fn delete_category(&self, id: i64) -> Result<Option<DeletionReport>, AppError>;

    // ---- question bank ----

    async fn create_question(&self, question: NewQuestion) -> Result<QuestionDetail, AppError>;
    async fn get_question(&self, id: i64) -> Result<Option<QuestionDetail>, AppError>;
    async fn list_questions(
        &self,
        filter: &QuestionFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Question>, i64), AppError>;
    /// Replaces the question fields and all of its options.
    async fn update_question(&self, id: i64, question: NewQuestion)
        -> Result<Option<QuestionDetail>, AppError>;
    /// Removes joker logs, user answers and options, then the question.
    /// Points of the removed answers are taken back from their users.
    async fn delete_question(&self, id: i64) -> Result<Option<DeletionReport>, AppError>;
    /// Ids of every question in a category, ascending.
    async fn question_ids_in_category(&self, category_id: i64) -> Result<Vec<i64>, AppError>;
    /// Questions with options for the given ids, in the order of `ids`.
    async fn questions_by_ids(&self, ids: &[i64]) -> Result<Vec<QuestionDetail>, AppError>;

    // ---- answers ----

    async fn count_answers_since(
        &self,
        user_id: i64,
        category_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64, AppError>;
    /// Distinct question ids of the category the user answered at or after `since`.
    async fn answered_question_ids_since(
        &self,
        user_id: i64,
        category_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<i64>, AppError>;
    async fn user_answers_for_question(
        &self,
        user_id: i64,
        question_id: i64,
    ) -> Result<Vec<UserAnswer>, AppError>;
    /// Writes the answer row and applies its point delta to the user,
    /// holding the user's row lock for the duration.
    async fn record_answer(&self, write: AnswerWrite) -> Result<RecordedAnswer, AppError>;

    // ---- jokers ----

    /// Returns the (user, category, date) counters, creating a zeroed row if absent.
    async fn joker_state(
        &self,
        user_id: i64,
        category_id: i64,
        date: NaiveDate,
    ) -> Result<DailyJokerState, AppError>;
    /// Fails with `LimitExceeded` when the counter already reached the limit,
    /// otherwise bumps it and appends the usage log entry.
    async fn consume_joker(&self, activation: JokerActivation)
        -> Result<DailyJokerState, AppError>;
    async fn joker_used_since(
        &self,
        user_id: i64,
        question_id: i64,
        kind: JokerKind,
        since: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    // ---- rankings ----

    async fn count_users(&self, scope: &RankScope) -> Result<i64, AppError>;
    async fn count_users_above(&self, scope: &RankScope, points: i64) -> Result<i64, AppError>;
    /// Points descending, id ascending. `rank` is left for the caller.
    async fn top_users(&self, scope: &RankScope, limit: i64)
        -> Result<Vec<UserLeaderboardEntry>, AppError>;
    async fn count_schools(&self, scope: &RankScope) -> Result<i64, AppError>;
    async fn count_schools_above(&self, scope: &RankScope, points: i64)
        -> Result<i64, AppError>;
    async fn top_schools(&self, scope: &RankScope, limit: i64)
        -> Result<Vec<SchoolLeaderboardEntry>, AppError>;
}
