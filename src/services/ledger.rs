// src/services/ledger.rs

use rand::seq::SliceRandom;

use crate::{
    config::QuizRules,
    error::AppError,
    models::{
        joker::{FiftyPercentOutcome, JokerActivation, JokerKind, JokerQuota, JokerStatus, DailyJokerState},
        question::QuestionDetail,
        quiz::DailyLimitInfo,
        user_answer::UserAnswer,
    },
    services::{SharedClock, SharedRng, SharedStore},
};

/// Per-user, per-category, per-day counters: answered questions and joker usage.
#[derive(Clone)]
pub struct JokerLedger {
    store: SharedStore,
    clock: SharedClock,
    rng: SharedRng,
    rules: QuizRules,
}

impl JokerLedger {
    pub fn new(store: SharedStore, clock: SharedClock, rng: SharedRng, rules: QuizRules) -> Self {
        Self {
            store,
            clock,
            rng,
            rules,
        }
    }

    /// Answers recorded for the category since the start of the server-local day.
    pub async fn check_daily_limit(
        &self,
        user_id: i64,
        category_id: i64,
    ) -> Result<DailyLimitInfo, AppError> {
        let answered = self
            .store
            .count_answers_since(user_id, category_id, self.clock.start_of_today())
            .await?;
        Ok(DailyLimitInfo::new(self.rules.daily_question_limit, answered))
    }

    pub async fn check_joker_status(
        &self,
        user_id: i64,
        category_id: i64,
    ) -> Result<JokerStatus, AppError> {
        let state = self
            .store
            .joker_state(user_id, category_id, self.clock.today())
            .await?;
        Ok(self.status_of(&state))
    }

    /// Picks two incorrect options for the client to disable.
    /// The stored options are left untouched.
    pub async fn use_fifty_percent(
        &self,
        user_id: i64,
        category_id: i64,
        question_id: i64,
    ) -> Result<FiftyPercentOutcome, AppError> {
        let status = self.check_joker_status(user_id, category_id).await?;
        if status.fifty_percent.remaining == 0 {
            return Err(AppError::LimitExceeded(
                "Daily fifty percent joker limit reached".to_string(),
            ));
        }

        let question = self.question_in_category(question_id, category_id).await?;
        let mut incorrect: Vec<i64> = question
            .answers
            .iter()
            .filter(|a| !a.is_correct)
            .map(|a| a.id)
            .collect();
        if question.answers.len() < 4 || incorrect.len() < 2 {
            return Err(AppError::BadRequest(
                "Fifty percent joker needs at least 4 options with 2 incorrect".to_string(),
            ));
        }

        {
            let mut rng = self.rng.lock().await;
            incorrect.shuffle(&mut *rng);
        }
        incorrect.truncate(2);

        let state = self
            .activate(user_id, category_id, question_id, JokerKind::FiftyPercent)
            .await?;

        tracing::info!(
            "User {} used fifty percent on question {}",
            user_id,
            question_id
        );
        Ok(FiftyPercentOutcome {
            eliminated_answer_ids: incorrect,
            status: self.status_of(&state),
        })
    }

    /// Arms a second attempt at `question_id` for the double-answer window.
    pub async fn use_double_answer(
        &self,
        user_id: i64,
        category_id: i64,
        question_id: i64,
    ) -> Result<JokerStatus, AppError> {
        let status = self.check_joker_status(user_id, category_id).await?;
        if status.double_answer.remaining == 0 {
            return Err(AppError::LimitExceeded(
                "Daily double answer joker limit reached".to_string(),
            ));
        }

        self.question_in_category(question_id, category_id).await?;
        let state = self
            .activate(user_id, category_id, question_id, JokerKind::DoubleAnswer)
            .await?;

        tracing::info!(
            "User {} armed double answer on question {}",
            user_id,
            question_id
        );
        Ok(self.status_of(&state))
    }

    /// A double-answer activation for the question inside the trailing window.
    pub async fn double_answer_armed(&self, user_id: i64, question_id: i64) -> Result<bool, AppError> {
        let since = self.clock.now() - self.rules.double_answer_window;
        self.store
            .joker_used_since(user_id, question_id, JokerKind::DoubleAnswer, since)
            .await
    }

    /// Armed, and the retry is still unused: no answer yet, or a single
    /// first attempt that no retry has rewritten.
    pub async fn is_double_answer_active(
        &self,
        user_id: i64,
        question_id: i64,
    ) -> Result<bool, AppError> {
        if !self.double_answer_armed(user_id, question_id).await? {
            return Ok(false);
        }
        let prior = self
            .store
            .user_answers_for_question(user_id, question_id)
            .await?;
        Ok(UserAnswer::retry_available(&prior))
    }

    async fn question_in_category(
        &self,
        question_id: i64,
        category_id: i64,
    ) -> Result<QuestionDetail, AppError> {
        let question = self
            .store
            .get_question(question_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;
        if question.question.category_id != category_id {
            return Err(AppError::BadRequest(
                "Question does not belong to this category".to_string(),
            ));
        }
        Ok(question)
    }

    async fn activate(
        &self,
        user_id: i64,
        category_id: i64,
        question_id: i64,
        kind: JokerKind,
    ) -> Result<DailyJokerState, AppError> {
        let daily_limit = match kind {
            JokerKind::DoubleAnswer => self.rules.double_answer_limit,
            JokerKind::FiftyPercent => self.rules.fifty_percent_limit,
        };
        self.store
            .consume_joker(JokerActivation {
                user_id,
                category_id,
                question_id,
                kind,
                usage_date: self.clock.today(),
                daily_limit,
                used_at: self.clock.now(),
            })
            .await
    }

    fn status_of(&self, state: &DailyJokerState) -> JokerStatus {
        JokerStatus {
            double_answer: JokerQuota::new(self.rules.double_answer_limit, state.double_answer_used),
            fifty_percent: JokerQuota::new(self.rules.fifty_percent_limit, state.fifty_percent_used),
        }
    }
}
