// src/services/scoring.rs

use crate::{
    config::QuizRules,
    error::AppError,
    models::{
        question::Difficulty,
        user_answer::{AnswerWrite, EvaluationResult, RecordedAnswer, UserAnswer},
    },
    services::{SharedClock, SharedStore, aggregates::AggregatePropagator, ledger::JokerLedger},
    utils::retry::{RetryConfig, retry_on_conflict},
};

/// Where a submission comes from. Only timed quiz play enforces the time limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionContext {
    Quiz,
    Standalone,
}

/// Points for one evaluated answer.
///
/// Correct answers earn the difficulty base, plus `floor((time_limit - t) / 2)`
/// when answered within the speed-bonus window. A second attempt is worth half.
pub fn score_answer(
    rules: &QuizRules,
    difficulty: Difficulty,
    is_correct: bool,
    response_time: Option<f64>,
    second_attempt: bool,
) -> i64 {
    if !is_correct {
        return 0;
    }

    let mut points = difficulty.points();
    if let Some(t) = response_time.filter(|t| *t <= rules.speed_bonus_window) {
        points += ((rules.question_time_limit - t) / 2.0).floor() as i64;
    }

    if second_attempt {
        points = points.div_euclid(2);
    }
    points
}

/// Judges submissions, records them and moves the user's points.
#[derive(Clone)]
pub struct ScoringEngine {
    store: SharedStore,
    clock: SharedClock,
    rules: QuizRules,
    ledger: JokerLedger,
    aggregates: AggregatePropagator,
    retry: RetryConfig,
}

impl ScoringEngine {
    pub fn new(
        store: SharedStore,
        clock: SharedClock,
        rules: QuizRules,
        ledger: JokerLedger,
        aggregates: AggregatePropagator,
    ) -> Self {
        Self {
            store,
            clock,
            rules,
            ledger,
            aggregates,
            retry: RetryConfig::default(),
        }
    }

    pub async fn submit_answer(
        &self,
        user_id: i64,
        question_id: i64,
        answer_id: i64,
        response_time: Option<f64>,
        context: SubmissionContext,
    ) -> Result<EvaluationResult, AppError> {
        if let Some(t) = response_time {
            if !t.is_finite() || t < 0.0 {
                return Err(AppError::BadRequest(
                    "response_time must be a non-negative number of seconds".to_string(),
                ));
            }
        }

        if context == SubmissionContext::Quiz
            && response_time.is_some_and(|t| t > self.rules.question_time_limit)
        {
            return self.record_timeout(user_id, question_id, response_time).await;
        }

        let question = self
            .store
            .get_question(question_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;
        let chosen = question.answer(answer_id).ok_or_else(|| {
            AppError::BadRequest("Answer does not belong to this question".to_string())
        })?;

        let prior = self
            .store
            .user_answers_for_question(user_id, question_id)
            .await?;
        let double_answer_active = UserAnswer::retry_available(&prior)
            && self.ledger.double_answer_armed(user_id, question_id).await?;
        let is_second_attempt = double_answer_active && prior.len() == 1;

        let is_correct = chosen.is_correct;
        let points_earned = score_answer(
            &self.rules,
            question.question.difficulty,
            is_correct,
            response_time,
            is_second_attempt,
        );

        let write = match prior.first() {
            Some(previous) if is_second_attempt => AnswerWrite::Overwrite {
                row_id: previous.id,
                user_id,
                answer_id,
                is_correct,
                points_earned,
                response_time,
            },
            _ => AnswerWrite::Insert {
                user_id,
                question_id,
                answer_id: Some(answer_id),
                is_correct,
                points_earned,
                response_time,
                answered_at: self.clock.now(),
            },
        };
        let recorded = self.commit(write).await?;

        let current_points = self.after_commit(user_id).await?;

        let second_chance = double_answer_active && !is_second_attempt && !is_correct;
        let correct_answer_id = if second_chance {
            None
        } else {
            question.correct_answer_id()
        };
        let message = if is_correct {
            "Correct answer"
        } else if second_chance {
            "Wrong answer, you have one more try"
        } else {
            "Wrong answer"
        };

        tracing::debug!(
            "User {} answered question {}: correct={}, points={}, delta={}",
            user_id,
            question_id,
            is_correct,
            points_earned,
            recorded.points_delta
        );

        Ok(EvaluationResult {
            is_correct,
            points_earned,
            current_points,
            correct_answer_id,
            response_time,
            second_chance,
            is_second_attempt,
            timed_out: false,
            message: message.to_string(),
        })
    }

    /// Out-of-time quiz answers count as wrong regardless of the option chosen.
    async fn record_timeout(
        &self,
        user_id: i64,
        question_id: i64,
        response_time: Option<f64>,
    ) -> Result<EvaluationResult, AppError> {
        self.commit(AnswerWrite::Insert {
            user_id,
            question_id,
            answer_id: None,
            is_correct: false,
            points_earned: 0,
            response_time,
            answered_at: self.clock.now(),
        })
        .await?;

        let current_points = self.after_commit(user_id).await?;

        Ok(EvaluationResult {
            is_correct: false,
            points_earned: 0,
            current_points,
            correct_answer_id: None,
            response_time,
            second_chance: false,
            is_second_attempt: false,
            timed_out: true,
            message: "Time is up".to_string(),
        })
    }

    async fn commit(&self, write: AnswerWrite) -> Result<RecordedAnswer, AppError> {
        retry_on_conflict(self.retry.clone(), || {
            let store = self.store.clone();
            let write = write.clone();
            async move { store.record_answer(write).await }
        })
        .await
    }

    /// Schedules the school refresh and reads back the user's total.
    async fn after_commit(&self, user_id: i64) -> Result<i64, AppError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        self.aggregates.spawn_refresh([user.school_id]);
        Ok(user.points)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        models::{question::QuestionDetail, school::SchoolRequest},
        services::test_support,
        utils::clock::ManualClock,
    };

    #[test]
    fn fast_easy_answer_gets_speed_bonus() {
        let rules = QuizRules::default();
        assert_eq!(score_answer(&rules, Difficulty::Kolay, true, Some(5.0), false), 12);
        assert_eq!(score_answer(&rules, Difficulty::Kolay, true, Some(0.0), false), 15);
        assert_eq!(score_answer(&rules, Difficulty::Zor, true, Some(10.0), false), 25);
    }

    #[test]
    fn slow_or_unknown_time_gets_base_only() {
        let rules = QuizRules::default();
        assert_eq!(score_answer(&rules, Difficulty::Orta, true, Some(15.0), false), 10);
        assert_eq!(score_answer(&rules, Difficulty::Orta, true, Some(10.5), false), 10);
        assert_eq!(score_answer(&rules, Difficulty::Orta, true, None, false), 10);
    }

    #[test]
    fn wrong_answers_score_nothing() {
        let rules = QuizRules::default();
        assert_eq!(score_answer(&rules, Difficulty::Zor, false, Some(1.0), false), 0);
    }

    #[test]
    fn second_attempt_is_halved_down() {
        let rules = QuizRules::default();
        // 5 + floor(15 / 2) = 12 -> 6
        assert_eq!(score_answer(&rules, Difficulty::Kolay, true, Some(5.0), true), 6);
        // 10 + floor(16.5 / 2) = 18 -> 9
        assert_eq!(score_answer(&rules, Difficulty::Orta, true, Some(3.5), true), 9);
        // 5 -> 2
        assert_eq!(score_answer(&rules, Difficulty::Kolay, true, None, true), 2);
    }

    struct Fixture {
        store: SharedStore,
        ledger: JokerLedger,
        engine: ScoringEngine,
        user_id: i64,
        category_id: i64,
    }

    async fn fixture(school_id: Option<i64>) -> Fixture {
        let store = test_support::store();
        let clock: Arc<ManualClock> = test_support::clock();
        let rules = QuizRules::default();
        let ledger = JokerLedger::new(
            store.clone(),
            clock.clone(),
            test_support::rng(),
            rules.clone(),
        );
        let engine = ScoringEngine::new(
            store.clone(),
            clock,
            rules,
            ledger.clone(),
            AggregatePropagator::new(store.clone()),
        );
        let user = test_support::user(&store, "puan@x.com", school_id).await;
        let category = store.create_category("Matematik".into(), None).await.unwrap();
        Fixture {
            store,
            ledger,
            engine,
            user_id: user.id,
            category_id: category.id,
        }
    }

    fn wrong_option(q: &QuestionDetail) -> i64 {
        q.answers.iter().find(|a| !a.is_correct).unwrap().id
    }

    async fn quiz_answer(f: &Fixture, question_id: i64, answer_id: i64) -> EvaluationResult {
        f.engine
            .submit_answer(f.user_id, question_id, answer_id, Some(5.0), SubmissionContext::Quiz)
            .await
            .unwrap()
    }

    async fn points(f: &Fixture) -> i64 {
        f.store.get_user(f.user_id).await.unwrap().unwrap().points
    }

    #[tokio::test]
    async fn correct_answer_adds_points_and_reveals_key() {
        let f = fixture(None).await;
        let q = test_support::question(&f.store, f.category_id, Difficulty::Kolay, 3).await;
        let correct = q.correct_answer_id().unwrap();

        let result = f
            .engine
            .submit_answer(f.user_id, q.question.id, correct, Some(5.0), SubmissionContext::Quiz)
            .await
            .unwrap();

        assert!(result.is_correct);
        assert_eq!(result.points_earned, 12);
        assert_eq!(result.current_points, 12);
        assert_eq!(result.correct_answer_id, Some(correct));
        assert!(!result.second_chance);
        assert_eq!(points(&f).await, 12);
    }

    #[tokio::test]
    async fn late_quiz_answer_is_a_zero_point_miss() {
        let f = fixture(None).await;
        let q = test_support::question(&f.store, f.category_id, Difficulty::Zor, 1).await;
        let correct = q.correct_answer_id().unwrap();

        let result = f
            .engine
            .submit_answer(f.user_id, q.question.id, correct, Some(25.0), SubmissionContext::Quiz)
            .await
            .unwrap();

        assert!(result.timed_out);
        assert!(!result.is_correct);
        assert_eq!(result.points_earned, 0);
        let rows = f
            .store
            .user_answers_for_question(f.user_id, q.question.id)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].answer_id, None);
    }

    #[tokio::test]
    async fn standalone_answers_ignore_the_time_limit() {
        let f = fixture(None).await;
        let q = test_support::question(&f.store, f.category_id, Difficulty::Orta, 1).await;
        let correct = q.correct_answer_id().unwrap();

        let result = f
            .engine
            .submit_answer(
                f.user_id,
                q.question.id,
                correct,
                Some(25.0),
                SubmissionContext::Standalone,
            )
            .await
            .unwrap();
        assert!(!result.timed_out);
        assert_eq!(result.points_earned, 10);
    }

    #[tokio::test]
    async fn foreign_option_is_rejected() {
        let f = fixture(None).await;
        let a = test_support::question(&f.store, f.category_id, Difficulty::Orta, 1).await;
        let b = test_support::question(&f.store, f.category_id, Difficulty::Orta, 1).await;

        let err = f
            .engine
            .submit_answer(
                f.user_id,
                a.question.id,
                b.answers[0].id,
                None,
                SubmissionContext::Quiz,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(points(&f).await, 0);
    }

    #[tokio::test]
    async fn missing_question_is_not_found() {
        let f = fixture(None).await;
        let err = f
            .engine
            .submit_answer(f.user_id, 31_337, 1, None, SubmissionContext::Quiz)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn double_answer_retry_overwrites_the_first_attempt() {
        let f = fixture(None).await;
        let q = test_support::question(&f.store, f.category_id, Difficulty::Kolay, 3).await;
        let correct = q.correct_answer_id().unwrap();
        f.ledger
            .use_double_answer(f.user_id, f.category_id, q.question.id)
            .await
            .unwrap();

        let first = f
            .engine
            .submit_answer(
                f.user_id,
                q.question.id,
                wrong_option(&q),
                Some(4.0),
                SubmissionContext::Quiz,
            )
            .await
            .unwrap();
        assert!(first.second_chance);
        assert_eq!(first.correct_answer_id, None);
        assert!(!first.is_second_attempt);

        let second = f
            .engine
            .submit_answer(f.user_id, q.question.id, correct, Some(5.0), SubmissionContext::Quiz)
            .await
            .unwrap();
        assert!(second.is_second_attempt);
        assert!(second.is_correct);
        assert_eq!(second.points_earned, 6);
        assert_eq!(second.correct_answer_id, Some(correct));

        let rows = f
            .store
            .user_answers_for_question(f.user_id, q.question.id)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].answer_id, Some(correct));
        assert_eq!(rows[0].points_earned, 6);
        assert_eq!(points(&f).await, 6);
    }

    #[tokio::test]
    async fn double_answer_grants_a_single_retry() {
        let f = fixture(None).await;
        let q = test_support::question(&f.store, f.category_id, Difficulty::Kolay, 3).await;
        let correct = q.correct_answer_id().unwrap();
        f.ledger
            .use_double_answer(f.user_id, f.category_id, q.question.id)
            .await
            .unwrap();

        let first = quiz_answer(&f, q.question.id, wrong_option(&q)).await;
        assert!(first.second_chance);

        let second = quiz_answer(&f, q.question.id, wrong_option(&q)).await;
        assert!(second.is_second_attempt);
        assert!(!second.second_chance);
        assert_eq!(second.correct_answer_id, Some(correct));
        assert!(
            !f.ledger
                .is_double_answer_active(f.user_id, q.question.id)
                .await
                .unwrap()
        );

        // Back to normal play: a fresh row at full value.
        let third = quiz_answer(&f, q.question.id, correct).await;
        assert!(!third.is_second_attempt);
        assert!(!third.second_chance);
        assert_eq!(third.points_earned, 12);
        assert_eq!(third.current_points, 12);

        let rows = f
            .store
            .user_answers_for_question(f.user_id, q.question.id)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].retried);
        assert!(!rows[1].retried);
    }

    #[tokio::test]
    async fn worse_retry_takes_points_back() {
        let f = fixture(None).await;
        let q = test_support::question(&f.store, f.category_id, Difficulty::Zor, 1).await;
        let correct = q.correct_answer_id().unwrap();

        f.engine
            .submit_answer(f.user_id, q.question.id, correct, None, SubmissionContext::Quiz)
            .await
            .unwrap();
        assert_eq!(points(&f).await, 20);

        f.ledger
            .use_double_answer(f.user_id, f.category_id, q.question.id)
            .await
            .unwrap();
        let retry = f
            .engine
            .submit_answer(f.user_id, q.question.id, wrong_option(&q), None, SubmissionContext::Quiz)
            .await
            .unwrap();

        assert!(retry.is_second_attempt);
        assert_eq!(retry.current_points, 0);
        assert_eq!(points(&f).await, 0);
    }

    #[tokio::test]
    async fn without_joker_every_submission_appends() {
        let f = fixture(None).await;
        let q = test_support::question(&f.store, f.category_id, Difficulty::Orta, 1).await;
        let correct = q.correct_answer_id().unwrap();

        for _ in 0..2 {
            f.engine
                .submit_answer(f.user_id, q.question.id, correct, None, SubmissionContext::Standalone)
                .await
                .unwrap();
        }
        let rows = f
            .store
            .user_answers_for_question(f.user_id, q.question.id)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(points(&f).await, 20);
    }

    #[tokio::test]
    async fn negative_response_time_is_rejected() {
        let f = fixture(None).await;
        let q = test_support::question(&f.store, f.category_id, Difficulty::Orta, 1).await;
        let err = f
            .engine
            .submit_answer(f.user_id, q.question.id, q.answers[0].id, Some(-1.0), SubmissionContext::Quiz)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn school_total_follows_the_answer() {
        let store = test_support::store();
        let school = store
            .create_school(SchoolRequest {
                name: "Konak Ortaokulu".into(),
                city: "İzmir".into(),
                district: "Konak".into(),
                school_type: "devlet".into(),
                website: None,
                info_link: None,
                map_link: None,
            })
            .await
            .unwrap();
        let clock = test_support::clock();
        let rules = QuizRules::default();
        let ledger = JokerLedger::new(store.clone(), clock.clone(), test_support::rng(), rules.clone());
        let aggregates = AggregatePropagator::new(store.clone());
        let engine = ScoringEngine::new(store.clone(), clock, rules, ledger, aggregates.clone());
        let user = test_support::user(&store, "okul@x.com", Some(school.id)).await;
        let category = store.create_category("Tarih".into(), None).await.unwrap();
        let q = test_support::question(&store, category.id, Difficulty::Orta, 1).await;

        engine
            .submit_answer(user.id, q.question.id, q.correct_answer_id().unwrap(), None, SubmissionContext::Quiz)
            .await
            .unwrap();

        // The engine refreshes in the background; a direct refresh settles the race.
        let refreshed = aggregates.refresh_school(school.id).await.unwrap();
        assert_eq!(refreshed.total_points, 10);
        assert_eq!(refreshed.total_students, 1);
    }
}
