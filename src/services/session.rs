// src/services/session.rs

use std::collections::HashSet;

use rand::seq::SliceRandom;

use crate::{
    config::{DEFAULT_SESSION_SIZE, QuizRules},
    error::AppError,
    models::{
        question::PublicAnswer,
        quiz::{QuizQuestion, QuizSession},
    },
    services::{SharedClock, SharedRng, SharedStore, ledger::JokerLedger},
};

/// Assembles the question set of one play session.
#[derive(Clone)]
pub struct SessionBuilder {
    store: SharedStore,
    clock: SharedClock,
    rng: SharedRng,
    rules: QuizRules,
    ledger: JokerLedger,
}

impl SessionBuilder {
    pub fn new(
        store: SharedStore,
        clock: SharedClock,
        rng: SharedRng,
        rules: QuizRules,
        ledger: JokerLedger,
    ) -> Self {
        Self {
            store,
            clock,
            rng,
            rules,
            ledger,
        }
    }

    /// Draws up to `requested` questions of the category, never more than the
    /// user may still answer today.
    ///
    /// Questions answered in the recent window are only used to top up a
    /// draw that would otherwise come up short.
    pub async fn create_session(
        &self,
        user_id: i64,
        category_id: i64,
        requested: Option<usize>,
    ) -> Result<QuizSession, AppError> {
        let requested = requested.unwrap_or(DEFAULT_SESSION_SIZE);
        if requested == 0 {
            return Err(AppError::BadRequest(
                "Question count must be at least 1".to_string(),
            ));
        }

        if self.store.get_category(category_id).await?.is_none() {
            return Err(AppError::NotFound("Category not found".to_string()));
        }

        let daily_limit_info = self.ledger.check_daily_limit(user_id, category_id).await?;
        if daily_limit_info.limit_reached {
            return Err(AppError::LimitExceeded(
                "Daily question limit reached for this category".to_string(),
            ));
        }
        let effective = requested.min(daily_limit_info.remaining.max(0) as usize);

        let all_ids = self.store.question_ids_in_category(category_id).await?;
        let recent: HashSet<i64> = self
            .store
            .answered_question_ids_since(
                user_id,
                category_id,
                self.clock.now() - self.rules.recent_window,
            )
            .await?
            .into_iter()
            .collect();
        let (mut stale, mut fresh): (Vec<i64>, Vec<i64>) =
            all_ids.into_iter().partition(|id| recent.contains(id));

        let selected = {
            let mut rng = self.rng.lock().await;
            fresh.shuffle(&mut *rng);
            fresh.truncate(effective);
            if fresh.len() < effective {
                stale.shuffle(&mut *rng);
                stale.truncate(effective - fresh.len());
                fresh.extend(stale);
            }
            fresh
        };

        if selected.is_empty() {
            return Err(AppError::NotFound(
                "No questions available in this category".to_string(),
            ));
        }

        let details = self.store.questions_by_ids(&selected).await?;
        let time_limit = self.rules.question_time_limit as u32;

        let mut questions = Vec::with_capacity(details.len());
        let mut rng = self.rng.lock().await;
        for detail in details {
            let mut answers: Vec<PublicAnswer> =
                detail.answers.iter().map(PublicAnswer::from).collect();
            answers.shuffle(&mut *rng);
            questions.push(QuizQuestion {
                id: detail.question.id,
                question_text: detail.question.question_text,
                category_id: detail.question.category_id,
                difficulty: detail.question.difficulty,
                points: detail.question.points,
                time_limit,
                answers,
            });
        }

        tracing::info!(
            "Session for user {} in category {}: {} questions",
            user_id,
            category_id,
            questions.len()
        );
        Ok(QuizSession {
            questions,
            daily_limit_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::{
        models::{question::Difficulty, user_answer::AnswerWrite},
        utils::clock::{Clock, ManualClock},
        services::test_support,
    };

    struct Fixture {
        store: SharedStore,
        clock: Arc<ManualClock>,
        builder: SessionBuilder,
        user_id: i64,
        category_id: i64,
    }

    async fn fixture() -> Fixture {
        let store = test_support::store();
        let clock = test_support::clock();
        let rng = test_support::rng();
        let rules = QuizRules::default();
        let ledger = JokerLedger::new(store.clone(), clock.clone(), rng.clone(), rules.clone());
        let builder = SessionBuilder::new(store.clone(), clock.clone(), rng, rules, ledger);
        let user = test_support::user(&store, "seans@x.com", None).await;
        let category = store.create_category("Edebiyat".into(), None).await.unwrap();
        Fixture {
            store,
            clock,
            builder,
            user_id: user.id,
            category_id: category.id,
        }
    }

    async fn answer(f: &Fixture, question_id: i64) {
        f.store
            .record_answer(AnswerWrite::Insert {
                user_id: f.user_id,
                question_id,
                answer_id: None,
                is_correct: false,
                points_earned: 0,
                response_time: None,
                answered_at: f.clock.now(),
            })
            .await
            .unwrap();
    }

    async fn seed(f: &Fixture, n: usize) -> Vec<i64> {
        let mut ids = Vec::new();
        for _ in 0..n {
            let q = test_support::question(&f.store, f.category_id, Difficulty::Orta, 3).await;
            ids.push(q.question.id);
        }
        ids
    }

    #[tokio::test]
    async fn session_has_requested_size_and_no_duplicates() {
        let f = fixture().await;
        seed(&f, 15).await;

        let session = f.builder.create_session(f.user_id, f.category_id, None).await.unwrap();
        assert_eq!(session.questions.len(), 10);
        let unique: HashSet<i64> = session.questions.iter().map(|q| q.id).collect();
        assert_eq!(unique.len(), 10);
        assert!(session.questions.iter().all(|q| q.time_limit == 20));
        assert!(session.questions.iter().all(|q| q.answers.len() == 4));
        assert_eq!(session.daily_limit_info.remaining, 30);
    }

    #[tokio::test]
    async fn recent_questions_are_drawn_last() {
        let f = fixture().await;
        let ids = seed(&f, 5).await;
        for id in &ids[..3] {
            answer(&f, *id).await;
        }
        f.clock.advance(Duration::days(1));

        let session = f
            .builder
            .create_session(f.user_id, f.category_id, Some(2))
            .await
            .unwrap();
        let drawn: HashSet<i64> = session.questions.iter().map(|q| q.id).collect();
        assert_eq!(drawn, ids[3..].iter().copied().collect());

        // Short on fresh questions: top up from recently answered ones.
        let session = f
            .builder
            .create_session(f.user_id, f.category_id, Some(4))
            .await
            .unwrap();
        let drawn: Vec<i64> = session.questions.iter().map(|q| q.id).collect();
        assert_eq!(drawn.len(), 4);
        assert!(drawn[..2].iter().all(|id| ids[3..].contains(id)));
    }

    #[tokio::test]
    async fn session_never_exceeds_remaining_quota() {
        let f = fixture().await;
        let ids = seed(&f, 12).await;
        for _ in 0..27 {
            answer(&f, ids[0]).await;
        }

        let session = f
            .builder
            .create_session(f.user_id, f.category_id, Some(10))
            .await
            .unwrap();
        assert_eq!(session.questions.len(), 3);
        assert_eq!(session.daily_limit_info.answered_today, 27);
    }

    #[tokio::test]
    async fn exhausted_quota_refuses_a_session() {
        let f = fixture().await;
        let ids = seed(&f, 2).await;
        for _ in 0..30 {
            answer(&f, ids[1]).await;
        }
        let err = f
            .builder
            .create_session(f.user_id, f.category_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LimitExceeded(_)));
    }

    #[tokio::test]
    async fn empty_category_is_an_error() {
        let f = fixture().await;
        let err = f
            .builder
            .create_session(f.user_id, f.category_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn options_hide_correctness() {
        let f = fixture().await;
        seed(&f, 1).await;
        let session = f.builder.create_session(f.user_id, f.category_id, None).await.unwrap();
        let json = serde_json::to_value(&session).unwrap();
        assert!(json["questions"][0]["answers"][0].get("is_correct").is_none());
    }
}
