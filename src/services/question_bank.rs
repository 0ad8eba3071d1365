// src/services/question_bank.rs

use validator::Validate;

use crate::{
    error::AppError,
    models::{
        category::{Category, CategoryRequest},
        question::{AnswerInput, NewQuestion, Question, QuestionDetail, QuestionFilter, QuestionRequest},
    },
    services::{SharedStore, aggregates::AggregatePropagator},
    utils::html::{clean_html, clean_optional},
};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// Questions with their options, and the categories they live in.
#[derive(Clone)]
pub struct QuestionBank {
    store: SharedStore,
    aggregates: AggregatePropagator,
}

impl QuestionBank {
    pub fn new(store: SharedStore, aggregates: AggregatePropagator) -> Self {
        Self { store, aggregates }
    }

    pub async fn create_question(&self, req: QuestionRequest) -> Result<QuestionDetail, AppError> {
        let question = self.prepare(req).await?;
        let created = self.store.create_question(question).await?;
        tracing::info!(
            "Question {} created in category {}",
            created.question.id,
            created.question.category_id
        );
        Ok(created)
    }

    /// Options come back in insertion order.
    pub async fn get_question(&self, id: i64) -> Result<QuestionDetail, AppError> {
        self.store
            .get_question(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Question not found".to_string()))
    }

    pub async fn list_questions(
        &self,
        filter: &QuestionFilter,
    ) -> Result<(Vec<Question>, i64), AppError> {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = filter.offset.unwrap_or(0).max(0);
        self.store.list_questions(filter, limit, offset).await
    }

    /// Replaces the question and every one of its options.
    pub async fn update_question(
        &self,
        id: i64,
        req: QuestionRequest,
    ) -> Result<QuestionDetail, AppError> {
        let question = self.prepare(req).await?;
        self.store
            .update_question(id, question)
            .await?
            .ok_or_else(|| AppError::NotFound("Question not found".to_string()))
    }

    pub async fn delete_question(&self, id: i64) -> Result<(), AppError> {
        let report = self
            .store
            .delete_question(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Question not found".to_string()))?;
        self.aggregates
            .spawn_refresh(report.affected_school_ids.into_iter().map(Some));
        tracing::info!("Question {} deleted", id);
        Ok(())
    }

    pub async fn create_category(&self, req: CategoryRequest) -> Result<Category, AppError> {
        let (name, description) = sanitize_category(req)?;
        self.store.create_category(name, description).await
    }

    pub async fn update_category(&self, id: i64, req: CategoryRequest) -> Result<Category, AppError> {
        let (name, description) = sanitize_category(req)?;
        self.store
            .update_category(id, name, description)
            .await?
            .ok_or_else(|| AppError::NotFound("Category not found".to_string()))
    }

    pub async fn get_category(&self, id: i64) -> Result<Category, AppError> {
        self.store
            .get_category(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Category not found".to_string()))
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>, AppError> {
        self.store.list_categories().await
    }

    /// Removes the category with all of its questions and their history.
    pub async fn delete_category(&self, id: i64) -> Result<(), AppError> {
        let report = self
            .store
            .delete_category(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Category not found".to_string()))?;
        self.aggregates
            .spawn_refresh(report.affected_school_ids.into_iter().map(Some));
        tracing::info!("Category {} deleted", id);
        Ok(())
    }

    /// Validates and sanitizes a request and checks the category exists.
    async fn prepare(&self, req: QuestionRequest) -> Result<NewQuestion, AppError> {
        req.validate()?;

        let question_text = clean_html(&req.question_text);
        if question_text.is_empty() {
            return Err(AppError::BadRequest("Question text is required".to_string()));
        }

        let answers: Vec<AnswerInput> = req
            .answers
            .iter()
            .map(|a| AnswerInput {
                answer_text: clean_html(&a.answer_text),
                is_correct: a.is_correct,
            })
            .collect();
        if answers.iter().any(|a| a.answer_text.is_empty()) {
            return Err(AppError::BadRequest("Answer text is required".to_string()));
        }

        if self.store.get_category(req.category_id).await?.is_none() {
            return Err(AppError::NotFound("Category not found".to_string()));
        }

        Ok(NewQuestion {
            question_text,
            user_type: req.user_type,
            category_id: req.category_id,
            difficulty: req.difficulty,
            answers,
        })
    }
}

fn sanitize_category(req: CategoryRequest) -> Result<(String, Option<String>), AppError> {
    req.validate()?;
    let name = clean_html(&req.name);
    if name.is_empty() {
        return Err(AppError::BadRequest("Category name is required".to_string()));
    }
    Ok((name, clean_optional(req.description.as_deref())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            question::{Audience, Difficulty},
            user_answer::AnswerWrite,
        },
        services::test_support,
    };

    fn bank() -> (SharedStore, QuestionBank) {
        let store = test_support::store();
        let bank = QuestionBank::new(store.clone(), AggregatePropagator::new(store.clone()));
        (store, bank)
    }

    fn request(category_id: i64, user_type: Audience) -> QuestionRequest {
        QuestionRequest {
            question_text: "Türkiye'nin başkenti neresidir?<script>x()</script>".into(),
            user_type,
            category_id,
            difficulty: Difficulty::Zor,
            answers: vec![
                AnswerInput { answer_text: "Ankara".into(), is_correct: true },
                AnswerInput { answer_text: "İstanbul".into(), is_correct: false },
                AnswerInput { answer_text: "İzmir".into(), is_correct: false },
            ],
        }
    }

    async fn category(bank: &QuestionBank, name: &str) -> Category {
        bank.create_category(CategoryRequest {
            name: name.into(),
            description: Some("  ".into()),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn created_question_is_sanitized_and_priced() {
        let (_, bank) = bank();
        let c = category(&bank, "Coğrafya").await;
        assert_eq!(c.description, None);

        let q = bank.create_question(request(c.id, Audience::Lise)).await.unwrap();
        assert_eq!(q.question.question_text, "Türkiye'nin başkenti neresidir?");
        assert_eq!(q.question.points, 20);
        let texts: Vec<&str> = q.answers.iter().map(|a| a.answer_text.as_str()).collect();
        assert_eq!(texts, vec!["Ankara", "İstanbul", "İzmir"]);
    }

    #[tokio::test]
    async fn unknown_category_is_rejected() {
        let (_, bank) = bank();
        assert!(matches!(
            bank.create_question(request(77, Audience::Both)).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn invalid_options_are_rejected() {
        let (_, bank) = bank();
        let c = category(&bank, "Tarih").await;
        let mut req = request(c.id, Audience::Both);
        req.answers.iter_mut().for_each(|a| a.is_correct = false);
        assert!(matches!(
            bank.create_question(req).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn list_filter_includes_both_audience() {
        let (_, bank) = bank();
        let c = category(&bank, "Fizik").await;
        bank.create_question(request(c.id, Audience::Lise)).await.unwrap();
        bank.create_question(request(c.id, Audience::Both)).await.unwrap();
        bank.create_question(request(c.id, Audience::Ortaokul)).await.unwrap();

        let filter = QuestionFilter {
            user_type: Some(Audience::Lise),
            ..Default::default()
        };
        let (items, total) = bank.list_questions(&filter).await.unwrap();
        assert_eq!(total, 2);
        assert!(items.iter().all(|q| q.user_type != Audience::Ortaokul));

        let page = QuestionFilter {
            limit: Some(1),
            offset: Some(1),
            ..Default::default()
        };
        let (items, total) = bank.list_questions(&page).await.unwrap();
        assert_eq!((items.len(), total), (1, 3));
    }

    #[tokio::test]
    async fn update_replaces_all_options() {
        let (_, bank) = bank();
        let c = category(&bank, "Kimya").await;
        let q = bank.create_question(request(c.id, Audience::Both)).await.unwrap();

        let mut req = request(c.id, Audience::Both);
        req.difficulty = Difficulty::Kolay;
        req.answers.truncate(2);
        let updated = bank.update_question(q.question.id, req).await.unwrap();

        assert_eq!(updated.question.points, 5);
        assert_eq!(updated.answers.len(), 2);
        assert!(updated.answers.iter().all(|a| !q.answers.iter().any(|old| old.id == a.id)));
        assert_eq!(bank.get_question(q.question.id).await.unwrap().answers.len(), 2);
    }

    #[tokio::test]
    async fn deleting_a_category_removes_its_history() {
        let (store, bank) = bank();
        let c = category(&bank, "Biyoloji").await;
        let q = bank.create_question(request(c.id, Audience::Both)).await.unwrap();
        let user = test_support::user(&store, "sil@x.com", None).await;
        store
            .record_answer(AnswerWrite::Insert {
                user_id: user.id,
                question_id: q.question.id,
                answer_id: q.correct_answer_id(),
                is_correct: true,
                points_earned: 20,
                response_time: None,
                answered_at: chrono::Utc::now(),
            })
            .await
            .unwrap();

        bank.delete_category(c.id).await.unwrap();

        assert!(matches!(bank.get_category(c.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(bank.get_question(q.question.id).await, Err(AppError::NotFound(_))));
        assert!(
            store
                .user_answers_for_question(user.id, q.question.id)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(store.get_user(user.id).await.unwrap().unwrap().points, 0);
    }

    #[tokio::test]
    async fn duplicate_category_name_conflicts() {
        let (_, bank) = bank();
        category(&bank, "Müzik").await;
        let err = bank
            .create_category(CategoryRequest {
                name: "Müzik".into(),
                description: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
