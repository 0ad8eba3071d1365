// src/store/memory.rs

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;

use crate::{
    error::AppError,
    models::{
        category::Category,
        joker::{DailyJokerState, JokerActivation, JokerKind, JokerUsage},
        question::{Answer, AnswerInput, NewQuestion, Question, QuestionDetail, QuestionFilter},
        ranking::{RankScope, SchoolLeaderboardEntry, UserLeaderboardEntry},
        school::{School, SchoolFilter, SchoolRequest},
        user::{NewUser, UpdateProfileRequest, User, UserStats},
        user_answer::{AnswerWrite, RecordedAnswer, UserAnswer},
    },
    store::{DeletionReport, QuizStore},
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: Vec<User>,
    schools: Vec<School>,
    categories: Vec<Category>,
    questions: Vec<Question>,
    answers: Vec<Answer>,
    user_answers: Vec<UserAnswer>,
    joker_states: Vec<DailyJokerState>,
    joker_logs: Vec<JokerUsage>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn school_exists(&self, id: i64) -> bool {
        self.schools.iter().any(|s| s.id == id)
    }

    fn category_exists(&self, id: i64) -> bool {
        self.categories.iter().any(|c| c.id == id)
    }

    fn user_mut(&mut self, id: i64) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == id)
    }

    fn detail(&self, question: &Question) -> QuestionDetail {
        QuestionDetail {
            question: question.clone(),
            answers: self
                .answers
                .iter()
                .filter(|a| a.question_id == question.id)
                .cloned()
                .collect(),
        }
    }

    fn insert_answers(&mut self, question_id: i64, inputs: &[AnswerInput]) -> Vec<Answer> {
        let mut inserted = Vec::with_capacity(inputs.len());
        for input in inputs {
            let answer = Answer {
                id: self.next_id(),
                question_id,
                answer_text: input.answer_text.clone(),
                is_correct: input.is_correct,
            };
            self.answers.push(answer.clone());
            inserted.push(answer);
        }
        inserted
    }

    fn category_of(&self, question_id: i64) -> Option<i64> {
        self.questions
            .iter()
            .find(|q| q.id == question_id)
            .map(|q| q.category_id)
    }

    fn user_in_scope(&self, user: &User, scope: &RankScope) -> bool {
        let school = user
            .school_id
            .and_then(|id| self.schools.iter().find(|s| s.id == id));
        match scope {
            RankScope::Nation => true,
            RankScope::City(city) => school.is_some_and(|s| &s.city == city),
            RankScope::District { city, district } => {
                school.is_some_and(|s| &s.city == city && &s.district == district)
            }
            RankScope::School(id) => user.school_id == Some(*id),
        }
    }

    /// Same bookkeeping as the SQL cascade: deduct points, then drop every dependent row.
    fn remove_questions(&mut self, question_ids: &[i64]) -> Vec<i64> {
        let ids: HashSet<i64> = question_ids.iter().copied().collect();

        let mut affected_users: Vec<(i64, i64)> = Vec::new();
        for row in self.user_answers.iter().filter(|a| ids.contains(&a.question_id)) {
            match affected_users.iter_mut().find(|(u, _)| *u == row.user_id) {
                Some((_, total)) => *total += row.points_earned,
                None => affected_users.push((row.user_id, row.points_earned)),
            }
        }

        let mut schools = Vec::new();
        for (user_id, total) in affected_users {
            if total <= 0 {
                continue;
            }
            if let Some(user) = self.user_mut(user_id) {
                user.points = (user.points - total).max(0);
                if let Some(school_id) = user.school_id {
                    schools.push(school_id);
                }
            }
        }
        schools.sort_unstable();
        schools.dedup();

        self.joker_logs.retain(|l| !ids.contains(&l.question_id));
        self.user_answers.retain(|a| !ids.contains(&a.question_id));
        self.answers.retain(|a| !ids.contains(&a.question_id));
        self.questions.retain(|q| !ids.contains(&q.id));
        schools
    }

    fn joker_state_mut(
        &mut self,
        user_id: i64,
        category_id: i64,
        date: NaiveDate,
    ) -> &mut DailyJokerState {
        let position = self.joker_states.iter().position(|s| {
            s.user_id == user_id && s.category_id == category_id && s.usage_date == date
        });
        let index = match position {
            Some(index) => index,
            None => {
                let id = self.next_id();
                self.joker_states.push(DailyJokerState {
                    id,
                    user_id,
                    category_id,
                    usage_date: date,
                    double_answer_used: 0,
                    fifty_percent_used: 0,
                });
                self.joker_states.len() - 1
            }
        };
        &mut self.joker_states[index]
    }
}

fn question_matches(question: &Question, filter: &QuestionFilter) -> bool {
    filter
        .user_type
        .is_none_or(|audience| question.user_type.matches(audience))
        && filter.category_id.is_none_or(|id| question.category_id == id)
        && filter.difficulty.is_none_or(|d| question.difficulty == d)
}

fn school_in_scope(school: &School, scope: &RankScope) -> bool {
    match scope {
        RankScope::Nation => true,
        RankScope::City(city) => &school.city == city,
        RankScope::District { city, district } => {
            &school.city == city && &school.district == district
        }
        RankScope::School(id) => school.id == *id,
    }
}

/// In-process store with the same semantics as `PgStore`.
/// Every method holds the table lock for its whole body, which makes each one atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuizStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut t = self.tables.lock().await;
        if t.users.iter().any(|u| u.email == user.email) {
            return Err(AppError::Conflict(format!(
                "Email '{}' is already registered",
                user.email
            )));
        }
        if let Some(school_id) = user.school_id {
            if !t.school_exists(school_id) {
                return Err(AppError::NotFound("School not found".to_string()));
            }
        }

        let row = User {
            id: t.next_id(),
            name: user.name,
            email: user.email,
            password: user.password_hash,
            birth_date: user.birth_date,
            user_type: user.user_type,
            school_id: user.school_id,
            class_label: user.class_label,
            gender: user.gender,
            points: 0,
            is_admin: user.is_admin,
            created_at: Utc::now(),
            last_login_at: None,
        };
        t.users.push(row.clone());
        Ok(row)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self, limit: i64, offset: i64) -> Result<(Vec<User>, i64), AppError> {
        let t = self.tables.lock().await;
        let mut users = t.users.clone();
        users.sort_by(|a, b| b.id.cmp(&a.id));
        let total = users.len() as i64;
        let page = users
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn update_user(
        &self,
        id: i64,
        changes: UpdateProfileRequest,
    ) -> Result<Option<User>, AppError> {
        let mut t = self.tables.lock().await;
        if let Some(school_id) = changes.school_id {
            if !t.school_exists(school_id) {
                return Err(AppError::NotFound("School not found".to_string()));
            }
        }

        let Some(user) = t.user_mut(id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(birth_date) = changes.birth_date {
            user.birth_date = Some(birth_date);
        }
        if let Some(user_type) = changes.user_type {
            user.user_type = user_type;
        }
        if let Some(school_id) = changes.school_id {
            user.school_id = Some(school_id);
        }
        if let Some(class_label) = changes.class_label {
            user.class_label = Some(class_label);
        }
        if let Some(gender) = changes.gender {
            user.gender = Some(gender);
        }
        Ok(Some(user.clone()))
    }

    async fn touch_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut t = self.tables.lock().await;
        if let Some(user) = t.user_mut(id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn delete_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let mut t = self.tables.lock().await;
        let Some(position) = t.users.iter().position(|u| u.id == id) else {
            return Ok(None);
        };
        t.joker_logs.retain(|l| l.user_id != id);
        t.joker_states.retain(|s| s.user_id != id);
        t.user_answers.retain(|a| a.user_id != id);
        Ok(Some(t.users.remove(position)))
    }

    async fn resync_user_points(&self, id: i64) -> Result<Option<i64>, AppError> {
        let mut t = self.tables.lock().await;
        let total: i64 = t
            .user_answers
            .iter()
            .filter(|a| a.user_id == id)
            .map(|a| a.points_earned)
            .sum();
        Ok(t.user_mut(id).map(|user| {
            user.points = total;
            total
        }))
    }

    async fn user_stats(&self, id: i64) -> Result<Option<UserStats>, AppError> {
        let t = self.tables.lock().await;
        let Some(user) = t.users.iter().find(|u| u.id == id) else {
            return Ok(None);
        };
        let own = t.user_answers.iter().filter(|a| a.user_id == id);
        let (total, correct) = own.fold((0, 0), |(total, correct), a| {
            (total + 1, correct + i64::from(a.is_correct))
        });
        Ok(Some(UserStats::new(total, correct, user.points)))
    }

    async fn create_school(&self, school: SchoolRequest) -> Result<School, AppError> {
        let mut t = self.tables.lock().await;
        let row = School {
            id: t.next_id(),
            name: school.name,
            city: school.city,
            district: school.district,
            school_type: school.school_type,
            website: school.website,
            info_link: school.info_link,
            map_link: school.map_link,
            total_points: 0,
            total_students: 0,
            created_at: Utc::now(),
        };
        t.schools.push(row.clone());
        Ok(row)
    }

    async fn update_school(
        &self,
        id: i64,
        school: SchoolRequest,
    ) -> Result<Option<School>, AppError> {
        let mut t = self.tables.lock().await;
        let Some(row) = t.schools.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        row.name = school.name;
        row.city = school.city;
        row.district = school.district;
        row.school_type = school.school_type;
        row.website = school.website;
        row.info_link = school.info_link;
        row.map_link = school.map_link;
        Ok(Some(row.clone()))
    }

    async fn get_school(&self, id: i64) -> Result<Option<School>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.schools.iter().find(|s| s.id == id).cloned())
    }

    async fn list_schools(&self, filter: &SchoolFilter) -> Result<Vec<School>, AppError> {
        let t = self.tables.lock().await;
        let mut schools: Vec<School> = t
            .schools
            .iter()
            .filter(|s| filter.city.as_ref().is_none_or(|c| &s.city == c))
            .filter(|s| filter.district.as_ref().is_none_or(|d| &s.district == d))
            .filter(|s| filter.school_type.as_ref().is_none_or(|k| &s.school_type == k))
            .cloned()
            .collect();
        schools.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(schools)
    }

    async fn refresh_school_totals(&self, id: i64) -> Result<Option<School>, AppError> {
        let mut t = self.tables.lock().await;
        let (total_points, total_students) = t
            .users
            .iter()
            .filter(|u| u.school_id == Some(id))
            .fold((0, 0), |(points, students), u| (points + u.points, students + 1));

        let Some(school) = t.schools.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        school.total_points = total_points;
        school.total_students = total_students;
        Ok(Some(school.clone()))
    }

    async fn create_category(
        &self,
        name: String,
        description: Option<String>,
    ) -> Result<Category, AppError> {
        let mut t = self.tables.lock().await;
        if t.categories.iter().any(|c| c.name == name) {
            return Err(AppError::Conflict(format!("Category '{}' already exists", name)));
        }
        let row = Category {
            id: t.next_id(),
            name,
            description,
            created_at: Utc::now(),
        };
        t.categories.push(row.clone());
        Ok(row)
    }

    async fn update_category(
        &self,
        id: i64,
        name: String,
        description: Option<String>,
    ) -> Result<Option<Category>, AppError> {
        let mut t = self.tables.lock().await;
        if t.categories.iter().any(|c| c.name == name && c.id != id) {
            return Err(AppError::Conflict(format!("Category '{}' already exists", name)));
        }
        let Some(row) = t.categories.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        row.name = name;
        row.description = description;
        Ok(Some(row.clone()))
    }

    async fn get_category(&self, id: i64) -> Result<Option<Category>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.categories.iter().find(|c| c.id == id).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, AppError> {
        let t = self.tables.lock().await;
        let mut categories = t.categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(categories)
    }

    async fn delete_category(&self, id: i64) -> Result<Option<DeletionReport>, AppError> {
        let mut t = self.tables.lock().await;
        if !t.category_exists(id) {
            return Ok(None);
        }
        let question_ids: Vec<i64> = t
            .questions
            .iter()
            .filter(|q| q.category_id == id)
            .map(|q| q.id)
            .collect();

        let affected_school_ids = t.remove_questions(&question_ids);
        t.joker_logs.retain(|l| l.category_id != id);
        t.joker_states.retain(|s| s.category_id != id);
        t.categories.retain(|c| c.id != id);
        Ok(Some(DeletionReport {
            affected_school_ids,
        }))
    }

    async fn create_question(&self, question: NewQuestion) -> Result<QuestionDetail, AppError> {
        let mut t = self.tables.lock().await;
        if !t.category_exists(question.category_id) {
            return Err(AppError::NotFound("Category not found".to_string()));
        }
        let row = Question {
            id: t.next_id(),
            question_text: question.question_text,
            user_type: question.user_type,
            category_id: question.category_id,
            difficulty: question.difficulty,
            points: question.difficulty.points(),
            created_at: Utc::now(),
        };
        t.questions.push(row.clone());
        let answers = t.insert_answers(row.id, &question.answers);
        Ok(QuestionDetail {
            question: row,
            answers,
        })
    }

    async fn get_question(&self, id: i64) -> Result<Option<QuestionDetail>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.questions.iter().find(|q| q.id == id).map(|q| t.detail(q)))
    }

    async fn list_questions(
        &self,
        filter: &QuestionFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Question>, i64), AppError> {
        let t = self.tables.lock().await;
        let mut matching: Vec<Question> = t
            .questions
            .iter()
            .filter(|q| question_matches(q, filter))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn update_question(
        &self,
        id: i64,
        question: NewQuestion,
    ) -> Result<Option<QuestionDetail>, AppError> {
        let mut t = self.tables.lock().await;
        if !t.questions.iter().any(|q| q.id == id) {
            return Ok(None);
        }
        if !t.category_exists(question.category_id) {
            return Err(AppError::NotFound("Category not found".to_string()));
        }

        let Some(row) = t.questions.iter_mut().find(|q| q.id == id) else {
            return Ok(None);
        };
        row.question_text = question.question_text;
        row.user_type = question.user_type;
        row.category_id = question.category_id;
        row.difficulty = question.difficulty;
        row.points = question.difficulty.points();
        let row = row.clone();

        for answer in t.user_answers.iter_mut().filter(|a| a.question_id == id) {
            answer.answer_id = None;
        }
        t.answers.retain(|a| a.question_id != id);
        let answers = t.insert_answers(id, &question.answers);

        Ok(Some(QuestionDetail {
            question: row,
            answers,
        }))
    }

    async fn delete_question(&self, id: i64) -> Result<Option<DeletionReport>, AppError> {
        let mut t = self.tables.lock().await;
        if !t.questions.iter().any(|q| q.id == id) {
            return Ok(None);
        }
        let affected_school_ids = t.remove_questions(&[id]);
        Ok(Some(DeletionReport {
            affected_school_ids,
        }))
    }

    async fn question_ids_in_category(&self, category_id: i64) -> Result<Vec<i64>, AppError> {
        let t = self.tables.lock().await;
        let mut ids: Vec<i64> = t
            .questions
            .iter()
            .filter(|q| q.category_id == category_id)
            .map(|q| q.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn questions_by_ids(&self, ids: &[i64]) -> Result<Vec<QuestionDetail>, AppError> {
        let t = self.tables.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| t.questions.iter().find(|q| q.id == *id))
            .map(|q| t.detail(q))
            .collect())
    }

    async fn count_answers_since(
        &self,
        user_id: i64,
        category_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let t = self.tables.lock().await;
        Ok(t.user_answers
            .iter()
            .filter(|a| a.user_id == user_id && a.answered_at >= since)
            .filter(|a| t.category_of(a.question_id) == Some(category_id))
            .count() as i64)
    }

    async fn answered_question_ids_since(
        &self,
        user_id: i64,
        category_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<i64>, AppError> {
        let t = self.tables.lock().await;
        let mut ids: Vec<i64> = t
            .user_answers
            .iter()
            .filter(|a| a.user_id == user_id && a.answered_at >= since)
            .filter(|a| t.category_of(a.question_id) == Some(category_id))
            .map(|a| a.question_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn user_answers_for_question(
        &self,
        user_id: i64,
        question_id: i64,
    ) -> Result<Vec<UserAnswer>, AppError> {
        let t = self.tables.lock().await;
        Ok(t.user_answers
            .iter()
            .filter(|a| a.user_id == user_id && a.question_id == question_id)
            .cloned()
            .collect())
    }

    async fn record_answer(&self, write: AnswerWrite) -> Result<RecordedAnswer, AppError> {
        let mut t = self.tables.lock().await;
        if !t.users.iter().any(|u| u.id == write.user_id()) {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        let recorded = match write {
            AnswerWrite::Insert {
                user_id,
                question_id,
                answer_id,
                is_correct,
                points_earned,
                response_time,
                answered_at,
            } => {
                if !t.questions.iter().any(|q| q.id == question_id) {
                    return Err(AppError::NotFound("Question not found".to_string()));
                }
                let answer = UserAnswer {
                    id: t.next_id(),
                    user_id,
                    question_id,
                    answer_id,
                    is_correct,
                    points_earned,
                    response_time,
                    answered_at,
                    retried: false,
                };
                t.user_answers.push(answer.clone());
                RecordedAnswer {
                    answer,
                    points_delta: points_earned.max(0),
                }
            }
            AnswerWrite::Overwrite {
                row_id,
                user_id,
                answer_id,
                is_correct,
                points_earned,
                response_time,
            } => {
                let row = t
                    .user_answers
                    .iter_mut()
                    .find(|a| a.id == row_id && a.user_id == user_id)
                    .ok_or_else(|| AppError::NotFound("Answer record not found".to_string()))?;
                if row.retried {
                    return Err(AppError::Conflict(
                        "Double answer retry already used".to_string(),
                    ));
                }
                let previous = row.points_earned;
                row.answer_id = Some(answer_id);
                row.is_correct = is_correct;
                row.points_earned = points_earned;
                row.response_time = response_time;
                row.retried = true;
                RecordedAnswer {
                    answer: row.clone(),
                    points_delta: points_earned - previous,
                }
            }
        };

        if recorded.points_delta != 0 {
            if let Some(user) = t.user_mut(recorded.answer.user_id) {
                user.points = (user.points + recorded.points_delta).max(0);
            }
        }
        Ok(recorded)
    }

    async fn joker_state(
        &self,
        user_id: i64,
        category_id: i64,
        date: NaiveDate,
    ) -> Result<DailyJokerState, AppError> {
        let mut t = self.tables.lock().await;
        Ok(t.joker_state_mut(user_id, category_id, date).clone())
    }

    async fn consume_joker(
        &self,
        activation: JokerActivation,
    ) -> Result<DailyJokerState, AppError> {
        let mut t = self.tables.lock().await;
        let state = t.joker_state_mut(
            activation.user_id,
            activation.category_id,
            activation.usage_date,
        );
        if state.used(activation.kind) >= activation.daily_limit {
            return Err(AppError::LimitExceeded(format!(
                "Daily {} joker limit reached",
                activation.kind.as_str()
            )));
        }
        match activation.kind {
            JokerKind::DoubleAnswer => state.double_answer_used += 1,
            JokerKind::FiftyPercent => state.fifty_percent_used += 1,
        }
        let state = state.clone();

        let id = t.next_id();
        t.joker_logs.push(JokerUsage {
            id,
            user_id: activation.user_id,
            category_id: activation.category_id,
            question_id: activation.question_id,
            joker_type: activation.kind,
            used_at: activation.used_at,
        });
        Ok(state)
    }

    async fn joker_used_since(
        &self,
        user_id: i64,
        question_id: i64,
        kind: JokerKind,
        since: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let t = self.tables.lock().await;
        Ok(t.joker_logs.iter().any(|l| {
            l.user_id == user_id
                && l.question_id == question_id
                && l.joker_type == kind
                && l.used_at >= since
        }))
    }

    async fn count_users(&self, scope: &RankScope) -> Result<i64, AppError> {
        let t = self.tables.lock().await;
        Ok(t.users.iter().filter(|u| t.user_in_scope(u, scope)).count() as i64)
    }

    async fn count_users_above(&self, scope: &RankScope, points: i64) -> Result<i64, AppError> {
        let t = self.tables.lock().await;
        Ok(t.users
            .iter()
            .filter(|u| u.points > points && t.user_in_scope(u, scope))
            .count() as i64)
    }

    async fn top_users(
        &self,
        scope: &RankScope,
        limit: i64,
    ) -> Result<Vec<UserLeaderboardEntry>, AppError> {
        let t = self.tables.lock().await;
        let mut users: Vec<&User> = t.users.iter().filter(|u| t.user_in_scope(u, scope)).collect();
        users.sort_by(|a, b| b.points.cmp(&a.points).then(a.id.cmp(&b.id)));
        Ok(users
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|u| UserLeaderboardEntry {
                rank: 0,
                user_id: u.id,
                name: u.name.clone(),
                points: u.points,
                school_id: u.school_id,
                school_name: u
                    .school_id
                    .and_then(|id| t.schools.iter().find(|s| s.id == id))
                    .map(|s| s.name.clone()),
            })
            .collect())
    }

    async fn count_schools(&self, scope: &RankScope) -> Result<i64, AppError> {
        let t = self.tables.lock().await;
        Ok(t.schools.iter().filter(|s| school_in_scope(s, scope)).count() as i64)
    }

    async fn count_schools_above(&self, scope: &RankScope, points: i64) -> Result<i64, AppError> {
        let t = self.tables.lock().await;
        Ok(t.schools
            .iter()
            .filter(|s| s.total_points > points && school_in_scope(s, scope))
            .count() as i64)
    }

    async fn top_schools(
        &self,
        scope: &RankScope,
        limit: i64,
    ) -> Result<Vec<SchoolLeaderboardEntry>, AppError> {
        let t = self.tables.lock().await;
        let mut schools: Vec<&School> =
            t.schools.iter().filter(|s| school_in_scope(s, scope)).collect();
        schools.sort_by(|a, b| b.total_points.cmp(&a.total_points).then(a.id.cmp(&b.id)));
        Ok(schools
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|s| SchoolLeaderboardEntry {
                rank: 0,
                school_id: s.id,
                name: s.name.clone(),
                city: s.city.clone(),
                district: s.district.clone(),
                total_points: s.total_points,
                total_students: s.total_students,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::{question::{Audience, Difficulty}, user::UserType};

    fn new_user(email: &str, school_id: Option<i64>) -> NewUser {
        NewUser {
            name: "Ayşe".into(),
            email: email.into(),
            password_hash: "hash".into(),
            birth_date: None,
            user_type: UserType::Lise,
            school_id,
            class_label: None,
            gender: None,
            is_admin: false,
        }
    }

    fn school(name: &str) -> SchoolRequest {
        SchoolRequest {
            name: name.into(),
            city: "Ankara".into(),
            district: "Çankaya".into(),
            school_type: "devlet".into(),
            website: None,
            info_link: None,
            map_link: None,
        }
    }

    fn question(category_id: i64) -> NewQuestion {
        NewQuestion {
            question_text: "2 + 2?".into(),
            user_type: Audience::Both,
            category_id,
            difficulty: Difficulty::Orta,
            answers: vec![
                AnswerInput { answer_text: "4".into(), is_correct: true },
                AnswerInput { answer_text: "5".into(), is_correct: false },
            ],
        }
    }

    fn insert(user_id: i64, question_id: i64, points: i64) -> AnswerWrite {
        AnswerWrite::Insert {
            user_id,
            question_id,
            answer_id: None,
            is_correct: points > 0,
            points_earned: points,
            response_time: Some(3.0),
            answered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = MemoryStore::new();
        store.create_user(new_user("a@x.com", None)).await.unwrap();
        let err = store.create_user(new_user("a@x.com", None)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn overwrite_applies_the_difference() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@x.com", None)).await.unwrap();
        let category = store.create_category("Tarih".into(), None).await.unwrap();
        let q = store.create_question(question(category.id)).await.unwrap();

        let first = store.record_answer(insert(user.id, q.question.id, 12)).await.unwrap();
        assert_eq!(first.points_delta, 12);

        let retry = store
            .record_answer(AnswerWrite::Overwrite {
                row_id: first.answer.id,
                user_id: user.id,
                answer_id: q.answers[0].id,
                is_correct: true,
                points_earned: 6,
                response_time: Some(4.0),
            })
            .await
            .unwrap();
        assert_eq!(retry.points_delta, -6);
        assert!(retry.answer.retried);
        assert_eq!(store.get_user(user.id).await.unwrap().unwrap().points, 6);
    }

    #[tokio::test]
    async fn deleting_a_category_takes_points_back() {
        let store = MemoryStore::new();
        let s = store.create_school(school("Fen Lisesi")).await.unwrap();
        let user = store.create_user(new_user("a@x.com", Some(s.id))).await.unwrap();
        let category = store.create_category("Tarih".into(), None).await.unwrap();
        let q = store.create_question(question(category.id)).await.unwrap();
        store.record_answer(insert(user.id, q.question.id, 10)).await.unwrap();

        let report = store.delete_category(category.id).await.unwrap().unwrap();
        assert_eq!(report.affected_school_ids, vec![s.id]);
        assert_eq!(store.get_user(user.id).await.unwrap().unwrap().points, 0);
        assert!(store.get_question(q.question.id).await.unwrap().is_none());
        assert_eq!(store.user_stats(user.id).await.unwrap().unwrap().total_answers, 0);
    }

    #[tokio::test]
    async fn joker_counter_stops_at_the_limit() {
        let store = MemoryStore::new();
        let today = Utc::now().date_naive();
        let activation = JokerActivation {
            user_id: 1,
            category_id: 1,
            question_id: 1,
            kind: JokerKind::FiftyPercent,
            usage_date: today,
            daily_limit: 1,
            used_at: Utc::now(),
        };
        let state = store.consume_joker(activation.clone()).await.unwrap();
        assert_eq!(state.fifty_percent_used, 1);
        assert!(matches!(
            store.consume_joker(activation).await,
            Err(AppError::LimitExceeded(_))
        ));
        assert!(
            store
                .joker_used_since(1, 1, JokerKind::FiftyPercent, Utc::now() - Duration::minutes(1))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn user_scope_follows_the_school() {
        let store = MemoryStore::new();
        let s = store.create_school(school("Fen Lisesi")).await.unwrap();
        store.create_user(new_user("a@x.com", Some(s.id))).await.unwrap();
        store.create_user(new_user("b@x.com", None)).await.unwrap();

        assert_eq!(store.count_users(&RankScope::Nation).await.unwrap(), 2);
        assert_eq!(
            store.count_users(&RankScope::City("Ankara".into())).await.unwrap(),
            1
        );
        assert_eq!(store.count_users(&RankScope::School(s.id)).await.unwrap(), 1);
    }
}
