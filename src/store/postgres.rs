// src/store/postgres.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use crate::{
    error::AppError,
    models::{
        category::Category,
        joker::{DailyJokerState, JokerActivation, JokerKind},
        question::{Answer, AnswerInput, NewQuestion, Question, QuestionDetail, QuestionFilter},
        ranking::{RankScope, SchoolLeaderboardEntry, UserLeaderboardEntry},
        school::{School, SchoolFilter, SchoolRequest},
        user::{NewUser, UpdateProfileRequest, User, UserStats},
        user_answer::{AnswerWrite, RecordedAnswer, UserAnswer},
    },
    store::{DeletionReport, QuizStore},
};

const USER_COLUMNS: &str = "id, name, email, password, birth_date, user_type, school_id, \
     class_label, gender, points, is_admin, created_at, last_login_at";

const SCHOOL_COLUMNS: &str = "id, name, city, district, school_type, website, info_link, \
     map_link, total_points, total_students, created_at";

const QUESTION_COLUMNS: &str =
    "id, question_text, user_type, category_id, difficulty, points, created_at";

const ANSWER_COLUMNS: &str = "id, question_id, answer_text, is_correct";

const USER_ANSWER_COLUMNS: &str = "id, user_id, question_id, answer_id, is_correct, \
     points_earned, response_time, answered_at, retried";

const JOKER_STATE_COLUMNS: &str =
    "id, user_id, category_id, usage_date, double_answer_used, fifty_percent_used";

/// Postgres-backed store. Multi-table writes run in one transaction each.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn answers_for(&self, question_ids: &[i64]) -> Result<Vec<Answer>, AppError> {
        let sql = format!(
            "SELECT {ANSWER_COLUMNS} FROM answers WHERE question_id = ANY($1) ORDER BY id"
        );
        let answers = sqlx::query_as::<_, Answer>(&sql)
            .bind(question_ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        Ok(answers)
    }
}

async fn insert_answers(
    conn: &mut PgConnection,
    question_id: i64,
    answers: &[AnswerInput],
) -> Result<Vec<Answer>, AppError> {
    let sql = format!(
        "INSERT INTO answers (question_id, answer_text, is_correct) VALUES ($1, $2, $3) \
         RETURNING {ANSWER_COLUMNS}"
    );
    let mut inserted = Vec::with_capacity(answers.len());
    for answer in answers {
        let row = sqlx::query_as::<_, Answer>(&sql)
            .bind(question_id)
            .bind(&answer.answer_text)
            .bind(answer.is_correct)
            .fetch_one(&mut *conn)
            .await?;
        inserted.push(row);
    }
    Ok(inserted)
}

/// Deducts the points of every answer to `question_ids` from its user and
/// returns the schools of the affected users.
async fn take_back_points(
    conn: &mut PgConnection,
    question_ids: &[i64],
) -> Result<Vec<i64>, AppError> {
    let schools: Vec<Option<i64>> = sqlx::query_scalar(
        r#"
        UPDATE users u
        SET points = GREATEST(u.points - sub.total, 0)
        FROM (
            SELECT user_id, SUM(points_earned)::BIGINT AS total
            FROM user_answers
            WHERE question_id = ANY($1)
            GROUP BY user_id
        ) sub
        WHERE u.id = sub.user_id AND sub.total > 0
        RETURNING u.school_id
        "#,
    )
    .bind(question_ids.to_vec())
    .fetch_all(&mut *conn)
    .await?;

    let mut ids: Vec<i64> = schools.into_iter().flatten().collect();
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

/// Deletes the dependents of `question_ids` in foreign-key order, then the questions.
async fn delete_questions(conn: &mut PgConnection, question_ids: &[i64]) -> Result<(), AppError> {
    let ids = question_ids.to_vec();
    sqlx::query("DELETE FROM joker_usage_logs WHERE question_id = ANY($1)")
        .bind(&ids)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM user_answers WHERE question_id = ANY($1)")
        .bind(&ids)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM answers WHERE question_id = ANY($1)")
        .bind(&ids)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM questions WHERE id = ANY($1)")
        .bind(&ids)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn push_question_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &QuestionFilter) {
    builder.push(" WHERE TRUE");
    if let Some(audience) = filter.user_type {
        builder.push(" AND (user_type = ");
        builder.push_bind(audience.as_str());
        builder.push(" OR user_type = 'both')");
    }
    if let Some(category_id) = filter.category_id {
        builder.push(" AND category_id = ");
        builder.push_bind(category_id);
    }
    if let Some(difficulty) = filter.difficulty {
        builder.push(" AND difficulty = ");
        builder.push_bind(difficulty.as_str());
    }
}

/// Users are scoped through their school; `s` must be joined.
fn push_user_scope(builder: &mut QueryBuilder<'_, Postgres>, scope: &RankScope) {
    match scope {
        RankScope::Nation => {}
        RankScope::City(city) => {
            builder.push(" AND s.city = ");
            builder.push_bind(city.clone());
        }
        RankScope::District { city, district } => {
            builder.push(" AND s.city = ");
            builder.push_bind(city.clone());
            builder.push(" AND s.district = ");
            builder.push_bind(district.clone());
        }
        RankScope::School(school_id) => {
            builder.push(" AND u.school_id = ");
            builder.push_bind(*school_id);
        }
    }
}

fn push_school_scope(builder: &mut QueryBuilder<'_, Postgres>, scope: &RankScope) {
    match scope {
        RankScope::Nation => {}
        RankScope::City(city) => {
            builder.push(" AND s.city = ");
            builder.push_bind(city.clone());
        }
        RankScope::District { city, district } => {
            builder.push(" AND s.city = ");
            builder.push_bind(city.clone());
            builder.push(" AND s.district = ");
            builder.push_bind(district.clone());
        }
        RankScope::School(school_id) => {
            builder.push(" AND s.id = ");
            builder.push_bind(*school_id);
        }
    }
}

#[async_trait]
impl QuizStore for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let sql = format!(
            r#"
            INSERT INTO users
            (name, email, password, birth_date, user_type, school_id, class_label, gender, is_admin)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {USER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.birth_date)
            .bind(user.user_type.as_str())
            .bind(user.school_id)
            .bind(&user.class_label)
            .bind(&user.gender)
            .bind(user.is_admin)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict(_) => {
                    AppError::Conflict(format!("Email '{}' is already registered", user.email))
                }
                other => other,
            })
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_users(&self, limit: i64, offset: i64) -> Result<(Vec<User>, i64), AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id DESC LIMIT $1 OFFSET $2");
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok((users, total))
    }

    async fn update_user(
        &self,
        id: i64,
        changes: UpdateProfileRequest,
    ) -> Result<Option<User>, AppError> {
        if changes.is_empty() {
            return self.get_user(id).await;
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET ");
        let mut separated = builder.separated(", ");

        if let Some(name) = changes.name {
            separated.push("name = ");
            separated.push_bind_unseparated(name);
        }
        if let Some(birth_date) = changes.birth_date {
            separated.push("birth_date = ");
            separated.push_bind_unseparated(birth_date);
        }
        if let Some(user_type) = changes.user_type {
            separated.push("user_type = ");
            separated.push_bind_unseparated(user_type.as_str());
        }
        if let Some(school_id) = changes.school_id {
            separated.push("school_id = ");
            separated.push_bind_unseparated(school_id);
        }
        if let Some(class_label) = changes.class_label {
            separated.push("class_label = ");
            separated.push_bind_unseparated(class_label);
        }
        if let Some(gender) = changes.gender {
            separated.push("gender = ");
            separated.push_bind_unseparated(gender);
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(" RETURNING ");
        builder.push(USER_COLUMNS);

        Ok(builder
            .build_query_as::<User>()
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn touch_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login_at = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE");
        let Some(user) = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM joker_usage_logs WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM daily_joker_states WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM user_answers WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(user))
    }

    async fn resync_user_points(&self, id: i64) -> Result<Option<i64>, AppError> {
        Ok(sqlx::query_scalar(
            r#"
            UPDATE users
            SET points = (
                SELECT COALESCE(SUM(points_earned), 0)::BIGINT
                FROM user_answers
                WHERE user_id = $1
            )
            WHERE id = $1
            RETURNING points
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn user_stats(&self, id: i64) -> Result<Option<UserStats>, AppError> {
        let row: Option<(i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT
                u.points,
                (SELECT COUNT(*) FROM user_answers ua WHERE ua.user_id = u.id),
                (SELECT COUNT(*) FROM user_answers ua WHERE ua.user_id = u.id AND ua.is_correct)
            FROM users u
            WHERE u.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(points, total, correct)| UserStats::new(total, correct, points)))
    }

    async fn create_school(&self, school: SchoolRequest) -> Result<School, AppError> {
        let sql = format!(
            r#"
            INSERT INTO schools
            (name, city, district, school_type, website, info_link, map_link)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {SCHOOL_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, School>(&sql)
            .bind(school.name)
            .bind(school.city)
            .bind(school.district)
            .bind(school.school_type)
            .bind(school.website)
            .bind(school.info_link)
            .bind(school.map_link)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_school(
        &self,
        id: i64,
        school: SchoolRequest,
    ) -> Result<Option<School>, AppError> {
        let sql = format!(
            r#"
            UPDATE schools
            SET name = $2, city = $3, district = $4, school_type = $5,
                website = $6, info_link = $7, map_link = $8
            WHERE id = $1
            RETURNING {SCHOOL_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, School>(&sql)
            .bind(id)
            .bind(school.name)
            .bind(school.city)
            .bind(school.district)
            .bind(school.school_type)
            .bind(school.website)
            .bind(school.info_link)
            .bind(school.map_link)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_school(&self, id: i64) -> Result<Option<School>, AppError> {
        let sql = format!("SELECT {SCHOOL_COLUMNS} FROM schools WHERE id = $1");
        Ok(sqlx::query_as::<_, School>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_schools(&self, filter: &SchoolFilter) -> Result<Vec<School>, AppError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
        builder.push(SCHOOL_COLUMNS);
        builder.push(" FROM schools WHERE TRUE");
        if let Some(city) = &filter.city {
            builder.push(" AND city = ");
            builder.push_bind(city.clone());
        }
        if let Some(district) = &filter.district {
            builder.push(" AND district = ");
            builder.push_bind(district.clone());
        }
        if let Some(school_type) = &filter.school_type {
            builder.push(" AND school_type = ");
            builder.push_bind(school_type.clone());
        }
        builder.push(" ORDER BY name, id");

        Ok(builder
            .build_query_as::<School>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn refresh_school_totals(&self, id: i64) -> Result<Option<School>, AppError> {
        let sql = format!(
            r#"
            UPDATE schools s
            SET total_points = (
                    SELECT COALESCE(SUM(u.points), 0)::BIGINT FROM users u WHERE u.school_id = s.id
                ),
                total_students = (
                    SELECT COUNT(*) FROM users u WHERE u.school_id = s.id
                )
            WHERE s.id = $1
            RETURNING {SCHOOL_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, School>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_category(
        &self,
        name: String,
        description: Option<String>,
    ) -> Result<Category, AppError> {
        sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (name, description)
            VALUES ($1, $2)
            RETURNING id, name, description, created_at
            "#,
        )
        .bind(&name)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict(format!("Category '{}' already exists", name)),
            other => other,
        })
    }

    async fn update_category(
        &self,
        id: i64,
        name: String,
        description: Option<String>,
    ) -> Result<Option<Category>, AppError> {
        sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories SET name = $2, description = $3
            WHERE id = $1
            RETURNING id, name, description, created_at
            "#,
        )
        .bind(id)
        .bind(&name)
        .bind(description)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict(format!("Category '{}' already exists", name)),
            other => other,
        })
    }

    async fn get_category(&self, id: i64) -> Result<Option<Category>, AppError> {
        Ok(sqlx::query_as::<_, Category>(
            "SELECT id, name, description, created_at FROM categories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, AppError> {
        Ok(sqlx::query_as::<_, Category>(
            "SELECT id, name, description, created_at FROM categories ORDER BY name, id",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn delete_category(&self, id: i64) -> Result<Option<DeletionReport>, AppError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM categories WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let question_ids: Vec<i64> =
            sqlx::query_scalar("SELECT id FROM questions WHERE category_id = $1")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        let affected_school_ids = take_back_points(&mut tx, &question_ids).await?;
        delete_questions(&mut tx, &question_ids).await?;

        sqlx::query("DELETE FROM joker_usage_logs WHERE category_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM daily_joker_states WHERE category_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(DeletionReport {
            affected_school_ids,
        }))
    }

    async fn create_question(&self, question: NewQuestion) -> Result<QuestionDetail, AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO questions (question_text, user_type, category_id, difficulty, points)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {QUESTION_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Question>(&sql)
            .bind(&question.question_text)
            .bind(question.user_type.as_str())
            .bind(question.category_id)
            .bind(question.difficulty.as_str())
            .bind(question.difficulty.points())
            .fetch_one(&mut *tx)
            .await?;

        let answers = insert_answers(&mut tx, row.id, &question.answers).await?;

        tx.commit().await?;
        Ok(QuestionDetail {
            question: row,
            answers,
        })
    }

    async fn get_question(&self, id: i64) -> Result<Option<QuestionDetail>, AppError> {
        let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1");
        let Some(question) = sqlx::query_as::<_, Question>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let answers = self.answers_for(&[id]).await?;
        Ok(Some(QuestionDetail { question, answers }))
    }

    async fn list_questions(
        &self,
        filter: &QuestionFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Question>, i64), AppError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
        builder.push(QUESTION_COLUMNS);
        builder.push(" FROM questions");
        push_question_filters(&mut builder, filter);
        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let items = builder
            .build_query_as::<Question>()
            .fetch_all(&self.pool)
            .await?;

        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM questions");
        push_question_filters(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        Ok((items, total))
    }

    async fn update_question(
        &self,
        id: i64,
        question: NewQuestion,
    ) -> Result<Option<QuestionDetail>, AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE questions
            SET question_text = $2, user_type = $3, category_id = $4, difficulty = $5, points = $6
            WHERE id = $1
            RETURNING {QUESTION_COLUMNS}
            "#
        );
        let Some(row) = sqlx::query_as::<_, Question>(&sql)
            .bind(id)
            .bind(&question.question_text)
            .bind(question.user_type.as_str())
            .bind(question.category_id)
            .bind(question.difficulty.as_str())
            .bind(question.difficulty.points())
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        // Past submissions keep their outcome but lose the link to the replaced option.
        sqlx::query("UPDATE user_answers SET answer_id = NULL WHERE question_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM answers WHERE question_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let answers = insert_answers(&mut tx, id, &question.answers).await?;

        tx.commit().await?;
        Ok(Some(QuestionDetail {
            question: row,
            answers,
        }))
    }

    async fn delete_question(&self, id: i64) -> Result<Option<DeletionReport>, AppError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM questions WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let affected_school_ids = take_back_points(&mut tx, &[id]).await?;
        delete_questions(&mut tx, &[id]).await?;

        tx.commit().await?;
        Ok(Some(DeletionReport {
            affected_school_ids,
        }))
    }

    async fn question_ids_in_category(&self, category_id: i64) -> Result<Vec<i64>, AppError> {
        Ok(
            sqlx::query_scalar("SELECT id FROM questions WHERE category_id = $1 ORDER BY id")
                .bind(category_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn questions_by_ids(&self, ids: &[i64]) -> Result<Vec<QuestionDetail>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id = ANY($1)");
        let questions = sqlx::query_as::<_, Question>(&sql)
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        let mut by_question: HashMap<i64, Vec<Answer>> = HashMap::new();
        for answer in self.answers_for(ids).await? {
            by_question.entry(answer.question_id).or_default().push(answer);
        }

        let mut details: Vec<QuestionDetail> = questions
            .into_iter()
            .map(|question| QuestionDetail {
                answers: by_question.remove(&question.id).unwrap_or_default(),
                question,
            })
            .collect();

        details.sort_by_key(|d| ids.iter().position(|id| *id == d.question.id));
        Ok(details)
    }

    async fn count_answers_since(
        &self,
        user_id: i64,
        category_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM user_answers ua
            JOIN questions q ON q.id = ua.question_id
            WHERE ua.user_id = $1 AND q.category_id = $2 AND ua.answered_at >= $3
            "#,
        )
        .bind(user_id)
        .bind(category_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn answered_question_ids_since(
        &self,
        user_id: i64,
        category_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<i64>, AppError> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT DISTINCT ua.question_id
            FROM user_answers ua
            JOIN questions q ON q.id = ua.question_id
            WHERE ua.user_id = $1 AND q.category_id = $2 AND ua.answered_at >= $3
            ORDER BY ua.question_id
            "#,
        )
        .bind(user_id)
        .bind(category_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn user_answers_for_question(
        &self,
        user_id: i64,
        question_id: i64,
    ) -> Result<Vec<UserAnswer>, AppError> {
        let sql = format!(
            "SELECT {USER_ANSWER_COLUMNS} FROM user_answers \
             WHERE user_id = $1 AND question_id = $2 ORDER BY id"
        );
        Ok(sqlx::query_as::<_, UserAnswer>(&sql)
            .bind(user_id)
            .bind(question_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn record_answer(&self, write: AnswerWrite) -> Result<RecordedAnswer, AppError> {
        let mut tx = self.pool.begin().await?;

        // Serializes point mutations per user.
        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(write.user_id())
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
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
                let sql = format!(
                    r#"
                    INSERT INTO user_answers
                    (user_id, question_id, answer_id, is_correct, points_earned, response_time, answered_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    RETURNING {USER_ANSWER_COLUMNS}
                    "#
                );
                let answer = sqlx::query_as::<_, UserAnswer>(&sql)
                    .bind(user_id)
                    .bind(question_id)
                    .bind(answer_id)
                    .bind(is_correct)
                    .bind(points_earned)
                    .bind(response_time)
                    .bind(answered_at)
                    .fetch_one(&mut *tx)
                    .await?;

                let points_delta = points_earned.max(0);
                if points_delta > 0 {
                    sqlx::query("UPDATE users SET points = points + $1 WHERE id = $2")
                        .bind(points_delta)
                        .bind(user_id)
                        .execute(&mut *tx)
                        .await?;
                }
                RecordedAnswer {
                    answer,
                    points_delta,
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
                let previous: Option<(i64, bool)> = sqlx::query_as(
                    "SELECT points_earned, retried FROM user_answers \
                     WHERE id = $1 AND user_id = $2 FOR UPDATE",
                )
                .bind(row_id)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
                let (previous, retried) =
                    previous.ok_or_else(|| AppError::NotFound("Answer record not found".to_string()))?;
                if retried {
                    return Err(AppError::Conflict(
                        "Double answer retry already used".to_string(),
                    ));
                }

                let sql = format!(
                    r#"
                    UPDATE user_answers
                    SET answer_id = $2, is_correct = $3, points_earned = $4, response_time = $5,
                        retried = TRUE
                    WHERE id = $1
                    RETURNING {USER_ANSWER_COLUMNS}
                    "#
                );
                let answer = sqlx::query_as::<_, UserAnswer>(&sql)
                    .bind(row_id)
                    .bind(answer_id)
                    .bind(is_correct)
                    .bind(points_earned)
                    .bind(response_time)
                    .fetch_one(&mut *tx)
                    .await?;

                let points_delta = points_earned - previous;
                if points_delta != 0 {
                    sqlx::query("UPDATE users SET points = GREATEST(points + $1, 0) WHERE id = $2")
                        .bind(points_delta)
                        .bind(user_id)
                        .execute(&mut *tx)
                        .await?;
                }
                RecordedAnswer {
                    answer,
                    points_delta,
                }
            }
        };

        tx.commit().await?;
        Ok(recorded)
    }

    async fn joker_state(
        &self,
        user_id: i64,
        category_id: i64,
        date: NaiveDate,
    ) -> Result<DailyJokerState, AppError> {
        sqlx::query(
            r#"
            INSERT INTO daily_joker_states (user_id, category_id, usage_date)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, category_id, usage_date) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(category_id)
        .bind(date)
        .execute(&self.pool)
        .await?;

        let sql = format!(
            "SELECT {JOKER_STATE_COLUMNS} FROM daily_joker_states \
             WHERE user_id = $1 AND category_id = $2 AND usage_date = $3"
        );
        Ok(sqlx::query_as::<_, DailyJokerState>(&sql)
            .bind(user_id)
            .bind(category_id)
            .bind(date)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn consume_joker(
        &self,
        activation: JokerActivation,
    ) -> Result<DailyJokerState, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO daily_joker_states (user_id, category_id, usage_date)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, category_id, usage_date) DO NOTHING
            "#,
        )
        .bind(activation.user_id)
        .bind(activation.category_id)
        .bind(activation.usage_date)
        .execute(&mut *tx)
        .await?;

        let sql = format!(
            "SELECT {JOKER_STATE_COLUMNS} FROM daily_joker_states \
             WHERE user_id = $1 AND category_id = $2 AND usage_date = $3 FOR UPDATE"
        );
        let state = sqlx::query_as::<_, DailyJokerState>(&sql)
            .bind(activation.user_id)
            .bind(activation.category_id)
            .bind(activation.usage_date)
            .fetch_one(&mut *tx)
            .await?;

        if state.used(activation.kind) >= activation.daily_limit {
            return Err(AppError::LimitExceeded(format!(
                "Daily {} joker limit reached",
                activation.kind.as_str()
            )));
        }

        let column = match activation.kind {
            JokerKind::DoubleAnswer => "double_answer_used",
            JokerKind::FiftyPercent => "fifty_percent_used",
        };
        let sql = format!(
            "UPDATE daily_joker_states SET {column} = {column} + 1 WHERE id = $1 \
             RETURNING {JOKER_STATE_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, DailyJokerState>(&sql)
            .bind(state.id)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO joker_usage_logs (user_id, category_id, question_id, joker_type, used_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(activation.user_id)
        .bind(activation.category_id)
        .bind(activation.question_id)
        .bind(activation.kind.as_str())
        .bind(activation.used_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn joker_used_since(
        &self,
        user_id: i64,
        question_id: i64,
        kind: JokerKind,
        since: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM joker_usage_logs
                WHERE user_id = $1 AND question_id = $2 AND joker_type = $3 AND used_at >= $4
            )
            "#,
        )
        .bind(user_id)
        .bind(question_id)
        .bind(kind.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn count_users(&self, scope: &RankScope) -> Result<i64, AppError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) FROM users u LEFT JOIN schools s ON s.id = u.school_id WHERE TRUE",
        );
        push_user_scope(&mut builder, scope);
        Ok(builder.build_query_scalar().fetch_one(&self.pool).await?)
    }

    async fn count_users_above(&self, scope: &RankScope, points: i64) -> Result<i64, AppError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COUNT(*) FROM users u LEFT JOIN schools s ON s.id = u.school_id WHERE u.points > ",
        );
        builder.push_bind(points);
        push_user_scope(&mut builder, scope);
        Ok(builder.build_query_scalar().fetch_one(&self.pool).await?)
    }

    async fn top_users(
        &self,
        scope: &RankScope,
        limit: i64,
    ) -> Result<Vec<UserLeaderboardEntry>, AppError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT u.id AS user_id, u.name, u.points, u.school_id, s.name AS school_name
            FROM users u
            LEFT JOIN schools s ON s.id = u.school_id
            WHERE TRUE"#,
        );
        push_user_scope(&mut builder, scope);
        builder.push(" ORDER BY u.points DESC, u.id ASC LIMIT ");
        builder.push_bind(limit);

        Ok(builder
            .build_query_as::<UserLeaderboardEntry>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_schools(&self, scope: &RankScope) -> Result<i64, AppError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM schools s WHERE TRUE");
        push_school_scope(&mut builder, scope);
        Ok(builder.build_query_scalar().fetch_one(&self.pool).await?)
    }

    async fn count_schools_above(&self, scope: &RankScope, points: i64) -> Result<i64, AppError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM schools s WHERE s.total_points > ");
        builder.push_bind(points);
        push_school_scope(&mut builder, scope);
        Ok(builder.build_query_scalar().fetch_one(&self.pool).await?)
    }

    async fn top_schools(
        &self,
        scope: &RankScope,
        limit: i64,
    ) -> Result<Vec<SchoolLeaderboardEntry>, AppError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            r#"
            SELECT s.id AS school_id, s.name, s.city, s.district, s.total_points, s.total_students
            FROM schools s
            WHERE TRUE"#,
        );
        push_school_scope(&mut builder, scope);
        builder.push(" ORDER BY s.total_points DESC, s.id ASC LIMIT ");
        builder.push_bind(limit);

        Ok(builder
            .build_query_as::<SchoolLeaderboardEntry>()
            .fetch_all(&self.pool)
            .await?)
    }
}
