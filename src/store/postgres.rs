// src/store/postgres.rs

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    FromRow, PgPool, Postgres, Transaction,
    postgres::PgPoolOptions,
};
use uuid::Uuid;

use super::{Store, StoreError, Submission};
use crate::engine::selection::SelectionMode;
use crate::models::{
    exam_session::{ExamSession, SessionDetail, UserAnswer},
    question::{Answer, AnswerId, PoolSummary, Question, QuestionId, QuestionPool},
    stats::AttemptStats,
    user::User,
};

const CONNECT_RETRIES: u32 = 5;

const SESSION_COLUMNS: &str = r#"
    id, user_id, pool_name, mode, question_count, selected_count, time_limit,
    question_ids, start_time, end_time, score, total_questions
"#;

const STATS_COLUMNS: &str =
    "user_id, pool_name, question_id, count_correct, count_incorrect, last_attempted_at";

#[derive(FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    pool_name: String,
    mode: String,
    question_count: i32,
    selected_count: i32,
    time_limit: i32,
    question_ids: Vec<String>,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    score: Option<i32>,
    total_questions: Option<i32>,
}

impl TryFrom<SessionRow> for ExamSession {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let mode = SelectionMode::parse(&row.mode)
            .ok_or_else(|| StoreError::Invalid(format!("unknown selection mode '{}'", row.mode)))?;

        Ok(ExamSession {
            id: row.id,
            user_id: row.user_id,
            question_pool: row.pool_name,
            mode,
            question_count: row.question_count,
            selected_count: row.selected_count,
            time_limit: row.time_limit,
            question_ids: row.question_ids.into_iter().map(QuestionId).collect(),
            start_time: row.start_time,
            end_time: row.end_time,
            score: row.score,
            total_questions: row.total_questions,
        })
    }
}

#[derive(FromRow)]
struct UserAnswerRow {
    id: Uuid,
    session_id: Uuid,
    question_id: String,
    answer_ids: Vec<String>,
    is_correct: bool,
    created_at: DateTime<Utc>,
}

impl From<UserAnswerRow> for UserAnswer {
    fn from(row: UserAnswerRow) -> Self {
        UserAnswer {
            id: row.id,
            session_id: row.session_id,
            question_id: QuestionId(row.question_id),
            answer_ids: row.answer_ids.into_iter().map(AnswerId).collect(),
            is_correct: row.is_correct,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct StatsRow {
    user_id: Uuid,
    pool_name: String,
    question_id: String,
    count_correct: i32,
    count_incorrect: i32,
    last_attempted_at: Option<DateTime<Utc>>,
}

impl From<StatsRow> for AttemptStats {
    fn from(row: StatsRow) -> Self {
        AttemptStats {
            user_id: row.user_id,
            question_pool: row.pool_name,
            question_id: QuestionId(row.question_id),
            count_correct: row.count_correct,
            count_incorrect: row.count_incorrect,
            last_attempted_at: row.last_attempted_at,
        }
    }
}

#[derive(FromRow)]
struct PoolRow {
    name: String,
    description: Option<String>,
}

#[derive(FromRow)]
struct PoolSummaryRow {
    name: String,
    description: Option<String>,
    question_count: i64,
}

#[derive(FromRow)]
struct QuestionRow {
    id: String,
    content: String,
    explanation: Option<String>,
}

#[derive(FromRow)]
struct AnswerRow {
    question_id: String,
    id: String,
    content: String,
    is_correct: bool,
}

/// Tally recomputed from the remaining answers after a session is deleted.
#[derive(FromRow)]
struct RecountRow {
    count_correct: i64,
    count_incorrect: i64,
    last_attempted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects with retry, then applies pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let mut retry_count = 0;
        let pool = loop {
            match PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(3))
                .connect(database_url)
                .await
            {
                Ok(pool) => break pool,
                Err(e) => {
                    retry_count += 1;
                    if retry_count > CONNECT_RETRIES {
                        tracing::error!("Failed to connect to database after {} retries", CONNECT_RETRIES);
                        return Err(e.into());
                    }
                    tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        };

        tracing::info!("Database connected, running migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Migrations applied successfully.");

        Ok(Self::new(pool))
    }

    async fn answers_for(&self, session_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<UserAnswer>>, StoreError> {
        let rows = sqlx::query_as::<_, UserAnswerRow>(
            r#"
            SELECT id, session_id, question_id, answer_ids, is_correct, created_at
            FROM user_answers
            WHERE session_id = ANY($1)
            ORDER BY created_at, id
            "#,
        )
        .bind(session_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<UserAnswer>> = HashMap::new();
        for row in rows {
            grouped.entry(row.session_id).or_default().push(row.into());
        }
        Ok(grouped)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

async fn lock_session(
    tx: &mut Transaction<'static, Postgres>,
    user_id: Uuid,
    session_id: Uuid,
) -> Result<ExamSession, StoreError> {
    let row = sqlx::query_as::<_, SessionRow>(&format!(
        "SELECT {} FROM exam_sessions WHERE id = $1 AND user_id = $2 FOR UPDATE",
        SESSION_COLUMNS
    ))
    .bind(session_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| StoreError::NotFound("Session".to_string()))?;

    row.try_into()
}

#[async_trait]
impl Store for PgStore {
    async fn list_pools(&self) -> Result<Vec<PoolSummary>, StoreError> {
        let rows = sqlx::query_as::<_, PoolSummaryRow>(
            r#"
            SELECT p.name, p.description, COUNT(q.id) AS question_count
            FROM question_pools p
            LEFT JOIN questions q ON q.pool_name = p.name
            GROUP BY p.name, p.description, p.created_at
            ORDER BY p.created_at, p.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| PoolSummary {
                name: r.name,
                description: r.description,
                question_count: r.question_count,
            })
            .collect())
    }

    async fn get_pool(&self, name: &str) -> Result<Option<QuestionPool>, StoreError> {
        let Some(pool_row) = sqlx::query_as::<_, PoolRow>(
            "SELECT name, description FROM question_pools WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let questions = sqlx::query_as::<_, QuestionRow>(
            "SELECT id, content, explanation FROM questions WHERE pool_name = $1 ORDER BY position",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        let answers = sqlx::query_as::<_, AnswerRow>(
            r#"
            SELECT question_id, id, content, is_correct
            FROM answers
            WHERE pool_name = $1
            ORDER BY question_id, position
            "#,
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        let mut by_question: HashMap<String, Vec<Answer>> = HashMap::new();
        for a in answers {
            by_question.entry(a.question_id).or_default().push(Answer {
                id: AnswerId(a.id),
                content: a.content,
                is_correct: a.is_correct,
            });
        }

        Ok(Some(QuestionPool {
            name: pool_row.name,
            description: pool_row.description,
            questions: questions
                .into_iter()
                .map(|q| Question {
                    answers: by_question.remove(&q.id).unwrap_or_default(),
                    id: QuestionId(q.id),
                    content: q.content,
                    explanation: q.explanation,
                })
                .collect(),
        }))
    }

    async fn save_pool(&self, pool: &QuestionPool) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO question_pools (name, description)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET description = EXCLUDED.description
            "#,
        )
        .bind(&pool.name)
        .bind(&pool.description)
        .execute(&mut *tx)
        .await?;

        // Cascades to answers.
        sqlx::query("DELETE FROM questions WHERE pool_name = $1")
            .bind(&pool.name)
            .execute(&mut *tx)
            .await?;

        for (q_pos, question) in pool.questions.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO questions (pool_name, id, position, content, explanation)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(&pool.name)
            .bind(&question.id.0)
            .bind(q_pos as i32)
            .bind(&question.content)
            .bind(&question.explanation)
            .execute(&mut *tx)
            .await?;

            for (a_pos, answer) in question.answers.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO answers (pool_name, question_id, id, position, content, is_correct)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(&pool.name)
                .bind(&question.id.0)
                .bind(&answer.id.0)
                .bind(a_pos as i32)
                .bind(&answer.content)
                .bind(answer.is_correct)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_stats(
        &self,
        user_id: Uuid,
        pool: &str,
        question_id: &QuestionId,
    ) -> Result<Option<AttemptStats>, StoreError> {
        let row = sqlx::query_as::<_, StatsRow>(&format!(
            "SELECT {} FROM question_stats WHERE user_id = $1 AND pool_name = $2 AND question_id = $3",
            STATS_COLUMNS
        ))
        .bind(user_id)
        .bind(pool)
        .bind(&question_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_stats(&self, user_id: Uuid, pool: &str) -> Result<Vec<AttemptStats>, StoreError> {
        let rows = sqlx::query_as::<_, StatsRow>(&format!(
            "SELECT {} FROM question_stats WHERE user_id = $1 AND pool_name = $2 ORDER BY question_id",
            STATS_COLUMNS
        ))
        .bind(user_id)
        .bind(pool)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, password)
            VALUES ($1, $2, $3)
            RETURNING id, username, password, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("Username '{}' already exists", username))
            } else {
                StoreError::from(e)
            }
        })
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_session(&self, session: &ExamSession) -> Result<(), StoreError> {
        let question_ids: Vec<String> = session.question_ids.iter().map(|q| q.0.clone()).collect();

        sqlx::query(
            r#"
            INSERT INTO exam_sessions
                (id, user_id, pool_name, mode, question_count, selected_count, time_limit, question_ids, start_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.question_pool)
        .bind(session.mode.as_str())
        .bind(session.question_count)
        .bind(session.selected_count)
        .bind(session.time_limit)
        .bind(question_ids)
        .bind(session.start_time)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session(&self, user_id: Uuid, session_id: Uuid) -> Result<Option<SessionDetail>, StoreError> {
        let Some(row) = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM exam_sessions WHERE id = $1 AND user_id = $2",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let session = ExamSession::try_from(row)?;
        let mut answers = self.answers_for(&[session.id]).await?;

        Ok(Some(SessionDetail {
            answers: answers.remove(&session.id).unwrap_or_default(),
            session,
        }))
    }

    async fn list_sessions(&self, user_id: Uuid, pool: Option<&str>) -> Result<Vec<SessionDetail>, StoreError> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {}
            FROM exam_sessions
            WHERE user_id = $1 AND ($2::TEXT IS NULL OR pool_name = $2)
            ORDER BY start_time DESC
            "#,
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .bind(pool)
        .fetch_all(&self.pool)
        .await?;

        let sessions = rows
            .into_iter()
            .map(ExamSession::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let ids: Vec<Uuid> = sessions.iter().map(|s| s.id).collect();
        let mut answers = self.answers_for(&ids).await?;

        Ok(sessions
            .into_iter()
            .map(|session| SessionDetail {
                answers: answers.remove(&session.id).unwrap_or_default(),
                session,
            })
            .collect())
    }

    async fn count_finished_sessions(&self, user_id: Uuid, pool: &str) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM exam_sessions
            WHERE user_id = $1 AND pool_name = $2 AND end_time IS NOT NULL
            "#,
        )
        .bind(user_id)
        .bind(pool)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn begin_submission(&self, user_id: Uuid, session_id: Uuid) -> Result<Box<dyn Submission>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let session = lock_session(&mut tx, user_id, session_id).await?;

        if session.is_finalized() {
            return Err(StoreError::Conflict("Session already submitted".to_string()));
        }

        Ok(Box::new(PgSubmission { tx, session }))
    }

    async fn delete_session(&self, user_id: Uuid, session_id: Uuid) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let session = lock_session(&mut tx, user_id, session_id).await?;

        sqlx::query("DELETE FROM user_answers WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM exam_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        for question_id in &session.question_ids {
            let recount = sqlx::query_as::<_, RecountRow>(
                r#"
                SELECT
                    COUNT(*) FILTER (WHERE ua.is_correct) AS count_correct,
                    COUNT(*) FILTER (WHERE NOT ua.is_correct) AS count_incorrect,
                    MAX(ua.created_at) AS last_attempted_at
                FROM user_answers ua
                JOIN exam_sessions s ON s.id = ua.session_id
                WHERE s.user_id = $1 AND s.pool_name = $2 AND ua.question_id = $3
                "#,
            )
            .bind(user_id)
            .bind(&session.question_pool)
            .bind(&question_id.0)
            .fetch_one(&mut *tx)
            .await?;

            if recount.count_correct + recount.count_incorrect > 0 {
                sqlx::query(
                    r#"
                    UPDATE question_stats
                    SET count_correct = $4, count_incorrect = $5, last_attempted_at = $6
                    WHERE user_id = $1 AND pool_name = $2 AND question_id = $3
                    "#,
                )
                .bind(user_id)
                .bind(&session.question_pool)
                .bind(&question_id.0)
                .bind(recount.count_correct as i32)
                .bind(recount.count_incorrect as i32)
                .bind(recount.last_attempted_at)
                .execute(&mut *tx)
                .await?;
            } else {
                sqlx::query(
                    "DELETE FROM question_stats WHERE user_id = $1 AND pool_name = $2 AND question_id = $3",
                )
                .bind(user_id)
                .bind(&session.question_pool)
                .bind(&question_id.0)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Submission unit backed by a transaction holding the session row lock.
/// Dropping it without commit rolls everything back.
struct PgSubmission {
    tx: Transaction<'static, Postgres>,
    session: ExamSession,
}

#[async_trait]
impl Submission for PgSubmission {
    fn session(&self) -> &ExamSession {
        &self.session
    }

    async fn record_answer(&mut self, answer: &UserAnswer) -> Result<(), StoreError> {
        let answer_ids: Vec<String> = answer.answer_ids.iter().map(|a| a.0.clone()).collect();

        sqlx::query(
            r#"
            INSERT INTO user_answers (id, session_id, question_id, answer_ids, is_correct, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(answer.id)
        .bind(answer.session_id)
        .bind(&answer.question_id.0)
        .bind(answer_ids)
        .bind(answer.is_correct)
        .bind(answer.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn upsert_stats(
        &mut self,
        question_id: &QuestionId,
        correct: bool,
        at: DateTime<Utc>,
    ) -> Result<AttemptStats, StoreError> {
        let (inc_correct, inc_incorrect) = if correct { (1, 0) } else { (0, 1) };

        let row = sqlx::query_as::<_, StatsRow>(&format!(
            r#"
            INSERT INTO question_stats
                (user_id, pool_name, question_id, count_correct, count_incorrect, last_attempted_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, pool_name, question_id) DO UPDATE SET
                count_correct = question_stats.count_correct + EXCLUDED.count_correct,
                count_incorrect = question_stats.count_incorrect + EXCLUDED.count_incorrect,
                last_attempted_at = EXCLUDED.last_attempted_at
            RETURNING {}
            "#,
            STATS_COLUMNS
        ))
        .bind(self.session.user_id)
        .bind(&self.session.question_pool)
        .bind(&question_id.0)
        .bind(inc_correct)
        .bind(inc_incorrect)
        .bind(at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.into())
    }

    async fn commit(
        self: Box<Self>,
        end_time: DateTime<Utc>,
        score: i32,
        total_questions: i32,
    ) -> Result<ExamSession, StoreError> {
        let PgSubmission { mut tx, session } = *self;

        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            UPDATE exam_sessions
            SET end_time = $2, score = $3, total_questions = $4
            WHERE id = $1
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(session.id)
        .bind(end_time)
        .bind(score)
        .bind(total_questions)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }
}
