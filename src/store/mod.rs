// src/store/mod.rs

//! Persistence behind a single capability trait.
//!
//! `PgStore` backs production deployments; `MemoryStore` serves tests and
//! single-process demos. The backend is chosen from `Config::storage` at startup.

pub mod loader;
pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    exam_session::{ExamSession, SessionDetail, UserAnswer},
    question::{PoolSummary, QuestionId, QuestionPool},
    stats::AttemptStats,
    user::User,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Shared handle stored in the application state.
pub type DynStore = Arc<dyn Store>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("invalid data: {0}")]
    Invalid(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Pools ordered by creation.
    async fn list_pools(&self) -> Result<Vec<PoolSummary>, StoreError>;

    async fn get_pool(&self, name: &str) -> Result<Option<QuestionPool>, StoreError>;

    /// Inserts the pool or replaces its questions. Attempt stats are kept.
    async fn save_pool(&self, pool: &QuestionPool) -> Result<(), StoreError>;

    async fn get_stats(
        &self,
        user_id: Uuid,
        pool: &str,
        question_id: &QuestionId,
    ) -> Result<Option<AttemptStats>, StoreError>;

    /// Every stats row of the user for one pool.
    async fn list_stats(&self, user_id: Uuid, pool: &str) -> Result<Vec<AttemptStats>, StoreError>;

    /// Fails with `Conflict` when the username is taken.
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, StoreError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn create_session(&self, session: &ExamSession) -> Result<(), StoreError>;

    /// Only returns sessions owned by `user_id`.
    async fn get_session(&self, user_id: Uuid, session_id: Uuid) -> Result<Option<SessionDetail>, StoreError>;

    /// Newest first.
    async fn list_sessions(&self, user_id: Uuid, pool: Option<&str>) -> Result<Vec<SessionDetail>, StoreError>;

    async fn count_finished_sessions(&self, user_id: Uuid, pool: &str) -> Result<i64, StoreError>;

    /// Locks the session for submission.
    ///
    /// Fails with `NotFound` if the session does not exist or belongs to someone
    /// else, and with `Conflict` if it has already been submitted. Nothing is
    /// written until `Submission::commit` succeeds.
    async fn begin_submission(&self, user_id: Uuid, session_id: Uuid) -> Result<Box<dyn Submission>, StoreError>;

    /// Deletes the session and its answers, then recomputes the user's stats
    /// for the session's questions from the remaining answers.
    async fn delete_session(&self, user_id: Uuid, session_id: Uuid) -> Result<(), StoreError>;
}

/// All-or-nothing unit of work for one exam submission.
#[async_trait]
pub trait Submission: Send {
    /// The locked, not yet finalized session.
    fn session(&self) -> &ExamSession;

    async fn record_answer(&mut self, answer: &UserAnswer) -> Result<(), StoreError>;

    /// Adds one correct or incorrect attempt and returns the updated row.
    async fn upsert_stats(
        &mut self,
        question_id: &QuestionId,
        correct: bool,
        at: DateTime<Utc>,
    ) -> Result<AttemptStats, StoreError>;

    /// Finalizes the session and makes every staged write visible.
    async fn commit(
        self: Box<Self>,
        end_time: DateTime<Utc>,
        score: i32,
        total_questions: i32,
    ) -> Result<ExamSession, StoreError>;
}
