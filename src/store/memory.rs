// src/store/memory.rs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, StoreError, Submission};
use crate::models::{
    exam_session::{ExamSession, SessionDetail, UserAnswer},
    question::{PoolSummary, QuestionId, QuestionPool},
    stats::AttemptStats,
    user::User,
};

type StatsKey = (Uuid, String, QuestionId);

#[derive(Debug, Default)]
struct MemoryState {
    /// Insertion order doubles as creation order.
    pools: Vec<QuestionPool>,
    users: HashMap<Uuid, User>,
    sessions: HashMap<Uuid, ExamSession>,
    answers: Vec<UserAnswer>,
    stats: HashMap<StatsKey, AttemptStats>,
}

impl MemoryState {
    fn owned_session(&self, user_id: Uuid, session_id: Uuid) -> Option<&ExamSession> {
        self.sessions
            .get(&session_id)
            .filter(|s| s.user_id == user_id)
    }

    fn detail(&self, session: &ExamSession) -> SessionDetail {
        SessionDetail {
            session: session.clone(),
            answers: self
                .answers
                .iter()
                .filter(|a| a.session_id == session.id)
                .cloned()
                .collect(),
        }
    }
}

/// Process-local store. One async mutex guards all state, so a submission
/// holding the lock is serialized against every other operation.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_pools(&self) -> Result<Vec<PoolSummary>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .pools
            .iter()
            .map(|p| PoolSummary {
                name: p.name.clone(),
                description: p.description.clone(),
                question_count: p.questions.len() as i64,
            })
            .collect())
    }

    async fn get_pool(&self, name: &str) -> Result<Option<QuestionPool>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.pools.iter().find(|p| p.name == name).cloned())
    }

    async fn save_pool(&self, pool: &QuestionPool) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        match state.pools.iter_mut().find(|p| p.name == pool.name) {
            Some(existing) => *existing = pool.clone(),
            None => state.pools.push(pool.clone()),
        }
        Ok(())
    }

    async fn get_stats(
        &self,
        user_id: Uuid,
        pool: &str,
        question_id: &QuestionId,
    ) -> Result<Option<AttemptStats>, StoreError> {
        let state = self.state.lock().await;
        let key = (user_id, pool.to_owned(), question_id.clone());
        Ok(state.stats.get(&key).cloned())
    }

    async fn list_stats(&self, user_id: Uuid, pool: &str) -> Result<Vec<AttemptStats>, StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<AttemptStats> = state
            .stats
            .values()
            .filter(|s| s.user_id == user_id && s.question_pool == pool)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.question_id.cmp(&b.question_id));
        Ok(rows)
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, StoreError> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.username == username) {
            return Err(StoreError::Conflict(format!(
                "Username '{}' already exists",
                username
            )));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_owned(),
            password: password_hash.to_owned(),
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.username == username).cloned())
    }

    async fn create_session(&self, session: &ExamSession) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, user_id: Uuid, session_id: Uuid) -> Result<Option<SessionDetail>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .owned_session(user_id, session_id)
            .map(|s| state.detail(s)))
    }

    async fn list_sessions(&self, user_id: Uuid, pool: Option<&str>) -> Result<Vec<SessionDetail>, StoreError> {
        let state = self.state.lock().await;
        let mut sessions: Vec<&ExamSession> = state
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .filter(|s| pool.is_none_or(|p| s.question_pool == p))
            .collect();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(sessions.into_iter().map(|s| state.detail(s)).collect())
    }

    async fn count_finished_sessions(&self, user_id: Uuid, pool: &str) -> Result<i64, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.question_pool == pool && s.is_finalized())
            .count() as i64)
    }

    async fn begin_submission(&self, user_id: Uuid, session_id: Uuid) -> Result<Box<dyn Submission>, StoreError> {
        let guard = self.state.clone().lock_owned().await;

        let session = guard
            .owned_session(user_id, session_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("Session".to_string()))?;

        if session.is_finalized() {
            return Err(StoreError::Conflict("Session already submitted".to_string()));
        }

        Ok(Box::new(MemorySubmission {
            guard,
            session,
            answers: Vec::new(),
            stats: HashMap::new(),
        }))
    }

    async fn delete_session(&self, user_id: Uuid, session_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;

        let session = state
            .owned_session(user_id, session_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("Session".to_string()))?;

        state.sessions.remove(&session_id);
        state.answers.retain(|a| a.session_id != session_id);

        for question_id in &session.question_ids {
            let key = (user_id, session.question_pool.clone(), question_id.clone());
            if !state.stats.contains_key(&key) {
                continue;
            }

            let remaining: Vec<&UserAnswer> = state
                .answers
                .iter()
                .filter(|a| &a.question_id == question_id)
                .filter(|a| {
                    state.sessions.get(&a.session_id).is_some_and(|s| {
                        s.user_id == user_id && s.question_pool == session.question_pool
                    })
                })
                .collect();

            let count_correct = remaining.iter().filter(|a| a.is_correct).count() as i32;
            let count_incorrect = remaining.len() as i32 - count_correct;
            let last_attempted_at = remaining.iter().map(|a| a.created_at).max();

            if remaining.is_empty() {
                state.stats.remove(&key);
            } else if let Some(row) = state.stats.get_mut(&key) {
                row.count_correct = count_correct;
                row.count_incorrect = count_incorrect;
                row.last_attempted_at = last_attempted_at;
            }
        }

        Ok(())
    }
}

/// Holds the store lock for its whole lifetime; staged writes are applied on commit
/// and discarded on drop.
struct MemorySubmission {
    guard: OwnedMutexGuard<MemoryState>,
    session: ExamSession,
    answers: Vec<UserAnswer>,
    stats: HashMap<StatsKey, AttemptStats>,
}

#[async_trait]
impl Submission for MemorySubmission {
    fn session(&self) -> &ExamSession {
        &self.session
    }

    async fn record_answer(&mut self, answer: &UserAnswer) -> Result<(), StoreError> {
        self.answers.push(answer.clone());
        Ok(())
    }

    async fn upsert_stats(
        &mut self,
        question_id: &QuestionId,
        correct: bool,
        at: DateTime<Utc>,
    ) -> Result<AttemptStats, StoreError> {
        let key = (
            self.session.user_id,
            self.session.question_pool.clone(),
            question_id.clone(),
        );

        let mut row = self
            .stats
            .get(&key)
            .or_else(|| self.guard.stats.get(&key))
            .cloned()
            .unwrap_or_else(|| AttemptStats {
                user_id: self.session.user_id,
                question_pool: self.session.question_pool.clone(),
                question_id: question_id.clone(),
                count_correct: 0,
                count_incorrect: 0,
                last_attempted_at: None,
            });

        if correct {
            row.count_correct += 1;
        } else {
            row.count_incorrect += 1;
        }
        row.last_attempted_at = Some(at);

        self.stats.insert(key, row.clone());
        Ok(row)
    }

    async fn commit(
        self: Box<Self>,
        end_time: DateTime<Utc>,
        score: i32,
        total_questions: i32,
    ) -> Result<ExamSession, StoreError> {
        let MemorySubmission {
            mut guard,
            mut session,
            answers,
            stats,
        } = *self;

        session.end_time = Some(end_time);
        session.score = Some(score);
        session.total_questions = Some(total_questions);

        guard.answers.extend(answers);
        guard.stats.extend(stats);
        guard.sessions.insert(session.id, session.clone());

        Ok(session)
    }
}
