// src/models/exam_session.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::engine::{grading::QuestionVerdict, selection::SelectionMode};
use crate::models::question::{AnswerId, PublicQuestion, Question, QuestionId};

/// One user's timed attempt at a pool.
/// The question selection is frozen at creation; the result fields are set exactly once on submit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub question_pool: String,
    pub mode: SelectionMode,

    /// Number of questions the user asked for.
    pub question_count: i32,

    /// Number of questions actually selected (clamped to the pool size).
    pub selected_count: i32,

    /// Time limit in minutes.
    pub time_limit: i32,

    /// Ordered question ids chosen for this session.
    pub question_ids: Vec<QuestionId>,

    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub score: Option<i32>,
    pub total_questions: Option<i32>,
}

impl ExamSession {
    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }
}

/// A graded answer stored at submission time. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAnswer {
    pub id: Uuid,
    pub session_id: Uuid,
    pub question_id: QuestionId,

    /// Normalized (deduplicated, sorted) selection.
    pub answer_ids: Vec<AnswerId>,
    pub is_correct: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A session together with its stored answers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: ExamSession,
    pub answers: Vec<UserAnswer>,
}

/// DTO for starting an exam.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[validate(length(min = 1, max = 100))]
    pub question_pool: String,

    /// Checked by the selector so that non-positive counts are rejected uniformly.
    pub question_count: i64,

    #[validate(range(min = 1, max = 600, message = "Time limit must be between 1 and 600 minutes."))]
    pub time_limit: i32,

    #[serde(default)]
    pub mode: SelectionMode,
}

/// DTO returned when an exam starts.
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session: ExamSession,
    pub questions: Vec<PublicQuestion>,
}

/// One entry of a submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: QuestionId,

    /// May be empty or contain duplicates.
    #[serde(default)]
    pub answer_ids: Vec<AnswerId>,
}

/// DTO for submitting an exam.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitSessionRequest {
    #[validate(length(max = 1000, message = "Too many answers in one submission."))]
    pub answers: Vec<SubmittedAnswer>,
}

/// DTO returned after a successful submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSessionResponse {
    pub session: ExamSession,
    pub score: i32,
    pub total_questions: i32,
    pub results: Vec<QuestionVerdict>,
}

/// A question as shown on the session page.
/// Answer keys are only revealed once the session has been submitted.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SessionQuestion {
    Pending(PublicQuestion),
    Reviewed(Question),
}

/// DTO for a single session with its questions.
#[derive(Debug, Serialize)]
pub struct SessionDetailResponse {
    pub session: SessionDetail,
    pub questions: Vec<SessionQuestion>,
}

/// Query parameters for listing sessions.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListParams {
    pub question_pool: Option<String>,
}
