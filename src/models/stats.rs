// src/models/stats.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::question::QuestionId;

/// Running tally of one user's attempts at one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptStats {
    pub user_id: Uuid,
    pub question_pool: String,
    pub question_id: QuestionId,
    pub count_correct: i32,
    pub count_incorrect: i32,
    pub last_attempted_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Attempt counts as remembered by a client, used for practice selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptLogEntry {
    pub question_id: QuestionId,
    #[serde(default)]
    pub count_correct: u32,
    #[serde(default)]
    pub count_incorrect: u32,
}

/// Per-question row of the stats report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionStatsEntry {
    pub question_id: QuestionId,
    pub count_correct: i32,
    pub count_incorrect: i32,
    pub total_attempts: i32,
    /// Whole-number percentage, 0 when never attempted.
    pub accuracy: i32,
    pub score: f64,
    pub last_attempted_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Aggregate of a user's performance on one pool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_attempts: i64,
    pub total_correct: i64,
    pub total_incorrect: i64,
    pub accuracy_percent: f64,
    pub session_count: i64,
    pub unique_questions_seen: i64,
    pub total_questions_in_pool: i64,
    /// Attempted questions with a negative score, worst first (at most five).
    pub worst_questions: Vec<QuestionId>,
    pub never_attempted: i64,
}

/// DTO returned by the stats endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub question_pool: String,
    pub question_stats: Vec<QuestionStatsEntry>,
    pub overall_stats: OverallStats,
}

/// Query parameters for the stats endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsParams {
    pub question_pool: Option<String>,
}
