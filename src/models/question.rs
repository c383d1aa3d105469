// src/models/question.rs

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Opaque identifier of a question, unique within its pool.
/// Accepts a JSON number or string; always serialized as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct QuestionId(pub String);

/// Opaque identifier of an answer, unique within its question.
/// Accepts a JSON number or string; always serialized as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct AnswerId(pub String);

/// Older pool exports and clients use integer ids, newer ones strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    Str(String),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Int(n) => n.to_string(),
            RawId::Str(s) => s,
        }
    }
}

impl<'de> Deserialize<'de> for QuestionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawId::deserialize(deserializer).map(|raw| QuestionId(raw.into()))
    }
}

impl<'de> Deserialize<'de> for AnswerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawId::deserialize(deserializer).map(|raw| AnswerId(raw.into()))
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for AnswerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QuestionId {
    fn from(value: &str) -> Self {
        QuestionId(value.to_owned())
    }
}

impl From<&str> for AnswerId {
    fn from(value: &str) -> Self {
        AnswerId(value.to_owned())
    }
}

/// A single answer option of a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub id: AnswerId,
    pub content: String,
    pub is_correct: bool,
}

/// A multiple-choice or multiple-select question with its answer key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,

    /// The text content of the question.
    pub content: String,

    /// Answer options in display order.
    pub answers: Vec<Answer>,

    /// Explanation shown once the question has been graded.
    pub explanation: Option<String>,
}

impl Question {
    /// Ids of every answer flagged correct.
    pub fn correct_answer_ids(&self) -> impl Iterator<Item = &AnswerId> {
        self.answers.iter().filter(|a| a.is_correct).map(|a| &a.id)
    }
}

/// A named, ordered collection of questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionPool {
    pub name: String,
    pub description: Option<String>,
    pub questions: Vec<Question>,
}

impl QuestionPool {
    pub fn find(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| &q.id == id)
    }
}

/// Pool listing entry without question bodies.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSummary {
    pub name: String,
    pub description: Option<String>,
    pub question_count: i64,
}

/// DTO for sending an answer option to the client (excludes correctness).
#[derive(Debug, Serialize)]
pub struct PublicAnswer {
    pub id: AnswerId,
    pub content: String,
}

/// DTO for sending a question during a running exam (excludes answer key and explanation).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: QuestionId,
    pub content: String,
    pub answers: Vec<PublicAnswer>,
    /// Number of answers to select; lets the client render checkboxes vs. radio buttons.
    pub select_count: usize,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        PublicQuestion {
            id: q.id.clone(),
            content: q.content.clone(),
            answers: q
                .answers
                .iter()
                .map(|a| PublicAnswer {
                    id: a.id.clone(),
                    content: a.content.clone(),
                })
                .collect(),
            select_count: q.correct_answer_ids().count(),
        }
    }
}

/// Query parameters for paginated question listing.
#[derive(Debug, Deserialize)]
pub struct QuestionPageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Query parameters for pool listing.
#[derive(Debug, Deserialize)]
pub struct PoolListParams {
    pub detail: Option<String>,
}
