// src/engine/selection.rs

use std::collections::HashMap;

use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::scoring::ScoreWeights;
use crate::models::{
    question::{QuestionId, QuestionPool},
    stats::{AttemptLogEntry, AttemptStats},
};

/// How questions are picked for a new session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Weakest questions first, ranked by priority score.
    #[default]
    Smart,
    /// Uniform random subset, history ignored.
    Random,
}

impl SelectionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMode::Smart => "smart",
            SelectionMode::Random => "random",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "smart" => Some(SelectionMode::Smart),
            "random" => Some(SelectionMode::Random),
            _ => None,
        }
    }
}

/// Where never-attempted questions land in the smart ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnseenPolicy {
    /// Ahead of every attempted question.
    #[default]
    First,
    /// Scored as 0 and ranked among attempted questions.
    Neutral,
}

impl UnseenPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Some(UnseenPolicy::First),
            "neutral" => Some(UnseenPolicy::Neutral),
            _ => None,
        }
    }
}

/// Correct/incorrect counts of one question for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempts {
    pub correct: u32,
    pub incorrect: u32,
}

impl From<&AttemptStats> for Attempts {
    fn from(s: &AttemptStats) -> Self {
        Attempts {
            correct: u32::try_from(s.count_correct).unwrap_or(0),
            incorrect: u32::try_from(s.count_incorrect).unwrap_or(0),
        }
    }
}

/// A question eligible for selection, with the user's history if any.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: QuestionId,
    pub history: Option<Attempts>,
}

/// Builds candidates in pool order.
pub fn candidates_from(pool: &QuestionPool, history: &HashMap<QuestionId, Attempts>) -> Vec<Candidate> {
    pool.questions
        .iter()
        .map(|q| Candidate {
            id: q.id.clone(),
            history: history.get(&q.id).copied(),
        })
        .collect()
}

/// Server-side history keyed by question id.
pub fn history_from_stats(stats: &[AttemptStats]) -> HashMap<QuestionId, Attempts> {
    stats
        .iter()
        .map(|s| (s.question_id.clone(), Attempts::from(s)))
        .collect()
}

/// Client-side history. Repeated entries for one question are summed.
pub fn history_from_log(log: &[AttemptLogEntry]) -> HashMap<QuestionId, Attempts> {
    let mut history: HashMap<QuestionId, Attempts> = HashMap::new();
    for entry in log {
        let slot = history.entry(entry.question_id.clone()).or_insert(Attempts {
            correct: 0,
            incorrect: 0,
        });
        slot.correct = slot.correct.saturating_add(entry.count_correct);
        slot.incorrect = slot.incorrect.saturating_add(entry.count_incorrect);
    }
    history
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("question count must be positive, got {0}")]
    InvalidCount(i64),

    #[error("question pool has no questions")]
    EmptyPool,
}

/// Ranking parameters, fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ranking {
    pub weights: ScoreWeights,
    pub unseen: UnseenPolicy,
}

impl Ranking {
    /// Sort key of a candidate, without the tiebreak.
    fn key(&self, history: Option<Attempts>) -> (u8, f64) {
        match (history, self.unseen) {
            (Some(a), _) => (1, self.weights.score(a.correct, a.incorrect)),
            (None, UnseenPolicy::First) => (0, 0.0),
            (None, UnseenPolicy::Neutral) => (1, 0.0),
        }
    }
}

/// Picks the question ids for a new session.
///
/// Returns exactly `min(count, candidates.len())` ids. Smart mode draws one
/// tiebreak per candidate so equally weak questions do not always come out
/// in the same order.
pub fn select_questions<R: Rng>(
    candidates: &[Candidate],
    count: i64,
    mode: SelectionMode,
    ranking: &Ranking,
    rng: &mut R,
) -> Result<Vec<QuestionId>, SelectionError> {
    if count <= 0 {
        return Err(SelectionError::InvalidCount(count));
    }
    if candidates.is_empty() {
        return Err(SelectionError::EmptyPool);
    }

    let take = usize::try_from(count)
        .unwrap_or(usize::MAX)
        .min(candidates.len());

    let selected = match mode {
        SelectionMode::Smart => {
            let mut ranked: Vec<(u8, f64, f64, &QuestionId)> = candidates
                .iter()
                .map(|c| {
                    let (bucket, score) = ranking.key(c.history);
                    let tiebreak: f64 = rng.random();
                    (bucket, score, tiebreak, &c.id)
                })
                .collect();

            ranked.sort_by(|a, b| {
                a.0.cmp(&b.0)
                    .then(a.1.total_cmp(&b.1))
                    .then(a.2.total_cmp(&b.2))
            });

            ranked
                .into_iter()
                .take(take)
                .map(|(_, _, _, id)| id.clone())
                .collect()
        }
        SelectionMode::Random => {
            let mut ids: Vec<&QuestionId> = candidates.iter().map(|c| &c.id).collect();
            ids.shuffle(rng);
            ids.into_iter().take(take).cloned().collect()
        }
    };

    tracing::debug!(
        mode = mode.as_str(),
        requested = count,
        selected = take,
        pool_size = candidates.len(),
        "questions selected"
    );

    Ok(selected)
}

/// Practice variant: ranks like smart mode from a client-side history, then
/// shuffles the chosen subset so the display order does not reveal the ranking.
pub fn select_for_practice<R: Rng>(
    candidates: &[Candidate],
    count: i64,
    ranking: &Ranking,
    rng: &mut R,
) -> Result<Vec<QuestionId>, SelectionError> {
    let mut selected = select_questions(candidates, count, SelectionMode::Smart, ranking, rng)?;
    selected.shuffle(rng);
    Ok(selected)
}
