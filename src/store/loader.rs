// src/store/loader.rs

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use super::{Store, StoreError};
use crate::models::question::{Answer, AnswerId, Question, QuestionId, QuestionPool};
use crate::utils::html::clean_html;

static POOL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._-]{1,100}$").expect("pool name pattern is valid")
});

/// Pool names double as file stems, so only a safe character set is accepted.
pub fn is_valid_pool_name(name: &str) -> bool {
    POOL_NAME.is_match(name)
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed pool file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid pool '{pool}': {reason}")]
    Invalid { pool: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Deserialize)]
struct RawAnswer {
    id: AnswerId,
    content: String,
    #[serde(alias = "isCorrect")]
    correct: bool,
}

#[derive(Deserialize)]
struct RawQuestion {
    id: QuestionId,
    content: String,
    answers: Vec<RawAnswer>,
    #[serde(default, alias = "reason")]
    explanation: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPoolFile {
    Questions(Vec<RawQuestion>),
    Described {
        description: Option<String>,
        questions: Vec<RawQuestion>,
    },
}

/// Parses and validates one pool file body.
pub fn parse_pool(name: &str, json: &str) -> Result<QuestionPool, LoaderError> {
    let (description, raw_questions) = match serde_json::from_str::<RawPoolFile>(json)? {
        RawPoolFile::Questions(questions) => (None, questions),
        RawPoolFile::Described {
            description,
            questions,
        } => (description, questions),
    };

    let questions = raw_questions
        .into_iter()
        .map(|q| Question {
            id: q.id,
            content: clean_html(&q.content),
            answers: q
                .answers
                .into_iter()
                .map(|a| Answer {
                    id: a.id,
                    content: clean_html(&a.content),
                    is_correct: a.correct,
                })
                .collect(),
            explanation: q
                .explanation
                .map(|e| clean_html(&e))
                .filter(|e| !e.trim().is_empty()),
        })
        .collect();

    let pool = QuestionPool {
        name: name.to_owned(),
        description,
        questions,
    };
    validate_pool(&pool)?;
    Ok(pool)
}

/// Checks the pool invariants: a safe name, unique question ids, and for
/// every question unique answer ids with at least one correct answer.
pub fn validate_pool(pool: &QuestionPool) -> Result<(), LoaderError> {
    let invalid = |reason: String| LoaderError::Invalid {
        pool: pool.name.clone(),
        reason,
    };

    if !is_valid_pool_name(&pool.name) {
        return Err(invalid("name contains unsupported characters".to_string()));
    }

    let mut question_ids = HashSet::new();
    for question in &pool.questions {
        if !question_ids.insert(&question.id) {
            return Err(invalid(format!("duplicate question id '{}'", question.id)));
        }

        let mut answer_ids = HashSet::new();
        for answer in &question.answers {
            if !answer_ids.insert(&answer.id) {
                return Err(invalid(format!(
                    "duplicate answer id '{}' in question '{}'",
                    answer.id, question.id
                )));
            }
        }

        if question.correct_answer_ids().next().is_none() {
            return Err(invalid(format!("question '{}' has no correct answer", question.id)));
        }
    }

    Ok(())
}

/// Reads every `<name>.json` pool in `dir`, sorted by name.
/// Files with an unsupported name or invalid content are logged and skipped.
pub fn load_pool_dir(dir: &Path) -> Result<Vec<QuestionPool>, LoaderError> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut pools = Vec::new();
    for path in paths {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if !is_valid_pool_name(name) {
            tracing::warn!("Skipping pool file with unsupported name: {}", path.display());
            continue;
        }

        let parsed = std::fs::read_to_string(&path)
            .map_err(LoaderError::from)
            .and_then(|body| parse_pool(name, &body));

        match parsed {
            Ok(pool) => pools.push(pool),
            Err(e) => tracing::warn!("Skipping pool file {}: {}", path.display(), e),
        }
    }

    Ok(pools)
}

/// Loads the pools in `dir` into the store. Returns the number imported.
pub async fn import_pools(store: &dyn Store, dir: &Path) -> Result<usize, LoaderError> {
    let pools = load_pool_dir(dir)?;
    for pool in &pools {
        store.save_pool(pool).await?;
        tracing::info!(
            "Imported question pool '{}' ({} questions)",
            pool.name,
            pool.questions.len()
        );
    }
    Ok(pools.len())
}
