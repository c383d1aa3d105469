// src/handlers/pools.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use crate::{
    config::Config,
    engine::selection::{candidates_from, history_from_log, select_for_practice},
    error::AppError,
    models::{
        question::{PoolListParams, Question, QuestionPageParams, QuestionPool},
        stats::AttemptLogEntry,
    },
    state::SharedRng,
    store::DynStore,
    utils::json::AppJson,
};

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 50;

pub(crate) async fn load_pool(store: &DynStore, name: &str) -> Result<QuestionPool, AppError> {
    store
        .get_pool(name)
        .await?
        .ok_or_else(|| AppError::NotFound("Question pool not found".to_string()))
}

/// Lists question pools.
/// With `?detail=true` (or `1`) the full pools are returned, answer keys included.
pub async fn list_pools(
    State(store): State<DynStore>,
    Query(params): Query<PoolListParams>,
) -> Result<impl IntoResponse, AppError> {
    let include_questions = matches!(params.detail.as_deref(), Some("1") | Some("true"));
    let summaries = store.list_pools().await?;

    if !include_questions {
        return Ok(Json(json!({ "questionPools": summaries })));
    }

    let mut pools = Vec::with_capacity(summaries.len());
    for summary in summaries {
        if let Some(pool) = store.get_pool(&summary.name).await? {
            pools.push(pool);
        }
    }

    Ok(Json(json!({ "questionPools": pools })))
}

/// Returns one pool with all of its questions.
pub async fn get_pool(
    State(store): State<DynStore>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let pool = load_pool(&store, &name).await?;
    Ok(Json(json!({ "questionPool": pool })))
}

/// Paginated question listing for browsing a pool.
pub async fn list_questions(
    State(store): State<DynStore>,
    Path(name): Path<String>,
    Query(params): Query<QuestionPageParams>,
) -> Result<impl IntoResponse, AppError> {
    let page = params.page.unwrap_or(1);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);

    if page < 1 || !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(AppError::BadRequest("Invalid pagination parameters".to_string()));
    }

    let pool = load_pool(&store, &name).await?;

    let total_questions = pool.questions.len() as i64;
    let total_pages = (total_questions + limit - 1) / limit;
    let skip = usize::try_from((page - 1).saturating_mul(limit)).unwrap_or(usize::MAX);

    let questions: Vec<&Question> = pool
        .questions
        .iter()
        .skip(skip)
        .take(limit as usize)
        .collect();

    Ok(Json(json!({
        "questions": questions,
        "pagination": {
            "currentPage": page,
            "totalPages": total_pages,
            "totalQuestions": total_questions,
            "limit": limit,
            "hasNextPage": page < total_pages,
            "hasPrevPage": page > 1,
        },
        "pool": {
            "name": pool.name,
            "description": pool.description,
        }
    })))
}

/// DTO for practice selection.
/// The attempt history comes from the client, not from the server-side stats.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PracticeRequest {
    pub count: i64,

    #[serde(default)]
    #[validate(length(max = 10000))]
    pub history: Vec<AttemptLogEntry>,
}

/// Picks practice questions from a client-side attempt log.
///
/// Ranks like a smart exam, then shuffles the chosen subset. Questions are
/// returned with their answer keys so the client can grade locally.
pub async fn practice(
    State(store): State<DynStore>,
    State(config): State<Config>,
    State(rng): State<SharedRng>,
    Path(name): Path<String>,
    AppJson(payload): AppJson<PracticeRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let pool = load_pool(&store, &name).await?;
    let candidates = candidates_from(&pool, &history_from_log(&payload.history));

    let selected = {
        let mut rng = rng
            .lock()
            .map_err(|_| AppError::InternalServerError("selection rng poisoned".to_string()))?;
        select_for_practice(&candidates, payload.count, &config.ranking(), &mut *rng)?
    };

    let questions: Vec<&Question> = selected.iter().filter_map(|id| pool.find(id)).collect();

    Ok(Json(json!({
        "questionPool": pool.name,
        "questions": questions,
    })))
}
