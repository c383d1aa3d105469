// src/handlers/stats.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    config::Config,
    engine::report::build_report,
    error::AppError,
    handlers::pools::load_pool,
    models::{question::QuestionId, stats::StatsParams},
    store::DynStore,
    utils::jwt::Claims,
};

/// Per-question performance of the caller on one pool, plus an aggregate.
pub async fn get_stats(
    State(store): State<DynStore>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<StatsParams>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let pool_name = params
        .question_pool
        .filter(|p| !p.is_empty())
        .ok_or(AppError::BadRequest("Question pool is required".to_string()))?;

    let pool = load_pool(&store, &pool_name).await?;
    let stats = store.list_stats(user_id, &pool.name).await?;
    let session_count = store.count_finished_sessions(user_id, &pool.name).await?;

    Ok(Json(build_report(
        &pool,
        &stats,
        session_count,
        &config.score_weights,
    )))
}

/// Attempt stats of a single question with its priority score.
pub async fn get_question_stats(
    State(store): State<DynStore>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path((pool_name, question_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let question_id = QuestionId(question_id);

    let stats = store
        .get_stats(user_id, &pool_name, &question_id)
        .await?
        .ok_or(AppError::NotFound("No attempts recorded for this question".to_string()))?;

    let score = config.score_weights.score(
        u32::try_from(stats.count_correct).unwrap_or(0),
        u32::try_from(stats.count_incorrect).unwrap_or(0),
    );

    Ok(Json(json!({
        "stats": stats,
        "score": score,
    })))
}
