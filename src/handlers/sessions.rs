// src/handlers/sessions.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::Config,
    engine::{
        grading::grade_submission,
        selection::{SelectionMode, candidates_from, history_from_stats, select_questions},
    },
    error::AppError,
    handlers::pools::load_pool,
    models::{
        exam_session::{
            CreateSessionRequest, CreateSessionResponse, ExamSession, SessionDetailResponse,
            SessionListParams, SessionQuestion, SubmitSessionRequest, SubmitSessionResponse,
            UserAnswer,
        },
        question::PublicQuestion,
    },
    state::SharedRng,
    store::DynStore,
    utils::{json::AppJson, jwt::Claims},
};

/// Starts an exam.
///
/// * Loads the pool and, in smart mode, the caller's attempt stats.
/// * Selects the questions and freezes their order in a new session.
/// * Returns the session and the questions without answer keys.
pub async fn create_session(
    State(store): State<DynStore>,
    State(config): State<Config>,
    State(rng): State<SharedRng>,
    Extension(claims): Extension<Claims>,
    AppJson(payload): AppJson<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;

    let pool = load_pool(&store, &payload.question_pool).await?;

    let history = match payload.mode {
        SelectionMode::Smart => history_from_stats(&store.list_stats(user_id, &pool.name).await?),
        SelectionMode::Random => HashMap::new(),
    };
    let candidates = candidates_from(&pool, &history);

    let question_ids = {
        let mut rng = rng
            .lock()
            .map_err(|_| AppError::InternalServerError("selection rng poisoned".to_string()))?;
        select_questions(
            &candidates,
            payload.question_count,
            payload.mode,
            &config.ranking(),
            &mut *rng,
        )?
    };

    let session = ExamSession {
        id: Uuid::new_v4(),
        user_id,
        question_pool: pool.name.clone(),
        mode: payload.mode,
        question_count: i32::try_from(payload.question_count).unwrap_or(i32::MAX),
        selected_count: question_ids.len() as i32,
        time_limit: payload.time_limit,
        question_ids,
        start_time: Utc::now(),
        end_time: None,
        score: None,
        total_questions: None,
    };

    store.create_session(&session).await.map_err(|e| {
        tracing::error!("Failed to create exam session: {:?}", e);
        AppError::from(e)
    })?;

    tracing::info!(
        session_id = %session.id,
        pool = %session.question_pool,
        requested = session.question_count,
        selected = session.selected_count,
        "Exam session started"
    );

    let questions = session
        .question_ids
        .iter()
        .filter_map(|id| pool.find(id))
        .map(PublicQuestion::from)
        .collect();

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse { session, questions }),
    ))
}

/// Lists the caller's sessions, newest first, optionally for one pool.
pub async fn list_sessions(
    State(store): State<DynStore>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<SessionListParams>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let sessions = store
        .list_sessions(user_id, params.question_pool.as_deref())
        .await?;

    Ok(Json(json!({ "sessions": sessions })))
}

/// Returns one session with its answers and questions in session order.
/// Answer keys and explanations are only included after submission.
pub async fn get_session(
    State(store): State<DynStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    let detail = store
        .get_session(user_id, id)
        .await?
        .ok_or(AppError::NotFound("Session not found".to_string()))?;

    // The pool may have been removed since; the session stays readable.
    let questions = match store.get_pool(&detail.session.question_pool).await? {
        Some(pool) => detail
            .session
            .question_ids
            .iter()
            .filter_map(|qid| pool.find(qid))
            .map(|q| {
                if detail.session.is_finalized() {
                    SessionQuestion::Reviewed(q.clone())
                } else {
                    SessionQuestion::Pending(PublicQuestion::from(q))
                }
            })
            .collect(),
        None => Vec::new(),
    };

    Ok(Json(SessionDetailResponse {
        session: detail,
        questions,
    }))
}

/// Submits an exam.
///
/// * Rejects missing sessions (404) and finalized ones (409) before any write.
/// * Grades each question of the session at most once; unknown entries are skipped.
/// * Stores the answers, bumps the attempt stats and finalizes the session in
///   one unit: either all of it is written or none of it.
pub async fn submit_session(
    State(store): State<DynStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<SubmitSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;

    let detail = store
        .get_session(user_id, id)
        .await?
        .ok_or(AppError::NotFound("Session not found".to_string()))?;

    if detail.session.is_finalized() {
        return Err(AppError::Conflict("Session already submitted".to_string()));
    }

    let pool = load_pool(&store, &detail.session.question_pool).await?;

    // Re-checks ownership and finalization under the session lock.
    let mut submission = store.begin_submission(user_id, id).await?;

    let graded = grade_submission(&payload.answers, &submission.session().question_ids, &pool);
    let now = Utc::now();

    for verdict in &graded.verdicts {
        submission
            .record_answer(&UserAnswer {
                id: Uuid::new_v4(),
                session_id: id,
                question_id: verdict.question_id.clone(),
                answer_ids: verdict.answer_ids.clone(),
                is_correct: verdict.is_correct,
                created_at: now,
            })
            .await?;

        submission
            .upsert_stats(&verdict.question_id, verdict.is_correct, now)
            .await?;
    }

    let session = submission
        .commit(now, graded.score(), graded.total())
        .await
        .map_err(|e| {
            tracing::error!("Failed to finalize exam session {}: {:?}", id, e);
            AppError::from(e)
        })?;

    tracing::info!(
        session_id = %id,
        score = graded.score(),
        total = graded.total(),
        skipped = graded.skipped,
        "Exam session submitted"
    );

    Ok(Json(SubmitSessionResponse {
        score: graded.score(),
        total_questions: graded.total(),
        results: graded.verdicts,
        session,
    }))
}

/// Deletes one of the caller's sessions and recomputes the affected stats.
pub async fn delete_session(
    State(store): State<DynStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;

    store.delete_session(user_id, id).await?;
    tracing::info!(session_id = %id, "Exam session deleted");

    Ok(Json(json!({ "success": true })))
}
