// tests/api_tests.rs

use std::collections::HashSet;
use std::sync::Arc;

use exam_trainer::{
    config::{Config, StorageBackend},
    engine::{scoring::ScoreWeights, selection::UnseenPolicy},
    models::question::{Answer, AnswerId, Question, QuestionId, QuestionPool},
    routes,
    state::AppState,
    store::{DynStore, MemoryStore, Store},
};
use serde_json::{Value, json};

fn answer(id: &str, is_correct: bool) -> Answer {
    Answer {
        id: AnswerId::from(id),
        content: format!("Answer {}", id),
        is_correct,
    }
}

fn question(id: &str, answers: Vec<Answer>) -> Question {
    Question {
        id: QuestionId::from(id),
        content: format!("Question {}", id),
        answers,
        explanation: Some(format!("Explanation for {}", id)),
    }
}

/// q1: single answer (a), q2: multiple answers (a, b), q3: single answer (b).
fn demo_pool() -> QuestionPool {
    QuestionPool {
        name: "demo".to_string(),
        description: Some("Demo pool".to_string()),
        questions: vec![
            question("q1", vec![answer("a", true), answer("b", false)]),
            question("q2", vec![answer("a", true), answer("b", true), answer("c", false)]),
            question("q3", vec![answer("a", false), answer("b", true)]),
        ],
    }
}

/// Pool with numeric-looking ids, as produced by older exports.
/// "1": correct answer "1", "2": correct answer "2".
fn numeric_pool() -> QuestionPool {
    QuestionPool {
        name: "numeric".to_string(),
        description: None,
        questions: vec![
            question("1", vec![answer("1", true), answer("2", false)]),
            question("2", vec![answer("1", false), answer("2", true)]),
        ],
    }
}

/// Spawns the app on a random port with an in-memory store seeded with the demo pool.
/// Returns the base URL (e.g., "http://127.0.0.1:12345").
async fn spawn_app() -> String {
    let store: DynStore = Arc::new(MemoryStore::new());
    store
        .save_pool(&demo_pool())
        .await
        .expect("Failed to seed question pool");
    store
        .save_pool(&numeric_pool())
        .await
        .expect("Failed to seed question pool");

    let config = Config {
        storage: StorageBackend::Memory,
        database_url: None,
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        question_pool_dir: None,
        score_weights: ScoreWeights::default(),
        unseen_policy: UnseenPolicy::First,
        selection_seed: Some(7),
    };

    let app = routes::create_router(AppState::new(store, config));

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

/// Registers a fresh user and returns its bearer token.
async fn register(client: &reqwest::Client, address: &str) -> String {
    let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&json!({ "username": username, "password": "password123" }))
        .send()
        .await
        .expect("Register failed");
    assert_eq!(response.status().as_u16(), 201);

    let body: Value = response.json().await.unwrap();
    body["token"].as_str().expect("Token not found").to_string()
}

async fn create_session(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    pool: &str,
    count: i64,
    mode: &str,
) -> Value {
    let response = client
        .post(format!("{}/api/exam/sessions", address))
        .bearer_auth(token)
        .json(&json!({
            "questionPool": pool,
            "questionCount": count,
            "timeLimit": 30,
            "mode": mode,
        }))
        .send()
        .await
        .expect("Create session failed");
    assert_eq!(response.status().as_u16(), 201);
    response.json().await.unwrap()
}

async fn submit(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    session_id: &str,
    answers: Value,
) -> reqwest::Response {
    client
        .post(format!("{}/api/exam/sessions/{}/submit", address, session_id))
        .bearer_auth(token)
        .json(&json!({ "answers": answers }))
        .send()
        .await
        .expect("Submit failed")
}

async fn stats(client: &reqwest::Client, address: &str, token: &str) -> Value {
    let response = client
        .get(format!("{}/api/exam/stats?questionPool=demo", address))
        .bearer_auth(token)
        .send()
        .await
        .expect("Stats request failed");
    assert_eq!(response.status().as_u16(), 200);
    response.json().await.unwrap()
}

fn stats_row<'a>(report: &'a Value, question_id: &str) -> &'a Value {
    report["questionStats"]
        .as_array()
        .unwrap()
        .iter()
        .find(|row| row["questionId"] == question_id)
        .unwrap_or_else(|| panic!("no stats row for {}", question_id))
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn register_and_login_work() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&json!({ "username": username, "password": "password123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["user"]["username"], username.as_str());
    assert!(body["user"].get("password").is_none());

    let login: Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&json!({ "username": username, "password": "password123" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(login["token"].as_str().is_some());

    let wrong = client
        .post(format!("{}/api/auth/login", address))
        .json(&json!({ "username": username, "password": "wrong-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status().as_u16(), 401);
}

#[tokio::test]
async fn register_fails_validation() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/auth/register", address))
        .json(&json!({ "username": "yo", "password": "password123" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn exam_routes_require_token() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/exam/sessions", address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let response = client
        .get(format!("{}/api/exam/sessions", address))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn pools_are_listed_and_paginated() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let pools: Value = client
        .get(format!("{}/api/question-pools", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pools["questionPools"][0]["name"], "demo");
    assert_eq!(pools["questionPools"][0]["questionCount"], 3);

    let page: Value = client
        .get(format!("{}/api/question-pools/demo/questions?page=2&limit=2", address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["questions"].as_array().unwrap().len(), 1);
    assert_eq!(page["questions"][0]["id"], "q3");
    assert_eq!(page["pagination"]["totalPages"], 2);
    assert_eq!(page["pagination"]["hasNextPage"], false);
    assert_eq!(page["pagination"]["hasPrevPage"], true);

    let bad = client
        .get(format!("{}/api/question-pools/demo/questions?limit=0", address))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status().as_u16(), 400);

    let missing = client
        .get(format!("{}/api/question-pools/nope", address))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 404);
}

#[tokio::test]
async fn create_session_clamps_and_hides_answer_keys() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let token = register(&client, &address).await;

    let body = create_session(&client, &address, &token, "demo", 10, "random").await;

    assert_eq!(body["session"]["questionCount"], 10);
    assert_eq!(body["session"]["selectedCount"], 3);
    let questions = body["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 3);

    let ids: HashSet<&str> = questions.iter().map(|q| q["id"].as_str().unwrap()).collect();
    assert_eq!(ids, HashSet::from(["q1", "q2", "q3"]));

    for q in questions {
        assert!(q.get("explanation").is_none());
        for a in q["answers"].as_array().unwrap() {
            assert!(a.get("isCorrect").is_none());
        }
    }
}

#[tokio::test]
async fn create_session_rejects_bad_input() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let token = register(&client, &address).await;

    let zero = client
        .post(format!("{}/api/exam/sessions", address))
        .bearer_auth(&token)
        .json(&json!({ "questionPool": "demo", "questionCount": 0, "timeLimit": 30 }))
        .send()
        .await
        .unwrap();
    assert_eq!(zero.status().as_u16(), 400);

    let unknown = client
        .post(format!("{}/api/exam/sessions", address))
        .bearer_auth(&token)
        .json(&json!({ "questionPool": "nope", "questionCount": 2, "timeLimit": 30 }))
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status().as_u16(), 404);
}

#[tokio::test]
async fn submission_scores_and_updates_stats() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let token = register(&client, &address).await;

    let body = create_session(&client, &address, &token, "demo", 3, "smart").await;
    let session_id = body["session"]["id"].as_str().unwrap().to_string();

    // q1 right, q2 partially answered (wrong), q3 right with a duplicate id.
    let response = submit(
        &client,
        &address,
        &token,
        &session_id,
        json!([
            { "questionId": "q1", "answerIds": ["a"] },
            { "questionId": "q2", "answerIds": ["a"] },
            { "questionId": "q3", "answerIds": ["b", "b"] },
        ]),
    )
    .await;
    assert_eq!(response.status().as_u16(), 200);

    let result: Value = response.json().await.unwrap();
    assert_eq!(result["score"], 2);
    assert_eq!(result["totalQuestions"], 3);
    assert!(result["session"]["endTime"].is_string());

    let report = stats(&client, &address, &token).await;
    assert_eq!(report["overallStats"]["totalAttempts"], 3);
    assert_eq!(report["overallStats"]["totalCorrect"], 2);
    assert_eq!(report["overallStats"]["sessionCount"], 1);
    assert_eq!(report["overallStats"]["neverAttempted"], 0);
    assert_eq!(report["overallStats"]["worstQuestions"], json!(["q2"]));
    // Weakest first
    assert_eq!(report["questionStats"][0]["questionId"], "q2");
    assert_eq!(stats_row(&report, "q2")["score"], -2.0);
    assert_eq!(stats_row(&report, "q1")["score"], 1.0);

    // The session now exposes answer keys.
    let detail: Value = client
        .get(format!("{}/api/exam/sessions/{}", address, session_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["session"]["answers"].as_array().unwrap().len(), 3);
    assert!(detail["questions"][0]["answers"][0].get("isCorrect").is_some());

    // The next smart exam of one question picks the weakest.
    let next = create_session(&client, &address, &token, "demo", 1, "smart").await;
    assert_eq!(next["questions"][0]["id"], "q2");
}

#[tokio::test]
async fn second_submission_is_rejected_without_side_effects() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let token = register(&client, &address).await;

    let body = create_session(&client, &address, &token, "demo", 1, "smart").await;
    let session_id = body["session"]["id"].as_str().unwrap().to_string();
    let question_id = body["questions"][0]["id"].as_str().unwrap().to_string();

    let answers = json!([{ "questionId": question_id, "answerIds": ["a"] }]);

    let first = submit(&client, &address, &token, &session_id, answers.clone()).await;
    assert_eq!(first.status().as_u16(), 200);

    let second = submit(&client, &address, &token, &session_id, answers).await;
    assert_eq!(second.status().as_u16(), 409);

    let report = stats(&client, &address, &token).await;
    assert_eq!(stats_row(&report, &question_id)["totalAttempts"], 1);
}

#[tokio::test]
async fn sessions_are_private() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let owner = register(&client, &address).await;
    let other = register(&client, &address).await;

    let body = create_session(&client, &address, &owner, "demo", 2, "random").await;
    let session_id = body["session"]["id"].as_str().unwrap();

    let response = client
        .get(format!("{}/api/exam/sessions/{}", address, session_id))
        .bearer_auth(&other)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let list: Value = client
        .get(format!("{}/api/exam/sessions", address))
        .bearer_auth(&other)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(list["sessions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_session_recomputes_stats() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let token = register(&client, &address).await;

    let mut session_ids = Vec::new();
    for answer_id in ["a", "b"] {
        let body = create_session(&client, &address, &token, "demo", 3, "random").await;
        let session_id = body["session"]["id"].as_str().unwrap().to_string();
        let response = submit(
            &client,
            &address,
            &token,
            &session_id,
            json!([{ "questionId": "q1", "answerIds": [answer_id] }]),
        )
        .await;
        assert_eq!(response.status().as_u16(), 200);
        session_ids.push(session_id);
    }

    let report = stats(&client, &address, &token).await;
    assert_eq!(stats_row(&report, "q1")["countCorrect"], 1);
    assert_eq!(stats_row(&report, "q1")["countIncorrect"], 1);

    // Drop the session holding the wrong answer.
    let response = client
        .delete(format!("{}/api/exam/sessions/{}", address, session_ids[1]))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let single: Value = client
        .get(format!("{}/api/exam/stats/demo/q1", address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(single["stats"]["countCorrect"], 1);
    assert_eq!(single["stats"]["countIncorrect"], 0);
    assert_eq!(single["score"], 1.0);

    // Removing the last session removes the row.
    client
        .delete(format!("{}/api/exam/sessions/{}", address, session_ids[0]))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    let gone = client
        .get(format!("{}/api/exam/stats/demo/q1", address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(gone.status().as_u16(), 404);
}

#[tokio::test]
async fn stats_require_pool() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let token = register(&client, &address).await;

    let response = client
        .get(format!("{}/api/exam/stats", address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn practice_prefers_unseen_then_weakest() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("{}/api/question-pools/demo/practice", address))
        .json(&json!({
            "count": 2,
            "history": [
                { "questionId": "q1", "countCorrect": 5, "countIncorrect": 0 },
                { "questionId": "q2", "countCorrect": 0, "countIncorrect": 3 },
            ]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let ids: HashSet<&str> = body["questions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, HashSet::from(["q2", "q3"]));
}

#[tokio::test]
async fn submission_accepts_numeric_ids() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let token = register(&client, &address).await;

    let body = create_session(&client, &address, &token, "numeric", 2, "random").await;
    let session_id = body["session"]["id"].as_str().unwrap().to_string();

    let response = submit(
        &client,
        &address,
        &token,
        &session_id,
        json!([
            { "questionId": 1, "answerIds": [1] },
            { "questionId": "2", "answerIds": [2] },
        ]),
    )
    .await;
    assert_eq!(response.status().as_u16(), 200);

    let result: Value = response.json().await.unwrap();
    assert_eq!(result["score"], 2);
    assert_eq!(result["totalQuestions"], 2);
    assert!(result["results"].as_array().unwrap().iter().all(|r| r["isCorrect"] == true));
}

#[tokio::test]
async fn submission_is_graded_on_selected_questions_only() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let token = register(&client, &address).await;

    let body = create_session(&client, &address, &token, "demo", 2, "smart").await;
    let session_id = body["session"]["id"].as_str().unwrap().to_string();

    let selected: HashSet<String> = body["questions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(selected.len(), 2);
    let unselected = ["q1", "q2", "q3"]
        .into_iter()
        .find(|id| !selected.contains(*id))
        .unwrap();

    // Correct answers for every question of the pool, selected or not.
    let response = submit(
        &client,
        &address,
        &token,
        &session_id,
        json!([
            { "questionId": "q1", "answerIds": ["a"] },
            { "questionId": "q2", "answerIds": ["b", "a"] },
            { "questionId": "q3", "answerIds": ["b"] },
        ]),
    )
    .await;
    assert_eq!(response.status().as_u16(), 200);

    let result: Value = response.json().await.unwrap();
    assert_eq!(result["score"], 2);
    assert_eq!(result["totalQuestions"], 2);

    let report = stats(&client, &address, &token).await;
    assert_eq!(report["overallStats"]["totalAttempts"], 2);
    assert_eq!(stats_row(&report, unselected)["totalAttempts"], 0);

    let untouched = client
        .get(format!("{}/api/exam/stats/demo/{}", address, unselected))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(untouched.status().as_u16(), 404);
}

#[tokio::test]
async fn malformed_body_returns_json_error() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let token = register(&client, &address).await;

    let body = create_session(&client, &address, &token, "demo", 1, "random").await;
    let session_id = body["session"]["id"].as_str().unwrap();

    let response = client
        .post(format!("{}/api/exam/sessions/{}/submit", address, session_id))
        .bearer_auth(&token)
        .json(&json!({ "answers": [{ "questionId": true }] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let error: Value = response.json().await.unwrap();
    assert!(error["error"].as_str().is_some());

    // The session is still open.
    let detail: Value = client
        .get(format!("{}/api/exam/sessions/{}", address, session_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(detail["session"]["endTime"].is_null());
}
