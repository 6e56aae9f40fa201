use std::sync::Arc;

use axum::body::{ to_bytes, Body };
use axum::http::{ header, Request, StatusCode };
use axum::Router;
use clap::Parser;
use serde_json::{ json, Value };
use tokio::sync::RwLock;
use tower::ServiceExt;
use url::Url;

use lms_tutor::agent::TutorAgent;
use lms_tutor::auth::{ encode_state, OAuthState };
use lms_tutor::catalog::MockCatalog;
use lms_tutor::cli::Args;
use lms_tutor::config::prompt::PromptConfig;
use lms_tutor::server::api::router;
use lms_tutor::store::{ MemoryStateStore, StateStore };

fn test_args() -> Args {
    Args::parse_from([
        "lms-tutor",
        "--store-type",
        "memory",
        "--canvas-base-url",
        "https://canvas.example.edu",
        "--canvas-client-id",
        "10000000000001",
    ])
}

fn app() -> (Router, Arc<MemoryStateStore>) {
    let store = Arc::new(MemoryStateStore::default());
    let agent = TutorAgent::with_parts(
        None,
        PromptConfig::builtin().unwrap(),
        Arc::new(MockCatalog::seeded().unwrap()),
        store.clone(),
        0.6
    );
    (router(Arc::new(RwLock::new(agent)), test_args()), store)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) =>
            builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

#[tokio::test]
async fn courses_are_listed_and_missing_ones_redirect() {
    let (app, _) = app();

    let (status, courses) = send(&app, "GET", "/api/courses", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(courses.as_array().unwrap().iter().any(|c| c["id"] == "101"));

    let (status, course) = send(&app, "GET", "/api/courses/101", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(course["name"], "Principles of Programming");

    let (status, body) = send(&app, "GET", "/api/courses/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["redirect"], "/dashboard");
}

#[tokio::test]
async fn pasted_course_text_is_parsed() {
    let (app, _) = app();
    let text = "LDT 593: Applied Project\nInstructor(s): Dr. Jane Doe\nDates: 01/13/2025 - 05/02/2025\nUnits: 3";
    let (status, body) = send(&app, "POST", "/api/courses/parse", Some(json!({ "text": text }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["parsed"]["code"], "LDT 593");
    assert_eq!(body["parsed"]["title"], "Applied Project");
    assert_eq!(body["courseType"], "project");
    assert_eq!(body["weeks"], 16);

    let (status, _) = send(&app, "POST", "/api/courses/parse", Some(json!({ "text": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn generated_course_joins_catalog_and_state() {
    let (app, store) = app();
    let (status, generated) = send(
        &app,
        "POST",
        "/api/courses/generate",
        Some(json!({ "prompt": "Create a 6 week introduction to Python course" }))
    ).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(generated["source"], "template");
    let id = generated["course"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, "GET", &format!("/api/courses/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(store.load().await.unwrap().generated_courses.len(), 1);

    let (status, _) = send(&app, "POST", "/api/courses/generate", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn chat_turn_is_recorded_in_history() {
    let (app, _) = app();

    let (status, reply) = send(
        &app,
        "POST",
        "/api/chat/course-101/messages",
        Some(json!({ "content": "hello" }))
    ).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["source"], "greeting");
    assert_eq!(reply["context"]["type"], "course");

    let (_, messages) = send(&app, "GET", "/api/chat/course-101/messages", None).await;
    assert_eq!(messages["messages"].as_array().unwrap().len(), 2);

    let (_, history) = send(&app, "GET", "/api/chat/history", None).await;
    assert_eq!(history[0]["key"], "course-101");

    let (status, offline) = send(
        &app,
        "POST",
        "/api/chat/course-101/messages",
        Some(json!({ "content": "what is a for loop?", "userId": "u1" }))
    ).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(offline["source"], "offline");
}

#[tokio::test]
async fn unknown_chat_context_redirects_to_dashboard() {
    let (app, _) = app();
    let (status, body) = send(&app, "GET", "/api/chat/assignment-nope/context", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["redirect"], "/dashboard");

    let (status, context) = send(&app, "GET", "/api/chat/dashboard/context", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(context["type"], "dashboard");
}

#[tokio::test]
async fn similar_question_is_found() {
    let (app, _) = app();
    send(
        &app,
        "POST",
        "/api/chat/course-202/messages",
        Some(json!({ "content": "How do I cite a website in APA format?" }))
    ).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/chat/similar",
        Some(json!({ "content": "cite a website in APA" }))
    ).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["similar"]["key"], "course-202");
}

#[tokio::test]
async fn cleanup_uses_rules_without_model() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/text/cleanup",
        Some(json!({ "text": "the loop runs twice period it stops", "useAi": true }))
    ).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "rules");
    assert!(body["text"].as_str().unwrap().starts_with("The loop runs twice."));
}

#[tokio::test]
async fn user_settings_notes_and_bookmarks_persist() {
    let (app, _) = app();

    let (status, user) = send(
        &app,
        "PUT",
        "/api/users/u1/settings",
        Some(json!({ "theme": "dark", "aiAssistance": false }))
    ).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["settings"]["theme"], "dark");

    send(&app, "POST", "/api/users/u1/notes", Some(json!({ "content": "Review loops", "courseId": "101" }))).await;
    send(
        &app,
        "POST",
        "/api/users/u1/bookmarks",
        Some(json!({ "title": "Syllabus", "url": "/courses/101/syllabus" }))
    ).await;

    let (_, user) = send(&app, "GET", "/api/users/u1", None).await;
    assert_eq!(user["settings"]["aiAssistance"], false);
    assert_eq!(user["notes"][0]["courseId"], "101");
    assert_eq!(user["bookmarks"][0]["title"], "Syllabus");

    let (status, _) = send(&app, "POST", "/api/users/u1/notes", Some(json!({ "content": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

async fn callback(app: &Router, state: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/oauth/canvas/callback?code=abc&state={}", state))
                .body(Body::empty())
                .unwrap()
        ).await
        .unwrap()
}

#[tokio::test]
async fn canvas_oauth_round_trip_stores_mock_tokens() {
    let (app, store) = app();

    let (status, body) = send(
        &app,
        "GET",
        "/api/oauth/canvas/authorize?json=true&returnTo=/courses/101",
        None
    ).await;
    assert_eq!(status, StatusCode::OK);
    let url = Url::parse(body["url"].as_str().unwrap()).unwrap();
    assert!(url.as_str().starts_with("https://canvas.example.edu/login/oauth2/auth?"));
    let state = url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let response = callback(&app, &state).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/courses/101");
    assert!(store.load().await.unwrap().canvas_oauth.unwrap().mock);

    // A state is good for one callback only.
    assert_eq!(callback(&app, &state).await.status(), StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/api/oauth/canvas/callback?code=abc&state=bogus*", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn canvas_callback_rejects_state_it_never_issued() {
    let (app, store) = app();
    let forged = encode_state(
        &(OAuthState { nonce: "n1".into(), return_to: "/courses/101".into() })
    ).unwrap();

    let response = callback(&app, &forged).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(store.load().await.unwrap().canvas_oauth.is_none());
}
