use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use parley_api::state::{AppState, AppStateInner};
use parley_chat::{Chat, JwtIdentity};
use parley_db::Database;

fn app() -> Router {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let state: AppState = Arc::new(AppStateInner {
        chat: Arc::new(Chat::new(db.clone(), 50)),
        db,
        identity: JwtIdentity::new("test-secret", 1),
    });
    parley_api::routes(state)
}

async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn register(app: &Router, email: &str, name: Option<&str>) -> String {
    let (status, body) = call(
        app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "email": email, "password": "correct horse", "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn conversation_between_two_users() {
    let app = app();
    let ada = register(&app, "ada@example.com", Some("Ada")).await;
    let bob = register(&app, "bob@example.com", None).await;

    let (status, channel) = call(&app, "POST", "/channels", Some(&ada), Some(json!({ "name": "general" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/channels/{}/messages", channel["id"].as_str().unwrap());

    let (status, _) = call(&app, "POST", &uri, Some(&ada), Some(json!({ "body": "hi" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = call(&app, "POST", &uri, Some(&bob), Some(json!({ "body": "there" }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, messages) = call(&app, "GET", &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    let messages = messages.as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["body"], "hi");
    assert_eq!(messages[0]["author_label"], "Ada");
    assert_eq!(messages[1]["body"], "there");
    assert_eq!(messages[1]["author_label"], "bob@example.com");

    let (status, limited) = call(&app, "GET", &format!("{}?limit=1", uri), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(limited[0]["body"], "there");
}

#[tokio::test]
async fn anonymous_requests_are_unauthenticated() {
    let app = app();
    let ada = register(&app, "ada@example.com", None).await;

    for (method, uri, body) in [
        ("GET", "/channels", None),
        ("POST", "/channels", Some(json!({ "name": "general" }))),
        ("POST", "/channels/defaults", None),
        ("GET", "/users/me", None),
    ] {
        let (status, error) = call(&app, method, uri, None, body.clone()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        assert_eq!(error["error"], "unauthenticated");

        let (status, _) = call(&app, method, uri, Some("not-a-token"), body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
    }

    let (_, channels) = call(&app, "GET", "/channels", Some(&ada), None).await;
    assert_eq!(channels, json!([]));
}

#[tokio::test]
async fn duplicate_channel_conflicts() {
    let app = app();
    let ada = register(&app, "ada@example.com", None).await;

    call(&app, "POST", "/channels", Some(&ada), Some(json!({ "name": "general" }))).await;
    let (status, error) = call(&app, "POST", "/channels", Some(&ada), Some(json!({ "name": "general" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "already_exists");
    assert_eq!(error["message"], "Channel \"general\" already exists");

    let (_, channels) = call(&app, "GET", "/channels", Some(&ada), None).await;
    assert_eq!(channels.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_channel_is_not_found() {
    let app = app();
    let ada = register(&app, "ada@example.com", None).await;
    let uri = format!("/channels/{}", uuid::Uuid::new_v4());

    let (status, _) = call(&app, "GET", &uri, Some(&ada), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, error) = call(&app, "POST", &format!("{}/messages", uri), Some(&ada), Some(json!({ "body": "hi" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["error"], "not_found");
}

#[tokio::test]
async fn default_channels_seed_once() {
    let app = app();
    let ada = register(&app, "ada@example.com", None).await;

    let (status, first) = call(&app, "POST", "/channels/defaults", Some(&ada), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let names: Vec<&str> = first["created"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["general", "random"]);

    let (status, second) = call(&app, "POST", "/channels/defaults", Some(&ada), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["created"], json!([]));
}

#[tokio::test]
async fn login_and_profile_rename() {
    let app = app();
    register(&app, "ada@example.com", None).await;

    let (status, _) = call(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "wrong password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, login) = call(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "ada@example.com", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["label"], "ada@example.com");
    let token = login["token"].as_str().unwrap().to_string();

    let (_, channel) = call(&app, "POST", "/channels", Some(&token), Some(json!({ "name": "general" }))).await;
    let uri = format!("/channels/{}/messages", channel["id"].as_str().unwrap());
    call(&app, "POST", &uri, Some(&token), Some(json!({ "body": "before" }))).await;

    let (status, profile) = call(&app, "PATCH", "/users/me", Some(&token), Some(json!({ "name": "Ada" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["label"], "Ada");

    call(&app, "POST", &uri, Some(&token), Some(json!({ "body": "after" }))).await;
    let (_, messages) = call(&app, "GET", &uri, Some(&token), None).await;
    assert_eq!(messages[0]["author_label"], "ada@example.com");
    assert_eq!(messages[1]["author_label"], "Ada");
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = app();
    register(&app, "ada@example.com", None).await;

    let (status, error) = call(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "email": "ada@example.com", "password": "another password" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "already_exists");

    let (status, _) = call(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "email": "not-an-email", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_requests_get_json_errors() {
    let app = app();
    let ada = register(&app, "ada@example.com", None).await;
    let (_, channel) = call(&app, "POST", "/channels", Some(&ada), Some(json!({ "name": "general" }))).await;
    let uri = format!("/channels/{}/messages", channel["id"].as_str().unwrap());

    let cases = [
        ("GET", "/channels/not-a-uuid".to_string(), None),
        ("POST", "/channels".to_string(), Some(json!({ "name": 5 }))),
        ("POST", uri.clone(), Some(json!({ "text": "wrong field" }))),
        ("GET", format!("{}?limit=-1", uri), None),
        ("PATCH", "/users/me".to_string(), Some(json!({ "name": ["Ada"] }))),
        ("POST", "/auth/login".to_string(), Some(json!({ "email": "ada@example.com" }))),
    ];
    for (method, uri, body) in cases {
        let (status, error) = call(&app, method, &uri, Some(&ada), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} {}", method, uri);
        assert_eq!(error["error"], "invalid_input", "{} {}", method, uri);
        assert!(error["message"].as_str().is_some_and(|m| !m.is_empty()));
    }
}
