//! Handler tests for the referrals domain
//!
//! Drive the domain router in memory and check:
//! - status codes and JSON shapes of every endpoint
//! - bearer-token enforcement on the referral endpoints
//! - error bodies for validation, duplicates and bad credentials

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum_helpers::{JwtAuth, JwtConfig};
use domain_referrals::*;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt; // For oneshot()

const SECRET: &str = "handler-test-secret-with-enough-length";

fn tokens() -> JwtAuth {
    JwtAuth::new(&JwtConfig::new(SECRET).unwrap())
}

fn app() -> Router {
    let tokens = tokens();
    let service = AccountService::new(
        InMemoryUserRepository::new(),
        InMemoryReferralRepository::new(),
        tokens.clone(),
        AccountSettings::default(),
    );
    handlers::router(service, tokens)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn register(app: &Router, username: &str, referral_code: Option<&str>) -> Value {
    let mut body = json!({
        "username": username,
        "email": format!("{username}@example.com"),
        "password": "Secret#123",
    });
    if let Some(code) = referral_code {
        body["referralCode"] = json!(code);
    }

    let response = app.clone().oneshot(post("/register", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

#[tokio::test]
async fn test_register_returns_201_with_token() {
    let app = app();
    let body = register(&app, "alice", None).await;

    assert_eq!(body["username"], "alice");
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["referralCode"].as_str().unwrap().len(), 8);
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(body.get("password").is_none());
    assert!(body.get("passwordHash").is_none());
}

#[tokio::test]
async fn test_register_validation_details() {
    let app = app();
    let response = app
        .oneshot(post(
            "/register",
            json!({
                "username": "al",
                "email": "not-an-email",
                "password": "secret#123",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, ["email", "password", "username"]);
}

#[tokio::test]
async fn test_register_duplicate_returns_400() {
    let app = app();
    register(&app, "alice", None).await;

    let response = app
        .oneshot(post(
            "/register",
            json!({
                "username": "alice2",
                "email": "ALICE@example.com",
                "password": "Secret#123",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["message"], "User already exists");
}

#[tokio::test]
async fn test_malformed_json_returns_400() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_success_and_uniform_failure() {
    let app = app();
    let registered = register(&app, "alice", None).await;

    let response = app
        .clone()
        .oneshot(post(
            "/login",
            json!({ "email": "alice@example.com", "password": "Secret#123" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["id"], registered["id"]);
    assert_eq!(body["referralCode"], registered["referralCode"]);

    let wrong_password = app
        .clone()
        .oneshot(post(
            "/login",
            json!({ "email": "alice@example.com", "password": "Wrong#123" }),
        ))
        .await
        .unwrap();
    let unknown_email = app
        .oneshot(post(
            "/login",
            json!({ "email": "nobody@example.com", "password": "Secret#123" }),
        ))
        .await
        .unwrap();

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
    let a = json_body(wrong_password).await;
    let b = json_body(unknown_email).await;
    assert_eq!(a, b);
    assert_eq!(a["message"], "Invalid email or password");
}

#[tokio::test]
async fn test_referral_endpoints_require_token() {
    let app = app();

    for uri in ["/referrals", "/referral-stats"] {
        let missing = app.clone().oneshot(get(uri, None)).await.unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED, "{uri}");

        let garbage = app
            .clone()
            .oneshot(get(uri, Some("not.a.token")))
            .await
            .unwrap();
        assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn test_token_from_other_secret_rejected() {
    let app = app();
    let foreign = JwtAuth::new(&JwtConfig::new("some-other-secret-that-is-long-enough").unwrap())
        .issue(uuid::Uuid::now_v7())
        .unwrap();

    let response = app
        .oneshot(get("/referral-stats", Some(&foreign)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_alice_refers_bob() {
    let app = app();
    let alice = register(&app, "alice", None).await;
    let alice_code = alice["referralCode"].as_str().unwrap();
    let alice_token = alice["token"].as_str().unwrap();
    let bob = register(&app, "bob", Some(alice_code)).await;

    let response = app
        .clone()
        .oneshot(get("/referrals", Some(alice_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let referrals = json_body(response).await;
    let referrals = referrals.as_array().unwrap();
    assert_eq!(referrals.len(), 1);
    assert_eq!(referrals[0]["referrerId"], alice["id"]);
    assert_eq!(referrals[0]["referredUserId"], bob["id"]);
    assert_eq!(referrals[0]["status"], "successful");
    assert_eq!(referrals[0]["referredUser"]["username"], "bob");
    assert_eq!(referrals[0]["referredUser"]["email"], "bob@example.com");

    let response = app
        .clone()
        .oneshot(get("/referral-stats", Some(alice_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "successful": 1 }));

    let bob_token = bob["token"].as_str().unwrap();
    let response = app
        .oneshot(get("/referral-stats", Some(bob_token)))
        .await
        .unwrap();
    assert_eq!(json_body(response).await, json!({}));
}

#[tokio::test]
async fn test_unknown_referral_code_is_ignored() {
    let app = app();
    let carol = register(&app, "carol", Some("00000000")).await;

    let response = app
        .oneshot(get("/referrals", carol["token"].as_str()))
        .await
        .unwrap();
    assert_eq!(json_body(response).await, json!([]));
}

#[tokio::test]
async fn test_forgot_and_reset_password() {
    let app = app();
    register(&app, "alice", None).await;

    let response = app
        .clone()
        .oneshot(post(
            "/forgot-password",
            json!({ "email": "nobody@example.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["message"], "User not found");

    let response = app
        .clone()
        .oneshot(post(
            "/forgot-password",
            json!({ "email": "alice@example.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let reset_token = body["resetToken"].as_str().unwrap().to_string();
    assert_eq!(reset_token.len(), 40);

    let response = app
        .clone()
        .oneshot(post(
            "/reset-password",
            json!({ "token": reset_token, "password": "Changed#456" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post(
            "/login",
            json!({ "email": "alice@example.com", "password": "Changed#456" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(post(
            "/reset-password",
            json!({ "token": reset_token, "password": "Another#789" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_reset_password_rejects_weak_password() {
    let app = app();
    let response = app
        .oneshot(post(
            "/reset-password",
            json!({ "token": "whatever", "password": "weak" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "VALIDATION_ERROR");
}
