//! Integration Test: 署名付きリクエストとセッションのエンドツーエンド
//!
//! 登録 → ログイン → プロフィール取得の流れと、署名・セッションゲートの拒否を確認する。

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use reqguard::auth::signature::{self, SIGNATURE_HEADER};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::support::app::{
    audit_records, build_app, send, signed_query, signed_query_at, APP_KEY, APP_SECRET,
};

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn register_login_and_profile_with_signed_requests() {
    let app = build_app();

    let (status, body) = send(
        &app.router,
        json_request(
            Method::POST,
            &format!("/api/v1/users/register?{}", signed_query(&[])),
            json!({"username": "alice", "email": "alice@example.com", "password": "password123"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["username"], "alice");
    assert!(body.get("password_hash").is_none());
    let user_id = body["id"].as_u64().unwrap();

    let (status, body) = send(
        &app.router,
        json_request(
            Method::POST,
            &format!("/api/v1/users/login?{}", signed_query(&[])),
            json!({"username": "alice", "password": "password123"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token"]["token_type"], "Bearer");
    assert_eq!(body["token"]["expires_in"], 3600);
    assert_eq!(body["user"]["id"], user_id);
    let token = body["token"]["access_token"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app.router,
        Request::builder()
            .uri(format!("/api/v1/users/profile?{}", signed_query(&[])))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "alice@example.com");

    let (status, body) = send(
        &app.router,
        Request::builder()
            .uri(format!("/api/v1/users/{user_id}?{}", signed_query(&[])))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");

    let records = audit_records(&app).await;
    let statuses: Vec<u16> = records.iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![201, 200, 200, 200]);
    assert_eq!(
        records[3].params.get("id").map(String::as_str),
        Some(user_id.to_string().as_str())
    );
}

#[tokio::test]
async fn tampered_parameter_is_rejected_with_bad_signature() {
    let app = build_app();

    let query = signed_query(&[("foo", "1"), ("bar", "2")]);
    let (status, _) = send(&app.router, get(&format!("/ping?{query}"))).await;
    assert_eq!(status, StatusCode::OK);

    let tampered = query.replace("bar=2", "bar=3");
    let (status, body) = send(&app.router, get(&format!("/ping?{tampered}"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert_eq!(body["error"], "bad_signature");
    // ダイジェストはクライアントに返さない
    let provided = tampered
        .split('&')
        .find_map(|pair| pair.strip_prefix("sign="))
        .unwrap();
    assert!(!body.to_string().contains(provided));

    let records = audit_records(&app).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].status, 400);
    assert!(records[1].error.as_deref().unwrap().contains("bad_signature"));
}

#[tokio::test]
async fn stale_unsigned_and_foreign_requests_are_rejected() {
    let app = build_app();
    let now = chrono::Utc::now().timestamp();

    let stale = signed_query_at(&[], now - 301);
    let (status, body) = send(&app.router, get(&format!("/ping?{stale}"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "expired");

    let (status, body) = send(&app.router, get("/ping")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_credentials");

    let foreign = signed_query(&[]).replace(&format!("app_key={APP_KEY}"), "app_key=other");
    let (status, body) = send(&app.router, get(&format!("/ping?{foreign}"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_app_key");
}

#[tokio::test]
async fn signature_header_and_form_fields_are_accepted() {
    let app = build_app();

    // ダイジェストを signature ヘッダーで送る
    let now = chrono::Utc::now().timestamp().to_string();
    let params: HashMap<String, String> = [
        ("app_key", APP_KEY),
        ("timestamp", now.as_str()),
        ("nonce", "n0nce"),
        ("foo", "1"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let digest = signature::sign(&params, APP_SECRET);
    let query = serde_urlencoded::to_string(&params).unwrap();
    let (status, body) = send(
        &app.router,
        Request::builder()
            .uri(format!("/ping?{query}"))
            .header(SIGNATURE_HEADER, digest)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "pong");

    // フォームボディの署名フィールド
    let form = signed_query(&[("username", "bob")]);
    let response = tower::ServiceExt::oneshot(
        app.router.clone(),
        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers()[header::LOCATION], "/api/v1/users/login");
}

#[tokio::test]
async fn protected_routes_require_a_valid_bearer_token() {
    let app = build_app();

    let (status, body) = send(
        &app.router,
        get(&format!("/api/v1/users/profile?{}", signed_query(&[]))),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing_credentials");

    let (status, body) = send(
        &app.router,
        Request::builder()
            .uri(format!("/api/v1/users/profile?{}", signed_query(&[])))
            .header(header::AUTHORIZATION, "Token abc")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "malformed");

    let forged = reqguard::auth::jwt::issue_token(
        1,
        b"some-other-secret",
        std::time::Duration::from_secs(60),
    )
    .unwrap();
    let (status, body) = send(
        &app.router,
        Request::builder()
            .uri(format!("/api/v1/users/profile?{}", signed_query(&[])))
            .header(header::AUTHORIZATION, format!("Bearer {forged}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "bad_signature");
}

#[tokio::test]
async fn handler_errors_reach_the_audit_log_but_not_the_client() {
    let app = build_app();

    let (status, body) = send(
        &app.router,
        json_request(
            Method::POST,
            &format!("/api/v1/users/login?{}", signed_query(&[])),
            json!({"username": "ghost", "password": "whatever"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Authentication failed");
    assert!(!body.to_string().contains("ghost"));

    let records = audit_records(&app).await;
    assert_eq!(records.len(), 1);
    assert!(records[0].error.as_deref().unwrap().contains("ghost"));
}
