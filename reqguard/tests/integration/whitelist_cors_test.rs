//! Integration Test: IPホワイトリストとCORSプリフライト

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};

use crate::support::app::{audit_records, build_app, build_app_with, send, signed_query};

fn from_ip(uri: &str, ip: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-forwarded-for", ip)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn unlisted_ip_is_forbidden_except_on_whitelisted_paths() {
    let app = build_app_with(|config| {
        config.whitelist.ips = vec!["10.0.0.1".to_string()];
        config.whitelist.paths = vec!["/ping".to_string()];
        config.whitelist.ip_enabled = true;
        config.whitelist.path_enabled = true;
    });

    let (status, body) = send(
        &app.router,
        from_ip(
            &format!("/api/v1/users/1?{}", signed_query(&[])),
            "10.0.0.2, 10.0.0.1",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 403);

    let (status, body) = send(
        &app.router,
        from_ip(&format!("/ping?{}", signed_query(&[])), "10.0.0.2"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "pong");

    // 拒否されたリクエストは監査の手前で止まる
    let records = audit_records(&app).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].path, "/ping");
    assert_eq!(records[0].ip, "10.0.0.2");
}

#[tokio::test]
async fn cors_preflight_is_answered_and_audited() {
    let app = build_app();

    let (status, _) = send(
        &app.router,
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/v1/users/profile")
            .header(header::ORIGIN, "http://localhost:3000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization,sign")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let records = audit_records(&app).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].method, "OPTIONS");
    assert_eq!(records[0].status, 200);
}
