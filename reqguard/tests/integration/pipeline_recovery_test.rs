//! Integration Test: panic からの回復
//!
//! ハンドラーがpanicしてもプロセスは落ちず、500応答・エラーログ・監査レコードが残ることを確認する。

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use reqguard::pipeline::{self, PipelineState, RoutePolicies};
use serde_json::Value;
use std::sync::Arc;

use crate::support::app::{audit_records, build_app, send};

async fn explode() -> &'static str {
    panic!("disk on fire")
}

async fn fine() -> &'static str {
    "ok"
}

#[tokio::test]
async fn panicking_handler_is_recovered_and_recorded() {
    pipeline::panic::install_hook();
    let app = build_app();
    let state = PipelineState {
        observability: app.state.observability.clone(),
        authenticator: app.state.authenticator.clone(),
        policies: Arc::new(RoutePolicies::new(false, Vec::<String>::new())),
        debug: false,
    };
    let router = Router::new()
        .route("/explode", get(explode))
        .route("/fine", get(fine))
        .layer(from_fn_with_state(state.clone(), pipeline::auth_middleware))
        .layer(from_fn_with_state(state, pipeline::audit_middleware));

    let (status, body) = send(
        &router,
        Request::builder().uri("/explode").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], 500);
    assert!(body.get("details").is_none());
    assert!(!body.to_string().contains("disk on fire"));

    // 後続のリクエストは通常どおり処理される
    let response = tower::ServiceExt::oneshot(
        router.clone(),
        Request::builder().uri("/fine").body(Body::empty()).unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let records = audit_records(&app).await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].path, "/explode");
    assert_eq!(records[0].status, 500);
    assert!(records[0].error.as_deref().unwrap().contains("disk on fire"));
    assert_eq!(records[1].status, 200);

    app.state.observability.shutdown().await;
    let today = chrono::Local::now().format("%Y-%m-%d");
    let errors = std::fs::read_to_string(app.dir.path().join(format!("{today}_error.log")))
        .unwrap_or_default();
    let lines: Vec<Value> = errors
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).unwrap())
        .collect();
    let panics: Vec<&Value> = lines
        .iter()
        .filter(|v| v["msg"] == "Panic recovered")
        .collect();
    assert_eq!(panics.len(), 1);
    assert!(panics[0].to_string().contains("disk on fire"));

    // 500のアクセスログはエラーファイルに出る
    let access = lines
        .iter()
        .find(|v| v["msg"] == "[HTTP] 500 GET /explode")
        .expect("access log line for the panic");
    assert_eq!(access["status"], 500);
}
