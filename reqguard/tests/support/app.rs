use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use reqguard::audit::AuditRecord;
use reqguard::auth::password::BcryptHasher;
use reqguard::auth::signature::generate_api_params;
use reqguard::config::{
    AppConfig, CorsConfig, JwtConfig, ServerConfig, ServerMode, SignatureConfig, WhitelistConfig,
};
use reqguard::logging::clock::SystemClock;
use reqguard::logging::LogConfig;
use reqguard::observability::Observability;
use reqguard::store::InMemoryUserStore;
use reqguard::{api, AppState};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const APP_KEY: &str = "demo";
pub const APP_SECRET: &str = "s3cr3t";

/// テスト用のアプリケーション（ログは一時ディレクトリに出力）
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub dir: TempDir,
}

/// テスト用設定
#[allow(dead_code)]
pub fn test_config(dir: &Path) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            mode: ServerMode::Release,
        },
        signature: SignatureConfig {
            enabled: true,
            app_key: APP_KEY.to_string(),
            app_secret: APP_SECRET.to_string(),
            expire: Duration::from_secs(300),
            nonce_cache: false,
        },
        jwt: JwtConfig {
            secret: "integration-test-jwt-secret".to_string(),
            expire: Duration::from_secs(3600),
        },
        logger: LogConfig {
            directory: dir.to_path_buf(),
            console_output: false,
            ..LogConfig::default()
        },
        cors: CorsConfig::default(),
        whitelist: WhitelistConfig::default(),
    }
}

/// 既定の設定でアプリを構築する
#[allow(dead_code)]
pub fn build_app() -> TestApp {
    build_app_with(|_| {})
}

/// 設定を調整してアプリを構築する
pub fn build_app_with(adjust: impl FnOnce(&mut AppConfig)) -> TestApp {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut config = test_config(dir.path());
    adjust(&mut config);

    let observability = Observability::new(&config.logger, Arc::new(SystemClock))
        .expect("Failed to initialize observability");
    let state = AppState::new(
        config,
        observability,
        Arc::new(InMemoryUserStore::new()),
        Arc::new(BcryptHasher::new(4)),
    );
    let router = api::create_app(state.clone());
    TestApp { router, state, dir }
}

/// 現在時刻で署名したクエリ文字列
#[allow(dead_code)]
pub fn signed_query(params: &[(&str, &str)]) -> String {
    signed_query_at(params, chrono::Utc::now().timestamp())
}

/// 指定時刻で署名したクエリ文字列（キー順）
#[allow(dead_code)]
pub fn signed_query_at(params: &[(&str, &str)], timestamp: i64) -> String {
    let params: HashMap<String, String> = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let signed: BTreeMap<String, String> =
        generate_api_params(APP_KEY, APP_SECRET, params, timestamp)
            .into_iter()
            .collect();
    serde_urlencoded::to_string(&signed).expect("Failed to encode query")
}

/// リクエストを送信し、ステータスとJSONボディを返す
#[allow(dead_code)]
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("Router failed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

/// 今日の監査レコードを読み出す（書き込み完了を待ってから）
#[allow(dead_code)]
pub async fn audit_records(app: &TestApp) -> Vec<AuditRecord> {
    app.state.observability.flush().await;
    let today = chrono::Local::now().format("%Y-%m-%d");
    let path = app
        .dir
        .path()
        .join("requests")
        .join(format!("requests-{today}.log"));
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).expect("audit line is not valid JSON"))
        .collect()
}
