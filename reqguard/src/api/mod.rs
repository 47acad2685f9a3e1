//! REST APIモジュール
//!
//! ルーター構築とレイヤー構成

pub mod error;
pub mod users;
pub mod whitelist;

use crate::config::CorsConfig;
use crate::pipeline::{self, PipelineState, RoutePolicies};
use crate::AppState;
use axum::{
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::from_fn_with_state,
    routing::{any, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use whitelist::Whitelist;

/// セッション必須のルート
pub const PROTECTED_ROUTES: [&str; 2] = ["/api/v1/users/profile", "/api/v1/users/{id}"];

/// CORSで許可するリクエストヘッダー（署名パラメータを含む）
pub const CORS_ALLOWED_HEADERS: [&str; 12] = [
    "origin",
    "content-length",
    "content-type",
    "authorization",
    "accept",
    "x-requested-with",
    "x-csrf-token",
    "signature",
    "app_key",
    "timestamp",
    "nonce",
    "sign",
];

/// ルーターを構築する
///
/// レイヤーは外側から ホワイトリスト → 監査 → CORS → 認証 → ハンドラー の順。
/// ホワイトリストで拒否されたリクエストは監査されない。
pub fn create_app(state: AppState) -> Router {
    pipeline::panic::install_hook();

    let config = state.config.clone();
    let pipeline_state = PipelineState {
        observability: state.observability.clone(),
        authenticator: state.authenticator.clone(),
        policies: Arc::new(RoutePolicies::new(
            config.signature.enabled,
            PROTECTED_ROUTES,
        )),
        debug: config.server.mode == crate::config::ServerMode::Debug,
    };
    let whitelist = Arc::new(Whitelist::new(&config.whitelist));

    Router::new()
        .route("/ping", get(ping))
        .route(
            "/api/v1/login",
            any(|| async {
                (
                    StatusCode::MOVED_PERMANENTLY,
                    [(header::LOCATION, "/api/v1/users/login")],
                )
            }),
        )
        .route("/api/v1/users/register", post(users::register))
        .route("/api/v1/users/login", post(users::login))
        .route("/api/v1/users/profile", get(users::profile))
        .route("/api/v1/users/{id}", get(users::get_user))
        .layer(from_fn_with_state(
            pipeline_state.clone(),
            pipeline::auth_middleware,
        ))
        .layer(cors_layer(&config.cors))
        .layer(from_fn_with_state(
            pipeline_state,
            pipeline::audit_middleware,
        ))
        .layer(from_fn_with_state(
            whitelist,
            whitelist::whitelist_middleware,
        ))
        .with_state(state)
}

/// GET /ping - ヘルスチェック
async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

/// CORSレイヤーを構築する
///
/// `*` を含む場合は全オリジンを許可する（認証情報付きの場合はオリジンを反射）。
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let wildcard = config.allow_origins.iter().any(|o| o == "*");
    let origin = if wildcard && config.allow_credentials {
        AllowOrigin::mirror_request()
    } else if wildcard {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = config
            .allow_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
        ])
        .allow_headers(
            CORS_ALLOWED_HEADERS
                .into_iter()
                .map(HeaderName::from_static)
                .collect::<Vec<_>>(),
        )
        .expose_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(pipeline::middleware::REQUEST_ID_HEADER),
        ])
        .allow_credentials(config.allow_credentials)
        .max_age(config.max_age)
}
