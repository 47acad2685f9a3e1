//! パイプラインミドルウェア
//!
//! 外側の `audit_middleware` がリクエストID・panic回復・アクセスログ・監査記録を、
//! 内側の `auth_middleware` が署名ゲートとセッションゲートを担当する。
//! 間にCORSレイヤーを挟むため、プリフライトも拒否レスポンスも監査される。

use crate::api::error::ErrorBody;
use crate::audit::types::{selected_headers, AuditRecord};
use crate::auth::extract::is_form_body;
use crate::common::ip::client_ip;
use crate::logging::Severity;
use crate::observability::Observability;
use crate::pipeline::panic::{self, PanicReport};
use crate::pipeline::{Authenticator, Credentials, HandlerError, RoutePolicies, Stage};
use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, MatchedPath, RawPathParams, State},
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Local, Utc};
use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;
use uuid::Uuid;

/// リクエストIDを返すレスポンスヘッダー
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// 署名検証のためにバッファするフォームボディの上限
pub const MAX_FORM_BYTES: usize = 2 * 1024 * 1024;

/// ミドルウェアの状態
#[derive(Debug, Clone)]
pub struct PipelineState {
    /// ログと監査
    pub observability: Observability,
    /// 認証ゲート
    pub authenticator: Arc<Authenticator>,
    /// ルートごとの認証要件
    pub policies: Arc<RoutePolicies>,
    /// デバッグモード（500レスポンスにpanic詳細を含める）
    pub debug: bool,
}

/// リクエストID（リクエスト拡張データ）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// 監査ミドルウェア
///
/// `Router::layer` で最も外側に適用する。ハンドラーや内側のレイヤーがpanicしても
/// 500を返し、アクセスログと監査レコードを必ず残す。
pub async fn audit_middleware(
    State(state): State<PipelineState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4().to_string();

    let (mut parts, body) = request.into_parts();
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().unwrap_or_default().to_string();
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let ip = client_ip(&parts.headers, peer.as_ref()).unwrap_or_default();
    let user_agent = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let headers = selected_headers(&parts.headers);
    let params: BTreeMap<String, String> = RawPathParams::from_request_parts(&mut parts, &())
        .await
        .map(|raw| {
            raw.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default();
    parts.extensions.insert(RequestId(request_id.clone()));
    trace!(request_id = %request_id, stage = ?Stage::Received, "request received");

    let request = Request::from_parts(parts, body);
    let (mut response, error) = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => {
            let error = response
                .extensions()
                .get::<HandlerError>()
                .map(|e| e.0.clone());
            (response, error)
        }
        Err(payload) => {
            let report = panic::report(payload);
            log_panic(&state.observability, &request_id, &report);
            let message = report.message.clone();
            (panic_response(report, state.debug), Some(message))
        }
    };

    let status = response.status().as_u16();
    let latency_ms = start.elapsed().as_micros() as f64 / 1000.0;

    let mut fields = Map::new();
    fields.insert("status".to_string(), json!(status));
    fields.insert("method".to_string(), json!(method.as_str()));
    fields.insert("path".to_string(), json!(path));
    fields.insert("query".to_string(), json!(query));
    fields.insert("ip".to_string(), json!(ip));
    fields.insert("user_agent".to_string(), json!(user_agent));
    fields.insert("latency_ms".to_string(), json!(latency_ms));
    fields.insert("request_id".to_string(), json!(request_id));
    if let Some(error) = &error {
        fields.insert("error".to_string(), json!(error));
    }
    state.observability.log_event(
        Severity::for_status(status),
        format!("[HTTP] {} {} {}", status, method, path),
        fields,
    );

    state.observability.record_audit(AuditRecord {
        time: Local::now(),
        method: method.to_string(),
        path,
        query,
        status,
        ip,
        user_agent,
        latency_ms,
        request_id: Some(request_id.clone()),
        error,
        params,
        headers,
    });
    trace!(request_id = %request_id, stage = ?Stage::Audited, "request audited");

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// 認証ミドルウェア
///
/// マッチしたルートの要件に従って署名ゲートとセッションゲートを評価する。
/// 拒否時はハンドラーを呼ばず、拒否理由を `HandlerError` としてレスポンスに添付する。
pub async fn auth_middleware(
    State(state): State<PipelineState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let request_id = parts
        .extensions
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let matched = parts
        .extensions
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string());
    let policy = state.policies.policy_for(&parts.method, matched.as_deref());

    let (body, form) = if policy.require_signature && is_form_body(&parts.headers) {
        match axum::body::to_bytes(body, MAX_FORM_BYTES).await {
            Ok(bytes) => (Body::from(bytes.clone()), Some(bytes)),
            Err(e) => {
                trace!(request_id = %request_id, error = %e, "form body not buffered");
                let status = StatusCode::PAYLOAD_TOO_LARGE;
                let mut response =
                    ErrorBody::new(status, "Request body too large").respond(status);
                response.extensions_mut().insert(HandlerError(format!(
                    "form body could not be buffered (limit {} bytes): {}",
                    MAX_FORM_BYTES, e
                )));
                return response;
            }
        }
    } else {
        (body, None)
    };

    let credentials =
        Credentials::collect(policy, parts.uri.query(), form.as_deref(), &parts.headers);
    let authenticated =
        match state
            .authenticator
            .authenticate(policy, &credentials, Utc::now().timestamp())
        {
            Ok(authenticated) => authenticated,
            Err(rejection) => {
                trace!(request_id = %request_id, stage = ?rejection.stage(), "request rejected");
                let text = rejection.to_string();
                let mut response = rejection.into_response();
                response.extensions_mut().insert(HandlerError(text));
                return response;
            }
        };
    trace!(request_id = %request_id, stage = ?authenticated.stage, "credentials accepted");

    if let Some(session) = authenticated.session {
        parts.extensions.insert(session);
    }
    let response = next.run(Request::from_parts(parts, body)).await;
    trace!(request_id = %request_id, stage = ?Stage::Handled, "request handled");
    response
}

fn log_panic(observability: &Observability, request_id: &str, report: &PanicReport) {
    let mut fields = Map::new();
    fields.insert("request_id".to_string(), json!(request_id));
    fields.insert("panic".to_string(), json!(report.message));
    fields.insert(
        "stack".to_string(),
        Value::Array(report.stack.iter().map(|l| json!(l)).collect()),
    );
    observability.log_event(Severity::Error, "Panic recovered", fields);
}

fn panic_response(report: PanicReport, debug: bool) -> Response {
    let status = StatusCode::INTERNAL_SERVER_ERROR;
    let body = ErrorBody::new(status, "Internal server error");
    let body = if debug {
        body.with_error(report.message).with_details(Value::Array(
            report.stack.into_iter().map(Value::String).collect(),
        ))
    } else {
        body
    };
    body.respond(status)
}
