//! IPホワイトリスト
//!
//! パスホワイトリストに一致するリクエストはIP検査を免除する。

use crate::api::error::ErrorBody;
use crate::common::ip::client_ip;
use crate::config::WhitelistConfig;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

/// ホワイトリストの判定器
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    ips: HashSet<String>,
    paths: HashSet<String>,
    ip_enabled: bool,
    path_enabled: bool,
}

impl Whitelist {
    /// 設定から作成
    pub fn new(config: &WhitelistConfig) -> Self {
        Self {
            ips: config.ips.iter().cloned().collect(),
            paths: config.paths.iter().cloned().collect(),
            ip_enabled: config.ip_enabled,
            path_enabled: config.path_enabled,
        }
    }

    /// リクエストを通すか
    pub fn allows(&self, path: &str, ip: Option<&str>) -> bool {
        if self.path_enabled && self.paths.contains(path) {
            return true;
        }
        if !self.ip_enabled {
            return true;
        }
        ip.is_some_and(|ip| self.ips.contains(ip))
    }
}

/// ホワイトリストミドルウェア
pub async fn whitelist_middleware(
    State(whitelist): State<Arc<Whitelist>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let ip = client_ip(request.headers(), peer.as_ref());

    if !whitelist.allows(request.uri().path(), ip.as_deref()) {
        tracing::warn!(
            ip = ip.as_deref().unwrap_or("unknown"),
            path = request.uri().path(),
            "Rejected request from non-whitelisted IP"
        );
        return ErrorBody::new(StatusCode::FORBIDDEN, "IP address is not whitelisted")
            .respond(StatusCode::FORBIDDEN);
    }

    next.run(request).await
}
