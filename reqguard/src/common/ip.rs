//! IPアドレス正規化ユーティリティ
//!
//! IPv4-mapped IPv6アドレスをIPv4に正規化し、プロキシヘッダーからクライアントIPを解決する

use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

/// IPアドレスを正規化する
///
/// IPv4-mapped IPv6（::ffff:x.x.x.x）をIPv4に変換。
/// それ以外はそのまま返す。
pub fn normalize_ip(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                IpAddr::V4(v4)
            } else {
                IpAddr::V6(v6)
            }
        }
        v4 => v4,
    }
}

/// クライアントIPを解決する
///
/// `X-Forwarded-For` の先頭、`X-Real-IP`、接続元アドレスの順に参照する。
/// 空や非UTF-8のヘッダーは無視して次の候補に進む。
pub fn client_ip(headers: &HeaderMap, peer: Option<&SocketAddr>) -> Option<String> {
    ["x-forwarded-for", "x-real-ip"]
        .into_iter()
        .find_map(|name| first_hop(headers, name))
        .or_else(|| peer.map(|addr| normalize_ip(addr.ip()).to_string()))
}

fn first_hop(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?;
    let hop = value.split(',').next().unwrap_or(value).trim();
    (!hop.is_empty()).then(|| hop.to_string())
}
