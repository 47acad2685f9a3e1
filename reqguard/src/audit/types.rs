//! 監査レコードの型定義

use axum::http::HeaderMap;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 監査レコードに残すリクエストヘッダー（サイズ抑制のため限定）
pub const SELECTED_HEADERS: [&str; 7] = [
    "Content-Type",
    "Accept",
    "Origin",
    "Referer",
    "X-Forwarded-For",
    "X-Real-IP",
    "User-Agent",
];

/// 1リクエスト分の監査レコード（NDJSONの1行）
///
/// 作成後は変更されず、所有権ごとレコーダーに渡される。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// 記録時刻
    pub time: DateTime<Local>,
    /// HTTPメソッド
    pub method: String,
    /// リクエストパス
    pub path: String,
    /// 生のクエリ文字列
    pub query: String,
    /// HTTPステータスコード
    pub status: u16,
    /// クライアントIP
    pub ip: String,
    /// User-Agent
    pub user_agent: String,
    /// 処理時間（ミリ秒、マイクロ秒精度）
    pub latency_ms: f64,
    /// リクエストID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// ハンドラーまたは認証ゲートのエラー内容
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// ルートパラメータ
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    /// 選択されたリクエストヘッダー
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

/// `SELECTED_HEADERS` のうち値を持つものを取り出す
pub fn selected_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    SELECTED_HEADERS
        .iter()
        .filter_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect()
}
