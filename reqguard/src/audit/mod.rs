//! リクエスト監査ログ
//!
//! 全リクエストのメタデータを日付パーティション付きNDJSONファイルに非同期で記録する

/// 監査レコードの型定義
pub mod types;

/// 非同期レコーダー（パーティション切替タイマー付き）
pub mod writer;

pub use types::AuditRecord;
pub use writer::AuditRecorder;
