//! エラー型定義
//!
//! 統一エラー型（thiserror使用）
//!
//! `AuthError` はクライアントへ返す拒否理由、`LogError` はログ基盤の失敗を表す。
//! どちらもダイジェストや秘密鍵などの内部情報を外部メッセージに含めない。

use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// 認証パイプラインのエラー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// app_key が設定値と一致しない
    #[error("Invalid app key")]
    InvalidAppKey,

    /// 署名のタイムスタンプ、またはセッショントークンの有効期限切れ
    #[error("Credential expired")]
    Expired,

    /// 構造を解析できない（ヘッダー形式、パラメータ重複、トークン破損など）
    #[error("Malformed credentials")]
    Malformed,

    /// 署名またはトークンの改ざん検知
    #[error("Signature mismatch")]
    BadSignature,

    /// 必須の認証情報が存在しない
    #[error("Missing credentials")]
    MissingCredentials,

    /// ノンスキャッシュ有効時、同一ノンスの再利用
    #[error("Request replayed")]
    Replayed,
}

impl AuthError {
    /// 機械可読な安定エラーコード
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAppKey => "invalid_app_key",
            Self::Expired => "expired",
            Self::Malformed => "malformed",
            Self::BadSignature => "bad_signature",
            Self::MissingCredentials => "missing_credentials",
            Self::Replayed => "replayed",
        }
    }

    /// Returns a safe error message for external clients.
    pub fn external_message(&self) -> &'static str {
        match self {
            Self::InvalidAppKey => "Invalid app key",
            Self::Expired => "Credential expired",
            Self::Malformed => "Malformed credentials",
            Self::BadSignature => "Signature verification failed",
            Self::MissingCredentials => "Authentication required",
            Self::Replayed => "Request already processed",
        }
    }
}

/// ログ基盤のエラー
#[derive(Debug, Error)]
pub enum LogError {
    /// ログディレクトリを作成できない（起動時に致命的）
    #[error("Failed to initialize log directory {path}: {source}")]
    InitFailure {
        /// 作成しようとしたディレクトリ
        path: PathBuf,
        /// 原因
        #[source]
        source: std::io::Error,
    },

    /// レコードのシリアライズ失敗（レコードは破棄される）
    #[error("Failed to serialize log record: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 書き込み失敗（ログ出力して継続）
    #[error("Failed to write log partition: {0}")]
    Write(#[from] std::io::Error),
}

impl LogError {
    /// 起動を中断すべきエラーか
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InitFailure { .. })
    }
}

/// 設定エラー
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 必須の環境変数が未設定
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    /// 値の形式が不正
    #[error("Invalid value for {name}: {value}")]
    Invalid {
        /// 環境変数名
        name: &'static str,
        /// 与えられた値
        value: String,
    },
}

/// ハンドラーが返すエラー種別
#[derive(Debug, Error)]
pub enum ApiError {
    /// リクエスト不正
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// 認証失敗（ログイン失敗など）
    #[error("Authentication error: {0}")]
    Unauthorized(String),

    /// リソースなし
    #[error("Not found: {0}")]
    NotFound(String),

    /// 重複
    #[error("Conflict: {0}")]
    Conflict(String),

    /// 内部エラー
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Returns a safe error message for external clients.
    ///
    /// The `Display` implementation carries the full detail and is only
    /// written to the application and audit logs.
    pub fn external_message(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "Invalid request parameters",
            Self::Unauthorized(_) => "Authentication failed",
            Self::NotFound(_) => "Not found",
            Self::Conflict(_) => "Resource conflict",
            Self::Internal(_) => "Internal server error",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
