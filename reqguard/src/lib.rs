//! reqguard: Request authentication & audit service
//!
//! 署名付きリクエストの検証、JWTセッション、構造化ログと監査記録を行うWebサーバー

#![warn(missing_docs)]

/// 共通型定義（エラー、IP）
pub mod common;

/// REST APIハンドラー
pub mod api;

/// 認証機能（署名、リプレイ対策、JWT、パスワード）
pub mod auth;

/// 構造化ロガー
pub mod logging;

/// リクエスト監査ログ
pub mod audit;

/// ログと監査の統合サービス
pub mod observability;

/// リクエストパイプライン
pub mod pipeline;

/// 設定管理（環境変数ヘルパー）
pub mod config;

/// ユーザーストア
pub mod store;

/// CLIインターフェース
pub mod cli;

/// サーバー起動
pub mod server;

/// Shutdown controller
pub mod shutdown;

use auth::password::PasswordHasher;
use auth::replay::{ReplayGuard, DEFAULT_NONCE_CAPACITY};
use config::AppConfig;
use observability::Observability;
use pipeline::Authenticator;
use std::sync::Arc;
use store::UserStore;

/// アプリケーション状態
#[derive(Clone)]
pub struct AppState {
    /// 設定（読み取り専用）
    pub config: Arc<AppConfig>,
    /// ログと監査
    pub observability: Observability,
    /// 署名・セッション検証器
    pub authenticator: Arc<Authenticator>,
    /// ユーザーストア
    pub users: Arc<dyn UserStore>,
    /// パスワードハッシュ
    pub hasher: Arc<dyn PasswordHasher>,
    /// Cooperative shutdown controller
    pub shutdown: shutdown::ShutdownController,
}

impl AppState {
    /// 設定とコラボレーターから状態を組み立てる
    pub fn new(
        config: AppConfig,
        observability: Observability,
        users: Arc<dyn UserStore>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        let mut guard = ReplayGuard::new(
            config.signature.app_key.clone(),
            config.signature.expire,
        );
        if config.signature.nonce_cache {
            guard = guard.with_nonce_cache(DEFAULT_NONCE_CAPACITY);
        }
        let authenticator = Authenticator::new(
            guard,
            config.signature.app_secret.clone(),
            config.jwt.secret.clone().into_bytes(),
        );

        Self {
            config: Arc::new(config),
            observability,
            authenticator: Arc::new(authenticator),
            users,
            hasher,
            shutdown: shutdown::ShutdownController::default(),
        }
    }
}
