//! 観測サービス
//!
//! アプリケーションログと監査ログの2つのシンクを所有し、
//! `log_event` と `record_audit` だけを公開する。

use crate::audit::writer::DEFAULT_BUFFER_CAPACITY;
use crate::audit::{AuditRecord, AuditRecorder};
use crate::common::error::LogError;
use crate::logging::clock::SharedClock;
use crate::logging::{AppLogger, LogConfig, Severity};
use serde_json::{Map, Value};
use std::sync::Arc;

/// ログと監査の統合サービス
#[derive(Debug, Clone)]
pub struct Observability {
    logger: Arc<AppLogger>,
    audit: AuditRecorder,
}

impl Observability {
    /// ロガーと監査レコーダーを構築する
    pub fn new(config: &LogConfig, clock: SharedClock) -> Result<Self, LogError> {
        let logger = Arc::new(AppLogger::new(config, clock.clone())?);
        Self::with_logger(config, clock, logger)
    }

    /// 構築済みのロガーを共有して監査レコーダーを起動する
    pub fn with_logger(
        config: &LogConfig,
        clock: SharedClock,
        logger: Arc<AppLogger>,
    ) -> Result<Self, LogError> {
        let audit = AuditRecorder::new(config, clock, logger.clone(), DEFAULT_BUFFER_CAPACITY)?;
        Ok(Self { logger, audit })
    }

    /// アプリケーションログ
    pub fn logger(&self) -> &Arc<AppLogger> {
        &self.logger
    }

    /// アプリケーションイベントを記録する
    pub fn log_event(&self, severity: Severity, msg: impl Into<String>, fields: Map<String, Value>) {
        self.logger.log(severity, msg, fields);
    }

    /// 監査レコードを積む（ブロックしない）
    pub fn record_audit(&self, record: AuditRecord) {
        self.audit.record(record);
    }

    /// 積まれた監査レコードの書き込み完了を待つ
    pub async fn flush(&self) {
        self.audit.flush().await;
    }

    /// 監査レコードを書き出し、ロガーのワーカーを停止する
    pub async fn shutdown(&self) {
        self.audit.flush().await;
        self.logger.shutdown();
    }
}
