//! 構造化ロガー
//!
//! 重大度で2系統（error以上 / それ未満）に分かれた日付パーティション付きJSON Linesシンク。
//! ファイル書き込みは `tracing-appender` の non-blocking ワーカーに委譲し、
//! 呼び出し側はディスクI/Oを待たない。グローバルなシングルトンは持たず、
//! `main` またはテストで明示的に構築する。

/// 時刻ソース
pub mod clock;

/// ローテーションファイルライター
pub mod rotation;

/// `tracing` イベントをロガーへ転送するレイヤー
pub mod layer;

use crate::common::error::LogError;
use crate::logging::clock::SharedClock;
use crate::logging::rotation::{FileNaming, PartitionMode, RotatingFileWriter, RotationPolicy};
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};

pub use layer::LogLayer;

/// ログレコードのタイムスタンプ書式（ISO-8601、ミリ秒、UTCオフセット）
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

const BYTES_PER_MB: u64 = 1024 * 1024;
const SECS_PER_DAY: u64 = 24 * 60 * 60;
const RESERVED_KEYS: [&str; 3] = ["time", "level", "msg"];

/// ロガー設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// ログディレクトリ
    pub directory: PathBuf,
    /// 日付ローテーション無効時のファイル名
    pub file_name: String,
    /// 1ファイルの最大サイズ（MB、0で無制限）
    pub max_size_mb: u64,
    /// 退避ファイルの最大保持数（0で無制限）
    pub max_backups: usize,
    /// 保持日数（0で無制限）
    pub max_age_days: u64,
    /// 退避ファイルをgzip圧縮するか
    pub compress: bool,
    /// コンソールにも出力するか
    pub console_output: bool,
    /// 日付ごとにファイルを分けるか
    pub rotate_daily: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_name: "app.log".to_string(),
            max_size_mb: 100,
            max_backups: 10,
            max_age_days: 30,
            compress: true,
            console_output: true,
            rotate_daily: true,
        }
    }
}

impl LogConfig {
    /// ローテーション方針
    pub fn rotation_policy(&self) -> RotationPolicy {
        RotationPolicy {
            max_bytes: self.max_size_mb.saturating_mul(BYTES_PER_MB),
            max_backups: self.max_backups,
            max_age: (self.max_age_days > 0)
                .then(|| Duration::from_secs(self.max_age_days.saturating_mul(SECS_PER_DAY))),
            compress: self.compress,
        }
    }

    fn info_naming(&self) -> FileNaming {
        if self.rotate_daily {
            FileNaming::Daily {
                prefix: String::new(),
                suffix: ".log".to_string(),
            }
        } else {
            FileNaming::Fixed(format!("info_{}", self.file_name))
        }
    }

    fn error_naming(&self) -> FileNaming {
        if self.rotate_daily {
            FileNaming::Daily {
                prefix: String::new(),
                suffix: "_error.log".to_string(),
            }
        } else {
            FileNaming::Fixed(format!("error_{}", self.file_name))
        }
    }
}

/// ログの重大度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// デバッグ
    Debug,
    /// 情報
    Info,
    /// 警告
    Warn,
    /// エラー
    Error,
    /// 致命的（プロセスは終了しない）
    Fatal,
}

impl Severity {
    /// エラー系（error以上）の出力先に振り分けるか
    pub fn is_error_class(self) -> bool {
        self >= Self::Error
    }

    /// 小文字のラベル
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }

    /// HTTPステータスからアクセスログの重大度を決める
    pub fn for_status(status: u16) -> Self {
        if status >= 500 {
            Self::Error
        } else if status >= 400 {
            Self::Warn
        } else {
            Self::Info
        }
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Self::Error,
            tracing::Level::WARN => Self::Warn,
            tracing::Level::INFO => Self::Info,
            _ => Self::Debug,
        }
    }
}

/// 1行分のログレコード
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    /// タイムスタンプ（`TIME_FORMAT`）
    pub time: String,
    /// 重大度
    pub level: Severity,
    /// メッセージ
    pub msg: String,
    /// 追加フィールド
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl LogRecord {
    /// レコードを作成する（予約キーと衝突するフィールドは捨てる）
    pub fn new(
        time: DateTime<Local>,
        level: Severity,
        msg: impl Into<String>,
        mut fields: Map<String, Value>,
    ) -> Self {
        fields.retain(|key, _| !RESERVED_KEYS.contains(&key.as_str()));
        Self {
            time: time.format(TIME_FORMAT).to_string(),
            level,
            msg: msg.into(),
            fields,
        }
    }
}

/// アプリケーションロガー
pub struct AppLogger {
    info: NonBlocking,
    error: NonBlocking,
    console_output: bool,
    clock: SharedClock,
    guards: Mutex<Vec<WorkerGuard>>,
}

impl std::fmt::Debug for AppLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppLogger")
            .field("console_output", &self.console_output)
            .finish_non_exhaustive()
    }
}

impl AppLogger {
    /// ロガーを構築する
    ///
    /// ログディレクトリを作成できない場合は `LogError::InitFailure`。
    pub fn new(config: &LogConfig, clock: SharedClock) -> Result<Self, LogError> {
        std::fs::create_dir_all(&config.directory).map_err(|source| LogError::InitFailure {
            path: config.directory.clone(),
            source,
        })?;

        let open = |naming: FileNaming| {
            RotatingFileWriter::new(
                &config.directory,
                naming,
                config.rotation_policy(),
                clock.clone(),
                PartitionMode::FollowClock,
            )
            .map_err(|source| LogError::InitFailure {
                path: config.directory.clone(),
                source,
            })
        };
        let info_writer = open(config.info_naming())?;
        let error_writer = open(config.error_naming())?;

        let (info, info_guard) = NonBlockingBuilder::default()
            .lossy(false)
            .thread_name("reqguard-log-info")
            .finish(info_writer);
        let (error, error_guard) = NonBlockingBuilder::default()
            .lossy(false)
            .thread_name("reqguard-log-error")
            .finish(error_writer);

        Ok(Self {
            info,
            error,
            console_output: config.console_output,
            clock,
            guards: Mutex::new(vec![info_guard, error_guard]),
        })
    }

    /// レコードを書き込む
    ///
    /// 書き込みはワーカースレッドに渡され、呼び出し側はディスクI/Oを待たない。
    /// ロガー自身の失敗は標準エラーに報告して握りつぶす。
    pub fn log(&self, severity: Severity, msg: impl Into<String>, fields: Map<String, Value>) {
        let record = LogRecord::new(self.clock.now(), severity, msg, fields);
        let mut line = match serde_json::to_vec(&record) {
            Ok(line) => line,
            Err(e) => {
                eprintln!("{}", LogError::Serialization(e));
                return;
            }
        };
        line.push(b'\n');

        let mut sink = if severity.is_error_class() {
            self.error.clone()
        } else {
            self.info.clone()
        };
        if let Err(e) = sink.write_all(&line) {
            eprintln!("{}", LogError::Write(e));
        }

        if self.console_output {
            let result = if severity.is_error_class() {
                std::io::stderr().lock().write_all(&line)
            } else {
                std::io::stdout().lock().write_all(&line)
            };
            if let Err(e) = result {
                eprintln!("{}", LogError::Write(e));
            }
        }
    }

    /// フィールドなしで書き込む
    pub fn message(&self, severity: Severity, msg: impl Into<String>) {
        self.log(severity, msg, Map::new());
    }

    /// ワーカーに残っているレコードを書き出して停止する
    ///
    /// 以降の書き込みは破棄される。
    pub fn shutdown(&self) {
        let guards: Vec<WorkerGuard> = self
            .guards
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        drop(guards);
    }
}
