//! 監査レコードの非同期ライター
//!
//! mpscチャネルでコマンドを受信し、単一のワーカーが
//! パーティションファイルへNDJSONを書き込む。日付ローテーション有効時は
//! ローカル時刻の0時にタイマーが同じチャネルへ切替コマンドを積むため、
//! 切替前に積まれたレコードは旧パーティション、後のレコードは新パーティションに入る。

use crate::audit::types::AuditRecord;
use crate::common::error::LogError;
use crate::logging::clock::SharedClock;
use crate::logging::rotation::{FileNaming, PartitionMode, RotatingFileWriter};
use crate::logging::{AppLogger, LogConfig, Severity};
use chrono::{DateTime, Local, TimeZone};
use serde_json::{json, Map, Value};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// 監査ログのサブディレクトリ
pub const REQUESTS_DIR: &str = "requests";
/// チャネル容量の既定値
pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

/// 0時の計算ができない場合（夏時間の境界など）の再試行間隔
const MIDNIGHT_FALLBACK: Duration = Duration::from_secs(60 * 60);

enum AuditCommand {
    Record(Box<AuditRecord>),
    Rotate,
    Flush(oneshot::Sender<()>),
}

/// 監査レコーダー
///
/// Clone可能（senderのクローン）。すべてのクローンが破棄されるとワーカーは
/// 残りを書き出して終了する。
#[derive(Debug, Clone)]
pub struct AuditRecorder {
    sender: mpsc::Sender<AuditCommand>,
}

impl std::fmt::Debug for AuditCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Record(record) => write!(f, "Record({} {})", record.method, record.path),
            Self::Rotate => f.write_str("Rotate"),
            Self::Flush(_) => f.write_str("Flush"),
        }
    }
}

impl AuditRecorder {
    /// レコーダーを作成し、ワーカーと（日付ローテーション時は）切替タイマーを起動する
    ///
    /// 書き込み先は `<directory>/requests/requests-<YYYY-MM-DD>.log`、
    /// 日付ローテーション無効時は `<directory>/requests/requests.log`。
    pub fn new(
        config: &LogConfig,
        clock: SharedClock,
        logger: Arc<AppLogger>,
        capacity: usize,
    ) -> Result<Self, LogError> {
        let directory = config.directory.join(REQUESTS_DIR);
        let naming = if config.rotate_daily {
            FileNaming::Daily {
                prefix: "requests-".to_string(),
                suffix: ".log".to_string(),
            }
        } else {
            FileNaming::Fixed("requests.log".to_string())
        };
        let writer = RotatingFileWriter::new(
            &directory,
            naming,
            config.rotation_policy(),
            clock.clone(),
            PartitionMode::Pinned,
        )
        .map_err(|source| LogError::InitFailure {
            path: directory.clone(),
            source,
        })?;

        let (tx, rx) = mpsc::channel(capacity.max(1));

        let worker_clock = clock.clone();
        let worker_logger = logger.clone();
        std::thread::Builder::new()
            .name("reqguard-audit".to_string())
            .spawn(move || consume(rx, writer, worker_clock, worker_logger))
            .map_err(|source| LogError::InitFailure {
                path: directory.clone(),
                source,
            })?;

        if config.rotate_daily {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(midnight_timer(tx.downgrade(), clock));
                }
                Err(_) => {
                    warn!("No async runtime available; daily audit partition swap is disabled");
                }
            }
        }

        logger.log(
            Severity::Info,
            "Request audit log initialized",
            fields(json!({
                "directory": directory.display().to_string(),
                "rotate_daily": config.rotate_daily,
            })),
        );

        Ok(Self { sender: tx })
    }

    /// レコードを積む（非同期、ブロックしない）
    ///
    /// チャネルが満杯ならレコードは破棄され、警告が記録される。
    pub fn record(&self, record: AuditRecord) {
        if let Err(e) = self.sender.try_send(AuditCommand::Record(Box::new(record))) {
            warn!("Failed to enqueue audit record: {}", e);
        }
    }

    /// パーティション切替を積み、処理完了まで待つ
    pub async fn rotate_now(&self) {
        if self.sender.send(AuditCommand::Rotate).await.is_err() {
            warn!("Audit recorder is closed; partition swap skipped");
            return;
        }
        self.flush().await;
    }

    /// これまでに積まれたレコードがすべて書き込まれるまで待つ
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.sender.send(AuditCommand::Flush(done_tx)).await.is_err() {
            return;
        }
        let _ = done_rx.await;
    }
}

/// 次のローカル0時までの待ち時間
pub fn until_next_midnight(now: DateTime<Local>) -> Duration {
    let next_midnight = now
        .date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest());

    match next_midnight {
        Some(midnight) => (midnight - now)
            .to_std()
            .unwrap_or(MIDNIGHT_FALLBACK)
            .max(Duration::from_millis(1)),
        None => MIDNIGHT_FALLBACK,
    }
}

async fn midnight_timer(sender: mpsc::WeakSender<AuditCommand>, clock: SharedClock) {
    loop {
        tokio::time::sleep(until_next_midnight(clock.now())).await;

        let Some(sender) = sender.upgrade() else {
            debug!("Audit recorder dropped; partition timer stopped");
            return;
        };
        if sender.send(AuditCommand::Rotate).await.is_err() {
            return;
        }
    }
}

fn consume(
    mut rx: mpsc::Receiver<AuditCommand>,
    mut writer: RotatingFileWriter,
    clock: SharedClock,
    logger: Arc<AppLogger>,
) {
    while let Some(command) = rx.blocking_recv() {
        match command {
            AuditCommand::Record(record) => write_record(&mut writer, &record, &logger),
            AuditCommand::Rotate => {
                let today = clock.now().date_naive();
                match writer.swap_partition(today) {
                    Ok(true) => logger.log(
                        Severity::Info,
                        "Request audit partition swapped",
                        fields(json!({ "partition": today.to_string() })),
                    ),
                    Ok(false) => {}
                    Err(e) => logger.log(
                        Severity::Error,
                        "Failed to swap request audit partition",
                        fields(json!({ "error": LogError::Write(e).to_string() })),
                    ),
                }
            }
            AuditCommand::Flush(done) => {
                if let Err(e) = writer.flush() {
                    logger.log(
                        Severity::Error,
                        "Failed to flush request audit log",
                        fields(json!({ "error": e.to_string() })),
                    );
                }
                let _ = done.send(());
            }
        }
    }

    let _ = writer.flush();
}

fn write_record(writer: &mut RotatingFileWriter, record: &AuditRecord, logger: &AppLogger) {
    let mut line = match serde_json::to_vec(record) {
        Ok(line) => line,
        Err(e) => {
            logger.log(
                Severity::Error,
                "Failed to serialize request audit record",
                fields(json!({ "error": LogError::Serialization(e).to_string() })),
            );
            return;
        }
    };
    line.push(b'\n');

    if let Err(e) = writer.write_all(&line) {
        logger.log(
            Severity::Error,
            "Failed to write request audit record",
            fields(json!({
                "error": LogError::Write(e).to_string(),
                "path": writer.current_path().display().to_string(),
            })),
        );
    }
}

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
