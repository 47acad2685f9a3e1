//! Integration Test: 並行ログ書き込み
//!
//! 多数のタスクから同時に書き込んでも、行が混ざらず欠けないことを確認する。

use reqguard::logging::clock::SystemClock;
use reqguard::logging::{LogConfig, Severity};
use reqguard::observability::Observability;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::Arc;

const TASKS: usize = 100;
const RECORDS_PER_TASK: usize = 100;

fn read_lines(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).expect("log line is not valid JSON"))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_events_are_written_whole() {
    let dir = tempfile::tempdir().unwrap();
    let config = LogConfig {
        directory: dir.path().to_path_buf(),
        console_output: false,
        ..LogConfig::default()
    };
    let observability = Observability::new(&config, Arc::new(SystemClock)).unwrap();

    let mut handles = Vec::with_capacity(TASKS);
    for task in 0..TASKS {
        let observability = observability.clone();
        handles.push(tokio::spawn(async move {
            for seq in 0..RECORDS_PER_TASK {
                let mut fields = Map::new();
                fields.insert("task".to_string(), json!(task));
                fields.insert("seq".to_string(), json!(seq));
                if seq % 10 == 0 {
                    observability.log_event(Severity::Error, "worker failed", fields);
                } else {
                    observability.log_event(Severity::Info, "worker tick", fields);
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    observability.shutdown().await;

    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    let info = read_lines(&dir.path().join(format!("{today}.log")));
    let errors = read_lines(&dir.path().join(format!("{today}_error.log")));

    let ticks = info.iter().filter(|v| v["msg"] == "worker tick").count();
    let failures = errors.iter().filter(|v| v["msg"] == "worker failed").count();
    assert_eq!(ticks, TASKS * RECORDS_PER_TASK * 9 / 10);
    assert_eq!(failures, TASKS * RECORDS_PER_TASK / 10);

    // エラー系はエラーファイルにだけ書かれる
    assert!(info.iter().all(|v| v["msg"] != "worker failed"));
    assert!(errors.iter().all(|v| v["level"] == "error"));
}
