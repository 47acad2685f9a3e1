//! Integration Test: 監査ログのパーティション切替
//!
//! 並行に積まれたレコードが、切替の前後どちらか一方のファイルにだけ書かれることを確認する。

use chrono::{Local, TimeZone};
use reqguard::audit::AuditRecord;
use reqguard::audit::AuditRecorder;
use reqguard::logging::clock::{ManualClock, SharedClock};
use reqguard::logging::{AppLogger, LogConfig};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

const WRITERS: usize = 4;
const RECORDS_PER_WRITER: usize = 100;

fn record(path: String) -> AuditRecord {
    AuditRecord {
        time: Local::now(),
        method: "GET".to_string(),
        path,
        query: String::new(),
        status: 200,
        ip: "127.0.0.1".to_string(),
        user_agent: "swap-test".to_string(),
        latency_ms: 0.1,
        request_id: None,
        error: None,
        params: BTreeMap::new(),
        headers: BTreeMap::new(),
    }
}

fn paths_in(file: &Path) -> Vec<String> {
    std::fs::read_to_string(file)
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str::<AuditRecord>(line).unwrap().path)
        .collect()
}

async fn write_phase(recorder: &AuditRecorder, phase: &str) {
    let mut handles = Vec::new();
    for writer in 0..WRITERS {
        let recorder = recorder.clone();
        let phase = phase.to_string();
        handles.push(tokio::spawn(async move {
            for seq in 0..RECORDS_PER_WRITER {
                recorder.record(record(format!("/{phase}/{writer}/{seq}")));
                tokio::task::yield_now().await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_records_split_cleanly_at_the_swap() {
    let dir = tempfile::tempdir().unwrap();
    let config = LogConfig {
        directory: dir.path().to_path_buf(),
        console_output: false,
        ..LogConfig::default()
    };
    let clock = ManualClock::new(Local.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap());
    let shared: SharedClock = Arc::new(clock.clone());
    let logger = Arc::new(AppLogger::new(&config, shared.clone()).unwrap());
    let recorder = AuditRecorder::new(&config, shared, logger, 4096).unwrap();

    write_phase(&recorder, "day1").await;
    clock.set(Local.with_ymd_and_hms(2026, 3, 15, 0, 0, 1).unwrap());
    recorder.rotate_now().await;
    write_phase(&recorder, "day2").await;
    recorder.flush().await;

    let day1 = paths_in(&dir.path().join("requests/requests-2026-03-14.log"));
    let day2 = paths_in(&dir.path().join("requests/requests-2026-03-15.log"));

    for (paths, phase) in [(&day1, "/day1/"), (&day2, "/day2/")] {
        assert_eq!(paths.len(), WRITERS * RECORDS_PER_WRITER);
        assert!(paths.iter().all(|p| p.starts_with(phase)));
        let unique: HashSet<&String> = paths.iter().collect();
        assert_eq!(unique.len(), paths.len(), "duplicated records in {phase}");
    }
}
