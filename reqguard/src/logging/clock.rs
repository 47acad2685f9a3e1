//! 時刻ソース
//!
//! ロガーと監査ライターはパーティション日付を時計から求める。
//! テストでは `ManualClock` で日付境界を再現する。

use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex};

/// 現在時刻の供給元
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// 現在のローカル時刻
    fn now(&self) -> DateTime<Local>;
}

/// 共有される時計
pub type SharedClock = Arc<dyn Clock>;

/// システム時計
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// 手動で進める時計（テスト用）
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Local>>>,
}

impl ManualClock {
    /// 指定時刻で開始
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// 時刻を設定
    pub fn set(&self, at: DateTime<Local>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    /// 時刻を進める
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
