// リプレイ対策（app_key照合、タイムスタンプ鮮度、任意のノンスキャッシュ）

use crate::auth::signature::SignedRequest;
use crate::common::error::AuthError;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// ノンスキャッシュの既定上限
pub const DEFAULT_NONCE_CAPACITY: usize = 100_000;

/// タイムスタンプが鮮度ウィンドウ内か判定する
///
/// `now - timestamp <= window` のみを見る。未来のタイムスタンプ（負の経過時間）は受理される。
pub fn is_fresh(timestamp: i64, now: i64, window: Duration) -> bool {
    let window_secs = i64::try_from(window.as_secs()).unwrap_or(i64::MAX);
    now.saturating_sub(timestamp) <= window_secs
}

/// 署名付きリクエストのリプレイガード
#[derive(Debug)]
pub struct ReplayGuard {
    app_key: String,
    window: Duration,
    nonces: Option<NonceCache>,
}

impl ReplayGuard {
    /// ノンスを追跡しないガードを作成
    pub fn new(app_key: impl Into<String>, window: Duration) -> Self {
        Self {
            app_key: app_key.into(),
            window,
            nonces: None,
        }
    }

    /// `(app_key, nonce)` の再利用を鮮度ウィンドウの間拒否する
    pub fn with_nonce_cache(mut self, capacity: usize) -> Self {
        self.nonces = Some(NonceCache::new(capacity));
        self
    }

    /// 鮮度ウィンドウ
    pub fn window(&self) -> Duration {
        self.window
    }

    /// app_key と鮮度を検証する（app_key 不一致が優先）
    pub fn check(&self, request: &SignedRequest, now: i64) -> Result<(), AuthError> {
        if request.app_key != self.app_key {
            return Err(AuthError::InvalidAppKey);
        }
        if !is_fresh(request.timestamp, now, self.window) {
            return Err(AuthError::Expired);
        }
        Ok(())
    }

    /// 署名検証済みリクエストのノンスを消費する
    ///
    /// キャッシュ無効時は常に成功する。
    pub fn admit_nonce(&self, request: &SignedRequest, now: i64) -> Result<(), AuthError> {
        match &self.nonces {
            Some(cache) => cache.admit(
                &request.app_key,
                &request.nonce,
                request.timestamp,
                now,
                self.window,
            ),
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
struct NonceCache {
    capacity: usize,
    state: Mutex<NonceState>,
}

#[derive(Debug, Default)]
struct NonceState {
    seen: HashMap<(String, String), i64>,
    order: VecDeque<((String, String), i64)>,
}

impl NonceCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(NonceState::default()),
        }
    }

    fn admit(
        &self,
        app_key: &str,
        nonce: &str,
        timestamp: i64,
        now: i64,
        window: Duration,
    ) -> Result<(), AuthError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        // ウィンドウ外のエントリは鮮度チェックで弾かれるため保持不要
        while let Some(&(_, ts)) = state.order.front() {
            if is_fresh(ts, now, window) && state.order.len() < self.capacity {
                break;
            }
            if let Some((key, _)) = state.order.pop_front() {
                state.seen.remove(&key);
            }
        }

        let key = (app_key.to_string(), nonce.to_string());
        if state.seen.contains_key(&key) {
            return Err(AuthError::Replayed);
        }
        state.seen.insert(key.clone(), timestamp);
        state.order.push_back((key, timestamp));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(300);

    fn request(app_key: &str, timestamp: i64, nonce: &str) -> SignedRequest {
        let pairs = vec![
            ("app_key".to_string(), app_key.to_string()),
            ("timestamp".to_string(), timestamp.to_string()),
            ("nonce".to_string(), nonce.to_string()),
            ("sign".to_string(), "00".to_string()),
        ];
        SignedRequest::from_pairs(pairs, None).unwrap().unwrap()
    }

    #[test]
    fn fresh_at_window_boundary() {
        assert!(is_fresh(1000, 1000, WINDOW));
        assert!(is_fresh(1000, 1300, WINDOW));
        assert!(!is_fresh(1000, 1301, WINDOW));
    }

    #[test]
    fn future_timestamps_are_accepted() {
        assert!(is_fresh(5000, 1000, WINDOW));
    }

    #[test]
    fn extreme_values_do_not_overflow() {
        assert!(!is_fresh(i64::MIN, i64::MAX, WINDOW));
        assert!(is_fresh(i64::MAX, i64::MIN, WINDOW));
        assert!(is_fresh(0, 10, Duration::from_secs(u64::MAX)));
    }

    #[test]
    fn wrong_app_key_wins_over_expiry() {
        let guard = ReplayGuard::new("demo", WINDOW);
        let stale = request("other", 0, "n");
        assert_eq!(guard.check(&stale, 10_000), Err(AuthError::InvalidAppKey));
    }

    #[test]
    fn stale_request_is_expired() {
        let guard = ReplayGuard::new("demo", WINDOW);
        assert_eq!(
            guard.check(&request("demo", 0, "n"), 10_000),
            Err(AuthError::Expired)
        );
        assert_eq!(guard.check(&request("demo", 9_900, "n"), 10_000), Ok(()));
    }

    #[test]
    fn without_cache_replays_are_accepted() {
        let guard = ReplayGuard::new("demo", WINDOW);
        let req = request("demo", 1000, "abc");
        assert!(guard.admit_nonce(&req, 1000).is_ok());
        assert!(guard.admit_nonce(&req, 1001).is_ok());
    }

    #[test]
    fn cache_rejects_repeated_nonce_within_window() {
        let guard = ReplayGuard::new("demo", WINDOW).with_nonce_cache(16);
        let req = request("demo", 1000, "abc");
        assert!(guard.admit_nonce(&req, 1000).is_ok());
        assert_eq!(guard.admit_nonce(&req, 1001), Err(AuthError::Replayed));
        assert!(guard.admit_nonce(&request("demo", 1000, "def"), 1001).is_ok());
    }

    #[test]
    fn cache_forgets_nonces_after_window() {
        let guard = ReplayGuard::new("demo", WINDOW).with_nonce_cache(16);
        assert!(guard.admit_nonce(&request("demo", 1000, "abc"), 1000).is_ok());
        // ウィンドウ経過後の同一ノンスは鮮度チェックで拒否される前提で忘れてよい
        assert!(guard.admit_nonce(&request("demo", 1400, "abc"), 1400).is_ok());
    }

    #[test]
    fn cache_is_bounded() {
        let guard = ReplayGuard::new("demo", WINDOW).with_nonce_cache(2);
        for nonce in ["a", "b", "c"] {
            assert!(guard.admit_nonce(&request("demo", 1000, nonce), 1000).is_ok());
        }
        let state = guard.nonces.as_ref().unwrap().state.lock().unwrap();
        assert_eq!(state.seen.len(), 2);
        assert!(!state.seen.contains_key(&("demo".to_string(), "a".to_string())));
    }
}
