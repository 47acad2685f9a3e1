//! Configuration management via environment variables
//!
//! Provides helper functions for reading environment variables with fallback
//! to deprecated variable names with warning logs, and the grouped
//! `AppConfig` built from them.

use crate::auth::generate_random_token;
use crate::common::error::ConfigError;
use crate::logging::LogConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Get an environment variable with fallback to a deprecated name
///
/// If the new variable name is set, returns its value.
/// If only the old (deprecated) variable name is set, returns its value
/// and logs a deprecation warning.
///
/// # Arguments
/// * `new_name` - The new environment variable name (preferred)
/// * `old_name` - The deprecated environment variable name (fallback)
///
/// # Returns
/// * `Some(value)` - The environment variable value
/// * `None` - Neither variable is set
///
/// # Example
/// ```
/// use reqguard::config::get_env_with_fallback;
///
/// let port = get_env_with_fallback("REQGUARD_PORT", "SERVER_PORT");
/// ```
pub fn get_env_with_fallback(new_name: &str, old_name: &str) -> Option<String> {
    if let Ok(val) = std::env::var(new_name) {
        return Some(val);
    }
    if let Ok(val) = std::env::var(old_name) {
        tracing::warn!(
            "Environment variable '{}' is deprecated, use '{}' instead",
            old_name,
            new_name
        );
        return Some(val);
    }
    None
}

/// Get an environment variable with fallback and default value
pub fn get_env_with_fallback_or(new_name: &str, old_name: &str, default: &str) -> String {
    get_env_with_fallback(new_name, old_name).unwrap_or_else(|| default.to_string())
}

/// Get an environment variable with fallback, parsing to a specific type
///
/// Returns `default` if neither variable is set or parsing fails.
pub fn get_env_with_fallback_parse<T: std::str::FromStr>(
    new_name: &str,
    old_name: &str,
    default: T,
) -> T {
    get_env_with_fallback(new_name, old_name)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Get a boolean flag (`true/1/yes/on` and `false/0/no/off`)
///
/// Unrecognized values fall back to `default`.
pub fn get_env_with_fallback_bool(new_name: &str, old_name: &str, default: bool) -> bool {
    get_env_with_fallback(new_name, old_name)
        .and_then(|value| match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

/// Get a comma separated list (blank entries are skipped)
pub fn get_env_with_fallback_list(new_name: &str, old_name: &str) -> Vec<String> {
    get_env_with_fallback(new_name, old_name)
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// 秒数で指定された期間を取得（不正値はエラー）
fn get_env_secs(
    new_name: &'static str,
    old_name: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match get_env_with_fallback(new_name, old_name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::Invalid {
                name: new_name,
                value,
            }),
    }
}

/// 実行モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerMode {
    /// 500レスポンスにpanic詳細を含める
    Debug,
    /// 内部情報をクライアントに返さない
    #[default]
    Release,
}

impl ServerMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "release" => Some(Self::Release),
            _ => None,
        }
    }
}

/// サーバー設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// バインドアドレス
    pub host: String,
    /// 待ち受けポート
    pub port: u16,
    /// 実行モード
    pub mode: ServerMode,
}

impl ServerConfig {
    /// `host:port`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// リクエスト署名設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureConfig {
    /// 署名検証を行うか
    pub enabled: bool,
    /// 受け付けるapp_key
    pub app_key: String,
    /// 共有秘密鍵
    pub app_secret: String,
    /// 鮮度ウィンドウ
    pub expire: Duration,
    /// ノンスキャッシュを有効にするか
    pub nonce_cache: bool,
}

/// JWT設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwtConfig {
    /// 署名鍵
    pub secret: String,
    /// トークン有効期間
    pub expire: Duration,
}

/// CORS設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsConfig {
    /// 許可するオリジン
    pub allow_origins: Vec<String>,
    /// 認証情報の送信を許可するか
    pub allow_credentials: bool,
    /// プリフライト結果のキャッシュ期間
    pub max_age: Duration,
}

/// CORSの既定オリジン
pub const DEFAULT_CORS_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://localhost:8080"];

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
            allow_credentials: false,
            max_age: Duration::from_secs(12 * 60 * 60),
        }
    }
}

/// ホワイトリスト設定
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhitelistConfig {
    /// 許可するクライアントIP
    pub ips: Vec<String>,
    /// IP検査を免除するパス
    pub paths: Vec<String>,
    /// IPホワイトリストを有効にするか
    pub ip_enabled: bool,
    /// パスホワイトリストを有効にするか
    pub path_enabled: bool,
}

/// アプリケーション設定
///
/// 起動時に1回だけ読み込み、以後は読み取り専用で共有する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// サーバー
    pub server: ServerConfig,
    /// リクエスト署名
    pub signature: SignatureConfig,
    /// JWT
    pub jwt: JwtConfig,
    /// ロガー
    pub logger: LogConfig,
    /// CORS
    pub cors: CorsConfig,
    /// ホワイトリスト
    pub whitelist: WhitelistConfig,
}

/// 署名の鮮度ウィンドウ既定値
pub const DEFAULT_SIGNATURE_EXPIRE: Duration = Duration::from_secs(300);

/// JWT有効期間既定値
pub const DEFAULT_JWT_EXPIRE: Duration = Duration::from_secs(24 * 60 * 60);

impl AppConfig {
    /// 環境変数から読み込む
    ///
    /// 署名が有効なのに `app_key` / `app_secret` が未設定の場合はエラー。
    /// JWT秘密鍵が未設定の場合はランダム生成し、警告を出す。
    pub fn from_env() -> Result<Self, ConfigError> {
        let mode_raw = get_env_with_fallback_or("REQGUARD_MODE", "SERVER_MODE", "release");
        let mode = ServerMode::parse(&mode_raw).ok_or(ConfigError::Invalid {
            name: "REQGUARD_MODE",
            value: mode_raw,
        })?;
        let port_raw = get_env_with_fallback_or("REQGUARD_PORT", "SERVER_PORT", "8080");
        let port = port_raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name: "REQGUARD_PORT",
            value: port_raw.clone(),
        })?;
        let server = ServerConfig {
            host: get_env_with_fallback_or("REQGUARD_HOST", "SERVER_HOST", "0.0.0.0"),
            port,
            mode,
        };

        let enabled =
            get_env_with_fallback_bool("REQGUARD_SIGNATURE_ENABLED", "SIGNATURE_ENABLED", true);
        let app_key = get_env_with_fallback("REQGUARD_SIGNATURE_APP_KEY", "SIGNATURE_APP_KEY")
            .unwrap_or_default();
        let app_secret =
            get_env_with_fallback("REQGUARD_SIGNATURE_APP_SECRET", "SIGNATURE_APP_SECRET")
                .unwrap_or_default();
        if enabled && app_key.is_empty() {
            return Err(ConfigError::Missing("REQGUARD_SIGNATURE_APP_KEY"));
        }
        if enabled && app_secret.is_empty() {
            return Err(ConfigError::Missing("REQGUARD_SIGNATURE_APP_SECRET"));
        }
        let signature = SignatureConfig {
            enabled,
            app_key,
            app_secret,
            expire: get_env_secs(
                "REQGUARD_SIGNATURE_EXPIRE",
                "SIGNATURE_EXPIRE",
                DEFAULT_SIGNATURE_EXPIRE,
            )?,
            nonce_cache: get_env_with_fallback_bool(
                "REQGUARD_SIGNATURE_NONCE_CACHE",
                "SIGNATURE_NONCE_CACHE",
                false,
            ),
        };

        let secret = match get_env_with_fallback("REQGUARD_JWT_SECRET", "JWT_SECRET") {
            Some(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!(
                    "REQGUARD_JWT_SECRET is not set; generated a random secret (sessions will not survive a restart)"
                );
                generate_random_token(64)
            }
        };
        let jwt = JwtConfig {
            secret,
            expire: get_env_secs("REQGUARD_JWT_EXPIRE", "JWT_EXPIRE", DEFAULT_JWT_EXPIRE)?,
        };

        let defaults = LogConfig::default();
        let logger = LogConfig {
            directory: get_env_with_fallback("REQGUARD_LOGGER_DIR", "LOGGER_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.directory),
            file_name: get_env_with_fallback_or(
                "REQGUARD_LOGGER_FILENAME",
                "LOGGER_FILENAME",
                &defaults.file_name,
            ),
            max_size_mb: get_env_with_fallback_parse(
                "REQGUARD_LOGGER_MAX_SIZE",
                "LOGGER_MAX_SIZE",
                defaults.max_size_mb,
            ),
            max_backups: get_env_with_fallback_parse(
                "REQGUARD_LOGGER_MAX_BACKUPS",
                "LOGGER_MAX_BACKUPS",
                defaults.max_backups,
            ),
            max_age_days: get_env_with_fallback_parse(
                "REQGUARD_LOGGER_MAX_AGE",
                "LOGGER_MAX_AGE",
                defaults.max_age_days,
            ),
            compress: get_env_with_fallback_bool(
                "REQGUARD_LOGGER_COMPRESS",
                "LOGGER_COMPRESS",
                defaults.compress,
            ),
            console_output: get_env_with_fallback_bool(
                "REQGUARD_LOGGER_CONSOLE_OUTPUT",
                "LOGGER_CONSOLE_OUTPUT",
                defaults.console_output,
            ),
            rotate_daily: get_env_with_fallback_bool(
                "REQGUARD_LOGGER_ROTATE_DAILY",
                "LOGGER_ROTATE_DAILY",
                defaults.rotate_daily,
            ),
        };

        let cors_defaults = CorsConfig::default();
        let allow_origins =
            get_env_with_fallback_list("REQGUARD_CORS_ALLOW_ORIGINS", "CORS_ALLOW_ORIGINS");
        let cors = CorsConfig {
            allow_origins: if allow_origins.is_empty() {
                cors_defaults.allow_origins
            } else {
                allow_origins
            },
            allow_credentials: get_env_with_fallback_bool(
                "REQGUARD_CORS_ALLOW_CREDENTIALS",
                "CORS_ALLOW_CREDENTIALS",
                false,
            ),
            max_age: match get_env_secs(
                "REQGUARD_CORS_MAX_AGE",
                "CORS_MAX_AGE",
                cors_defaults.max_age,
            )? {
                d if d.is_zero() => cors_defaults.max_age,
                d => d,
            },
        };

        let whitelist = WhitelistConfig {
            ips: get_env_with_fallback_list("REQGUARD_WHITELIST_IP", "WHITELIST_IP"),
            paths: get_env_with_fallback_list("REQGUARD_WHITELIST_PATH", "WHITELIST_PATH"),
            ip_enabled: get_env_with_fallback_bool(
                "REQGUARD_WHITELIST_IP_ENABLE",
                "WHITELIST_IP_ENABLE",
                false,
            ),
            path_enabled: get_env_with_fallback_bool(
                "REQGUARD_WHITELIST_PATH_ENABLE",
                "WHITELIST_PATH_ENABLE",
                false,
            ),
        };

        Ok(Self {
            server,
            signature,
            jwt,
            logger,
            cors,
            whitelist,
        })
    }
}
