//! sign サブコマンド
//!
//! `key=value` 形式のパラメータに `app_key`・`timestamp`・`nonce`・`sign` を付与し、
//! クエリ文字列として出力します。

use crate::auth::signature::generate_api_params;
use anyhow::{bail, Context};
use clap::Args;
use std::collections::{BTreeMap, HashMap};

/// sign サブコマンドの引数
#[derive(Args, Debug, Clone)]
pub struct SignArgs {
    /// app_key
    #[arg(long, env = "REQGUARD_SIGNATURE_APP_KEY")]
    pub app_key: String,

    /// Shared signing secret
    #[arg(long, env = "REQGUARD_SIGNATURE_APP_SECRET", hide_env_values = true)]
    pub app_secret: String,

    /// Unix timestamp to sign with (defaults to now)
    #[arg(long)]
    pub timestamp: Option<i64>,

    /// Request parameters as key=value
    pub params: Vec<String>,
}

/// sign コマンドを実行し、キー順に並べたクエリ文字列を返す
pub fn execute(args: &SignArgs) -> Result<String, anyhow::Error> {
    let mut params = HashMap::new();
    for pair in &args.params {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("parameter '{}' is not in key=value form", pair);
        };
        if key.is_empty() {
            bail!("parameter '{}' has an empty key", pair);
        }
        if params.insert(key.to_string(), value.to_string()).is_some() {
            bail!("parameter '{}' is given more than once", key);
        }
    }

    let now = args
        .timestamp
        .unwrap_or_else(|| chrono::Utc::now().timestamp());
    let signed: BTreeMap<String, String> =
        generate_api_params(&args.app_key, &args.app_secret, params, now)
            .into_iter()
            .collect();
    serde_urlencoded::to_string(&signed).context("failed to encode signed parameters")
}
