// リクエスト署名の生成と検証（正規化パラメータ + MD5）

use crate::common::error::AuthError;
use std::collections::HashMap;

/// 署名パラメータ名（正規化文字列から除外される）
pub const SIGN_FIELD: &str = "sign";
/// 署名をヘッダーで渡す場合のヘッダー名
pub const SIGNATURE_HEADER: &str = "signature";
/// アプリケーションキーのパラメータ名
pub const APP_KEY_FIELD: &str = "app_key";
/// タイムスタンプ（UNIX秒）のパラメータ名
pub const TIMESTAMP_FIELD: &str = "timestamp";
/// ノンスのパラメータ名
pub const NONCE_FIELD: &str = "nonce";

/// 署名対象の正規化文字列を構築する
///
/// `sign` を除いたキーをバイト順に並べ、`k1=v1&k2=v2&...&app_secret=<secret>` を返す。
/// パラメータが空でも `app_secret=` 項は付与される。
pub fn canonical_string(params: &HashMap<String, String>, secret: &str) -> String {
    let mut keys: Vec<&String> = params
        .keys()
        .filter(|key| key.as_str() != SIGN_FIELD)
        .collect();
    keys.sort();

    let mut canonical = String::new();
    for key in keys {
        canonical.push_str(key);
        canonical.push('=');
        canonical.push_str(&params[key]);
        canonical.push('&');
    }
    canonical.push_str("app_secret=");
    canonical.push_str(secret);
    canonical
}

/// パラメータ集合の署名（小文字16進のMD5）を計算する
pub fn sign(params: &HashMap<String, String>, secret: &str) -> String {
    let digest = md5::compute(canonical_string(params, secret).as_bytes());
    format!("{:x}", digest)
}

/// 署名を再計算して比較する
pub fn verify(params: &HashMap<String, String>, provided: &str, secret: &str) -> bool {
    sign(params, secret) == provided
}

/// 署名付きリクエスト
///
/// クエリ/フォームから組み立てられ、検証後に破棄される。
#[derive(Debug, Clone)]
pub struct SignedRequest {
    params: HashMap<String, String>,
    /// アプリケーションキー
    pub app_key: String,
    /// 署名時刻（UNIX秒）
    pub timestamp: i64,
    /// クライアント指定のノンス
    pub nonce: String,
    /// 提示された署名
    pub signature: String,
}

impl SignedRequest {
    /// パラメータ列から署名付きリクエストを組み立てる
    ///
    /// `header_signature` は `signature` ヘッダーの値で、存在すれば `sign` パラメータより優先する。
    ///
    /// # Returns
    /// * `Ok(None)` - 署名がどこにもない（未署名リクエスト）
    /// * `Ok(Some(_))` - 署名付きリクエスト
    /// * `Err(AuthError::Malformed)` - キー重複、必須項目欠落、タイムスタンプ不正
    pub fn from_pairs<I>(pairs: I, header_signature: Option<&str>) -> Result<Option<Self>, AuthError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut params = HashMap::new();
        for (key, value) in pairs {
            if params.insert(key, value).is_some() {
                return Err(AuthError::Malformed);
            }
        }

        let query_signature = params.remove(SIGN_FIELD);
        let signature = match header_signature.filter(|s| !s.is_empty()) {
            Some(sig) => sig.to_string(),
            None => match query_signature {
                Some(sig) => sig,
                None => return Ok(None),
            },
        };

        let app_key = params
            .get(APP_KEY_FIELD)
            .cloned()
            .ok_or(AuthError::Malformed)?;
        let timestamp = params
            .get(TIMESTAMP_FIELD)
            .and_then(|ts| ts.parse::<i64>().ok())
            .ok_or(AuthError::Malformed)?;
        let nonce = params
            .get(NONCE_FIELD)
            .cloned()
            .ok_or(AuthError::Malformed)?;

        Ok(Some(Self {
            params,
            app_key,
            timestamp,
            nonce,
            signature,
        }))
    }

    /// 署名対象パラメータ（`sign` を除く全項目）
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// 提示された署名を検証する
    pub fn verify(&self, secret: &str) -> bool {
        verify(&self.params, &self.signature, secret)
    }
}

/// 署名付きAPIパラメータを生成する（クライアント用ヘルパー）
///
/// `app_key`・`timestamp`・`nonce` を追加し、`sign` を計算して格納する。
pub fn generate_api_params(
    app_key: &str,
    app_secret: &str,
    mut params: HashMap<String, String>,
    now: i64,
) -> HashMap<String, String> {
    params.insert(APP_KEY_FIELD.to_string(), app_key.to_string());
    params.insert(TIMESTAMP_FIELD.to_string(), now.to_string());
    params.insert(
        NONCE_FIELD.to_string(),
        crate::auth::generate_random_token(16),
    );
    let signature = sign(&params, app_secret);
    params.insert(SIGN_FIELD.to_string(), signature);
    params
}
