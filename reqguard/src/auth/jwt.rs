// セッショントークン（JWT）の発行と検証（jsonwebtoken実装）

use crate::common::error::AuthError;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// トークンの固定サブジェクトラベル（JWT sub claim）
pub const SUBJECT_LABEL: &str = "user_token";

/// JWTクレーム
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// ユーザーID
    pub user_id: u64,
    /// サブジェクトラベル
    pub sub: String,
    /// 発行時刻（Unix timestamp、JWT iat claim）
    pub iat: i64,
    /// 有効期限（Unix timestamp、JWT exp claim）
    pub exp: i64,
}

/// 検証済みセッション
///
/// パイプラインがリクエストの拡張データに格納し、ハンドラーが参照する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedSession {
    /// ユーザーID
    pub subject_id: u64,
    /// 有効期限
    pub expires_at: DateTime<Utc>,
}

/// JWTトークンを生成
///
/// # Arguments
/// * `subject_id` - ユーザーID
/// * `secret` - JWTシークレットキー
/// * `ttl` - 有効期間
///
/// # Returns
/// * `Ok(String)` - JWTトークン（3つのドット区切り部分）
/// * `Err(jsonwebtoken::errors::Error)` - 生成失敗
pub fn issue_token(
    subject_id: u64,
    secret: &[u8],
    ttl: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    issue_token_at(subject_id, secret, ttl, Utc::now().timestamp())
}

/// 発行時刻を指定してJWTトークンを生成
pub fn issue_token_at(
    subject_id: u64,
    secret: &[u8],
    ttl: Duration,
    now: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    let claims = Claims {
        user_id: subject_id,
        sub: SUBJECT_LABEL.to_string(),
        iat: now,
        exp: now.saturating_add(ttl_secs),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

/// JWTトークンを検証
///
/// 現在時刻は1回だけ読み取る。
///
/// # Returns
/// * `Ok(VerifiedSession)` - 検証済みセッション
/// * `Err(AuthError::Malformed)` - 構造を解析できない
/// * `Err(AuthError::BadSignature)` - 署名不一致
/// * `Err(AuthError::Expired)` - `now >= exp`
pub fn verify_token(token: &str, secret: &[u8]) -> Result<VerifiedSession, AuthError> {
    verify_token_at(token, secret, Utc::now().timestamp())
}

/// 検証時刻を指定してJWTトークンを検証
pub fn verify_token_at(
    token: &str,
    secret: &[u8],
    now: i64,
) -> Result<VerifiedSession, AuthError> {
    // 有効期限は猶予なしで自前判定する（jsonwebtokenの既定leewayは60秒）
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.leeway = 0;
    validation.sub = Some(SUBJECT_LABEL.to_string());

    check_structure(token)?;
    let claims = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(error = %e, "JWT verification failed");
            classify(&e)
        })?;

    if now >= claims.exp {
        return Err(AuthError::Expired);
    }

    let expires_at = Utc
        .timestamp_opt(claims.exp, 0)
        .single()
        .ok_or(AuthError::Malformed)?;

    Ok(VerifiedSession {
        subject_id: claims.user_id,
        expires_at,
    })
}

/// 3部構成でヘッダーを解析できることを確認する
fn check_structure(token: &str) -> Result<(), AuthError> {
    if token.split('.').count() != 3 {
        return Err(AuthError::Malformed);
    }
    decode_header(token)
        .map(|_| ())
        .map_err(|_| AuthError::Malformed)
}

// 構造確認後のBase64エラーは署名部のデコード失敗（非正規な末尾ビットなど）
fn classify(err: &jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::InvalidSignature | ErrorKind::Base64(_) => AuthError::BadSignature,
        ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::Malformed,
    }
}
