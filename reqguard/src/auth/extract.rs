//! リクエストからの認証情報抽出
//!
//! ヘッダー・クエリ・フォームボディから署名パラメータとBearerトークンを取り出す。

use crate::auth::signature::{SignedRequest, SIGNATURE_HEADER};
use crate::common::error::AuthError;
use axum::http::{header, HeaderMap};

/// Authorizationヘッダーから Bearer トークンを抽出する
///
/// # Returns
/// * `Ok(None)` - ヘッダーなし
/// * `Ok(Some(token))` - `Bearer <token>` 形式
/// * `Err(AuthError::Malformed)` - `Bearer` 接頭辞なし、または部分数が不正
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<String>, AuthError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| AuthError::Malformed)?;

    let mut parts = value.splitn(2, ' ');
    match (parts.next(), parts.next()) {
        (Some("Bearer"), Some(token)) if !token.is_empty() && !token.contains(' ') => {
            Ok(Some(token.to_string()))
        }
        _ => Err(AuthError::Malformed),
    }
}

/// フォームエンコードのボディか判定する
pub fn is_form_body(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

/// クエリ文字列とフォームボディから署名付きリクエストを組み立てる
///
/// クエリとフォームで同じキーが現れた場合は重複として拒否する。
pub fn signed_request(
    query: Option<&str>,
    form: Option<&[u8]>,
    headers: &HeaderMap,
) -> Result<Option<SignedRequest>, AuthError> {
    let mut pairs: Vec<(String, String)> = match query {
        Some(q) if !q.is_empty() => {
            serde_urlencoded::from_str(q).map_err(|_| AuthError::Malformed)?
        }
        _ => Vec::new(),
    };
    if let Some(body) = form.filter(|b| !b.is_empty()) {
        let form_pairs: Vec<(String, String)> =
            serde_urlencoded::from_bytes(body).map_err(|_| AuthError::Malformed)?;
        pairs.extend(form_pairs);
    }

    let header_signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    SignedRequest::from_pairs(pairs, header_signature)
}
