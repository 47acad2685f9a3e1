//! ユーザーAPI
//!
//! 登録・ログイン・プロフィール取得。パイプラインの動作確認用の最小ルート集合。

use crate::auth::jwt::{self, VerifiedSession};
use crate::common::error::ApiError;
use crate::store::{NewUser, UserProfile, STATUS_ACTIVE};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use super::error::AppError;

/// パスワードの最小文字数
pub const MIN_PASSWORD_LEN: usize = 6;

/// 登録リクエスト
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// ユーザー名
    pub username: String,
    /// メールアドレス
    pub email: String,
    /// パスワード
    pub password: String,
    /// 表示名
    #[serde(default)]
    pub nickname: String,
}

/// ログインリクエスト
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// ユーザー名
    pub username: String,
    /// パスワード
    pub password: String,
}

/// トークン情報
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// JWTトークン
    pub access_token: String,
    /// 常に `Bearer`
    pub token_type: &'static str,
    /// 有効期間（秒）
    pub expires_in: u64,
}

/// ログインレスポンス
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// ユーザー情報
    pub user: UserProfile,
    /// トークン
    pub token: TokenResponse,
}

/// POST /api/v1/users/register - ユーザー登録
///
/// # Returns
/// * `201 Created` - 作成されたユーザー
/// * `400 Bad Request` - 入力不正
/// * `409 Conflict` - ユーザー名・メール重複
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserProfile>), AppError> {
    if request.username.trim().is_empty() || request.email.trim().is_empty() {
        return Err(ApiError::BadRequest("username and email are required".to_string()).into());
    }
    if !request.email.contains('@') {
        return Err(ApiError::BadRequest(format!("invalid email: {}", request.email)).into());
    }
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        ))
        .into());
    }

    let password_hash = state.hasher.hash(&request.password)?;
    let user = state
        .users
        .create(NewUser {
            username: request.username,
            email: request.email,
            password_hash,
            nickname: request.nickname,
        })
        .await?;

    tracing::info!(user_id = user.id, username = %user.username, "User registered");
    Ok((StatusCode::CREATED, Json(UserProfile::from(&user))))
}

/// POST /api/v1/users/login - ログイン
///
/// ユーザー名とパスワードで認証し、セッショントークンを発行する。
/// 失敗理由はクライアントに区別させない。
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let user = state
        .users
        .find_by_username(&request.username)
        .await?
        .ok_or_else(|| ApiError::Unauthorized(format!("unknown user '{}'", request.username)))?;

    if user.status != STATUS_ACTIVE {
        return Err(ApiError::Unauthorized(format!("user {} is disabled", user.id)).into());
    }
    if !state.hasher.verify(&request.password, &user.password_hash)? {
        return Err(ApiError::Unauthorized(format!("wrong password for user {}", user.id)).into());
    }

    let expire = state.config.jwt.expire;
    let access_token = jwt::issue_token(user.id, state.authenticator.jwt_secret(), expire)
        .map_err(|e| ApiError::Internal(format!("Failed to issue token: {}", e)))?;

    tracing::info!(user_id = user.id, "User logged in");
    Ok(Json(LoginResponse {
        user: UserProfile::from(&user),
        token: TokenResponse {
            access_token,
            token_type: "Bearer",
            expires_in: expire.as_secs(),
        },
    }))
}

/// GET /api/v1/users/profile - 自分のプロフィール
pub async fn profile(
    Extension(session): Extension<VerifiedSession>,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, AppError> {
    let user = state
        .users
        .find_by_id(session.subject_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {}", session.subject_id)))?;
    Ok(Json(UserProfile::from(&user)))
}

/// GET /api/v1/users/{id} - ユーザー取得
pub async fn get_user(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, AppError> {
    let id: u64 = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid user id: {}", id)))?;
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {}", id)))?;
    Ok(Json(UserProfile::from(&user)))
}
