//! ユーザーストア
//!
//! 永続化層を抽象化するRepository trait。
//! バイナリとテストはインメモリ実装を使う。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::common::error::ApiError;

/// ユーザー状態: 有効
pub const STATUS_ACTIVE: i32 = 1;

/// ユーザーエンティティ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// ユーザーID
    pub id: u64,
    /// ユーザー名（一意）
    pub username: String,
    /// メールアドレス（一意）
    pub email: String,
    /// パスワードハッシュ
    pub password_hash: String,
    /// 表示名
    pub nickname: String,
    /// 状態（1: 有効）
    pub status: i32,
    /// 作成日時
    pub created_at: DateTime<Utc>,
}

/// 新規ユーザー（IDはストアが採番）
#[derive(Debug, Clone)]
pub struct NewUser {
    /// ユーザー名
    pub username: String,
    /// メールアドレス
    pub email: String,
    /// パスワードハッシュ
    pub password_hash: String,
    /// 表示名
    pub nickname: String,
}

/// クライアントに返すユーザー情報（パスワードハッシュ除外）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    /// ユーザーID
    pub id: u64,
    /// ユーザー名
    pub username: String,
    /// メールアドレス
    pub email: String,
    /// 表示名
    pub nickname: String,
    /// 作成日時
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            nickname: user.nickname.clone(),
            created_at: user.created_at,
        }
    }
}

/// ユーザー操作のRepository trait
#[async_trait]
pub trait UserStore: Send + Sync {
    /// IDで取得
    async fn find_by_id(&self, id: u64) -> Result<Option<User>, ApiError>;
    /// ユーザー名で取得
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, ApiError>;
    /// 作成（ユーザー名・メール重複は `Conflict`）
    async fn create(&self, user: NewUser) -> Result<User, ApiError>;
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    users: HashMap<u64, User>,
}

/// インメモリ実装
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    inner: RwLock<Inner>,
}

impl InMemoryUserStore {
    /// 空のストアを作成
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: u64) -> Result<Option<User>, ApiError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, ApiError> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, ApiError> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.username == user.username) {
            return Err(ApiError::Conflict(format!(
                "username '{}' already exists",
                user.username
            )));
        }
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(ApiError::Conflict(format!(
                "email '{}' already exists",
                user.email
            )));
        }

        inner.next_id += 1;
        let created = User {
            id: inner.next_id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            nickname: user.nickname,
            status: STATUS_ACTIVE,
            created_at: Utc::now(),
        };
        inner.users.insert(created.id, created.clone());
        Ok(created)
    }
}
