// パスワードハッシュ化と検証（bcrypt実装）

use crate::common::error::ApiError;

/// パスワードハッシュ化のコスト（12推奨、200-300ms）
pub const HASH_COST: u32 = 12;

/// パスワードハッシュの外部コラボレーター
///
/// 認証パイプラインはハッシュ方式に依存せず、このトレイト越しに利用する。
pub trait PasswordHasher: Send + Sync {
    /// 平文をハッシュ化する
    fn hash(&self, secret: &str) -> Result<String, ApiError>;

    /// 平文とハッシュが一致するか検証する
    fn verify(&self, secret: &str, digest: &str) -> Result<bool, ApiError>;
}

/// bcryptによる実装
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    /// コストを指定して作成（テストでは最小コスト4を使う）
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(HASH_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, secret: &str) -> Result<String, ApiError> {
        bcrypt::hash(secret, self.cost)
            .map_err(|e| ApiError::Internal(format!("Failed to hash password: {}", e)))
    }

    fn verify(&self, secret: &str, digest: &str) -> Result<bool, ApiError> {
        bcrypt::verify(secret, digest)
            .map_err(|e| ApiError::Internal(format!("Failed to verify password: {}", e)))
    }
}
