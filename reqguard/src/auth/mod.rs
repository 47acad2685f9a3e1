// 認証モジュール

/// リクエスト署名（正規化パラメータ + MD5）
pub mod signature;

/// リプレイ対策（app_key、鮮度、ノンス）
pub mod replay;

/// JWT生成・検証（jsonwebtoken）
pub mod jwt;

/// パスワードハッシュ化・検証（bcrypt）
pub mod password;

/// リクエストからの認証情報抽出
pub mod extract;

/// ランダムトークン生成
pub fn generate_random_token(length: usize) -> String {
    use rand::RngExt;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}
