//! serve サブコマンド
//!
//! サーバーを起動します。

use clap::Args;

/// serve サブコマンドの引数
///
/// 指定した値は環境変数の設定より優先される。
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Listen port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Bind address
    #[arg(short = 'H', long)]
    pub host: Option<String>,
}
