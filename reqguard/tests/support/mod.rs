//! 統合テスト共通ヘルパー

pub mod app;
