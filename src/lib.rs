//! Blockchain Activity Logging Service
//!
//! マイクロサービスの活動をブロックチェーンに改ざん不能な形で記録する
//! ブリッジサービス

#![warn(missing_docs)]

/// 共通型定義
pub mod common;

/// REST APIハンドラー
pub mod api;

/// 認証・認可機能
pub mod auth;

/// 設定管理（環境変数ヘルパー）
pub mod config;

/// データベースアクセス（ミラーストア）
pub mod db;

/// ペイロードダイジェスト計算
pub mod hasher;

/// レジャークライアント（署名・送信・確認・読み取り）
pub mod ledger;

/// ロギング初期化ユーティリティ
pub mod logging;

/// コミットパイプライン
pub mod pipeline;

/// HTTPサーバー起動
pub mod server;

use crate::common::error::{ChainLogError, ChainResult};
use std::sync::Arc;

/// アプリケーション状態
#[derive(Clone)]
pub struct AppState {
    /// アプリケーション設定
    pub config: config::AppConfig,
    /// レジャークライアント（接続失敗時はNoneのまま劣化運転する）
    pub ledger: Option<Arc<ledger::LedgerClient>>,
    /// ミラーストア
    pub store: db::activity_logs::ActivityLogStore,
    /// データベース接続プール
    pub db_pool: sqlx::SqlitePool,
    /// 認証オラクルクライアント
    pub auth: auth::AuthClient,
    /// 共有HTTPクライアント（接続プーリング有効）
    pub http_client: reqwest::Client,
}

impl AppState {
    /// レジャークライアントを取得する
    ///
    /// 未接続（秘密鍵未設定・起動時接続失敗）なら`NotInitialized`。
    pub fn ledger(&self) -> ChainResult<&ledger::LedgerClient> {
        self.ledger
            .as_deref()
            .ok_or(ChainLogError::NotInitialized)
    }
}
