//! エラー型定義
//!
//! 統一エラー型（thiserror使用）
//!
//! レジャー・データベース・認証オラクルの下位層エラーを共通分類に翻訳する。
//! 秘密鍵等の内部シークレットはエラーメッセージに含めない。

use thiserror::Error;

/// chainlog統一エラー型
#[derive(Debug, Error)]
pub enum ChainLogError {
    /// リクエスト検証エラー（I/O前に拒否）
    #[error("Validation error: {0}")]
    Validation(String),

    /// 認証エラー（オラクルがトークンを拒否）
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// 認証オラクルに到達できない
    #[error("Auth service unavailable: {0}")]
    AuthServiceUnavailable(String),

    /// レジャー接続またはアカウント鍵が未初期化
    #[error("Blockchain connection not initialized")]
    NotInitialized,

    /// ロギングコントラクトが未デプロイまたは未設定
    #[error("Blockchain contract not initialized")]
    ContractUnavailable,

    /// ノードがトランザクションを拒否（残高不足、nonce競合、ガス不足等）
    #[error("Transaction submission failed: {0}")]
    SubmissionFailure(String),

    /// 確認待ちタイムアウト
    #[error("Transaction unconfirmed after {0} seconds")]
    SubmissionTimeout(u64),

    /// レシートのイベント解析失敗（フォールバック解決に回る）
    #[error("Event decode failed: {0}")]
    Decode(String),

    /// データベースエラー
    #[error("Database error: {0}")]
    Database(String),

    /// HTTPクライアントエラー（RPCトランスポート含む）
    #[error("HTTP client error: {0}")]
    Http(String),

    /// リソースが見つからない
    #[error("Not found: {0}")]
    NotFound(String),

    /// 内部エラー
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChainLogError {
    /// Returns a safe error message for external clients.
    ///
    /// This method returns a message that does not expose internal
    /// implementation details such as node URLs or key material. The node's
    /// own rejection message is considered operator-diagnostic and is kept
    /// for submission failures.
    pub fn external_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Authentication(_) => "Invalid token or user not found".to_string(),
            Self::AuthServiceUnavailable(_) => {
                "Could not connect to the authentication service".to_string()
            }
            Self::NotInitialized => {
                "Blockchain connection not initialized. Please deploy contract and set contract address".to_string()
            }
            Self::ContractUnavailable => "Blockchain contract not initialized".to_string(),
            Self::SubmissionFailure(msg) => format!("Failed to log to blockchain: {}", msg),
            Self::SubmissionTimeout(secs) => {
                format!("Transaction unconfirmed after {} seconds", secs)
            }
            Self::Decode(_) => "Failed to decode ledger event".to_string(),
            Self::Database(_) => "Database error".to_string(),
            Self::Http(_) => "Ledger node unavailable".to_string(),
            Self::NotFound(msg) => msg.clone(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

/// chainlog共通Result型
pub type ChainResult<T> = Result<T, ChainLogError>;
