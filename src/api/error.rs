//! APIエラーレスポンス型
//!
//! axum用の共通エラーハンドリング

use crate::common::error::ChainLogError;
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Axum用のエラーレスポンス型
#[derive(Debug)]
pub struct AppError(pub ChainLogError);

impl From<ChainLogError> for AppError {
    fn from(err: ChainLogError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        // 内部詳細（接続先・鍵材）を露出しないようexternal_message()を使う。
        // 完全なエラー内容はサーバーログ側に残す。
        tracing::error!(error = %self.0, "Request failed");

        let status = match &self.0 {
            ChainLogError::Validation(_) => StatusCode::BAD_REQUEST,
            ChainLogError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ChainLogError::AuthServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ChainLogError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            ChainLogError::ContractUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ChainLogError::SubmissionFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChainLogError::SubmissionTimeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChainLogError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChainLogError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChainLogError::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ChainLogError::NotFound(_) => StatusCode::NOT_FOUND,
            ChainLogError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = json!({
            "error": self.0.external_message()
        });

        (status, Json(payload)).into_response()
    }
}
