//! システムエンドポイント
//!
//! ルートとヘルスチェック

use axum::Json;
use serde_json::{json, Value};

/// サービスバージョン
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// GET / - サービス情報
pub async fn read_root() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Blockchain Activity Logging Service is running.",
        "service": "chainlog",
        "version": VERSION,
    }))
}

/// GET /health - ヘルスチェック
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "chainlog",
    }))
}
