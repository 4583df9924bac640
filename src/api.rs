//! APIルーター定義

use crate::AppState;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// エラーレスポンス型
pub mod error;
/// 活動ログエンドポイント
pub mod logs;
/// 公開閲覧エンドポイント
pub mod public;
/// システムエンドポイント
pub mod system;

/// アプリケーションのルーターを構築する
pub fn create_app(state: AppState) -> Router {
    // 認証必須の記録・照会API
    let blockchain_routes = Router::new()
        .route("/log", post(logs::create_activity_log))
        .route("/logs", get(logs::get_activity_logs))
        .route("/logs/:log_id", get(logs::get_activity_log_by_id))
        .route("/verify/:log_id", post(logs::verify_log_integrity))
        .route("/status", get(logs::blockchain_status))
        .route("/network-info", get(logs::network_info));

    // 認証不要の公開閲覧API
    let public_routes = Router::new()
        .route("/sale/:sale_id", get(public::sale_logs))
        .route("/verify/:transaction_hash", get(public::verify_transaction))
        .route("/stats/sale/:sale_id", get(public::sale_stats));

    Router::new()
        .route("/", get(system::read_root))
        .route("/health", get(system::health_check))
        .nest("/blockchain", blockchain_routes)
        .nest("/blockchain-logs", public_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
