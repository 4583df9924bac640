//! ブロックチェーン活動ログAPIハンドラー
//!
//! `/blockchain` 系の認証必須エンドポイントと運用プローブ

use super::error::AppError;
use crate::auth::AuthenticatedUser;
use crate::common::error::ChainLogError;
use crate::db::activity_logs::{ActivityLogRow, LogFilter};
use crate::ledger::wei_to_ether_string;
use crate::pipeline::{self, ActivityLogRequest};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

/// コミット成功レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct ActivityLogResponse {
    /// 採番されたログID
    pub log_id: u64,
    /// トランザクションハッシュ
    pub transaction_hash: String,
    /// ブロック番号
    pub block_number: u64,
    /// サービス識別子
    pub service_identifier: String,
    /// 操作種別
    pub action: String,
    /// エンティティ種別
    pub entity_type: String,
    /// エンティティID
    pub entity_id: u64,
    /// 操作者ユーザー名
    pub actor_username: String,
    /// 署名アカウントアドレス
    pub actor_address: String,
    /// ペイロードダイジェスト
    pub data_hash: String,
    /// コミット状態（常に"confirmed"）
    pub status: String,
    /// ログID解決経路（"event" または "count_fallback"）
    pub log_id_source: String,
    /// ミラー書き込み失敗時の警告（部分成功）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// ログ照会のクエリパラメータ
#[derive(Debug, Default, Deserialize)]
pub struct LogQueryParams {
    /// サービス識別子でフィルタ
    pub service: Option<String>,
    /// エンティティ種別でフィルタ
    pub entity_type: Option<String>,
    /// 操作者ユーザー名でフィルタ
    pub actor_username: Option<String>,
    /// 操作種別でフィルタ
    pub action: Option<String>,
    /// 開始日（YYYY-MM-DD、含む）
    pub start_date: Option<String>,
    /// 終了日（YYYY-MM-DD、含む）
    pub end_date: Option<String>,
    /// 最大件数（新しい順）
    pub limit: Option<i64>,
}

impl LogQueryParams {
    /// フィルタに変換する。不正な日付は警告ログを残して黙って捨てる
    /// （照会全体を失敗させない意図的な寛容さ）。
    fn into_filter(self) -> LogFilter {
        LogFilter {
            service: self.service,
            entity_type: self.entity_type,
            actor_username: self.actor_username,
            action: self.action,
            start_date: parse_date_param("start_date", self.start_date.as_deref()),
            end_date: parse_date_param("end_date", self.end_date.as_deref()),
            limit: self.limit.filter(|&n| n > 0),
        }
    }
}

/// YYYY-MM-DD形式の日付パラメータをパースする
fn parse_date_param(name: &str, value: Option<&str>) -> Option<NaiveDate> {
    let raw = value?;
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            warn!(param = name, value = raw, "Invalid date format, ignoring filter");
            None
        }
    }
}

/// ミラー行の照会レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockchainLogQueryResponse {
    /// チェーン上のログID
    pub log_id: i64,
    /// サービス識別子
    pub service_identifier: String,
    /// 操作種別
    pub action: String,
    /// エンティティ種別
    pub entity_type: String,
    /// エンティティID
    pub entity_id: i64,
    /// 操作者ユーザー名
    pub actor_username: String,
    /// 署名アカウントアドレス
    pub actor_address: String,
    /// 変更内容の説明
    pub change_description: String,
    /// ペイロードダイジェスト
    pub data_hash: String,
    /// 記録時刻（unix秒）
    pub timestamp: i64,
    /// ミラー挿入時刻（ISO 8601）
    pub created_at: Option<String>,
    /// トランザクションハッシュ
    pub transaction_hash: Option<String>,
    /// ブロック番号
    pub block_number: Option<i64>,
}

impl From<ActivityLogRow> for BlockchainLogQueryResponse {
    fn from(row: ActivityLogRow) -> Self {
        let timestamp = row.unix_timestamp();
        let created_at = row.created_at_iso();
        Self {
            log_id: row.blockchain_log_id,
            service_identifier: row.service_identifier,
            action: row.action,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            actor_username: row.actor_username,
            actor_address: row.actor_address,
            change_description: row.change_description,
            data_hash: row.data_hash,
            timestamp,
            created_at,
            transaction_hash: Some(row.transaction_hash),
            block_number: Some(row.block_number),
        }
    }
}

/// POST /blockchain/log - 活動をブロックチェーンに記録する
///
/// 他マイクロサービスがPOST/PATCH成功後に呼び出す想定。
pub async fn create_activity_log(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(request): Json<ActivityLogRequest>,
) -> Result<(StatusCode, Json<ActivityLogResponse>), AppError> {
    // 操作者名の不一致は透明性のため記録するだけでエラーにしない
    if request.actor_username != user.username {
        info!(
            actor_username = %request.actor_username,
            authenticated_user = %user.username,
            "Actor username differs from authenticated user"
        );
    }

    let outcome = pipeline::commit(&state, &request).await?;

    let response = ActivityLogResponse {
        log_id: outcome.log_id,
        transaction_hash: outcome.transaction_hash,
        block_number: outcome.block_number,
        service_identifier: request.service_identifier,
        action: request.action,
        entity_type: request.entity_type,
        entity_id: request.entity_id,
        actor_username: request.actor_username,
        actor_address: outcome.actor_address,
        data_hash: outcome.data_hash,
        status: "confirmed".to_string(),
        log_id_source: match outcome.log_id_source {
            crate::ledger::LogIdSource::Event => "event".to_string(),
            crate::ledger::LogIdSource::CountFallback => "count_fallback".to_string(),
        },
        warning: outcome.warning,
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /blockchain/logs - ミラーデータベースから活動ログを照会する
///
/// フィルタ: service, entity_type, actor_username, action, start_date,
/// end_date（YYYY-MM-DD）。limit未指定時は全件を新しい順で返す。
pub async fn get_activity_logs(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Query(params): Query<LogQueryParams>,
) -> Result<Json<Vec<BlockchainLogQueryResponse>>, AppError> {
    let filter = params.into_filter();
    let rows = state.store.query(&filter).await?;

    info!(count = rows.len(), "Retrieved logs from mirror database");
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// GET /blockchain/logs/{log_id} - 単一ログをチェーンから取得する
///
/// レジャー権威のフィールドにミラー由来のトランザクションメタデータを
/// マージする。レジャー照会に失敗した場合は404。
pub async fn get_activity_log_by_id(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(log_id): Path<u64>,
) -> Result<Json<BlockchainLogQueryResponse>, AppError> {
    let ledger = state.ledger().map_err(AppError)?;

    let record = ledger.get_log(log_id).await.map_err(|e| {
        warn!(log_id = log_id, error = %e, "On-chain log lookup failed");
        AppError(ChainLogError::NotFound(format!(
            "Log {} not found on ledger",
            log_id
        )))
    })?;

    // ミラー行は無くてもよい（書き込み順序ハザードで一時的に欠け得る）
    let mirror = state.store.get_by_log_id(log_id as i64).await?;

    Ok(Json(BlockchainLogQueryResponse {
        log_id: record.log_id as i64,
        service_identifier: record.service_identifier,
        action: record.action,
        entity_type: record.entity_type,
        entity_id: record.entity_id as i64,
        actor_username: record.actor_username,
        actor_address: record.actor_address,
        change_description: record.change_description,
        data_hash: record.data_hash,
        timestamp: record.timestamp as i64,
        created_at: mirror.as_ref().and_then(|row| row.created_at_iso()),
        transaction_hash: mirror.as_ref().map(|row| row.transaction_hash.clone()),
        block_number: mirror.as_ref().map(|row| row.block_number),
    }))
}

/// POST /blockchain/verify/{log_id} - ペイロードの完全性を検証する
pub async fn verify_log_integrity(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(log_id): Path<u64>,
    Json(payload): Json<Value>,
) -> Result<Json<pipeline::VerificationReport>, AppError> {
    let report = pipeline::verify(&state, log_id, &payload).await?;
    Ok(Json(report))
}

/// GET /blockchain/status - レジャーとミラーの接続状況（認証不要の運用プローブ）
pub async fn blockchain_status(State(state): State<AppState>) -> Json<Value> {
    let Some(ledger) = state.ledger.as_ref() else {
        return Json(json!({
            "status": "disconnected",
            "message": "Blockchain not configured",
            "connected": false,
        }));
    };

    let connected = ledger.is_connected().await;
    let latest_block = ledger.current_block().await.ok();
    let balance = ledger.account_balance().await.ok();
    let log_count = match ledger.contract_address() {
        Some(_) => ledger.get_log_count().await.ok(),
        None => None,
    };

    let (db_status, db_log_count) = match state.store.count_all().await {
        Ok(count) => ("connected".to_string(), Some(count)),
        Err(e) => {
            warn!(error = %e, "Database status check failed");
            ("error".to_string(), None)
        }
    };

    Json(json!({
        "status": if connected { "connected" } else { "disconnected" },
        "connected": connected,
        "network": state.config.chain.rpc_url,
        "account": ledger.actor_address(),
        "balance_wei": balance.map(|b| b.to_string()),
        "balance_eth": balance.map(wei_to_ether_string),
        "latest_block": latest_block,
        "contract_address": ledger.contract_address(),
        "contract_deployed": ledger.contract_address().is_some(),
        "total_logs_blockchain": log_count,
        "database_status": db_status,
        "total_logs_database": db_log_count,
    }))
}

/// GET /blockchain/network-info - エクスプローラーリンク用のネットワーク情報
pub async fn network_info(State(state): State<AppState>) -> Json<Value> {
    let network_id = state.config.chain.network_id();
    let explorer_base_url = network_id
        .as_ref()
        .map(|id| format!("https://explorer.buildbear.io/{}", id));

    Json(json!({
        "rpc_url": state.config.chain.rpc_url,
        "network_id": network_id,
        "explorer_base_url": explorer_base_url,
        "contract_address": state
            .ledger
            .as_ref()
            .and_then(|ledger| ledger.contract_address()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_param_valid_and_invalid() {
        assert_eq!(
            parse_date_param("start_date", Some("2025-01-15")),
            NaiveDate::from_ymd_opt(2025, 1, 15)
        );
        assert_eq!(parse_date_param("start_date", Some("15/01/2025")), None);
        assert_eq!(parse_date_param("start_date", None), None);
    }

    #[test]
    fn test_into_filter_drops_malformed_dates_and_zero_limit() {
        let params = LogQueryParams {
            service: Some("POS_SALES".to_string()),
            start_date: Some("not-a-date".to_string()),
            end_date: Some("2025-02-01".to_string()),
            limit: Some(0),
            ..Default::default()
        };
        let filter = params.into_filter();
        assert_eq!(filter.service.as_deref(), Some("POS_SALES"));
        assert!(filter.start_date.is_none());
        assert!(filter.end_date.is_some());
        assert!(filter.limit.is_none());
    }
}
