//! 公開閲覧API
//!
//! `/blockchain-logs` 系の認証不要エンドポイント。販売レコードの
//! ブロックチェーン監査証跡を顧客・第三者が検証できるようにする。
//! 露出するのは制限されたフィールドのみで、レスポンスはcamelCase。

use super::error::AppError;
use crate::auth::MaybeUser;
use crate::common::error::ChainLogError;
use crate::db::activity_logs::ActivityLogRow;
use crate::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

/// 販売監査証跡の1エントリ（公開用の制限フィールド）
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleLogEntry {
    /// チェーン上のログID
    pub log_id: i64,
    /// トランザクションハッシュ
    pub transaction_hash: String,
    /// ブロック番号
    pub block_number: i64,
    /// 操作種別
    pub action: String,
    /// 記録時刻（ISO 8601）
    pub timestamp: Option<String>,
    /// 操作者ユーザー名
    pub actor_username: String,
    /// 変更内容の説明
    pub change_description: String,
    /// ペイロードダイジェスト
    pub data_hash: String,
}

impl From<ActivityLogRow> for SaleLogEntry {
    fn from(row: ActivityLogRow) -> Self {
        let timestamp = row.created_at_iso();
        Self {
            log_id: row.blockchain_log_id,
            transaction_hash: row.transaction_hash,
            block_number: row.block_number,
            action: row.action,
            timestamp,
            actor_username: row.actor_username,
            change_description: row.change_description,
            data_hash: row.data_hash,
        }
    }
}

/// GET /blockchain-logs/sale/{sale_id} - 販売の監査証跡を時系列で返す
///
/// 該当ログが無い場合は404ではなく空配列（証跡が無いことも有効な回答）。
pub async fn sale_logs(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(sale_id): Path<i64>,
) -> Result<Json<Vec<SaleLogEntry>>, AppError> {
    let rows = state.store.sale_logs(sale_id).await?;

    info!(
        sale_id = sale_id,
        count = rows.len(),
        requester = user.as_ref().map(|u| u.username.as_str()).unwrap_or("anonymous"),
        "Public sale trail queried"
    );
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// GET /blockchain-logs/verify/{transaction_hash} - トランザクションの存在確認
pub async fn verify_transaction(
    State(state): State<AppState>,
    Path(transaction_hash): Path<String>,
) -> Result<Json<Value>, AppError> {
    let row = state
        .store
        .find_by_tx_hash(&transaction_hash)
        .await?
        .ok_or_else(|| {
            AppError(ChainLogError::NotFound(
                "Transaction not found in blockchain records".to_string(),
            ))
        })?;

    Ok(Json(json!({
        "verified": true,
        "logId": row.blockchain_log_id,
        "transactionHash": row.transaction_hash,
        "blockNumber": row.block_number,
        "action": row.action,
        "entityType": row.entity_type,
        "entityId": row.entity_id,
        "actorUsername": row.actor_username,
        "timestamp": row.created_at_iso(),
        "dataHash": row.data_hash,
    })))
}

/// 販売統計レスポンス
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleStatsResponse {
    /// 対象販売ID
    pub sale_id: i64,
    /// 監査ログ総数
    pub total_logs: i64,
    /// 最初の操作時刻
    pub first_action: Option<String>,
    /// 最後の操作時刻
    pub last_action: Option<String>,
    /// 関与した操作者数
    pub unique_actors: i64,
    /// 操作種別ごとの内訳
    pub action_breakdown: ActionBreakdown,
}

/// 操作種別の内訳
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionBreakdown {
    /// 作成
    pub creates: i64,
    /// 更新
    pub updates: i64,
    /// 取消
    pub cancellations: i64,
    /// 返金
    pub refunds: i64,
}

/// GET /blockchain-logs/stats/sale/{sale_id} - 販売の集計統計
pub async fn sale_stats(
    State(state): State<AppState>,
    Path(sale_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let stats = state.store.sale_action_stats(sale_id).await?;

    if stats.total_logs == 0 {
        return Ok(Json(json!({
            "saleId": sale_id,
            "totalLogs": 0,
            "message": "No blockchain records found for this sale",
        })));
    }

    let response = SaleStatsResponse {
        sale_id,
        total_logs: stats.total_logs,
        first_action: stats.first_action,
        last_action: stats.last_action,
        unique_actors: stats.unique_actors,
        action_breakdown: ActionBreakdown {
            creates: stats.creates,
            updates: stats.updates,
            cancellations: stats.cancellations,
            refunds: stats.refunds,
        },
    };
    Ok(Json(serde_json::to_value(response).map_err(|e| {
        AppError(ChainLogError::Internal(format!(
            "Failed to serialize stats: {}",
            e
        )))
    })?))
}
