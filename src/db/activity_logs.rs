//! 活動ログミラーストア
//!
//! 確認済みレジャートランザクションのメタデータを照会用リレーショナル
//! ストアに書き込む。このテーブルは追記専用で、更新・削除操作は公開しない。
//! レジャーが真実の源であり、ミラーは結果整合のキャッシュにすぎない。

use crate::common::error::{ChainLogError, ChainResult};
use crate::ledger::types::ActivityRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::SqlitePool;

/// 公開販売ビューが対象とするサービス識別子
pub const SALE_SERVICES: [&str; 2] = ["POS_SALES", "PURCHASE_ORDER_SERVICE"];

/// 公開販売ビューが対象とするエンティティ種別
pub const SALE_ENTITY_TYPES: [&str; 2] = ["Sale", "PurchaseOrder"];

/// ミラー行（sqlx::FromRow用）
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityLogRow {
    /// ローカル行ID
    pub id: i64,
    /// チェーン上のログID（一意）
    pub blockchain_log_id: i64,
    /// トランザクションハッシュ
    pub transaction_hash: String,
    /// ブロック番号
    pub block_number: i64,
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
    /// ミラー挿入時刻（サーバー採番、UTC）
    pub created_at: String,
}

impl ActivityLogRow {
    /// created_atをUTC時刻としてパースする
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.created_at, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// created_atのunix秒（パース不能時は0）
    pub fn unix_timestamp(&self) -> i64 {
        self.created_at_utc().map(|t| t.timestamp()).unwrap_or(0)
    }

    /// created_atのISO 8601表現
    pub fn created_at_iso(&self) -> Option<String> {
        self.created_at_utc().map(|t| t.to_rfc3339())
    }
}

/// 読み取りパスの動的フィルタ
///
/// 未設定の条件は省略される（ワイルドカードへのデフォルトはしない）。
/// 日付は挿入時刻に対する両端含みの範囲。
#[derive(Debug, Default, Clone)]
pub struct LogFilter {
    /// サービス識別子の等値条件
    pub service: Option<String>,
    /// エンティティ種別の等値条件
    pub entity_type: Option<String>,
    /// 操作者ユーザー名の等値条件
    pub actor_username: Option<String>,
    /// 操作種別の等値条件
    pub action: Option<String>,
    /// 挿入日の下限（含む）
    pub start_date: Option<NaiveDate>,
    /// 挿入日の上限（含む）
    pub end_date: Option<NaiveDate>,
    /// 新しい順に返す最大件数。Noneなら全件
    pub limit: Option<i64>,
}

/// 販売エンティティの集計統計
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SaleStatsRow {
    /// 総ログ件数
    pub total_logs: i64,
    /// 最初の操作時刻
    pub first_action: Option<String>,
    /// 最後の操作時刻
    pub last_action: Option<String>,
    /// ユニーク操作者数
    pub unique_actors: i64,
    /// CREATE件数
    pub creates: i64,
    /// UPDATE件数
    pub updates: i64,
    /// CANCEL件数
    pub cancellations: i64,
    /// REFUND件数
    pub refunds: i64,
}

/// 活動ログミラーのDB操作
#[derive(Clone)]
pub struct ActivityLogStore {
    pool: SqlitePool,
}

impl ActivityLogStore {
    /// 新しいストアを作成する
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 確認済みトランザクションのミラー行を挿入する
    ///
    /// created_atはDB側で採番する。blockchain_log_idは一意制約で
    /// 二重挿入を拒否する。
    pub async fn insert(
        &self,
        blockchain_log_id: i64,
        transaction_hash: &str,
        block_number: i64,
        record: &ActivityRecord,
        actor_address: &str,
    ) -> ChainResult<()> {
        sqlx::query(
            "INSERT INTO blockchain_activity_logs (
                blockchain_log_id, transaction_hash, block_number,
                service_identifier, action, entity_type, entity_id,
                actor_username, actor_address, change_description, data_hash
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(blockchain_log_id)
        .bind(transaction_hash)
        .bind(block_number)
        .bind(&record.service_identifier)
        .bind(&record.action)
        .bind(&record.entity_type)
        .bind(record.entity_id as i64)
        .bind(&record.actor_username)
        .bind(actor_address)
        .bind(&record.change_description)
        .bind(&record.data_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| ChainLogError::Database(format!("Failed to insert mirror row: {}", e)))?;

        tracing::info!(
            blockchain_log_id = blockchain_log_id,
            tx_hash = %transaction_hash,
            "Saved blockchain log to mirror database"
        );
        Ok(())
    }

    /// フィルタ条件でミラー行を検索する（新しい順）
    pub async fn query(&self, filter: &LogFilter) -> ChainResult<Vec<ActivityLogRow>> {
        let (where_clause, bind_values) = build_where_clause(filter);

        let mut sql = format!(
            "SELECT id, blockchain_log_id, transaction_hash, block_number, \
             service_identifier, action, entity_type, entity_id, \
             actor_username, actor_address, change_description, data_hash, created_at \
             FROM blockchain_activity_logs {} ORDER BY created_at DESC, id DESC",
            where_clause
        );
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query_as::<_, ActivityLogRow>(&sql);
        for val in &bind_values {
            query = query.bind(val.as_str());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit);
        }

        query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ChainLogError::Database(format!("Failed to query mirror rows: {}", e)))
    }

    /// チェーン上のログIDでミラー行を取得する
    pub async fn get_by_log_id(&self, blockchain_log_id: i64) -> ChainResult<Option<ActivityLogRow>> {
        sqlx::query_as::<_, ActivityLogRow>(
            "SELECT id, blockchain_log_id, transaction_hash, block_number, \
             service_identifier, action, entity_type, entity_id, \
             actor_username, actor_address, change_description, data_hash, created_at \
             FROM blockchain_activity_logs WHERE blockchain_log_id = ?",
        )
        .bind(blockchain_log_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ChainLogError::Database(format!("Failed to fetch mirror row: {}", e)))
    }

    /// トランザクションハッシュでミラー行を取得する
    pub async fn find_by_tx_hash(&self, transaction_hash: &str) -> ChainResult<Option<ActivityLogRow>> {
        sqlx::query_as::<_, ActivityLogRow>(
            "SELECT id, blockchain_log_id, transaction_hash, block_number, \
             service_identifier, action, entity_type, entity_id, \
             actor_username, actor_address, change_description, data_hash, created_at \
             FROM blockchain_activity_logs WHERE transaction_hash = ?",
        )
        .bind(transaction_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ChainLogError::Database(format!("Failed to fetch mirror row: {}", e)))
    }

    /// ミラーの総行数
    pub async fn count_all(&self) -> ChainResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM blockchain_activity_logs")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ChainLogError::Database(format!("Failed to count mirror rows: {}", e)))
    }

    /// 指定販売エンティティの公開向けログ（古い順）
    pub async fn sale_logs(&self, sale_id: i64) -> ChainResult<Vec<ActivityLogRow>> {
        sqlx::query_as::<_, ActivityLogRow>(
            "SELECT id, blockchain_log_id, transaction_hash, block_number, \
             service_identifier, action, entity_type, entity_id, \
             actor_username, actor_address, change_description, data_hash, created_at \
             FROM blockchain_activity_logs \
             WHERE service_identifier IN (?, ?) AND entity_type IN (?, ?) AND entity_id = ? \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(SALE_SERVICES[0])
        .bind(SALE_SERVICES[1])
        .bind(SALE_ENTITY_TYPES[0])
        .bind(SALE_ENTITY_TYPES[1])
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChainLogError::Database(format!("Failed to query sale logs: {}", e)))
    }

    /// 指定販売エンティティの操作種別別の集計統計
    pub async fn sale_action_stats(&self, sale_id: i64) -> ChainResult<SaleStatsRow> {
        sqlx::query_as::<_, SaleStatsRow>(
            "SELECT \
                COUNT(*) as total_logs, \
                MIN(created_at) as first_action, \
                MAX(created_at) as last_action, \
                COUNT(DISTINCT actor_username) as unique_actors, \
                COUNT(CASE WHEN action = 'CREATE' THEN 1 END) as creates, \
                COUNT(CASE WHEN action = 'UPDATE' THEN 1 END) as updates, \
                COUNT(CASE WHEN action = 'CANCEL' THEN 1 END) as cancellations, \
                COUNT(CASE WHEN action = 'REFUND' THEN 1 END) as refunds \
             FROM blockchain_activity_logs \
             WHERE service_identifier IN (?, ?) AND entity_type IN (?, ?) AND entity_id = ?",
        )
        .bind(SALE_SERVICES[0])
        .bind(SALE_SERVICES[1])
        .bind(SALE_ENTITY_TYPES[0])
        .bind(SALE_ENTITY_TYPES[1])
        .bind(sale_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ChainLogError::Database(format!("Failed to query sale stats: {}", e)))
    }
}

/// フィルタからWHERE句とバインド値を構築する
///
/// 値は常にプレースホルダでバインドし、SQL文字列には混ぜない。
fn build_where_clause(filter: &LogFilter) -> (String, Vec<String>) {
    let mut conditions: Vec<String> = Vec::new();
    let mut bind_values: Vec<String> = Vec::new();

    if let Some(ref service) = filter.service {
        conditions.push("service_identifier = ?".to_string());
        bind_values.push(service.clone());
    }

    if let Some(ref entity_type) = filter.entity_type {
        conditions.push("entity_type = ?".to_string());
        bind_values.push(entity_type.clone());
    }

    if let Some(ref actor_username) = filter.actor_username {
        conditions.push("actor_username = ?".to_string());
        bind_values.push(actor_username.clone());
    }

    if let Some(ref action) = filter.action {
        conditions.push("action = ?".to_string());
        bind_values.push(action.clone());
    }

    if let Some(start_date) = filter.start_date {
        conditions.push("date(created_at) >= ?".to_string());
        bind_values.push(start_date.format("%Y-%m-%d").to_string());
    }

    if let Some(end_date) = filter.end_date {
        conditions.push("date(created_at) <= ?".to_string());
        bind_values.push(end_date.format("%Y-%m-%d").to_string());
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    (where_clause, bind_values)
}
