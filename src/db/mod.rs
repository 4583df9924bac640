//! データベースアクセス層
//!
//! SQLiteベースのミラーストア永続化

use crate::common::error::{ChainLogError, ChainResult};
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};

/// 活動ログミラーストア
pub mod activity_logs;

/// データベース接続プールを作成してマイグレーションを実行する
pub async fn initialize_database(database_url: &str) -> ChainResult<SqlitePool> {
    // SQLiteファイルはディレクトリが存在しないと作成できないため、先に作成しておく
    if let Some(path) = database_url.strip_prefix("sqlite:") {
        // `sqlite::memory:` のような特殊指定はスキップ
        if !path.starts_with(':') {
            let normalized = path.trim_start_matches("//");
            let path_without_params = normalized.split('?').next().unwrap_or(normalized);
            if let Some(parent) = std::path::Path::new(path_without_params).parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ChainLogError::Database(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
    }

    // データベースファイルが存在しない場合は作成
    if !Sqlite::database_exists(database_url)
        .await
        .map_err(|e| ChainLogError::Database(format!("Failed to check database: {}", e)))?
    {
        tracing::info!("Creating database: {}", database_url);
        Sqlite::create_database(database_url)
            .await
            .map_err(|e| ChainLogError::Database(format!("Failed to create database: {}", e)))?;
    }

    let pool = SqlitePool::connect(database_url)
        .await
        .map_err(|e| ChainLogError::Database(format!("Failed to connect to database: {}", e)))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| ChainLogError::Database(format!("Migration failed: {}", e)))?;

    Ok(pool)
}
