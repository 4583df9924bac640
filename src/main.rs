//! Blockchain Activity Logging Service Entry Point

use chainlog::config::AppConfig;
use chainlog::db::activity_logs::ActivityLogStore;
use chainlog::ledger::LedgerClient;
use chainlog::{auth, db, logging, server, AppState};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

/// ブロックチェーン活動ログサービス
#[derive(Parser, Debug)]
#[command(name = "chainlog", version, about = "Blockchain Activity Logging Service")]
struct Cli {
    /// バインドするホスト
    #[arg(long, env = "CHAINLOG_HOST", default_value = "0.0.0.0")]
    host: String,

    /// バインドするポート
    #[arg(long, env = "CHAINLOG_PORT", default_value_t = 9005)]
    port: u16,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init();

    let config = AppConfig::from_env();

    let db_pool = match db::initialize_database(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };
    let store = ActivityLogStore::new(db_pool.clone());

    let http_client = reqwest::Client::new();

    // レジャー接続失敗は致命にしない。照会系エンドポイントは
    // ミラーだけで動作し、記録系は503を返す劣化運転になる。
    let ledger_client = match LedgerClient::connect(&config.chain, http_client.clone()).await {
        Ok(client) => {
            info!(
                account = %client.actor_address(),
                chain_id = client.chain_id(),
                contract = client.contract_address().unwrap_or("none"),
                "Connected to ledger node"
            );
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!(error = %e, "Ledger connection unavailable, running in degraded mode");
            None
        }
    };

    let auth_client = auth::AuthClient::new(config.auth_me_url.clone());

    let state = AppState {
        config,
        ledger: ledger_client,
        store,
        db_pool,
        auth: auth_client,
        http_client,
    };

    let bind_addr = format!("{}:{}", cli.host, cli.port);
    server::run(state, &bind_addr).await;
}
