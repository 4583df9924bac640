//! ロギング初期化ユーティリティ

use tracing_subscriber::{fmt, EnvFilter};

/// tracingサブスクライバを初期化する
///
/// `RUST_LOG` が未設定の場合は `info` レベルをデフォルトとする。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}
