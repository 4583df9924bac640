//! 設定管理（環境変数ヘルパー）
//!
//! レジャーRPC・署名鍵・コントラクトアドレス・データベースURL・認証オラクルは
//! すべて外部プロビジョニングされたシークレットとして環境変数から読み込む。

/// 環境変数を取得し、未設定の場合はデフォルト値を返す
pub fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// 環境変数を取得してパースする。未設定またはパース失敗時はデフォルト値を返す
pub fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// レジャー接続設定
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// レジャーノードのRPCエンドポイントURL
    pub rpc_url: String,
    /// 署名用秘密鍵（hex、プロセスメモリ内でのみ保持）
    pub private_key: Option<String>,
    /// ロギングコントラクトのアドレス（未デプロイ時はNone）
    pub contract_address: Option<String>,
    /// トランザクション確認待ちタイムアウト（秒）
    pub submission_timeout_secs: u64,
}

impl ChainConfig {
    /// 環境変数から読み込む
    pub fn from_env() -> Self {
        let contract_address = std::env::var("CHAINLOG_CONTRACT_ADDRESS")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let private_key = std::env::var("CHAINLOG_PRIVATE_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Self {
            rpc_url: env_or("CHAINLOG_RPC_URL", "http://127.0.0.1:8545"),
            private_key,
            contract_address,
            submission_timeout_secs: env_parse("CHAINLOG_SUBMISSION_TIMEOUT_SECS", 120u64),
        }
    }

    /// RPC URL末尾のパスセグメントをネットワークIDとして抽出する
    ///
    /// 例: `https://rpc.example.io/deaf-warlock-ac333142` → `deaf-warlock-ac333142`
    pub fn network_id(&self) -> Option<String> {
        self.rpc_url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|seg| !seg.is_empty() && !seg.contains(':'))
            .map(|seg| seg.to_string())
    }
}

/// アプリケーション設定
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// レジャー接続設定
    pub chain: ChainConfig,
    /// ミラーデータベースURL
    pub database_url: String,
    /// 認証オラクルのユーザー情報エンドポイント
    pub auth_me_url: String,
}

impl AppConfig {
    /// 環境変数から読み込む
    pub fn from_env() -> Self {
        Self {
            chain: ChainConfig::from_env(),
            database_url: env_or("CHAINLOG_DATABASE_URL", "sqlite:data/chainlog.db"),
            auth_me_url: env_or(
                "CHAINLOG_AUTH_ME_URL",
                "http://127.0.0.1:4000/auth/users/me",
            ),
        }
    }
}
