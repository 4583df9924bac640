//! レジャークライアント
//!
//! リモートレジャーノードのラッパー。アカウント・nonce・残高の照会、
//! トランザクションの構築・署名・送信・確認待ち、コントラクト状態の
//! 読み取りを提供する。
//!
//! nonceとガス価格は送信ごとに再照会する（並行送信下での陳腐化回避のため
//! キャッシュしない）。タイムアウト後の再送信は同一論理イベントでも別の
//! LedgerRecordを生成するため、本層では自動リトライしない。

use crate::common::error::{ChainLogError, ChainResult};
use crate::config::ChainConfig;
use crate::ledger::rpc::{parse_quantity_u128, parse_quantity_u64, RpcClient};
use crate::ledger::signer::{LegacyTransaction, Signer};
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

/// コントラクトABIエンコード・デコード
pub mod abi;
/// イベントデコーダ
pub mod events;
/// JSON-RPCトランスポート
pub mod rpc;
/// トランザクション署名
pub mod signer;
/// レジャー関連の型定義
pub mod types;

pub use events::{LogIdResolution, LogIdSource};
pub use types::{ActivityRecord, LedgerRecord, TransactionReceipt};

/// logActivityのガス上限（過去実績に対して十分な余裕を持たせた固定値）
const GAS_LIMIT: u64 = 500_000;

/// ガス価格係数の分母（ネットワーク価格 / 10）
///
/// テストレジャー向けのコスト優先ポリシー。確認レイテンシと引き換えに
/// コストを予測可能にする。
const GAS_PRICE_DIVISOR: u128 = 10;

/// レシートのポーリング間隔
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// レジャークライアント
///
/// 起動時に一度構築され、全リクエストハンドラに注入される。
/// 保持する状態（署名器・コントラクトアドレス）は読み取り専用。
#[derive(Clone)]
pub struct LedgerClient {
    rpc: RpcClient,
    signer: Signer,
    contract_address: Option<String>,
    chain_id: u64,
    submission_timeout: Duration,
}

impl LedgerClient {
    /// ノードに接続してクライアントを構築する
    ///
    /// 鍵が未設定の場合は`NotInitialized`。コントラクトアドレスは任意で、
    /// 未設定のまま接続は成立する（書き込みとオンチェーン読み取りは
    /// `ContractUnavailable`で失敗する）。
    pub async fn connect(config: &ChainConfig, http: reqwest::Client) -> ChainResult<Self> {
        let private_key = config
            .private_key
            .as_deref()
            .ok_or(ChainLogError::NotInitialized)?;
        let signer = Signer::from_hex(private_key)?;

        let rpc = RpcClient::new(http, config.rpc_url.clone());
        let chain_id_hex: String = rpc.call("eth_chainId", json!([])).await?;
        let chain_id = parse_quantity_u64(&chain_id_hex)?;

        info!(
            account = %signer.address_hex(),
            chain_id = chain_id,
            "Connected to ledger node"
        );

        let contract_address = config
            .contract_address
            .as_deref()
            .map(|addr| normalize_address(addr))
            .transpose()?;

        let client = Self {
            rpc,
            signer,
            contract_address,
            chain_id,
            submission_timeout: Duration::from_secs(config.submission_timeout_secs),
        };

        match &client.contract_address {
            Some(addr) => {
                // 接続確認を兼ねてlogCountを読む（失敗しても起動は続行）
                match client.get_log_count().await {
                    Ok(count) => info!(contract = %addr, log_count = count, "Contract verified"),
                    Err(e) => warn!(contract = %addr, error = %e, "Contract call test failed, proceeding anyway"),
                }
            }
            None => warn!("Contract address not set, on-chain operations will be unavailable"),
        }

        Ok(client)
    }

    /// 署名アカウントのアドレス
    pub fn actor_address(&self) -> String {
        self.signer.address_hex()
    }

    /// チェーンID
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// コントラクトアドレス（設定済みの場合）
    pub fn contract_address(&self) -> Option<&str> {
        self.contract_address.as_deref()
    }

    /// コントラクトアドレスを要求する。未設定なら`ContractUnavailable`
    fn require_contract(&self) -> ChainResult<&str> {
        self.contract_address
            .as_deref()
            .ok_or(ChainLogError::ContractUnavailable)
    }

    /// ノードに到達できるか
    pub async fn is_connected(&self) -> bool {
        self.current_block().await.is_ok()
    }

    /// 最新ブロック番号
    pub async fn current_block(&self) -> ChainResult<u64> {
        let hex: String = self.rpc.call("eth_blockNumber", json!([])).await?;
        parse_quantity_u64(&hex)
    }

    /// 署名アカウントの残高（wei)
    pub async fn account_balance(&self) -> ChainResult<u128> {
        let hex: String = self
            .rpc
            .call(
                "eth_getBalance",
                json!([self.signer.address_hex(), "latest"]),
            )
            .await?;
        parse_quantity_u128(&hex)
    }

    /// 署名アカウントの次のnonce
    pub async fn next_nonce(&self) -> ChainResult<u64> {
        let hex: String = self
            .rpc
            .call(
                "eth_getTransactionCount",
                json!([self.signer.address_hex(), "latest"]),
            )
            .await?;
        parse_quantity_u64(&hex)
    }

    /// ネットワークのガス価格（wei）
    pub async fn gas_price(&self) -> ChainResult<u128> {
        let hex: String = self.rpc.call("eth_gasPrice", json!([])).await?;
        parse_quantity_u128(&hex)
    }

    /// 活動レコードをコントラクトに記録し、確認済みレシートを返す
    ///
    /// nonce・ガス価格の照会 → 構築 → ローカル署名 → 送信 → 確認待ちを
    /// 1回ずつ実行する。リトライ方針は呼び出し側の責務。
    pub async fn submit_log_activity(
        &self,
        record: &ActivityRecord,
    ) -> ChainResult<(String, TransactionReceipt)> {
        let contract = self.require_contract()?;
        let to = parse_address(contract)?;

        let nonce = self.next_nonce().await?;
        let network_gas_price = self.gas_price().await?;

        let tx = LegacyTransaction {
            nonce,
            gas_price: (network_gas_price / GAS_PRICE_DIVISOR).max(1),
            gas_limit: GAS_LIMIT,
            to,
            value: 0,
            data: abi::encode_log_activity(record),
        };

        let raw = self.signer.sign_transaction(&tx, self.chain_id)?;
        let tx_hash: String = self
            .rpc
            .call(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw))]),
            )
            .await
            .map_err(|e| ChainLogError::SubmissionFailure(e.to_string()))?;

        info!(tx_hash = %tx_hash, nonce = nonce, "Transaction sent");

        let receipt = self.wait_for_receipt(&tx_hash).await?;
        if !receipt.succeeded() {
            return Err(ChainLogError::SubmissionFailure(format!(
                "Transaction {} reverted in block {}",
                tx_hash,
                receipt.block_number_u64()
            )));
        }

        info!(
            tx_hash = %tx_hash,
            block = receipt.block_number_u64(),
            "Transaction confirmed"
        );
        Ok((tx_hash, receipt))
    }

    /// レシートが得られるまでポーリングする（タイムアウト付き）
    pub async fn wait_for_receipt(&self, tx_hash: &str) -> ChainResult<TransactionReceipt> {
        let deadline = tokio::time::Instant::now() + self.submission_timeout;

        loop {
            let result: Option<TransactionReceipt> = self
                .rpc
                .call("eth_getTransactionReceipt", json!([tx_hash]))
                .await
                .ok()
                .flatten();

            if let Some(receipt) = result {
                return Ok(receipt);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ChainLogError::SubmissionTimeout(
                    self.submission_timeout.as_secs(),
                ));
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }

    /// レシートから採番ログIDを解決する（二経路リゾルバ）
    ///
    /// イベント解析が権威的経路。失敗時のみlogCountフォールバックに回り、
    /// どちらを使ったかを結果に含める。フォールバックは同一署名アカウントを
    /// 共有する並行書き込み下では競合し得る。
    pub async fn resolve_log_id(
        &self,
        receipt: &TransactionReceipt,
    ) -> ChainResult<LogIdResolution> {
        let contract = self.require_contract()?;

        match events::log_id_from_receipt(receipt, contract) {
            Ok(log_id) => Ok(LogIdResolution {
                log_id,
                source: LogIdSource::Event,
            }),
            Err(e) => {
                events::warn_fallback(&receipt.transaction_hash, &e);
                let count = self.get_log_count().await?;
                if count == 0 {
                    return Err(ChainLogError::Decode(
                        "logCount is zero after confirmed write".to_string(),
                    ));
                }
                Ok(LogIdResolution {
                    log_id: count - 1,
                    source: LogIdSource::CountFallback,
                })
            }
        }
    }

    /// オンチェーンの活動ログをIDで取得する
    pub async fn get_log(&self, log_id: u64) -> ChainResult<LedgerRecord> {
        let contract = self.require_contract()?;
        let data = abi::encode_get_log(log_id);
        let result: String = self
            .rpc
            .call(
                "eth_call",
                json!([{ "to": contract, "data": format!("0x{}", hex::encode(data)) }, "latest"]),
            )
            .await?;
        abi::decode_get_log(&abi::parse_hex_bytes(&result)?)
    }

    /// オンチェーンの総ログ件数
    pub async fn get_log_count(&self) -> ChainResult<u64> {
        let contract = self.require_contract()?;
        let data = abi::encode_log_count();
        let result: String = self
            .rpc
            .call(
                "eth_call",
                json!([{ "to": contract, "data": format!("0x{}", hex::encode(data)) }, "latest"]),
            )
            .await?;
        abi::decode_uint(&abi::parse_hex_bytes(&result)?)
    }
}

/// アドレス文字列を検証して小文字0x形式に正規化する
fn normalize_address(address: &str) -> ChainResult<String> {
    let bytes = parse_address(address)?;
    Ok(format!("0x{}", hex::encode(bytes)))
}

/// アドレス文字列を20バイトにパースする
fn parse_address(address: &str) -> ChainResult<[u8; 20]> {
    let stripped = address.trim().trim_start_matches("0x");
    let bytes = hex::decode(stripped)
        .map_err(|_| ChainLogError::Validation(format!("Invalid contract address: {}", address)))?;
    bytes.try_into().map_err(|_| {
        ChainLogError::Validation(format!("Invalid contract address length: {}", address))
    })
}

/// weiをether表記の文字列に変換する（表示用）
pub fn wei_to_ether_string(wei: u128) -> String {
    let whole = wei / 1_000_000_000_000_000_000;
    let frac = wei % 1_000_000_000_000_000_000;
    let frac_str = format!("{:018}", frac);
    let trimmed = frac_str.trim_end_matches('0');
    if trimmed.is_empty() {
        format!("{}", whole)
    } else {
        format!("{}.{}", whole, trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        let addr = parse_address("0xA7f94107186B09DC646AE6328c00f1750973f2d0").unwrap();
        assert_eq!(addr[0], 0xa7);
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("zzz").is_err());
    }

    #[test]
    fn test_normalize_address_lowercases() {
        assert_eq!(
            normalize_address("0xA7f94107186B09DC646AE6328c00f1750973f2d0").unwrap(),
            "0xa7f94107186b09dc646ae6328c00f1750973f2d0"
        );
    }

    #[test]
    fn test_wei_to_ether_string() {
        assert_eq!(wei_to_ether_string(0), "0");
        assert_eq!(wei_to_ether_string(1_000_000_000_000_000_000), "1");
        assert_eq!(wei_to_ether_string(1_500_000_000_000_000_000), "1.5");
        assert_eq!(wei_to_ether_string(1), "0.000000000000000001");
    }
}
