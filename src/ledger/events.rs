//! イベントデコーダ
//!
//! 確認済みレシートからActivityLoggedイベントの採番ログIDを抽出する。
//! イベント解析が失敗した場合はコントラクト状態（logCount）による
//! ベストエフォートのフォールバックに回る。どちらの経路で解決したかは
//! 呼び出し側が`LogIdSource`で判別できる。

use crate::common::error::{ChainLogError, ChainResult};
use crate::ledger::abi;
use crate::ledger::rpc::parse_quantity_u64;
use crate::ledger::types::TransactionReceipt;
use serde::Serialize;
use tracing::warn;

/// ログIDの解決経路
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogIdSource {
    /// レシートのActivityLoggedイベントから取得（権威的）
    Event,
    /// logCount - 1 による推定（ベストエフォート、並行書き込み下では不正確）
    CountFallback,
}

/// ログID解決結果
#[derive(Debug, Clone, Copy)]
pub struct LogIdResolution {
    /// 採番されたログID
    pub log_id: u64,
    /// 解決に使われた経路
    pub source: LogIdSource,
}

/// レシートのイベントからログIDを抽出する
///
/// 対象コントラクト発のtopic0一致ログを探し、インデックス付き第1引数
/// （logId）を返す。見つからない場合は`Decode`エラー。
pub fn log_id_from_receipt(
    receipt: &TransactionReceipt,
    contract_address: &str,
) -> ChainResult<u64> {
    let topic = format!("0x{}", hex::encode(abi::activity_logged_topic()));

    for log in &receipt.logs {
        if !log.address.eq_ignore_ascii_case(contract_address) {
            continue;
        }
        let Some(topic0) = log.topics.first() else {
            continue;
        };
        if !topic0.eq_ignore_ascii_case(&topic) {
            continue;
        }
        let log_id_topic = log.topics.get(1).ok_or_else(|| {
            ChainLogError::Decode("ActivityLogged event missing logId topic".to_string())
        })?;
        return parse_quantity_u64(log_id_topic);
    }

    Err(ChainLogError::Decode(
        "No ActivityLogged event in receipt".to_string(),
    ))
}

/// イベント解析の失敗を警告ログに残す（フォールバック直前に呼ぶ）
pub fn warn_fallback(tx_hash: &str, err: &ChainLogError) {
    warn!(
        tx_hash = %tx_hash,
        error = %err,
        "Could not parse ActivityLogged event, falling back to logCount"
    );
}
