//! レジャー関連の型定義

use serde::{Deserialize, Serialize};

/// コントラクトに記録する活動レコード（呼び出し側7フィールド）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// サービス識別子（例: "POS_SALES"）
    pub service_identifier: String,
    /// 操作種別（CREATE / UPDATE / DELETE / CANCEL / REFUND 等）
    pub action: String,
    /// エンティティ種別（例: "Sale"）
    pub entity_type: String,
    /// エンティティID
    pub entity_id: u64,
    /// 操作者ユーザー名
    pub actor_username: String,
    /// 変更内容の説明
    pub change_description: String,
    /// ペイロードのダイジェスト（小文字hex）
    pub data_hash: String,
}

/// チェーン上の活動ログレコード（getLogの戻り値）
///
/// actorAddressは署名鍵から導出されるためコントラクト側で設定され、
/// timestampはブロック時刻が入る。一度作成されたら変更されない。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// コントラクトが採番する連番ログID
    pub log_id: u64,
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
    /// 署名アカウントのアドレス
    pub actor_address: String,
    /// 変更内容の説明
    pub change_description: String,
    /// ペイロードのダイジェスト
    pub data_hash: String,
    /// ブロック時刻（unix秒）
    pub timestamp: u64,
}

/// レシート内のイベントログ
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptLog {
    /// 発行元コントラクトアドレス
    pub address: String,
    /// インデックス付きトピック（topic0はイベントシグネチャ）
    pub topics: Vec<String>,
    /// 非インデックス引数のABIエンコードデータ
    pub data: String,
}

/// トランザクションレシート
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    /// トランザクションハッシュ
    pub transaction_hash: String,
    /// 取り込まれたブロック番号（hex quantity）
    pub block_number: String,
    /// 実行結果（"0x1" = 成功）
    pub status: Option<String>,
    /// 発行されたイベントログ
    #[serde(default)]
    pub logs: Vec<ReceiptLog>,
}

impl TransactionReceipt {
    /// ブロック番号をu64で返す
    pub fn block_number_u64(&self) -> u64 {
        u64::from_str_radix(self.block_number.trim_start_matches("0x"), 16).unwrap_or(0)
    }

    /// トランザクションが成功したか
    pub fn succeeded(&self) -> bool {
        match self.status.as_deref() {
            // statusフィールドを返さない古いノードは成功扱い
            None => true,
            Some(s) => u64::from_str_radix(s.trim_start_matches("0x"), 16).unwrap_or(0) == 1,
        }
    }
}
