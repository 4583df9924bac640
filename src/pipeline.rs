//! コミットパイプライン
//!
//! 受信した活動イベントを 検証 → ハッシュ → 送信 → 確認 → ログID解決 →
//! ミラー書き込み の単一論理操作として実行する。各ステージは1呼び出しに
//! つき最大1回しか試行しない（リトライ方針は呼び出し側の責務）。
//!
//! ミラー書き込みのみ失敗した場合は部分成功となる。レコードはチェーン上に
//! 確かに存在するため、オンチェーン情報と警告を返し、総合失敗として
//! 扱わない。

use crate::common::error::{ChainLogError, ChainResult};
use crate::hasher;
use crate::ledger::{ActivityRecord, LogIdSource};
use crate::AppState;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

/// 呼び出し側から受け取る活動ログリクエスト
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogRequest {
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
    /// 記録対象の構造化ペイロード
    pub data: Value,
}

/// コミット結果
///
/// `warning`が設定されている場合はミラー書き込みのみ失敗した部分成功。
/// オンチェーン情報は有効で、イベントは永続的に記録済み。
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    /// 採番されたログID
    pub log_id: u64,
    /// トランザクションハッシュ
    pub transaction_hash: String,
    /// 取り込まれたブロック番号
    pub block_number: u64,
    /// 署名アカウントのアドレス
    pub actor_address: String,
    /// ペイロードダイジェスト
    pub data_hash: String,
    /// ログID解決に使われた経路
    pub log_id_source: LogIdSource,
    /// ミラー書き込み失敗時の警告
    pub warning: Option<String>,
}

/// 完全性検証レポート
///
/// 不一致はエラーではなく報告対象の正常な結果。両ダイジェストを返して
/// 呼び出し側の透明性を確保する。
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    /// 対象ログID
    pub log_id: u64,
    /// ダイジェストが一致したか
    pub is_valid: bool,
    /// チェーン上に保存されたダイジェスト
    pub blockchain_hash: String,
    /// 提出ペイロードから再計算したダイジェスト
    pub calculated_hash: String,
    /// 人間可読の判定メッセージ
    pub message: String,
}

/// リクエストを検証する（I/O前に実行）
fn validate(request: &ActivityLogRequest) -> ChainResult<()> {
    let required = [
        ("service_identifier", &request.service_identifier),
        ("action", &request.action),
        ("entity_type", &request.entity_type),
        ("actor_username", &request.actor_username),
        ("change_description", &request.change_description),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(ChainLogError::Validation(format!(
                "Field '{}' must not be empty",
                name
            )));
        }
    }
    Ok(())
}

/// 活動イベントをレジャーに記録し、ミラーへ書き込む
pub async fn commit(state: &AppState, request: &ActivityLogRequest) -> ChainResult<CommitOutcome> {
    validate(request)?;
    let ledger = state.ledger()?;

    let data_hash = hasher::digest(&request.data);
    let record = ActivityRecord {
        service_identifier: request.service_identifier.clone(),
        action: request.action.clone(),
        entity_type: request.entity_type.clone(),
        entity_id: request.entity_id,
        actor_username: request.actor_username.clone(),
        change_description: request.change_description.clone(),
        data_hash: data_hash.clone(),
    };

    let (transaction_hash, receipt) = ledger.submit_log_activity(&record).await?;
    let block_number = receipt.block_number_u64();
    let resolution = ledger.resolve_log_id(&receipt).await?;
    let actor_address = ledger.actor_address();

    // ミラー書き込み失敗は部分成功として警告に落とす
    let warning = match state
        .store
        .insert(
            resolution.log_id as i64,
            &transaction_hash,
            block_number as i64,
            &record,
            &actor_address,
        )
        .await
    {
        Ok(()) => None,
        Err(e) => {
            error!(
                blockchain_log_id = resolution.log_id,
                tx_hash = %transaction_hash,
                error = %e,
                "Ledger write confirmed but mirror insert failed"
            );
            Some(
                "Mirror database write failed; the record is confirmed on-chain and will be \
                 missing from fast queries until reconciled"
                    .to_string(),
            )
        }
    };

    info!(
        blockchain_log_id = resolution.log_id,
        tx_hash = %transaction_hash,
        source = ?resolution.source,
        "Activity committed to ledger"
    );

    Ok(CommitOutcome {
        log_id: resolution.log_id,
        transaction_hash,
        block_number,
        actor_address,
        data_hash,
        log_id_source: resolution.source,
        warning,
    })
}

/// 提出ペイロードのダイジェストをチェーン上のレコードと突き合わせる
///
/// レコードはミラーではなくレジャーから直接取得する。派生キャッシュを
/// 完全性の根拠にしないため。
pub async fn verify(state: &AppState, log_id: u64, payload: &Value) -> ChainResult<VerificationReport> {
    let ledger = state.ledger()?;
    let record = ledger.get_log(log_id).await?;

    let calculated_hash = hasher::digest(payload);
    let is_valid = record.data_hash == calculated_hash;

    let message = if is_valid {
        "Data integrity verified".to_string()
    } else {
        "Data has been tampered with".to_string()
    };

    Ok(VerificationReport {
        log_id,
        is_valid,
        blockchain_hash: record.data_hash,
        calculated_hash,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::abi;
    use crate::ledger::types::LedgerRecord;
    use crate::test_support::{mock_rpc_base, test_state, CONTRACT, SIGNER_ADDRESS};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_request() -> ActivityLogRequest {
        ActivityLogRequest {
            service_identifier: "POS_SALES".to_string(),
            action: "CREATE".to_string(),
            entity_type: "Sale".to_string(),
            entity_id: 42,
            actor_username: "alice".to_string(),
            change_description: "new sale".to_string(),
            data: json!({"total": 99.5}),
        }
    }

    fn rpc_result(value: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": value}))
    }

    /// 送信系メソッドとイベント付きレシートをモックする
    async fn mock_submission(server: &MockServer, log_id: u64) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_getTransactionCount"})))
            .respond_with(rpc_result(json!("0x0")))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_gasPrice"})))
            .respond_with(rpc_result(json!("0x4a817c800")))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_sendRawTransaction"})))
            .respond_with(rpc_result(json!("0xdeadbeef")))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_getTransactionReceipt"})))
            .respond_with(rpc_result(json!({
                "transactionHash": "0xdeadbeef",
                "blockNumber": "0x10",
                "status": "0x1",
                "logs": [{
                    "address": CONTRACT,
                    "topics": [
                        format!("0x{}", hex::encode(abi::activity_logged_topic())),
                        format!("0x{:064x}", log_id),
                    ],
                    "data": "0x"
                }]
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_commit_happy_path() {
        let server = mock_rpc_base().await;
        mock_submission(&server, 7).await;
        let state = test_state(&server).await;

        let outcome = commit(&state, &sample_request()).await.unwrap();
        assert_eq!(outcome.log_id, 7);
        assert_eq!(outcome.transaction_hash, "0xdeadbeef");
        assert_eq!(outcome.block_number, 16);
        assert_eq!(outcome.log_id_source, LogIdSource::Event);
        assert_eq!(outcome.actor_address, SIGNER_ADDRESS);
        assert_eq!(outcome.data_hash, crate::hasher::digest(&json!({"total": 99.5})));
        assert!(outcome.warning.is_none());

        // ミラーにも書かれている
        let row = state.store.get_by_log_id(7).await.unwrap().expect("mirrored");
        assert_eq!(row.transaction_hash, "0xdeadbeef");
        assert_eq!(row.entity_id, 42);
    }

    #[tokio::test]
    async fn test_commit_validation_rejects_empty_field() {
        let server = mock_rpc_base().await;
        let state = test_state(&server).await;

        let mut request = sample_request();
        request.actor_username = "  ".to_string();
        let err = commit(&state, &request).await.unwrap_err();
        assert!(matches!(err, ChainLogError::Validation(_)));
    }

    #[tokio::test]
    async fn test_commit_without_ledger_is_unavailable() {
        let server = mock_rpc_base().await;
        let mut state = test_state(&server).await;
        state.ledger = None;

        let err = commit(&state, &sample_request()).await.unwrap_err();
        assert!(matches!(err, ChainLogError::NotInitialized));
    }

    #[tokio::test]
    async fn test_commit_mirror_failure_is_partial_success() {
        let server = mock_rpc_base().await;
        mock_submission(&server, 3).await;
        let state = test_state(&server).await;

        // ミラーDBを落として書き込みを失敗させる
        state.db_pool.close().await;

        let outcome = commit(&state, &sample_request()).await.unwrap();
        assert_eq!(outcome.log_id, 3);
        assert_eq!(outcome.transaction_hash, "0xdeadbeef");
        assert!(outcome.warning.is_some());
    }

    #[tokio::test]
    async fn test_commit_node_rejection_is_submission_failure() {
        let server = mock_rpc_base().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_getTransactionCount"})))
            .respond_with(rpc_result(json!("0x0")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_gasPrice"})))
            .respond_with(rpc_result(json!("0x1")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_sendRawTransaction"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "error": {"code": -32000, "message": "insufficient funds"}
            })))
            .mount(&server)
            .await;

        let state = test_state(&server).await;
        let err = commit(&state, &sample_request()).await.unwrap_err();
        match err {
            ChainLogError::SubmissionFailure(msg) => assert!(msg.contains("insufficient funds")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_verify_matching_payload() {
        let server = mock_rpc_base().await;
        let state = test_state(&server).await;

        let payload = json!({"total": 99.5});
        let record = LedgerRecord {
            log_id: 5,
            service_identifier: "POS_SALES".to_string(),
            action: "CREATE".to_string(),
            entity_type: "Sale".to_string(),
            entity_id: 42,
            actor_username: "alice".to_string(),
            actor_address: SIGNER_ADDRESS.to_string(),
            change_description: "new sale".to_string(),
            data_hash: crate::hasher::digest(&payload),
            timestamp: 1_756_400_000,
        };
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_call"})))
            .respond_with(rpc_result(json!(format!(
                "0x{}",
                hex::encode(abi::encode_log_tuple(&record))
            ))))
            .mount(&server)
            .await;

        let report = verify(&state, 5, &payload).await.unwrap();
        assert!(report.is_valid);
        assert_eq!(report.blockchain_hash, report.calculated_hash);

        // 改ざんペイロードは不一致になるがエラーにはならない
        let tampered = verify(&state, 5, &json!({"total": 100.0})).await.unwrap();
        assert!(!tampered.is_valid);
        assert_ne!(tampered.blockchain_hash, tampered.calculated_hash);
    }
}
