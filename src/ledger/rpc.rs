//! JSON-RPCトランスポート
//!
//! reqwestベースの薄いJSON-RPC 2.0クライアント。接続プーリングは
//! 共有`reqwest::Client`に任せる。

use crate::common::error::{ChainLogError, ChainResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

/// JSON-RPCエラーオブジェクト
#[derive(Debug, Deserialize)]
pub struct RpcErrorBody {
    /// エラーコード
    pub code: i64,
    /// ノードのエラーメッセージ
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

/// JSON-RPCクライアント
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
}

impl RpcClient {
    /// 新しいRPCクライアントを作成する
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    /// RPCエンドポイントURLを返す
    pub fn url(&self) -> &str {
        &self.url
    }

    /// 単一のRPC呼び出しを実行する
    ///
    /// トランスポート障害は`Http`、ノードのエラー応答はノードメッセージ込みの
    /// `Http`として返す。送信系メソッドの呼び出し側で`SubmissionFailure`に
    /// 翻訳される。
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> ChainResult<T> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainLogError::Http(format!("RPC request failed ({}): {}", method, e)))?;

        let parsed: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| ChainLogError::Http(format!("Invalid RPC response ({}): {}", method, e)))?;

        if let Some(error) = parsed.error {
            return Err(ChainLogError::Http(format!(
                "RPC error ({}): {} (code {})",
                method, error.message, error.code
            )));
        }

        parsed
            .result
            .ok_or_else(|| ChainLogError::Http(format!("Empty RPC result ({})", method)))
    }
}

/// "0x"付きhex quantityをu64にパースする
pub fn parse_quantity_u64(value: &str) -> ChainResult<u64> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|e| ChainLogError::Decode(format!("Invalid hex quantity '{}': {}", value, e)))
}

/// "0x"付きhex quantityをu128にパースする
pub fn parse_quantity_u128(value: &str) -> ChainResult<u128> {
    u128::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|e| ChainLogError::Decode(format!("Invalid hex quantity '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity_u64("0x1a").unwrap(), 26);
        assert_eq!(parse_quantity_u128("0xde0b6b3a7640000").unwrap(), 1_000_000_000_000_000_000);
        assert!(parse_quantity_u64("0xzz").is_err());
    }

    #[tokio::test]
    async fn test_call_returns_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(body_partial_json(serde_json::json!({"method": "eth_blockNumber"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "result": "0x10"
            })))
            .mount(&server)
            .await;

        let client = RpcClient::new(reqwest::Client::new(), server.uri());
        let result: String = client
            .call("eth_blockNumber", serde_json::json!([]))
            .await
            .unwrap();
        assert_eq!(result, "0x10");
    }

    #[tokio::test]
    async fn test_call_surfaces_node_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1,
                "error": {"code": -32000, "message": "insufficient funds"}
            })))
            .mount(&server)
            .await;

        let client = RpcClient::new(reqwest::Client::new(), server.uri());
        let result: ChainResult<String> = client.call("eth_sendRawTransaction", serde_json::json!([])).await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("insufficient funds"));
    }
}
