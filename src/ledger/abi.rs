//! コントラクトABIエンコード・デコード
//!
//! ActivityLoggerコントラクトの3関数（logActivity / getLog / logCount）と
//! ActivityLoggedイベントのみを扱う最小実装。

use crate::common::error::{ChainLogError, ChainResult};
use crate::ledger::types::{ActivityRecord, LedgerRecord};
use sha3::{Digest, Keccak256};

/// Keccak-256ハッシュ
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// 関数セレクタ（シグネチャのKeccak-256先頭4バイト）
fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// ActivityLoggedイベントのtopic0
///
/// `ActivityLogged(uint256 indexed logId, string serviceIdentifier,
///  string action, address indexed actorAddress, uint256 timestamp)`
pub fn activity_logged_topic() -> [u8; 32] {
    keccak256(b"ActivityLogged(uint256,string,string,address,uint256)")
}

/// u64を32バイトワードにエンコードする
fn uint_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// 動的バイト列をエンコードする（長さワード + 32バイト境界へのパディング）
fn encode_bytes(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + data.len().div_ceil(32) * 32);
    out.extend_from_slice(&uint_word(data.len() as u64));
    out.extend_from_slice(data);
    let padding = data.len().div_ceil(32) * 32 - data.len();
    out.extend(std::iter::repeat(0u8).take(padding));
    out
}

/// ABI引数（本コントラクトで使う型のみ）
enum Token<'a> {
    Uint(u64),
    Str(&'a str),
}

/// head/tail方式で引数列をエンコードする
fn encode_tokens(tokens: &[Token<'_>]) -> Vec<u8> {
    let head_len = tokens.len() * 32;
    let mut heads: Vec<u8> = Vec::with_capacity(head_len);
    let mut tail: Vec<u8> = Vec::new();

    for token in tokens {
        match token {
            Token::Uint(value) => heads.extend_from_slice(&uint_word(*value)),
            Token::Str(s) => {
                // 動的型はhead領域末尾からの相対オフセットを書く
                heads.extend_from_slice(&uint_word((head_len + tail.len()) as u64));
                tail.extend_from_slice(&encode_bytes(s.as_bytes()));
            }
        }
    }

    heads.extend_from_slice(&tail);
    heads
}

/// `logActivity(string,string,string,uint256,string,string,string)` 呼び出しデータ
pub fn encode_log_activity(record: &ActivityRecord) -> Vec<u8> {
    let mut data = selector(
        "logActivity(string,string,string,uint256,string,string,string)",
    )
    .to_vec();
    data.extend_from_slice(&encode_tokens(&[
        Token::Str(&record.service_identifier),
        Token::Str(&record.action),
        Token::Str(&record.entity_type),
        Token::Uint(record.entity_id),
        Token::Str(&record.actor_username),
        Token::Str(&record.change_description),
        Token::Str(&record.data_hash),
    ]));
    data
}

/// `getLog(uint256)` 呼び出しデータ
pub fn encode_get_log(log_id: u64) -> Vec<u8> {
    let mut data = selector("getLog(uint256)").to_vec();
    data.extend_from_slice(&uint_word(log_id));
    data
}

/// `logCount()` 呼び出しデータ
pub fn encode_log_count() -> Vec<u8> {
    selector("logCount()").to_vec()
}

/// "0x"プレフィックス付きhex文字列をバイト列に変換する
pub fn parse_hex_bytes(value: &str) -> ChainResult<Vec<u8>> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(stripped).map_err(|e| ChainLogError::Decode(format!("Invalid hex data: {}", e)))
}

/// 指定位置の32バイトワードを読む
fn read_word(data: &[u8], offset: usize) -> ChainResult<&[u8]> {
    data.get(offset..offset + 32)
        .ok_or_else(|| ChainLogError::Decode(format!("ABI data truncated at offset {}", offset)))
}

/// ワードをu64として読む（上位バイトが立っている場合はエラー）
fn read_u64(data: &[u8], offset: usize) -> ChainResult<u64> {
    let word = read_word(data, offset)?;
    if word[..24].iter().any(|&b| b != 0) {
        return Err(ChainLogError::Decode(format!(
            "uint256 at offset {} exceeds u64 range",
            offset
        )));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(buf))
}

/// ワードをアドレス（下位20バイト）として読み、0x付き小文字hexで返す
fn read_address(data: &[u8], offset: usize) -> ChainResult<String> {
    let word = read_word(data, offset)?;
    Ok(format!("0x{}", hex::encode(&word[12..])))
}

/// 動的文字列を読む（offsetは文字列ヘッドの絶対位置）
fn read_string(data: &[u8], offset: usize) -> ChainResult<String> {
    let len = read_u64(data, offset)? as usize;
    let bytes = data
        .get(offset + 32..offset + 32 + len)
        .ok_or_else(|| ChainLogError::Decode("string data truncated".to_string()))?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| ChainLogError::Decode(format!("Invalid UTF-8 in string: {}", e)))
}

/// `getLog` の戻り値（ActivityLogタプル）をデコードする
pub fn decode_get_log(return_data: &[u8]) -> ChainResult<LedgerRecord> {
    // 戻り値は動的タプル1個なので先頭ワードがタプルへのオフセット
    let base = read_u64(return_data, 0)? as usize;

    let string_at = |slot: usize| -> ChainResult<String> {
        let offset = read_u64(return_data, base + slot * 32)? as usize;
        read_string(return_data, base + offset)
    };

    Ok(LedgerRecord {
        log_id: read_u64(return_data, base)?,
        service_identifier: string_at(1)?,
        action: string_at(2)?,
        entity_type: string_at(3)?,
        entity_id: read_u64(return_data, base + 4 * 32)?,
        actor_username: string_at(5)?,
        actor_address: read_address(return_data, base + 6 * 32)?,
        change_description: string_at(7)?,
        data_hash: string_at(8)?,
        timestamp: read_u64(return_data, base + 9 * 32)?,
    })
}

/// 単一uint256戻り値をデコードする（logCount用）
pub fn decode_uint(return_data: &[u8]) -> ChainResult<u64> {
    read_u64(return_data, 0)
}

/// logCount戻り値をエンコードする（テスト用）
#[cfg(test)]
pub(crate) fn encode_uint_return(value: u64) -> Vec<u8> {
    uint_word(value).to_vec()
}

/// getLog戻り値のActivityLogタプルをエンコードする（テスト用）
#[cfg(test)]
pub(crate) fn encode_log_tuple(record: &LedgerRecord) -> Vec<u8> {
    let head_len = 10 * 32;
    let mut heads: Vec<u8> = Vec::new();
    let mut tail: Vec<u8> = Vec::new();

    let mut push_str = |heads: &mut Vec<u8>, tail: &mut Vec<u8>, s: &str| {
        heads.extend_from_slice(&uint_word((head_len + tail.len()) as u64));
        tail.extend_from_slice(&encode_bytes(s.as_bytes()));
    };

    heads.extend_from_slice(&uint_word(record.log_id));
    push_str(&mut heads, &mut tail, &record.service_identifier);
    push_str(&mut heads, &mut tail, &record.action);
    push_str(&mut heads, &mut tail, &record.entity_type);
    heads.extend_from_slice(&uint_word(record.entity_id));
    push_str(&mut heads, &mut tail, &record.actor_username);
    let mut addr_word = [0u8; 32];
    let addr_bytes =
        hex::decode(record.actor_address.trim_start_matches("0x")).expect("address hex");
    addr_word[12..].copy_from_slice(&addr_bytes);
    heads.extend_from_slice(&addr_word);
    push_str(&mut heads, &mut tail, &record.change_description);
    push_str(&mut heads, &mut tail, &record.data_hash);
    heads.extend_from_slice(&uint_word(record.timestamp));

    let mut out = uint_word(32).to_vec();
    out.extend_from_slice(&heads);
    out.extend_from_slice(&tail);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> ActivityRecord {
        ActivityRecord {
            service_identifier: "POS_SALES".to_string(),
            action: "CREATE".to_string(),
            entity_type: "Sale".to_string(),
            entity_id: 42,
            actor_username: "alice".to_string(),
            change_description: "new sale".to_string(),
            data_hash: "ab".repeat(32),
        }
    }

    #[test]
    fn test_selector_is_first_four_bytes_of_keccak() {
        // transfer(address,uint256) の既知セレクタで検証
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn test_encode_log_activity_layout() {
        let data = encode_log_activity(&sample_record());
        // セレクタ4バイト + head7ワード + 各文字列tail
        assert_eq!(&data[..4], &selector("logActivity(string,string,string,uint256,string,string,string)"));
        let args = &data[4..];
        assert_eq!(args.len() % 32, 0);

        // 第4引数（entityId）はインライン
        assert_eq!(read_u64(args, 3 * 32).unwrap(), 42);

        // 第1引数のオフセット先に "POS_SALES"（長さ9）がある
        let offset = read_u64(args, 0).unwrap() as usize;
        assert_eq!(read_string(args, offset).unwrap(), "POS_SALES");
    }

    #[test]
    fn test_encode_get_log() {
        let data = encode_get_log(7);
        assert_eq!(data.len(), 36);
        assert_eq!(read_u64(&data[4..], 0).unwrap(), 7);
    }

    #[test]
    fn test_decode_get_log_round_trip() {
        let record = LedgerRecord {
            log_id: 3,
            service_identifier: "POS_SALES".to_string(),
            action: "UPDATE".to_string(),
            entity_type: "Sale".to_string(),
            entity_id: 42,
            actor_username: "alice".to_string(),
            actor_address: format!("0x{}", "11".repeat(20)),
            change_description: "price adjusted".to_string(),
            data_hash: "cd".repeat(32),
            timestamp: 1_756_400_000,
        };

        let encoded = encode_log_tuple(&record);
        let decoded = decode_get_log(&encoded).unwrap();
        assert_eq!(decoded.log_id, 3);
        assert_eq!(decoded.service_identifier, "POS_SALES");
        assert_eq!(decoded.entity_id, 42);
        assert_eq!(decoded.actor_address, record.actor_address);
        assert_eq!(decoded.data_hash, record.data_hash);
        assert_eq!(decoded.timestamp, 1_756_400_000);
    }

    #[test]
    fn test_decode_truncated_data_fails() {
        let result = decode_get_log(&[0u8; 16]);
        assert!(matches!(result, Err(ChainLogError::Decode(_))));
    }

    #[test]
    fn test_decode_uint() {
        assert_eq!(decode_uint(&uint_word(12)).unwrap(), 12);
    }
}
