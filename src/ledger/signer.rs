//! トランザクション署名
//!
//! secp256k1鍵によるEIP-155レガシートランザクションのローカル署名。
//! 秘密鍵はプロセスメモリ内でのみ保持し、どのRPCにも送信しない。

use crate::common::error::{ChainLogError, ChainResult};
use crate::ledger::abi::keccak256;
use k256::ecdsa::SigningKey;
use rlp::RlpStream;

/// 署名前のレガシートランザクション
#[derive(Debug, Clone)]
pub struct LegacyTransaction {
    /// アカウントのnonce
    pub nonce: u64,
    /// ガス価格（wei）
    pub gas_price: u128,
    /// ガス上限
    pub gas_limit: u64,
    /// 宛先コントラクトアドレス
    pub to: [u8; 20],
    /// 送金額（活動ログでは常に0）
    pub value: u128,
    /// ABIエンコード済み呼び出しデータ
    pub data: Vec<u8>,
}

/// ローカル署名器
///
/// 鍵からアドレスを導出して保持する。署名自体はステートレス。
#[derive(Clone)]
pub struct Signer {
    key: SigningKey,
    address: [u8; 20],
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 鍵材はデバッグ出力にも含めない
        f.debug_struct("Signer")
            .field("address", &self.address_hex())
            .finish()
    }
}

impl Signer {
    /// hex文字列の秘密鍵から署名器を作成する
    pub fn from_hex(private_key: &str) -> ChainResult<Self> {
        let stripped = private_key.trim().trim_start_matches("0x");
        let bytes = hex::decode(stripped)
            .map_err(|_| ChainLogError::Validation("Invalid private key encoding".to_string()))?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|_| ChainLogError::Validation("Invalid private key".to_string()))?;

        let address = derive_address(&key);
        Ok(Self { key, address })
    }

    /// アカウントアドレス（0x付き小文字hex）
    pub fn address_hex(&self) -> String {
        format!("0x{}", hex::encode(self.address))
    }

    /// アカウントアドレス（生バイト）
    pub fn address(&self) -> [u8; 20] {
        self.address
    }

    /// EIP-155でトランザクションを署名し、rawトランザクションバイト列を返す
    pub fn sign_transaction(
        &self,
        tx: &LegacyTransaction,
        chain_id: u64,
    ) -> ChainResult<Vec<u8>> {
        // 署名対象: rlp([nonce, gasPrice, gas, to, value, data, chainId, 0, 0])
        let mut stream = RlpStream::new_list(9);
        append_tx_fields(&mut stream, tx);
        stream.append(&chain_id);
        stream.append_empty_data();
        stream.append_empty_data();
        let signing_hash = keccak256(&stream.out());

        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&signing_hash)
            .map_err(|e| ChainLogError::Internal(format!("Signing failed: {}", e)))?;

        let v = chain_id * 2 + 35 + u64::from(recovery_id.to_byte());
        let r = trim_leading_zeros(&signature.r().to_bytes());
        let s = trim_leading_zeros(&signature.s().to_bytes());

        let mut signed = RlpStream::new_list(9);
        append_tx_fields(&mut signed, tx);
        signed.append(&v);
        signed.append(&r);
        signed.append(&s);
        Ok(signed.out().to_vec())
    }
}

/// 共通6フィールドをRLPストリームに書き出す
fn append_tx_fields(stream: &mut RlpStream, tx: &LegacyTransaction) {
    stream.append(&tx.nonce);
    stream.append(&tx.gas_price);
    stream.append(&tx.gas_limit);
    stream.append(&tx.to.as_slice());
    stream.append(&tx.value);
    stream.append(&tx.data);
}

/// 公開鍵からアドレスを導出する（非圧縮公開鍵のKeccak下位20バイト）
fn derive_address(key: &SigningKey) -> [u8; 20] {
    let public = key.verifying_key().to_encoded_point(false);
    let hash = keccak256(&public.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// RLP整数エンコード用に先頭ゼロバイトを除去する
fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    // 既知のテストベクタ: 秘密鍵0x...0001のアドレス
    const KEY_ONE: &str = "0000000000000000000000000000000000000000000000000000000000000001";

    #[test]
    fn test_address_derivation_known_vector() {
        let signer = Signer::from_hex(KEY_ONE).unwrap();
        assert_eq!(
            signer.address_hex(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_from_hex_accepts_0x_prefix() {
        let a = Signer::from_hex(KEY_ONE).unwrap();
        let b = Signer::from_hex(&format!("0x{}", KEY_ONE)).unwrap();
        assert_eq!(a.address_hex(), b.address_hex());
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(Signer::from_hex("not-a-key").is_err());
        assert!(Signer::from_hex("abcd").is_err());
    }

    #[test]
    fn test_sign_transaction_produces_valid_rlp() {
        let signer = Signer::from_hex(KEY_ONE).unwrap();
        let tx = LegacyTransaction {
            nonce: 0,
            gas_price: 20_000_000_000,
            gas_limit: 500_000,
            to: [0x11; 20],
            value: 0,
            data: vec![0xde, 0xad],
        };

        let raw = signer.sign_transaction(&tx, 1).unwrap();
        let decoded = rlp::Rlp::new(&raw);
        assert!(decoded.is_list());
        assert_eq!(decoded.item_count().unwrap(), 9);

        // vはEIP-155の範囲（chain_id 1 → 37または38）
        let v: u64 = decoded.val_at(6).unwrap();
        assert!(v == 37 || v == 38);
    }

    #[test]
    fn test_signing_is_deterministic() {
        // RFC 6979による決定的署名
        let signer = Signer::from_hex(KEY_ONE).unwrap();
        let tx = LegacyTransaction {
            nonce: 5,
            gas_price: 1_000,
            gas_limit: 21_000,
            to: [0x22; 20],
            value: 0,
            data: vec![],
        };
        assert_eq!(
            signer.sign_transaction(&tx, 99).unwrap(),
            signer.sign_transaction(&tx, 99).unwrap()
        );
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let signer = Signer::from_hex(KEY_ONE).unwrap();
        let debug = format!("{:?}", signer);
        assert!(!debug.contains(KEY_ONE));
        assert!(debug.contains("0x7e5f4552"));
    }
}
