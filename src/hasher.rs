//! ペイロードのコンテンツアドレッシング
//!
//! 任意の構造化ペイロードを正規化シリアライズしてSHA-256ダイジェストを計算する。
//! キー順序が異なるだけで構造的に等しいペイロードは常に同一ダイジェストになる。

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// ペイロードの決定的SHA-256ダイジェストを計算する（小文字hex、64文字）
///
/// 正規化ルール: 全ネストレベルでキーを辞書順ソートし、スカラー値は
/// JSONの安定表現でレンダリングする。純関数で副作用なし。
pub fn digest(payload: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(&mut canonical, payload);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 正規化JSON表現を書き出す（オブジェクトキーはソート済み）
fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            // キー順序に依存しないようBTreeMapで辞書順に並べ替える
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (key, val)) in sorted.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                write_canonical(out, val);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        // 文字列・数値・真偽値・nullはserde_jsonの安定表現をそのまま使う
        scalar => out.push_str(&serde_json::to_string(scalar).unwrap_or_default()),
    }
}
