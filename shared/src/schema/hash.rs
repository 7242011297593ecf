//! FNV-1a digests and the canonical JSON encoding used for schema hashing.
//!
//! Both are specified byte-for-byte so independently generated clients
//! compute identical values.

use std::fmt::Write;

const FNV32_OFFSET: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;
const FNV64_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV64_PRIME: u64 = 0x0000_0100_0000_01b3;

pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV32_OFFSET, |hash, byte| {
        (hash ^ *byte as u32).wrapping_mul(FNV32_PRIME)
    })
}

pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV64_OFFSET, |hash, byte| {
        (hash ^ *byte as u64).wrapping_mul(FNV64_PRIME)
    })
}

/// 32-bit hash of a dot-joined field path.
pub fn path_hash(path: &str) -> u32 {
    fnv1a_32(path.as_bytes())
}

/// 64-bit hash rendered as 16 lowercase hex characters.
pub fn hex_digest(bytes: &[u8]) -> String {
    format!("{:016x}", fnv1a_64(bytes))
}

/// Compact JSON with object keys sorted lexicographically at every level.
///
/// Independent of `serde_json`'s map ordering features.
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        serde_json::Value::String(s) => write_string(s, out),
        other => {
            // null, booleans and numbers have a single compact rendering
            let _ = write!(out, "{}", other);
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    // serde_json's Display for a string value is its escaped JSON literal
    let _ = write!(out, "{}", serde_json::Value::String(s.to_string()));
}
