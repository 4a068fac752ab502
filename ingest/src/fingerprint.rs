use serde_json::Value;
use sha2::{Digest, Sha256};

/// SHA-256 over the canonical serialization of the payload exactly as it
/// was delivered, before any identifier provisioning or field stripping.
/// Byte-identical re-deliveries therefore always map to the same
/// fingerprint.
pub fn payload_fingerprint(payload: &Value) -> String {
    hex::encode(Sha256::digest(canonical_json(payload).as_bytes()))
}

/// Canonical form: object keys sorted at every nesting level, `", "` and
/// `": "` separators, non-ASCII escaped to `\uXXXX`. This is the
/// `json.dumps(payload, sort_keys=True)` byte format the ledger's
/// existing fingerprints were computed from, so re-deliveries keep
/// matching entries registered before this service took over.
fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // serde_json objects are BTreeMap-backed, so iteration is
            // already sorted by key.
            out.push('{');
            for (i, (key, nested)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_string(key, out);
                out.push_str(": ");
                write_value(nested, out);
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_ascii() && (c as u32) >= 0x20 => out.push(c),
            // Control characters and non-ASCII, including surrogate
            // pairs for characters beyond the BMP.
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{unit:04x}"));
                }
            }
        }
    }
    out.push('"');
}

/// Event identifiers stay unique across re-deliveries of the same payload
/// because of the timestamp component; the fingerprint alone is the
/// deduplication key.
pub fn derive_event_id(fingerprint: &str, unix_seconds: i64) -> String {
    format!("{}-{}", &fingerprint[..16], unix_seconds)
}
