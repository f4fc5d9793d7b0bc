//! Event Fingerprinting
//!
//! Deterministic SHA-256 fingerprints for ledger entries. The canonical
//! document is a compact JSON object with sorted keys; absent optional
//! fields are encoded as explicit `null`, never omitted.
//!
//! Changing anything in [`canonical_document`] changes every fingerprint in
//! existing ledgers, so it must come with a bump of [`FINGERPRINT_VERSION`].

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Version of the canonical encoding, committed into every fingerprint
pub const FINGERPRINT_VERSION: u32 = 1;

/// Fields of an entry that contribute to its fingerprint
#[derive(Debug, Clone, Copy)]
pub struct EventFields<'a> {
    pub sequence: i64,
    pub timestamp: &'a str,
    pub actor: &'a str,
    pub role: &'a str,
    pub action: &'a str,
    pub resource: &'a str,
    pub resource_id: Option<&'a str>,
    pub payload_before: Option<&'a str>,
    pub payload_after: Option<&'a str>,
    pub endpoint: &'a str,
    pub method: &'a str,
}

/// Build the canonical JSON document for an entry
pub fn canonical_document(fields: &EventFields<'_>, prev_fingerprint: Option<&str>) -> Value {
    let mut doc = Map::new();
    doc.insert("action".into(), Value::from(fields.action));
    doc.insert("actor".into(), Value::from(fields.actor));
    doc.insert("endpoint".into(), Value::from(fields.endpoint));
    doc.insert("fingerprint_version".into(), Value::from(FINGERPRINT_VERSION));
    doc.insert("method".into(), Value::from(fields.method));
    doc.insert("payload_after".into(), optional(fields.payload_after));
    doc.insert("payload_before".into(), optional(fields.payload_before));
    doc.insert("prev_fingerprint".into(), optional(prev_fingerprint));
    doc.insert("resource".into(), Value::from(fields.resource));
    doc.insert("resource_id".into(), optional(fields.resource_id));
    doc.insert("role".into(), Value::from(fields.role));
    doc.insert("sequence".into(), Value::from(fields.sequence));
    doc.insert("timestamp".into(), Value::from(fields.timestamp));
    Value::Object(doc)
}

/// Canonical bytes that get hashed
pub fn canonical_bytes(fields: &EventFields<'_>, prev_fingerprint: Option<&str>) -> Vec<u8> {
    // Keys were inserted in sorted order and every value is a scalar, so the
    // output is stable with or without serde_json's `preserve_order`.
    canonical_document(fields, prev_fingerprint)
        .to_string()
        .into_bytes()
}

/// Compute the chain fingerprint of an entry as lowercase hex
pub fn fingerprint(fields: &EventFields<'_>, prev_fingerprint: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_bytes(fields, prev_fingerprint));
    hex::encode(hasher.finalize())
}

/// Serialize a payload with object keys sorted at every depth
pub fn canonical_payload(payload: &Value) -> String {
    sort_keys(payload).to_string()
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

fn optional(value: Option<&str>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}
