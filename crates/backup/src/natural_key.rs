//! Natural-key derivation for persons.
//!
//! A person without a pass number is keyed by the base64 encoding of
//! `first_name + last_name + team`. Two people with the same name in the same
//! group collide on this key. Changing the derivation would orphan every key
//! already stored, so it is kept exactly as the roster tooling produces it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

use store::Row;

/// Base64 (standard alphabet, padded) of the concatenated parts.
pub fn encode_key<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let joined: String = parts.into_iter().collect();
    STANDARD.encode(joined.as_bytes())
}

/// Pass number for a person who was registered without one.
pub fn derive_pass_number(first_name: &str, last_name: &str, team: &str) -> String {
    encode_key([first_name, last_name, team])
}

/// Text form of a row field as it appears in the concatenation; missing and null are empty.
pub(crate) fn field_text(row: &Row, field: &str) -> String {
    match row.get(field) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
