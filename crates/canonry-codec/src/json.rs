//! JSON decoding and the canonical (stable) serialization.
//!
//! The canonical form is compact JSON with object members sorted by key, so
//! incidental whitespace and key-ordering differences between sources never
//! change a digest.

use canonry_core::document::Document;
use serde_json::Value;

use crate::{Error, Result};

/// Decode a JSON source text into a canonical document.
pub fn decode_json(text: &str) -> Result<Document> {
  let value: Value = serde_json::from_str(text)
    .map_err(|e| Error::Malformed(format!("invalid JSON: {e}")))?;
  Ok(Document::from_value(value)?)
}

/// Serialize `value` as canonical JSON: compact separators, object members
/// sorted by key, nested values canonicalized recursively.
pub fn canonical_json(value: &Value) -> Result<String> {
  let mut out = String::new();
  write_canonical(value, &mut out)?;
  Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<()> {
  match value {
    Value::Object(map) => {
      let mut keys: Vec<&String> = map.keys().collect();
      keys.sort_unstable();

      out.push('{');
      for (i, key) in keys.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        out.push_str(&serde_json::to_string(key)?);
        out.push(':');
        write_canonical(&map[key.as_str()], out)?;
      }
      out.push('}');
    }
    Value::Array(items) => {
      out.push('[');
      for (i, item) in items.iter().enumerate() {
        if i > 0 {
          out.push(',');
        }
        write_canonical(item, out)?;
      }
      out.push(']');
    }
    scalar => out.push_str(&serde_json::to_string(scalar)?),
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn decode_rejects_invalid_json() {
    let err = decode_json("{not json").unwrap_err();
    assert!(matches!(err, Error::Malformed(_)));
  }

  #[test]
  fn decode_rejects_missing_resource_type() {
    let err = decode_json(r#"{"id": "x"}"#).unwrap_err();
    assert!(matches!(err, Error::Core(_)));
  }

  #[test]
  fn canonical_json_sorts_keys_recursively() {
    let v = json!({"b": 1, "a": {"z": true, "m": [null, "x"]}});
    assert_eq!(
      canonical_json(&v).unwrap(),
      r#"{"a":{"m":[null,"x"],"z":true},"b":1}"#
    );
  }

  #[test]
  fn canonical_json_is_whitespace_insensitive() {
    let compact: Value =
      serde_json::from_str(r#"{"resourceType":"ValueSet","id":"v"}"#).unwrap();
    let spaced: Value =
      serde_json::from_str("{ \"id\" : \"v\",\n  \"resourceType\": \"ValueSet\" }")
        .unwrap();
    assert_eq!(
      canonical_json(&compact).unwrap(),
      canonical_json(&spaced).unwrap()
    );
  }

  #[test]
  fn canonical_json_preserves_non_ascii() {
    let v = json!({"name": "Größe"});
    assert_eq!(canonical_json(&v).unwrap(), r#"{"name":"Größe"}"#);
  }
}
