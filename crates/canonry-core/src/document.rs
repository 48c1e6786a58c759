//! The canonical in-memory document representation.
//!
//! Every source encoding (JSON, XML) is decoded into one [`Document`] shape
//! before identity extraction or hashing sees it. A document is a JSON object
//! carrying at least a string `resourceType` member; everything else is
//! encoding-specific payload that Canonry stores but does not interpret.

use serde_json::{Map, Value};

use crate::{Error, Result};

/// Member name carrying the resource type discriminant.
pub const RESOURCE_TYPE: &str = "resourceType";

/// One parsed conformance document, normalised to a JSON object tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
  root: Map<String, Value>,
}

impl Document {
  /// Wrap an already-decoded value.
  ///
  /// Fails with [`Error::MalformedDocument`] unless `value` is an object
  /// with a non-empty string `resourceType` member.
  pub fn from_value(value: Value) -> Result<Self> {
    let Value::Object(root) = value else {
      return Err(Error::MalformedDocument(
        "document payload is not an object".into(),
      ));
    };

    match root.get(RESOURCE_TYPE) {
      Some(Value::String(rt)) if !rt.is_empty() => Ok(Self { root }),
      _ => Err(Error::MalformedDocument(
        "document has no recognizable resource type".into(),
      )),
    }
  }

  /// The resource type discriminant. Guaranteed non-empty by construction.
  pub fn resource_type(&self) -> &str {
    match self.root.get(RESOURCE_TYPE) {
      Some(Value::String(rt)) => rt,
      // unreachable by the `from_value` invariant
      _ => "",
    }
  }

  /// A top-level string member, if present and a string.
  pub fn str_field(&self, name: &str) -> Option<&str> {
    match self.root.get(name) {
      Some(Value::String(s)) => Some(s),
      _ => None,
    }
  }

  /// A string member nested one object deep, e.g. `meta.versionId`.
  pub fn nested_str_field(&self, outer: &str, inner: &str) -> Option<&str> {
    match self.root.get(outer) {
      Some(Value::Object(m)) => match m.get(inner) {
        Some(Value::String(s)) => Some(s),
        _ => None,
      },
      _ => None,
    }
  }

  pub fn root(&self) -> &Map<String, Value> { &self.root }

  pub fn to_value(&self) -> Value { Value::Object(self.root.clone()) }

  pub fn into_value(self) -> Value { Value::Object(self.root) }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn object_with_resource_type_is_accepted() {
    let doc = Document::from_value(json!({
      "resourceType": "ValueSet",
      "id": "vs-1",
    }))
    .unwrap();
    assert_eq!(doc.resource_type(), "ValueSet");
    assert_eq!(doc.str_field("id"), Some("vs-1"));
  }

  #[test]
  fn non_object_is_malformed() {
    let err = Document::from_value(json!([1, 2, 3])).unwrap_err();
    assert!(matches!(err, Error::MalformedDocument(_)));
  }

  #[test]
  fn missing_resource_type_is_malformed() {
    let err = Document::from_value(json!({"id": "x"})).unwrap_err();
    assert!(matches!(err, Error::MalformedDocument(_)));
  }

  #[test]
  fn non_string_fields_read_as_absent() {
    let doc = Document::from_value(json!({
      "resourceType": "CodeSystem",
      "count": 42,
      "meta": {"versionId": "3"},
    }))
    .unwrap();
    assert_eq!(doc.str_field("count"), None);
    assert_eq!(doc.nested_str_field("meta", "versionId"), Some("3"));
    assert_eq!(doc.nested_str_field("meta", "lastUpdated"), None);
  }
}
