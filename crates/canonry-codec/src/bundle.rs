//! Bundle envelopes: splitting one into per-document texts, and assembling
//! a collection from exported documents.
//!
//! Canonry's ingest pipeline consumes individual document texts; these
//! helpers are how a caller turns one enveloping bundle into that stream.
//! Entries carrying a resource are re-serialized in the envelope's own
//! encoding so each document stands alone; malformed resources are kept and
//! surfaced by the pipeline rather than dropped here. Entries with no
//! resource member at all (e.g. request-only entries) carry nothing to
//! ingest and are skipped.

use serde_json::{Value, json};

use crate::{Encoding, Error, Result, decode, xml};

/// Resource type of a bundle envelope.
pub const BUNDLE_TYPE: &str = "Bundle";

/// One entry split out of a bundle.
#[derive(Debug, Clone)]
pub struct BundleEntry {
  /// Origin locator (`fullUrl`) of the entry inside its bundle, if any.
  pub full_url: Option<String>,
  /// The entry's document, re-serialized standalone in the bundle's
  /// encoding.
  pub text:     String,
}

/// The result of splitting a bundle envelope.
#[derive(Debug, Clone)]
pub struct SplitBundle {
  /// The envelope's `type` member, e.g. `"collection"`.
  pub bundle_type: Option<String>,
  pub entries:     Vec<BundleEntry>,
}

/// Split a bundle text into its entries.
///
/// Fails with [`Error::NotABundle`] when the decoded document is not a
/// bundle envelope.
pub fn split(text: &str, encoding: Encoding) -> Result<SplitBundle> {
  let doc = decode(text, encoding)?;
  if doc.resource_type() != BUNDLE_TYPE {
    return Err(Error::NotABundle(doc.resource_type().to_owned()));
  }

  let bundle_type = doc.str_field("type").map(str::to_owned);

  // XML decoding yields a bare object for a single repeated element, an
  // array otherwise; accept both shapes.
  let items: Vec<&Value> = match doc.root().get("entry") {
    Some(Value::Array(items)) => items.iter().collect(),
    Some(single) => vec![single],
    None => Vec::new(),
  };

  let mut entries = Vec::new();
  for item in items {
    let Value::Object(entry) = item else { continue };

    let full_url = match entry.get("fullUrl") {
      Some(Value::String(u)) => Some(u.clone()),
      _ => None,
    };
    let Some(resource) = entry.get("resource") else {
      continue;
    };

    let text = entry_text(resource, encoding)?;
    entries.push(BundleEntry { full_url, text });
  }

  Ok(SplitBundle {
    bundle_type,
    entries,
  })
}

/// Re-serialize one entry resource standalone.
///
/// XML bundles nest the resource inside a container element named after its
/// type; lift it into the canonical shape first so the standalone text
/// decodes like any other document.
fn entry_text(resource: &Value, encoding: Encoding) -> Result<String> {
  match encoding {
    Encoding::Json => Ok(serde_json::to_string(resource)?),
    Encoding::Xml => {
      let lifted = match resource {
        Value::Object(container) => {
          xml::lift_resource_container(container).unwrap_or_else(|| resource.clone())
        }
        other => other.clone(),
      };
      xml::to_xml(&lifted)
    }
  }
}

/// Assemble exported document values into a collection bundle.
pub fn assemble_collection(resources: Vec<Value>) -> Value {
  let entries: Vec<Value> =
    resources.into_iter().map(|r| json!({"resource": r})).collect();
  json!({
    "resourceType": BUNDLE_TYPE,
    "type": "collection",
    "entry": entries,
  })
}
