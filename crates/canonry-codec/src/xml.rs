//! XML decoding and generation for the document wire form.
//!
//! The XML rendering follows the conformance-document conventions: the root
//! element is named after the resource type, primitives are carried as
//! `value="..."` attributes, arrays repeat their element, and everything
//! lives in the document namespace.
//!
//! Best-effort, structural codec: primitives decode as strings, element
//! text content (e.g. narrative markup) is ignored, and generated member
//! order is canonical (sorted) rather than schema order.

use std::io::Cursor;

use canonry_core::document::{Document, RESOURCE_TYPE};
use quick_xml::{
  Reader, Writer,
  events::{BytesDecl, BytesEnd, BytesStart, Event},
};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Namespace of the document wire form.
pub const DOC_NS: &str = "http://hl7.org/fhir";

// ─── Decoding ────────────────────────────────────────────────────────────────

/// Decode an XML source text into a canonical document.
pub fn decode_xml(text: &str) -> Result<Document> {
  let value = xml_to_value(text)?;
  Ok(Document::from_value(value)?)
}

/// One partially-built element during parsing.
struct Frame {
  name:       String,
  members:    Map<String, Value>,
  value_attr: Option<String>,
}

impl Frame {
  fn from_start(e: &BytesStart<'_>) -> Result<Self> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

    let mut value_attr = None;
    for attr in e.attributes() {
      let attr = attr.map_err(|e| Error::Xml(e.to_string()))?;
      if attr.key.local_name().as_ref() == b"value" {
        value_attr = Some(
          attr
            .unescape_value()
            .map_err(|e| Error::Xml(e.to_string()))?
            .into_owned(),
        );
      }
    }

    Ok(Self {
      name,
      members: Map::new(),
      value_attr,
    })
  }

  /// Collapse the frame into a value: a primitive when it only carried a
  /// `value` attribute, an object otherwise.
  fn finish(self) -> (String, Value) {
    let value = if self.members.is_empty() {
      match self.value_attr {
        Some(v) => Value::String(v),
        None => Value::Object(Map::new()),
      }
    } else {
      let mut members = self.members;
      if let Some(v) = self.value_attr {
        members.insert("value".into(), Value::String(v));
      }
      Value::Object(members)
    };
    (self.name, value)
  }
}

/// Insert a member, promoting repeated element names to an array.
fn push_member(map: &mut Map<String, Value>, key: String, value: Value) {
  match map.get_mut(&key) {
    Some(Value::Array(items)) => items.push(value),
    Some(existing) => {
      let previous = existing.take();
      *existing = Value::Array(vec![previous, value]);
    }
    None => {
      map.insert(key, value);
    }
  }
}

fn xml_to_value(text: &str) -> Result<Value> {
  let mut reader = Reader::from_str(text);
  reader.config_mut().trim_text(true);

  let mut stack: Vec<Frame> = Vec::new();
  let mut root: Option<Value> = None;

  loop {
    match reader.read_event() {
      Ok(Event::Start(ref e)) => stack.push(Frame::from_start(e)?),
      Ok(Event::Empty(ref e)) => {
        let (name, value) = Frame::from_start(e)?.finish();
        attach(&mut stack, &mut root, name, value)?;
      }
      Ok(Event::End(_)) => {
        let frame = stack
          .pop()
          .ok_or_else(|| Error::Xml("unbalanced end tag".into()))?;
        let (name, value) = frame.finish();
        attach(&mut stack, &mut root, name, value)?;
      }
      Ok(Event::Eof) => break,
      // Narrative/mixed text content and declarations are not part of the
      // canonical representation.
      Ok(_) => {}
      Err(e) => return Err(Error::Xml(e.to_string())),
    }
  }

  root.ok_or_else(|| Error::Xml("no root element".into()))
}

fn attach(
  stack: &mut Vec<Frame>,
  root: &mut Option<Value>,
  name: String,
  value: Value,
) -> Result<()> {
  match stack.last_mut() {
    Some(parent) => {
      push_member(&mut parent.members, name, value);
      Ok(())
    }
    None => {
      // The root element's name is the resource type.
      let Value::Object(mut members) = value else {
        return Err(Error::Xml("root element is a bare primitive".into()));
      };
      members.insert(RESOURCE_TYPE.into(), Value::String(name));
      *root = Some(Value::Object(members));
      Ok(())
    }
  }
}

/// Lift an XML resource container (`{"<TypeName>": {…}}`) into the
/// canonical shape (`{"resourceType": "<TypeName>", …}`). Returns `None`
/// unless the container holds exactly one object member.
pub(crate) fn lift_resource_container(container: &Map<String, Value>) -> Option<Value> {
  if container.len() != 1 {
    return None;
  }
  let (name, inner) = container.iter().next()?;
  let Value::Object(fields) = inner else {
    return None;
  };

  let mut members = fields.clone();
  members.insert(RESOURCE_TYPE.into(), Value::String(name.clone()));
  Some(Value::Object(members))
}

// ─── Generation ──────────────────────────────────────────────────────────────

/// Serialize a document value (an object with `resourceType`) as XML.
pub fn to_xml(value: &Value) -> Result<String> {
  let Value::Object(members) = value else {
    return Err(Error::Malformed("document payload is not an object".into()));
  };
  let Some(Value::String(resource_type)) = members.get(RESOURCE_TYPE) else {
    return Err(Error::Malformed(
      "document has no recognizable resource type".into(),
    ));
  };

  let mut writer = Writer::new(Cursor::new(Vec::new()));
  write_event(
    &mut writer,
    Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
  );

  let mut start = BytesStart::new(resource_type.as_str());
  start.push_attribute(("xmlns", DOC_NS));
  write_event(&mut writer, Event::Start(start));

  for (name, member) in members {
    if name == RESOURCE_TYPE {
      continue;
    }
    write_member(&mut writer, name, member);
  }

  write_event(
    &mut writer,
    Event::End(BytesEnd::new(resource_type.as_str())),
  );

  String::from_utf8(writer.into_inner().into_inner())
    .map_err(|e| Error::Xml(e.to_string()))
}

fn write_member(w: &mut Writer<Cursor<Vec<u8>>>, name: &str, value: &Value) {
  match value {
    Value::Null => {}
    Value::Array(items) => {
      for item in items {
        write_member(w, name, item);
      }
    }
    Value::Object(members) => {
      write_event(w, Event::Start(BytesStart::new(name)));
      for (child, member) in members {
        write_member(w, child, member);
      }
      write_event(w, Event::End(BytesEnd::new(name)));
    }
    scalar => {
      let text = match scalar {
        Value::String(s) => s.clone(),
        other => other.to_string(),
      };
      let mut e = BytesStart::new(name);
      e.push_attribute(("value", text.as_str()));
      write_event(w, Event::Empty(e));
    }
  }
}

// Writing to an in-memory cursor is infallible.
fn write_event(w: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) {
  w.write_event(event).unwrap();
}
