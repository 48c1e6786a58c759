//! Reference-edge scanning.
//!
//! Walks a document for objects carrying a string-valued `reference` member
//! and records `(path, reference)` pairs. Observational only: the references
//! are stored as found and never resolved against other documents.

use canonry_core::raw::ReferenceEdge;
use serde_json::Value;

/// Member name marking a reference.
const REFERENCE: &str = "reference";

/// Collect every reference edge in `value`, in canonical member order.
pub fn reference_edges(value: &Value) -> Vec<ReferenceEdge> {
  let mut edges = Vec::new();
  walk(value, "", &mut edges);
  edges
}

fn walk(value: &Value, path: &str, edges: &mut Vec<ReferenceEdge>) {
  match value {
    Value::Object(members) => {
      for (key, member) in members {
        if key == REFERENCE {
          if let Value::String(target) = member {
            edges.push(ReferenceEdge {
              from_path:    path.to_owned(),
              to_reference: target.clone(),
            });
            continue;
          }
        }
        let child_path = if path.is_empty() {
          key.clone()
        } else {
          format!("{path}.{key}")
        };
        walk(member, &child_path, edges);
      }
    }
    Value::Array(items) => {
      for (i, item) in items.iter().enumerate() {
        walk(item, &format!("{path}[{i}]"), edges);
      }
    }
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn finds_nested_references_with_paths() {
    let value = json!({
      "resourceType": "PlanDefinition",
      "subject": {"reference": "Group/g1"},
      "action": [
        {"definition": {"reference": "ActivityDefinition/a1"}},
        {"definition": {"reference": "ActivityDefinition/a2"}},
      ],
    });

    let edges = reference_edges(&value);
    assert_eq!(edges, vec![
      ReferenceEdge {
        from_path:    "action[0].definition".into(),
        to_reference: "ActivityDefinition/a1".into(),
      },
      ReferenceEdge {
        from_path:    "action[1].definition".into(),
        to_reference: "ActivityDefinition/a2".into(),
      },
      ReferenceEdge {
        from_path:    "subject".into(),
        to_reference: "Group/g1".into(),
      },
    ]);
  }

  #[test]
  fn non_string_reference_members_are_skipped() {
    let value = json!({"reference": {"reference": "Patient/p1"}});
    let edges = reference_edges(&value);
    // the outer non-string `reference` is recursed into, not recorded
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].from_path, "reference");
    assert_eq!(edges[0].to_reference, "Patient/p1");
  }

  #[test]
  fn no_references_yields_empty() {
    let value = json!({"resourceType": "ValueSet", "id": "v"});
    assert!(reference_edges(&value).is_empty());
  }
}
