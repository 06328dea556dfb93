use std::collections::HashMap;

use serde::Deserialize;

/// Symbolic slot name to positional index, for one block type.
pub type Schema = HashMap<String, usize>;

/// Schemas for every block type that declares one. Block types without a
/// schema are read positionally.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Schemas {
  table: HashMap<String, Schema>,
}

impl Schemas {
  pub fn declare(&mut self, opcode: &str, name: &str, index: usize) {
    self
      .table
      .entry(opcode.to_string())
      .or_default()
      .insert(name.to_string(), index);
  }

  /// Index of the `name` slot of `opcode`: the schema's entry when there is
  /// one, else `position`, else 0.
  pub fn resolve_param(
    &self,
    opcode: &str,
    name: &str,
    position: Option<usize>,
  ) -> usize {
    self
      .table
      .get(opcode)
      .and_then(|schema| schema.get(name))
      .copied()
      .or(position)
      .unwrap_or(0)
  }

  pub fn len(&self) -> usize {
    self.table.len()
  }

  pub fn is_empty(&self) -> bool {
    self.table.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn declared_index_wins() {
    let mut schemas = Schemas::default();
    schemas.declare("motion_gotoxy", "X", 1);
    schemas.declare("motion_gotoxy", "Y", 0);
    assert_eq!(schemas.resolve_param("motion_gotoxy", "X", Some(0)), 1);
    assert_eq!(schemas.resolve_param("motion_gotoxy", "Y", Some(1)), 0);
  }

  #[test]
  fn falls_back_to_position_then_zero() {
    let mut schemas = Schemas::default();
    schemas.declare("motion_gotoxy", "X", 1);
    assert_eq!(schemas.resolve_param("motion_gotoxy", "Z", Some(3)), 3);
    assert_eq!(schemas.resolve_param("looks_say", "MESSAGE", Some(0)), 0);
    assert_eq!(schemas.resolve_param("looks_say", "MESSAGE", None), 0);
  }

  #[test]
  fn deserializes_from_project_json() {
    let schemas: Schemas =
      serde_json::from_str(r#"{"control_if": {"CONDITION": 0, "SUBSTACK": 0}}"#)
        .unwrap();
    assert_eq!(schemas.resolve_param("control_if", "SUBSTACK", Some(5)), 0);
    assert_eq!(schemas.len(), 1);
  }
}
