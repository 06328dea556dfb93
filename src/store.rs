use std::collections::HashMap;

use crate::{primitives::random_between, value::Value};

/// Variables and lists keyed by their stable id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Store {
  pub variables: HashMap<String, Value>,
  pub lists: HashMap<String, Vec<Value>>,
}

/// A resolved list position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ListIndex {
  At(usize),
  All,
  Invalid,
}

impl ListIndex {
  /// Resolves a 1-based index value against a list of `len` items. `last`,
  /// `random`/`any` and `all` are accepted. `extra` widens the valid range,
  /// for insertion past the end.
  pub fn resolve(index: &Value, len: usize, extra: usize) -> ListIndex {
    let bound = len + extra;
    if let Value::String(string) = index {
      match string.as_str() {
        "all" => return ListIndex::All,
        "last" => {
          return if bound == 0 {
            ListIndex::Invalid
          } else {
            ListIndex::At(bound - 1)
          }
        }
        "random" | "any" => {
          return if bound == 0 {
            ListIndex::Invalid
          } else {
            ListIndex::At(random_between(0., (bound - 1) as f64, true) as usize)
          }
        }
        _ => {}
      }
    }
    let index = index.to_f64().floor();
    if index < 1. || index > bound as f64 {
      ListIndex::Invalid
    } else {
      ListIndex::At(index as usize - 1)
    }
  }
}

impl Store {
  pub fn has_variable(&self, id: &str) -> bool {
    self.variables.contains_key(id)
  }

  pub fn has_list(&self, id: &str) -> bool {
    self.lists.contains_key(id)
  }

  pub fn add(&mut self, id: &str, item: Value) {
    self.lists.entry(id.to_string()).or_default().push(item);
  }

  pub fn delete(&mut self, id: &str, index: &Value) {
    let Some(list) = self.lists.get_mut(id) else {
      return;
    };
    match ListIndex::resolve(index, list.len(), 0) {
      ListIndex::All => list.clear(),
      ListIndex::At(index) => {
        list.remove(index);
      }
      ListIndex::Invalid => {}
    }
  }

  pub fn insert(&mut self, id: &str, index: &Value, item: Value) {
    let list = self.lists.entry(id.to_string()).or_default();
    if let ListIndex::At(index) = ListIndex::resolve(index, list.len(), 1) {
      list.insert(index, item);
    }
  }

  pub fn replace(&mut self, id: &str, index: &Value, item: Value) {
    let Some(list) = self.lists.get_mut(id) else {
      return;
    };
    if let ListIndex::At(index) = ListIndex::resolve(index, list.len(), 0) {
      list[index] = item;
    }
  }

  pub fn item(&self, id: &str, index: &Value) -> Value {
    let Some(list) = self.lists.get(id) else {
      return Value::from("");
    };
    match ListIndex::resolve(index, list.len(), 0) {
      ListIndex::At(index) => list[index].clone(),
      _ => Value::from(""),
    }
  }

  pub fn item_number(&self, id: &str, item: &Value) -> Value {
    let position = self.lists.get(id).and_then(|list| {
      list.iter().position(|candidate| candidate.compare(item) == 0.)
    });
    Value::Number(position.map(|index| index as f64 + 1.).unwrap_or(0.))
  }

  pub fn contains(&self, id: &str, item: &Value) -> bool {
    self.lists.get(id).map_or(false, |list| {
      list.iter().any(|candidate| candidate.compare(item) == 0.)
    })
  }

  pub fn length(&self, id: &str) -> usize {
    self.lists.get(id).map_or(0, Vec::len)
  }

  /// Items joined the way a list reporter shows them: without separators
  /// when every item is a single character.
  pub fn contents(&self, id: &str) -> String {
    let Some(list) = self.lists.get(id) else {
      return String::new();
    };
    let items: Vec<String> = list.iter().map(Value::to_string).collect();
    let separator = if items.iter().all(|item| item.chars().count() == 1) {
      ""
    } else {
      " "
    };
    items.join(separator)
  }
}
