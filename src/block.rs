use std::{
  collections::hash_map::DefaultHasher,
  hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Block {
  #[serde(rename = "type")]
  pub opcode: String,
  #[serde(default)]
  pub params: Vec<Param>,
  #[serde(default)]
  pub statements: Vec<Vec<Block>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Param {
  Block(Box<Block>),
  Value(Value),
}

impl Block {
  pub fn new(opcode: impl Into<String>) -> Self {
    Block {
      opcode: opcode.into(),
      params: Vec::new(),
      statements: Vec::new(),
    }
  }

  pub fn param(mut self, param: impl Into<Param>) -> Self {
    self.params.push(param.into());
    self
  }

  pub fn body(mut self, blocks: Vec<Block>) -> Self {
    self.statements.push(blocks);
    self
  }

  /// Nesting depth of the tree rooted here, counting expression params and
  /// statement bodies alike.
  pub fn depth(&self) -> usize {
    let params = self.params.iter().map(|param| match param {
      Param::Block(block) => block.depth(),
      Param::Value(_) => 0,
    });
    let bodies = self.statements.iter().flatten().map(Block::depth);
    1 + params.chain(bodies).max().unwrap_or(0)
  }
}

impl From<Block> for Param {
  fn from(block: Block) -> Self {
    Param::Block(Box::new(block))
  }
}

impl From<Value> for Param {
  fn from(value: Value) -> Self {
    Param::Value(value)
  }
}

impl From<f64> for Param {
  fn from(value: f64) -> Self {
    Param::Value(Value::Number(value))
  }
}

impl From<&str> for Param {
  fn from(value: &str) -> Self {
    Param::Value(Value::from(value))
  }
}

impl From<bool> for Param {
  fn from(value: bool) -> Self {
    Param::Value(Value::Bool(value))
  }
}

impl Hash for Block {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.opcode.hash(state);
    self.params.hash(state);
    self.statements.hash(state);
  }
}

impl Hash for Param {
  fn hash<H: Hasher>(&self, state: &mut H) {
    match self {
      Param::Block(block) => {
        0u8.hash(state);
        block.hash(state);
      }
      Param::Value(Value::Number(number)) => {
        1u8.hash(state);
        number.to_bits().hash(state);
      }
      Param::Value(Value::String(string)) => {
        2u8.hash(state);
        string.hash(state);
      }
      Param::Value(Value::Bool(bool)) => {
        3u8.hash(state);
        bool.hash(state);
      }
    }
  }
}

/// Structural fingerprint of a thread. Equal trees always share a
/// fingerprint; callers still compare trees on a match.
pub fn fingerprint(blocks: &[Block]) -> u64 {
  let mut hasher = DefaultHasher::new();
  blocks.hash(&mut hasher);
  hasher.finish()
}
