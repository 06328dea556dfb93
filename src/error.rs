use std::fmt;

use thiserror::Error;

use crate::target::EntityId;

/// Failure to read or interpret a project document.
#[derive(Debug, Error)]
pub enum LoadError {
  #[error("could not read project: {0}")]
  Io(#[from] std::io::Error),

  #[error("malformed project document: {0}")]
  Json(#[from] serde_json::Error),

  #[error("project has no stage")]
  NoStage,

  #[error("project has more than one stage")]
  DuplicateStage,

  #[error("two targets are named {0:?}")]
  DuplicateTarget(String),

  #[error("no project is loaded")]
  NotLoaded,
}

/// A thread the strict compiler refused. Such threads run in the fallback
/// tree-walking mode instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
  #[error("{opcode} has no statement body {slot}")]
  MissingBody { opcode: String, slot: String },

  #[error("{opcode} is missing its {slot} input")]
  MissingParam { opcode: String, slot: String },

  #[error("procedure block {0:?} does not name a procedure")]
  UnnamedProcedure(String),

  #[error("blocks nest {depth} deep, deeper than {limit}")]
  TooDeep { depth: usize, limit: usize },
}

/// An uncaught error during an executor step. The executor is discarded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Fault {
  #[error("no procedure named {name:?} on {owner}")]
  UnknownProcedure { name: String, owner: String },

  #[error("procedure calls nested deeper than {limit}")]
  CallDepthExceeded { limit: usize },

  #[error("entity {0} no longer exists")]
  MissingEntity(EntityId),
}

/// Something the compiler or scheduler wants a human to know about.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
  pub owner: String,
  pub opcode: String,
  pub message: String,
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}: {}", self.owner, self.opcode, self.message)
  }
}
