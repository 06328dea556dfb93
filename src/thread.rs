//! The compiled form of a script.
//!
//! A [`CompiledThread`] is an immutable tree of [`Op`]s whose expressions
//! are closures over a [`Scope`]. Executors walk it with an explicit frame
//! stack (see `executor`), so the artifact itself never holds run state.

use std::{collections::HashMap, sync::Arc, time::Duration};

use derivative::Derivative;

use crate::{
  block::Block,
  compiler::Compiler,
  error::{Diagnostic, Fault},
  executor::ExecutorId,
  target::{Entity, EntityId, EntityState},
  value::Value,
  world::{GroupId, QuestionId, World},
};

/// Everything compiled code may touch while one executor steps.
pub struct Scope<'a> {
  pub entity: EntityId,
  pub executor: ExecutorId,
  pub now: Duration,
  pub world: &'a mut World,
  pub(crate) args: &'a HashMap<String, Value>,
  pub(crate) temps: &'a [Value],
  pub(crate) groups: &'a [GroupId],
}

impl<'a> Scope<'a> {
  pub fn entity(&self) -> Option<&Entity> {
    self.world.entity(self.entity)
  }

  pub fn state(&self) -> Option<&EntityState> {
    self.entity().map(|entity| &entity.state)
  }

  pub fn state_mut(&mut self) -> Option<&mut EntityState> {
    self.world.entity_mut(self.entity).map(|entity| &mut entity.state)
  }

  pub fn argument(&self, name: &str) -> Value {
    self.args.get(name).cloned().unwrap_or_else(|| Value::from(""))
  }

  pub fn temp(&self, slot: usize) -> Value {
    self.temps.get(slot).cloned().unwrap_or_default()
  }
}

/// A compiled reporter.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct Expr(
  #[derivative(Debug = "ignore")] Arc<dyn Fn(&mut Scope) -> Value + Send + Sync>,
);

impl Expr {
  pub fn new(f: impl Fn(&mut Scope) -> Value + Send + Sync + 'static) -> Self {
    Expr(Arc::new(f))
  }

  pub fn constant(value: Value) -> Self {
    Expr::new(move |_| value.clone())
  }

  pub fn eval(&self, scope: &mut Scope) -> Value {
    (self.0)(scope)
  }
}

/// A compiled statement that runs to completion without suspending.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct Command(
  #[derivative(Debug = "ignore")]
  Arc<dyn Fn(&mut Scope) -> Result<(), Fault> + Send + Sync>,
);

impl Command {
  pub fn new(
    f: impl Fn(&mut Scope) -> Result<(), Fault> + Send + Sync + 'static,
  ) -> Self {
    Command(Arc::new(f))
  }

  pub fn run(&self, scope: &mut Scope) -> Result<(), Fault> {
    (self.0)(scope)
  }
}

/// A statement body: compiled ops, or raw blocks lowered as they execute.
#[derive(Debug, Clone)]
pub enum Code {
  Ops(Arc<[Op]>),
  Blocks(Arc<[Block]>, Arc<Compiler>),
}

impl Code {
  pub fn empty() -> Self {
    Code::Ops(Arc::from(Vec::new()))
  }

  pub fn len(&self) -> usize {
    match self {
      Code::Ops(ops) => ops.len(),
      Code::Blocks(blocks, _) => blocks.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// A loop or wait condition. `prelude` holds hoisted procedure calls that
/// must run before every evaluation of `test`.
#[derive(Debug, Clone)]
pub struct Cond {
  pub prelude: Arc<[Op]>,
  pub test: Expr,
}

#[derive(Debug, Clone)]
pub enum LoopKind {
  Times(Expr),
  Forever,
  Until(Cond),
  While(Cond),
}

#[derive(Debug, Clone)]
pub enum Op {
  Run(Command),
  /// Placeholder for a statement with no compiler rule.
  Noop(Arc<str>),
  If {
    test: Expr,
    then: Code,
    otherwise: Code,
  },
  Loop {
    kind: LoopKind,
    body: Code,
  },
  Wait(Expr),
  SayFor {
    message: Expr,
    secs: Expr,
    think: bool,
  },
  Glide {
    secs: Expr,
    x: Expr,
    y: Expr,
  },
  Call {
    name: Arc<str>,
    args: Vec<Expr>,
    result: Option<usize>,
  },
  Return(Expr),
  BroadcastAndWait(Expr),
  Ask(Expr),
  PlayUntilDone(Expr),
  Stop(Expr),
  DeleteClone,
}

/// How a thread was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  Compiled,
  /// The strict compiler failed; blocks are lowered as they execute.
  TreeWalking,
}

#[derive(Debug)]
pub struct CompiledThread {
  pub owner: String,
  pub mode: Mode,
  pub body: Code,
  /// Temp slots the top-level body needs for hoisted calls.
  pub temps: usize,
  pub diagnostics: Vec<Diagnostic>,
}

impl CompiledThread {
  pub fn is_fallback(&self) -> bool {
    self.mode == Mode::TreeWalking
  }
}

/// What a step asks of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspension {
  /// Resume on the next tick.
  Tick,
  /// Resume once the interval has elapsed.
  Wait(Duration),
  /// Resume once the signal fires.
  External(Signal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
  Answer(QuestionId),
  Group(GroupId),
}
