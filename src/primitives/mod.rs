//! The closed block vocabulary.
//!
//! Every builtin reporter and every statement that runs without suspending
//! is a plain function over already evaluated arguments. `slots` lists the
//! symbolic names of its inputs in their default positional order; the
//! compiler resolves each through the schema table.

mod data;
mod events;
mod looks;
mod motion;
mod operators;
mod pen;
mod sensing;
mod sound;

use crate::{
  error::Fault,
  target::EntityState,
  thread::{Command, Expr, Scope},
  value::Value,
};

pub use operators::random_between;
pub(crate) use looks::set_bubble;
pub(crate) use sound::start_sound;

pub type ReporterFn = fn(&mut Scope, &[Value]) -> Value;
pub type CommandFn = fn(&mut Scope, &[Value]) -> Result<(), Fault>;

#[derive(Clone, Copy)]
pub struct Reporter {
  pub slots: &'static [&'static str],
  pub run: ReporterFn,
}

impl Reporter {
  pub fn new(slots: &'static [&'static str], run: ReporterFn) -> Self {
    Reporter { slots, run }
  }
}

#[derive(Clone, Copy)]
pub struct Statement {
  pub slots: &'static [&'static str],
  pub run: CommandFn,
}

impl Statement {
  pub fn new(slots: &'static [&'static str], run: CommandFn) -> Self {
    Statement { slots, run }
  }
}

pub fn reporter(opcode: &str) -> Option<Reporter> {
  operators::reporter(opcode)
    .or_else(|| motion::reporter(opcode))
    .or_else(|| looks::reporter(opcode))
    .or_else(|| sound::reporter(opcode))
    .or_else(|| sensing::reporter(opcode))
    .or_else(|| data::reporter(opcode))
}

pub fn command(opcode: &str) -> Option<Statement> {
  motion::command(opcode)
    .or_else(|| looks::command(opcode))
    .or_else(|| sound::command(opcode))
    .or_else(|| sensing::command(opcode))
    .or_else(|| data::command(opcode))
    .or_else(|| events::command(opcode))
    .or_else(|| pen::command(opcode))
}

pub fn bind_reporter(run: ReporterFn, args: Vec<Expr>) -> Expr {
  if args.is_empty() {
    return Expr::new(move |scope| run(scope, &[]));
  }
  Expr::new(move |scope| {
    let values: Vec<Value> = args.iter().map(|arg| arg.eval(scope)).collect();
    run(scope, &values)
  })
}

pub fn bind_command(run: CommandFn, args: Vec<Expr>) -> Command {
  Command::new(move |scope| {
    let values: Vec<Value> = args.iter().map(|arg| arg.eval(scope)).collect();
    run(scope, &values)
  })
}

fn state<'s>(scope: &'s Scope) -> Result<&'s EntityState, Fault> {
  scope.state().ok_or(Fault::MissingEntity(scope.entity))
}

fn state_mut<'s>(scope: &'s mut Scope) -> Result<&'s mut EntityState, Fault> {
  let entity = scope.entity;
  scope.state_mut().ok_or(Fault::MissingEntity(entity))
}

/// Numbers lose float noise below 1e-9, like positions do in the editor.
fn limit_precision(value: f64) -> f64 {
  let rounded = value.round();
  if (value - rounded).abs() < 1e-9_f64 {
    rounded
  } else {
    value
  }
}
