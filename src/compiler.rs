//! Block trees to [`Op`] trees.
//!
//! Each opcode is parsed once into an [`Opcode`]: a builtin looked up in the
//! primitive tables, a call to a procedure named in the type tag, or a
//! reference to one of the enclosing procedure's arguments. Procedure calls
//! nested inside expressions are hoisted into [`Op::Call`]s that run before
//! the statement and leave their result in a temp slot.
//!
//! The strict pass compiles a whole thread up front and refuses malformed
//! trees. A refused thread keeps its raw blocks and is lowered leniently,
//! one statement at a time, as it executes.

use std::sync::Arc;

use log::{debug, warn};

use crate::{
  block::{Block, Param},
  error::{CompileError, Diagnostic},
  event::is_hat,
  primitives,
  schema::Schemas,
  thread::{Code, CompiledThread, Cond, Expr, LoopKind, Mode, Op},
  value::Value,
};

pub const CALL_PREFIX: &str = "procedures_call:";
pub const ARGUMENT_PREFIX: &str = "argument:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode<'a> {
  Builtin(&'a str),
  Call(&'a str),
  Argument(&'a str),
}

impl<'a> Opcode<'a> {
  pub fn parse(tag: &'a str) -> Opcode<'a> {
    if let Some(name) = tag.strip_prefix(CALL_PREFIX) {
      Opcode::Call(name)
    } else if let Some(name) = tag.strip_prefix(ARGUMENT_PREFIX) {
      Opcode::Argument(name)
    } else {
      Opcode::Builtin(tag)
    }
  }
}

#[derive(Debug)]
pub struct Compiler {
  schemas: Arc<Schemas>,
  owner: String,
  max_depth: usize,
}

impl Compiler {
  pub fn new(schemas: Arc<Schemas>, owner: &str, max_depth: usize) -> Arc<Self> {
    Arc::new(Compiler {
      schemas,
      owner: owner.to_string(),
      max_depth,
    })
  }

  pub fn owner(&self) -> &str {
    &self.owner
  }

  pub fn schemas(&self) -> &Schemas {
    &self.schemas
  }

  /// Compiles a thread, hat block included. Never fails: a thread the
  /// strict pass refuses comes back in tree-walking mode.
  pub fn compile_thread(self: &Arc<Self>, blocks: &[Block]) -> CompiledThread {
    let body = match blocks.first() {
      Some(first) if is_hat(&first.opcode) => &blocks[1..],
      _ => blocks,
    };
    match self.compile_strict(body) {
      Ok((ops, temps, diagnostics)) => CompiledThread {
        owner: self.owner.clone(),
        mode: Mode::Compiled,
        body: Code::Ops(ops.into()),
        temps,
        diagnostics,
      },
      Err(error) => {
        warn!("{}: {error}; running the script by walking its blocks", self.owner);
        CompiledThread {
          owner: self.owner.clone(),
          mode: Mode::TreeWalking,
          body: Code::Blocks(body.into(), Arc::clone(self)),
          temps: 0,
          diagnostics: vec![Diagnostic {
            owner: self.owner.clone(),
            opcode: blocks
              .first()
              .map(|block| block.opcode.clone())
              .unwrap_or_default(),
            message: error.to_string(),
          }],
        }
      }
    }
  }

  /// Compiles a statement list, failing on malformed trees.
  pub fn compile_strict(
    self: &Arc<Self>,
    blocks: &[Block],
  ) -> Result<(Vec<Op>, usize, Vec<Diagnostic>), CompileError> {
    let depth = blocks.iter().map(Block::depth).max().unwrap_or(0);
    if depth > self.max_depth {
      return Err(CompileError::TooDeep {
        depth,
        limit: self.max_depth,
      });
    }
    let mut lowering = Lowering::new(self, true);
    let mut ops = Vec::with_capacity(blocks.len());
    for block in blocks {
      lowering.statement(block, &mut ops)?;
    }
    Ok((ops, lowering.temps, lowering.diagnostics))
  }

  /// Lowers one statement leniently. Statement bodies stay as raw blocks and
  /// are lowered when they run.
  pub fn lower_block(self: &Arc<Self>, block: &Block) -> Vec<Op> {
    let mut lowering = Lowering::new(self, false);
    let mut ops = Vec::new();
    if let Err(error) = lowering.statement(block, &mut ops) {
      debug!("{}: lenient lowering failed: {error}", self.owner);
    }
    ops
  }
}

/// Reads a literal param, for hat blocks and procedure definitions.
pub fn literal(
  schemas: &Schemas,
  block: &Block,
  name: &str,
  position: usize,
) -> Option<Value> {
  let index = schemas.resolve_param(&block.opcode, name, Some(position));
  match block.params.get(index)? {
    Param::Value(value) => Some(value.clone()),
    Param::Block(_) => None,
  }
}

struct Lowering<'c> {
  compiler: &'c Arc<Compiler>,
  strict: bool,
  temps: usize,
  hoisted: Vec<Op>,
  diagnostics: Vec<Diagnostic>,
}

impl<'c> Lowering<'c> {
  fn new(compiler: &'c Arc<Compiler>, strict: bool) -> Self {
    Lowering {
      compiler,
      strict,
      temps: 0,
      hoisted: Vec::new(),
      diagnostics: Vec::new(),
    }
  }

  fn diagnose(&mut self, opcode: &str, message: &str) {
    let diagnostic = Diagnostic {
      owner: self.compiler.owner.clone(),
      opcode: opcode.to_string(),
      message: message.to_string(),
    };
    if self.strict {
      warn!("{diagnostic}");
    } else {
      debug!("{diagnostic}");
    }
    self.diagnostics.push(diagnostic);
  }

  /// Strict mode refuses; lenient mode carries on with `fallback`.
  fn refuse<T>(&mut self, error: CompileError, fallback: T) -> Result<T, CompileError> {
    if self.strict {
      Err(error)
    } else {
      debug!("{}: {error}", self.compiler.owner);
      Ok(fallback)
    }
  }

  fn index(&self, block: &Block, name: &str, position: usize) -> usize {
    self
      .compiler
      .schemas
      .resolve_param(&block.opcode, name, Some(position))
  }

  fn param<'b>(&self, block: &'b Block, name: &str, position: usize) -> Option<&'b Param> {
    block.params.get(self.index(block, name, position))
  }

  fn required<'b>(
    &mut self,
    block: &'b Block,
    name: &str,
    position: usize,
  ) -> Result<Option<&'b Param>, CompileError> {
    match self.param(block, name, position) {
      Some(param) => Ok(Some(param)),
      None => self.refuse(
        CompileError::MissingParam {
          opcode: block.opcode.clone(),
          slot: name.to_string(),
        },
        None,
      ),
    }
  }

  fn input(&mut self, block: &Block, name: &str, position: usize) -> Result<Expr, CompileError> {
    let param = self.param(block, name, position);
    self.expr(param)
  }

  fn body(&mut self, block: &Block, name: &str, position: usize) -> Result<Code, CompileError> {
    let index = self.index(block, name, position);
    match block.statements.get(index) {
      Some(blocks) if self.strict => self.statements(blocks),
      Some(blocks) => Ok(Code::Blocks(blocks.as_slice().into(), Arc::clone(self.compiler))),
      None => self.refuse(
        CompileError::MissingBody {
          opcode: block.opcode.clone(),
          slot: name.to_string(),
        },
        Code::empty(),
      ),
    }
  }

  fn statements(&mut self, blocks: &[Block]) -> Result<Code, CompileError> {
    let mut ops = Vec::with_capacity(blocks.len());
    for block in blocks {
      self.statement(block, &mut ops)?;
    }
    Ok(Code::Ops(ops.into()))
  }

  fn cond(&mut self, param: Option<&Param>) -> Result<Cond, CompileError> {
    let outer = std::mem::take(&mut self.hoisted);
    let test = self.expr(param);
    let prelude = std::mem::replace(&mut self.hoisted, outer);
    Ok(Cond {
      prelude: prelude.into(),
      test: test?,
    })
  }

  /// Compiles one statement into `out`, preceded by the calls hoisted out
  /// of its inputs.
  fn statement(&mut self, block: &Block, out: &mut Vec<Op>) -> Result<(), CompileError> {
    let outer = std::mem::take(&mut self.hoisted);
    let op = self.statement_op(block);
    let hoisted = std::mem::replace(&mut self.hoisted, outer);
    let op = op?;
    out.extend(hoisted);
    out.push(op);
    Ok(())
  }

  fn statement_op(&mut self, block: &Block) -> Result<Op, CompileError> {
    let opcode = match Opcode::parse(&block.opcode) {
      Opcode::Call(name) => return self.call(block, name, None),
      Opcode::Argument(_) => {
        self.diagnose(&block.opcode, "argument reporter used as a statement");
        return Ok(Op::Noop(block.opcode.as_str().into()));
      }
      Opcode::Builtin(opcode) => opcode,
    };
    Ok(match opcode {
      "control_if" => {
        let test = self.required(block, "CONDITION", 0)?;
        Op::If {
          test: self.expr(test)?,
          then: self.body(block, "SUBSTACK", 0)?,
          otherwise: Code::empty(),
        }
      }
      "control_if_else" => {
        let test = self.required(block, "CONDITION", 0)?;
        Op::If {
          test: self.expr(test)?,
          then: self.body(block, "SUBSTACK", 0)?,
          otherwise: self.body(block, "SUBSTACK2", 1)?,
        }
      }
      "control_repeat" => {
        let times = self.required(block, "TIMES", 0)?;
        Op::Loop {
          kind: LoopKind::Times(self.expr(times)?),
          body: self.body(block, "SUBSTACK", 0)?,
        }
      }
      "control_forever" => Op::Loop {
        kind: LoopKind::Forever,
        body: self.body(block, "SUBSTACK", 0)?,
      },
      "control_repeat_until" | "control_while" => {
        let test = self.required(block, "CONDITION", 0)?;
        let cond = self.cond(test)?;
        let body = self.body(block, "SUBSTACK", 0)?;
        let kind = if opcode == "control_while" {
          LoopKind::While(cond)
        } else {
          LoopKind::Until(cond)
        };
        Op::Loop { kind, body }
      }
      "control_wait_until" => {
        let test = self.required(block, "CONDITION", 0)?;
        Op::Loop {
          kind: LoopKind::Until(self.cond(test)?),
          body: Code::empty(),
        }
      }
      "control_wait" => Op::Wait(self.input(block, "DURATION", 0)?),
      "control_stop" => Op::Stop(self.input(block, "STOP_OPTION", 0)?),
      "control_delete_this_clone" => Op::DeleteClone,
      "looks_sayforsecs" | "looks_thinkforsecs" => Op::SayFor {
        message: self.input(block, "MESSAGE", 0)?,
        secs: self.input(block, "SECS", 1)?,
        think: opcode == "looks_thinkforsecs",
      },
      "motion_glidesecstoxy" => Op::Glide {
        secs: self.input(block, "SECS", 0)?,
        x: self.input(block, "X", 1)?,
        y: self.input(block, "Y", 2)?,
      },
      "event_broadcastandwait" => {
        Op::BroadcastAndWait(self.input(block, "BROADCAST_INPUT", 0)?)
      }
      "sensing_askandwait" => Op::Ask(self.input(block, "QUESTION", 0)?),
      "sound_playuntildone" => Op::PlayUntilDone(self.input(block, "SOUND_MENU", 0)?),
      "procedures_return" => Op::Return(self.input(block, "VALUE", 0)?),
      opcode => match primitives::command(opcode) {
        Some(statement) => {
          let args = self.args(block, statement.slots)?;
          Op::Run(primitives::bind_command(statement.run, args))
        }
        None => {
          let message = if is_hat(opcode) {
            "hat block in a statement position"
          } else {
            "no compiler rule for statement"
          };
          self.diagnose(opcode, message);
          Op::Noop(opcode.into())
        }
      },
    })
  }

  fn call(&mut self, block: &Block, name: &str, result: Option<usize>) -> Result<Op, CompileError> {
    if name.is_empty() {
      return self.refuse(
        CompileError::UnnamedProcedure(block.opcode.clone()),
        Op::Noop(block.opcode.as_str().into()),
      );
    }
    let mut args = Vec::with_capacity(block.params.len());
    for param in &block.params {
      args.push(self.expr(Some(param))?);
    }
    Ok(Op::Call {
      name: name.into(),
      args,
      result,
    })
  }

  fn args(&mut self, block: &Block, slots: &[&str]) -> Result<Vec<Expr>, CompileError> {
    slots
      .iter()
      .enumerate()
      .map(|(position, slot)| self.input(block, slot, position))
      .collect()
  }

  fn expr(&mut self, param: Option<&Param>) -> Result<Expr, CompileError> {
    let block = match param {
      None => return Ok(Expr::constant(Value::from(""))),
      Some(Param::Value(value)) => return Ok(Expr::constant(value.clone())),
      Some(Param::Block(block)) => block,
    };
    match Opcode::parse(&block.opcode) {
      Opcode::Argument(name) => {
        let name = name.to_string();
        Ok(Expr::new(move |scope| scope.argument(&name)))
      }
      Opcode::Call(name) => {
        let slot = self.temps;
        self.temps += 1;
        let call = self.call(block, name, Some(slot))?;
        self.hoisted.push(call);
        Ok(Expr::new(move |scope| scope.temp(slot)))
      }
      Opcode::Builtin(opcode) => match primitives::reporter(opcode) {
        Some(reporter) => {
          let args = self.args(block, reporter.slots)?;
          Ok(primitives::bind_reporter(reporter.run, args))
        }
        None => {
          self.diagnose(opcode, "no compiler rule for reporter");
          Ok(Expr::constant(Value::Number(0.)))
        }
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn compiler() -> Arc<Compiler> {
    Compiler::new(Arc::new(Schemas::default()), "Cat", 64)
  }

  #[test]
  fn parses_embedded_identifiers() {
    assert_eq!(Opcode::parse("procedures_call:jump"), Opcode::Call("jump"));
    assert_eq!(Opcode::parse("argument:height"), Opcode::Argument("height"));
    assert_eq!(Opcode::parse("motion_setx"), Opcode::Builtin("motion_setx"));
  }

  #[test]
  fn skips_the_hat_block() {
    let thread = compiler().compile_thread(&[
      Block::new("event_whenflagclicked"),
      Block::new("motion_setx").param(5.),
    ]);
    assert_eq!(thread.mode, Mode::Compiled);
    assert_eq!(thread.body.len(), 1);
  }

  #[test]
  fn unknown_blocks_become_noops_with_diagnostics() {
    let thread = compiler().compile_thread(&[
      Block::new("event_whenflagclicked"),
      Block::new("extension_frobnicate"),
      Block::new("motion_setx").param(Block::new("extension_magic_number")),
    ]);
    assert_eq!(thread.mode, Mode::Compiled);
    match &thread.body {
      Code::Ops(ops) => assert!(matches!(ops[0], Op::Noop(_))),
      other => panic!("expected ops, got {other:?}"),
    }
    assert_eq!(thread.diagnostics.len(), 2);
  }

  #[test]
  fn hoists_calls_out_of_expressions() {
    let (ops, temps, _) = compiler()
      .compile_strict(&[Block::new("motion_setx").param(
        Block::new("operator_add")
          .param(Block::new("procedures_call:left"))
          .param(Block::new("procedures_call:right")),
      )])
      .unwrap();
    assert_eq!(temps, 2);
    assert!(matches!(&ops[0], Op::Call { name, result: Some(0), .. } if &**name == "left"));
    assert!(matches!(&ops[1], Op::Call { name, result: Some(1), .. } if &**name == "right"));
    assert!(matches!(ops[2], Op::Run(_)));
  }

  #[test]
  fn loop_conditions_keep_their_calls_in_a_prelude() {
    let (ops, _, _) = compiler()
      .compile_strict(&[Block::new("control_repeat_until")
        .param(Block::new("procedures_call:done"))
        .body(vec![])])
      .unwrap();
    assert_eq!(ops.len(), 1);
    match &ops[0] {
      Op::Loop {
        kind: LoopKind::Until(cond),
        ..
      } => assert_eq!(cond.prelude.len(), 1),
      other => panic!("expected a loop, got {other:?}"),
    }
  }

  #[test]
  fn malformed_threads_fall_back_to_tree_walking() {
    let thread = compiler().compile_thread(&[
      Block::new("event_whenflagclicked"),
      Block::new("control_repeat").param(3.),
    ]);
    assert_eq!(thread.mode, Mode::TreeWalking);
    assert!(thread.diagnostics[0].message.contains("SUBSTACK"));
    let lowered = compiler().lower_block(&Block::new("control_repeat").param(3.));
    assert!(matches!(lowered[0], Op::Loop { .. }));
  }

  #[test]
  fn deep_trees_are_refused() {
    let mut block = Block::new("motion_setx").param(1.);
    for _ in 0..100 {
      block = Block::new("control_forever").body(vec![block]);
    }
    let thread = compiler().compile_thread(&[block]);
    assert!(thread.is_fallback());
  }

  #[test]
  fn schemas_reorder_slots() {
    let mut schemas = Schemas::default();
    schemas.declare("control_if_else", "SUBSTACK", 1);
    schemas.declare("control_if_else", "SUBSTACK2", 0);
    let compiler = Compiler::new(Arc::new(schemas), "Cat", 64);
    let (ops, _, _) = compiler
      .compile_strict(&[Block::new("control_if_else")
        .param(true)
        .body(vec![])
        .body(vec![Block::new("motion_setx").param(1.)])])
      .unwrap();
    match &ops[0] {
      Op::If { then, otherwise, .. } => {
        assert_eq!(then.len(), 1);
        assert_eq!(otherwise.len(), 0);
      }
      other => panic!("expected an if, got {other:?}"),
    }
  }
}
