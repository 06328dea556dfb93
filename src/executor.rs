//! One live run of a compiled thread.
//!
//! The continuation is an explicit stack of frames over the thread's op
//! tree plus a stack of procedure activations. A step pops and pushes
//! frames until an op asks to suspend or the stack empties, so an executor
//! can be parked at any suspension point and resumed on a later tick.

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use log::trace;

use crate::{
  error::Fault,
  event::{Program, Registration, ScriptId},
  primitives::{set_bubble, start_sound},
  target::EntityId,
  thread::{Code, CompiledThread, Cond, Expr, LoopKind, Op, Scope, Signal, Suspension},
  value::Value,
  world::{Cancel, GroupId, QuestionId, World},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutorId(pub u64);

impl fmt::Display for ExecutorId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "executor {}", self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
  Runnable,
  Sleeping(Duration),
  Blocked(Signal),
  Ended,
  Failed,
}

impl ExecutorState {
  pub fn is_terminal(self) -> bool {
    matches!(self, ExecutorState::Ended | ExecutorState::Failed)
  }
}

/// Procedure arguments and hoisted call results of one call.
#[derive(Debug, Default)]
struct Activation {
  args: HashMap<String, Value>,
  temps: Vec<Value>,
  warp: bool,
  /// Caller temp slot that receives the return value.
  result: Option<usize>,
}

#[derive(Debug)]
enum Counter {
  Times(u64),
  Forever,
  Until(Cond),
  While(Cond),
}

#[derive(Debug)]
struct LoopFrame {
  counter: Counter,
  body: Code,
  iterations: u32,
  /// The body is on the stack above this frame.
  in_body: bool,
  /// The condition's prelude has run for the pending check.
  prelude_done: bool,
}

#[derive(Debug)]
enum Frame {
  Block { code: Code, pc: usize },
  Loop(LoopFrame),
  /// Marks where a procedure's frames begin.
  Procedure,
  Glide {
    from: (f64, f64),
    to: (f64, f64),
    start: Duration,
    duration: Duration,
  },
  /// Clears a timed speech bubble unless something replaced it.
  Unsay(String),
  /// Releases an answered question.
  Forget(QuestionId),
}

/// What an executor needs from outside while it steps.
pub struct Context<'a> {
  pub world: &'a mut World,
  pub program: &'a Program,
  pub now: Duration,
}

#[derive(Debug)]
pub struct Executor {
  pub id: ExecutorId,
  pub entity: EntityId,
  pub script: Option<ScriptId>,
  /// Broadcast-and-wait groups this executor belongs to.
  pub groups: Vec<GroupId>,
  pub state: ExecutorState,
  thread: Arc<CompiledThread>,
  frames: Vec<Frame>,
  root: Activation,
  calls: Vec<Activation>,
}

impl Executor {
  pub fn new(
    id: ExecutorId,
    entity: EntityId,
    thread: Arc<CompiledThread>,
    groups: Vec<GroupId>,
  ) -> Self {
    Executor {
      id,
      entity,
      script: None,
      groups,
      state: ExecutorState::Runnable,
      frames: vec![Frame::Block {
        code: thread.body.clone(),
        pc: 0,
      }],
      root: Activation {
        temps: vec![Value::default(); thread.temps],
        ..Activation::default()
      },
      calls: Vec::new(),
      thread,
    }
  }

  pub fn for_registration(
    id: ExecutorId,
    entity: EntityId,
    registration: &Registration,
    groups: Vec<GroupId>,
  ) -> Self {
    let mut executor = Executor::new(id, entity, Arc::clone(&registration.thread), groups);
    executor.script = Some(registration.script);
    executor
  }

  pub fn owner(&self) -> &str {
    &self.thread.owner
  }

  pub fn thread(&self) -> &Arc<CompiledThread> {
    &self.thread
  }

  /// Procedure calls currently in progress.
  pub fn call_depth(&self) -> usize {
    self.calls.len()
  }

  fn activation(&self) -> &Activation {
    self.calls.last().unwrap_or(&self.root)
  }

  fn activation_mut(&mut self) -> &mut Activation {
    match self.calls.last_mut() {
      Some(activation) => activation,
      None => &mut self.root,
    }
  }

  fn warp(&self) -> bool {
    self.activation().warp
  }

  fn eval(&self, cx: &mut Context, expr: &Expr) -> Value {
    let activation = self.activation();
    let mut scope = Scope {
      entity: self.entity,
      executor: self.id,
      now: cx.now,
      world: &mut *cx.world,
      args: &activation.args,
      temps: &activation.temps,
      groups: &self.groups,
    };
    expr.eval(&mut scope)
  }

  fn scoped<T>(&self, cx: &mut Context, f: impl FnOnce(&mut Scope) -> T) -> T {
    let activation = self.activation();
    let mut scope = Scope {
      entity: self.entity,
      executor: self.id,
      now: cx.now,
      world: &mut *cx.world,
      args: &activation.args,
      temps: &activation.temps,
      groups: &self.groups,
    };
    f(&mut scope)
  }

  /// Runs until the next suspension point. `None` means the thread is done.
  pub fn step(&mut self, cx: &mut Context) -> Result<Option<Suspension>, Fault> {
    loop {
      let Some(frame) = self.frames.last_mut() else {
        return Ok(None);
      };
      match frame {
        Frame::Block { code, pc } => {
          if *pc >= code.len() {
            self.frames.pop();
            continue;
          }
          let index = *pc;
          *pc += 1;
          match code {
            Code::Ops(ops) => {
              let ops = Arc::clone(ops);
              if let Some(suspension) = self.execute(cx, &ops[index])? {
                return Ok(Some(suspension));
              }
              if self.frames.is_empty() {
                return Ok(None);
              }
            }
            Code::Blocks(blocks, compiler) => {
              let lowered = compiler.lower_block(&blocks[index]);
              self.frames.push(Frame::Block {
                code: Code::Ops(lowered.into()),
                pc: 0,
              });
            }
          }
        }
        Frame::Loop(_) => {
          if let Some(suspension) = self.advance_loop(cx) {
            return Ok(Some(suspension));
          }
        }
        Frame::Procedure => {
          self.frames.pop();
          self.finish_call(Value::from(""));
        }
        Frame::Glide {
          from,
          to,
          start,
          duration,
        } => {
          let progress = cx.now.saturating_sub(*start).as_secs_f64() / duration.as_secs_f64();
          if progress >= 1. {
            let (x, y) = *to;
            self.frames.pop();
            cx.world.move_to(self.entity, x, y);
            continue;
          }
          let x = from.0 + (to.0 - from.0) * progress;
          let y = from.1 + (to.1 - from.1) * progress;
          cx.world.move_to(self.entity, x, y);
          return Ok(Some(Suspension::Tick));
        }
        Frame::Unsay(message) => {
          let message = std::mem::take(message);
          self.frames.pop();
          if let Some(entity) = cx.world.entity_mut(self.entity) {
            if entity.state.say.as_ref().map_or(false, |say| say.message == message) {
              entity.state.say = None;
              cx.world.request_redraw();
            }
          }
        }
        Frame::Forget(question) => {
          let question = *question;
          self.frames.pop();
          cx.world.forget_question(question);
        }
      }
    }
  }

  /// Checks the loop on top of the stack and either enters its body, leaves
  /// it, or yields between iterations.
  fn advance_loop(&mut self, cx: &mut Context) -> Option<Suspension> {
    let warp = self.warp();
    let guard = cx.world.config.loop_guard;
    let redraw = cx.world.redraw_requested();
    let Some(Frame::Loop(frame)) = self.frames.last_mut() else {
      return None;
    };
    if frame.in_body {
      frame.in_body = false;
      frame.iterations += 1;
      let guarded = frame.iterations >= guard;
      let yields = match frame.counter {
        _ if guarded => true,
        _ if warp => false,
        Counter::Forever => redraw,
        _ => true,
      };
      if guarded {
        frame.iterations = 0;
      }
      if yields {
        return Some(Suspension::Tick);
      }
    }
    let cond = match &mut frame.counter {
      Counter::Times(0) => {
        self.frames.pop();
        return None;
      }
      Counter::Times(remaining) => {
        *remaining -= 1;
        None
      }
      Counter::Forever => None,
      Counter::Until(cond) => Some((cond.clone(), true)),
      Counter::While(cond) => Some((cond.clone(), false)),
    };
    if let Some((cond, until)) = cond {
      if !frame.prelude_done && !cond.prelude.is_empty() {
        frame.prelude_done = true;
        self.frames.push(Frame::Block {
          code: Code::Ops(Arc::clone(&cond.prelude)),
          pc: 0,
        });
        return None;
      }
      frame.prelude_done = false;
      if self.eval(cx, &cond.test).to_bool() == until {
        self.frames.pop();
        return None;
      }
    }
    let Some(Frame::Loop(frame)) = self.frames.last_mut() else {
      return None;
    };
    frame.in_body = true;
    let body = frame.body.clone();
    self.frames.push(Frame::Block { code: body, pc: 0 });
    None
  }

  fn execute(&mut self, cx: &mut Context, op: &Op) -> Result<Option<Suspension>, Fault> {
    match op {
      Op::Run(command) => self.scoped(cx, |scope| command.run(scope))?,
      Op::Noop(opcode) => trace!("{}: skipped {opcode}", self.id),
      Op::If {
        test,
        then,
        otherwise,
      } => {
        let code = if self.eval(cx, test).to_bool() {
          then
        } else {
          otherwise
        };
        if !code.is_empty() {
          self.frames.push(Frame::Block {
            code: code.clone(),
            pc: 0,
          });
        }
      }
      Op::Loop { kind, body } => {
        let counter = match kind {
          LoopKind::Times(times) => {
            let times = self.eval(cx, times).to_f64().round();
            Counter::Times(if times > 0. { times as u64 } else { 0 })
          }
          LoopKind::Forever => Counter::Forever,
          LoopKind::Until(cond) => Counter::Until(cond.clone()),
          LoopKind::While(cond) => Counter::While(cond.clone()),
        };
        self.frames.push(Frame::Loop(LoopFrame {
          counter,
          body: body.clone(),
          iterations: 0,
          in_body: false,
          prelude_done: false,
        }));
      }
      Op::Wait(secs) => {
        let secs = self.eval(cx, secs).to_f64();
        return Ok(Some(Suspension::Wait(seconds(secs))));
      }
      Op::SayFor {
        message,
        secs,
        think,
      } => {
        let message = self.eval(cx, message);
        let secs = self.eval(cx, secs).to_f64();
        self.scoped(cx, |scope| set_bubble(scope, &message, *think))?;
        self.frames.push(Frame::Unsay(message.to_string()));
        return Ok(Some(Suspension::Wait(seconds(secs))));
      }
      Op::Glide { secs, x, y } => {
        let secs = self.eval(cx, secs).to_f64();
        let to = (self.eval(cx, x).to_f64(), self.eval(cx, y).to_f64());
        let entity = cx.world.entity(self.entity).ok_or(Fault::MissingEntity(self.entity))?;
        let from = (entity.state.x, entity.state.y);
        let duration = seconds(secs);
        if duration.is_zero() {
          cx.world.move_to(self.entity, to.0, to.1);
        } else {
          self.frames.push(Frame::Glide {
            from,
            to,
            start: cx.now,
            duration,
          });
          return Ok(Some(Suspension::Tick));
        }
      }
      Op::Call { name, args, result } => self.call(cx, name, args, *result)?,
      Op::Return(value) => {
        let value = self.eval(cx, value);
        if !self.frames.iter().any(|frame| matches!(frame, Frame::Procedure)) {
          self.frames.clear();
          return Ok(None);
        }
        while let Some(frame) = self.frames.pop() {
          if matches!(frame, Frame::Procedure) {
            break;
          }
        }
        self.finish_call(value);
      }
      Op::BroadcastAndWait(message) => {
        let message = self.eval(cx, message).to_string();
        let group = cx.world.new_group();
        let mut groups = self.groups.clone();
        groups.push(group);
        cx.world.broadcast(&message, &groups);
        return Ok(Some(Suspension::External(Signal::Group(group))));
      }
      Op::Ask(question) => {
        let question = self.eval(cx, question).to_string();
        let id = cx.world.ask(self.entity, question);
        self.frames.push(Frame::Forget(id));
        return Ok(Some(Suspension::External(Signal::Answer(id))));
      }
      Op::PlayUntilDone(sound) => {
        let sound = self.eval(cx, sound);
        if let Some(duration) = self.scoped(cx, |scope| start_sound(scope, &sound))? {
          return Ok(Some(Suspension::Wait(duration)));
        }
      }
      Op::Stop(option) => {
        let option = self.eval(cx, option).to_string();
        match option.as_str() {
          "all" => {
            cx.world.request_stop();
            self.frames.clear();
          }
          "this script" => self.frames.clear(),
          "other scripts in sprite" | "other scripts in stage" => cx.world.cancel(Cancel::Others {
            entity: self.entity,
            keep: self.id,
          }),
          other => trace!("{}: ignoring stop option {other:?}", self.id),
        }
      }
      Op::DeleteClone => {
        if cx.world.delete_clone(self.entity) {
          self.frames.clear();
        }
      }
    }
    Ok(None)
  }

  fn call(
    &mut self,
    cx: &mut Context,
    name: &str,
    args: &[Expr],
    result: Option<usize>,
  ) -> Result<(), Fault> {
    let primary = cx
      .world
      .entity(self.entity)
      .ok_or(Fault::MissingEntity(self.entity))?
      .primary;
    let program = cx.program;
    let procedure = program
      .procedure(primary, name)
      .ok_or_else(|| Fault::UnknownProcedure {
        name: name.to_string(),
        owner: self.thread.owner.clone(),
      })?;
    let limit = cx.world.config.max_call_depth;
    if self.calls.len() >= limit {
      return Err(Fault::CallDepthExceeded { limit });
    }
    let values: Vec<Value> = args.iter().map(|arg| self.eval(cx, arg)).collect();
    let mut bound = HashMap::with_capacity(procedure.params.len());
    for (position, param) in procedure.params.iter().enumerate() {
      bound.insert(param.clone(), values.get(position).cloned().unwrap_or_else(|| Value::from("")));
    }
    let activation = Activation {
      args: bound,
      temps: vec![Value::default(); procedure.thread.temps],
      warp: procedure.warp || self.warp(),
      result,
    };
    trace!("{} calls {name:?} at depth {}", self.id, self.calls.len() + 1);
    self.calls.push(activation);
    self.frames.push(Frame::Procedure);
    self.frames.push(Frame::Block {
      code: procedure.thread.body.clone(),
      pc: 0,
    });
    Ok(())
  }

  /// Pops the innermost activation and hands its result to the caller.
  fn finish_call(&mut self, value: Value) {
    let Some(callee) = self.calls.pop() else {
      return;
    };
    if let Some(slot) = callee.result {
      let temps = &mut self.activation_mut().temps;
      if temps.len() <= slot {
        temps.resize(slot + 1, Value::default());
      }
      temps[slot] = value;
    }
  }
}

fn seconds(secs: f64) -> Duration {
  Duration::try_from_secs_f64(secs.max(0.)).unwrap_or(Duration::MAX)
}
