//! Trigger keys, the registry of hat scripts, and the procedures each
//! sprite defines.

use std::{collections::HashMap, sync::Arc};

use log::{debug, info};

use crate::{
  block::{Block, Param},
  cache::CompileCache,
  compiler::{literal, Compiler},
  error::Diagnostic,
  target::EntityId,
  thread::CompiledThread,
  value::Value,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
  Start,
  /// A lowercase key name, or `any`.
  Key(String),
  Clicked,
  /// Message names match case-insensitively.
  Message(String),
  CloneStart,
  Backdrop(String),
}

impl EventKey {
  pub fn message(name: &str) -> EventKey {
    EventKey::Message(name.to_lowercase())
  }

  pub fn key(name: &str) -> EventKey {
    EventKey::Key(name.to_lowercase())
  }

  pub fn backdrop(name: &str) -> EventKey {
    EventKey::Backdrop(name.to_string())
  }

  /// The key a hat block listens for.
  fn of_hat(compiler: &Compiler, hat: &Block) -> Option<EventKey> {
    let schemas = compiler.schemas();
    let text = |name: &str| {
      literal(schemas, hat, name, 0)
        .unwrap_or_else(|| Value::from(""))
        .to_string()
    };
    Some(match hat.opcode.as_str() {
      "event_whenflagclicked" => EventKey::Start,
      "event_whenkeypressed" => EventKey::key(&text("KEY_OPTION")),
      "event_whenthisspriteclicked" | "event_whenstageclicked" => EventKey::Clicked,
      "event_whenbroadcastreceived" => EventKey::message(&text("BROADCAST_OPTION")),
      "event_whenbackdropswitchesto" => EventKey::backdrop(&text("BACKDROP")),
      "control_start_as_clone" => EventKey::CloneStart,
      _ => return None,
    })
  }
}

/// Whether the opcode starts a script rather than running inside one.
pub fn is_hat(opcode: &str) -> bool {
  matches!(
    opcode,
    "event_whenflagclicked"
      | "event_whenkeypressed"
      | "event_whenthisspriteclicked"
      | "event_whenstageclicked"
      | "event_whenbroadcastreceived"
      | "event_whenbackdropswitchesto"
      | "control_start_as_clone"
      | "procedures_definition"
  )
}

/// Identifies one script of one primary across restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptId(pub usize);

#[derive(Debug, Clone)]
pub struct Registration {
  pub script: ScriptId,
  /// The primary that owns the script. Its clones run it too.
  pub owner: EntityId,
  pub thread: Arc<CompiledThread>,
}

#[derive(Debug, Default)]
pub struct EventRegistry {
  scripts: HashMap<EventKey, Vec<Registration>>,
}

impl EventRegistry {
  pub fn register(&mut self, key: EventKey, registration: Registration) {
    self.scripts.entry(key).or_default().push(registration);
  }

  /// Registrations in load order.
  pub fn get(&self, key: &EventKey) -> &[Registration] {
    self.scripts.get(key).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn len(&self) -> usize {
    self.scripts.values().map(Vec::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[derive(Debug)]
pub struct Procedure {
  pub name: String,
  pub params: Vec<String>,
  /// Runs its loops without yielding each iteration.
  pub warp: bool,
  pub thread: Arc<CompiledThread>,
}

/// The scripts of one primary, as loaded.
#[derive(Debug, Clone)]
pub struct ScriptSource {
  pub owner: EntityId,
  pub compiler: Arc<Compiler>,
  pub scripts: Vec<Vec<Block>>,
}

/// Everything the scheduler needs to start and call scripts.
#[derive(Debug, Default)]
pub struct Program {
  pub registry: EventRegistry,
  procedures: HashMap<EntityId, HashMap<String, Arc<Procedure>>>,
}

impl Program {
  /// Compiles every script through the cache and files it under its hat.
  /// Scripts without a hat never run and are skipped.
  pub fn link(sources: &[ScriptSource], cache: &CompileCache) -> Program {
    let mut program = Program::default();
    let mut next_script = 0;
    for source in sources {
      for blocks in &source.scripts {
        let Some(hat) = blocks.first() else {
          continue;
        };
        if hat.opcode == "procedures_definition" {
          program.define(source, hat, cache.get_or_compile(blocks, &source.compiler));
          continue;
        }
        let Some(key) = EventKey::of_hat(&source.compiler, hat) else {
          debug!("{}: skipping a script that starts with {}", source.compiler.owner(), hat.opcode);
          continue;
        };
        let script = ScriptId(next_script);
        next_script += 1;
        program.registry.register(
          key,
          Registration {
            script,
            owner: source.owner,
            thread: cache.get_or_compile(blocks, &source.compiler),
          },
        );
      }
    }
    info!(
      "linked {} scripts and {} procedures",
      program.registry.len(),
      program.procedures.values().map(HashMap::len).sum::<usize>()
    );
    program
  }

  fn define(&mut self, source: &ScriptSource, hat: &Block, thread: Arc<CompiledThread>) {
    let schemas = source.compiler.schemas();
    let name = literal(schemas, hat, "PROCCODE", 0)
      .map(|name| name.to_string())
      .unwrap_or_default();
    if name.is_empty() {
      debug!("{}: skipping an unnamed procedure", source.compiler.owner());
      return;
    }
    let warp = literal(schemas, hat, "WARP", 1).map_or(false, |warp| warp.to_bool());
    let params = hat
      .params
      .iter()
      .skip(2)
      .filter_map(|param| match param {
        Param::Value(value) => Some(value.to_string()),
        Param::Block(_) => None,
      })
      .collect();
    let procedure = Procedure {
      name: name.clone(),
      params,
      warp,
      thread,
    };
    self
      .procedures
      .entry(source.owner)
      .or_default()
      .insert(name, Arc::new(procedure));
  }

  pub fn procedure(&self, owner: EntityId, name: &str) -> Option<&Arc<Procedure>> {
    self.procedures.get(&owner)?.get(name)
  }

  /// Compile diagnostics of every linked thread.
  pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
    let scripts = self
      .registry
      .scripts
      .values()
      .flatten()
      .map(|registration| &registration.thread);
    let procedures = self
      .procedures
      .values()
      .flat_map(HashMap::values)
      .map(|procedure| &procedure.thread);
    scripts
      .chain(procedures)
      .flat_map(|thread| thread.diagnostics.iter())
  }
}
