//! Steps every live executor once per tick and turns queued spawns into
//! new executors between passes.

use std::time::Duration;

use log::{debug, trace, warn};

use crate::{
  error::Diagnostic,
  event::{EventKey, Program, Registration},
  executor::{Context, Executor, ExecutorId, ExecutorState},
  target::EntityId,
  thread::{Signal, Suspension},
  world::{Cancel, Spawn, SpawnTarget, World},
};

/// What one pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
  pub stepped: usize,
  /// A script asked to stop everything. The pass was cut short.
  pub stop: bool,
}

#[derive(Debug, Default)]
pub struct Scheduler {
  executors: Vec<Executor>,
  next_id: u64,
  diagnostics: Vec<Diagnostic>,
}

impl Scheduler {
  pub fn new() -> Self {
    Self::default()
  }

  /// One pass over the live set in order. Executors spawned during the pass
  /// are appended after it and first run on the next tick.
  pub fn tick(&mut self, world: &mut World, program: &Program, now: Duration) -> TickReport {
    let mut report = TickReport::default();
    for index in 0..self.executors.len() {
      if !self.is_ready(&self.executors[index], world, now) {
        continue;
      }
      let executor = &mut self.executors[index];
      let mut cx = Context {
        world: &mut *world,
        program,
        now,
      };
      executor.state = match executor.step(&mut cx) {
        Ok(Some(Suspension::Tick)) => ExecutorState::Runnable,
        Ok(Some(Suspension::Wait(duration))) => ExecutorState::Sleeping(now.saturating_add(duration)),
        Ok(Some(Suspension::External(signal))) => ExecutorState::Blocked(signal),
        Ok(None) => {
          trace!("{} finished on {}", executor.id, executor.entity);
          ExecutorState::Ended
        }
        Err(fault) => {
          warn!("{} of {} failed: {fault}", executor.id, executor.owner());
          self.diagnostics.push(Diagnostic {
            owner: executor.owner().to_string(),
            opcode: "runtime".to_string(),
            message: fault.to_string(),
          });
          ExecutorState::Failed
        }
      };
      report.stepped += 1;
      self.apply_cancellations(world);
      if world.stop_requested() {
        report.stop = true;
        return report;
      }
    }
    self.resolve_spawns(world, program);
    report
  }

  fn is_ready(&self, executor: &Executor, world: &World, now: Duration) -> bool {
    match executor.state {
      ExecutorState::Runnable => true,
      ExecutorState::Sleeping(until) => now >= until,
      ExecutorState::Blocked(Signal::Answer(question)) => world.is_answered(question),
      ExecutorState::Blocked(Signal::Group(group)) => {
        !world.has_pending_spawn(group)
          && !self
            .executors
            .iter()
            .any(|other| !other.state.is_terminal() && other.groups.contains(&group))
      }
      ExecutorState::Ended | ExecutorState::Failed => false,
    }
  }

  fn apply_cancellations(&mut self, world: &mut World) {
    for cancel in world.take_cancellations() {
      for executor in &mut self.executors {
        let hit = match cancel {
          Cancel::Entity(entity) => executor.entity == entity,
          Cancel::Others { entity, keep } => executor.entity == entity && executor.id != keep,
        };
        if hit && !executor.state.is_terminal() {
          trace!("cancelled {}", executor.id);
          executor.state = ExecutorState::Ended;
        }
      }
    }
  }

  /// Drops terminal executors, then starts one executor per registered
  /// script and eligible entity for every queued spawn.
  pub fn resolve_spawns(&mut self, world: &mut World, program: &Program) {
    self.executors.retain(|executor| !executor.state.is_terminal());
    for spawn in world.take_spawns() {
      for registration in program.registry.get(&spawn.key) {
        for entity in eligible(world, &spawn, registration.owner) {
          self.start(entity, registration, &spawn);
        }
      }
    }
    self.executors.retain(|executor| !executor.state.is_terminal());
  }

  fn start(&mut self, entity: EntityId, registration: &Registration, spawn: &Spawn) {
    let restarts = matches!(
      spawn.key,
      EventKey::Start | EventKey::Message(_) | EventKey::Backdrop(_) | EventKey::CloneStart
    );
    let mut groups = spawn.groups.clone();
    if let Some(running) = self.executors.iter_mut().find(|executor| {
      !executor.state.is_terminal()
        && executor.entity == entity
        && executor.script == Some(registration.script)
    }) {
      if !restarts {
        trace!("{:?} already running on {entity}", spawn.key);
        return;
      }
      debug!("restarting {} for {:?}", running.id, spawn.key);
      running.state = ExecutorState::Ended;
      // Waiters on the old run now wait on its replacement.
      for group in &running.groups {
        if !groups.contains(group) {
          groups.push(*group);
        }
      }
    }
    self.next_id += 1;
    let id = ExecutorId(self.next_id);
    self.executors.push(Executor::for_registration(id, entity, registration, groups));
  }

  pub fn cancel_all(&mut self) {
    if !self.executors.is_empty() {
      debug!("cancelling {} executors", self.executors.len());
    }
    self.executors.clear();
  }

  /// Live executors.
  pub fn len(&self) -> usize {
    self
      .executors
      .iter()
      .filter(|executor| !executor.state.is_terminal())
      .count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn executors(&self) -> &[Executor] {
    &self.executors
  }

  pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
    std::mem::take(&mut self.diagnostics)
  }
}

/// Entities a registration of `owner` runs on for this spawn.
///
/// Start and clone-start triggers run regardless of visibility; every other
/// trigger skips hidden sprites. The stage always counts as visible.
fn eligible(world: &World, spawn: &Spawn, owner: EntityId) -> Vec<EntityId> {
  let needs_visibility = !matches!(spawn.key, EventKey::Start | EventKey::CloneStart);
  let shown = |id: EntityId| {
    world.entity(id).map_or(false, |entity| {
      !needs_visibility || entity.is_stage() || entity.state.visible
    })
  };
  match spawn.target {
    SpawnTarget::Only(id) => match world.entity(id) {
      Some(entity) if entity.primary == owner && shown(id) => vec![id],
      _ => Vec::new(),
    },
    SpawnTarget::Eligible => match spawn.key {
      EventKey::Start => world.entity(owner).map(|entity| entity.id).into_iter().collect(),
      EventKey::CloneStart => Vec::new(),
      EventKey::Clicked | EventKey::Key(_) | EventKey::Message(_) | EventKey::Backdrop(_) => {
        world.family(owner).into_iter().filter(|id| shown(*id)).collect()
      }
    },
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::{
    block::Block,
    cache::CompileCache,
    compiler::Compiler,
    event::ScriptSource,
    schema::Schemas,
    test_support::TestWorld,
    world::GroupId,
  };

  fn link(world: &TestWorld, scripts: Vec<Vec<Block>>) -> Program {
    Program::link(
      &[ScriptSource {
        owner: world.entity,
        compiler: Compiler::new(Arc::new(Schemas::default()), "Cat", 64),
        scripts,
      }],
      &CompileCache::new(),
    )
  }

  fn fire(world: &mut TestWorld, key: EventKey, target: SpawnTarget) {
    world.world.spawn(Spawn {
      key,
      target,
      groups: Vec::new(),
    });
  }

  #[test]
  fn spawned_executors_wait_for_the_next_tick() {
    let mut world = TestWorld::new();
    let program = link(
      &world,
      vec![vec![
        Block::new("event_whenflagclicked"),
        Block::new("event_broadcast").param("go"),
      ]],
    );
    let mut scheduler = Scheduler::new();
    fire(&mut world, EventKey::Start, SpawnTarget::Eligible);
    scheduler.resolve_spawns(&mut world.world, &program);
    assert_eq!(scheduler.len(), 1);
    let report = scheduler.tick(&mut world.world, &program, Duration::ZERO);
    assert_eq!(report.stepped, 1);
    assert!(scheduler.is_empty());
  }

  #[test]
  fn sleeping_executors_resume_when_due() {
    let mut world = TestWorld::new();
    let program = link(
      &world,
      vec![vec![
        Block::new("event_whenflagclicked"),
        Block::new("control_wait").param(1.),
        Block::new("motion_setx").param(7.),
      ]],
    );
    let mut scheduler = Scheduler::new();
    fire(&mut world, EventKey::Start, SpawnTarget::Eligible);
    scheduler.resolve_spawns(&mut world.world, &program);
    scheduler.tick(&mut world.world, &program, Duration::ZERO);
    let report = scheduler.tick(&mut world.world, &program, Duration::from_millis(500));
    assert_eq!(report.stepped, 0);
    scheduler.tick(&mut world.world, &program, Duration::from_secs(1));
    assert_eq!(world.state().x, 7.);
    assert!(scheduler.is_empty());
  }

  #[test]
  fn messages_restart_and_keys_do_not() {
    let mut world = TestWorld::new();
    let forever = || Block::new("control_forever").body(vec![Block::new("control_wait").param(1.)]);
    let program = link(
      &world,
      vec![
        vec![Block::new("event_whenbroadcastreceived").param("go"), forever()],
        vec![Block::new("event_whenkeypressed").param("space"), forever()],
      ],
    );
    let mut scheduler = Scheduler::new();
    fire(&mut world, EventKey::message("go"), SpawnTarget::Eligible);
    fire(&mut world, EventKey::key("space"), SpawnTarget::Eligible);
    scheduler.resolve_spawns(&mut world.world, &program);
    let first: Vec<ExecutorId> = scheduler.executors().iter().map(|executor| executor.id).collect();
    fire(&mut world, EventKey::message("GO"), SpawnTarget::Eligible);
    fire(&mut world, EventKey::key("space"), SpawnTarget::Eligible);
    scheduler.resolve_spawns(&mut world.world, &program);
    let second: Vec<ExecutorId> = scheduler.executors().iter().map(|executor| executor.id).collect();
    assert_eq!(first, vec![ExecutorId(1), ExecutorId(2)]);
    assert_eq!(second, vec![ExecutorId(2), ExecutorId(3)]);
  }

  #[test]
  fn hidden_entities_ignore_clicks() {
    let mut world = TestWorld::new();
    let program = link(
      &world,
      vec![vec![
        Block::new("event_whenthisspriteclicked"),
        Block::new("motion_setx").param(1.),
      ]],
    );
    let mut scheduler = Scheduler::new();
    let cat = world.entity;
    world.state_mut().visible = false;
    fire(&mut world, EventKey::Clicked, SpawnTarget::Only(cat));
    scheduler.resolve_spawns(&mut world.world, &program);
    assert!(scheduler.is_empty());
    world.state_mut().visible = true;
    fire(&mut world, EventKey::Clicked, SpawnTarget::Only(cat));
    scheduler.resolve_spawns(&mut world.world, &program);
    assert_eq!(scheduler.len(), 1);
  }

  #[test]
  fn hidden_entities_ignore_messages_and_keys_but_still_start() {
    let mut world = TestWorld::new();
    let program = link(
      &world,
      vec![
        vec![Block::new("event_whenbroadcastreceived").param("go"), Block::new("motion_setx").param(1.)],
        vec![Block::new("event_whenkeypressed").param("space"), Block::new("motion_setx").param(2.)],
        vec![Block::new("event_whenflagclicked"), Block::new("motion_setx").param(3.)],
      ],
    );
    let mut scheduler = Scheduler::new();
    world.state_mut().visible = false;
    fire(&mut world, EventKey::message("go"), SpawnTarget::Eligible);
    fire(&mut world, EventKey::key("space"), SpawnTarget::Eligible);
    scheduler.resolve_spawns(&mut world.world, &program);
    assert!(scheduler.is_empty());
    fire(&mut world, EventKey::Start, SpawnTarget::Eligible);
    scheduler.resolve_spawns(&mut world.world, &program);
    assert_eq!(scheduler.len(), 1);
  }

  #[test]
  fn restarted_receivers_keep_their_waiters() {
    let mut world = TestWorld::new();
    let program = link(
      &world,
      vec![vec![
        Block::new("event_whenbroadcastreceived").param("work"),
        Block::new("control_wait").param(1.),
      ]],
    );
    let mut scheduler = Scheduler::new();
    let cat = world.entity;
    world.world.spawn(Spawn {
      key: EventKey::message("work"),
      target: SpawnTarget::Eligible,
      groups: vec![GroupId(7)],
    });
    scheduler.resolve_spawns(&mut world.world, &program);
    fire(&mut world, EventKey::message("work"), SpawnTarget::Only(cat));
    scheduler.resolve_spawns(&mut world.world, &program);
    assert_eq!(scheduler.len(), 1);
    assert_eq!(scheduler.executors()[0].id, ExecutorId(2));
    assert_eq!(scheduler.executors()[0].groups, vec![GroupId(7)]);
  }

  #[test]
  fn group_waiters_outlast_their_receivers() {
    let mut world = TestWorld::new();
    let program = link(
      &world,
      vec![
        vec![
          Block::new("event_whenflagclicked"),
          Block::new("event_broadcastandwait").param("work"),
          Block::new("motion_setx").param(100.),
        ],
        vec![
          Block::new("event_whenbroadcastreceived").param("work"),
          Block::new("control_wait").param(1.),
          Block::new("motion_changeyby").param(1.),
        ],
      ],
    );
    let mut scheduler = Scheduler::new();
    fire(&mut world, EventKey::Start, SpawnTarget::Eligible);
    scheduler.resolve_spawns(&mut world.world, &program);
    scheduler.tick(&mut world.world, &program, Duration::ZERO);
    assert_eq!(scheduler.len(), 2);
    assert_eq!(scheduler.executors()[1].groups, vec![GroupId(1)]);
    scheduler.tick(&mut world.world, &program, Duration::ZERO);
    scheduler.tick(&mut world.world, &program, Duration::from_millis(500));
    assert_eq!(world.state().x, 0.);
    scheduler.tick(&mut world.world, &program, Duration::from_secs(1));
    assert_eq!(world.state().y, 1.);
    scheduler.tick(&mut world.world, &program, Duration::from_secs(1));
    assert_eq!(world.state().x, 100.);
  }

  #[test]
  fn faults_are_recorded() {
    let mut world = TestWorld::new();
    let program = link(
      &world,
      vec![vec![
        Block::new("event_whenflagclicked"),
        Block::new("procedures_call:missing"),
      ]],
    );
    let mut scheduler = Scheduler::new();
    fire(&mut world, EventKey::Start, SpawnTarget::Eligible);
    scheduler.resolve_spawns(&mut world.world, &program);
    scheduler.tick(&mut world.world, &program, Duration::ZERO);
    assert!(scheduler.is_empty());
    let diagnostics = scheduler.take_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].opcode, "runtime");
  }

  #[test]
  fn stop_all_cuts_the_pass_short() {
    let mut world = TestWorld::new();
    let program = link(
      &world,
      vec![
        vec![Block::new("event_whenflagclicked"), Block::new("control_stop").param("all")],
        vec![Block::new("event_whenflagclicked"), Block::new("motion_setx").param(5.)],
      ],
    );
    let mut scheduler = Scheduler::new();
    fire(&mut world, EventKey::Start, SpawnTarget::Eligible);
    scheduler.resolve_spawns(&mut world.world, &program);
    let report = scheduler.tick(&mut world.world, &program, Duration::ZERO);
    assert!(report.stop);
    assert_eq!(report.stepped, 1);
    assert_eq!(world.state().x, 0.);
  }

  #[test]
  fn stopping_other_scripts_spares_the_caller() {
    let mut world = TestWorld::new();
    let program = link(
      &world,
      vec![
        vec![
          Block::new("event_whenflagclicked"),
          Block::new("control_forever").body(vec![Block::new("motion_changexby").param(1.)]),
        ],
        vec![
          Block::new("event_whenflagclicked"),
          Block::new("control_stop").param("other scripts in sprite"),
          Block::new("control_wait").param(1.),
        ],
      ],
    );
    let mut scheduler = Scheduler::new();
    fire(&mut world, EventKey::Start, SpawnTarget::Eligible);
    scheduler.resolve_spawns(&mut world.world, &program);
    scheduler.tick(&mut world.world, &program, Duration::ZERO);
    assert_eq!(scheduler.len(), 1);
    assert_eq!(scheduler.executors()[0].id, ExecutorId(2));
    assert_eq!(world.state().x, 1.);
  }
}
