//! Shared mutable state every executor step reads and writes: entities,
//! variable stores, input, questions, pen output, and the queues the
//! scheduler drains between steps.

use std::{
  collections::{HashMap, HashSet, VecDeque},
  sync::Arc,
  time::Duration,
};

use derivative::Derivative;
use log::{debug, trace};

use crate::{
  costume::Sprite,
  event::EventKey,
  executor::ExecutorId,
  host::{Audio, InputState, SilentAudio},
  pen::{PenCommand, PenInstruction},
  primitives::random_between,
  project::Config,
  store::Store,
  target::{Entity, EntityId, EntityState, Snapshot},
  value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuestionId(pub u64);

/// A request to start the scripts registered for `key`.
#[derive(Debug, Clone, PartialEq)]
pub struct Spawn {
  pub key: EventKey,
  pub target: SpawnTarget,
  /// Broadcast-and-wait groups the new executors join.
  pub groups: Vec<GroupId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnTarget {
  /// Every eligible entity.
  Eligible,
  /// This entity alone.
  Only(EntityId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancel {
  /// Every executor bound to the entity.
  Entity(EntityId),
  /// Every executor bound to the entity except one.
  Others { entity: EntityId, keep: ExecutorId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Question {
  pub id: QuestionId,
  pub entity: EntityId,
  pub text: String,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct World {
  pub config: Config,
  pub globals: Store,
  pub input: InputState,
  pub answer: String,
  entities: HashMap<EntityId, Entity>,
  /// Creation order.
  order: Vec<EntityId>,
  /// Back to front.
  layers: Vec<EntityId>,
  initial_layers: Vec<EntityId>,
  snapshots: HashMap<EntityId, Snapshot>,
  global_defaults: Store,
  next_entity: u32,
  questions: VecDeque<Question>,
  answered: HashSet<QuestionId>,
  next_question: u64,
  next_group: u64,
  spawns: Vec<Spawn>,
  cancellations: Vec<Cancel>,
  stop_requested: bool,
  redraw_requested: bool,
  pen: Vec<PenCommand>,
  timer_origin: Duration,
  #[derivative(Debug = "ignore")]
  audio: Box<dyn Audio>,
}

impl World {
  pub fn new(config: Config) -> Self {
    World {
      config,
      globals: Store::default(),
      input: InputState::default(),
      answer: String::new(),
      entities: HashMap::new(),
      order: Vec::new(),
      layers: Vec::new(),
      initial_layers: Vec::new(),
      snapshots: HashMap::new(),
      global_defaults: Store::default(),
      next_entity: 0,
      questions: VecDeque::new(),
      answered: HashSet::new(),
      next_question: 0,
      next_group: 0,
      spawns: Vec::new(),
      cancellations: Vec::new(),
      stop_requested: false,
      redraw_requested: false,
      pen: Vec::new(),
      timer_origin: Duration::ZERO,
      audio: Box::new(SilentAudio),
    }
  }

  pub fn set_audio(&mut self, audio: Box<dyn Audio>) {
    self.audio = audio;
  }

  pub fn audio(&mut self) -> &mut dyn Audio {
    self.audio.as_mut()
  }

  pub fn set_globals(&mut self, globals: Store) {
    self.global_defaults = globals.clone();
    self.globals = globals;
  }

  /// Adds a primary entity on top of the existing ones and records its
  /// initial snapshot.
  pub fn add_primary(&mut self, sprite: Arc<Sprite>, state: EntityState, locals: Store) -> EntityId {
    let id = self.allocate_id();
    let entity = Entity {
      id,
      primary: id,
      sprite,
      state,
      locals,
    };
    self.snapshots.insert(id, entity.snapshot());
    self.entities.insert(id, entity);
    self.order.push(id);
    self.layers.push(id);
    self.initial_layers = self.layers.clone();
    id
  }

  fn allocate_id(&mut self) -> EntityId {
    let id = EntityId(self.next_entity);
    self.next_entity += 1;
    id
  }

  pub fn entity(&self, id: EntityId) -> Option<&Entity> {
    self.entities.get(&id)
  }

  pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
    self.entities.get_mut(&id)
  }

  /// Entities back to front.
  pub fn layered(&self) -> impl Iterator<Item = &Entity> {
    self.layers.iter().filter_map(|id| self.entities.get(id))
  }

  pub fn entity_count(&self) -> usize {
    self.entities.len()
  }

  pub fn clone_count(&self) -> usize {
    self.entities.values().filter(|entity| entity.is_clone()).count()
  }

  pub fn primaries(&self) -> impl Iterator<Item = &Entity> {
    self
      .order
      .iter()
      .filter_map(|id| self.entities.get(id))
      .filter(|entity| !entity.is_clone())
  }

  /// The primary and its live clones, in creation order.
  pub fn family(&self, primary: EntityId) -> Vec<EntityId> {
    self
      .order
      .iter()
      .filter(|id| {
        self
          .entities
          .get(*id)
          .map_or(false, |entity| entity.primary == primary)
      })
      .copied()
      .collect()
  }

  pub fn primary_named(&self, name: &str) -> Option<EntityId> {
    self
      .primaries()
      .find(|entity| entity.name() == name)
      .map(|entity| entity.id)
  }

  pub fn stage(&self) -> Option<&Entity> {
    self.primaries().find(|entity| entity.is_stage())
  }

  pub fn stage_id(&self) -> Option<EntityId> {
    self.stage().map(|stage| stage.id)
  }

  /// Stage coordinates of the half-width and half-height.
  pub fn bounds(&self) -> (f64, f64) {
    (
      self.config.stage_width as f64 / 2.,
      self.config.stage_height as f64 / 2.,
    )
  }

  pub fn request_redraw(&mut self) {
    self.redraw_requested = true;
  }

  pub fn redraw_requested(&self) -> bool {
    self.redraw_requested
  }

  pub fn take_redraw(&mut self) -> bool {
    std::mem::take(&mut self.redraw_requested)
  }

  /// Moves an entity, drawing a pen line when its pen is down.
  pub fn move_to(&mut self, id: EntityId, x: f64, y: f64) {
    let Some(entity) = self.entities.get_mut(&id) else {
      return;
    };
    let state = &mut entity.state;
    let from = (state.x, state.y);
    state.x = x;
    state.y = y;
    if state.pen.down {
      self
        .pen
        .push(PenCommand::Line(PenInstruction::new(&state.pen, from, (x, y))));
    }
    if state.visible || state.pen.down {
      self.redraw_requested = true;
    }
  }

  pub fn push_pen(&mut self, command: PenCommand) {
    self.pen.push(command);
    self.redraw_requested = true;
  }

  pub fn drain_pen(&mut self) -> Vec<PenCommand> {
    std::mem::take(&mut self.pen)
  }

  /// A position the `goto`-style blocks understand: `_random_`, `_mouse_`
  /// or a sprite name.
  pub fn position_of(&self, target: &str) -> Option<(f64, f64)> {
    match target {
      "_random_" => {
        let (half_width, half_height) = self.bounds();
        Some((
          random_between(-half_width, half_width, true),
          random_between(-half_height, half_height, true),
        ))
      }
      "_mouse_" => Some((self.input.mouse_x, self.input.mouse_y)),
      name => {
        let entity = self.entity(self.primary_named(name)?)?;
        (!entity.is_stage()).then_some((entity.state.x, entity.state.y))
      }
    }
  }

  /// Switches costume by name, else by 1-based number, wrapping around.
  pub fn set_costume(&mut self, id: EntityId, costume: &Value) {
    let Some(entity) = self.entities.get_mut(&id) else {
      return;
    };
    let count = entity.sprite.costumes.len();
    if count == 0 {
      return;
    }
    let by_name = match costume {
      Value::String(name) => entity.sprite.costume_index(name),
      _ => None,
    };
    let index = match by_name {
      Some(index) => index,
      None => match costume {
        Value::String(name) if name.trim().is_empty() => return,
        Value::String(name) if name.trim().parse::<f64>().is_err() => {
          let current = entity.state.current_costume;
          match name.as_str() {
            "next costume" | "next backdrop" => (current + 1) % count,
            "previous costume" | "previous backdrop" => (current + count - 1) % count,
            "random costume" | "random backdrop" if count > 1 => {
              let offset = random_between(1., (count - 1) as f64, true) as usize;
              (current + offset) % count
            }
            _ => return,
          }
        }
        other => {
          let number = other.to_f64().round();
          if !number.is_finite() {
            return;
          }
          (number as i64 - 1).rem_euclid(count as i64) as usize
        }
      },
    };
    entity.state.current_costume = index;
    if entity.state.visible {
      self.redraw_requested = true;
    }
  }

  /// Switches the backdrop and queues the backdrop trigger.
  pub fn switch_backdrop(&mut self, backdrop: &Value, groups: &[GroupId]) {
    let Some(stage) = self.stage_id() else {
      return;
    };
    self.set_costume(stage, backdrop);
    let Some(name) = self.entity(stage).and_then(|stage| {
      stage
        .sprite
        .costumes
        .get(stage.state.current_costume)
        .map(|costume| costume.name.clone())
    }) else {
      return;
    };
    self.spawn(Spawn {
      key: EventKey::backdrop(&name),
      target: SpawnTarget::Eligible,
      groups: groups.to_vec(),
    });
  }

  pub fn go_to_front(&mut self, id: EntityId) {
    if let Some(position) = self.layer_of(id) {
      self.layers.remove(position);
      self.layers.push(id);
      self.redraw_requested = true;
    }
  }

  pub fn go_to_back(&mut self, id: EntityId) {
    if let Some(position) = self.layer_of(id) {
      self.layers.remove(position);
      // The stage always stays at the bottom.
      let floor = usize::from(self.stage_id().is_some());
      self.layers.insert(floor.min(self.layers.len()), id);
      self.redraw_requested = true;
    }
  }

  /// Moves an entity `steps` layers forward (negative for backward).
  pub fn move_layers(&mut self, id: EntityId, steps: i64) {
    let Some(position) = self.layer_of(id) else {
      return;
    };
    let floor = i64::from(self.stage_id().is_some());
    self.layers.remove(position);
    let target = (position as i64)
      .saturating_add(steps)
      .clamp(floor, self.layers.len() as i64);
    self.layers.insert(target as usize, id);
    self.redraw_requested = true;
  }

  fn layer_of(&self, id: EntityId) -> Option<usize> {
    match self.entities.get(&id) {
      Some(entity) if !entity.is_stage() => self.layers.iter().position(|layer| *layer == id),
      _ => None,
    }
  }

  /// Reads a variable from the entity's locals, else the globals.
  pub fn variable(&self, id: EntityId, variable: &str) -> Value {
    self
      .entities
      .get(&id)
      .and_then(|entity| entity.locals.variables.get(variable))
      .or_else(|| self.globals.variables.get(variable))
      .cloned()
      .unwrap_or_default()
  }

  pub fn set_variable(&mut self, id: EntityId, variable: &str, value: Value) {
    match self.entities.get_mut(&id) {
      Some(entity) if entity.locals.has_variable(variable) => {
        entity.locals.variables.insert(variable.to_string(), value);
      }
      _ => {
        self.globals.variables.insert(variable.to_string(), value);
      }
    }
  }

  /// The store that holds list `list` for this entity.
  pub fn lists(&self, id: EntityId, list: &str) -> &Store {
    match self.entities.get(&id) {
      Some(entity) if entity.locals.has_list(list) => &entity.locals,
      _ => &self.globals,
    }
  }

  pub fn lists_mut(&mut self, id: EntityId, list: &str) -> &mut Store {
    match self.entities.get_mut(&id) {
      Some(entity) if entity.locals.has_list(list) => &mut entity.locals,
      _ => &mut self.globals,
    }
  }

  pub fn new_group(&mut self) -> GroupId {
    self.next_group += 1;
    GroupId(self.next_group)
  }

  pub fn spawn(&mut self, spawn: Spawn) {
    debug!("queued {:?} for {:?}", spawn.key, spawn.target);
    self.spawns.push(spawn);
  }

  pub fn broadcast(&mut self, message: &str, groups: &[GroupId]) {
    self.spawn(Spawn {
      key: EventKey::message(message),
      target: SpawnTarget::Eligible,
      groups: groups.to_vec(),
    });
  }

  pub fn take_spawns(&mut self) -> Vec<Spawn> {
    std::mem::take(&mut self.spawns)
  }

  pub fn has_pending_spawn(&self, group: GroupId) -> bool {
    self.spawns.iter().any(|spawn| spawn.groups.contains(&group))
  }

  /// Clones the template (`_myself_` means the invoking entity). Refused
  /// silently for the stage and once the clone limit is reached.
  pub fn create_clone(
    &mut self,
    invoker: EntityId,
    template: &str,
    groups: &[GroupId],
  ) -> Option<EntityId> {
    let template = match template {
      "_myself_" => invoker,
      name => self.primary_named(name)?,
    };
    if self.clone_count() >= self.config.clone_limit {
      debug!("clone of {template} refused at the limit of {}", self.config.clone_limit);
      return None;
    }
    let source = self.entities.get(&template)?;
    if source.is_stage() {
      return None;
    }
    let copy = Entity {
      id: EntityId(self.next_entity),
      primary: source.primary,
      sprite: Arc::clone(&source.sprite),
      state: source.state.clone(),
      locals: source.locals.clone(),
    };
    let id = self.allocate_id();
    debug_assert_eq!(id, copy.id);
    self.entities.insert(id, copy);
    self.order.push(id);
    let layer = self.layers.iter().position(|layer| *layer == template).unwrap_or(0);
    self.layers.insert(layer, id);
    self.redraw_requested = true;
    trace!("cloned {template} as {id}");
    self.spawn(Spawn {
      key: EventKey::CloneStart,
      target: SpawnTarget::Only(id),
      groups: groups.to_vec(),
    });
    Some(id)
  }

  /// Removes a clone and cancels its executors. Primaries are kept.
  pub fn delete_clone(&mut self, id: EntityId) -> bool {
    match self.entities.get(&id) {
      Some(entity) if entity.is_clone() => {}
      _ => return false,
    }
    self.entities.remove(&id);
    self.order.retain(|other| *other != id);
    self.layers.retain(|other| *other != id);
    self.cancel(Cancel::Entity(id));
    self.redraw_requested = true;
    true
  }

  pub fn cancel(&mut self, cancel: Cancel) {
    self.cancellations.push(cancel);
  }

  pub fn take_cancellations(&mut self) -> Vec<Cancel> {
    std::mem::take(&mut self.cancellations)
  }

  pub fn request_stop(&mut self) {
    self.stop_requested = true;
  }

  pub fn stop_requested(&self) -> bool {
    self.stop_requested
  }

  pub fn ask(&mut self, entity: EntityId, text: String) -> QuestionId {
    self.next_question += 1;
    let id = QuestionId(self.next_question);
    self.questions.push_back(Question { id, entity, text });
    id
  }

  /// The question waiting for an answer, if any.
  pub fn current_question(&self) -> Option<&Question> {
    self.questions.front()
  }

  /// Answers the current question. Returns false when nobody asked.
  pub fn answer(&mut self, text: &str) -> bool {
    let Some(question) = self.questions.pop_front() else {
      return false;
    };
    self.answer = text.to_string();
    self.answered.insert(question.id);
    true
  }

  pub fn is_answered(&self, question: QuestionId) -> bool {
    self.answered.contains(&question)
  }

  pub fn forget_question(&mut self, question: QuestionId) {
    self.answered.remove(&question);
  }

  pub fn timer(&self, now: Duration) -> f64 {
    now.saturating_sub(self.timer_origin).as_secs_f64()
  }

  pub fn reset_timer(&mut self, now: Duration) {
    self.timer_origin = now;
  }

  /// Back to the loaded state: clones gone, primaries and globals restored,
  /// every queue emptied.
  pub fn reset(&mut self) {
    let clones: Vec<EntityId> = self
      .entities
      .values()
      .filter(|entity| entity.is_clone())
      .map(|entity| entity.id)
      .collect();
    for id in clones {
      self.entities.remove(&id);
    }
    self.order.retain(|id| self.entities.contains_key(id));
    for (id, snapshot) in &self.snapshots {
      if let Some(entity) = self.entities.get_mut(id) {
        entity.restore(snapshot);
      }
    }
    self.layers = self.initial_layers.clone();
    self.globals = self.global_defaults.clone();
    self.answer.clear();
    self.questions.clear();
    self.answered.clear();
    self.spawns.clear();
    self.cancellations.clear();
    self.stop_requested = false;
    self.redraw_requested = true;
    self.audio.stop(None);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{costume::Costume, test_support::sprite};

  fn costume(name: &str) -> Costume {
    Costume {
      name: name.to_string(),
      md5ext: String::new(),
      bitmap_resolution: 1,
      rotation_center_x: 0.,
      rotation_center_y: 0.,
    }
  }

  #[test]
  fn clones_copy_state_and_respect_the_limit() {
    let mut world = World::new(Config {
      clone_limit: 2,
      ..Config::default()
    });
    let cat = world.add_primary(sprite("Cat", false), EntityState::default(), Store::default());
    world.entity_mut(cat).unwrap().state.x = 40.;
    let first = world.create_clone(cat, "_myself_", &[]).unwrap();
    assert_eq!(world.entity(first).unwrap().state.x, 40.);
    assert!(world.create_clone(first, "Cat", &[]).is_some());
    assert_eq!(world.create_clone(cat, "_myself_", &[]), None);
    assert_eq!(world.clone_count(), 2);
    assert_eq!(world.take_spawns().len(), 2);
  }

  #[test]
  fn the_stage_cannot_be_cloned() {
    let mut world = World::new(Config::default());
    let stage = world.add_primary(sprite("Stage", true), EntityState::default(), Store::default());
    assert_eq!(world.create_clone(stage, "_myself_", &[]), None);
  }

  #[test]
  fn reset_restores_snapshots() {
    let mut world = World::new(Config::default());
    let cat = world.add_primary(sprite("Cat", false), EntityState::default(), Store::default());
    world.move_to(cat, 10., 20.);
    world.create_clone(cat, "_myself_", &[]);
    world.set_variable(cat, "score", Value::Number(3.));
    world.reset();
    assert_eq!(world.entity(cat).unwrap().state, EntityState::default());
    assert_eq!(world.clone_count(), 0);
    assert_eq!(world.variable(cat, "score"), Value::default());
  }

  #[test]
  fn costumes_switch_by_name_or_number() {
    let mut world = World::new(Config::default());
    let sprite = Arc::new(Sprite {
      name: "Cat".to_string(),
      is_stage: false,
      costumes: vec![costume("a"), costume("b"), costume("2")],
      sounds: Vec::new(),
    });
    let cat = world.add_primary(sprite, EntityState::default(), Store::default());
    world.set_costume(cat, &Value::from("b"));
    assert_eq!(world.entity(cat).unwrap().state.current_costume, 1);
    world.set_costume(cat, &Value::from("2"));
    assert_eq!(world.entity(cat).unwrap().state.current_costume, 2);
    world.set_costume(cat, &Value::Number(4.));
    assert_eq!(world.entity(cat).unwrap().state.current_costume, 0);
    world.set_costume(cat, &Value::from("next costume"));
    assert_eq!(world.entity(cat).unwrap().state.current_costume, 1);
  }

  #[test]
  fn layer_moves_clamp_between_the_stage_and_the_front() {
    let mut world = World::new(Config::default());
    let stage = world.add_primary(sprite("Stage", true), EntityState::default(), Store::default());
    let cat = world.add_primary(sprite("Cat", false), EntityState::default(), Store::default());
    let dog = world.add_primary(sprite("Dog", false), EntityState::default(), Store::default());
    world.move_layers(cat, i64::MAX);
    assert_eq!(world.layers, vec![stage, dog, cat]);
    world.move_layers(cat, 1e19 as i64);
    assert_eq!(world.layers, vec![stage, dog, cat]);
    world.move_layers(cat, i64::MIN);
    assert_eq!(world.layers, vec![stage, cat, dog]);
  }

  #[test]
  fn locals_shadow_globals() {
    let mut world = World::new(Config::default());
    let mut locals = Store::default();
    locals.variables.insert("speed".to_string(), Value::Number(1.));
    let cat = world.add_primary(sprite("Cat", false), EntityState::default(), locals);
    world.set_variable(cat, "speed", Value::Number(5.));
    world.set_variable(cat, "score", Value::Number(9.));
    assert_eq!(world.entity(cat).unwrap().locals.variables["speed"], Value::Number(5.));
    assert_eq!(world.globals.variables["score"], Value::Number(9.));
  }
}
