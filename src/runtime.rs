//! The lifecycle facade a frontend drives: load a project, start and stop
//! it, feed it input, tick it once per frame and hand frames to a renderer.

use std::{
  collections::{HashMap, HashSet},
  sync::Arc,
  time::Duration,
};

use log::{info, warn};

use crate::{
  cache::CompileCache,
  compiler::Compiler,
  costume::Sprite,
  error::{Diagnostic, LoadError},
  event::{EventKey, Program, ScriptSource},
  host::{Audio, EntityView, Frame, InputState, Renderer, VisualHandle},
  project::{Config, ProjectData},
  scheduler::{Scheduler, TickReport},
  target::{Entity, EntityId},
  world::{Spawn, SpawnTarget, World},
};

/// Run time with paused stretches left out.
#[derive(Debug, Default, Clone, Copy)]
struct Clock {
  elapsed: Duration,
  last: Option<Duration>,
}

impl Clock {
  fn advance(&mut self, now: Duration) -> Duration {
    if let Some(last) = self.last {
      self.elapsed += now.saturating_sub(last);
    }
    self.last = Some(now);
    self.elapsed
  }

  fn hold(&mut self, now: Duration) {
    self.last = Some(now);
  }
}

#[derive(Debug)]
pub struct Runtime {
  config: Config,
  world: World,
  scheduler: Scheduler,
  cache: Arc<CompileCache>,
  sources: Vec<ScriptSource>,
  program: Program,
  visuals: HashMap<String, VisualHandle>,
  diagnostics: Vec<Diagnostic>,
  clock: Clock,
  loaded: bool,
  paused: bool,
}

impl Default for Runtime {
  fn default() -> Self {
    Runtime::new(Config::default())
  }
}

impl Runtime {
  pub fn new(config: Config) -> Self {
    Runtime::with_cache(config, Arc::new(CompileCache::new()))
  }

  /// Shares a cache with other holders. Loading a project empties it.
  pub fn with_cache(config: Config, cache: Arc<CompileCache>) -> Self {
    Runtime {
      world: World::new(config.clone()),
      config,
      scheduler: Scheduler::new(),
      cache,
      sources: Vec::new(),
      program: Program::default(),
      visuals: HashMap::new(),
      diagnostics: Vec::new(),
      clock: Clock::default(),
      loaded: false,
      paused: false,
    }
  }

  /// Replaces whatever was loaded. Entities are created stage first, then
  /// in layer order; every script is compiled and registered under its hat.
  pub fn load_project(&mut self, project: &ProjectData) -> Result<(), LoadError> {
    let stage = project.stage()?;
    let mut names = HashSet::new();
    for target in &project.targets {
      if !names.insert(target.name.as_str()) {
        return Err(LoadError::DuplicateTarget(target.name.clone()));
      }
    }

    self.scheduler.cancel_all();
    // Schemas and depth limits are baked into compiled threads.
    self.cache.clear();
    let mut world = World::new(self.config.clone());
    world.set_globals(stage.store());
    let schemas = Arc::new(project.schemas.clone());
    let mut sources = Vec::new();
    for target in project.layered() {
      let sprite = Arc::new(Sprite {
        name: target.name.clone(),
        is_stage: target.is_stage,
        costumes: target.costumes.clone(),
        sounds: target.sounds.clone(),
      });
      let locals = if target.is_stage {
        Default::default()
      } else {
        target.store()
      };
      let owner = world.add_primary(sprite, target.initial_state(), locals);
      sources.push(ScriptSource {
        owner,
        compiler: Compiler::new(Arc::clone(&schemas), &target.name, self.config.max_depth),
        scripts: target.scripts.clone(),
      });
    }

    self.program = Program::link(&sources, &self.cache);
    self.diagnostics = self.program.diagnostics().cloned().collect();
    self.sources = sources;
    self.world = world;
    self.visuals.clear();
    self.loaded = true;
    self.paused = false;
    info!(
      "loaded {} targets with {} diagnostics",
      project.targets.len(),
      self.diagnostics.len()
    );
    Ok(())
  }

  /// Resets to the loaded state and fires the start trigger.
  pub fn start(&mut self) -> Result<(), LoadError> {
    if !self.loaded {
      return Err(LoadError::NotLoaded);
    }
    self.scheduler.cancel_all();
    self.world.reset();
    self.world.reset_timer(self.clock.elapsed);
    self.program = Program::link(&self.sources, &self.cache);
    self.paused = false;
    self.fire(EventKey::Start, SpawnTarget::Eligible);
    info!("started {} executors", self.scheduler.len());
    Ok(())
  }

  /// Cancels every executor and returns the project to its loaded state.
  pub fn stop(&mut self) {
    self.scheduler.cancel_all();
    self.world.reset();
    self.cache.clear();
    self.paused = false;
    info!("stopped");
  }

  pub fn toggle_pause(&mut self) {
    if self.loaded {
      self.paused = !self.paused;
      info!("{}", if self.paused { "paused" } else { "resumed" });
    }
  }

  /// Whether any script is live.
  pub fn is_running(&self) -> bool {
    self.loaded && !self.scheduler.is_empty()
  }

  pub fn is_paused(&self) -> bool {
    self.paused
  }

  /// Steps every live executor once. `now` is host time; paused stretches
  /// do not count towards waits, glides or the timer.
  pub fn tick(&mut self, now: Duration) -> TickReport {
    if !self.loaded || self.paused {
      self.clock.hold(now);
      return TickReport::default();
    }
    let now = self.clock.advance(now);
    self.world.take_redraw();
    let report = self.scheduler.tick(&mut self.world, &self.program, now);
    self.diagnostics.extend(self.scheduler.take_diagnostics());
    if report.stop {
      self.stop();
    }
    report
  }

  fn fire(&mut self, key: EventKey, target: SpawnTarget) {
    self.world.spawn(Spawn {
      key,
      target,
      groups: Vec::new(),
    });
    self.scheduler.resolve_spawns(&mut self.world, &self.program);
  }

  pub fn key_pressed(&mut self, key: &str) {
    if !self.loaded {
      return;
    }
    self.fire(EventKey::key(key), SpawnTarget::Eligible);
    self.fire(EventKey::key("any"), SpawnTarget::Eligible);
  }

  pub fn click(&mut self, entity: EntityId) {
    if self.loaded {
      self.fire(EventKey::Clicked, SpawnTarget::Only(entity));
    }
  }

  /// Answers the oldest open question. Returns false when nobody asked.
  pub fn answer(&mut self, text: &str) -> bool {
    self.world.answer(text)
  }

  pub fn set_input(&mut self, input: InputState) {
    self.world.input = input;
  }

  pub fn set_audio(&mut self, audio: Box<dyn Audio>) {
    self.world.set_audio(audio);
  }

  /// Hands every costume to the renderer once, keyed by asset name.
  pub fn load_visuals(&mut self, renderer: &mut dyn Renderer) {
    for entity in self.world.primaries() {
      for costume in &entity.sprite.costumes {
        if self.visuals.contains_key(&costume.md5ext) {
          continue;
        }
        match renderer.load_visual(costume) {
          Ok(handle) => {
            self.visuals.insert(costume.md5ext.clone(), handle);
          }
          Err(error) => warn!("{}: costume {}: {error}", entity.name(), costume.name),
        }
      }
    }
  }

  /// Flushes queued pen output, then presents the entities back to front.
  pub fn render(&mut self, renderer: &mut dyn Renderer) {
    for command in self.world.drain_pen() {
      renderer.pen(&command);
    }
    let entities = self
      .world
      .layered()
      .map(|entity| {
        let costume = entity.sprite.costumes.get(entity.state.current_costume);
        EntityView {
          id: entity.id,
          name: entity.name(),
          is_stage: entity.is_stage(),
          costume,
          visual: costume.and_then(|costume| self.visuals.get(&costume.md5ext).copied()),
          state: &entity.state,
        }
      })
      .collect();
    renderer.present(&Frame {
      stage_width: self.config.stage_width,
      stage_height: self.config.stage_height,
      entities,
      question: self
        .world
        .current_question()
        .map(|question| question.text.as_str()),
    });
  }

  /// Entities back to front.
  pub fn entities(&self) -> impl Iterator<Item = &Entity> {
    self.world.layered()
  }

  pub fn entity_named(&self, name: &str) -> Option<&Entity> {
    self.world.entity(self.world.primary_named(name)?)
  }

  /// Compile diagnostics from loading, then runtime faults as they happen.
  pub fn diagnostics(&self) -> &[Diagnostic] {
    &self.diagnostics
  }

  pub fn executor_count(&self) -> usize {
    self.scheduler.len()
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn world(&self) -> &World {
    &self.world
  }

  pub fn cache(&self) -> &Arc<CompileCache> {
    &self.cache
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::{host::HeadlessRenderer, value::Value};

  fn project(scripts: serde_json::Value) -> ProjectData {
    serde_json::from_value(json!({
      "targets": [
        {"name": "Stage", "isStage": true, "variables": {"score": ["score", 0]}},
        {
          "name": "Cat",
          "layerOrder": 1,
          "costumes": [{"name": "a", "md5ext": "a.svg"}, {"name": "b", "md5ext": "b.svg"}],
          "scripts": scripts
        }
      ]
    }))
    .unwrap()
  }

  fn loaded(scripts: serde_json::Value) -> Runtime {
    let mut runtime = Runtime::default();
    runtime.load_project(&project(scripts)).unwrap();
    runtime
  }

  fn x(runtime: &Runtime) -> f64 {
    runtime.entity_named("Cat").unwrap().state.x
  }

  #[test]
  fn starting_requires_a_project() {
    assert!(matches!(Runtime::default().start(), Err(LoadError::NotLoaded)));
  }

  #[test]
  fn duplicate_names_are_rejected() {
    let project: ProjectData = serde_json::from_value(json!({
      "targets": [{"name": "Stage", "isStage": true}, {"name": "Cat"}, {"name": "Cat"}]
    }))
    .unwrap();
    assert!(matches!(
      Runtime::default().load_project(&project),
      Err(LoadError::DuplicateTarget(name)) if name == "Cat"
    ));
  }

  #[test]
  fn pausing_freezes_the_clock() {
    let mut runtime = loaded(json!([[
      {"type": "event_whenflagclicked"},
      {"type": "control_wait", "params": [1]},
      {"type": "motion_setx", "params": [10]}
    ]]));
    runtime.start().unwrap();
    runtime.tick(Duration::ZERO);
    runtime.toggle_pause();
    runtime.tick(Duration::from_secs(5));
    assert!(runtime.is_paused());
    runtime.toggle_pause();
    runtime.tick(Duration::from_millis(5500));
    assert_eq!(x(&runtime), 0.);
    runtime.tick(Duration::from_millis(6000));
    assert_eq!(x(&runtime), 10.);
    assert!(!runtime.is_running());
  }

  #[test]
  fn stop_all_resets_the_project() {
    let mut runtime = loaded(json!([[
      {"type": "event_whenflagclicked"},
      {"type": "data_setvariableto", "params": ["score", 5]},
      {"type": "motion_setx", "params": [30]},
      {"type": "control_wait", "params": [0]},
      {"type": "control_stop", "params": ["all"]}
    ]]));
    runtime.start().unwrap();
    runtime.tick(Duration::ZERO);
    assert_eq!(x(&runtime), 30.);
    assert_eq!(runtime.world().globals.variables["score"], Value::Number(5.));
    runtime.tick(Duration::from_millis(33));
    assert_eq!(x(&runtime), 0.);
    assert_eq!(runtime.world().globals.variables["score"], Value::Number(0.));
    assert_eq!(runtime.executor_count(), 0);
    assert!(runtime.cache().is_empty());
  }

  #[test]
  fn keys_fire_their_scripts_and_any() {
    let mut runtime = loaded(json!([
      [{"type": "event_whenkeypressed", "params": ["space"]}, {"type": "motion_changexby", "params": [1]}],
      [{"type": "event_whenkeypressed", "params": ["any"]}, {"type": "motion_changexby", "params": [10]}]
    ]));
    runtime.key_pressed("Space");
    assert_eq!(runtime.executor_count(), 2);
    runtime.tick(Duration::ZERO);
    assert_eq!(x(&runtime), 11.);
  }

  #[test]
  fn questions_wait_for_answers() {
    let mut runtime = loaded(json!([[
      {"type": "event_whenflagclicked"},
      {"type": "sensing_askandwait", "params": ["name?"]},
      {"type": "looks_say", "params": [{"type": "sensing_answer"}]}
    ]]));
    runtime.start().unwrap();
    runtime.tick(Duration::ZERO);
    runtime.tick(Duration::from_millis(33));
    assert!(runtime.is_running());
    assert!(runtime.answer("Ada"));
    runtime.tick(Duration::from_millis(66));
    let say = runtime.entity_named("Cat").unwrap().state.say.clone().unwrap();
    assert_eq!(say.message, "Ada");
  }

  #[test]
  fn frames_list_entities_back_to_front() {
    let mut runtime = loaded(json!([[
      {"type": "event_whenflagclicked"},
      {"type": "pen_penDown"},
      {"type": "motion_gotoxy", "params": [20, 20]}
    ]]));
    let mut renderer = HeadlessRenderer::default();
    runtime.load_visuals(&mut renderer);
    runtime.start().unwrap();
    runtime.tick(Duration::ZERO);
    runtime.render(&mut renderer);
    assert_eq!(renderer.frames, 1);
    assert_eq!(renderer.pen_commands, 2);
    let names: Vec<&str> = runtime.entities().map(Entity::name).collect();
    assert_eq!(names, vec!["Stage", "Cat"]);
  }
}
