use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

use serde::{Deserialize, Deserializer};

use crate::{
  block::Block,
  costume::{Costume, Sound},
  error::LoadError,
  schema::Schemas,
  store::Store,
  target::{EntityState, RotationStyle},
  value::Value,
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
  pub stage_width: u32,
  pub stage_height: u32,
  pub frame_rate: u32,
  /// Most clones alive at once.
  pub clone_limit: usize,
  /// Iterations an unbounded loop may run before it must yield.
  pub loop_guard: u32,
  pub max_call_depth: usize,
  /// Deepest block nesting the strict compiler accepts.
  pub max_depth: usize,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      stage_width: 480,
      stage_height: 360,
      frame_rate: 30,
      clone_limit: 300,
      loop_guard: 1000,
      max_call_depth: 1024,
      max_depth: 512,
    }
  }
}

impl Config {
  pub fn load(path: impl AsRef<Path>) -> Result<Config, LoadError> {
    Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
  }
}

/// The project document handed over by the loader.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectData {
  pub targets: Vec<TargetData>,
  #[serde(default)]
  pub schemas: Schemas,
}

impl ProjectData {
  pub fn load(path: impl AsRef<Path>) -> Result<ProjectData, LoadError> {
    Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
  }

  pub fn parse(json: &str) -> Result<ProjectData, LoadError> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn stage(&self) -> Result<&TargetData, LoadError> {
    let mut stages = self.targets.iter().filter(|target| target.is_stage);
    let stage = stages.next().ok_or(LoadError::NoStage)?;
    if stages.next().is_some() {
      return Err(LoadError::DuplicateStage);
    }
    Ok(stage)
  }

  /// Targets in layer order, stage first.
  pub fn layered(&self) -> Vec<&TargetData> {
    let mut targets: Vec<&TargetData> = self.targets.iter().collect();
    targets.sort_by_key(|target| (!target.is_stage, target.layer_order));
    targets
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetData {
  #[serde(default)]
  pub is_stage: bool,
  pub name: String,
  #[serde(default)]
  pub variables: HashMap<String, Variable>,
  #[serde(default)]
  pub lists: HashMap<String, List>,
  #[serde(default)]
  pub scripts: Vec<Vec<Block>>,
  #[serde(default)]
  pub current_costume: usize,
  #[serde(default)]
  pub costumes: Vec<Costume>,
  #[serde(default)]
  pub sounds: Vec<Sound>,
  #[serde(default)]
  pub layer_order: i32,
  #[serde(default = "default_volume")]
  pub volume: f64,
  #[serde(default = "default_true")]
  pub visible: bool,
  #[serde(default)]
  pub x: f64,
  #[serde(default)]
  pub y: f64,
  #[serde(default = "default_size")]
  pub size: f64,
  #[serde(default = "default_direction")]
  pub direction: f64,
  #[serde(default)]
  pub draggable: bool,
  #[serde(default = "default_rotation_style")]
  pub rotation_style: RotationStyle,
}

fn default_true() -> bool {
  true
}

fn default_size() -> f64 {
  100.
}

fn default_direction() -> f64 {
  90.
}

fn default_volume() -> f64 {
  100.
}

fn default_rotation_style() -> RotationStyle {
  RotationStyle::AllAround
}

impl TargetData {
  pub fn initial_state(&self) -> EntityState {
    let mut state = EntityState {
      visible: self.visible || self.is_stage,
      x: self.x,
      y: self.y,
      size: self.size,
      draggable: self.draggable,
      current_costume: self.current_costume,
      rotation_style: self.rotation_style,
      volume: self.volume,
      ..EntityState::default()
    };
    state.set_direction(self.direction);
    state
  }

  pub fn store(&self) -> Store {
    Store {
      variables: self
        .variables
        .iter()
        .map(|(id, variable)| (id.clone(), variable.value.clone()))
        .collect(),
      lists: self
        .lists
        .iter()
        .map(|(id, list)| (id.clone(), list.value.clone()))
        .collect(),
    }
  }
}

/// `["name", value]` in the document.
#[derive(Debug, Clone)]
pub struct Variable {
  pub name: String,
  pub value: Value,
}

impl<'de> Deserialize<'de> for Variable {
  fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
    let (name, value) = Deserialize::deserialize(de)?;
    Ok(Self { name, value })
  }
}

/// `["name", [items...]]` in the document.
#[derive(Debug, Clone)]
pub struct List {
  pub name: String,
  pub value: Vec<Value>,
}

impl<'de> Deserialize<'de> for List {
  fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
    let (name, value) = Deserialize::deserialize(de)?;
    Ok(Self { name, value })
  }
}
