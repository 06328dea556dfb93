use std::{collections::BTreeMap, f64::consts::PI, fmt, sync::Arc};

use serde::Deserialize;

use crate::{costume::Sprite, pen::PenState, store::Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// A renderable actor: a primary target or one of its clones.
#[derive(Debug)]
pub struct Entity {
  pub id: EntityId,
  /// The primary this entity was cloned from, or its own id.
  pub primary: EntityId,
  pub sprite: Arc<Sprite>,
  pub state: EntityState,
  pub locals: Store,
}

impl Entity {
  pub fn is_clone(&self) -> bool {
    self.id != self.primary
  }

  pub fn is_stage(&self) -> bool {
    self.sprite.is_stage
  }

  pub fn name(&self) -> &str {
    &self.sprite.name
  }

  pub fn snapshot(&self) -> Snapshot {
    Snapshot {
      state: self.state.clone(),
      locals: self.locals.clone(),
    }
  }

  pub fn restore(&mut self, snapshot: &Snapshot) {
    self.state = snapshot.state.clone();
    self.locals = snapshot.locals.clone();
  }
}

/// Initial state of a primary, restored on stop.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
  pub state: EntityState,
  pub locals: Store,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
  pub visible: bool,
  pub x: f64,
  pub y: f64,
  pub size: f64,
  pub direction: f64,
  pub draggable: bool,
  pub current_costume: usize,
  pub rotation_style: RotationStyle,
  pub volume: f64,
  pub effects: BTreeMap<String, f64>,
  pub pen: PenState,
  pub say: Option<Say>,
}

impl Default for EntityState {
  fn default() -> Self {
    EntityState {
      visible: true,
      x: 0.,
      y: 0.,
      size: 100.,
      direction: 90.,
      draggable: false,
      current_costume: 0,
      rotation_style: RotationStyle::AllAround,
      volume: 100.,
      effects: BTreeMap::new(),
      pen: PenState::default(),
      say: None,
    }
  }
}

impl EntityState {
  /// Sets the direction, wrapped into (-180, 180].
  pub fn set_direction(&mut self, direction: f64) {
    if !direction.is_finite() {
      return;
    }
    let mut wrapped = (direction + 180.).rem_euclid(360.) - 180.;
    if wrapped == -180. {
      wrapped = 180.;
    }
    self.direction = wrapped;
  }

  /// Unit vector of the current direction, 0 pointing up.
  pub fn heading(&self) -> (f64, f64) {
    let radians = degrees_to_radians(90. - self.direction);
    (radians.cos(), radians.sin())
  }

  pub fn set_effect(&mut self, effect: &str, amount: f64) {
    let amount = match effect {
      "ghost" => amount.clamp(0., 100.),
      "brightness" => amount.clamp(-100., 100.),
      _ => amount,
    };
    self.effects.insert(effect.to_string(), amount);
  }

  pub fn effect(&self, effect: &str) -> f64 {
    self.effects.get(effect).copied().unwrap_or(0.)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RotationStyle {
  #[serde(rename = "all around")]
  AllAround,
  #[serde(rename = "left-right")]
  LeftRight,
  #[serde(rename = "don't rotate")]
  DontRotate,
}

impl RotationStyle {
  pub fn parse(style: &str) -> Option<RotationStyle> {
    match style {
      "all around" => Some(RotationStyle::AllAround),
      "left-right" => Some(RotationStyle::LeftRight),
      "don't rotate" => Some(RotationStyle::DontRotate),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Say {
  pub message: String,
  pub think: bool,
}

pub fn degrees_to_radians(degrees: f64) -> f64 {
  (PI * degrees) / 180.
}

pub fn radians_to_degrees(radians: f64) -> f64 {
  (radians * 180.) / PI
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn direction_wraps() {
    let mut state = EntityState::default();
    state.set_direction(270.);
    assert_eq!(state.direction, -90.);
    state.set_direction(-180.);
    assert_eq!(state.direction, 180.);
    state.set_direction(f64::NAN);
    assert_eq!(state.direction, 180.);
  }

  #[test]
  fn heading_points_along_direction() {
    let state = EntityState::default();
    let (dx, dy) = state.heading();
    assert!((dx - 1.).abs() < 1e-9 && dy.abs() < 1e-9);
  }

  #[test]
  fn ghost_is_clamped() {
    let mut state = EntityState::default();
    state.set_effect("ghost", 150.);
    assert_eq!(state.effect("ghost"), 100.);
    assert_eq!(state.effect("color"), 0.);
  }
}
