//! Interfaces to the collaborators the core does not own: drawing, audio
//! and input.

use std::{collections::HashSet, time::Duration};

use log::trace;

use crate::{
  costume::{Costume, Sound},
  pen::PenCommand,
  target::{EntityId, EntityState},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VisualHandle(pub u32);

/// One entity as the renderer sees it.
#[derive(Debug)]
pub struct EntityView<'a> {
  pub id: EntityId,
  pub name: &'a str,
  pub is_stage: bool,
  pub costume: Option<&'a Costume>,
  pub visual: Option<VisualHandle>,
  pub state: &'a EntityState,
}

/// What gets presented once per tick: entities back to front.
#[derive(Debug)]
pub struct Frame<'a> {
  pub stage_width: u32,
  pub stage_height: u32,
  pub entities: Vec<EntityView<'a>>,
  pub question: Option<&'a str>,
}

pub trait Renderer {
  fn load_visual(&mut self, costume: &Costume) -> Result<VisualHandle, String>;
  fn pen(&mut self, command: &PenCommand);
  fn present(&mut self, frame: &Frame);
}

pub trait Audio {
  fn play(&mut self, sound: &Sound);
  /// Stops one sound, or every sound when `None`.
  fn stop(&mut self, sound: Option<&Sound>);
  fn set_volume(&mut self, volume: f64);
  fn duration(&self, sound: &Sound) -> Duration {
    sound.duration()
  }
}

/// Audio that plays nothing but still reports durations.
#[derive(Debug, Default)]
pub struct SilentAudio;

impl Audio for SilentAudio {
  fn play(&mut self, sound: &Sound) {
    trace!("play {}", sound.name);
  }

  fn stop(&mut self, _sound: Option<&Sound>) {}

  fn set_volume(&mut self, _volume: f64) {}
}

/// Renderer that draws nothing and counts what it was given.
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
  pub frames: usize,
  pub pen_commands: usize,
  visuals: u32,
}

impl Renderer for HeadlessRenderer {
  fn load_visual(&mut self, _costume: &Costume) -> Result<VisualHandle, String> {
    self.visuals += 1;
    Ok(VisualHandle(self.visuals))
  }

  fn pen(&mut self, _command: &PenCommand) {
    self.pen_commands += 1;
  }

  fn present(&mut self, _frame: &Frame) {
    self.frames += 1;
  }
}

/// Snapshot of user input, replaced wholesale by the frontend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputState {
  pub keys_down: HashSet<String>,
  pub mouse_x: f64,
  pub mouse_y: f64,
  pub mouse_down: bool,
}

impl InputState {
  pub fn is_key_down(&self, key: &str) -> bool {
    if key == "any" {
      !self.keys_down.is_empty()
    } else {
      self.keys_down.contains(&key.to_lowercase())
    }
  }
}
