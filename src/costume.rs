use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Costume {
  pub name: String,
  #[serde(default)]
  pub md5ext: String,
  #[serde(default = "default_resolution")]
  pub bitmap_resolution: u32,
  #[serde(default)]
  pub rotation_center_x: f64,
  #[serde(default)]
  pub rotation_center_y: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sound {
  pub name: String,
  #[serde(default)]
  pub md5ext: String,
  #[serde(default)]
  pub sample_count: u64,
  #[serde(default = "default_rate")]
  pub rate: u32,
}

impl Sound {
  pub fn duration(&self) -> Duration {
    Duration::from_secs_f64(self.sample_count as f64 / self.rate.max(1) as f64)
  }
}

fn default_resolution() -> u32 {
  1
}

fn default_rate() -> u32 {
  48000
}

/// Static catalog shared by a sprite and all of its clones.
#[derive(Debug)]
pub struct Sprite {
  pub name: String,
  pub is_stage: bool,
  pub costumes: Vec<Costume>,
  pub sounds: Vec<Sound>,
}

impl Sprite {
  pub fn costume_index(&self, name: &str) -> Option<usize> {
    self.costumes.iter().position(|costume| costume.name == name)
  }

  pub fn sound(&self, name: &str) -> Option<&Sound> {
    self
      .sounds
      .iter()
      .find(|sound| sound.name == name)
      .or_else(|| {
        // Numeric menu values pick by 1-based position.
        let index = name.trim().parse::<f64>().ok()?;
        let count = self.sounds.len() as i64;
        if count == 0 {
          return None;
        }
        let index = (index.round() as i64 - 1).rem_euclid(count);
        self.sounds.get(index as usize)
      })
  }
}
