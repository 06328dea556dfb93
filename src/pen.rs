use crate::{
  target::{EntityId, EntityState},
  value::Value,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenState {
  pub down: bool,
  pub size: f64,
  pub r: u8,
  pub g: u8,
  pub b: u8,
  pub a: u8,
}

impl Default for PenState {
  fn default() -> Self {
    PenState {
      down: false,
      size: 1.,
      r: 0,
      g: 0,
      b: 255,
      a: 255,
    }
  }
}

impl PenState {
  /// Accepts `#rrggbb` strings and packed `0xAARRGGBB` numbers.
  pub fn set_color(&mut self, color: &Value) {
    let packed = match color {
      Value::String(string) if string.starts_with('#') => {
        match u32::from_str_radix(&string[1..], 16) {
          Ok(rgb) if string.len() == 7 => 0xFF00_0000 | rgb,
          _ => return,
        }
      }
      other => other.to_f64() as i64 as u32,
    };
    self.a = match (packed >> 24) as u8 {
      0 => 255,
      alpha => alpha,
    };
    self.r = (packed >> 16) as u8;
    self.g = (packed >> 8) as u8;
    self.b = packed as u8;
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PenInstruction {
  pub size: f64,
  pub r: u8,
  pub g: u8,
  pub b: u8,
  pub a: u8,
  pub x1: f64,
  pub y1: f64,
  pub x2: f64,
  pub y2: f64,
}

/// Drawing requests for the renderer's pen layer, drained once per tick.
#[derive(Debug, Clone, PartialEq)]
pub enum PenCommand {
  Line(PenInstruction),
  Stamp { entity: EntityId, state: EntityState },
  Clear,
}

impl PenInstruction {
  pub fn new(pen: &PenState, from: (f64, f64), to: (f64, f64)) -> Self {
    PenInstruction {
      size: pen.size,
      r: pen.r,
      g: pen.g,
      b: pen.b,
      a: pen.a,
      x1: from.0,
      y1: from.1,
      x2: to.0,
      y2: to.1,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_hex_colors() {
    let mut pen = PenState::default();
    pen.set_color(&Value::from("#ff8000"));
    assert_eq!((pen.r, pen.g, pen.b, pen.a), (255, 128, 0, 255));
    pen.set_color(&Value::Number(0x80_10_20_30u32 as f64));
    assert_eq!((pen.r, pen.g, pen.b, pen.a), (0x10, 0x20, 0x30, 0x80));
  }
}
