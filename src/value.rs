use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Value {
  Bool(bool),
  Number(f64),
  String(String),
}

impl Default for Value {
  fn default() -> Self {
    Value::Number(0.)
  }
}

impl From<f64> for Value {
  fn from(value: f64) -> Self {
    Value::Number(value)
  }
}

impl From<bool> for Value {
  fn from(value: bool) -> Self {
    Value::Bool(value)
  }
}

impl From<String> for Value {
  fn from(value: String) -> Self {
    Value::String(value)
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::String(value.to_string())
  }
}

impl Value {
  pub fn to_f64(&self) -> f64 {
    match self {
      Value::Number(number) if number.is_nan() => 0.,
      Value::Number(number) => *number,
      Value::Bool(bool) => *bool as i32 as f64,
      Value::String(string) => parse_number(string).unwrap_or(0.),
    }
  }

  pub fn to_bool(&self) -> bool {
    match self {
      Value::Bool(bool) => *bool,
      Value::Number(number) => *number != 0. && !number.is_nan(),
      Value::String(string) => {
        !(string.is_empty()
          || string == "0"
          || string.eq_ignore_ascii_case("false"))
      }
    }
  }

  /// Whole numbers, and strings that spell one.
  pub fn is_int(&self) -> bool {
    match self {
      Value::Number(number) => number.fract() == 0.,
      Value::Bool(_) => true,
      Value::String(string) => !string.contains('.'),
    }
  }

  pub fn map_as_str<T, F: FnOnce(&str) -> T>(&self, map: F) -> T {
    match self {
      Value::String(string) => map(string.as_str()),
      other => map(other.to_string().as_str()),
    }
  }

  /// Numeric comparison when both sides look like numbers, otherwise a
  /// case-insensitive string comparison.
  pub fn compare(&self, other: &Value) -> f64 {
    match (self.as_number(), other.as_number()) {
      (Some(a), Some(b)) if a == b => 0.,
      (Some(a), Some(b)) if !(a.is_nan() || b.is_nan()) => a - b,
      _ => {
        let a = self.to_string().to_lowercase();
        let b = other.to_string().to_lowercase();
        match a.cmp(&b) {
          Ordering::Less => -1.,
          Ordering::Equal => 0.,
          Ordering::Greater => 1.,
        }
      }
    }
  }

  fn as_number(&self) -> Option<f64> {
    match self {
      Value::Number(number) => Some(*number),
      Value::Bool(_) => None,
      Value::String(string) => parse_number(string),
    }
  }
}

fn parse_number(string: &str) -> Option<f64> {
  let trimmed = string.trim();
  if trimmed.is_empty() {
    return None;
  }
  match trimmed {
    "Infinity" => Some(f64::INFINITY),
    "-Infinity" => Some(f64::NEG_INFINITY),
    _ => trimmed.parse::<f64>().ok().filter(|number| !number.is_nan()),
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Bool(bool) => write!(f, "{bool}"),
      Value::String(string) => write!(f, "{string}"),
      Value::Number(number) => {
        if number.is_nan() {
          write!(f, "NaN")
        } else if number.is_infinite() {
          write!(f, "{}Infinity", if *number < 0. { "-" } else { "" })
        } else if *number == 0. {
          write!(f, "0")
        } else if number.fract() == 0. && number.abs() < 1e21 {
          write!(f, "{number:.0}")
        } else {
          write!(f, "{number}")
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strings_coerce_to_numbers() {
    assert_eq!(Value::from("12.5").to_f64(), 12.5);
    assert_eq!(Value::from("  7 ").to_f64(), 7.);
    assert_eq!(Value::from("cat").to_f64(), 0.);
    assert_eq!(Value::from("").to_f64(), 0.);
    assert_eq!(Value::Bool(true).to_f64(), 1.);
  }

  #[test]
  fn truthiness() {
    assert!(!Value::from("false").to_bool());
    assert!(!Value::from("0").to_bool());
    assert!(!Value::from("").to_bool());
    assert!(Value::from("no").to_bool());
    assert!(!Value::Number(f64::NAN).to_bool());
  }

  #[test]
  fn numbers_display_like_scratch() {
    assert_eq!(Value::Number(3.).to_string(), "3");
    assert_eq!(Value::Number(-0.5).to_string(), "-0.5");
    assert_eq!(Value::Number(f64::INFINITY).to_string(), "Infinity");
    assert_eq!(Value::Number(1e20).to_string(), "100000000000000000000");
    assert_eq!(Value::Number(-0.).to_string(), "0");
  }

  #[test]
  fn compare_mixes_numbers_and_strings() {
    assert_eq!(Value::from("10").compare(&Value::Number(9.)), 1.);
    assert_eq!(Value::from("Apple").compare(&Value::from("apple")), 0.);
    assert!(Value::from("a").compare(&Value::from("b")) < 0.);
    assert!(Value::from("").compare(&Value::Number(0.)) != 0.);
    assert_eq!(Value::Number(f64::INFINITY).compare(&Value::from("Infinity")), 0.);
    assert!(Value::Number(f64::NEG_INFINITY).compare(&Value::Number(f64::INFINITY)) < 0.);
  }
}
