use super::Reporter;
use crate::{
  target::{degrees_to_radians, radians_to_degrees},
  thread::Scope,
  value::Value,
};

pub(super) fn reporter(opcode: &str) -> Option<Reporter> {
  Some(match opcode {
    "operator_add" => Reporter::new(&["NUM1", "NUM2"], add),
    "operator_subtract" => Reporter::new(&["NUM1", "NUM2"], subtract),
    "operator_multiply" => Reporter::new(&["NUM1", "NUM2"], multiply),
    "operator_divide" => Reporter::new(&["NUM1", "NUM2"], divide),
    "operator_equals" => Reporter::new(&["OPERAND1", "OPERAND2"], equals),
    "operator_gt" => Reporter::new(&["OPERAND1", "OPERAND2"], gt),
    "operator_lt" => Reporter::new(&["OPERAND1", "OPERAND2"], lt),
    "operator_and" => Reporter::new(&["OPERAND1", "OPERAND2"], and),
    "operator_or" => Reporter::new(&["OPERAND1", "OPERAND2"], or),
    "operator_not" => Reporter::new(&["OPERAND"], not),
    "operator_random" => Reporter::new(&["FROM", "TO"], random),
    "operator_join" => Reporter::new(&["STRING1", "STRING2"], join),
    "operator_letter_of" => Reporter::new(&["LETTER", "STRING"], letter_of),
    "operator_length" => Reporter::new(&["STRING"], length),
    "operator_contains" => Reporter::new(&["STRING1", "STRING2"], contains),
    "operator_mod" => Reporter::new(&["NUM1", "NUM2"], modulo),
    "operator_round" => Reporter::new(&["NUM"], round),
    "operator_mathop" => Reporter::new(&["OPERATOR", "NUM"], mathop),
    _ => return None,
  })
}

fn add(_: &mut Scope, args: &[Value]) -> Value {
  Value::Number(args[0].to_f64() + args[1].to_f64())
}

fn subtract(_: &mut Scope, args: &[Value]) -> Value {
  Value::Number(args[0].to_f64() - args[1].to_f64())
}

fn multiply(_: &mut Scope, args: &[Value]) -> Value {
  Value::Number(args[0].to_f64() * args[1].to_f64())
}

fn divide(_: &mut Scope, args: &[Value]) -> Value {
  Value::Number(args[0].to_f64() / args[1].to_f64())
}

fn equals(_: &mut Scope, args: &[Value]) -> Value {
  Value::Bool(args[0].compare(&args[1]) == 0.)
}

fn gt(_: &mut Scope, args: &[Value]) -> Value {
  Value::Bool(args[0].compare(&args[1]) > 0.)
}

fn lt(_: &mut Scope, args: &[Value]) -> Value {
  Value::Bool(args[0].compare(&args[1]) < 0.)
}

fn and(_: &mut Scope, args: &[Value]) -> Value {
  Value::Bool(args[0].to_bool() && args[1].to_bool())
}

fn or(_: &mut Scope, args: &[Value]) -> Value {
  Value::Bool(args[0].to_bool() || args[1].to_bool())
}

fn not(_: &mut Scope, args: &[Value]) -> Value {
  Value::Bool(!args[0].to_bool())
}

fn random(_: &mut Scope, args: &[Value]) -> Value {
  let (from, to) = (&args[0], &args[1]);
  Value::Number(random_between(
    from.to_f64(),
    to.to_f64(),
    from.is_int() && to.is_int(),
  ))
}

/// A random number in `[low, high]`, in either order. Whole numbers only
/// when `integer` is set.
pub fn random_between(low: f64, high: f64, integer: bool) -> f64 {
  let (low, high) = if low <= high { (low, high) } else { (high, low) };
  if low == high {
    return low;
  }
  let sample = unsafe { libc::rand() };
  let span = (high - low).floor() + 1.;
  if integer && span <= libc::RAND_MAX as f64 {
    return low + sample as f64 % span;
  }
  // Weighted so that neither bound can overflow the result.
  let fraction = sample as f64 / libc::RAND_MAX as f64;
  let number = low * (1. - fraction) + high * fraction;
  if integer {
    number.round().clamp(low, high)
  } else {
    number
  }
}

fn join(_: &mut Scope, args: &[Value]) -> Value {
  Value::String(format!("{}{}", args[0], args[1]))
}

fn letter_of(_: &mut Scope, args: &[Value]) -> Value {
  let index = args[0].to_f64().floor();
  Value::String(args[1].map_as_str(|s| {
    if index < 1. {
      return String::new();
    }
    s.chars()
      .nth(index as usize - 1)
      .map(|c| c.to_string())
      .unwrap_or_default()
  }))
}

fn length(_: &mut Scope, args: &[Value]) -> Value {
  Value::Number(args[0].map_as_str(|s| s.chars().count()) as f64)
}

fn contains(_: &mut Scope, args: &[Value]) -> Value {
  Value::Bool(args[0].map_as_str(|s1| {
    args[1].map_as_str(|s2| s1.to_lowercase().contains(s2.to_lowercase().as_str()))
  }))
}

fn modulo(_: &mut Scope, args: &[Value]) -> Value {
  let n = args[0].to_f64();
  let modulus = args[1].to_f64();
  let mut result = n % modulus;
  if result / modulus < 0. {
    result += modulus;
  }
  Value::Number(result)
}

fn round(_: &mut Scope, args: &[Value]) -> Value {
  Value::Number(args[0].to_f64().round())
}

fn mathop(_: &mut Scope, args: &[Value]) -> Value {
  let value = args[1].to_f64();
  Value::Number(args[0].map_as_str(|operator| match operator {
    "abs" => value.abs(),
    "floor" => value.floor(),
    "ceiling" => value.ceil(),
    "sqrt" => value.sqrt(),
    "sin" => truncate_float(degrees_to_radians(value).sin()),
    "cos" => truncate_float(degrees_to_radians(value).cos()),
    "tan" => {
      let angle = value % 360.;
      if angle == -270. || angle == 90. {
        f64::INFINITY
      } else if angle == -90. || angle == 270. {
        f64::NEG_INFINITY
      } else {
        truncate_float(degrees_to_radians(angle).tan())
      }
    }
    "asin" => radians_to_degrees(value.asin()),
    "acos" => radians_to_degrees(value.acos()),
    "atan" => radians_to_degrees(value.atan()),
    "ln" => value.ln(),
    "log" => value.log10(),
    "e ^" => value.exp(),
    "10 ^" => 10f64.powf(value),
    _ => 0.,
  }))
}

fn truncate_float(value: f64) -> f64 {
  (value * 1e10).round() / 1e10
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::TestWorld;

  fn report(opcode: &str, args: &[Value]) -> Value {
    let mut world = TestWorld::new();
    let mut scope = world.scope();
    (reporter(opcode).unwrap().run)(&mut scope, args)
  }

  #[test]
  fn arithmetic_coerces_strings() {
    assert_eq!(
      report("operator_add", &[Value::from("2"), Value::Number(3.)]),
      Value::Number(5.)
    );
    assert_eq!(
      report("operator_mod", &[Value::Number(-1.), Value::Number(3.)]),
      Value::Number(2.)
    );
  }

  #[test]
  fn string_operators() {
    assert_eq!(
      report("operator_letter_of", &[Value::Number(2.), Value::from("cat")]),
      Value::from("a")
    );
    assert_eq!(
      report("operator_letter_of", &[Value::Number(9.), Value::from("cat")]),
      Value::from("")
    );
    assert_eq!(
      report("operator_contains", &[Value::from("Banana"), Value::from("NAN")]),
      Value::Bool(true)
    );
    assert_eq!(
      report("operator_join", &[Value::from("a"), Value::Number(1.)]),
      Value::from("a1")
    );
  }

  #[test]
  fn mathop_uses_degrees() {
    assert_eq!(
      report("operator_mathop", &[Value::from("sin"), Value::Number(90.)]),
      Value::Number(1.)
    );
    assert_eq!(
      report("operator_mathop", &[Value::from("tan"), Value::Number(90.)]),
      Value::Number(f64::INFINITY)
    );
    assert_eq!(
      report("operator_mathop", &[Value::from("10 ^"), Value::Number(2.)]),
      Value::Number(100.)
    );
  }

  #[test]
  fn random_stays_in_range() {
    for _ in 0..200 {
      let n = random_between(5., 1., true);
      assert!((1. ..=5.).contains(&n) && n.fract() == 0.);
      let f = random_between(0., 1., false);
      assert!((0. ..=1.).contains(&f));
    }
    assert_eq!(random_between(3., 3., true), 3.);
  }

  #[test]
  fn random_handles_huge_ranges() {
    for _ in 0..50 {
      let n = random_between(0., 1e19, true);
      assert!((0. ..=1e19).contains(&n) && n.fract() == 0.);
      let f = random_between(-f64::MAX, f64::MAX, false);
      assert!(f.is_finite());
    }
  }
}
