use super::{limit_precision, Reporter, Statement};
use crate::{error::Fault, thread::Scope, value::Value};

pub(super) fn reporter(opcode: &str) -> Option<Reporter> {
  Some(match opcode {
    "sensing_answer" => Reporter::new(&[], answer),
    "sensing_keypressed" => Reporter::new(&["KEY_OPTION"], key_pressed),
    "sensing_mousedown" => Reporter::new(&[], mouse_down),
    "sensing_mousex" => Reporter::new(&[], mouse_x),
    "sensing_mousey" => Reporter::new(&[], mouse_y),
    "sensing_timer" => Reporter::new(&[], timer),
    "sensing_distanceto" => Reporter::new(&["DISTANCETOMENU"], distance_to),
    "sensing_of" => Reporter::new(&["PROPERTY", "OBJECT"], of),
    _ => return None,
  })
}

pub(super) fn command(opcode: &str) -> Option<Statement> {
  Some(match opcode {
    "sensing_resettimer" => Statement::new(&[], reset_timer),
    _ => return None,
  })
}

fn answer(scope: &mut Scope, _: &[Value]) -> Value {
  Value::from(scope.world.answer.as_str())
}

fn key_pressed(scope: &mut Scope, args: &[Value]) -> Value {
  Value::Bool(args[0].map_as_str(|key| scope.world.input.is_key_down(key)))
}

fn mouse_down(scope: &mut Scope, _: &[Value]) -> Value {
  Value::Bool(scope.world.input.mouse_down)
}

fn mouse_x(scope: &mut Scope, _: &[Value]) -> Value {
  Value::Number(scope.world.input.mouse_x)
}

fn mouse_y(scope: &mut Scope, _: &[Value]) -> Value {
  Value::Number(scope.world.input.mouse_y)
}

fn timer(scope: &mut Scope, _: &[Value]) -> Value {
  Value::Number(scope.world.timer(scope.now))
}

fn reset_timer(scope: &mut Scope, _: &[Value]) -> Result<(), Fault> {
  scope.world.reset_timer(scope.now);
  Ok(())
}

fn distance_to(scope: &mut Scope, args: &[Value]) -> Value {
  let Some(state) = scope.state() else {
    return Value::Number(0.);
  };
  let (x, y) = (state.x, state.y);
  let target = args[0].to_string();
  if target == "_random_" {
    return Value::Number(10000.);
  }
  match scope.world.position_of(&target) {
    Some((tx, ty)) => Value::Number((tx - x).hypot(ty - y)),
    None => Value::Number(10000.),
  }
}

/// An attribute of another sprite or of the stage, or one of its local
/// variables.
fn of(scope: &mut Scope, args: &[Value]) -> Value {
  let object = args[1].to_string();
  let entity = match object.as_str() {
    "_stage_" => scope.world.stage(),
    name => scope
      .world
      .primary_named(name)
      .and_then(|id| scope.world.entity(id)),
  };
  let Some(entity) = entity else {
    return Value::Number(0.);
  };
  let state = &entity.state;
  let property = args[0].to_string();
  let costume_name = || {
    entity
      .sprite
      .costumes
      .get(state.current_costume)
      .map_or_else(|| Value::from(""), |costume| Value::from(costume.name.as_str()))
  };
  match (entity.is_stage(), property.as_str()) {
    (false, "x position") => Value::Number(limit_precision(state.x)),
    (false, "y position") => Value::Number(limit_precision(state.y)),
    (false, "direction") => Value::Number(state.direction),
    (false, "costume #") | (true, "backdrop #") => {
      Value::Number(state.current_costume as f64 + 1.)
    }
    (false, "costume name") | (true, "backdrop name") => costume_name(),
    (false, "size") => Value::Number(state.size.round()),
    (_, "volume") => Value::Number(state.volume),
    (_, variable) => entity
      .locals
      .variables
      .get(variable)
      .or_else(|| {
        entity
          .is_stage()
          .then(|| scope.world.globals.variables.get(variable))
          .flatten()
      })
      .cloned()
      .unwrap_or(Value::Number(0.)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::TestWorld;

  fn report(world: &mut TestWorld, opcode: &str, args: &[Value]) -> Value {
    let mut scope = world.scope();
    (reporter(opcode).unwrap().run)(&mut scope, args)
  }

  #[test]
  fn reads_input_state() {
    let mut world = TestWorld::new();
    world.world.input.keys_down.insert("space".to_string());
    assert_eq!(
      report(&mut world, "sensing_keypressed", &[Value::from("space")]),
      Value::Bool(true)
    );
    assert_eq!(
      report(&mut world, "sensing_keypressed", &[Value::from("any")]),
      Value::Bool(true)
    );
    assert_eq!(
      report(&mut world, "sensing_keypressed", &[Value::from("a")]),
      Value::Bool(false)
    );
  }

  #[test]
  fn measures_distance_to_the_mouse() {
    let mut world = TestWorld::new();
    world.world.input.mouse_x = 3.;
    world.world.input.mouse_y = 4.;
    assert_eq!(
      report(&mut world, "sensing_distanceto", &[Value::from("_mouse_")]),
      Value::Number(5.)
    );
  }

  #[test]
  fn reads_attributes_of_other_sprites() {
    let mut world = TestWorld::new();
    world.state_mut().x = 12.;
    assert_eq!(
      report(&mut world, "sensing_of", &[Value::from("x position"), Value::from("Cat")]),
      Value::Number(12.)
    );
    assert_eq!(
      report(&mut world, "sensing_of", &[Value::from("x position"), Value::from("Dog")]),
      Value::Number(0.)
    );
  }

  #[test]
  fn the_timer_counts_from_its_last_reset() {
    let mut world = TestWorld::new();
    world.now = std::time::Duration::from_secs(3);
    let mut scope = world.scope();
    (command("sensing_resettimer").unwrap().run)(&mut scope, &[]).unwrap();
    world.now = std::time::Duration::from_secs(5);
    assert_eq!(report(&mut world, "sensing_timer", &[]), Value::Number(2.));
  }
}
