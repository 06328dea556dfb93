use super::{limit_precision, state, state_mut, Reporter, Statement};
use crate::{
  error::Fault,
  primitives::random_between,
  target::{radians_to_degrees, RotationStyle},
  thread::Scope,
  value::Value,
};

pub(super) fn reporter(opcode: &str) -> Option<Reporter> {
  Some(match opcode {
    "motion_xposition" => Reporter::new(&[], x_position),
    "motion_yposition" => Reporter::new(&[], y_position),
    "motion_direction" => Reporter::new(&[], direction),
    _ => return None,
  })
}

pub(super) fn command(opcode: &str) -> Option<Statement> {
  Some(match opcode {
    "motion_movesteps" => Statement::new(&["STEPS"], move_steps),
    "motion_turnright" => Statement::new(&["DEGREES"], turn_right),
    "motion_turnleft" => Statement::new(&["DEGREES"], turn_left),
    "motion_goto" => Statement::new(&["TO"], goto),
    "motion_gotoxy" => Statement::new(&["X", "Y"], goto_xy),
    "motion_pointindirection" => Statement::new(&["DIRECTION"], point_in_direction),
    "motion_pointtowards" => Statement::new(&["TOWARDS"], point_towards),
    "motion_changexby" => Statement::new(&["DX"], change_x_by),
    "motion_setx" => Statement::new(&["X"], set_x),
    "motion_changeyby" => Statement::new(&["DY"], change_y_by),
    "motion_sety" => Statement::new(&["Y"], set_y),
    "motion_ifonedgebounce" => Statement::new(&[], if_on_edge_bounce),
    "motion_setrotationstyle" => Statement::new(&["STYLE"], set_rotation_style),
    _ => return None,
  })
}

fn x_position(scope: &mut Scope, _: &[Value]) -> Value {
  Value::Number(scope.state().map_or(0., |state| limit_precision(state.x)))
}

fn y_position(scope: &mut Scope, _: &[Value]) -> Value {
  Value::Number(scope.state().map_or(0., |state| limit_precision(state.y)))
}

fn direction(scope: &mut Scope, _: &[Value]) -> Value {
  Value::Number(scope.state().map_or(90., |state| state.direction))
}

/// Moves the entity, leaving a pen trail when its pen is down.
fn move_entity(scope: &mut Scope, x: f64, y: f64) -> Result<(), Fault> {
  state(scope)?;
  scope.world.move_to(scope.entity, x, y);
  Ok(())
}

fn move_steps(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let steps = args[0].to_f64();
  let state = state(scope)?;
  let (dx, dy) = state.heading();
  let (x, y) = (state.x + dx * steps, state.y + dy * steps);
  move_entity(scope, x, y)
}

fn turn(scope: &mut Scope, degrees: f64) -> Result<(), Fault> {
  let state = state_mut(scope)?;
  state.set_direction(state.direction + degrees);
  if state.visible {
    scope.world.request_redraw();
  }
  Ok(())
}

fn turn_right(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  turn(scope, args[0].to_f64())
}

fn turn_left(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  turn(scope, -args[0].to_f64())
}

fn goto(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let target = args[0].to_string();
  match scope.world.position_of(&target) {
    Some((x, y)) => move_entity(scope, x, y),
    None => Ok(()),
  }
}

fn goto_xy(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  move_entity(scope, args[0].to_f64(), args[1].to_f64())
}

fn point_in_direction(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let direction = args[0].to_f64();
  if !direction.is_finite() {
    return Ok(());
  }
  let current = state(scope)?.direction;
  turn(scope, direction - current)
}

fn point_towards(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let target = args[0].to_string();
  let current = state(scope)?;
  let (x, y, heading) = (current.x, current.y, current.direction);
  let direction = if target == "_random_" {
    random_between(-180., 180., true)
  } else {
    let Some((tx, ty)) = scope.world.position_of(&target) else {
      return Ok(());
    };
    90. - radians_to_degrees((ty - y).atan2(tx - x))
  };
  turn(scope, direction - heading)
}

fn change_x_by(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let state = state(scope)?;
  let (x, y) = (state.x + args[0].to_f64(), state.y);
  move_entity(scope, x, y)
}

fn set_x(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let y = state(scope)?.y;
  move_entity(scope, args[0].to_f64(), y)
}

fn change_y_by(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let state = state(scope)?;
  let (x, y) = (state.x, state.y + args[0].to_f64());
  move_entity(scope, x, y)
}

fn set_y(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let x = state(scope)?.x;
  move_entity(scope, x, args[0].to_f64())
}

/// Treats the entity as a point: past an edge it is pulled back inside and
/// its direction is mirrored off that edge.
fn if_on_edge_bounce(scope: &mut Scope, _: &[Value]) -> Result<(), Fault> {
  let (half_width, half_height) = scope.world.bounds();
  let current = state(scope)?;
  let (mut dx, mut dy) = current.heading();
  let (x, y, heading) = (current.x, current.y, current.direction);
  let past_x = x.abs() > half_width;
  let past_y = y.abs() > half_height;
  if !past_x && !past_y {
    return Ok(());
  }
  if past_x {
    dx = -dx.abs().max(0.2) * x.signum();
  }
  if past_y {
    dy = -dy.abs().max(0.2) * y.signum();
  }
  turn(scope, 90. - radians_to_degrees(dy.atan2(dx)) - heading)?;
  move_entity(
    scope,
    x.clamp(-half_width, half_width),
    y.clamp(-half_height, half_height),
  )
}

fn set_rotation_style(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let Some(style) = args[0].map_as_str(RotationStyle::parse) else {
    return Ok(());
  };
  state_mut(scope)?.rotation_style = style;
  scope.world.request_redraw();
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::TestWorld;

  fn run(world: &mut TestWorld, opcode: &str, args: &[Value]) {
    let mut scope = world.scope();
    (command(opcode).unwrap().run)(&mut scope, args).unwrap();
  }

  #[test]
  fn moves_along_the_heading() {
    let mut world = TestWorld::new();
    run(&mut world, "motion_turnright", &[Value::Number(90.)]);
    assert_eq!(world.state().direction, 180.);
    run(&mut world, "motion_movesteps", &[Value::Number(10.)]);
    assert!((world.state().y + 10.).abs() < 1e-9);
    assert!(world.state().x.abs() < 1e-9);
  }

  #[test]
  fn points_towards_the_mouse() {
    let mut world = TestWorld::new();
    world.world.input.mouse_x = 0.;
    world.world.input.mouse_y = 50.;
    run(&mut world, "motion_pointtowards", &[Value::from("_mouse_")]);
    assert!(world.state().direction.abs() < 1e-9);
  }

  #[test]
  fn pen_down_movement_draws_lines() {
    let mut world = TestWorld::new();
    world.state_mut().pen.down = true;
    run(&mut world, "motion_gotoxy", &[Value::Number(3.), Value::Number(4.)]);
    assert_eq!(world.world.drain_pen().len(), 1);
    assert_eq!((world.state().x, world.state().y), (3., 4.));
  }

  #[test]
  fn bounces_off_the_right_edge() {
    let mut world = TestWorld::new();
    run(&mut world, "motion_setx", &[Value::Number(500.)]);
    run(&mut world, "motion_ifonedgebounce", &[]);
    assert_eq!(world.state().x, 240.);
    assert!((world.state().direction + 90.).abs() < 1e-9);
  }

  #[test]
  fn reporters_trim_float_noise() {
    let mut world = TestWorld::new();
    world.state_mut().x = 0.1 + 0.2 - 0.3;
    let mut scope = world.scope();
    assert_eq!(
      (reporter("motion_xposition").unwrap().run)(&mut scope, &[]),
      Value::Number(0.)
    );
  }
}
