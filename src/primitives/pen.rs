use super::{state, state_mut, Statement};
use crate::{
  error::Fault,
  pen::{PenCommand, PenInstruction},
  thread::Scope,
  value::Value,
};

pub(super) fn command(opcode: &str) -> Option<Statement> {
  Some(match opcode {
    "pen_clear" => Statement::new(&[], clear),
    "pen_stamp" => Statement::new(&[], stamp),
    "pen_penDown" => Statement::new(&[], pen_down),
    "pen_penUp" => Statement::new(&[], pen_up),
    "pen_setPenColorToColor" => Statement::new(&["COLOR"], set_pen_color_to_color),
    "pen_changePenSizeBy" => Statement::new(&["SIZE"], change_pen_size_by),
    "pen_setPenSizeTo" => Statement::new(&["SIZE"], set_pen_size_to),
    _ => return None,
  })
}

fn clear(scope: &mut Scope, _: &[Value]) -> Result<(), Fault> {
  scope.world.push_pen(PenCommand::Clear);
  Ok(())
}

fn stamp(scope: &mut Scope, _: &[Value]) -> Result<(), Fault> {
  let state = state(scope)?.clone();
  scope.world.push_pen(PenCommand::Stamp {
    entity: scope.entity,
    state,
  });
  Ok(())
}

/// Putting the pen down leaves a dot where the entity stands.
fn pen_down(scope: &mut Scope, _: &[Value]) -> Result<(), Fault> {
  let state = state_mut(scope)?;
  state.pen.down = true;
  let dot = PenInstruction::new(&state.pen, (state.x, state.y), (state.x, state.y));
  scope.world.push_pen(PenCommand::Line(dot));
  Ok(())
}

fn pen_up(scope: &mut Scope, _: &[Value]) -> Result<(), Fault> {
  state_mut(scope)?.pen.down = false;
  Ok(())
}

fn set_pen_color_to_color(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  state_mut(scope)?.pen.set_color(&args[0]);
  Ok(())
}

fn set_pen_size(scope: &mut Scope, size: f64) -> Result<(), Fault> {
  if size.is_finite() {
    state_mut(scope)?.pen.size = size.clamp(1., 1200.);
  }
  Ok(())
}

fn change_pen_size_by(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let size = state(scope)?.pen.size;
  set_pen_size(scope, size + args[0].to_f64())
}

fn set_pen_size_to(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  set_pen_size(scope, args[0].to_f64())
}
