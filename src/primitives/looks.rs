use super::{state, state_mut, Reporter, Statement};
use crate::{
  error::Fault,
  target::{Entity, Say},
  thread::Scope,
  value::Value,
};

pub(super) fn reporter(opcode: &str) -> Option<Reporter> {
  Some(match opcode {
    "looks_costumenumbername" => Reporter::new(&["NUMBER_NAME"], costume_number_name),
    "looks_backdropnumbername" => Reporter::new(&["NUMBER_NAME"], backdrop_number_name),
    "looks_size" => Reporter::new(&[], size),
    _ => return None,
  })
}

pub(super) fn command(opcode: &str) -> Option<Statement> {
  Some(match opcode {
    "looks_say" => Statement::new(&["MESSAGE"], say),
    "looks_think" => Statement::new(&["MESSAGE"], think),
    "looks_show" => Statement::new(&[], show),
    "looks_hide" => Statement::new(&[], hide),
    "looks_switchcostumeto" => Statement::new(&["COSTUME"], switch_costume_to),
    "looks_nextcostume" => Statement::new(&[], next_costume),
    "looks_switchbackdropto" => Statement::new(&["BACKDROP"], switch_backdrop_to),
    "looks_nextbackdrop" => Statement::new(&[], next_backdrop),
    "looks_changesizeby" => Statement::new(&["CHANGE"], change_size_by),
    "looks_setsizeto" => Statement::new(&["SIZE"], set_size_to),
    "looks_changeeffectby" => Statement::new(&["EFFECT", "CHANGE"], change_effect_by),
    "looks_seteffectto" => Statement::new(&["EFFECT", "VALUE"], set_effect_to),
    "looks_cleargraphiceffects" => Statement::new(&[], clear_graphic_effects),
    "looks_gotofrontback" => Statement::new(&["FRONT_BACK"], go_to_front_back),
    "looks_goforwardbackwardlayers" => {
      Statement::new(&["FORWARD_BACKWARD", "NUM"], go_forward_backward_layers)
    }
    _ => return None,
  })
}

/// Shows a speech or thought bubble. An empty message removes it.
pub(crate) fn set_bubble(scope: &mut Scope, message: &Value, think: bool) -> Result<(), Fault> {
  let message = message.to_string();
  let state = state_mut(scope)?;
  state.say = (!message.is_empty()).then_some(Say { message, think });
  if state.visible {
    scope.world.request_redraw();
  }
  Ok(())
}

fn say(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  set_bubble(scope, &args[0], false)
}

fn think(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  set_bubble(scope, &args[0], true)
}

fn set_visible(scope: &mut Scope, visible: bool) -> Result<(), Fault> {
  state_mut(scope)?.visible = visible;
  scope.world.request_redraw();
  Ok(())
}

fn show(scope: &mut Scope, _: &[Value]) -> Result<(), Fault> {
  set_visible(scope, true)
}

fn hide(scope: &mut Scope, _: &[Value]) -> Result<(), Fault> {
  set_visible(scope, false)
}

fn switch_costume_to(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  state(scope)?;
  scope.world.set_costume(scope.entity, &args[0]);
  Ok(())
}

fn next_costume(scope: &mut Scope, _: &[Value]) -> Result<(), Fault> {
  switch_costume_to(scope, &[Value::from("next costume")])
}

fn switch_backdrop_to(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let groups = scope.groups;
  scope.world.switch_backdrop(&args[0], groups);
  Ok(())
}

fn next_backdrop(scope: &mut Scope, _: &[Value]) -> Result<(), Fault> {
  switch_backdrop_to(scope, &[Value::from("next backdrop")])
}

fn set_size(scope: &mut Scope, size: f64) -> Result<(), Fault> {
  if !size.is_finite() {
    return Ok(());
  }
  let state = state_mut(scope)?;
  state.size = size.max(0.);
  if state.visible {
    scope.world.request_redraw();
  }
  Ok(())
}

fn change_size_by(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let size = state(scope)?.size;
  set_size(scope, size + args[0].to_f64())
}

fn set_size_to(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  set_size(scope, args[0].to_f64())
}

fn change_effect_by(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let effect = args[0].to_string().to_lowercase();
  let state = state_mut(scope)?;
  state.set_effect(&effect, state.effect(&effect) + args[1].to_f64());
  scope.world.request_redraw();
  Ok(())
}

fn set_effect_to(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let effect = args[0].to_string().to_lowercase();
  state_mut(scope)?.set_effect(&effect, args[1].to_f64());
  scope.world.request_redraw();
  Ok(())
}

fn clear_graphic_effects(scope: &mut Scope, _: &[Value]) -> Result<(), Fault> {
  state_mut(scope)?.effects.clear();
  scope.world.request_redraw();
  Ok(())
}

fn go_to_front_back(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  if args[0].map_as_str(|layer| layer == "back") {
    scope.world.go_to_back(scope.entity);
  } else {
    scope.world.go_to_front(scope.entity);
  }
  Ok(())
}

fn go_forward_backward_layers(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let steps = args[1].to_f64();
  if !steps.is_finite() {
    return Ok(());
  }
  let steps = steps as i64;
  let steps = if args[0].map_as_str(|way| way == "backward") {
    steps.saturating_neg()
  } else {
    steps
  };
  scope.world.move_layers(scope.entity, steps);
  Ok(())
}

fn number_name(entity: Option<&Entity>, which: &Value) -> Value {
  let Some(entity) = entity else {
    return Value::Number(0.);
  };
  let index = entity.state.current_costume;
  if which.map_as_str(|which| which == "name") {
    entity
      .sprite
      .costumes
      .get(index)
      .map_or_else(|| Value::from(""), |costume| Value::from(costume.name.as_str()))
  } else {
    Value::Number(index as f64 + 1.)
  }
}

fn costume_number_name(scope: &mut Scope, args: &[Value]) -> Value {
  number_name(scope.entity(), &args[0])
}

fn backdrop_number_name(scope: &mut Scope, args: &[Value]) -> Value {
  number_name(scope.world.stage(), &args[0])
}

fn size(scope: &mut Scope, _: &[Value]) -> Value {
  Value::Number(scope.state().map_or(100., |state| state.size.round()))
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
  fn empty_messages_clear_the_bubble() {
    let mut world = TestWorld::new();
    run(&mut world, "looks_think", &[Value::from("hmm")]);
    assert_eq!(
      world.state().say,
      Some(Say {
        message: "hmm".to_string(),
        think: true
      })
    );
    run(&mut world, "looks_say", &[Value::from("")]);
    assert_eq!(world.state().say, None);
  }

  #[test]
  fn effects_change_and_clamp() {
    let mut world = TestWorld::new();
    run(&mut world, "looks_changeeffectby", &[Value::from("GHOST"), Value::Number(70.)]);
    run(&mut world, "looks_changeeffectby", &[Value::from("GHOST"), Value::Number(70.)]);
    assert_eq!(world.state().effect("ghost"), 100.);
    run(&mut world, "looks_cleargraphiceffects", &[]);
    assert_eq!(world.state().effect("ghost"), 0.);
  }

  #[test]
  fn size_changes_accumulate() {
    let mut world = TestWorld::new();
    run(&mut world, "looks_changesizeby", &[Value::Number(-30.)]);
    run(&mut world, "looks_changesizeby", &[Value::from("5")]);
    let mut scope = world.scope();
    assert_eq!((reporter("looks_size").unwrap().run)(&mut scope, &[]), Value::Number(75.));
  }

  #[test]
  fn hiding_requests_a_redraw() {
    let mut world = TestWorld::new();
    world.world.take_redraw();
    run(&mut world, "looks_hide", &[]);
    assert!(!world.state().visible);
    assert!(world.world.redraw_requested());
  }
}
