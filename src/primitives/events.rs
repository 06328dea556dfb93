use super::Statement;
use crate::{error::Fault, thread::Scope, value::Value};

pub(super) fn command(opcode: &str) -> Option<Statement> {
  Some(match opcode {
    "event_broadcast" => Statement::new(&["BROADCAST_INPUT"], broadcast),
    "control_create_clone_of" => Statement::new(&["CLONE_OPTION"], create_clone_of),
    _ => return None,
  })
}

fn broadcast(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let groups = scope.groups;
  args[0].map_as_str(|message| scope.world.broadcast(message, groups));
  Ok(())
}

fn create_clone_of(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let groups = scope.groups;
  let template = args[0].to_string();
  scope.world.create_clone(scope.entity, &template, groups);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    event::EventKey,
    test_support::TestWorld,
    world::{GroupId, SpawnTarget},
  };

  #[test]
  fn broadcasts_carry_the_callers_groups() {
    let mut world = TestWorld::new();
    world.groups = vec![GroupId(7)];
    let mut scope = world.scope();
    (command("event_broadcast").unwrap().run)(&mut scope, &[Value::from("Go")]).unwrap();
    let spawns = world.world.take_spawns();
    assert_eq!(spawns.len(), 1);
    assert_eq!(spawns[0].key, EventKey::message("go"));
    assert_eq!(spawns[0].groups, vec![GroupId(7)]);
  }

  #[test]
  fn clones_start_their_own_scripts() {
    let mut world = TestWorld::new();
    let mut scope = world.scope();
    (command("control_create_clone_of").unwrap().run)(&mut scope, &[Value::from("_myself_")])
      .unwrap();
    assert_eq!(world.world.clone_count(), 1);
    let spawns = world.world.take_spawns();
    assert_eq!(spawns[0].key, EventKey::CloneStart);
    assert!(matches!(spawns[0].target, SpawnTarget::Only(_)));
  }
}
