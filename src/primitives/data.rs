//! Variables and lists. The `VARIABLE` and `LIST` slots hold ids; a sprite's
//! local store shadows the globals.

use super::{Reporter, Statement};
use crate::{error::Fault, thread::Scope, value::Value};

pub(super) fn reporter(opcode: &str) -> Option<Reporter> {
  Some(match opcode {
    "data_variable" => Reporter::new(&["VARIABLE"], variable),
    "data_listcontents" => Reporter::new(&["LIST"], list_contents),
    "data_itemoflist" => Reporter::new(&["INDEX", "LIST"], item_of_list),
    "data_itemnumoflist" => Reporter::new(&["ITEM", "LIST"], item_num_of_list),
    "data_lengthoflist" => Reporter::new(&["LIST"], length_of_list),
    "data_listcontainsitem" => Reporter::new(&["LIST", "ITEM"], list_contains_item),
    _ => return None,
  })
}

pub(super) fn command(opcode: &str) -> Option<Statement> {
  Some(match opcode {
    "data_setvariableto" => Statement::new(&["VARIABLE", "VALUE"], set_variable_to),
    "data_changevariableby" => Statement::new(&["VARIABLE", "VALUE"], change_variable_by),
    "data_addtolist" => Statement::new(&["ITEM", "LIST"], add_to_list),
    "data_deleteoflist" => Statement::new(&["INDEX", "LIST"], delete_of_list),
    "data_deletealloflist" => Statement::new(&["LIST"], delete_all_of_list),
    "data_insertatlist" => Statement::new(&["ITEM", "INDEX", "LIST"], insert_at_list),
    "data_replaceitemoflist" => {
      Statement::new(&["INDEX", "LIST", "ITEM"], replace_item_of_list)
    }
    _ => return None,
  })
}

fn variable(scope: &mut Scope, args: &[Value]) -> Value {
  args[0].map_as_str(|id| scope.world.variable(scope.entity, id))
}

fn set_variable_to(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let id = args[0].to_string();
  scope.world.set_variable(scope.entity, &id, args[1].clone());
  Ok(())
}

fn change_variable_by(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let id = args[0].to_string();
  let value = scope.world.variable(scope.entity, &id).to_f64() + args[1].to_f64();
  scope.world.set_variable(scope.entity, &id, Value::Number(value));
  Ok(())
}

fn list_contents(scope: &mut Scope, args: &[Value]) -> Value {
  let id = args[0].to_string();
  Value::String(scope.world.lists(scope.entity, &id).contents(&id))
}

fn item_of_list(scope: &mut Scope, args: &[Value]) -> Value {
  let id = args[1].to_string();
  scope.world.lists(scope.entity, &id).item(&id, &args[0])
}

fn item_num_of_list(scope: &mut Scope, args: &[Value]) -> Value {
  let id = args[1].to_string();
  scope.world.lists(scope.entity, &id).item_number(&id, &args[0])
}

fn length_of_list(scope: &mut Scope, args: &[Value]) -> Value {
  let id = args[0].to_string();
  Value::Number(scope.world.lists(scope.entity, &id).length(&id) as f64)
}

fn list_contains_item(scope: &mut Scope, args: &[Value]) -> Value {
  let id = args[0].to_string();
  Value::Bool(scope.world.lists(scope.entity, &id).contains(&id, &args[1]))
}

fn add_to_list(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let id = args[1].to_string();
  scope.world.lists_mut(scope.entity, &id).add(&id, args[0].clone());
  Ok(())
}

fn delete_of_list(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let id = args[1].to_string();
  scope.world.lists_mut(scope.entity, &id).delete(&id, &args[0]);
  Ok(())
}

fn delete_all_of_list(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let id = args[0].to_string();
  scope
    .world
    .lists_mut(scope.entity, &id)
    .delete(&id, &Value::from("all"));
  Ok(())
}

fn insert_at_list(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let id = args[2].to_string();
  scope
    .world
    .lists_mut(scope.entity, &id)
    .insert(&id, &args[1], args[0].clone());
  Ok(())
}

fn replace_item_of_list(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let id = args[1].to_string();
  scope
    .world
    .lists_mut(scope.entity, &id)
    .replace(&id, &args[0], args[2].clone());
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

  fn report(world: &mut TestWorld, opcode: &str, args: &[Value]) -> Value {
    let mut scope = world.scope();
    (reporter(opcode).unwrap().run)(&mut scope, args)
  }

  #[test]
  fn variables_change_numerically() {
    let mut world = TestWorld::new();
    run(&mut world, "data_setvariableto", &[Value::from("score"), Value::from("4")]);
    run(&mut world, "data_changevariableby", &[Value::from("score"), Value::Number(1.5)]);
    assert_eq!(
      report(&mut world, "data_variable", &[Value::from("score")]),
      Value::Number(5.5)
    );
  }

  #[test]
  fn list_blocks_accept_symbolic_indices() {
    let mut world = TestWorld::new();
    for item in ["a", "b", "c"] {
      run(&mut world, "data_addtolist", &[Value::from(item), Value::from("letters")]);
    }
    run(
      &mut world,
      "data_insertatlist",
      &[Value::from("z"), Value::Number(2.), Value::from("letters")],
    );
    assert_eq!(
      report(&mut world, "data_listcontents", &[Value::from("letters")]),
      Value::from("azbc")
    );
    run(&mut world, "data_deleteoflist", &[Value::Number(1.), Value::from("letters")]);
    run(
      &mut world,
      "data_replaceitemoflist",
      &[Value::from("last"), Value::from("letters"), Value::from("end")],
    );
    assert_eq!(
      report(&mut world, "data_itemoflist", &[Value::Number(3.), Value::from("letters")]),
      Value::from("end")
    );
    assert_eq!(
      report(&mut world, "data_itemnumoflist", &[Value::from("Z"), Value::from("letters")]),
      Value::Number(1.)
    );
    assert_eq!(
      report(&mut world, "data_listcontents", &[Value::from("letters")]),
      Value::from("z b end")
    );
    run(&mut world, "data_deletealloflist", &[Value::from("letters")]);
    assert_eq!(
      report(&mut world, "data_lengthoflist", &[Value::from("letters")]),
      Value::Number(0.)
    );
  }
}
