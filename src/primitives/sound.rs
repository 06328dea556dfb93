use std::time::Duration;

use super::{state, state_mut, Reporter, Statement};
use crate::{error::Fault, thread::Scope, value::Value};

pub(super) fn reporter(opcode: &str) -> Option<Reporter> {
  Some(match opcode {
    "sound_volume" => Reporter::new(&[], volume),
    _ => return None,
  })
}

pub(super) fn command(opcode: &str) -> Option<Statement> {
  Some(match opcode {
    "sound_play" => Statement::new(&["SOUND_MENU"], play),
    "sound_stopallsounds" => Statement::new(&[], stop_all_sounds),
    "sound_setvolumeto" => Statement::new(&["VOLUME"], set_volume_to),
    "sound_changevolumeby" => Statement::new(&["VOLUME"], change_volume_by),
    _ => return None,
  })
}

/// Starts one of the entity's sounds and reports how long it plays. Unknown
/// sounds play nothing and last no time at all.
pub(crate) fn start_sound(scope: &mut Scope, sound: &Value) -> Result<Option<Duration>, Fault> {
  let entity = scope.entity().ok_or(Fault::MissingEntity(scope.entity))?;
  let Some(sound) = sound.map_as_str(|name| entity.sprite.sound(name).cloned()) else {
    return Ok(None);
  };
  let volume = entity.state.volume;
  let audio = scope.world.audio();
  audio.set_volume(volume);
  audio.play(&sound);
  Ok(Some(audio.duration(&sound)))
}

fn play(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  start_sound(scope, &args[0]).map(|_| ())
}

fn stop_all_sounds(scope: &mut Scope, _: &[Value]) -> Result<(), Fault> {
  scope.world.audio().stop(None);
  Ok(())
}

fn set_volume(scope: &mut Scope, volume: f64) -> Result<(), Fault> {
  if !volume.is_finite() {
    return Ok(());
  }
  let volume = volume.clamp(0., 100.);
  state_mut(scope)?.volume = volume;
  scope.world.audio().set_volume(volume);
  Ok(())
}

fn set_volume_to(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  set_volume(scope, args[0].to_f64())
}

fn change_volume_by(scope: &mut Scope, args: &[Value]) -> Result<(), Fault> {
  let volume = state(scope)?.volume;
  set_volume(scope, volume + args[0].to_f64())
}

fn volume(scope: &mut Scope, _: &[Value]) -> Value {
  Value::Number(scope.state().map_or(100., |state| state.volume))
}
