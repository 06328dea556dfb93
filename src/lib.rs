//! Compiles block scripts into closure trees and runs them under a
//! cooperative, frame-paced scheduler.

pub mod block;
pub mod cache;
pub mod compiler;
pub mod costume;
pub mod error;
pub mod event;
pub mod executor;
#[cfg(feature = "sdl")]
pub mod frontend;
pub mod host;
pub mod pen;
pub mod primitives;
pub mod project;
pub mod runtime;
pub mod scheduler;
pub mod schema;
pub mod store;
pub mod target;
pub mod thread;
pub mod value;
pub mod world;

pub use error::{Diagnostic, Fault, LoadError};
pub use project::{Config, ProjectData};
pub use runtime::Runtime;

#[cfg(test)]
pub(crate) mod test_support {
  use std::{collections::HashMap, sync::Arc, time::Duration};

  use crate::{
    costume::{Costume, Sound, Sprite},
    executor::ExecutorId,
    project::Config,
    store::Store,
    target::{EntityId, EntityState},
    thread::Scope,
    value::Value,
    world::{GroupId, World},
  };

  pub fn sprite(name: &str, is_stage: bool) -> Arc<Sprite> {
    let costume = |name: &str| Costume {
      name: name.to_string(),
      md5ext: format!("{name}.svg"),
      bitmap_resolution: 1,
      rotation_center_x: 0.,
      rotation_center_y: 0.,
    };
    Arc::new(Sprite {
      name: name.to_string(),
      is_stage,
      costumes: vec![costume("a"), costume("b")],
      sounds: vec![Sound {
        name: "meow".to_string(),
        md5ext: "meow.wav".to_string(),
        sample_count: 48000,
        rate: 48000,
      }],
    })
  }

  /// A stage and one sprite, `Cat`, with a scope bound to the sprite.
  pub struct TestWorld {
    pub world: World,
    pub entity: EntityId,
    pub now: Duration,
    pub groups: Vec<GroupId>,
    args: HashMap<String, Value>,
    temps: Vec<Value>,
  }

  impl TestWorld {
    pub fn new() -> Self {
      let mut world = World::new(Config::default());
      world.add_primary(sprite("Stage", true), EntityState::default(), Store::default());
      let entity = world.add_primary(sprite("Cat", false), EntityState::default(), Store::default());
      TestWorld {
        world,
        entity,
        now: Duration::ZERO,
        groups: Vec::new(),
        args: HashMap::new(),
        temps: Vec::new(),
      }
    }

    pub fn scope(&mut self) -> Scope<'_> {
      Scope {
        entity: self.entity,
        executor: ExecutorId(0),
        now: self.now,
        world: &mut self.world,
        args: &self.args,
        temps: &self.temps,
        groups: &self.groups,
      }
    }

    pub fn state(&self) -> &EntityState {
      &self.world.entity(self.entity).unwrap().state
    }

    pub fn state_mut(&mut self) -> &mut EntityState {
      &mut self.world.entity_mut(self.entity).unwrap().state
    }
  }
}
