//! Compiled threads keyed by owner and structural fingerprint.

use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, RwLock,
  },
};

use log::debug;

use crate::{
  block::{fingerprint, Block},
  compiler::Compiler,
  thread::CompiledThread,
};

type Bucket = Vec<(Arc<[Block]>, Arc<CompiledThread>)>;

#[derive(Debug, Default)]
pub struct CompileCache {
  entries: RwLock<HashMap<(String, u64), Bucket>>,
  hits: AtomicUsize,
  misses: AtomicUsize,
}

impl CompileCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns the artifact compiled for these blocks and this owner,
  /// compiling it on first sight. Compilation happens under the write lock
  /// so a key is never compiled twice.
  pub fn get_or_compile(&self, blocks: &[Block], compiler: &Arc<Compiler>) -> Arc<CompiledThread> {
    let key = (compiler.owner().to_string(), fingerprint(blocks));
    if let Some(thread) = self.lookup(&key, blocks) {
      self.hits.fetch_add(1, Ordering::Relaxed);
      return thread;
    }
    let mut entries = self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    let bucket = entries.entry(key).or_default();
    if let Some((_, thread)) = bucket.iter().find(|(tree, _)| **tree == *blocks) {
      self.hits.fetch_add(1, Ordering::Relaxed);
      return Arc::clone(thread);
    }
    self.misses.fetch_add(1, Ordering::Relaxed);
    debug!("compiling a {}-block script for {}", blocks.len(), compiler.owner());
    let thread = Arc::new(compiler.compile_thread(blocks));
    bucket.push((Arc::from(blocks), Arc::clone(&thread)));
    thread
  }

  fn lookup(&self, key: &(String, u64), blocks: &[Block]) -> Option<Arc<CompiledThread>> {
    let entries = self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner());
    entries
      .get(key)?
      .iter()
      .find(|(tree, _)| **tree == *blocks)
      .map(|(_, thread)| Arc::clone(thread))
  }

  pub fn clear(&self) {
    self
      .entries
      .write()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .clear();
  }

  pub fn len(&self) -> usize {
    self
      .entries
      .read()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .values()
      .map(Vec::len)
      .sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn hits(&self) -> usize {
    self.hits.load(Ordering::Relaxed)
  }

  pub fn misses(&self) -> usize {
    self.misses.load(Ordering::Relaxed)
  }
}
