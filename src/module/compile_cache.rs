//! Thread-safe compile cache for a single `EsModule`.
//!
//! Read-write guard pattern: shared access for the common
//! "do we have cached bytecode" read, exclusive access (with a
//! double-check) for the post-compile write. Grounded on `deno_core`'s use
//! of `parking_lot::RwLock` for its module map's compiled-code slots.

use parking_lot::RwLock;

use crate::observer::CompileObserver;
use crate::url::ModuleSpecifier;

/// Owns the (optional) compiled bytecode for one `EsModule`. Borrowable
/// across threads without copying: the buffer is only ever replaced, never
/// mutated in place, so a `v8::ScriptCompiler::CachedData` view can borrow
/// the read guard's contents for the duration of a compile call.
#[derive(Default)]
pub struct CompileCache(RwLock<Option<Box<[u8]>>>);

impl CompileCache {
  pub fn new() -> Self {
    Self(RwLock::new(None))
  }

  /// Read path: hand back a clone-free view of the cached bytes, if any.
  /// Compatibility with the target isolate is decided by the caller (the
  /// engine, via `CachedData::rejected()`), not here.
  pub fn try_read(&self) -> Option<parking_lot::MappedRwLockReadGuard<'_, [u8]>> {
    let guard = self.0.read();
    if guard.is_none() {
      return None;
    }
    Some(parking_lot::RwLockReadGuard::map(guard, |o| {
      o.as_deref().unwrap()
    }))
  }

  /// Post-compile write path. Discards the write if another thread beat us
  /// to it.
  pub fn store_if_empty(
    &self,
    specifier: &ModuleSpecifier,
    observer: &dyn CompileObserver,
    bytes: Box<[u8]>,
  ) {
    let mut guard = self.0.write();
    if guard.is_some() {
      return;
    }
    *guard = Some(bytes);
    observer.cache_generated(specifier);
  }

  /// Discards a cached entry the engine rejected as incompatible with the
  /// current isolate (invariant 6). Recompilation proceeds with no cache.
  pub fn discard(&self, specifier: &ModuleSpecifier, observer: &dyn CompileObserver) {
    let mut guard = self.0.write();
    if guard.take().is_some() {
      observer.cache_rejected(specifier);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::observer::NoopObserver;

  #[test]
  fn double_write_keeps_first() {
    let cache = CompileCache::new();
    let spec = ModuleSpecifier::try_parse("file:///a.js").unwrap();
    cache.store_if_empty(&spec, &NoopObserver, vec![1, 2, 3].into_boxed_slice());
    cache.store_if_empty(&spec, &NoopObserver, vec![9, 9].into_boxed_slice());
    assert_eq!(&*cache.try_read().unwrap(), &[1, 2, 3]);
  }

  #[test]
  fn discard_clears_slot() {
    let cache = CompileCache::new();
    let spec = ModuleSpecifier::try_parse("file:///a.js").unwrap();
    cache.store_if_empty(&spec, &NoopObserver, vec![1].into_boxed_slice());
    cache.discard(&spec, &NoopObserver);
    assert!(cache.try_read().is_none());
  }
}
