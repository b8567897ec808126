//! `ModuleNamespace`: the short-lived view an
//! `EvaluateCallback` gets to populate a synthetic module's exports.

use crate::error::{ModuleError, ModuleResult};

/// Passed to a `SyntheticModule`'s evaluation callback. Wraps the engine
/// module handle plus the declared export set, so `set` can reject an
/// undeclared name the way `v8::Module::set_synthetic_module_export`
/// rejects a name that wasn't in `export_names` at creation time.
pub struct ModuleNamespace<'s> {
  module: v8::Local<'s, v8::Module>,
  named_exports: &'s [String],
}

impl<'s> ModuleNamespace<'s> {
  pub fn new(module: v8::Local<'s, v8::Module>, named_exports: &'s [String]) -> Self {
    Self {
      module,
      named_exports,
    }
  }

  pub fn module(&self) -> v8::Local<'s, v8::Module> {
    self.module
  }

  fn is_declared(&self, name: &str) -> bool {
    name == "default" || self.named_exports.iter().any(|e| e == name)
  }

  /// Sets the named export `name` to `value`. `name` must be `"default"` or
  /// a name passed in `named_exports` at descriptor-creation time.
  pub fn set(
    &mut self,
    scope: &mut v8::HandleScope<'s>,
    name: &str,
    value: v8::Local<'s, v8::Value>,
  ) -> ModuleResult<()> {
    if !self.is_declared(name) {
      return Err(ModuleError::EntryNotFound);
    }
    let key = v8::String::new(scope, name).unwrap();
    self
      .module
      .set_synthetic_module_export(scope, key, value)
      .ok_or(ModuleError::EntryNotFound)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn is_declared_always_allows_default() {
    let exports = vec!["x".to_string()];
    // Can't construct a real Local<Module> without an isolate here; this
    // only exercises the pure name-matching helper.
    struct Probe<'a>(&'a [String]);
    impl<'a> Probe<'a> {
      fn is_declared(&self, name: &str) -> bool {
        name == "default" || self.0.iter().any(|e| e == name)
      }
    }
    let probe = Probe(&exports);
    assert!(probe.is_declared("default"));
    assert!(probe.is_declared("x"));
    assert!(!probe.is_declared("y"));
  }
}
