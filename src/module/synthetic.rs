//! `SyntheticModule`: a host-synthesized module whose
//! exports are installed by a callback rather than parsed from source.

use std::sync::Arc;

use crate::error::{ModuleError, ModuleResult};
use crate::flags::{ModuleFlags, ModuleType};
use crate::observer::CompileObserver;
use crate::resolve_context::ResolveContext;
use crate::url::ModuleSpecifier;

use super::namespace::ModuleNamespace;

/// Installed at descriptor-creation time; invoked from the evaluation
/// trampoline (see `isolate_registry.rs`) with a fresh `ModuleNamespace`.
/// Must be idempotent and thread-safe: it may run
/// concurrently across isolates and once per context per isolate.
pub type EvaluateCallback = Arc<
  dyn for<'s> Fn(
      &mut v8::HandleScope<'s>,
      &ModuleSpecifier,
      &mut ModuleNamespace<'s>,
      &dyn CompileObserver,
    ) -> bool
    + Send
    + Sync,
>;

pub struct SyntheticModule {
  pub specifier: ModuleSpecifier,
  pub module_type: ModuleType,
  pub flags: ModuleFlags,
  pub named_exports: Vec<String>,
  pub evaluate: EvaluateCallback,
}

impl SyntheticModule {
  /// Synthetic modules never carry ESM or MAIN.
  pub fn new(
    specifier: ModuleSpecifier,
    module_type: ModuleType,
    flags: ModuleFlags,
    named_exports: Vec<String>,
    evaluate: EvaluateCallback,
  ) -> Self {
    debug_assert!(!flags.is_esm() && !flags.is_main());
    Self {
      specifier,
      module_type,
      flags,
      named_exports,
      evaluate,
    }
  }

  pub fn evaluate_context(&self, ctx: &ResolveContext) -> bool {
    ctx.specifier == self.specifier
  }

  pub fn get_descriptor<'s>(
    &self,
    scope: &mut v8::HandleScope<'s>,
    trampoline: v8::SyntheticModuleEvaluationSteps,
  ) -> ModuleResult<v8::Local<'s, v8::Module>> {
    let name = v8::String::new(scope, self.specifier.as_str()).unwrap();
    let mut export_names: Vec<v8::Local<v8::String>> = self
      .named_exports
      .iter()
      .filter(|n| n.as_str() != "default")
      .map(|n| v8::String::new(scope, n).unwrap())
      .collect();
    let default_key = v8::String::new(scope, "default").unwrap();
    export_names.push(default_key);

    Ok(v8::Module::create_synthetic_module(
      scope,
      name,
      &export_names,
      trampoline,
    ))
  }

  /// Runs this module's evaluation: a pending promise is created, the
  /// callback populates the namespace, and the promise resolves to
  /// `undefined` on success.
  pub fn actually_evaluate<'s>(
    &self,
    scope: &mut v8::HandleScope<'s>,
    module: v8::Local<'s, v8::Module>,
    observer: &dyn CompileObserver,
  ) -> ModuleResult<v8::Local<'s, v8::Value>> {
    let resolver = v8::PromiseResolver::new(scope).ok_or(ModuleError::EntryNotFound)?;
    let mut namespace = ModuleNamespace::new(module, &self.named_exports);

    let ok = (self.evaluate)(scope, &self.specifier, &mut namespace, observer);
    if !ok {
      // An exception is already scheduled on the isolate by contract.
      let exc = scope.exception();
      let message = exc
        .map(|v| v.to_rust_string_lossy(scope))
        .unwrap_or_else(|| "synthetic module evaluation failed".to_string());
      let global = exc.map(|v| v8::Global::new(scope, v));
      return Err(crate::error::JsException::new(message, global).into());
    }

    let undefined = v8::undefined(scope);
    resolver.resolve(scope, undefined.into());
    Ok(resolver.get_promise(scope).into())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn never_carries_esm_or_main() {
    let spec = ModuleSpecifier::try_parse("virtual:a").unwrap();
    let cb: EvaluateCallback = Arc::new(|_, _, _, _| true);
    let m = SyntheticModule::new(
      spec,
      ModuleType::Fallback,
      ModuleFlags::EVAL,
      vec!["x".into()],
      cb,
    );
    assert!(!m.flags.is_esm());
    assert!(!m.flags.is_main());
  }
}
