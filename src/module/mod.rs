//! `Module`: a tagged variant of {ESM, Synthetic} rather
//! than an inheritance hierarchy, dispatching
//! `getDescriptor`/`instantiate`/`evaluate` by matching on the variant.

pub mod compile_cache;
pub mod esm;
pub mod namespace;
pub mod synthetic;

use std::sync::Arc;

use crate::error::{JsException, ModuleError, ModuleResult};
use crate::flags::{ModuleFlags, ModuleType};
use crate::observer::CompileObserver;
use crate::resolve_context::ResolveContext;
use crate::url::ModuleSpecifier;

pub use esm::EsModule;
pub use namespace::ModuleNamespace;
pub use synthetic::{EvaluateCallback, SyntheticModule};

/// Delegates to the host when ESM (always) or a synthetic module with the
/// EVAL flag is evaluated. The result is wrapped as a
/// resolved promise by the caller.
pub type EvalCallback = Arc<
  dyn for<'s> Fn(&mut v8::HandleScope<'s>, &ModuleSpecifier) -> ModuleResult<v8::Local<'s, v8::Value>>
    + Send
    + Sync,
>;

pub enum Module {
  Esm(EsModule),
  Synthetic(SyntheticModule),
}

impl Module {
  pub fn specifier(&self) -> &ModuleSpecifier {
    match self {
      Module::Esm(m) => &m.specifier,
      Module::Synthetic(m) => &m.specifier,
    }
  }

  pub fn module_type(&self) -> ModuleType {
    match self {
      Module::Esm(m) => m.module_type,
      Module::Synthetic(m) => m.module_type,
    }
  }

  pub fn flags(&self) -> ModuleFlags {
    match self {
      Module::Esm(m) => m.flags,
      Module::Synthetic(m) => m.flags,
    }
  }

  /// Late check that this module is willing to serve `ctx`. Default
  /// accepts iff the specifier matches exactly.
  pub fn evaluate_context(&self, ctx: &ResolveContext) -> bool {
    match self {
      Module::Esm(m) => m.evaluate_context(ctx),
      Module::Synthetic(m) => m.evaluate_context(ctx),
    }
  }

  pub fn get_descriptor<'s>(
    &self,
    scope: &mut v8::HandleScope<'s>,
    observer: &dyn CompileObserver,
    synthetic_trampoline: v8::SyntheticModuleEvaluationSteps,
  ) -> ModuleResult<v8::Local<'s, v8::Module>> {
    match self {
      Module::Esm(m) => m.get_descriptor(scope, observer),
      Module::Synthetic(m) => m.get_descriptor(scope, synthetic_trampoline),
    }
  }

  /// If already past `Uninstantiated`, a no-op success. Otherwise invokes
  /// engine instantiation passing the fixed static-resolve trampoline
  ///. The trampoline itself is a stateless `extern "C" fn`
  /// registered once per isolate (see `isolate_registry.rs`); it recovers
  /// the owning `IsolateModuleRegistry` from embedder data rather than
  /// closing over any state, because V8's `ResolveModuleCallback` is a
  /// bare function pointer.
  pub fn instantiate(
    &self,
    scope: &mut v8::HandleScope<'_>,
    mut module: v8::Local<v8::Module>,
    resolve_callback: v8::ResolveModuleCallback,
  ) -> ModuleResult<bool> {
    use v8::ModuleStatus::*;
    if !matches!(module.get_status(), Uninstantiated) {
      return Ok(true);
    }
    match module.instantiate_module(scope, resolve_callback) {
      Some(ok) => Ok(ok),
      None => Err(pending_exception(scope)),
    }
  }

  /// Ensures instantiation, then either defers to the host `EvalCallback`
  /// (ESM always qualifies; a synthetic module only if it carries the EVAL
  /// flag) wrapping its result as a resolved promise, or runs the
  /// variant's own evaluation procedure.
  pub fn evaluate<'s>(
    &self,
    scope: &mut v8::HandleScope<'s>,
    module: v8::Local<'s, v8::Module>,
    observer: &dyn CompileObserver,
    eval_callback: Option<&EvalCallback>,
    resolve_callback: v8::ResolveModuleCallback,
  ) -> ModuleResult<v8::Local<'s, v8::Value>> {
    if !self.instantiate(scope, module, resolve_callback)? {
      return Err(pending_exception(scope));
    }

    let delegate_to_host = matches!(self, Module::Esm(_))
      || matches!(self, Module::Synthetic(m) if m.flags.is_eval());

    if delegate_to_host {
      if let Some(cb) = eval_callback {
        let value = cb(scope, self.specifier())?;
        let resolver = v8::PromiseResolver::new(scope).ok_or(ModuleError::EntryNotFound)?;
        resolver.resolve(scope, value);
        return Ok(resolver.get_promise(scope).into());
      }
    }

    match self {
      Module::Esm(_) => module
        .evaluate(scope)
        .ok_or_else(|| pending_exception(scope)),
      Module::Synthetic(m) => m.actually_evaluate(scope, module, observer),
    }
  }
}

fn pending_exception(scope: &mut v8::HandleScope<'_>) -> ModuleError {
  let exc = scope.exception();
  let message = exc
    .map(|v| v.to_rust_string_lossy(scope))
    .unwrap_or_else(|| "module operation failed".to_string());
  let global = exc.map(|v| v8::Global::new(scope, v));
  JsException::new(message, global).into()
}
