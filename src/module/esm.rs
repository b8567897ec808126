//! `EsModule`: a source-text module compiled and
//! executed by the engine.

use std::sync::Arc;

use crate::error::{JsException, ModuleError, ModuleResult};
use crate::flags::{ModuleFlags, ModuleType};
use crate::observer::CompileObserver;
use crate::resolve_context::ResolveContext;
use crate::url::ModuleSpecifier;

use super::compile_cache::CompileCache;

/// A source-text (ESM) module.
///
/// `source` is reference-counted rather than `&'static` so a
/// `StaticModuleBundle` built at runtime from e.g. a manifest can hand out
/// modules whose source lives in a bundle-level arena without copying it
/// per module, the Rust-safe analogue of "points into a
/// bundle-level arena or the static binary".
pub struct EsModule {
  pub specifier: ModuleSpecifier,
  pub module_type: ModuleType,
  pub flags: ModuleFlags,
  pub source: Arc<[u8]>,
  cache: CompileCache,
}

impl EsModule {
  /// ESM modules always carry the EVAL flag.
  pub fn new(
    specifier: ModuleSpecifier,
    module_type: ModuleType,
    mut flags: ModuleFlags,
    source: impl Into<Arc<[u8]>>,
  ) -> Self {
    flags = flags | ModuleFlags::ESM | ModuleFlags::EVAL;
    Self {
      specifier,
      module_type,
      flags,
      source: source.into(),
      cache: CompileCache::new(),
    }
  }

  pub fn evaluate_context(&self, ctx: &ResolveContext) -> bool {
    ctx.specifier == self.specifier
  }

  /// Compiles the module's source. When cached bytecode is on hand,
  /// consumes it via `compile_module2` and checks `CachedData::rejected()`
  /// to tell a real cache hit from a silent recompile-from-source; either
  /// way a cold/rejected compile regenerates and stores fresh bytecode.
  pub fn get_descriptor<'s>(
    &self,
    scope: &mut v8::HandleScope<'s>,
    observer: &dyn CompileObserver,
  ) -> ModuleResult<v8::Local<'s, v8::Module>> {
    let source_str = std::str::from_utf8(&self.source)
      .map_err(|_| ModuleError::InvalidSpecifier(self.specifier.to_string()))?;
    let code = v8::String::new(scope, source_str).unwrap();
    let name = v8::String::new(scope, self.specifier.as_str()).unwrap();
    let origin = v8::ScriptOrigin::new(
      scope,
      name.into(),
      0,
      0,
      false,
      0,
      None,
      false,
      false,
      true, // is_module
      None,
    );

    let module = if let Some(bytes) = self.cache.try_read() {
      let cached = v8::script_compiler::CachedData::new(&bytes);
      let mut source = v8::script_compiler::Source::new_with_cached_data(code, Some(&origin), cached);
      let result = v8::script_compiler::compile_module2(
        scope,
        &mut source,
        v8::script_compiler::CompileOptions::ConsumeCodeCache,
        v8::script_compiler::NoCacheReason::NoReason,
      );
      let rejected = source
        .get_cached_data()
        .map(|d| d.rejected())
        .unwrap_or(true);
      drop(bytes);

      match result {
        Some(m) if !rejected => {
          observer.cache_hit(&self.specifier);
          m
        }
        Some(m) => {
          // V8 consumed the call but reports the bytecode as stale for this
          // isolate: the module still compiled (from source), but the cache
          // entry itself must be regenerated.
          self.cache.discard(&self.specifier, observer);
          observer.cache_miss(&self.specifier);
          self.maybe_store_cache(scope, m, observer);
          m
        }
        None => {
          self.cache.discard(&self.specifier, observer);
          observer.cache_miss(&self.specifier);
          let source = v8::script_compiler::Source::new(code, Some(&origin));
          let compiled = v8::script_compiler::compile_module(scope, source)
            .ok_or_else(|| self.pending_exception(scope))?;
          self.maybe_store_cache(scope, compiled, observer);
          compiled
        }
      }
    } else {
      let source = v8::script_compiler::Source::new(code, Some(&origin));
      let compiled = v8::script_compiler::compile_module(scope, source)
        .ok_or_else(|| self.pending_exception(scope))?;
      self.maybe_store_cache(scope, compiled, observer);
      compiled
    };

    observer.found(&self.specifier);
    Ok(module)
  }

  fn maybe_store_cache<'s>(
    &self,
    scope: &mut v8::HandleScope<'s>,
    module: v8::Local<'s, v8::Module>,
    observer: &dyn CompileObserver,
  ) {
    if self.cache.try_read().is_some() {
      return;
    }
    let unbound = module.get_unbound_module_script(scope);
    match unbound.create_code_cache() {
      Some(data) => {
        self.cache.store_if_empty(&self.specifier, observer, data.to_vec().into_boxed_slice())
      }
      None => observer.cache_generate_failed(&self.specifier, "create_code_cache returned None"),
    }
  }

  pub(super) fn pending_exception(&self, scope: &mut v8::HandleScope<'_>) -> ModuleError {
    let exc = scope.exception();
    let message = exc
      .map(|v| v.to_rust_string_lossy(scope))
      .unwrap_or_else(|| "compile failed".to_string());
    let global = exc.map(|v| v8::Global::new(scope, v));
    JsException::new(message, global).into()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn new_forces_esm_and_eval_flags() {
    let spec = ModuleSpecifier::try_parse("file:///a.js").unwrap();
    let m = EsModule::new(
      spec.clone(),
      ModuleType::Bundle,
      ModuleFlags::NONE,
      b"1".to_vec(),
    );
    assert!(m.flags.is_esm());
    assert!(m.flags.is_eval());
  }

  #[test]
  fn evaluate_context_matches_exact_specifier() {
    let spec = ModuleSpecifier::try_parse("file:///a.js").unwrap();
    let other = ModuleSpecifier::try_parse("file:///b.js").unwrap();
    let m = EsModule::new(spec.clone(), ModuleType::Bundle, ModuleFlags::NONE, b"1".to_vec());
    let ctx_match = ResolveContext::new(
      ModuleType::Bundle,
      crate::resolve_context::ResolveSource::Require,
      spec.clone(),
      spec.clone(),
    );
    let ctx_miss = ctx_match.with_specifier(other);
    assert!(m.evaluate_context(&ctx_match));
    assert!(!m.evaluate_context(&ctx_miss));
  }
}
