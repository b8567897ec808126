//! `IsolateModuleRegistry`: the per-engine-context binding.
//! Owns the live lookup cache of instantiated engine module objects,
//! installs engine callbacks, and implements `resolve`, `dynamicResolve`,
//! and `require`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::os::raw::c_void;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{ModuleError, ModuleResult};
use crate::flags::ModuleType;
use crate::module::{EvalCallback, Module};
use crate::observer::CompileObserver;
use crate::registry::ModuleRegistry;
use crate::resolve_context::{ResolveContext, ResolveSource};
use crate::url::ModuleSpecifier;

/// Well-known embedder data slot index used to recover the owning
/// `IsolateModuleRegistry` from an engine context.
pub const MODULE_REGISTRY_EMBEDDER_SLOT: u32 = 1;

/// Feature flags consumed from the host.
#[derive(Clone, Copy, Debug, Default)]
pub struct NodeCompatConfig {
  pub node_compat_enabled: bool,
  pub node_process_v2_enabled: bool,
}

/// `RETURN_EMPTY` option for `require`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequireOptions {
  pub return_empty: bool,
}

struct Entry {
  handle: v8::Global<v8::Module>,
  context_type: ModuleType,
  /// Pre-normalization specifier as seen by the engine, preserved because
  /// the same underlying `Module` may be exposed under multiple URL
  /// variants.
  specifier: ModuleSpecifier,
  module: Arc<Module>,
}

pub struct IsolateModuleRegistry {
  registry: Arc<ModuleRegistry>,
  observer: Arc<dyn CompileObserver>,
  eval_callback: Option<EvalCallback>,
  compat: NodeCompatConfig,
  bundle_base: ModuleSpecifier,
  entries: RefCell<Vec<Entry>>,
  /// Keyed by `Module::get_identity_hash()` — the one per-call-stable
  /// identity both source-text and synthetic module handles expose
  /// (`script_id()` is ESM-only and would leave synthetic modules
  /// unreachable from the evaluation trampoline).
  by_handle: RefCell<HashMap<i32, usize>>,
  by_type_specifier: RefCell<IndexMap<(ModuleType, ModuleSpecifier), usize>>,
  by_specifier: RefCell<IndexMap<ModuleSpecifier, usize>>,
}

impl IsolateModuleRegistry {
  fn new(
    registry: Arc<ModuleRegistry>,
    observer: Arc<dyn CompileObserver>,
    eval_callback: Option<EvalCallback>,
    compat: NodeCompatConfig,
    bundle_base: ModuleSpecifier,
  ) -> Self {
    Self {
      registry,
      observer,
      eval_callback,
      compat,
      bundle_base,
      entries: RefCell::new(Vec::new()),
      by_handle: RefCell::new(HashMap::new()),
      by_type_specifier: RefCell::new(IndexMap::new()),
      by_specifier: RefCell::new(IndexMap::new()),
    }
  }

  /// Recovers the registry bound to `context`'s isolate via the embedder
  /// data slot. Returns `None` if nothing was ever attached (e.g. a
  /// context created without going through `attach_to_isolate`).
  ///
  /// # Safety
  /// The pointer stored in the slot must have been produced by
  /// `attach_to_isolate` and the returned reference must not outlive the
  /// `IsolateModuleRegistryHandle` that owns it.
  pub unsafe fn from_context<'s>(
    scope: &mut v8::HandleScope<'s>,
    context: v8::Local<'s, v8::Context>,
  ) -> Option<&'s IsolateModuleRegistry> {
    let ptr = context.get_aligned_pointer_from_embedder_data(scope, MODULE_REGISTRY_EMBEDDER_SLOT as i32);
    if ptr.is_null() {
      return None;
    }
    Some(&*(ptr as *const IsolateModuleRegistry))
  }

  fn get_or_insert<'s>(
    &self,
    scope: &mut v8::HandleScope<'s>,
    context_type: ModuleType,
    specifier: ModuleSpecifier,
    module: Arc<Module>,
    trampoline: v8::SyntheticModuleEvaluationSteps,
  ) -> ModuleResult<v8::Local<'s, v8::Module>> {
    if let Some(&idx) = self
      .by_type_specifier
      .borrow()
      .get(&(context_type, specifier.clone()))
    {
      let handle = &self.entries.borrow()[idx].handle;
      return Ok(v8::Local::new(scope, handle));
    }

    let local = module.get_descriptor(scope, self.observer.as_ref(), trampoline)?;
    let global = v8::Global::new(scope, local);
    let identity_hash = local.get_identity_hash();

    let idx = {
      let mut entries = self.entries.borrow_mut();
      entries.push(Entry {
        handle: global,
        context_type,
        specifier: specifier.clone(),
        module,
      });
      entries.len() - 1
    };
    self.by_handle.borrow_mut().insert(identity_hash, idx);
    self
      .by_type_specifier
      .borrow_mut()
      .insert((context_type, specifier.clone()), idx);
    self.by_specifier.borrow_mut().insert(specifier, idx);

    Ok(local)
  }

  fn entry_module(&self, idx: usize) -> Arc<Module> {
    self.entries.borrow()[idx].module.clone()
  }

  fn entry_context_type(&self, idx: usize) -> ModuleType {
    self.entries.borrow()[idx].context_type
  }

  fn find_by_handle(&self, module: v8::Local<v8::Module>) -> Option<usize> {
    self.by_handle.borrow().get(&module.get_identity_hash()).copied()
  }

  fn find_by_type_specifier(&self, t: ModuleType, s: &ModuleSpecifier) -> Option<usize> {
    self.by_type_specifier.borrow().get(&(t, s.clone())).copied()
  }

  fn find_by_specifier(&self, s: &ModuleSpecifier) -> Option<usize> {
    self.by_specifier.borrow().get(s).copied()
  }

  /// Applies the Node-compat rewriting rules from step 3.
  /// Returns the possibly-rewritten raw specifier string and, if the
  /// rewrite forces a tier change, the overriding context type.
  fn apply_node_compat(&self, raw_specifier: &str, context_type: ModuleType) -> (String, ModuleType) {
    if !self.compat.node_compat_enabled {
      return (raw_specifier.to_string(), context_type);
    }
    if raw_specifier == "node:process" {
      let target = if self.compat.node_process_v2_enabled {
        "node-internal:public_process"
      } else {
        "node-internal:legacy_process"
      };
      return (target.to_string(), ModuleType::BuiltinOnly);
    }
    if let Some(bare) = raw_specifier.strip_prefix("node:") {
      // A real host consults its known-builtins table; we only rewrite
      // the bare-name shorthand form (`"fs"` -> `"node:fs"`) is handled by
      // the caller not stripping `node:` in the first place, so here we
      // simply pass through any `node:`-prefixed specifier unchanged
      // beyond the special-cased `node:process` above.
      let _ = bare;
    }
    (raw_specifier.to_string(), context_type)
  }

  /// §4.5.1 Static resolve callback body (import statement).
  pub fn resolve_static<'s>(
    &self,
    scope: &mut v8::HandleScope<'s>,
    raw_specifier: &str,
    has_attributes: bool,
    referrer: Option<v8::Local<v8::Module>>,
    trampoline: v8::SyntheticModuleEvaluationSteps,
  ) -> ModuleResult<v8::Local<'s, v8::Module>> {
    if has_attributes {
      return Err(ModuleError::UnsupportedAttributes);
    }

    let (referrer_type, referrer_specifier) = match referrer.and_then(|r| self.find_by_handle(r)) {
      Some(idx) => (self.entry_context_type(idx), self.entries.borrow()[idx].specifier.clone()),
      None => (ModuleType::Bundle, self.bundle_base.clone()),
    };

    let (rewritten, forced_type) = self.apply_node_compat(raw_specifier, referrer_type);

    let specifier = referrer_specifier
      .try_resolve(&rewritten)
      .map_err(|_| ModuleError::InvalidSpecifier(rewritten.clone()))?
      .normalize_path();

    let mut ctx = ResolveContext::new(
      forced_type,
      ResolveSource::StaticImport,
      specifier.clone(),
      referrer_specifier,
    );
    ctx.raw_specifier = Some(raw_specifier.to_string());

    let module = self
      .registry
      .resolve(&ctx)?
      .ok_or_else(|| ModuleError::NotFound(specifier.clone()))?;

    self.get_or_insert(scope, forced_type, specifier, module, trampoline)
  }

  /// §4.5.2 Dynamic import callback body. The caller wraps the `Result`
  /// into a rejected promise on `Err` — no exception escapes the engine
  /// from here.
  pub fn dynamic_import<'s>(
    &self,
    scope: &mut v8::HandleScope<'s>,
    raw_specifier: &str,
    has_attributes: bool,
    referrer_module: Option<v8::Local<v8::Module>>,
    resolve_callback: v8::ResolveModuleCallback,
    trampoline: v8::SyntheticModuleEvaluationSteps,
  ) -> ModuleResult<v8::Local<'s, v8::Value>> {
    if has_attributes {
      return Err(ModuleError::UnsupportedAttributes);
    }

    let idx = referrer_module
      .and_then(|r| self.find_by_handle(r))
      .ok_or_else(|| ModuleError::InvalidSpecifier("missing referrer".to_string()))?;
    let referrer_type = self.entry_context_type(idx);
    let referrer_specifier = self.entries.borrow()[idx].specifier.clone();

    let (rewritten, forced_type) = self.apply_node_compat(raw_specifier, referrer_type);
    let specifier = referrer_specifier
      .try_resolve(&rewritten)
      .map_err(|_| ModuleError::InvalidSpecifier(rewritten.clone()))?
      .normalize_path();

    let mut ctx = ResolveContext::new(
      forced_type,
      ResolveSource::DynamicImport,
      specifier.clone(),
      referrer_specifier,
    );
    ctx.raw_specifier = Some(raw_specifier.to_string());

    let resolved = self
      .registry
      .resolve(&ctx)?
      .ok_or_else(|| ModuleError::NotFound(specifier.clone()))?;

    let module = self.get_or_insert(scope, forced_type, specifier.clone(), resolved, trampoline)?;
    let value = self.evaluate_entry(scope, forced_type, &specifier, module, resolve_callback)?;
    self.namespace_object(scope, module, value)
  }

  /// §4.5.3 import.meta initialization. A pure function of `url` and the
  /// argument passed to `resolve` — no registry state is consulted.
  pub fn init_import_meta<'s>(
    &self,
    scope: &mut v8::HandleScope<'s>,
    module: v8::Local<v8::Module>,
    meta: v8::Local<v8::Object>,
  ) {
    let idx = match self.find_by_handle(module) {
      Some(idx) => idx,
      None => return,
    };
    let target = self.entry_module(idx);
    let url = self.entries.borrow()[idx].specifier.clone();

    let main_key = v8::String::new(scope, "main").unwrap();
    let main_val = v8::Boolean::new(scope, target.flags().is_main());
    meta.set(scope, main_key.into(), main_val.into());

    let url_key = v8::String::new(scope, "url").unwrap();
    let url_val = v8::String::new(scope, url.as_str()).unwrap();
    meta.set(scope, url_key.into(), url_val.into());

    let resolve_key = v8::String::new(scope, "resolve").unwrap();
    let base = url.clone();
    let resolve_fn = v8::Function::new(scope, move |scope, args, mut rv| {
      let specifier = match args.get(0).to_rust_string_lossy(scope) {
        s if !s.is_empty() => s,
        _ => return,
      };
      match base.try_resolve(&specifier) {
        Ok(resolved) => {
          let resolved = resolved.normalize_path();
          rv.set(v8::String::new(scope, resolved.as_str()).unwrap().into());
        }
        Err(_) => rv.set(v8::null(scope).into()),
      }
    })
    .unwrap();
    meta.set(scope, resolve_key.into(), resolve_fn.into());
  }

  fn evaluate_entry<'s>(
    &self,
    scope: &mut v8::HandleScope<'s>,
    context_type: ModuleType,
    specifier: &ModuleSpecifier,
    module: v8::Local<'s, v8::Module>,
    resolve_callback: v8::ResolveModuleCallback,
  ) -> ModuleResult<v8::Local<'s, v8::Value>> {
    let idx = self
      .find_by_type_specifier(context_type, specifier)
      .ok_or(ModuleError::EntryNotFound)?;
    let target = self.entry_module(idx);
    target.evaluate(
      scope,
      module,
      self.observer.as_ref(),
      self.eval_callback.as_ref(),
      resolve_callback,
    )
  }

  fn namespace_object<'s>(
    &self,
    scope: &mut v8::HandleScope<'s>,
    module: v8::Local<'s, v8::Module>,
    _evaluate_result: v8::Local<'s, v8::Value>,
  ) -> ModuleResult<v8::Local<'s, v8::Value>> {
    Ok(module.get_module_namespace(scope))
  }

  /// §4.5.4 Synchronous `require`.
  pub fn require<'s>(
    &self,
    scope: &mut v8::HandleScope<'s>,
    raw_specifier: &str,
    referrer: ModuleSpecifier,
    context_type: ModuleType,
    resolve_callback: v8::ResolveModuleCallback,
    trampoline: v8::SyntheticModuleEvaluationSteps,
    options: RequireOptions,
  ) -> ModuleResult<Option<v8::Local<'s, v8::Value>>> {
    let specifier = referrer
      .try_resolve(raw_specifier)
      .map_err(|_| ModuleError::InvalidSpecifier(raw_specifier.to_string()))?
      .normalize_path();

    let mut ctx = ResolveContext::new(context_type, ResolveSource::Require, specifier.clone(), referrer);
    ctx.raw_specifier = Some(raw_specifier.to_string());

    let resolved = match self.registry.resolve(&ctx)? {
      Some(m) => m,
      None => {
        if options.return_empty {
          return Ok(None);
        }
        return Err(ModuleError::NotFound(specifier));
      }
    };
    let is_esm = matches!(*resolved, Module::Esm(_));

    let module = self.get_or_insert(scope, context_type, specifier.clone(), resolved, trampoline)?;

    use v8::ModuleStatus::*;
    match module.get_status() {
      Errored => {
        let exc = module.get_exception();
        let message = exc.to_rust_string_lossy(scope);
        let global = v8::Global::new(scope, exc);
        return Err(crate::error::JsException::new(message, Some(global)).into());
      }
      Evaluating if is_esm => return Err(ModuleError::Circular),
      Evaluating => return Ok(Some(module.get_module_namespace(scope))),
      Evaluated => return Ok(Some(module.get_module_namespace(scope))),
      _ => {}
    }

    let promise_value = self.evaluate_entry(scope, context_type, &specifier, module, resolve_callback)?;
    let promise = v8::Local::<v8::Promise>::try_from(promise_value)
      .map_err(|_| ModuleError::EntryNotFound)?;

    // Drain the microtask queue exactly once: this
    // is the only supported form of top-level await in `require`.
    scope.perform_microtask_checkpoint();

    match promise.state() {
      v8::PromiseState::Fulfilled => Ok(Some(module.get_module_namespace(scope))),
      v8::PromiseState::Rejected => {
        let result = promise.result(scope);
        let message = result.to_rust_string_lossy(scope);
        let global = v8::Global::new(scope, result);
        Err(crate::error::JsException::new(message, Some(global)).into())
      }
      v8::PromiseState::Pending => Err(ModuleError::SyncTla(specifier)),
    }
  }
}

/// `v8::ResolveModuleCallback` trampoline. V8 requires a bare function
/// pointer here, so state cannot be closed over: the owning registry is
/// recovered from the context's embedder data slot on every call.
pub extern "C" fn static_resolve_trampoline<'s>(
  context: v8::Local<'s, v8::Context>,
  specifier: v8::Local<'s, v8::String>,
  import_attributes: v8::Local<'s, v8::FixedArray>,
  referrer: v8::Local<'s, v8::Module>,
) -> Option<v8::Local<'s, v8::Module>> {
  let scope = &mut unsafe { v8::CallbackScope::new(context) };
  let registry = unsafe { IsolateModuleRegistry::from_context(scope, context) }?;
  let specifier_str = specifier.to_rust_string_lossy(scope);
  let has_attributes = import_attributes.length() > 0;
  registry
    .resolve_static(
      scope,
      &specifier_str,
      has_attributes,
      Some(referrer),
      synthetic_evaluation_steps_trampoline,
    )
    .ok()
}

/// `v8::SyntheticModuleEvaluationSteps` trampoline, installed on every
/// synthetic module descriptor at creation time (see
/// `SyntheticModule::get_descriptor`). Same bare-function-pointer
/// constraint as `static_resolve_trampoline`.
pub extern "C" fn synthetic_evaluation_steps_trampoline<'a>(
  context: v8::Local<'a, v8::Context>,
  module: v8::Local<v8::Module>,
) -> *mut v8::Value {
  let scope = &mut unsafe { v8::CallbackScope::new(context) };
  let mut scope = v8::EscapableHandleScope::new(scope);
  let registry = match unsafe { IsolateModuleRegistry::from_context(&mut scope, context) } {
    Some(r) => r,
    None => return std::ptr::null_mut(),
  };
  let idx = match registry.find_by_handle(module) {
    Some(idx) => idx,
    None => return std::ptr::null_mut(),
  };
  let target = registry.entry_module(idx);
  let result = match target.as_ref() {
    Module::Synthetic(s) => s.actually_evaluate(&mut scope, module, registry.observer.as_ref()),
    Module::Esm(_) => return std::ptr::null_mut(),
  };
  match result {
    Ok(value) => {
      let escaped = scope.escape(value);
      &*escaped as *const v8::Value as *mut v8::Value
    }
    Err(_) => std::ptr::null_mut(),
  }
}

/// `v8::HostImportModuleDynamicallyCallback` trampoline: wraps
/// `IsolateModuleRegistry::dynamic_import`'s result in a settled promise so
/// no exception ever escapes the engine from here (`import()` always
/// settles, never throws synchronously).
pub extern "C" fn dynamic_import_trampoline<'s>(
  context: v8::Local<'s, v8::Context>,
  _host_defined_options: v8::Local<'s, v8::Data>,
  resource_name: v8::Local<'s, v8::Value>,
  specifier: v8::Local<'s, v8::String>,
  import_attributes: v8::Local<'s, v8::FixedArray>,
) -> Option<v8::Local<'s, v8::Promise>> {
  let scope = &mut unsafe { v8::CallbackScope::new(context) };
  let registry = unsafe { IsolateModuleRegistry::from_context(scope, context) }?;

  let resolver = v8::PromiseResolver::new(scope)?;
  let promise = resolver.get_promise(scope);

  let referrer_specifier = resource_name.to_rust_string_lossy(scope);
  let referrer_module = crate::url::ModuleSpecifier::try_parse(&referrer_specifier)
    .ok()
    .and_then(|s| registry.find_by_specifier(&s))
    .map(|idx| {
      let handle = &registry.entries.borrow()[idx].handle;
      v8::Local::new(scope, handle)
    });

  let specifier_str = specifier.to_rust_string_lossy(scope);
  let has_attributes = import_attributes.length() > 0;

  match registry.dynamic_import(
    scope,
    &specifier_str,
    has_attributes,
    referrer_module,
    static_resolve_trampoline,
    synthetic_evaluation_steps_trampoline,
  ) {
    Ok(value) => {
      resolver.resolve(scope, value);
    }
    Err(err) => {
      let message = v8::String::new(scope, &err.to_string()).unwrap();
      let exception = v8::Exception::error(scope, message);
      resolver.reject(scope, exception);
    }
  }

  Some(promise)
}

/// `v8::HostInitializeImportMetaObjectCallback` trampoline.
pub extern "C" fn import_meta_trampoline(
  context: v8::Local<v8::Context>,
  module: v8::Local<v8::Module>,
  meta: v8::Local<v8::Object>,
) {
  let scope = &mut unsafe { v8::CallbackScope::new(context) };
  if let Some(registry) = unsafe { IsolateModuleRegistry::from_context(scope, context) } {
    registry.init_import_meta(scope, module, meta);
  }
}

/// Owning handle returned by `attach_to_isolate`. Dropping it frees the
/// `IsolateModuleRegistry` and clears the embedder data slot is the
/// caller's responsibility (the context itself may already be gone by the
/// time this drops).
pub struct IsolateModuleRegistryHandle {
  ptr: *mut IsolateModuleRegistry,
}

impl IsolateModuleRegistryHandle {
  pub fn registry(&self) -> &IsolateModuleRegistry {
    unsafe { &*self.ptr }
  }
}

impl Drop for IsolateModuleRegistryHandle {
  fn drop(&mut self) {
    unsafe {
      drop(Box::from_raw(self.ptr));
    }
  }
}

impl ModuleRegistry {
  /// Installs the isolate binding: creates an `IsolateModuleRegistry`,
  /// stashes a pointer to it in the well-known embedder data slot, and
  /// returns an owning handle whose drop destroys it.
  ///
  /// Engine callback registration (static resolve, dynamic import,
  /// import.meta init, synthetic evaluation steps) is the caller's
  /// responsibility immediately after this returns: this crate does not
  /// assume a particular `v8::Isolate` construction sequence, only that
  /// `context`'s embedder data slot `MODULE_REGISTRY_EMBEDDER_SLOT` is
  /// free.
  pub fn attach_to_isolate(
    self: &Arc<Self>,
    scope: &mut v8::HandleScope,
    context: v8::Local<v8::Context>,
    observer: Arc<dyn CompileObserver>,
    eval_callback: Option<EvalCallback>,
    compat: NodeCompatConfig,
    bundle_base: ModuleSpecifier,
  ) -> IsolateModuleRegistryHandle {
    let inner = IsolateModuleRegistry::new(self.clone(), observer, eval_callback, compat, bundle_base);
    let boxed = Box::new(inner);
    let ptr = Box::into_raw(boxed);
    context.set_aligned_pointer_in_embedder_data(
      scope,
      MODULE_REGISTRY_EMBEDDER_SLOT as i32,
      ptr as *mut c_void,
    );
    IsolateModuleRegistryHandle { ptr }
  }
}
