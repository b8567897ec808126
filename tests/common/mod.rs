//! Shared test harness: one-time V8 platform init plus a small isolate
//! bootstrap, modeled on `deno_core`'s own `serde_v8` test helper
//! (`v8_do`) and `runtime/tests/mod.rs`'s reliance on a single
//! process-wide engine initialization.

use std::sync::Once;

use jsg_modules::{
  isolate_registry::{
    dynamic_import_trampoline, import_meta_trampoline, static_resolve_trampoline,
    synthetic_evaluation_steps_trampoline, NodeCompatConfig,
  },
  observer::NoopObserver,
  url::ModuleSpecifier,
  ModuleRegistry,
};
use std::sync::Arc;

static V8_INIT: Once = Once::new();

/// Initializes the V8 platform exactly once for the whole test binary.
/// Safe to call from every test; subsequent calls are no-ops.
pub fn init_v8() {
  V8_INIT.call_once(|| {
    let platform = v8::new_default_platform(0, false).make_shared();
    v8::V8::initialize_platform(platform);
    v8::V8::initialize();
  });
}

/// Runs `body` with a fresh isolate and context wired up to `registry`:
/// the static-resolve, dynamic-import, and import.meta callbacks are all
/// installed before `body` runs.
pub fn with_isolate<R>(
  registry: Arc<ModuleRegistry>,
  body: impl for<'s> FnOnce(&mut v8::HandleScope<'s>, v8::Local<'s, v8::Context>) -> R,
) -> R {
  with_isolate_compat(registry, NodeCompatConfig::default(), body)
}

/// Like [`with_isolate`], but with an explicit Node-compat configuration.
pub fn with_isolate_compat<R>(
  registry: Arc<ModuleRegistry>,
  compat: NodeCompatConfig,
  body: impl for<'s> FnOnce(&mut v8::HandleScope<'s>, v8::Local<'s, v8::Context>) -> R,
) -> R {
  init_v8();
  let isolate = &mut v8::Isolate::new(v8::CreateParams::default());
  isolate.set_host_import_module_dynamically_callback(dynamic_import_trampoline);
  isolate.set_host_initialize_import_meta_object_callback(import_meta_trampoline);

  let handle_scope = &mut v8::HandleScope::new(isolate);
  let context = v8::Context::new(handle_scope);
  let scope = &mut v8::ContextScope::new(handle_scope, context);

  let bundle_base = ModuleSpecifier::try_parse("file:///main.js").unwrap();
  let _handle = registry.attach_to_isolate(
    scope,
    context,
    Arc::new(NoopObserver),
    None,
    compat,
    bundle_base,
  );

  body(scope, context)
}

/// Compiles and runs `source` as the entry ESM module at `specifier`,
/// returning its evaluation result (a settled promise's value).
pub fn run_entry<'s>(
  scope: &mut v8::HandleScope<'s>,
  specifier: &str,
  source: &str,
) -> Result<v8::Local<'s, v8::Value>, jsg_modules::ModuleError> {
  let code = v8::String::new(scope, source).unwrap();
  let name = v8::String::new(scope, specifier).unwrap();
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
    true,
    None,
  );
  let src = v8::script_compiler::Source::new(code, Some(&origin));
  let module = v8::script_compiler::compile_module(scope, src).expect("entry module compiles");

  let instantiated = module
    .instantiate_module(scope, static_resolve_trampoline)
    .unwrap_or(false);
  if !instantiated {
    let exc = scope.exception().expect("instantiation failure leaves a pending exception");
    let message = exc.to_rust_string_lossy(scope);
    return Err(jsg_modules::ModuleError::Js(jsg_modules::JsException::new(
      message, None,
    )));
  }

  let promise_value = module.evaluate(scope).expect("entry module evaluates");
  let promise = v8::Local::<v8::Promise>::try_from(promise_value).unwrap();
  scope.perform_microtask_checkpoint();

  match promise.state() {
    v8::PromiseState::Fulfilled => Ok(promise.result(scope)),
    v8::PromiseState::Rejected => {
      let result = promise.result(scope);
      let message = result.to_rust_string_lossy(scope);
      Err(jsg_modules::ModuleError::ModuleErrored(
        jsg_modules::JsException::new(message, None),
      ))
    }
    v8::PromiseState::Pending => panic!("entry module left a pending top-level await"),
  }
}

#[allow(unused)]
pub fn noop_synthetic_trampoline() -> v8::SyntheticModuleEvaluationSteps {
  synthetic_evaluation_steps_trampoline
}
