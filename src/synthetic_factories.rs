//! Out-of-the-box synthetic module factories (text, data, JSON, Wasm).
//! Each returns a `Module::Synthetic` usable directly as a
//! `StaticModuleBundle`/`BuiltinModuleBundle` factory closure. Grounded in
//! `deno_core`'s `serde_v8` byte-slice-to-`ArrayBuffer` plumbing for the
//! data factory and its `ops/webstorage`/`canon` pattern of a single
//! `default`-only synthetic export for opaque blobs.

use std::sync::{Arc, OnceLock};

use crate::flags::{ModuleFlags, ModuleType};
use crate::module::{EvaluateCallback, Module, SyntheticModule};
use crate::observer::CompileObserver;
use crate::url::ModuleSpecifier;

/// `import text from "..."` — the file's contents decoded as UTF-8 and
/// exposed as the default export.
pub fn text_factory(specifier: ModuleSpecifier, module_type: ModuleType, contents: Arc<str>) -> Module {
  let evaluate: EvaluateCallback = Arc::new(move |scope, _specifier, namespace, _observer| {
    let value = v8::String::new(scope, &contents).unwrap();
    namespace.set(scope, "default", value.into()).is_ok()
  });
  Module::Synthetic(SyntheticModule::new(
    specifier,
    module_type,
    ModuleFlags::NONE,
    vec!["default".to_string()],
    evaluate,
  ))
}

/// `import bytes from "..." with { type: "bytes" }` — raw bytes exposed as
/// a V8 `ArrayBuffer` default export, copied once into engine-owned memory.
pub fn data_factory(specifier: ModuleSpecifier, module_type: ModuleType, contents: Arc<[u8]>) -> Module {
  let evaluate: EvaluateCallback = Arc::new(move |scope, _specifier, namespace, _observer| {
    let store = v8::ArrayBuffer::new_backing_store_from_vec(contents.to_vec()).make_shared();
    let buffer = v8::ArrayBuffer::with_backing_store(scope, &store);
    namespace.set(scope, "default", buffer.into()).is_ok()
  });
  Module::Synthetic(SyntheticModule::new(
    specifier,
    module_type,
    ModuleFlags::NONE,
    vec!["default".to_string()],
    evaluate,
  ))
}

/// `import data from "..." with { type: "json" }` — validated with
/// `serde_json` at evaluation time, then handed to the isolate via
/// `v8::json::parse` (re-serializing rather than walking a `serde_json::Value`
/// into individual `v8::Local`s, the simplest of the two routes `deno_core`'s
/// `serde_v8` supports).
pub fn json_factory(specifier: ModuleSpecifier, module_type: ModuleType, contents: Arc<[u8]>) -> Module {
  let evaluate: EvaluateCallback = Arc::new(move |scope, specifier, namespace, observer| {
    let value: serde_json::Value = match serde_json::from_slice(&contents) {
      Ok(v) => v,
      Err(_) => {
        observer.cache_generate_failed(specifier, "invalid JSON module");
        return false;
      }
    };
    let canonical = serde_json::to_string(&value).expect("Value always serializes");
    match v8::String::new(scope, &canonical).and_then(|source| v8::json::parse(scope, source)) {
      Some(parsed) => namespace.set(scope, "default", parsed).is_ok(),
      None => {
        observer.cache_generate_failed(specifier, "invalid JSON module");
        false
      }
    }
  });
  Module::Synthetic(SyntheticModule::new(
    specifier,
    module_type,
    ModuleFlags::NONE,
    vec!["default".to_string()],
    evaluate,
  ))
}

/// Per-module cache for the compiled Wasm artifact, matching the original
/// system's contract ("maintains a per-module cache of the compiled
/// artifact"). `v8::CompiledWasmModule` is V8's own isolate-independent,
/// transferable handle to compiled Wasm code (the same handle
/// `WebAssembly.Module` postMessage-sharing uses); once one isolate compiles
/// the wire bytes, every other isolate sharing this `wasm_factory`-produced
/// `SyntheticModule` materializes its own `WasmModuleObject` straight from
/// the cached artifact instead of recompiling from bytes.
pub struct CompiledWasmModule {
  bytes: Arc<[u8]>,
  compiled: OnceLock<v8::CompiledWasmModule>,
}

impl CompiledWasmModule {
  fn get_or_compile<'s>(
    &self,
    scope: &mut v8::HandleScope<'s>,
  ) -> Option<v8::Local<'s, v8::WasmModuleObject>> {
    if let Some(compiled) = self.compiled.get() {
      return v8::WasmModuleObject::from_compiled_module(scope, compiled);
    }
    let module = v8::WasmModuleObject::compile(scope, &self.bytes)?;
    let _ = self.compiled.set(module.get_compiled_module());
    Some(module)
  }
}

/// RAII guard around Wasm evaluation: background tier-up compilation
/// threads deliver their results to the isolate via `Atomics.wait`-style
/// blocking, which V8 disallows by default. `rusty_v8`'s
/// `set_allow_atomics_wait` has no matching getter, so this assumes the
/// ambient state is "disallowed" (true for any isolate that hasn't itself
/// opted in) and restores that on drop rather than reading it back.
struct AllowBackgroundWasmThreads<'a, 's>(&'a mut v8::HandleScope<'s>);

impl<'a, 's> AllowBackgroundWasmThreads<'a, 's> {
  fn enter(scope: &'a mut v8::HandleScope<'s>) -> Self {
    scope.set_allow_atomics_wait(true);
    Self(scope)
  }

  fn scope(&mut self) -> &mut v8::HandleScope<'s> {
    self.0
  }
}

impl Drop for AllowBackgroundWasmThreads<'_, '_> {
  fn drop(&mut self) {
    self.0.set_allow_atomics_wait(false);
  }
}

/// `import wasm from "..." with { type: "wasm" }` — instantiated as a
/// `WebAssembly.Module` default export. Compilation happens at most once
/// per `SyntheticModule` instance regardless of how many isolates
/// instantiate it, via the `OnceLock` in `CompiledWasmModule`.
pub fn wasm_factory(specifier: ModuleSpecifier, module_type: ModuleType, bytes: Arc<[u8]>) -> Module {
  let cache = Arc::new(CompiledWasmModule {
    bytes,
    compiled: OnceLock::new(),
  });
  let evaluate: EvaluateCallback = Arc::new(move |scope, specifier, namespace, observer| {
    let mut guard = AllowBackgroundWasmThreads::enter(scope);
    let result = cache.get_or_compile(guard.scope());
    match result {
      Some(module) => namespace.set(guard.scope(), "default", module.into()).is_ok(),
      None => {
        observer.cache_generate_failed(specifier, "Wasm compilation failed");
        false
      }
    }
  });
  Module::Synthetic(SyntheticModule::new(
    specifier,
    module_type,
    ModuleFlags::NONE,
    vec!["default".to_string()],
    evaluate,
  ))
}
