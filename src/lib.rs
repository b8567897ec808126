//! Module registry and loader core sitting between an embedded V8 isolate
//! and its host runtime: specifier identity, multi-tier resolution,
//! compile caching, and the engine-facing resolve/import/require surface.
//!
//! Grounded throughout on `deno_core`'s `module_map.rs`/`modules/mod.rs`:
//! this crate is a generalization of that module's ideas (bundle tiers,
//! fallback-by-resolver, synthetic modules, `require`) stripped of
//! `deno_core`'s `JsRuntime`/`OpState`/extension apparatus, which is out of
//! scope here.

pub mod bundle;
pub mod builder;
pub mod error;
pub mod flags;
pub mod isolate_registry;
pub mod module;
pub mod observer;
pub mod resolve_context;
pub mod url;

#[cfg(feature = "synthetic_factories")]
pub mod synthetic_factories;

pub use bundle::{BuiltinModuleBundle, FallbackModuleBundle, ModuleBundle, Resolved, StaticModuleBundle};
pub use builder::{BuiltinBuilder, BundleBuilder, FallbackPolicy, ModuleRegistryBuilder};
pub use error::{JsException, ModuleError, ModuleResult};
pub use flags::{ModuleFlags, ModuleType};
pub use isolate_registry::{
  IsolateModuleRegistry, IsolateModuleRegistryHandle, NodeCompatConfig, RequireOptions,
  MODULE_REGISTRY_EMBEDDER_SLOT,
};
pub use module::{EsModule, EvalCallback, EvaluateCallback, Module, ModuleNamespace, SyntheticModule};
pub use observer::{CompileObserver, NoopObserver};
pub use registry::ModuleRegistry;
pub use resolve_context::{ResolveContext, ResolveSource};
pub use url::{EqOptions, ModuleSpecifier};

mod registry;
