//! `ModuleBundle`: a named collection of modules sharing a
//! resolution policy.

pub mod builtin;
pub mod fallback;
pub mod static_bundle;

use std::sync::Arc;

use crate::error::ModuleResult;
use crate::module::Module;
use crate::resolve_context::ResolveContext;

pub use builtin::BuiltinModuleBundle;
pub use fallback::FallbackModuleBundle;
pub use static_bundle::StaticModuleBundle;

/// A resolved bundle hit: either a direct module or a redirect to another
/// specifier, which the registry re-resolves from the top.
///
/// We hand back `Arc<Module>` rather than a borrow tied to the bundle's
/// internal cache guard: bundle caches are read under a lock
/// and a borrow through that lock cannot outlive the call, whereas a
/// `Module` is logically immutable and shared for the registry's entire
/// lifetime, which is exactly what `Arc` models.
pub enum Resolved {
  Module(Arc<Module>),
  Redirect(String),
}

/// Thread-safe and shared across isolates.
pub trait ModuleBundle: Send + Sync {
  fn name(&self) -> &str;

  /// Attempts to resolve `ctx.specifier` within this bundle. Returns
  /// `Ok(None)` on a clean miss (not an error — the registry tries the
  /// next bundle/tier).
  fn resolve(&self, ctx: &ResolveContext) -> ModuleResult<Option<Resolved>>;
}
