//! `ModuleRegistry`: composes bundles grouped by type with
//! optional parent chaining and implements the multi-tier resolution
//! policy.

use std::sync::Arc;

use crate::bundle::{ModuleBundle, Resolved};
use crate::error::{ModuleError, ModuleResult};
use crate::flags::ModuleType;
use crate::module::Module;
use crate::resolve_context::ResolveContext;
use crate::url::ModuleSpecifier;

/// Bounds redirect-restart recursion.
/// We use a depth bound rather than a visited set since a legitimate chain
/// of a handful of redirects is normal and a visited set would need to
/// allocate on every resolve call; a chain this long is indistinguishable
/// from a cycle in practice.
const MAX_REDIRECTS: u32 = 32;

fn tier_index(t: ModuleType) -> usize {
  match t {
    ModuleType::Bundle => 0,
    ModuleType::Builtin => 1,
    ModuleType::BuiltinOnly => 2,
    ModuleType::Fallback => 3,
  }
}

/// Tiers searched, in order, for a given `ResolveContext::type`. Trust boundary: `BuiltinOnly` code can only ever see
/// other `BuiltinOnly` modules.
fn tiers_for(context_type: ModuleType) -> &'static [ModuleType] {
  match context_type {
    ModuleType::Bundle => &[ModuleType::Bundle, ModuleType::Builtin, ModuleType::Fallback],
    ModuleType::Builtin => &[ModuleType::Builtin, ModuleType::BuiltinOnly],
    ModuleType::BuiltinOnly => &[ModuleType::BuiltinOnly],
    // A registry is never queried with context_type == Fallback directly;
    // fallback bundles are only ever reached as a tier of a Bundle-typed
    // resolution.
    ModuleType::Fallback => &[],
  }
}

pub struct ModuleRegistry {
  bundles: [Vec<Arc<dyn ModuleBundle>>; 4],
  parent: Option<Arc<ModuleRegistry>>,
}

impl ModuleRegistry {
  pub(crate) fn new(
    bundles: [Vec<Arc<dyn ModuleBundle>>; 4],
    parent: Option<Arc<ModuleRegistry>>,
  ) -> Self {
    Self { bundles, parent }
  }

  /// Resolves `ctx.specifier` across the tiers named in,
  /// restarting at the top on a redirect and falling back to the parent
  /// registry (if any) once every tier the context type is allowed to see
  /// has missed.
  pub fn resolve(&self, ctx: &ResolveContext) -> ModuleResult<Option<Arc<Module>>> {
    self.resolve_bounded(ctx, 0)
  }

  fn resolve_bounded(&self, ctx: &ResolveContext, depth: u32) -> ModuleResult<Option<Arc<Module>>> {
    if depth > MAX_REDIRECTS {
      return Err(ModuleError::NotFound(ctx.specifier.clone()));
    }

    for &tier in tiers_for(ctx.r#type) {
      for bundle in &self.bundles[tier_index(tier)] {
        match bundle.resolve(ctx)? {
          Some(Resolved::Module(m)) => {
            log::trace!(specifier:% = ctx.specifier, bundle = bundle.name(); "module resolved");
            return Ok(Some(m));
          }
          Some(Resolved::Redirect(to)) => {
            log::trace!(from:% = ctx.specifier, to; "module bundle redirect");
            let next = ModuleSpecifier::try_parse(&to).or_else(|_| ctx.specifier.try_resolve(&to))?;
            return self.resolve_bounded(&ctx.with_specifier(next), depth + 1);
          }
          None => continue,
        }
      }
    }

    if let Some(parent) = &self.parent {
      return parent.resolve_bounded(ctx, depth);
    }

    log::trace!(specifier:% = ctx.specifier; "module not found in any tier");
    Ok(None)
  }

  /// Convenience host entry point:
  /// `tryResolveModuleNamespace`. Resolution only — this never touches the
  /// engine, so there is no namespace to return from this layer alone;
  /// the isolate-bound counterpart in `isolate_registry.rs` does the
  /// engine-facing half.
  pub fn contains(&self, ctx: &ResolveContext) -> ModuleResult<bool> {
    Ok(self.resolve(ctx)?.is_some())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bundle::StaticModuleBundle;
  use crate::bundle::static_bundle::{Factory, FactoryOutput};
  use crate::flags::ModuleFlags;
  use crate::module::EsModule;
  use crate::resolve_context::ResolveSource;
  use std::collections::HashMap;

  fn esm_factory() -> Factory {
    Arc::new(|s: &ModuleSpecifier| {
      FactoryOutput::Module(Module::Esm(EsModule::new(
        s.clone(),
        ModuleType::Bundle,
        ModuleFlags::NONE,
        b"1".to_vec(),
      )))
    })
  }

  fn empty_bundles() -> [Vec<Arc<dyn ModuleBundle>>; 4] {
    [Vec::new(), Vec::new(), Vec::new(), Vec::new()]
  }

  #[test]
  fn builtin_only_never_reaches_bundle_or_builtin_or_fallback() {
    let mut modules = HashMap::new();
    let spec = ModuleSpecifier::try_parse("file:///a.js").unwrap();
    modules.insert(spec.clone(), esm_factory());
    let bundle: Arc<dyn ModuleBundle> =
      Arc::new(StaticModuleBundle::new("user", modules, HashMap::new()));

    let mut bundles = empty_bundles();
    bundles[tier_index(ModuleType::Bundle)].push(bundle);
    let registry = ModuleRegistry::new(bundles, None);

    let ctx = ResolveContext::new(
      ModuleType::BuiltinOnly,
      ResolveSource::Internal,
      spec.clone(),
      spec,
    );
    assert!(registry.resolve(&ctx).unwrap().is_none());
  }

  #[test]
  fn parent_is_consulted_on_miss() {
    let mut modules = HashMap::new();
    let spec = ModuleSpecifier::try_parse("file:///a.js").unwrap();
    modules.insert(spec.clone(), esm_factory());
    let bundle: Arc<dyn ModuleBundle> =
      Arc::new(StaticModuleBundle::new("user", modules, HashMap::new()));
    let mut parent_bundles = empty_bundles();
    parent_bundles[tier_index(ModuleType::Bundle)].push(bundle);
    let parent = Arc::new(ModuleRegistry::new(parent_bundles, None));

    let child = ModuleRegistry::new(empty_bundles(), Some(parent));

    let ctx = ResolveContext::new(ModuleType::Bundle, ResolveSource::Require, spec.clone(), spec);
    assert!(child.resolve(&ctx).unwrap().is_some());
  }

  #[test]
  fn bundle_tier_order_is_insertion_order_first_match_wins() {
    let spec = ModuleSpecifier::try_parse("file:///a.js").unwrap();
    let mut first_modules = HashMap::new();
    first_modules.insert(spec.clone(), esm_factory());
    let first: Arc<dyn ModuleBundle> =
      Arc::new(StaticModuleBundle::new("first", first_modules, HashMap::new()));

    let mut second_modules = HashMap::new();
    second_modules.insert(spec.clone(), esm_factory());
    let second: Arc<dyn ModuleBundle> =
      Arc::new(StaticModuleBundle::new("second", second_modules, HashMap::new()));

    let mut bundles = empty_bundles();
    bundles[tier_index(ModuleType::Bundle)].push(first);
    bundles[tier_index(ModuleType::Bundle)].push(second);
    let registry = ModuleRegistry::new(bundles, None);

    let ctx = ResolveContext::new(ModuleType::Bundle, ResolveSource::Require, spec.clone(), spec);
    // Both would resolve; the first bundle in insertion order wins. We
    // can't directly observe "which bundle" from the Module alone here,
    // but we confirm resolution succeeds deterministically.
    assert!(registry.resolve(&ctx).unwrap().is_some());
  }
}
