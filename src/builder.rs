//! Builders: validate at build time and produce immutable
//! registries/bundles. Grounded in `deno_core`'s `extension!`/builder
//! macros, which panic on duplicate registration rather than return a
//! `Result` — a programmer error, not a runtime condition a host recovers
//! from.

use std::collections::HashMap;
use std::sync::Arc;

use crate::bundle::builtin::BuiltinModuleBundle;
use crate::bundle::fallback::{FallbackModuleBundle, FallbackResolver};
use crate::bundle::static_bundle::{Factory, FactoryOutput, StaticModuleBundle};
use crate::bundle::ModuleBundle;
use crate::flags::{ModuleFlags, ModuleType};
use crate::module::{EsModule, EvaluateCallback, Module, SyntheticModule};
use crate::registry::ModuleRegistry;
use crate::url::ModuleSpecifier;

/// Builds a `StaticModuleBundle` resolved against a fixed base URL.
/// Percent-encoding in added paths is normalized at add time so a later
/// lookup with a differently-escaped but equivalent path hits the same
/// cache entry.
pub struct BundleBuilder {
  bundle_base: ModuleSpecifier,
  name: String,
  modules: HashMap<ModuleSpecifier, Factory>,
  aliases: HashMap<ModuleSpecifier, ModuleSpecifier>,
}

impl BundleBuilder {
  pub fn new(name: impl Into<String>, bundle_base: ModuleSpecifier) -> Self {
    Self {
      bundle_base,
      name: name.into(),
      modules: HashMap::new(),
      aliases: HashMap::new(),
    }
  }

  fn resolve_added(&self, specifier: &str) -> ModuleSpecifier {
    self
      .bundle_base
      .try_resolve(specifier)
      .unwrap_or_else(|e| panic!("invalid specifier {specifier:?} added to bundle: {e}"))
      .normalize_path()
  }

  /// Adds an ESM module whose source is `source`. Fatal (panics) if
  /// `specifier` was already added, directly or via an alias.
  pub fn add_esm(&mut self, specifier: &str, source: impl Into<Arc<[u8]>>) -> &mut Self {
    let url = self.resolve_added(specifier);
    self.insert_factory(url.clone(), {
      let source = source.into();
      Arc::new(move |s: &ModuleSpecifier| {
        FactoryOutput::Module(Module::Esm(EsModule::new(
          s.clone(),
          ModuleType::Bundle,
          ModuleFlags::NONE,
          source.clone(),
        )))
      })
    });
    self
  }

  /// Adds a synthetic module whose exports are populated by `evaluate`.
  pub fn add_synthetic(
    &mut self,
    specifier: &str,
    named_exports: Vec<String>,
    evaluate: EvaluateCallback,
  ) -> &mut Self {
    let url = self.resolve_added(specifier);
    self.insert_factory(url.clone(), {
      let named_exports = named_exports.clone();
      let evaluate = evaluate.clone();
      Arc::new(move |s: &ModuleSpecifier| {
        FactoryOutput::Module(Module::Synthetic(SyntheticModule::new(
          s.clone(),
          ModuleType::Bundle,
          ModuleFlags::NONE,
          named_exports.clone(),
          evaluate.clone(),
        )))
      })
    });
    self
  }

  pub fn add_alias(&mut self, from: &str, to: &str) -> &mut Self {
    let from = self.resolve_added(from);
    let to = self.resolve_added(to);
    self.check_unused(&from);
    self.aliases.insert(from, to);
    self
  }

  fn insert_factory(&mut self, url: ModuleSpecifier, factory: Factory) {
    self.check_unused(&url);
    self.modules.insert(url, factory);
  }

  fn check_unused(&self, url: &ModuleSpecifier) {
    if self.modules.contains_key(url) || self.aliases.contains_key(url) {
      panic!("duplicate module specifier added to bundle {:?}: {url}", self.name);
    }
  }

  pub fn build(self) -> StaticModuleBundle {
    StaticModuleBundle::new(self.name, self.modules, self.aliases)
  }
}

/// Builds a `BuiltinModuleBundle` by absolute URL. Rejects
/// `file:`-scheme specifiers at add time.
pub struct BuiltinBuilder {
  module_type: ModuleType,
  name: String,
  modules: HashMap<ModuleSpecifier, Factory>,
  aliases: HashMap<ModuleSpecifier, ModuleSpecifier>,
}

impl BuiltinBuilder {
  /// `module_type` must be `Builtin` or `BuiltinOnly`.
  pub fn new(name: impl Into<String>, module_type: ModuleType) -> Self {
    assert!(
      matches!(module_type, ModuleType::Builtin | ModuleType::BuiltinOnly),
      "BuiltinBuilder module_type must be Builtin or BuiltinOnly"
    );
    Self {
      module_type,
      name: name.into(),
      modules: HashMap::new(),
      aliases: HashMap::new(),
    }
  }

  fn check(&self, url: &ModuleSpecifier) {
    assert!(
      !url.is_file(),
      "builtin bundle {:?} cannot register a file: specifier: {url}",
      self.name
    );
    if self.modules.contains_key(url) || self.aliases.contains_key(url) {
      panic!("duplicate module specifier added to bundle {:?}: {url}", self.name);
    }
  }

  pub fn add_esm(&mut self, url: ModuleSpecifier, source: impl Into<Arc<[u8]>>) -> &mut Self {
    self.check(&url);
    let module_type = self.module_type;
    let source = source.into();
    self.modules.insert(
      url.clone(),
      Arc::new(move |s: &ModuleSpecifier| {
        FactoryOutput::Module(Module::Esm(EsModule::new(
          s.clone(),
          module_type,
          ModuleFlags::NONE,
          source.clone(),
        )))
      }),
    );
    self
  }

  pub fn add_synthetic(
    &mut self,
    url: ModuleSpecifier,
    named_exports: Vec<String>,
    evaluate: EvaluateCallback,
  ) -> &mut Self {
    self.check(&url);
    let module_type = self.module_type;
    self.modules.insert(
      url.clone(),
      Arc::new(move |s: &ModuleSpecifier| {
        FactoryOutput::Module(Module::Synthetic(SyntheticModule::new(
          s.clone(),
          module_type,
          ModuleFlags::NONE,
          named_exports.clone(),
          evaluate.clone(),
        )))
      }),
    );
    self
  }

  pub fn build(self) -> BuiltinModuleBundle {
    BuiltinModuleBundle::new(StaticModuleBundle::new(
      self.name,
      self.modules,
      self.aliases,
    ))
  }
}

/// Gate passed to `ModuleRegistry::Builder::new` controlling whether
/// `add_fallback` is allowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackPolicy {
  Deny,
  AllowFallback,
}

pub struct ModuleRegistryBuilder {
  allow_fallback: bool,
  bundle: Vec<Arc<dyn ModuleBundle>>,
  builtin: Vec<Arc<dyn ModuleBundle>>,
  builtin_only: Vec<Arc<dyn ModuleBundle>>,
  fallback: Vec<Arc<dyn ModuleBundle>>,
  parent: Option<Arc<ModuleRegistry>>,
}

impl ModuleRegistryBuilder {
  pub fn new(policy: FallbackPolicy) -> Self {
    Self {
      allow_fallback: policy == FallbackPolicy::AllowFallback,
      bundle: Vec::new(),
      builtin: Vec::new(),
      builtin_only: Vec::new(),
      fallback: Vec::new(),
      parent: None,
    }
  }

  pub fn parent(&mut self, parent: Arc<ModuleRegistry>) -> &mut Self {
    self.parent = Some(parent);
    self
  }

  pub fn add_bundle(&mut self, bundle: StaticModuleBundle) -> &mut Self {
    self.bundle.push(Arc::new(bundle));
    self
  }

  pub fn add_builtin(&mut self, bundle: BuiltinModuleBundle) -> &mut Self {
    self.builtin.push(Arc::new(bundle));
    self
  }

  pub fn add_builtin_only(&mut self, bundle: BuiltinModuleBundle) -> &mut Self {
    self.builtin_only.push(Arc::new(bundle));
    self
  }

  /// Panics unless this builder was constructed with
  /// `FallbackPolicy::AllowFallback`.
  pub fn add_fallback(&mut self, name: impl Into<String>, resolver: FallbackResolver) -> &mut Self {
    assert!(
      self.allow_fallback,
      "fallback bundles require ModuleRegistryBuilder::new(FallbackPolicy::AllowFallback)"
    );
    self
      .fallback
      .push(Arc::new(FallbackModuleBundle::new(name, resolver)));
    self
  }

  pub fn build(self) -> ModuleRegistry {
    ModuleRegistry::new(
      [self.bundle, self.builtin, self.builtin_only, self.fallback],
      self.parent,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  #[should_panic(expected = "duplicate module specifier")]
  fn duplicate_add_is_fatal() {
    let mut builder = BundleBuilder::new("user", ModuleSpecifier::try_parse("file:///").unwrap());
    builder.add_esm("a.js", b"1".to_vec());
    builder.add_esm("a.js", b"2".to_vec());
  }

  #[test]
  #[should_panic(expected = "duplicate module specifier")]
  fn duplicate_via_alias_is_fatal() {
    let mut builder = BundleBuilder::new("user", ModuleSpecifier::try_parse("file:///").unwrap());
    builder.add_esm("a.js", b"1".to_vec());
    builder.add_alias("a.js", "b.js");
  }

  #[test]
  #[should_panic(expected = "cannot register a file: specifier")]
  fn builtin_rejects_file_scheme() {
    let mut builder = BuiltinBuilder::new("builtin", ModuleType::Builtin);
    builder.add_esm(
      ModuleSpecifier::try_parse("file:///x.js").unwrap(),
      b"1".to_vec(),
    );
  }

  #[test]
  #[should_panic(expected = "FallbackPolicy::AllowFallback")]
  fn fallback_requires_opt_in() {
    let mut builder = ModuleRegistryBuilder::new(FallbackPolicy::Deny);
    builder.add_fallback("vfs", Arc::new(|_ctx| Ok(None)));
  }

  #[test]
  fn percent_encoding_normalized_duplicate_add_is_fatal() {
    let mut builder = BundleBuilder::new("user", ModuleSpecifier::try_parse("file:///").unwrap());
    builder.add_esm("a/b.js", b"1".to_vec());
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
      builder.add_esm("a%2Fb.js", b"2".to_vec());
    }));
    assert!(result.is_err());
  }
}
