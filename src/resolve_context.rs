//! `ResolveContext`.

use std::collections::HashMap;

use crate::flags::ModuleType;
use crate::url::ModuleSpecifier;

/// Metrics-only: where a resolution request originated. Never changes
/// resolution behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResolveSource {
  StaticImport,
  DynamicImport,
  Require,
  Internal,
}

/// The full context a `ModuleBundle`/`ModuleRegistry` resolves under.
#[derive(Clone, Debug)]
pub struct ResolveContext {
  pub r#type: ModuleType,
  pub source: ResolveSource,
  pub specifier: ModuleSpecifier,
  pub referrer: ModuleSpecifier,
  pub raw_specifier: Option<String>,
  pub attributes: HashMap<String, String>,
}

impl ResolveContext {
  pub fn new(
    r#type: ModuleType,
    source: ResolveSource,
    specifier: ModuleSpecifier,
    referrer: ModuleSpecifier,
  ) -> Self {
    Self {
      r#type,
      source,
      specifier,
      referrer,
      raw_specifier: None,
      attributes: HashMap::new(),
    }
  }

  /// A copy of `self` re-pointed at a new specifier, used when a bundle
  /// returns a redirect and the registry restarts resolution at the top
  ///.
  pub fn with_specifier(&self, specifier: ModuleSpecifier) -> Self {
    Self {
      r#type: self.r#type,
      source: self.source,
      specifier,
      referrer: self.referrer.clone(),
      raw_specifier: self.raw_specifier.clone(),
      attributes: self.attributes.clone(),
    }
  }
}
