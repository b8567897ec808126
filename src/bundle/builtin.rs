//! `BuiltinModuleBundle`: wraps `StaticModuleBundle`,
//! additionally rejecting any specifier whose scheme is `file:`.

use crate::error::ModuleResult;
use crate::resolve_context::ResolveContext;

use super::{ModuleBundle, Resolved, StaticModuleBundle};

pub struct BuiltinModuleBundle {
  inner: StaticModuleBundle,
}

impl BuiltinModuleBundle {
  pub fn new(inner: StaticModuleBundle) -> Self {
    Self { inner }
  }
}

impl ModuleBundle for BuiltinModuleBundle {
  fn name(&self) -> &str {
    self.inner.name()
  }

  fn resolve(&self, ctx: &ResolveContext) -> ModuleResult<Option<Resolved>> {
    if ctx.specifier.is_file() {
      return Ok(None);
    }
    self.inner.resolve(ctx)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::flags::ModuleType;
  use crate::resolve_context::ResolveSource;
  use crate::url::ModuleSpecifier;
  use std::collections::HashMap;

  #[test]
  fn rejects_file_scheme() {
    let builtin = BuiltinModuleBundle::new(StaticModuleBundle::new(
      "builtin",
      HashMap::new(),
      HashMap::new(),
    ));
    let specifier = ModuleSpecifier::try_parse("file:///a.js").unwrap();
    let ctx = ResolveContext::new(
      ModuleType::Builtin,
      ResolveSource::Require,
      specifier.clone(),
      specifier,
    );
    assert!(builtin.resolve(&ctx).unwrap().is_none());
  }
}
