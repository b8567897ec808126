//! `StaticModuleBundle`: a fixed map of specifier→factory
//! plus aliases, backed by a guarded resolved-module cache.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ModuleResult;
use crate::module::Module;
use crate::resolve_context::ResolveContext;
use crate::url::ModuleSpecifier;

use super::{ModuleBundle, Resolved};

/// A factory may synthesize a `Module` on demand, or redirect to another
/// specifier entirely. Factories run at most once per
/// specifier per bundle: the result is cached.
pub enum FactoryOutput {
  Module(Module),
  Redirect(String),
}

pub type Factory = Arc<dyn Fn(&ModuleSpecifier) -> FactoryOutput + Send + Sync>;

pub struct StaticModuleBundle {
  name: String,
  modules: HashMap<ModuleSpecifier, Factory>,
  aliases: HashMap<ModuleSpecifier, ModuleSpecifier>,
  cache: RwLock<HashMap<ModuleSpecifier, Arc<Module>>>,
}

impl StaticModuleBundle {
  pub fn new(
    name: impl Into<String>,
    modules: HashMap<ModuleSpecifier, Factory>,
    aliases: HashMap<ModuleSpecifier, ModuleSpecifier>,
  ) -> Self {
    Self {
      name: name.into(),
      modules,
      aliases,
      cache: RwLock::new(HashMap::new()),
    }
  }

  fn resolve_direct(&self, ctx: &ResolveContext) -> ModuleResult<Option<Resolved>> {
    if let Some(cached) = self.cache.read().get(&ctx.specifier) {
      return Ok(filter(cached.clone(), ctx));
    }

    let Some(factory) = self.modules.get(&ctx.specifier) else {
      return Ok(None);
    };

    match factory(&ctx.specifier) {
      FactoryOutput::Module(module) => {
        let module = Arc::new(module);
        self
          .cache
          .write()
          .insert(ctx.specifier.clone(), module.clone());
        Ok(filter(module, ctx))
      }
      FactoryOutput::Redirect(to) => Ok(Some(Resolved::Redirect(to))),
    }
  }
}

fn filter(module: Arc<Module>, ctx: &ResolveContext) -> Option<Resolved> {
  if module.evaluate_context(ctx) {
    Some(Resolved::Module(module))
  } else {
    None
  }
}

impl ModuleBundle for StaticModuleBundle {
  fn name(&self) -> &str {
    &self.name
  }

  fn resolve(&self, ctx: &ResolveContext) -> ModuleResult<Option<Resolved>> {
    if let Some(target) = self.aliases.get(&ctx.specifier) {
      let aliased_ctx = ctx.with_specifier(target.clone());
      return self.resolve_direct(&aliased_ctx);
    }
    self.resolve_direct(ctx)
  }
}
