//! `FallbackModuleBundle`: a single open-ended resolver
//! callback, typically backed by a virtual filesystem, with its own cache
//! of both resolved modules and aliases.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ModuleResult;
use crate::module::Module;
use crate::resolve_context::ResolveContext;
use crate::url::ModuleSpecifier;

use super::{ModuleBundle, Resolved};

pub type FallbackResolver =
  Arc<dyn Fn(&ResolveContext) -> ModuleResult<Option<Module>> + Send + Sync>;

enum Entry {
  Module(Arc<Module>),
  /// Points at another cache key whose own specifier differs from the
  /// originally requested one.
  Alias(ModuleSpecifier),
}

pub struct FallbackModuleBundle {
  name: String,
  resolver: FallbackResolver,
  cache: RwLock<HashMap<ModuleSpecifier, Entry>>,
}

impl FallbackModuleBundle {
  pub fn new(name: impl Into<String>, resolver: FallbackResolver) -> Self {
    Self {
      name: name.into(),
      resolver,
      cache: RwLock::new(HashMap::new()),
    }
  }

  fn lookup(&self, specifier: &ModuleSpecifier, ctx: &ResolveContext) -> Option<Resolved> {
    let found = {
      let guard = self.cache.read();
      match guard.get(specifier)? {
        Entry::Module(m) => Ok(m.clone()),
        Entry::Alias(canonical) => Err(canonical.clone()),
      }
    };
    match found {
      Ok(module) => filter(module, ctx),
      Err(canonical) => self.lookup(&canonical, ctx),
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

impl ModuleBundle for FallbackModuleBundle {
  fn name(&self) -> &str {
    &self.name
  }

  fn resolve(&self, ctx: &ResolveContext) -> ModuleResult<Option<Resolved>> {
    if let Some(hit) = self.lookup(&ctx.specifier, ctx) {
      return Ok(Some(hit));
    }

    // Miss: invoke the callback under exclusive access, double-checking
    // after the upgrade so a concurrent winner's insert isn't clobbered
    // and the callback isn't invoked twice for the same specifier
    //.
    let mut guard = self.cache.write();
    let double_check = guard.get(&ctx.specifier).map(|entry| match entry {
      Entry::Module(m) => Ok(m.clone()),
      Entry::Alias(canonical) => Err(canonical.clone()),
    });
    if let Some(found) = double_check {
      drop(guard);
      return Ok(match found {
        Ok(module) => filter(module, ctx),
        Err(canonical) => self.lookup(&canonical, ctx),
      });
    }

    let Some(module) = (self.resolver)(ctx)? else {
      return Ok(None);
    };
    let module = Arc::new(module);

    if module.specifier() != &ctx.specifier {
      guard.insert(ctx.specifier.clone(), Entry::Alias(module.specifier().clone()));
    }
    guard.insert(module.specifier().clone(), Entry::Module(module.clone()));
    drop(guard);

    Ok(filter(module, ctx))
  }
}
