//! Scenario 3: a module using top-level `await` on a dynamically imported
//! module resolves cleanly through one microtask checkpoint, with the
//! entry's own evaluation promise settling fulfilled.

mod common;

use std::sync::Arc;

use jsg_modules::{BundleBuilder, FallbackPolicy, ModuleRegistryBuilder, ModuleSpecifier};

fn build_registry() -> Arc<jsg_modules::ModuleRegistry> {
  let base = ModuleSpecifier::try_parse("file:///").unwrap();
  let mut bundle = BundleBuilder::new("app", base);
  bundle.add_esm("delayed.js", b"export const value = 42;".to_vec());

  let mut builder = ModuleRegistryBuilder::new(FallbackPolicy::Deny);
  builder.add_bundle(bundle.build());
  Arc::new(builder.build())
}

#[test]
fn top_level_await_on_dynamic_import_settles_fulfilled() {
  let registry = build_registry();
  common::with_isolate(registry, |scope, context| {
    let source = "const mod = await import('./delayed.js'); globalThis.result = mod.value;";
    common::run_entry(scope, "file:///main.js", source).expect("top-level await settles");

    let global = context.global(scope);
    let key = v8::String::new(scope, "result").unwrap();
    let result = global.get(scope, key.into()).unwrap();
    assert_eq!(result.to_number(scope).unwrap().value(), 42.0);
  });
}

#[test]
fn top_level_await_on_rejecting_import_rejects_entry() {
  let registry = build_registry();
  common::with_isolate(registry, |scope, _context| {
    let source = "await import('./missing.js');";
    let err = common::run_entry(scope, "file:///main.js", source)
      .expect_err("rejecting dynamic import must propagate");
    assert!(matches!(
      err,
      jsg_modules::ModuleError::Js(_) | jsg_modules::ModuleError::ModuleErrored(_)
    ));
  });
}
