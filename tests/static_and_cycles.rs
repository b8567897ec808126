//! Scenario 1-2: a static bundle resolves a dependency graph, including a
//! diamond import, and the same specifier always yields the same engine
//! module instance (no re-compilation, no re-evaluation).

mod common;

use std::sync::Arc;

use jsg_modules::{BundleBuilder, FallbackPolicy, ModuleRegistryBuilder, ModuleSpecifier};

fn build_registry() -> Arc<jsg_modules::ModuleRegistry> {
  let base = ModuleSpecifier::try_parse("file:///").unwrap();
  let mut bundle = BundleBuilder::new("app", base);
  bundle.add_esm(
    "left.js",
    b"import { value } from './shared.js'; export const left = value + 1;".to_vec(),
  );
  bundle.add_esm(
    "right.js",
    b"import { value } from './shared.js'; export const right = value + 2;".to_vec(),
  );
  bundle.add_esm("shared.js", b"export const value = 10;".to_vec());
  bundle.add_esm(
    "main.js",
    b"import { left } from './left.js'; \
      import { right } from './right.js'; \
      globalThis.result = left + right;"
      .to_vec(),
  );

  let mut builder = ModuleRegistryBuilder::new(FallbackPolicy::Deny);
  builder.add_bundle(bundle.build());
  Arc::new(builder.build())
}

#[test]
fn diamond_import_shares_one_shared_module_instance() {
  let registry = build_registry();
  common::with_isolate(registry, |scope, context| {
    let source = "import { left } from './left.js'; \
                  import { right } from './right.js'; \
                  globalThis.result = left + right;";
    common::run_entry(scope, "file:///main.js", source).expect("diamond graph evaluates");

    let global = context.global(scope);
    let key = v8::String::new(scope, "result").unwrap();
    let result = global.get(scope, key.into()).unwrap();
    assert_eq!(result.to_number(scope).unwrap().value(), 23.0);
  });
}

#[test]
fn unknown_specifier_is_not_found() {
  let registry = build_registry();
  common::with_isolate(registry, |scope, _context| {
    let err = common::run_entry(scope, "file:///main.js", "import './does-not-exist.js';")
      .expect_err("missing module must fail instantiation");
    assert!(matches!(err, jsg_modules::ModuleError::Js(_)));
  });
}
