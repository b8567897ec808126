//! The specifier value type: an immutable URL with clone/parse/resolve
//! helpers and configurable equivalence.
//!
//! Modeled on `deno_core::ModuleSpecifier`, which is itself a thin alias
//! over `url::Url`. We keep the wrapper (rather than a bare alias) so we
//! can attach the equivalence-options comparison calls for
//! without adding inherent methods to a type we don't own.

use std::fmt;

use url::Url;

use crate::error::ModuleError;

/// A URL identifying a module. Cheap to clone (`url::Url` clone is a
/// single `String` clone under the hood).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleSpecifier(Url);

/// Controls how [`ModuleSpecifier::equivalent`] compares two specifiers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EqOptions {
  pub ignore_query: bool,
  pub ignore_fragment: bool,
  pub normalize_percent_encoded_path: bool,
}

impl ModuleSpecifier {
  pub fn new(url: Url) -> Self {
    Self(url)
  }

  /// Parses an absolute URL string.
  pub fn try_parse(s: &str) -> Result<Self, ModuleError> {
    Url::parse(s)
      .map(Self)
      .map_err(|_| ModuleError::InvalidSpecifier(s.to_string()))
  }

  /// Resolves `relative` against `self` as a base, the way an ESM import
  /// specifier is resolved against its referrer.
  pub fn try_resolve(&self, relative: &str) -> Result<Self, ModuleError> {
    self
      .0
      .join(relative)
      .map(Self)
      .map_err(|_| ModuleError::InvalidSpecifier(relative.to_string()))
  }

  pub fn as_url(&self) -> &Url {
    &self.0
  }

  pub fn as_str(&self) -> &str {
    self.0.as_str()
  }

  pub fn scheme(&self) -> &str {
    self.0.scheme()
  }

  pub fn is_file(&self) -> bool {
    self.0.scheme() == "file"
  }

  /// Percent-decode-then-reencode the path segment, so that two specifiers
  /// differing only in how a path byte was percent-escaped compare equal.
  /// Idempotent: normalizing an already-normalized specifier is a no-op.
  pub fn normalize_path(&self) -> Self {
    use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

    const FRAGMENT: &AsciiSet = &CONTROLS
      .add(b' ')
      .add(b'"')
      .add(b'<')
      .add(b'>')
      .add(b'`')
      .add(b'?')
      .add(b'{')
      .add(b'}');

    let mut out = self.0.clone();
    let decoded = percent_decode_str(out.path()).decode_utf8_lossy().into_owned();
    let reencoded: String = utf8_percent_encode(&decoded, FRAGMENT).collect();
    out.set_path(&reencoded);
    Self(out)
  }

  /// Equivalence under the given options. Never touches registry state.
  pub fn equivalent(&self, other: &Self, opts: EqOptions) -> bool {
    let (a, b) = if opts.normalize_percent_encoded_path {
      (self.normalize_path(), other.normalize_path())
    } else {
      (self.clone(), other.clone())
    };

    let mut a = a.0;
    let mut b = b.0;
    if opts.ignore_query {
      a.set_query(None);
      b.set_query(None);
    }
    if opts.ignore_fragment {
      a.set_fragment(None);
      b.set_fragment(None);
    }
    a == b
  }
}

impl fmt::Display for ModuleSpecifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.0, f)
  }
}

impl From<Url> for ModuleSpecifier {
  fn from(url: Url) -> Self {
    Self(url)
  }
}

impl AsRef<Url> for ModuleSpecifier {
  fn as_ref(&self) -> &Url {
    &self.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolve_relative() {
    let base = ModuleSpecifier::try_parse("file:///a/b.js").unwrap();
    let resolved = base.try_resolve("./c.js").unwrap();
    assert_eq!(resolved.as_str(), "file:///a/c.js");
  }

  #[test]
  fn normalize_path_is_idempotent() {
    let u = ModuleSpecifier::try_parse("file:///a/%2fb.js").unwrap();
    let once = u.normalize_path();
    let twice = once.normalize_path();
    assert_eq!(once, twice);
  }

  #[test]
  fn equivalence_ignores_query() {
    let a = ModuleSpecifier::try_parse("file:///a.js?x=1").unwrap();
    let b = ModuleSpecifier::try_parse("file:///a.js?x=2").unwrap();
    assert!(a.equivalent(
      &b,
      EqOptions {
        ignore_query: true,
        ..Default::default()
      }
    ));
    assert!(!a.equivalent(&b, EqOptions::default()));
  }

  #[test]
  fn invalid_specifier_errors() {
    assert!(ModuleSpecifier::try_parse("not a url").is_err());
  }
}
