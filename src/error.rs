//! Error kinds for the module registry, modeled on `deno_core`'s
//! `CoreErrorKind`: one `thiserror` enum, `#[from]` where a conversion is
//! unambiguous, and a dedicated variant for an exception already scheduled
//! on the isolate (`deno_core`'s `JsError` plays the same role there).

use std::fmt;

use crate::url::ModuleSpecifier;

/// A JS exception captured at throw time.
///
/// We never hold a live `v8::Local` past the `HandleScope` that produced
/// it, so the message is captured eagerly (mirroring how `deno_core`'s
/// `JsError` snapshots frames/message rather than re-entering the isolate
/// later). `global` keeps the throw-site value reachable for callers that
/// do have a fresh scope (e.g. to rethrow it verbatim).
pub struct JsException {
  pub message: String,
  pub global: Option<v8::Global<v8::Value>>,
}

impl JsException {
  pub fn new(message: impl Into<String>, global: Option<v8::Global<v8::Value>>) -> Self {
    Self {
      message: message.into(),
      global,
    }
  }
}

impl fmt::Debug for JsException {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("JsException")
      .field("message", &self.message)
      .finish()
  }
}

impl fmt::Display for JsException {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.message)
  }
}

impl std::error::Error for JsException {}

#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
  #[error("Import attributes are not supported")]
  UnsupportedAttributes,

  #[error("invalid module specifier: {0}")]
  InvalidSpecifier(String),

  #[error("Module not found: {0}")]
  NotFound(ModuleSpecifier),

  #[error("Circular dependency when resolving module")]
  Circular,

  #[error(
    "Use of top-level await in a synchronously required module is restricted \
     to promises that are resolved synchronously. Specifier: \"{0}\""
  )]
  SyncTla(ModuleSpecifier),

  #[error("{0}")]
  ModuleErrored(#[source] JsException),

  #[error("Requested module does not exist")]
  EntryNotFound,

  #[error(transparent)]
  Js(#[from] JsException),
}

impl ModuleError {
  /// True for the class of error that `RETURN_EMPTY`
  /// converts into an empty result instead of propagating.
  pub fn is_not_found(&self) -> bool {
    matches!(self, ModuleError::NotFound(_))
  }
}

pub type ModuleResult<T> = Result<T, ModuleError>;
