//! Module type and flag bitmask.
//!
//! `deno_core`'s own `Cargo.toml` (libs/core) does not pull in `bitflags`,
//! so rather than adding a dependency deno_core doesn't use we hand-roll
//! the bitmask the way `deno_core`'s `ModuleType`/op flags do: a thin
//! newtype over a primitive with const associated flags and `BitOr`.

use std::ops::BitOr;

/// Which resolution tier a module participates in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModuleType {
  Bundle,
  Builtin,
  BuiltinOnly,
  Fallback,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ModuleFlags(u8);

impl ModuleFlags {
  pub const NONE: ModuleFlags = ModuleFlags(0);
  pub const ESM: ModuleFlags = ModuleFlags(1 << 0);
  pub const MAIN: ModuleFlags = ModuleFlags(1 << 1);
  pub const EVAL: ModuleFlags = ModuleFlags(1 << 2);

  pub const fn contains(self, other: ModuleFlags) -> bool {
    self.0 & other.0 == other.0
  }

  pub const fn is_esm(self) -> bool {
    self.contains(Self::ESM)
  }

  pub const fn is_main(self) -> bool {
    self.contains(Self::MAIN)
  }

  pub const fn is_eval(self) -> bool {
    self.contains(Self::EVAL)
  }
}

impl BitOr for ModuleFlags {
  type Output = ModuleFlags;

  fn bitor(self, rhs: ModuleFlags) -> ModuleFlags {
    ModuleFlags(self.0 | rhs.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn esm_implies_eval_is_caller_enforced() {
    // The invariant "ESM modules always have EVAL set" is enforced at
    // EsModule construction (see module/esm.rs), not by the bitmask type
    // itself; this just pins the bit values used there.
    let flags = ModuleFlags::ESM | ModuleFlags::EVAL;
    assert!(flags.is_esm());
    assert!(flags.is_eval());
    assert!(!flags.is_main());
  }
}
