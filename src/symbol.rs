//! A simple string interner. Every name that flows through the symbol
//! table, the environment, or a diagnostic is interned once here rather
//! than carried around as an owned `String`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use typed_arena::Arena;

/// An interned string. Cheap to copy, cheap to compare.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
  /// The underscore placeholder name, used for patterns that bind nothing.
  pub const UNDER: Symbol = Symbol(0);

  #[must_use] pub fn into_usize(self) -> usize { self.0 as usize }
}

impl fmt::Debug for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Symbol({})", self.0)
  }
}

/// Owns the backing storage for every interned string. Strings are
/// bump-allocated so that the `&'static str` slices handed out by
/// [`Interner::resolve`] stay valid for the arena's lifetime without a
/// second copy living in the lookup map.
pub struct Interner {
  arena: Arena<u8>,
  map: HashMap<&'static str, Symbol>,
  strings: Vec<&'static str>,
}

impl Default for Interner {
  fn default() -> Self {
    let mut this = Self { arena: Arena::new(), map: HashMap::new(), strings: Vec::new() };
    let under = this.intern("_");
    debug_assert_eq!(under, Symbol::UNDER);
    this
  }
}

impl Interner {
  #[must_use] pub fn new() -> Self { Self::default() }

  /// Intern `s`, returning the existing symbol if already seen.
  pub fn intern(&mut self, s: &str) -> Symbol {
    if let Some(&sym) = self.map.get(s) { return sym }
    let bytes = self.arena.alloc_extend(s.bytes());
    // Safety: `bytes` is valid utf8 because it was copied from `s`, and it
    // lives as long as `self.arena`, which we never shrink.
    let alloced: &'static str = unsafe {
      std::str::from_utf8_unchecked(std::mem::transmute::<&[u8], &'static [u8]>(bytes))
    };
    let sym = Symbol(self.strings.len() as u32);
    self.strings.push(alloced);
    self.map.insert(alloced, sym);
    sym
  }

  /// Recover the text of a previously interned symbol.
  #[must_use] pub fn resolve(&self, sym: Symbol) -> &str { self.strings[sym.into_usize()] }
}

/// Build a dense lookup table from symbol index to payload, for the common
/// case of mapping a handful of keyword/primitive names to an enum tag.
pub fn init_dense_symbol_map<T: Copy>(pairs: &[(Symbol, T)]) -> Box<[Option<T>]> {
  let len = pairs.iter().map(|(s, _)| s.into_usize() + 1).max().unwrap_or(0);
  let mut map = vec![None; len].into_boxed_slice();
  for &(s, t) in pairs { map[s.into_usize()] = Some(t) }
  map
}

thread_local! {
  static INTERNER: RefCell<Interner> = RefCell::new(Interner::new());
}

/// Intern a string in the process-global interner. Convenience wrapper for
/// call sites that don't thread an explicit `&mut Interner` through (mostly
/// primitive-table initialization, which runs once and is idempotent).
pub fn intern(s: &str) -> Symbol {
  INTERNER.with(|i| i.borrow_mut().intern(s))
}

/// Resolve a symbol interned via [`intern`].
pub fn resolve(sym: Symbol) -> String {
  INTERNER.with(|i| i.borrow().resolve(sym).to_owned())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reinterning_is_idempotent() {
    let mut i = Interner::new();
    let a = i.intern("foo");
    let b = i.intern("foo");
    let c = i.intern("bar");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(i.resolve(a), "foo");
  }

  #[test]
  fn under_is_reserved() {
    let mut i = Interner::new();
    assert_eq!(i.intern("_"), Symbol::UNDER);
  }
}
