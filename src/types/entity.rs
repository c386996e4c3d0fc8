//! The `Entry` type (C2's "symbol entry"): the record a name in a symbol
//! table resolves to, and the overload-set machinery a function entry
//! owns.
//!
//! Grounded on `util/symbolTable.c`'s entry kinds
//! (`ST_STRUCT`/`ST_UNION`/`ST_ENUM`/`ST_TYPEDEF`/`ST_VAR`, plus the
//! function/opaque kinds C2 adds on top), and on a forward-declared/typed
//! split for how a single name's typechecking status is tracked over the
//! two-phase build in C4.

use std::cell::Cell;
use smallvec::SmallVec;

use crate::span::FileSpan;
use crate::symbol::Symbol;
use super::{SymbolId, ty::Type};

/// One candidate in a function's overload set (§3, §4.2).
#[derive(Clone, Debug)]
pub struct Overload {
  pub ret: Type,
  /// Parameter types in declaration order. Most T-language functions take
  /// a handful of arguments, so four are kept inline before spilling.
  pub params: SmallVec<[Type; 4]>,
  /// Count of trailing parameters with default values.
  pub num_optional: u32,
  /// `false` for a declaration with no body yet, `true` once defined.
  pub defined: bool,
}

impl Overload {
  #[must_use] pub fn required_params(&self) -> usize {
    self.params.len() - self.num_optional as usize
  }

  /// `true` when `n` arguments could possibly satisfy this overload's
  /// arity, ignoring argument types (§4.2 condition 1).
  #[must_use] pub fn arity_matches(&self, n: usize) -> bool {
    self.required_params() <= n && n <= self.params.len()
  }

  /// `true` when every parameter of `other` is equal to the matching
  /// parameter of `self`, except at least one where `self` merely
  /// converts and `other` is exactly equal — i.e. `other` is strictly
  /// more specific than `self` for the purposes of §4.2's tie-break rule.
  /// `modules` gives "exactly equal" opaque/definition transparency, same
  /// as everywhere else a `Type` is compared against another.
  #[must_use] pub fn strictly_less_specific_than<M: crate::symtab::Modules>(
    &self, other: &Overload, args: &[Type], modules: &M,
  ) -> bool {
    if self.params.len() != other.params.len() { return false }
    let mut any_strict = false;
    for (i, a) in args.iter().enumerate() {
      let mine = &self.params[i];
      let theirs = &other.params[i];
      let mine_exact = crate::symtab::type_equal(a, mine, modules);
      let theirs_exact = crate::symtab::type_equal(a, theirs, modules);
      if theirs_exact && !mine_exact { any_strict = true }
      else if mine_exact && !theirs_exact { return false }
    }
    any_strict
  }
}

/// All declarations/definitions of one function name within a module
/// (§3's "overload set", "an ordered sequence of overloads").
#[derive(Clone, Debug, Default)]
pub struct OverloadSet(pub Vec<Overload>);

impl OverloadSet {
  /// Same parameter-type sequence as `params` already present? (§8
  /// invariant: no two overloads in one set share a parameter-type
  /// sequence.)
  #[must_use] pub fn find_by_signature<M: crate::symtab::Modules>(&self, params: &[Type], modules: &M) -> Option<usize> {
    self.0.iter().position(|o| o.params.len() == params.len()
      && o.params.iter().zip(params).all(|(a, b)| crate::symtab::type_equal(a, b, modules)))
  }
}

/// The kind-specific payload of a symbol-table entry (§3's "Symbol entry").
#[derive(Debug)]
pub enum EntryKind {
  /// A forward declaration of a struct/union/enum, not yet defined.
  /// `definition` is patched in place when the full definition arrives
  /// (§9, "arena + stable index": a data write, not a pointer rewrite).
  OpaqueType { definition: Cell<Option<SymbolId>> },
  Struct { fields: Vec<(Symbol, Type)> },
  Union { options: Vec<(Symbol, Type)> },
  /// Enum constants are implicitly `int`-valued in declaration order;
  /// the source language gives no explicit discriminants (§3).
  Enum { constants: Vec<Symbol> },
  Typedef { target: Type },
  Variable { ty: Type },
  Function { overloads: OverloadSet },
}

impl EntryKind {
  #[must_use] pub fn kind_name(&self) -> &'static str {
    match self {
      EntryKind::OpaqueType { .. } => "an opaque type",
      EntryKind::Struct { .. } => "a struct",
      EntryKind::Union { .. } => "a union",
      EntryKind::Enum { .. } => "an enum",
      EntryKind::Typedef { .. } => "a typedef",
      EntryKind::Variable { .. } => "a variable",
      EntryKind::Function { .. } => "a function",
    }
  }

  #[must_use] pub fn is_type_naming(&self) -> bool {
    matches!(self, EntryKind::OpaqueType { .. } | EntryKind::Struct { .. }
      | EntryKind::Union { .. } | EntryKind::Enum { .. } | EntryKind::Typedef { .. })
  }
}

/// A named program object, keyed by name in a [`crate::symtab::SymbolTable`].
#[derive(Debug)]
pub struct Entry {
  pub name: Symbol,
  pub span: FileSpan,
  pub kind: EntryKind,
}

impl Entry {
  #[must_use] pub fn new(name: Symbol, span: FileSpan, kind: EntryKind) -> Self {
    Self { name, span, kind }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symtab::{Modules, SymbolTable};
  use crate::symbol::Symbol;
  use crate::types::ty::Keyword;
  use crate::types::ModuleId;

  fn ty(k: Keyword) -> Type { Type::keyword(k) }

  struct NoModules;
  impl Modules for NoModules {
    fn table(&self, _: ModuleId) -> &SymbolTable { unreachable!("no References in these tests") }
    fn module_name(&self, _: ModuleId) -> Symbol { unreachable!("no References in these tests") }
  }

  #[test]
  fn arity_matches_accounts_for_optional_params() {
    let o = Overload {
      ret: ty(Keyword::Void),
      params: SmallVec::from_vec(vec![ty(Keyword::Int), ty(Keyword::Int)]),
      num_optional: 1,
      defined: true,
    };
    assert!(o.arity_matches(1));
    assert!(o.arity_matches(2));
    assert!(!o.arity_matches(0));
    assert!(!o.arity_matches(3));
  }

  #[test]
  fn overload_set_finds_identical_signature() {
    let mut set = OverloadSet::default();
    set.0.push(Overload {
      ret: ty(Keyword::Int),
      params: SmallVec::from_vec(vec![ty(Keyword::Int)]),
      num_optional: 0,
      defined: true,
    });
    assert!(set.find_by_signature(&[ty(Keyword::Int)], &NoModules).is_some());
    assert!(set.find_by_signature(&[ty(Keyword::Long)], &NoModules).is_none());
  }
}
