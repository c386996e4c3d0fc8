//! Symbol table & environment (C2): a sorted, name-keyed entry arena with
//! binary-search lookup, plus the scope stack and import map that make up
//! an [`Environment`].
//!
//! Grounded on `util/symbolTable.c`: `symbolTableLookupExpectedIndex`
//! becomes [`SymbolTable::expected_index`], `symbolTableInsert`'s
//! duplicate check becomes [`SymbolTable::insert`]'s `Err(EEXISTS)` path.
//! The C original re-sorts a flat array on every insert; we instead keep a
//! stable arena (so opaque back-pointers never dangle, per §9) alongside a
//! sorted name index into it.

use crate::span::FileSpan;
use crate::symbol::{self, Symbol};
use crate::types::entity::{Entry, EntryKind, Overload, OverloadSet};
use crate::types::ty::Type;
use crate::types::{Idx, ModuleId, SymbolId};

/// `symbolTableInsert`'s `ST_EEXISTS`.
#[derive(Debug, PartialEq, Eq)]
pub struct AlreadyExists;

/// A single module's symbol table: every entry ever created for this
/// module (the arena), and the current name→entry binding (the sorted
/// index), which can move when a name is superseded.
#[derive(Default, Debug)]
pub struct SymbolTable {
  arena: Vec<Entry>,
  /// Sorted by the resolved text of `Symbol`, mirroring the C original's
  /// `strcmp`-ordered array.
  order: Vec<(Symbol, SymbolId)>,
  /// Other modules this one imports, in import-statement order (§3,
  /// "parallel mapping from imported-module name to that module's symbol
  /// table").
  pub imports: Vec<(Symbol, ModuleId)>,
}

impl SymbolTable {
  #[must_use] pub fn new() -> Self { Self::default() }

  fn name_text(name: Symbol) -> String { symbol::resolve(name) }

  fn expected_index(&self, name: Symbol) -> usize {
    let text = Self::name_text(name);
    self.order.partition_point(|&(s, _)| Self::name_text(s) < text)
  }

  /// Binary-search lookup by name (§3, "O(log n) lookup by binary
  /// search").
  #[must_use] pub fn lookup(&self, name: Symbol) -> Option<SymbolId> {
    let idx = self.expected_index(name);
    self.order.get(idx).filter(|&&(s, _)| s == name).map(|&(_, id)| id)
  }

  #[must_use] pub fn get(&self, id: SymbolId) -> &Entry { &self.arena[id.into_usize()] }
  pub fn get_mut(&mut self, id: SymbolId) -> &mut Entry { &mut self.arena[id.into_usize()] }

  /// Insert a brand-new entry. Fails with [`AlreadyExists`] if the name
  /// already resolves to something (§2, "no two entries share a name
  /// within one table").
  pub fn insert(&mut self, name: Symbol, span: FileSpan, kind: EntryKind) -> Result<SymbolId, AlreadyExists> {
    if self.lookup(name).is_some() { return Err(AlreadyExists) }
    let id = SymbolId::from_usize(self.arena.len());
    self.arena.push(Entry::new(name, span, kind));
    let idx = self.expected_index(name);
    self.order.insert(idx, (name, id));
    Ok(id)
  }

  /// Supersede an existing entry (typically an [`EntryKind::OpaqueType`])
  /// with a brand-new one under the same name, per §4.4: "A prior opaque
  /// entry with the same name is patched: its definition back-pointer is
  /// set to the new entry; the new entry supersedes." The old arena slot
  /// is left in place (so any `Type::Reference` already pointing at it
  /// keeps resolving, now via the patched back-pointer) and the name index
  /// is repointed at the new slot.
  pub fn supersede(&mut self, old: SymbolId, name: Symbol, span: FileSpan, kind: EntryKind) -> SymbolId {
    let new_id = SymbolId::from_usize(self.arena.len());
    self.arena.push(Entry::new(name, span, kind));
    if let EntryKind::OpaqueType { definition } = &self.arena[old.into_usize()].kind {
      definition.set(Some(new_id));
    }
    let idx = self.order.iter().position(|&(_, id)| id == old).expect("superseded id not indexed");
    self.order[idx].1 = new_id;
    new_id
  }

  pub fn entries(&self) -> impl Iterator<Item = &Entry> { self.arena.iter() }
}

/// Anything that can resolve a `(ModuleId, SymbolId)` reference to an
/// [`Entry`] — implemented by the multi-module `Program` built in
/// [`crate::build_symtab`]. Parameterizing [`type_equal`] over this trait
/// (rather than a concrete `Program`) keeps the type model's crate-level
/// dependency graph acyclic: `symtab` depends on `types::ty`, never the
/// reverse.
pub trait Modules {
  fn table(&self, m: ModuleId) -> &SymbolTable;
  /// The name a module was declared under — C7 needs it to mangle
  /// module-qualified global labels (§6).
  fn module_name(&self, m: ModuleId) -> Symbol;
}

/// Type equality with full opaque/definition transparency (`ast/type.c`'s
/// `typeEqual`, `TK_REFERENCE` case): two references are equal if they
/// name the same entry, or either side is opaque and resolves (directly or
/// transitively) to the other.
pub fn type_equal(a: &Type, b: &Type, modules: &impl Modules) -> bool {
  Type::equal_with(a, b, &mut |ma, ea, mb, eb| entries_equal(modules, ma, ea, mb, eb))
}

fn resolve_opaque(modules: &impl Modules, m: ModuleId, id: SymbolId) -> (ModuleId, SymbolId) {
  match &modules.table(m).get(id).kind {
    EntryKind::OpaqueType { definition } => match definition.get() {
      Some(def) => resolve_opaque(modules, m, def),
      None => (m, id),
    },
    _ => (m, id),
  }
}

fn entries_equal(modules: &impl Modules, ma: ModuleId, ea: SymbolId, mb: ModuleId, eb: SymbolId) -> bool {
  if ma == mb && ea == eb { return true }
  resolve_opaque(modules, ma, ea) == resolve_opaque(modules, mb, eb)
}

/// One block scope (compound statement, loop, or function body).
#[derive(Default, Debug)]
pub struct Scope(Vec<(Symbol, Type)>);

impl Scope {
  #[must_use] pub fn new() -> Self { Self::default() }
  pub fn bind(&mut self, name: Symbol, ty: Type) { self.0.push((name, ty)); }
  #[must_use] pub fn lookup(&self, name: Symbol) -> Option<&Type> {
    self.0.iter().rev().find(|(s, _)| *s == name).map(|(_, t)| t)
  }
}

/// Where a name resolved to.
pub enum Resolved<'a> {
  /// A block-local variable; it has a type but no symbol-table entry.
  Local(&'a Type),
  /// A module-scope (or imported-module) entry.
  Global { module: ModuleId, id: SymbolId },
}

/// The stack of scopes plus module context described in §3 ("A stack of
/// scopes. The outermost ... is the current module's symbol table.
/// Intermediate scopes are block scopes ...").
pub struct Environment<'a, M: Modules> {
  modules: &'a M,
  pub current: ModuleId,
  scopes: Vec<Scope>,
}

impl<'a, M: Modules> Environment<'a, M> {
  #[must_use] pub fn new(modules: &'a M, current: ModuleId) -> Self {
    Self { modules, current, scopes: Vec::new() }
  }

  pub fn push_scope(&mut self) { self.scopes.push(Scope::new()) }
  pub fn pop_scope(&mut self) { self.scopes.pop(); }

  pub fn bind_local(&mut self, name: Symbol, ty: Type) {
    self.scopes.last_mut().expect("bind_local with no open scope").bind(name, ty);
  }

  #[must_use] pub fn current_table(&self) -> &'a SymbolTable { self.modules.table(self.current) }

  /// Exposes the underlying table context so callers that already hold an
  /// `Environment` can pass it straight into [`type_equal`]/
  /// [`resolve_overload`] instead of comparing `Type`s by raw identity.
  #[must_use] pub fn modules(&self) -> &'a M { self.modules }

  /// Look up any module's table by id, for callers (C3) that already have
  /// a resolved [`ModuleId`] and just need its table.
  #[must_use] pub fn table_of(&self, m: ModuleId) -> &'a SymbolTable { self.modules.table(m) }

  /// `lookup(name)`: walk local scopes outermost-innermost (actually
  /// innermost-first per §3's "walks local scopes ... innermost first"
  /// semantics for shadowing), then the current module, failing that
  /// unresolved. Qualified names go through [`Environment::lookup_qualified`].
  #[must_use] pub fn lookup<'s>(&'s self, name: Symbol) -> Option<Resolved<'s>> {
    for scope in self.scopes.iter().rev() {
      if let Some(ty) = scope.lookup(name) { return Some(Resolved::Local(ty)) }
    }
    self.current_table().lookup(name).map(|id| Resolved::Global { module: self.current, id })
  }

  /// `mod::name` (and no deeper — see `SPEC_FULL.md` §4.2's pinned
  /// simplification: a single level of import qualification).
  #[must_use] pub fn lookup_qualified(&self, module_name: Symbol, name: Symbol) -> Option<Resolved<'static>> {
    let (_, module) = self.current_table().imports.iter().find(|(n, _)| *n == module_name)?;
    self.modules.table(*module).lookup(name).map(|id| Resolved::Global { module: *module, id })
  }
}

/// The outcome of resolving a call's argument types against an overload
/// set (§4.2).
#[derive(Debug, PartialEq, Eq)]
pub enum OverloadResolution {
  Match(usize),
  NoMatch,
  Ambiguous,
}

/// Resolve a call against a function's overload set. Implements §4.2's
/// three conditions and pins the tie-break Open Question (§9) to
/// **"no tie-break, error"**: see `SPEC_FULL.md` §4.2. `modules` gives
/// "exactly equal" opaque/definition transparency per §3's "`opaque X`
/// and the eventual `struct X` compare equal wherever both are visible".
#[must_use] pub fn resolve_overload<M: Modules>(set: &OverloadSet, args: &[Type], modules: &M) -> OverloadResolution {
  let candidates: Vec<(usize, &Overload)> = set.0.iter().enumerate()
    .filter(|(_, o)| o.arity_matches(args.len()))
    .filter(|(_, o)| args.iter().zip(o.params.iter())
      .all(|(a, p)| type_equal(a, p, modules) || Type::implicitly_convertible(a, p)))
    .collect();
  match candidates.len() {
    0 => OverloadResolution::NoMatch,
    1 => OverloadResolution::Match(candidates[0].0),
    _ => {
      // A candidate wins only if no other candidate is strictly more
      // specific than it.
      let winners: Vec<usize> = candidates.iter()
        .filter(|(_, o)| !candidates.iter().any(|(_, other)| o.strictly_less_specific_than(other, args, modules)))
        .map(|(i, _)| *i)
        .collect();
      match winners.len() {
        1 => OverloadResolution::Match(winners[0]),
        _ => OverloadResolution::Ambiguous,
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::span::FileSpan;
  use crate::symbol::intern;
  use crate::types::ty::Keyword;
  use std::cell::Cell;

  struct OneModule(SymbolTable);
  impl Modules for OneModule {
    fn table(&self, _: ModuleId) -> &SymbolTable { &self.0 }
    fn module_name(&self, _: ModuleId) -> Symbol { intern("m") }
  }

  fn span() -> FileSpan { FileSpan { file: intern("t.t"), line: 1, col: 1 } }

  #[test]
  fn insert_and_lookup_distinct_names() {
    let mut t = SymbolTable::new();
    let a = intern("alpha"); let b = intern("beta");
    let ia = t.insert(a, span(), EntryKind::Variable { ty: Type::keyword(Keyword::Int) }).unwrap();
    let ib = t.insert(b, span(), EntryKind::Variable { ty: Type::keyword(Keyword::Int) }).unwrap();
    assert_eq!(t.lookup(a), Some(ia));
    assert_eq!(t.lookup(b), Some(ib));
  }

  #[test]
  fn duplicate_insert_fails_and_leaves_table_unchanged() {
    let mut t = SymbolTable::new();
    let a = intern("gamma");
    t.insert(a, span(), EntryKind::Variable { ty: Type::keyword(Keyword::Int) }).unwrap();
    let before = t.lookup(a);
    let err = t.insert(a, span(), EntryKind::Variable { ty: Type::keyword(Keyword::Long) });
    assert_eq!(err, Err(AlreadyExists));
    assert_eq!(t.lookup(a), before);
  }

  #[test]
  fn opaque_then_struct_compare_equal_via_reference() {
    let mut t = SymbolTable::new();
    let name = intern("S");
    let opaque_id = t.insert(name, span(), EntryKind::OpaqueType { definition: Cell::new(None) }).unwrap();
    let before_ref = Type::reference(ModuleId(0), opaque_id, name);

    let def_id = t.supersede(opaque_id, name, span(),
      EntryKind::Struct { fields: vec![(intern("x"), Type::keyword(Keyword::Int))] });
    let after_ref = Type::reference(ModuleId(0), def_id, name);

    let modules = OneModule(t);
    assert!(type_equal(&before_ref, &after_ref, &modules));
    assert_eq!(modules.table(ModuleId(0)).lookup(name), Some(def_id));
  }

  #[test]
  fn overload_resolution_picks_exact_match() {
    let set = OverloadSet(vec![
      Overload { ret: Type::keyword(Keyword::Void),
        params: smallvec::smallvec![Type::keyword(Keyword::Int)], num_optional: 0, defined: true },
      Overload { ret: Type::keyword(Keyword::Void),
        params: smallvec::smallvec![Type::keyword(Keyword::Long)], num_optional: 0, defined: true },
    ]);
    let modules = OneModule(SymbolTable::new());
    assert_eq!(resolve_overload(&set, &[Type::keyword(Keyword::Int)], &modules), OverloadResolution::Match(0));
    assert_eq!(resolve_overload(&set, &[Type::keyword(Keyword::Long)], &modules), OverloadResolution::Match(1));
  }

  #[test]
  fn overload_resolution_prefers_more_specific_over_converting() {
    let set = OverloadSet(vec![
      Overload { ret: Type::keyword(Keyword::Void),
        params: smallvec::smallvec![Type::keyword(Keyword::Int)], num_optional: 0, defined: true },
      Overload { ret: Type::keyword(Keyword::Void),
        params: smallvec::smallvec![Type::keyword(Keyword::Byte)], num_optional: 0, defined: true },
    ]);
    let modules = OneModule(SymbolTable::new());
    assert_eq!(resolve_overload(&set, &[Type::keyword(Keyword::Byte)], &modules), OverloadResolution::Match(1));
  }

  #[test]
  fn overload_resolution_no_match() {
    let set = OverloadSet(vec![
      Overload { ret: Type::keyword(Keyword::Void),
        params: smallvec::smallvec![Type::keyword(Keyword::Int)], num_optional: 0, defined: true },
    ]);
    let modules = OneModule(SymbolTable::new());
    assert_eq!(resolve_overload(&set, &[Type::keyword(Keyword::Bool)], &modules), OverloadResolution::NoMatch);
  }
}
