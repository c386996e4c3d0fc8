//! The `Type` model (C1): construction, deep copy, structural/opaque-aware
//! equality, qualification, implicit convertibility, and rendering.
//!
//! Grounded on `ast/type.c` in `original_source`: the seven `TypeKind`
//! variants, the qualifier/pointer/array rendering rules, and the
//! opaque/definition transparency built into equality are all pinned from
//! that file.

use itertools::Itertools;
use super::{ModuleId, SymbolId};

/// The primitive keyword types (`spec.md` §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Keyword {
  Void,
  Byte, UByte,
  Short, UShort,
  Int, UInt,
  Long, ULong,
  Char, WChar,
  Float, Double,
  Bool,
}

impl Keyword {
  #[must_use] pub fn render(self) -> &'static str {
    match self {
      Keyword::Void => "void",
      Keyword::Byte => "byte", Keyword::UByte => "ubyte",
      Keyword::Short => "short", Keyword::UShort => "ushort",
      Keyword::Int => "int", Keyword::UInt => "uint",
      Keyword::Long => "long", Keyword::ULong => "ulong",
      Keyword::Char => "char", Keyword::WChar => "wchar",
      Keyword::Float => "float", Keyword::Double => "double",
      Keyword::Bool => "bool",
    }
  }

  /// Is this one of the integer (as opposed to floating or `bool`) keywords?
  #[must_use] pub fn is_integral(self) -> bool {
    matches!(self, Keyword::Byte | Keyword::UByte | Keyword::Short | Keyword::UShort
      | Keyword::Int | Keyword::UInt | Keyword::Long | Keyword::ULong
      | Keyword::Char | Keyword::WChar)
  }

  #[must_use] pub fn is_float(self) -> bool { matches!(self, Keyword::Float | Keyword::Double) }

  /// `true` for the unsigned integer keywords, including `char`/`wchar`
  /// (pinned in `SPEC_FULL.md` §4.1 as the unsigned-rank peers of
  /// `ubyte`/`ushort`, since the source gives them no explicit rank).
  #[must_use] pub fn is_unsigned(self) -> bool {
    matches!(self, Keyword::UByte | Keyword::UShort | Keyword::UInt | Keyword::ULong
      | Keyword::Char | Keyword::WChar)
  }

  /// Byte width used only to order widenings within one signedness class;
  /// `char` is pinned to the width of `ubyte`, `wchar` to the width of
  /// `uint` (a 32-bit wide character), per `SPEC_FULL.md` §4.1.
  #[must_use] pub fn rank(self) -> u8 {
    match self {
      Keyword::Byte | Keyword::UByte | Keyword::Char => 1,
      Keyword::Short | Keyword::UShort => 2,
      Keyword::Int | Keyword::UInt | Keyword::WChar => 4,
      Keyword::Long | Keyword::ULong => 8,
      Keyword::Float => 4, Keyword::Double => 8,
      Keyword::Void | Keyword::Bool => 0,
    }
  }
}

/// A type. Sub-types are owned (`Box`), so `Clone` is always a full deep
/// copy, matching `typeCopy`'s recursive-malloc behavior in `ast/type.c`.
#[derive(Clone, Debug)]
pub struct Type(pub Box<TypeKind>);

#[derive(Clone, Debug)]
pub enum TypeKind {
  Keyword(Keyword),
  Qualified { base: Type, is_const: bool, is_volatile: bool },
  Pointer(Type),
  Array { len: u64, elem: Type },
  FuncPtr { ret: Type, args: Vec<Type> },
  Aggregate(Vec<Type>),
  /// `entry` is table-relative (see [`super::super::symtab`]); `id` is the
  /// source identifier text, kept so rendering never needs table access.
  Reference { module: ModuleId, entry: SymbolId, id: crate::symbol::Symbol },
}

impl Type {
  #[must_use] pub fn keyword(k: Keyword) -> Self { Type(Box::new(TypeKind::Keyword(k))) }

  /// Builds a qualified type. Panics if neither flag is set (§3 invariant);
  /// if `base` is itself qualified, merges the flags into it instead of
  /// nesting (§3 invariant: "qualified is never nested inside qualified"),
  /// the same collapsing `buildSymbolTable.c`'s `astToType` performs for
  /// `const const T`.
  #[must_use] pub fn qualified(base: Type, is_const: bool, is_volatile: bool) -> Self {
    assert!(is_const || is_volatile, "qualified type must set const or volatile");
    if let TypeKind::Qualified { base: inner, is_const: c, is_volatile: v } = *base.0 {
      return Type::qualified(inner, is_const || c, is_volatile || v);
    }
    Type(Box::new(TypeKind::Qualified { base, is_const, is_volatile }))
  }

  #[must_use] pub fn pointer(base: Type) -> Self { Type(Box::new(TypeKind::Pointer(base))) }

  #[must_use] pub fn array(len: u64, elem: Type) -> Self { Type(Box::new(TypeKind::Array { len, elem })) }

  #[must_use] pub fn func_ptr(ret: Type, args: Vec<Type>) -> Self {
    Type(Box::new(TypeKind::FuncPtr { ret, args }))
  }

  #[must_use] pub fn aggregate(parts: Vec<Type>) -> Self { Type(Box::new(TypeKind::Aggregate(parts))) }

  #[must_use] pub fn reference(module: ModuleId, entry: SymbolId, id: crate::symbol::Symbol) -> Self {
    Type(Box::new(TypeKind::Reference { module, entry, id }))
  }

  #[must_use] pub fn kind(&self) -> &TypeKind { &self.0 }

  #[must_use] pub fn is_keyword(&self, k: Keyword) -> bool {
    matches!(&*self.0, TypeKind::Keyword(kk) if *kk == k)
  }

  /// Strips qualifiers, returning the unqualified base (or `self` if it was
  /// never qualified).
  #[must_use] pub fn unqualified(&self) -> &Type {
    match &*self.0 {
      TypeKind::Qualified { base, .. } => base.unqualified(),
      _ => self,
    }
  }

  #[must_use] pub fn is_const(&self) -> bool {
    matches!(&*self.0, TypeKind::Qualified { is_const: true, .. })
  }

  /// Equality parameterized over how two `Reference` entries compare;
  /// `ref_eq(m_a, a, m_b, b)` should implement the opaque/definition
  /// transparency of `ast/type.c`'s `typeEqual` when the caller has table
  /// access (see [`crate::symtab::type_equal`]), or plain identity when it
  /// doesn't (see [`Type::implicitly_convertible`]).
  pub fn equal_with(a: &Type, b: &Type, ref_eq: &mut impl FnMut(ModuleId, SymbolId, ModuleId, SymbolId) -> bool) -> bool {
    match (&*a.0, &*b.0) {
      (TypeKind::Keyword(x), TypeKind::Keyword(y)) => x == y,
      (TypeKind::Qualified { base: ba, is_const: ca, is_volatile: va },
       TypeKind::Qualified { base: bb, is_const: cb, is_volatile: vb }) =>
        ca == cb && va == vb && Type::equal_with(ba, bb, ref_eq),
      (TypeKind::Pointer(ba), TypeKind::Pointer(bb)) => Type::equal_with(ba, bb, ref_eq),
      (TypeKind::Array { len: la, elem: ea }, TypeKind::Array { len: lb, elem: eb }) =>
        la == lb && Type::equal_with(ea, eb, ref_eq),
      (TypeKind::FuncPtr { ret: ra, args: aa }, TypeKind::FuncPtr { ret: rb, args: ab }) =>
        Type::equal_with(ra, rb, ref_eq) && aa.len() == ab.len()
          && aa.iter().zip(ab).all(|(x, y)| Type::equal_with(x, y, ref_eq)),
      (TypeKind::Aggregate(aa), TypeKind::Aggregate(ab)) =>
        aa.len() == ab.len() && aa.iter().zip(ab).all(|(x, y)| Type::equal_with(x, y, ref_eq)),
      (TypeKind::Reference { module: ma, entry: ea, .. }, TypeKind::Reference { module: mb, entry: eb, .. }) =>
        ref_eq(*ma, *ea, *mb, *eb),
      _ => false,
    }
  }

  /// Structural equality with `Reference`s compared by raw identity only
  /// (no opaque transparency). Used where no symbol table is at hand, e.g.
  /// [`Type::implicitly_convertible`].
  #[must_use] pub fn identity_eq(a: &Type, b: &Type) -> bool {
    Type::equal_with(a, b, &mut |ma, ea, mb, eb| ma == mb && ea == eb)
  }

  /// The implicit-coercion lattice pinned in `SPEC_FULL.md` §4.1.
  #[must_use] pub fn implicitly_convertible(from: &Type, to: &Type) -> bool {
    if Type::identity_eq(from, to) { return true }
    match (&*from.0, &*to.0) {
      (TypeKind::Keyword(f), TypeKind::Keyword(t)) => {
        if f.is_integral() && t.is_integral() {
          f.is_unsigned() == t.is_unsigned() && f.rank() <= t.rank()
        } else {
          matches!((f, t), (Keyword::Float, Keyword::Double))
        }
      }
      (TypeKind::Array { elem, .. }, TypeKind::Pointer(to_base)) =>
        Type::identity_eq(elem, to_base),
      // Adding `const` is silent; removing it is never implicit (only via
      // explicit `cast[T]`, §4.5).
      (from_base, TypeKind::Qualified { base: to_base, is_const: true, is_volatile: false })
        if !matches!(from_base, TypeKind::Qualified { .. }) =>
        Type::identity_eq(from, to_base),
      _ => false,
    }
  }

  /// Textual rendering used in diagnostics, pinned from `typeToString`.
  #[must_use] pub fn render(&self) -> String {
    match &*self.0 {
      TypeKind::Keyword(k) => k.render().to_owned(),
      TypeKind::Qualified { base, is_const, is_volatile } => {
        let b = base.render();
        match (is_volatile, is_const) {
          (true, true) => format!("{b} volatile const"),
          (false, true) => format!("{b} const"),
          _ => format!("{b} volatile"),
        }
      }
      TypeKind::Pointer(base) => {
        let b = base.render();
        if b.ends_with('*') { format!("{b}*") } else { format!("{b} *") }
      }
      TypeKind::Array { len, elem } => format!("{}[{len}]", elem.render()),
      TypeKind::FuncPtr { ret, args } =>
        format!("{}({})", ret.render(), args.iter().map(Type::render).join(",")),
      TypeKind::Aggregate(parts) =>
        format!("{{{}}}", parts.iter().map(Type::render).join(",")),
      TypeKind::Reference { id, .. } => crate::symbol::resolve(*id),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symbol::intern;

  fn m() -> ModuleId { ModuleId(0) }
  fn refs(id: u32) -> Type { Type::reference(m(), SymbolId(id), intern("S")) }

  #[test]
  fn deep_copy_preserves_equality_and_render() {
    let t = Type::pointer(Type::array(4, Type::keyword(Keyword::Int)));
    let copy = t.clone();
    assert!(Type::identity_eq(&t, &copy));
    assert_eq!(t.render(), copy.render());
    assert_eq!(t.render(), "int[4] *");
  }

  #[test]
  fn qualified_render_order() {
    let t = Type::qualified(Type::keyword(Keyword::Int), true, true);
    assert_eq!(t.render(), "int volatile const");
  }

  #[test]
  fn qualified_never_nests() {
    let inner = Type::qualified(Type::keyword(Keyword::Int), true, false);
    let outer = Type::qualified(inner, true, true);
    match &*outer.0 {
      TypeKind::Qualified { base, is_const, is_volatile } => {
        assert!(*is_const && *is_volatile);
        assert!(!matches!(&*base.0, TypeKind::Qualified { .. }));
      }
      _ => panic!("expected qualified"),
    }
  }

  #[test]
  fn pointer_star_spacing() {
    let pp = Type::pointer(Type::pointer(Type::keyword(Keyword::Char)));
    assert_eq!(pp.render(), "char **");
  }

  #[test]
  fn int_widens_to_long_but_not_reverse() {
    let int = Type::keyword(Keyword::Int);
    let long = Type::keyword(Keyword::Long);
    assert!(Type::implicitly_convertible(&int, &long));
    assert!(!Type::implicitly_convertible(&long, &int));
  }

  #[test]
  fn signed_and_unsigned_never_implicitly_convert() {
    let int = Type::keyword(Keyword::Int);
    let uint = Type::keyword(Keyword::UInt);
    assert!(!Type::implicitly_convertible(&int, &uint));
    assert!(!Type::implicitly_convertible(&uint, &int));
  }

  #[test]
  fn array_decays_to_pointer() {
    let arr = Type::array(3, Type::keyword(Keyword::Int));
    let ptr = Type::pointer(Type::keyword(Keyword::Int));
    assert!(Type::implicitly_convertible(&arr, &ptr));
    assert!(!Type::implicitly_convertible(&ptr, &arr));
  }

  #[test]
  fn const_add_is_silent_remove_is_not() {
    let int = Type::keyword(Keyword::Int);
    let const_int = Type::qualified(Type::keyword(Keyword::Int), true, false);
    assert!(Type::implicitly_convertible(&int, &const_int));
    assert!(!Type::implicitly_convertible(&const_int, &int));
  }

  #[test]
  fn identity_eq_is_by_raw_entry_identity() {
    let a = refs(1);
    let b = refs(1);
    let c = refs(2);
    assert!(Type::identity_eq(&a, &b));
    assert!(!Type::identity_eq(&a, &c));
  }
}
