//! The minimal AST shape C3 bridges into [`crate::types::ty::Type`] and C4/C5
//! walk. This crate does not parse source text (§1 Non-goals: lexing and
//! parsing are out of scope); callers construct an `Ast` however they like
//! and hand it to [`crate::ast_bridge`]/[`crate::build_symtab`]/[`crate::typeck`].
//!
//! Every node that resolves to a [`crate::types::SymbolId`] or a checked
//! [`crate::types::ty::Type`] carries that slot as an interior-mutable cell,
//! filled in by a later phase (§4.3's "annotates, does not replace" design
//! note) rather than rebuilding the tree.

use std::cell::{Cell, RefCell};

use crate::span::FileSpan;
use crate::symbol::Symbol;
use crate::types::ty::Type;
use crate::types::SymbolId;

/// A parsed (but not yet type-bridged) type expression, the AST-level
/// counterpart to [`crate::types::ty::Type`] that `astToType`-equivalent
/// logic (C3) consumes.
#[derive(Clone, Debug)]
pub enum TypeExpr {
  Keyword(crate::types::ty::Keyword),
  /// A bare identifier naming a struct/union/enum/typedef, or an imported
  /// `mod::name` (the second component is `None` for an unqualified name).
  Named { module: Option<Symbol>, name: Symbol, span: FileSpan },
  /// One `const`/`volatile` specifier as written; duplicates and the
  /// const-before-or-after-type position are both legal and both handled
  /// by C3 (§4.3).
  Qualified { base: Box<TypeExpr>, is_const: bool, is_volatile: bool, span: FileSpan },
  Pointer(Box<TypeExpr>),
  /// `len` is itself an expression; C3 requires it fold to a non-negative
  /// compile-time integer constant (§4.3 edge case).
  Array { len: Box<Expr>, elem: Box<TypeExpr> },
  FuncPtr { ret: Box<TypeExpr>, args: Vec<TypeExpr> },
}

/// A resolved-or-not identifier: parses as just a [`Symbol`], and gets a
/// [`SymbolId`] filled in once C4/C5 resolve it.
#[derive(Debug)]
pub struct Ident {
  pub name: Symbol,
  pub span: FileSpan,
  pub resolved: Cell<Option<SymbolId>>,
}

impl Ident {
  #[must_use] pub fn new(name: Symbol, span: FileSpan) -> Self {
    Self { name, span, resolved: Cell::new(None) }
  }
}

#[derive(Debug)]
pub enum ExprKind {
  IntLit(i64),
  FloatLit(f64),
  StringLit(Symbol),
  Ident(Ident),
  /// `module::name` (§6: "Parser → core" scoped identifiers), one level
  /// of qualification only (per `SPEC_FULL.md` §4.2's pinned simplification).
  Qualified { module: Symbol, name: Symbol, resolved: Cell<Option<SymbolId>> },
  Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
  Unary { op: UnOp, operand: Box<Expr> },
  Call { callee: Box<Expr>, args: Vec<Expr> },
  Subscript { base: Box<Expr>, index: Box<Expr> },
  Member { base: Box<Expr>, field: Symbol },
  Ternary { cond: Box<Expr>, yes: Box<Expr>, no: Box<Expr> },
  Cast { to: TypeExpr, operand: Box<Expr> },
  SizeofType(TypeExpr),
  SizeofExpr(Box<Expr>),
  Assign { lhs: Box<Expr>, rhs: Box<Expr> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp { Add, Sub, Mul, Div, Mod, Shl, Shr, BitAnd, BitOr, BitXor,
  Lt, Le, Gt, Ge, Eq, Ne, And, Or }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp { Neg, Not, BitNot, Deref, AddrOf }

/// One expression node. `ty` is filled in by C5; left `None` until then.
#[derive(Debug)]
pub struct Expr {
  pub kind: ExprKind,
  pub span: FileSpan,
  pub ty: RefCell<Option<Type>>,
}

impl Expr {
  #[must_use] pub fn new(kind: ExprKind, span: FileSpan) -> Self {
    Self { kind, span, ty: RefCell::new(None) }
  }
}

#[derive(Debug)]
pub enum Stmt {
  Expr(Expr),
  VarDecl { name: Symbol, span: FileSpan, declared_ty: TypeExpr, init: Option<Expr> },
  Block(Vec<Stmt>),
  If { cond: Expr, then: Box<Stmt>, else_: Option<Box<Stmt>> },
  While { cond: Expr, body: Box<Stmt> },
  DoWhile { body: Box<Stmt>, cond: Expr },
  For { init: Option<Box<Stmt>>, cond: Option<Expr>, step: Option<Expr>, body: Box<Stmt> },
  /// Linear-chain-vs-jump-table is C7's call, not the AST's (§4.6).
  Switch { scrutinee: Expr, cases: Vec<(Option<i64>, Vec<Stmt>)> },
  Break,
  Continue,
  Return(Option<Expr>),
  Asm(Symbol),
}

#[derive(Debug)]
pub struct Param {
  pub name: Symbol,
  pub span: FileSpan,
  pub ty: TypeExpr,
  pub default: Option<Expr>,
}

#[derive(Debug)]
pub enum TopLevel {
  FuncDecl { name: Symbol, span: FileSpan, ret: TypeExpr, params: Vec<Param> },
  FuncDefn { name: Symbol, span: FileSpan, ret: TypeExpr, params: Vec<Param>, body: Vec<Stmt> },
  VarDecl { name: Symbol, span: FileSpan, ty: TypeExpr, init: Option<Expr> },
  StructDecl { name: Symbol, span: FileSpan, fields: Option<Vec<(Symbol, TypeExpr)>> },
  UnionDecl { name: Symbol, span: FileSpan, options: Option<Vec<(Symbol, TypeExpr)>> },
  EnumDecl { name: Symbol, span: FileSpan, constants: Option<Vec<Symbol>> },
  Typedef { name: Symbol, span: FileSpan, target: TypeExpr },
}

/// Which of C4's two passes a file belongs to (§4.4: "the first pass
/// visits declaration files; the second visits code files").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind { Declaration, Code }

/// One source file: its module name, its imports, and its top-level forms,
/// in declaration order (order matters for C4's two-pass, declaration-file
/// vs. code-file handling, §4.4).
#[derive(Debug)]
pub struct Module {
  pub name: Symbol,
  pub kind: FileKind,
  pub imports: Vec<Symbol>,
  pub decls: Vec<TopLevel>,
}
