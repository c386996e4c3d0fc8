//! C3: bridges a parsed [`crate::ast::TypeExpr`] into a checked
//! [`crate::types::ty::Type`], resolving named types against an
//! [`Environment`] and folding array-length expressions to constants.
//!
//! Grounded on `typecheck/buildSymbolTable.c`'s `astToType`: the keyword
//! table, the named-type lookup (including the "unqualified lookup, then
//! `mod::name` lookup" order), the array-size-must-be-a-non-negative
//! compile-time-constant check, and the duplicate-`const`-specifier
//! tri-level warning are all pinned from that function.

use crate::ast::{Expr, ExprKind, TypeExpr, UnOp};
use crate::diag::{Options, Sink, WarnClass};
use crate::span::FileSpan;
use crate::symbol::Symbol;
use crate::symtab::{Environment, Modules, Resolved};
use crate::types::entity::EntryKind;
use crate::types::ty::Type;

/// Fold a constant-integer expression at bridge time. Only the forms
/// `astToType` itself needs to accept for an array bound are supported:
/// integer literals and unary negation of one. Anything else is not a
/// compile-time constant as far as this bridge is concerned (§4.3 edge
/// case: "a non-constant or negative array size is an error").
fn const_eval_i64(e: &Expr) -> Option<i64> {
  match &e.kind {
    ExprKind::IntLit(n) => Some(*n),
    ExprKind::Unary { op: UnOp::Neg, operand } => const_eval_i64(operand).map(|n| -n),
    _ => None,
  }
}

/// Resolve a possibly-qualified type name to the entry it names. Mirrors
/// [`Environment::lookup`]/[`Environment::lookup_qualified`]'s split, but
/// narrowed to the type-naming subset of [`EntryKind`].
fn resolve_named<'a, M: Modules>(
  env: &Environment<'a, M>, module: Option<Symbol>, name: Symbol, span: FileSpan, sink: &mut Sink,
) -> Option<(crate::types::ModuleId, crate::types::SymbolId)> {
  let resolved = match module {
    Some(m) => env.lookup_qualified(m, name),
    None => env.lookup(name),
  };
  match resolved {
    Some(Resolved::Global { module: m, id }) => {
      let table = env_table(env, m);
      if table.get(id).kind.is_type_naming() { Some((m, id)) }
      else {
        sink.error(span, format!("{} does not name a type", crate::symbol::resolve(name)));
        None
      }
    }
    Some(Resolved::Local(_)) => {
      sink.error(span, format!("{} is a local variable, not a type", crate::symbol::resolve(name)));
      None
    }
    None => {
      sink.error(span, format!("{}: undeclared name", crate::symbol::resolve(name)));
      None
    }
  }
}

fn env_table<'a, M: Modules>(env: &Environment<'a, M>, m: crate::types::ModuleId) -> &'a crate::symtab::SymbolTable {
  env.table_of(m)
}

/// Bridges one [`TypeExpr`] into a [`Type`], emitting diagnostics into
/// `sink` rather than returning a `Result`: `astToType` itself keeps
/// walking after an error so it can report every problem in one pass,
/// and returns a placeholder type for the failed subtree (here: `int`,
/// matching the original's error-recovery fallback).
pub fn bridge_type<M: Modules>(
  expr: &TypeExpr, env: &Environment<'_, M>, options: &Options, sink: &mut Sink,
) -> Type {
  match expr {
    TypeExpr::Keyword(k) => Type::keyword(*k),

    TypeExpr::Named { module, name, span } => {
      match resolve_named(env, *module, *name, *span, sink) {
        Some((m, id)) => Type::reference(m, id, *name),
        None => Type::keyword(crate::types::ty::Keyword::Int),
      }
    }

    TypeExpr::Qualified { base, is_const, is_volatile, span } => {
      let inner = bridge_type(base, env, options, sink);
      if inner.is_const() && *is_const {
        sink.tri(options, WarnClass::DuplicateDeclSpecifier, *span, "duplicate 'const' specifier");
      }
      if !is_const && !is_volatile { return inner }
      Type::qualified(inner, *is_const || inner.is_const(), *is_volatile)
    }

    TypeExpr::Pointer(base) => Type::pointer(bridge_type(base, env, options, sink)),

    TypeExpr::Array { len, elem } => {
      let elem_ty = bridge_type(elem, env, options, sink);
      match const_eval_i64(len) {
        Some(n) if n >= 0 => Type::array(n as u64, elem_ty),
        Some(_) => {
          sink.error(len.span, "array size must not be negative");
          Type::array(0, elem_ty)
        }
        None => {
          sink.error(len.span, "array size must be a compile-time constant");
          Type::array(0, elem_ty)
        }
      }
    }

    TypeExpr::FuncPtr { ret, args } => {
      let ret_ty = bridge_type(ret, env, options, sink);
      let arg_tys = args.iter().map(|a| bridge_type(a, env, options, sink)).collect();
      Type::func_ptr(ret_ty, arg_tys)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::{BinOp};
  use crate::span::FileSpan;
  use crate::symbol::intern;
  use crate::symtab::SymbolTable;
  use crate::types::ModuleId;

  struct OneModule(SymbolTable);
  impl Modules for OneModule {
    fn table(&self, _: ModuleId) -> &SymbolTable { &self.0 }
    fn module_name(&self, _: ModuleId) -> Symbol { intern("t") }
  }

  fn span() -> FileSpan { FileSpan { file: intern("t.t"), line: 1, col: 1 } }

  #[test]
  fn keyword_bridges_directly() {
    let modules = OneModule(SymbolTable::new());
    let env = Environment::new(&modules, ModuleId(0));
    let mut sink = Sink::new();
    let ty = bridge_type(&TypeExpr::Keyword(crate::types::ty::Keyword::Int), &env, &Options::default(), &mut sink);
    assert!(ty.is_keyword(crate::types::ty::Keyword::Int));
    assert!(!sink.has_errors());
  }

  #[test]
  fn duplicate_const_warns_by_default() {
    let modules = OneModule(SymbolTable::new());
    let env = Environment::new(&modules, ModuleId(0));
    let mut sink = Sink::new();
    let expr = TypeExpr::Qualified {
      base: Box::new(TypeExpr::Qualified {
        base: Box::new(TypeExpr::Keyword(crate::types::ty::Keyword::Int)),
        is_const: true, is_volatile: false, span: span(),
      }),
      is_const: true, is_volatile: false, span: span(),
    };
    let ty = bridge_type(&expr, &env, &Options::default(), &mut sink);
    assert!(ty.is_const());
    assert_eq!(sink.diagnostics().len(), 1);
    assert!(!sink.has_errors());
  }

  #[test]
  fn array_with_non_constant_size_errors() {
    let modules = OneModule(SymbolTable::new());
    let env = Environment::new(&modules, ModuleId(0));
    let mut sink = Sink::new();
    let non_const = Expr::new(ExprKind::Ident(crate::ast::Ident::new(intern("n"), span())), span());
    let expr = TypeExpr::Array {
      len: Box::new(non_const),
      elem: Box::new(TypeExpr::Keyword(crate::types::ty::Keyword::Int)),
    };
    bridge_type(&expr, &env, &Options::default(), &mut sink);
    assert!(sink.has_errors());
  }

  #[test]
  fn array_with_negative_size_errors() {
    let modules = OneModule(SymbolTable::new());
    let env = Environment::new(&modules, ModuleId(0));
    let mut sink = Sink::new();
    let neg = Expr::new(ExprKind::Unary {
      op: crate::ast::UnOp::Neg,
      operand: Box::new(Expr::new(ExprKind::IntLit(3), span())),
    }, span());
    let expr = TypeExpr::Array {
      len: Box::new(neg),
      elem: Box::new(TypeExpr::Keyword(crate::types::ty::Keyword::Int)),
    };
    bridge_type(&expr, &env, &Options::default(), &mut sink);
    assert!(sink.has_errors());
  }

  #[allow(dead_code)]
  fn use_binop(_: BinOp) {}
}
