//! C5: walks a type-annotated AST, attaching a [`Type`] to every
//! [`Expr`] and a resolved [`crate::types::SymbolId`] to every identifier,
//! and emitting diagnostics for type errors. Grounded on §4.5's operator
//! typing rules; no single source file pins these exactly (the original's
//! typechecker was out of the retrieved file set), so each rule below cites
//! the clause of §4.5 it implements.

use crate::ast::{BinOp, Expr, ExprKind, Param, Stmt, TopLevel, TypeExpr, UnOp};
use crate::ast_bridge::bridge_type;
use crate::diag::{Options, Sink};
use crate::span::FileSpan;
use crate::symbol::Symbol;
use crate::symtab::{resolve_overload, Environment, Modules, OverloadResolution, Resolved};
use crate::types::entity::EntryKind;
use crate::types::ty::{Keyword, Type};

fn bool_ty() -> Type { Type::keyword(Keyword::Bool) }
fn ulong_ty() -> Type { Type::keyword(Keyword::ULong) }

fn is_integral(t: &Type) -> bool { matches!(t.kind(), crate::types::ty::TypeKind::Keyword(k) if k.is_integral()) }
fn is_numeric(t: &Type) -> bool {
  matches!(t.kind(), crate::types::ty::TypeKind::Keyword(k) if k.is_integral() || k.is_float())
}

/// §4.5: "arithmetic operators promote both sides to a common numeric
/// type" — realized via the pinned `implicitly_convertible` lattice (§4.1):
/// whichever side the other widens to is the common type. `modules` gives
/// the equality check opaque/definition transparency (§3).
pub(crate) fn common_numeric<M: Modules>(a: &Type, b: &Type, modules: &M) -> Option<Type> {
  if crate::symtab::type_equal(a, b, modules) { return Some(a.clone()) }
  if !is_numeric(a) || !is_numeric(b) { return None }
  if Type::implicitly_convertible(a, b) { return Some(b.clone()) }
  if Type::implicitly_convertible(b, a) { return Some(a.clone()) }
  None
}

fn set_ty(expr: &Expr, ty: Type) -> Type {
  *expr.ty.borrow_mut() = Some(ty.clone());
  ty
}

/// Type-checks one expression under `env`, returning (and recording on the
/// node) its result type. On a sub-error, records a placeholder `int` and
/// keeps walking siblings (§7: "the first error short-circuits further
/// work on that declaration", not the whole file).
pub fn check_expr<M: Modules>(expr: &Expr, env: &mut Environment<'_, M>, options: &Options, sink: &mut Sink) -> Type {
  let ty = check_expr_inner(expr, env, options, sink);
  set_ty(expr, ty)
}

fn error_ty(span: FileSpan, sink: &mut Sink, message: impl Into<String>) -> Type {
  sink.error(span, message);
  Type::keyword(Keyword::Int)
}

fn check_expr_inner<M: Modules>(expr: &Expr, env: &mut Environment<'_, M>, options: &Options, sink: &mut Sink) -> Type {
  match &expr.kind {
    ExprKind::IntLit(_) => Type::keyword(Keyword::Int),
    ExprKind::FloatLit(_) => Type::keyword(Keyword::Double),
    ExprKind::StringLit(_) => Type::pointer(Type::keyword(Keyword::Char)),

    ExprKind::Ident(ident) => match env.lookup(ident.name) {
      Some(Resolved::Local(ty)) => ty.clone(),
      Some(Resolved::Global { module, id }) => {
        ident.resolved.set(Some(id));
        match &env.table_of(module).get(id).kind {
          EntryKind::Variable { ty } => ty.clone(),
          EntryKind::Function { .. } => {
            // A bare function name used as a value names its overload set;
            // callers type-check it only through `Call`.
            error_ty(expr.span, sink, format!("{}: a function name is not a value", crate::symbol::resolve(ident.name)))
          }
          other => error_ty(expr.span, sink, format!("{}: {} is not a value", crate::symbol::resolve(ident.name), other.kind_name())),
        }
      }
      None => error_ty(expr.span, sink, format!("{}: undeclared name", crate::symbol::resolve(ident.name))),
    },

    ExprKind::Qualified { module, name, resolved } => match env.lookup_qualified(*module, *name) {
      Some(Resolved::Global { module: m, id }) => {
        resolved.set(Some(id));
        match &env.table_of(m).get(id).kind {
          EntryKind::Variable { ty } => ty.clone(),
          other => error_ty(expr.span, sink, format!("{}: {} is not a value", crate::symbol::resolve(*name), other.kind_name())),
        }
      }
      _ => error_ty(expr.span, sink, format!("{}::{}: undeclared name", crate::symbol::resolve(*module), crate::symbol::resolve(*name))),
    },

    ExprKind::Binary { op, lhs, rhs } => check_binary(*op, lhs, rhs, expr.span, env, options, sink),

    ExprKind::Unary { op, operand } => {
      let t = check_expr(operand, env, options, sink);
      match op {
        UnOp::Neg => if is_numeric(&t) { t } else { error_ty(expr.span, sink, "unary '-' requires a numeric operand") },
        UnOp::Not => if crate::symtab::type_equal(&t, &bool_ty(), env.modules()) { bool_ty() } else { error_ty(expr.span, sink, "'!' requires a bool operand") },
        UnOp::BitNot => if is_integral(&t) { t } else { error_ty(expr.span, sink, "'~' requires an integer operand") },
        UnOp::Deref => match t.kind() {
          crate::types::ty::TypeKind::Pointer(base) => base.clone(),
          _ => error_ty(expr.span, sink, "'*' requires a pointer operand"),
        },
        UnOp::AddrOf => Type::pointer(t),
      }
    }

    ExprKind::Call { callee, args } => check_call(callee, args, expr.span, env, options, sink),

    ExprKind::Subscript { base, index } => {
      let base_ty = check_expr(base, env, options, sink);
      let index_ty = check_expr(index, env, options, sink);
      if !is_integral(&index_ty) { sink.error(index.span, "subscript index must be an integer"); }
      match base_ty.kind() {
        crate::types::ty::TypeKind::Array { elem, .. } => elem.clone(),
        crate::types::ty::TypeKind::Pointer(base) => base.clone(),
        _ => error_ty(expr.span, sink, "subscript base must be an array or pointer"),
      }
    }

    ExprKind::Member { base, field } => {
      let base_ty = check_expr(base, env, options, sink);
      let (module, entry) = match base_ty.unqualified().kind() {
        crate::types::ty::TypeKind::Reference { module, entry, .. } => (*module, *entry),
        crate::types::ty::TypeKind::Pointer(inner) => match inner.unqualified().kind() {
          crate::types::ty::TypeKind::Reference { module, entry, .. } => (*module, *entry),
          _ => return error_ty(expr.span, sink, "member access on a non-composite type"),
        },
        _ => return error_ty(expr.span, sink, "member access on a non-composite type"),
      };
      let fields = match &env.table_of(module).get(entry).kind {
        EntryKind::Struct { fields } | EntryKind::Union { options: fields } => fields,
        _ => return error_ty(expr.span, sink, "member access on a non-composite type"),
      };
      match fields.iter().find(|(n, _)| n == field) {
        Some((_, ty)) => ty.clone(),
        None => error_ty(expr.span, sink, format!("no member named {}", crate::symbol::resolve(*field))),
      }
    }

    ExprKind::Ternary { cond, yes, no } => {
      let cond_ty = check_expr(cond, env, options, sink);
      if !crate::symtab::type_equal(&cond_ty, &bool_ty(), env.modules()) { sink.error(cond.span, "'?:' condition must be bool"); }
      let yes_ty = check_expr(yes, env, options, sink);
      let no_ty = check_expr(no, env, options, sink);
      common_numeric(&yes_ty, &no_ty, env.modules()).unwrap_or_else(|| {
        if crate::symtab::type_equal(&yes_ty, &no_ty, env.modules()) { yes_ty.clone() }
        else { error_ty(expr.span, sink, "'?:' branches have no common type") }
      })
    }

    ExprKind::Cast { to, operand } => {
      check_expr(operand, env, options, sink);
      bridge_type(to, env, options, sink)
    }

    ExprKind::SizeofType(te) => { bridge_type(te, env, options, sink); ulong_ty() }
    ExprKind::SizeofExpr(e) => { check_expr(e, env, options, sink); ulong_ty() }

    ExprKind::Assign { lhs, rhs } => {
      let lhs_ty = check_expr(lhs, env, options, sink);
      if !is_lvalue(lhs) { sink.error(lhs.span, "assignment target is not an lvalue"); }
      let rhs_ty = check_expr(rhs, env, options, sink);
      if !crate::symtab::type_equal(&lhs_ty, &rhs_ty, env.modules()) && !Type::implicitly_convertible(&rhs_ty, &lhs_ty) {
        sink.error(expr.span, "right-hand side is not assignable to the left-hand side's type");
      }
      lhs_ty
    }
  }
}

fn is_lvalue(e: &Expr) -> bool {
  matches!(e.kind, ExprKind::Ident(_) | ExprKind::Qualified { .. } | ExprKind::Subscript { .. } | ExprKind::Member { .. })
    || matches!(&e.kind, ExprKind::Unary { op: UnOp::Deref, .. })
}

fn check_binary<M: Modules>(
  op: BinOp, lhs: &Expr, rhs: &Expr, span: FileSpan,
  env: &mut Environment<'_, M>, options: &Options, sink: &mut Sink,
) -> Type {
  let lt = check_expr(lhs, env, options, sink);
  let rt = check_expr(rhs, env, options, sink);
  match op {
    BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor =>
      common_numeric(&lt, &rt, env.modules()).unwrap_or_else(|| error_ty(span, sink, "operands have no common numeric type")),
    BinOp::Shl | BinOp::Shr => {
      if !is_integral(&lt) { sink.error(lhs.span, "shift requires an integer left operand"); }
      let rhs_is_byte = matches!(rt.kind(), crate::types::ty::TypeKind::Keyword(k) if *k == Keyword::Byte || *k == Keyword::UByte);
      if !rhs_is_byte { sink.error(rhs.span, "shift requires a single-byte integer right operand"); }
      lt
    }
    BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne => {
      if common_numeric(&lt, &rt, env.modules()).is_none() && !crate::symtab::type_equal(&lt, &rt, env.modules()) {
        sink.error(span, "comparison operands have no common type");
      }
      bool_ty()
    }
    BinOp::And | BinOp::Or => {
      if !crate::symtab::type_equal(&lt, &bool_ty(), env.modules()) { sink.error(lhs.span, "'&&'/'||' requires a bool operand"); }
      if !crate::symtab::type_equal(&rt, &bool_ty(), env.modules()) { sink.error(rhs.span, "'&&'/'||' requires a bool operand"); }
      bool_ty()
    }
  }
}

fn check_call<M: Modules>(
  callee: &Expr, args: &[Expr], span: FileSpan,
  env: &mut Environment<'_, M>, options: &Options, sink: &mut Sink,
) -> Type {
  let arg_tys: Vec<Type> = args.iter().map(|a| check_expr(a, env, options, sink)).collect();

  let (module, id, callee_name) = match &callee.kind {
    ExprKind::Ident(ident) => match env.lookup(ident.name) {
      Some(Resolved::Global { module, id }) => (module, id, ident.name),
      _ => return error_ty(callee.span, sink, format!("{}: undeclared function", crate::symbol::resolve(ident.name))),
    },
    ExprKind::Qualified { module, name, .. } => match env.lookup_qualified(*module, *name) {
      Some(Resolved::Global { module: m, id }) => (m, id, *name),
      _ => return error_ty(callee.span, sink, format!("{}::{}: undeclared function", crate::symbol::resolve(*module), crate::symbol::resolve(*name))),
    },
    _ => return error_ty(callee.span, sink, "callee is not a function name"),
  };

  let EntryKind::Function { overloads } = &env.table_of(module).get(id).kind else {
    return error_ty(callee.span, sink, format!("{}: not a function", crate::symbol::resolve(callee_name)));
  };

  match resolve_overload(overloads, &arg_tys, env.modules()) {
    OverloadResolution::Match(i) => overloads.0[i].ret.clone(),
    OverloadResolution::NoMatch => error_ty(span, sink, format!("{}: no matching overload for this call", crate::symbol::resolve(callee_name))),
    OverloadResolution::Ambiguous => error_ty(span, sink, format!("{}: ambiguous call", crate::symbol::resolve(callee_name))),
  }
}

/// Statement-level walk: threads a function's declared return type through
/// for `return` checking, and opens/closes block scopes for `Block`/loop/
/// `if` bodies the way [`Environment::push_scope`]/`pop_scope` expect.
pub fn check_stmt<M: Modules>(
  stmt: &Stmt, ret_ty: &Type, env: &mut Environment<'_, M>, options: &Options, sink: &mut Sink,
) {
  match stmt {
    Stmt::Expr(e) => { check_expr(e, env, options, sink); }
    Stmt::VarDecl { name, declared_ty, init, .. } => {
      let ty = bridge_type(declared_ty, env, options, sink);
      if let Some(init) = init {
        let init_ty = check_expr(init, env, options, sink);
        if !crate::symtab::type_equal(&ty, &init_ty, env.modules()) && !Type::implicitly_convertible(&init_ty, &ty) {
          sink.error(init.span, "initializer is not assignable to the declared type");
        }
      }
      env.bind_local(*name, ty);
    }
    Stmt::Block(stmts) => {
      env.push_scope();
      for s in stmts { check_stmt(s, ret_ty, env, options, sink); }
      env.pop_scope();
    }
    Stmt::If { cond, then, else_ } => {
      let cond_ty = check_expr(cond, env, options, sink);
      if !crate::symtab::type_equal(&cond_ty, &bool_ty(), env.modules()) { sink.error(cond.span, "'if' condition must be bool"); }
      check_stmt(then, ret_ty, env, options, sink);
      if let Some(e) = else_ { check_stmt(e, ret_ty, env, options, sink); }
    }
    Stmt::While { cond, body } | Stmt::DoWhile { body, cond } => {
      let cond_ty = check_expr(cond, env, options, sink);
      if !crate::symtab::type_equal(&cond_ty, &bool_ty(), env.modules()) { sink.error(cond.span, "loop condition must be bool"); }
      check_stmt(body, ret_ty, env, options, sink);
    }
    Stmt::For { init, cond, step, body } => {
      env.push_scope();
      if let Some(init) = init { check_stmt(init, ret_ty, env, options, sink); }
      if let Some(cond) = cond {
        let cond_ty = check_expr(cond, env, options, sink);
        if !crate::symtab::type_equal(&cond_ty, &bool_ty(), env.modules()) { sink.error(cond.span, "'for' condition must be bool"); }
      }
      if let Some(step) = step { check_expr(step, env, options, sink); }
      check_stmt(body, ret_ty, env, options, sink);
      env.pop_scope();
    }
    Stmt::Switch { scrutinee, cases } => {
      let t = check_expr(scrutinee, env, options, sink);
      if !is_integral(&t) { sink.error(scrutinee.span, "'switch' scrutinee must be an integer"); }
      for (_, body) in cases {
        env.push_scope();
        for s in body { check_stmt(s, ret_ty, env, options, sink); }
        env.pop_scope();
      }
    }
    Stmt::Break | Stmt::Continue | Stmt::Asm(_) => {}
    Stmt::Return(value) => match value {
      Some(e) => {
        let t = check_expr(e, env, options, sink);
        if !crate::symtab::type_equal(&t, ret_ty, env.modules()) && !Type::implicitly_convertible(&t, ret_ty) {
          sink.error(e.span, "return value does not match the function's return type");
        }
      }
      None => if !ret_ty.is_keyword(Keyword::Void) { sink.error(FileSpan { file: Symbol::UNDER, line: 0, col: 0 }, "missing return value"); }
    },
  }
}

/// Drives C5 over every function body in a module: binds parameters into a
/// fresh function scope, then walks the body statement-by-statement.
#[tracing::instrument(skip_all)]
pub fn check_module<M: Modules>(decls: &[TopLevel], env: &mut Environment<'_, M>, options: &Options, sink: &mut Sink) {
  for decl in decls {
    if let TopLevel::FuncDefn { ret, params, body, .. } = decl {
      let ret_ty = bridge_type(ret, env, options, sink);
      env.push_scope();
      bind_params(params, env, options, sink);
      for s in body { check_stmt(s, &ret_ty, env, options, sink); }
      env.pop_scope();
    }
  }
}

fn bind_params<M: Modules>(params: &[Param], env: &mut Environment<'_, M>, options: &Options, sink: &mut Sink) {
  for p in params {
    let ty = bridge_type(&p.ty, env, options, sink);
    env.bind_local(p.name, ty);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::Ident;
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
  fn integer_literals_type_as_int_and_add_widens() {
    let modules = OneModule(SymbolTable::new());
    let mut env = Environment::new(&modules, ModuleId(0));
    let options = Options::default();
    let mut sink = Sink::new();
    let lhs = Expr::new(ExprKind::IntLit(1), span());
    let rhs = Expr::new(ExprKind::IntLit(2), span());
    let add = Expr::new(ExprKind::Binary { op: BinOp::Add, lhs: Box::new(lhs), rhs: Box::new(rhs) }, span());
    let ty = check_expr(&add, &mut env, &options, &mut sink);
    assert!(!sink.has_errors());
    assert!(ty.is_keyword(Keyword::Int));
  }

  #[test]
  fn undeclared_identifier_is_an_error() {
    let modules = OneModule(SymbolTable::new());
    let mut env = Environment::new(&modules, ModuleId(0));
    let options = Options::default();
    let mut sink = Sink::new();
    let e = Expr::new(ExprKind::Ident(Ident::new(intern("nope"), span())), span());
    check_expr(&e, &mut env, &options, &mut sink);
    assert!(sink.has_errors());
  }

  #[test]
  fn logical_and_requires_bool_operands() {
    let modules = OneModule(SymbolTable::new());
    let mut env = Environment::new(&modules, ModuleId(0));
    let options = Options::default();
    let mut sink = Sink::new();
    let lhs = Expr::new(ExprKind::IntLit(1), span());
    let rhs = Expr::new(ExprKind::IntLit(2), span());
    let e = Expr::new(ExprKind::Binary { op: BinOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs) }, span());
    check_expr(&e, &mut env, &options, &mut sink);
    assert!(sink.has_errors());
  }
}
