//! `tlangc_core`: the checked-AST-to-blocked-IR front/middle-end described
//! in `DESIGN.md`. Parsing, pretty-printing, optimization, register
//! allocation, and code emission are all out of scope — this crate stops
//! at validated blocked IR.
//!
//! [`Compiler`] strings the phases together: C4 ([`build_symtab`]) builds
//! every module's symbol table, C5 ([`typeck`]) checks every function body
//! against it, C7 ([`ir::translator`]) lowers checked bodies to fragments,
//! and C8 ([`ir::validator`]) accepts or rejects the result. It is generic
//! over the injected [`ir::translator::Target`], keeping the backend-specific
//! pieces (parameter/return locations, pointer width) behind a type
//! parameter so C7 can be driven by different targets without changing the
//! pipeline.

pub mod ast;
pub mod ast_bridge;
pub mod build_symtab;
pub mod diag;
pub mod ir;
pub mod span;
pub mod symbol;
pub mod symtab;
pub mod typeck;
pub mod types;

use crate::ast::{FileKind, Module as AstModule};
use crate::diag::{CoreError, Options, Sink};
use crate::ir::model::Fragment;
use crate::ir::translator::{translate_module, Target, TempGen};
use crate::ir::validator::validate_blocked;
use crate::symtab::Environment;

/// Drives C4 → C5 → C7 → C8 over a whole module graph. `T` supplies the
/// parameter/return locations and pointer width C7 needs (§5: "Frames and
/// access objects are injected by constructors supplied by the caller").
pub struct Compiler<T: Target> {
  pub options: Options,
  pub target: T,
}

impl<T: Target> Compiler<T> {
  #[must_use] pub fn new(options: Options, target: T) -> Self { Self { options, target } }

  /// Runs the whole pipeline and returns every fragment the program
  /// translates to, or the first `CoreError` that aborted it. Per §7's
  /// propagation policy, a non-zero error count after C4 or C5 aborts the
  /// pipeline before the next phase runs; C8 failures abort immediately as
  /// `CoreError::IrInvariant` since they signal a translator bug, not a
  /// user error.
  pub fn build(
    &self, modules: &[AstModule], temp_gen: &mut dyn TempGen, sink: &mut Sink,
  ) -> Result<Vec<Fragment>, CoreError> {
    let program = build_symtab::Builder::new(modules, &self.options).build(sink);
    if sink.has_errors() {
      return Err(CoreError::Redeclaration("symbol table construction failed".into()));
    }

    for module in modules {
      if module.kind != FileKind::Code { continue }
      let mid = program.module_id_of(module.name).expect("every module was registered above");
      let mut env = Environment::new(&program, mid);
      typeck::check_module(&module.decls, &mut env, &self.options, sink);
    }
    if sink.has_errors() {
      return Err(CoreError::Type("type checking failed".into()));
    }

    let mut fragments = Vec::new();
    for module in modules {
      if module.kind != FileKind::Code { continue }
      let mid = program.module_id_of(module.name).expect("every module was registered above");
      fragments.extend(translate_module(mid, &module.decls, &program, &self.target, temp_gen, &self.options));
    }

    for frag in &fragments {
      if let Fragment::Text { blocks, .. } = frag { validate_blocked(blocks)?; }
    }

    Ok(fragments)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::{BinOp, Expr, ExprKind, Ident, Param, Stmt, TopLevel, TypeExpr, UnOp};
  use crate::diag::WarnLevel;
  use crate::ir::model::{AllocHint, Block, Datum, FragName, Instruction, Operand, Operator};
  use crate::ir::translator::{counting_temp_gen, mangle};
  use crate::ir::validator::validate_scheduled;
  use crate::span::FileSpan;
  use crate::symbol::intern;
  use crate::symtab::{resolve_overload, Modules, OverloadResolution};
  use crate::types::entity::EntryKind;
  use crate::types::ty::{Keyword, Type};
  use crate::types::BlockId;
  use std::cell::RefCell;

  fn span() -> FileSpan { FileSpan { file: intern("t.t"), line: 1, col: 1 } }
  fn int_te() -> TypeExpr { TypeExpr::Keyword(Keyword::Int) }
  fn long_te() -> TypeExpr { TypeExpr::Keyword(Keyword::Long) }
  fn byte_te() -> TypeExpr { TypeExpr::Keyword(Keyword::Byte) }

  fn lit(n: i64) -> Expr { Expr::new(ExprKind::IntLit(n), span()) }

  struct TestTarget;
  impl Target for TestTarget {
    fn pointer_width(&self) -> u32 { 8 }
    fn param_operand(&self, index: usize, size: u32, _alignment: u32, _hint: AllocHint) -> Operand {
      Operand::Reg { name: 100 + index as u32, size }
    }
    fn return_operand(&self, size: u32, _hint: AllocHint) -> Operand { Operand::Reg { name: 0, size } }
  }

  /// `module m; int f(int x) { return x + 1; }` gets one function entry
  /// with one defined `(int) -> int` overload, and the translator emits one
  /// `TEXT` fragment named `m::f` containing an `ADD` and ending in
  /// `RETURN`.
  #[test]
  fn a_single_function_builds_checks_and_translates() {
    let body = vec![Stmt::Return(Some(Expr::new(ExprKind::Binary {
      op: BinOp::Add,
      lhs: Box::new(Expr::new(ExprKind::Ident(Ident::new(intern("x"), span())), span())),
      rhs: Box::new(lit(1)),
    }, span())))];
    let module = AstModule {
      name: intern("m"), kind: FileKind::Code, imports: vec![],
      decls: vec![TopLevel::FuncDefn {
        name: intern("f"), span: span(), ret: int_te(),
        params: vec![Param { name: intern("x"), span: span(), ty: int_te(), default: None }],
        body,
      }],
    };

    let compiler = Compiler::new(Options::default(), TestTarget);
    let mut sink = Sink::new();
    let mut temp_gen = counting_temp_gen();
    let fragments = compiler.build(std::slice::from_ref(&module), &mut temp_gen, &mut sink).unwrap();

    assert_eq!(fragments.len(), 1);
    let Fragment::Text { name, blocks } = &fragments[0] else { panic!("expected a text fragment") };
    assert_eq!(*name, FragName::Global(mangle(intern("m"), intern("f"))));
    let ops: Vec<Operator> = blocks.iter().flat_map(|b| b.instructions.iter().map(|i| i.op)).collect();
    assert!(ops.contains(&Operator::Move));
    assert!(ops.contains(&Operator::Add));
    assert_eq!(*ops.last().unwrap(), Operator::Return);
  }

  /// `module m; struct S; int h(S x); struct S { int x; }; int g(S y) { return h(y); }`
  /// — `h`'s overload is declared (and its parameter type bound) while `S`
  /// is still an opaque forward declaration; `S`'s full definition lands
  /// between `h` and `g`, so `g`'s parameter `y` is bound against the
  /// defined struct. Typechecking the call `h(y)` inside `g` resolves `y`'s
  /// (definition-bound) argument type against `h`'s (opaque-bound)
  /// parameter type through the real C5 overload-resolution call site, so
  /// this would have failed under raw `(ModuleId, SymbolId)` identity.
  #[test]
  fn opaque_struct_resolves_equal_to_its_later_definition() {
    let s_ty = || TypeExpr::Named { module: None, name: intern("S"), span: span() };
    let module = AstModule {
      name: intern("m"), kind: FileKind::Code, imports: vec![],
      decls: vec![
        TopLevel::StructDecl { name: intern("S"), span: span(), fields: None },
        TopLevel::FuncDecl {
          name: intern("h"), span: span(), ret: int_te(),
          params: vec![Param { name: intern("x"), span: span(), ty: s_ty(), default: None }],
        },
        TopLevel::StructDecl { name: intern("S"), span: span(), fields: Some(vec![(intern("x"), int_te())]) },
        TopLevel::FuncDefn {
          name: intern("g"), span: span(), ret: int_te(),
          params: vec![Param { name: intern("y"), span: span(), ty: s_ty(), default: None }],
          body: vec![Stmt::Return(Some(Expr::new(ExprKind::Call {
            callee: Box::new(Expr::new(ExprKind::Ident(Ident::new(intern("h"), span())), span())),
            args: vec![Expr::new(ExprKind::Ident(Ident::new(intern("y"), span())), span())],
          }, span())))],
        },
      ],
    };

    let options = Options::default();
    let mut sink = Sink::new();
    let program = build_symtab::Builder::new(std::slice::from_ref(&module), &options).build(&mut sink);
    assert!(!sink.has_errors());

    let mid = program.module_id_of(intern("m")).unwrap();
    let mut env = Environment::new(&program, mid);
    typeck::check_module(&module.decls, &mut env, &options, &mut sink);
    assert!(!sink.has_errors(), "{:?}", sink.diagnostics());
  }

  /// A call through an import (`b::h`) resolves and translates to a `CALL`
  /// against the mangled global `b::h`.
  #[test]
  fn a_qualified_call_resolves_through_the_import_table() {
    let module_b = AstModule {
      name: intern("b"), kind: FileKind::Code, imports: vec![],
      decls: vec![TopLevel::FuncDecl {
        name: intern("h"), span: span(), ret: int_te(),
        params: vec![Param { name: intern("x"), span: span(), ty: int_te(), default: None }],
      }],
    };
    let module_a = AstModule {
      name: intern("a"), kind: FileKind::Code, imports: vec![intern("b")],
      decls: vec![TopLevel::FuncDefn {
        name: intern("g"), span: span(), ret: int_te(),
        params: vec![Param { name: intern("x"), span: span(), ty: int_te(), default: None }],
        body: vec![Stmt::Return(Some(Expr::new(ExprKind::Call {
          callee: Box::new(Expr::new(ExprKind::Qualified {
            module: intern("b"), name: intern("h"), resolved: Default::default(),
          }, span())),
          args: vec![Expr::new(ExprKind::Ident(Ident::new(intern("x"), span())), span())],
        }, span())))],
      }],
    };

    let compiler = Compiler::new(Options::default(), TestTarget);
    let mut sink = Sink::new();
    let mut temp_gen = counting_temp_gen();
    let fragments = compiler.build(&[module_a, module_b], &mut temp_gen, &mut sink).unwrap();

    let g = fragments.iter().find(|f| matches!(f, Fragment::Text { name, .. }
      if *name == FragName::Global(mangle(intern("a"), intern("g"))))).expect("g's fragment exists");
    let Fragment::Text { blocks, .. } = g else { unreachable!() };
    let expected = mangle(intern("b"), intern("h"));
    let callee_is_b_h = blocks.iter().flat_map(|b| &b.instructions).any(|inst| {
      inst.op == Operator::Call && inst.operands.first().is_some_and(|op| match op {
        Operand::Constant { data, .. } => matches!(data.as_slice(), [Datum::Global(sym)] if *sym == expected),
        _ => false,
      })
    });
    assert!(callee_is_b_h);
  }

  /// Overload resolution picks the exact match for each argument type,
  /// never the wrong candidate and never an ambiguity.
  #[test]
  fn overload_resolution_picks_the_exact_candidate() {
    let module = AstModule {
      name: intern("m"), kind: FileKind::Code, imports: vec![],
      decls: vec![
        TopLevel::FuncDecl { name: intern("f"), span: span(), ret: int_te(),
          params: vec![Param { name: intern("x"), span: span(), ty: int_te(), default: None }] },
        TopLevel::FuncDecl { name: intern("f"), span: span(), ret: int_te(),
          params: vec![Param { name: intern("x"), span: span(), ty: long_te(), default: None }] },
        TopLevel::FuncDecl { name: intern("f"), span: span(), ret: int_te(),
          params: vec![Param { name: intern("x"), span: span(), ty: byte_te(), default: None }] },
      ],
    };
    let options = Options::default();
    let mut sink = Sink::new();
    let program = build_symtab::Builder::new(std::slice::from_ref(&module), &options).build(&mut sink);
    assert!(!sink.has_errors());

    let mid = program.module_id_of(intern("m")).unwrap();
    let id = program.table(mid).lookup(intern("f")).unwrap();
    let EntryKind::Function { overloads } = &program.table(mid).get(id).kind else { panic!("expected a function") };
    assert_eq!(overloads.0.len(), 3);

    let int_overload = overloads.0.iter().position(|o| o.params[0].is_keyword(Keyword::Int)).unwrap();
    let long_overload = overloads.0.iter().position(|o| o.params[0].is_keyword(Keyword::Long)).unwrap();
    let byte_overload = overloads.0.iter().position(|o| o.params[0].is_keyword(Keyword::Byte)).unwrap();

    assert_eq!(resolve_overload(overloads, &[Type::keyword(Keyword::Int)], &program), OverloadResolution::Match(int_overload));
    assert_eq!(resolve_overload(overloads, &[Type::keyword(Keyword::Long)], &program), OverloadResolution::Match(long_overload));
    assert_eq!(resolve_overload(overloads, &[Type::keyword(Keyword::Byte)], &program), OverloadResolution::Match(byte_overload));
  }

  fn temp(name: u32) -> Operand { Operand::Temp { name, alignment: 4, size: 4, hint: AllocHint::Gp } }
  fn local(b: u32) -> Operand { Operand::Constant { alignment: 1, data: vec![Datum::Local(BlockId(b))] } }

  /// A hand-built blocked fragment ending in the two-target `J1E` form
  /// fails C8-blocked; the same comparison rewritten as `J1E` + fall-through
  /// label (what scheduling would produce) passes C8-scheduled.
  #[test]
  fn blocked_vs_scheduled_validation_disagree_on_conditional_jumps() {
    let blocked = Block {
      label: BlockId(0),
      instructions: vec![Instruction::new(Operator::J2E, vec![local(1), local(2), temp(0), temp(1)])],
    };
    assert!(validate_blocked(&[blocked]).is_err());

    let scheduled = vec![
      Instruction::new(Operator::J1E, vec![local(1), temp(0), temp(1)]),
      Instruction::new(Operator::Label, vec![local(2)]),
      Instruction::new(Operator::Return, vec![]),
    ];
    assert!(validate_scheduled(&scheduled).is_ok());
  }

  /// `const const int x;` is rejected, warned about, or silently accepted
  /// depending on `warnDuplicateDeclSpecifier`.
  #[test]
  fn duplicate_const_specifier_obeys_the_tri_level_dial() {
    let module = AstModule {
      name: intern("m"), kind: FileKind::Code, imports: vec![],
      decls: vec![TopLevel::VarDecl {
        name: intern("x"), span: span(),
        ty: TypeExpr::Qualified {
          base: Box::new(TypeExpr::Qualified {
            base: Box::new(int_te()), is_const: true, is_volatile: false, span: span(),
          }),
          is_const: true, is_volatile: false, span: span(),
        },
        init: None,
      }],
    };

    for (level, expect_error, expect_any) in [
      (WarnLevel::Ignore, false, false),
      (WarnLevel::Warn, false, true),
      (WarnLevel::Error, true, true),
    ] {
      let options = Options::default().with_warn_duplicate_decl_specifier(level);
      let mut sink = Sink::new();
      build_symtab::Builder::new(std::slice::from_ref(&module), &options).build(&mut sink);
      assert_eq!(sink.has_errors(), expect_error);
      assert_eq!(!sink.diagnostics().is_empty(), expect_any);
    }
  }

  #[allow(dead_code)]
  fn use_unop(_: UnOp) {}
}
