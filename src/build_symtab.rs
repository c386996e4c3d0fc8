//! C4: the two-phase walk over a module graph that populates every
//! module's [`SymbolTable`] from its AST.
//!
//! §4.4's prose is what's implemented here; the stub `// TODO: write this`
//! bodies for the per-declaration-form handlers in
//! `original_source/typecheck/buildSymbolTable.c` are not followed beyond
//! their function decomposition (one handler per declaration form).

use std::collections::{HashMap, HashSet};

use crate::ast::{self, FileKind, Param, TopLevel};
use crate::ast_bridge::bridge_type;
use crate::diag::{Options, Sink};
use crate::span::FileSpan;
use crate::symbol::Symbol;
use crate::symtab::{Environment, Modules, SymbolTable};
use crate::types::entity::{EntryKind, Overload, OverloadSet};
use crate::types::ty::Type;
use crate::types::{Idx, ModuleId};

use std::cell::Cell;

/// Every module's symbol table, keyed by the stable [`ModuleId`] assigned
/// the first time a module name is seen (by declaration or by import).
#[derive(Default)]
pub struct Program {
  tables: Vec<SymbolTable>,
  /// Parallel to `tables`: the name each `ModuleId` was first seen under,
  /// needed by C7 to mangle module-qualified global labels (§6).
  module_names: Vec<Symbol>,
  names: HashMap<Symbol, ModuleId>,
}

impl Program {
  #[must_use] pub fn new() -> Self { Self::default() }

  fn module_id(&mut self, name: Symbol) -> ModuleId {
    if let Some(&id) = self.names.get(&name) { return id }
    let id = ModuleId::from_usize(self.tables.len());
    self.tables.push(SymbolTable::new());
    self.module_names.push(name);
    self.names.insert(name, id);
    id
  }

  #[must_use] pub fn module_id_of(&self, name: Symbol) -> Option<ModuleId> { self.names.get(&name).copied() }

  fn table_mut(&mut self, m: ModuleId) -> &mut SymbolTable { &mut self.tables[m.into_usize()] }
}

impl Modules for Program {
  fn table(&self, m: ModuleId) -> &SymbolTable { &self.tables[m.into_usize()] }
  fn module_name(&self, m: ModuleId) -> Symbol { self.module_names[m.into_usize()] }
}

fn num_optional(params: &[Param]) -> u32 {
  params.iter().rev().take_while(|p| p.default.is_some()).count() as u32
}

fn param_types<M: Modules>(params: &[Param], env: &Environment<'_, M>, options: &Options, sink: &mut Sink) -> Vec<Type> {
  params.iter().map(|p| bridge_type(&p.ty, env, options, sink)).collect()
}

/// Drives C4 over a whole module graph: imports are `(name, file-kind)`
/// pairs the caller already knows about (normally "every name any module
/// imports or declares itself as"). Declaration files are built first,
/// each entered on demand (by the first importer that needs it) with
/// cycle detection; code files are then built in the order given.
pub struct Builder<'a> {
  asts: HashMap<Symbol, &'a ast::Module>,
  program: Program,
  /// The declaration-file import chain currently being walked, in the
  /// order files were entered — a stack, not a set, so a cycle can be
  /// reported with the full chain that led to it.
  in_progress: Vec<Symbol>,
  done: HashSet<Symbol>,
  options: &'a Options,
}

impl<'a> Builder<'a> {
  #[must_use] pub fn new(modules: &'a [ast::Module], options: &'a Options) -> Self {
    let asts = modules.iter().map(|m| (m.name, m)).collect();
    Self { asts, program: Program::new(), in_progress: Vec::new(), done: HashSet::new(), options }
  }

  #[tracing::instrument(skip_all)]
  pub fn build(mut self, sink: &mut Sink) -> Program {
    let decl_files: Vec<Symbol> = self.asts.values()
      .filter(|m| m.kind == FileKind::Declaration).map(|m| m.name).collect();
    for name in decl_files { self.ensure_declaration_file(name, sink); }

    let code_files: Vec<Symbol> = self.asts.values()
      .filter(|m| m.kind == FileKind::Code).map(|m| m.name).collect();
    for name in code_files { self.build_one_file(name, sink); }

    self.program
  }

  /// Demand-driven entry into a declaration file, with cycle detection
  /// (§4.4: "cycles among declaration files are forbidden and must be
  /// reported once with the offending import chain"; §5: "guarded by a
  /// per-file in-progress flag").
  fn ensure_declaration_file(&mut self, name: Symbol, sink: &mut Sink) {
    if self.done.contains(&name) { return }
    if self.in_progress.contains(&name) {
      let mut chain: Vec<String> = self.in_progress.iter().map(|&s| crate::symbol::resolve(s)).collect();
      chain.push(crate::symbol::resolve(name));
      sink.error(FileSpan { file: name, line: 0, col: 0 },
        format!("cyclic import: {}", chain.join(" -> ")));
      return;
    }
    let Some(module) = self.asts.get(&name).copied() else {
      sink.error(FileSpan { file: name, line: 0, col: 0 },
        format!("{}: unresolved import", crate::symbol::resolve(name)));
      return;
    };
    self.in_progress.push(name);
    let imports = module.imports.clone();
    for imp in imports {
      if self.asts.get(&imp).is_some_and(|m| m.kind == FileKind::Declaration) {
        self.ensure_declaration_file(imp, sink);
      }
    }
    self.build_one_file(name, sink);
    self.in_progress.pop();
    self.done.insert(name);
  }

  fn import_table(&mut self, module: &ast::Module) -> Vec<(Symbol, ModuleId)> {
    module.imports.iter().map(|&imp| (imp, self.program.module_id(imp))).collect()
  }

  fn build_one_file(&mut self, name: Symbol, sink: &mut Sink) {
    let Some(module) = self.asts.get(&name).copied() else { return };
    let mid = self.program.module_id(name);
    let imports = self.import_table(module);
    self.program.table_mut(mid).imports = imports;

    for decl in &module.decls {
      self.process_decl(mid, decl, sink);
    }
  }

  fn env(&self, mid: ModuleId) -> Environment<'_, Program> { Environment::new(&self.program, mid) }

  fn process_decl(&mut self, mid: ModuleId, decl: &TopLevel, sink: &mut Sink) {
    match decl {
      TopLevel::FuncDefn { name, span, ret, params, .. } =>
        self.process_function(mid, *name, *span, ret, params, true, sink),
      TopLevel::FuncDecl { name, span, ret, params } =>
        self.process_function(mid, *name, *span, ret, params, false, sink),
      TopLevel::VarDecl { name, span, ty, .. } => self.process_var(mid, *name, *span, ty, sink),
      TopLevel::StructDecl { name, span, fields } =>
        self.process_composite(mid, *name, *span, fields.as_deref(), CompositeKind::Struct, sink),
      TopLevel::UnionDecl { name, span, options } =>
        self.process_composite(mid, *name, *span, options.as_deref(), CompositeKind::Union, sink),
      TopLevel::EnumDecl { name, span, constants } => self.process_enum(mid, *name, *span, constants.as_deref(), sink),
      TopLevel::Typedef { name, span, target } => self.process_typedef(mid, *name, *span, target, sink),
    }
  }

  fn process_function(
    &mut self, mid: ModuleId, name: Symbol, span: FileSpan,
    ret: &ast::TypeExpr, params: &[Param], defined: bool, sink: &mut Sink,
  ) {
    let (ret_ty, param_tys) = {
      let env = self.env(mid);
      let ret_ty = bridge_type(ret, &env, self.options, sink);
      let param_tys = param_types(params, &env, self.options, sink);
      (ret_ty, param_tys)
    };
    let num_opt = num_optional(params);

    let Some(existing) = self.program.table(mid).lookup(name) else {
      let overload = Overload { ret: ret_ty, params: param_tys.into(), num_optional: num_opt, defined };
      self.program.table_mut(mid).insert(name, span, EntryKind::Function { overloads: OverloadSet(vec![overload]) })
        .expect("just checked absence");
      return;
    };

    if !matches!(self.program.table(mid).get(existing).kind, EntryKind::Function { .. }) {
      sink.error(span, format!("{} redeclared as a different kind ({})",
        crate::symbol::resolve(name), self.program.table(mid).get(existing).kind.kind_name()));
      return;
    }

    // `signature` is computed against an immutable view of `self.program`
    // (table context, for opaque/definition-transparent return-type
    // comparison) before any mutable borrow is taken for the update below.
    let signature = {
      let EntryKind::Function { overloads } = &self.program.table(mid).get(existing).kind else { unreachable!() };
      overloads.find_by_signature(&param_tys, &self.program)
        .map(|i| (i, crate::symtab::type_equal(&overloads.0[i].ret, &ret_ty, &self.program), overloads.0[i].defined))
    };

    match signature {
      None => {
        let EntryKind::Function { overloads } = &mut self.program.table_mut(mid).get_mut(existing).kind else { unreachable!() };
        overloads.0.push(Overload { ret: ret_ty, params: param_tys.into(), num_optional: num_opt, defined });
      }
      Some((_, false, _)) =>
        sink.error(span, format!("{}: conflicting return types across redeclarations", crate::symbol::resolve(name))),
      Some((i, true, already_defined)) => match (already_defined, defined) {
        (false, true) => {
          let EntryKind::Function { overloads } = &mut self.program.table_mut(mid).get_mut(existing).kind else { unreachable!() };
          overloads.0[i].defined = true;
        }
        (true, true) => sink.error(span, format!("{}: duplicate definition", crate::symbol::resolve(name))),
        _ => {} // declaration coalesces with an existing declaration or definition
      },
    }
  }

  fn process_var(&mut self, mid: ModuleId, name: Symbol, span: FileSpan, ty: &ast::TypeExpr, sink: &mut Sink) {
    let ty = { let env = self.env(mid); bridge_type(ty, &env, self.options, sink) };
    let table = self.program.table_mut(mid);
    if table.insert(name, span, EntryKind::Variable { ty }).is_err() {
      sink.error(span, format!("{}: redeclared at module scope", crate::symbol::resolve(name)));
    }
  }

  fn process_composite(
    &mut self, mid: ModuleId, name: Symbol, span: FileSpan,
    fields: Option<&[(Symbol, ast::TypeExpr)]>, kind: CompositeKind, sink: &mut Sink,
  ) {
    let bridged: Option<Vec<(Symbol, Type)>> = fields.map(|fs| {
      let env = self.env(mid);
      fs.iter().map(|(n, te)| (*n, bridge_type(te, &env, self.options, sink))).collect()
    });

    let table = self.program.table_mut(mid);
    match table.lookup(name) {
      None => {
        let kind = match bridged {
          None => EntryKind::OpaqueType { definition: Cell::new(None) },
          Some(fs) => kind.make_full(fs),
        };
        table.insert(name, span, kind).expect("just checked absence");
      }
      Some(id) => {
        let same_kind = kind.matches(&table.get(id).kind);
        match (&table.get(id).kind, bridged) {
          (EntryKind::OpaqueType { .. }, None) => {} // forward decl after forward decl: no-op
          (EntryKind::OpaqueType { .. }, Some(fs)) => {
            table.supersede(id, name, span, kind.make_full(fs));
          }
          (_, None) if same_kind => {} // forward decl after full definition: no-op
          (_, Some(_)) if same_kind =>
            sink.error(span, format!("{}: redefinition of the same composite", crate::symbol::resolve(name))),
          _ => sink.error(span, format!("{}: redeclared as a different kind ({})",
            crate::symbol::resolve(name), table.get(id).kind.kind_name())),
        }
      }
    }
  }

  fn process_enum(&mut self, mid: ModuleId, name: Symbol, span: FileSpan, constants: Option<&[Symbol]>, sink: &mut Sink) {
    let table = self.program.table_mut(mid);
    match table.lookup(name) {
      None => {
        let kind = match constants {
          None => EntryKind::OpaqueType { definition: Cell::new(None) },
          Some(cs) => EntryKind::Enum { constants: cs.to_vec() },
        };
        table.insert(name, span, kind).expect("just checked absence");
      }
      Some(id) => {
        let is_enum = matches!(table.get(id).kind, EntryKind::Enum { .. });
        let is_opaque = matches!(table.get(id).kind, EntryKind::OpaqueType { .. });
        match (is_opaque, is_enum, constants) {
          (true, _, None) => {}
          (true, _, Some(cs)) => { table.supersede(id, name, span, EntryKind::Enum { constants: cs.to_vec() }); }
          (_, true, None) => {}
          (_, true, Some(_)) =>
            sink.error(span, format!("{}: redefinition of the same composite", crate::symbol::resolve(name))),
          _ => sink.error(span, format!("{}: redeclared as a different kind ({})",
            crate::symbol::resolve(name), table.get(id).kind.kind_name())),
        }
      }
    }
  }

  fn process_typedef(&mut self, mid: ModuleId, name: Symbol, span: FileSpan, target: &ast::TypeExpr, sink: &mut Sink) {
    let target = { let env = self.env(mid); bridge_type(target, &env, self.options, sink) };
    let table = self.program.table_mut(mid);
    if table.insert(name, span, EntryKind::Typedef { target }).is_err() {
      sink.error(span, format!("{}: redeclared at module scope", crate::symbol::resolve(name)));
    }
  }
}

#[derive(Clone, Copy)]
enum CompositeKind { Struct, Union }

impl CompositeKind {
  fn make_full(self, fields: Vec<(Symbol, Type)>) -> EntryKind {
    match self {
      CompositeKind::Struct => EntryKind::Struct { fields },
      CompositeKind::Union => EntryKind::Union { options: fields },
    }
  }
  fn matches(self, kind: &EntryKind) -> bool {
    matches!((self, kind), (CompositeKind::Struct, EntryKind::Struct { .. })
      | (CompositeKind::Union, EntryKind::Union { .. }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symbol::intern;
  use crate::types::ty::Keyword;

  fn span() -> FileSpan { FileSpan { file: intern("t.t"), line: 1, col: 1 } }

  fn int_te() -> ast::TypeExpr { ast::TypeExpr::Keyword(Keyword::Int) }

  #[test]
  fn single_function_definition_creates_one_overload() {
    let module = ast::Module {
      name: intern("m"),
      kind: FileKind::Code,
      imports: vec![],
      decls: vec![TopLevel::FuncDefn {
        name: intern("f"), span: span(), ret: int_te(),
        params: vec![Param { name: intern("x"), span: span(), ty: int_te(), default: None }],
        body: vec![],
      }],
    };
    let options = Options::default();
    let mut sink = Sink::new();
    let program = Builder::new(std::slice::from_ref(&module), &options).build(&mut sink);
    assert!(!sink.has_errors());

    let mid = program.module_id_of(intern("m")).unwrap();
    let id = program.table(mid).lookup(intern("f")).unwrap();
    match &program.table(mid).get(id).kind {
      EntryKind::Function { overloads } => {
        assert_eq!(overloads.0.len(), 1);
        assert!(overloads.0[0].defined);
        assert_eq!(overloads.0[0].params.len(), 1);
      }
      _ => panic!("expected function entry"),
    }
  }

  #[test]
  fn duplicate_variable_at_module_scope_is_an_error() {
    let module = ast::Module {
      name: intern("m2"),
      kind: FileKind::Code,
      imports: vec![],
      decls: vec![
        TopLevel::VarDecl { name: intern("x"), span: span(), ty: int_te(), init: None },
        TopLevel::VarDecl { name: intern("x"), span: span(), ty: int_te(), init: None },
      ],
    };
    let options = Options::default();
    let mut sink = Sink::new();
    Builder::new(std::slice::from_ref(&module), &options).build(&mut sink);
    assert!(sink.has_errors());
  }

  #[test]
  fn opaque_struct_then_full_definition_supersedes() {
    let module = ast::Module {
      name: intern("m3"),
      kind: FileKind::Code,
      imports: vec![],
      decls: vec![
        TopLevel::StructDecl { name: intern("S"), span: span(), fields: None },
        TopLevel::StructDecl { name: intern("S"), span: span(),
          fields: Some(vec![(intern("x"), int_te())]) },
      ],
    };
    let options = Options::default();
    let mut sink = Sink::new();
    let program = Builder::new(std::slice::from_ref(&module), &options).build(&mut sink);
    assert!(!sink.has_errors());
    let mid = program.module_id_of(intern("m3")).unwrap();
    let id = program.table(mid).lookup(intern("S")).unwrap();
    assert!(matches!(&program.table(mid).get(id).kind, EntryKind::Struct { fields } if fields.len() == 1));
  }

  #[test]
  fn forward_declaration_after_full_definition_is_a_no_op() {
    let module = ast::Module {
      name: intern("m4"),
      kind: FileKind::Code,
      imports: vec![],
      decls: vec![
        TopLevel::StructDecl { name: intern("S"), span: span(),
          fields: Some(vec![(intern("x"), int_te())]) },
        TopLevel::StructDecl { name: intern("S"), span: span(), fields: None },
      ],
    };
    let options = Options::default();
    let mut sink = Sink::new();
    Builder::new(std::slice::from_ref(&module), &options).build(&mut sink);
    assert!(!sink.has_errors());
  }

  #[test]
  fn cyclic_declaration_import_reports_the_full_chain() {
    let a = ast::Module { name: intern("a"), kind: FileKind::Declaration, imports: vec![intern("b")], decls: vec![] };
    let b = ast::Module { name: intern("b"), kind: FileKind::Declaration, imports: vec![intern("c")], decls: vec![] };
    let c = ast::Module { name: intern("c"), kind: FileKind::Declaration, imports: vec![intern("a")], decls: vec![] };
    let options = Options::default();
    let mut sink = Sink::new();
    Builder::new(&[a, b, c], &options).build(&mut sink);
    assert!(sink.has_errors());
    // Which of the three declaration files is visited first is unspecified
    // (`Program`'s internal module map isn't insertion-ordered), so the
    // cycle can be reported starting from any of them; what must hold is
    // that the chain is the full three-file cycle, closing back on its
    // start, not just the two files where the re-entry was detected.
    let message = &sink.diagnostics()[0].message;
    let chain: Vec<&str> = message.rsplit_once("cyclic import: ").unwrap().1.split(" -> ").collect();
    assert_eq!(chain.len(), 4, "expected the full import chain, got: {message}");
    assert_eq!(chain.first(), chain.last());
    let mut names: Vec<&str> = chain[..3].to_vec();
    names.sort_unstable();
    assert_eq!(names, ["a", "b", "c"]);
  }
}
