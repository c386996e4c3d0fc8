//! C7: lowers a type-checked AST into fragments (§4.7).
//!
//! The translator never hard-codes a calling convention or an addressing
//! mode: every fact about where a parameter lives, where a call's return
//! value appears, and how wide a pointer is comes from an injected
//! [`Target`] (the `frameCtor`/`globalAccessCtor`/`functionAccessCtor`
//! triple of §5, folded into one trait since they always cooperate to
//! answer "where does this value live" — see `DESIGN.md`). Temp names come
//! from an injected [`TempGen`], per §5's "strictly monotonic unique
//! output" contract.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::ast::{BinOp, Expr, ExprKind, Param, Stmt, TopLevel, TypeExpr, UnOp};
use crate::ast_bridge::bridge_type;
use crate::diag::{Options, Sink};
use crate::ir::model::{AllocHint, Block, Datum, FragName, Fragment, Instruction, Operand, Operator};
use crate::symbol::Symbol;
use crate::symtab::{resolve_overload, Environment, Modules, OverloadResolution};
use crate::types::entity::EntryKind;
use crate::types::ty::{Keyword, Type, TypeKind};
use crate::types::{BlockId, Idx, ModuleId};

/// Module-qualified global mangling (§6): reversible in the sense that the
/// `::` separator never appears in a bare identifier, so a backend can
/// always split a mangled name back into its module and local parts.
#[must_use] pub fn mangle(module: Symbol, name: Symbol) -> Symbol {
  crate::symbol::intern(&format!("{}::{}", crate::symbol::resolve(module), crate::symbol::resolve(name)))
}

/// Target-specific facts the translator consumes but must never bake in
/// (§4.7, §5: "Frames and access objects are injected by constructors
/// supplied by the caller").
pub trait Target {
  /// Pointer width in bytes.
  fn pointer_width(&self) -> u32;
  /// Where parameter `index` (zero-based) is read from on entry.
  fn param_operand(&self, index: usize, size: u32, alignment: u32, hint: AllocHint) -> Operand;
  /// Where a call's return value is produced.
  fn return_operand(&self, size: u32, hint: AllocHint) -> Operand;
}

/// Strictly-monotonic unique temp names (§5). Any `FnMut() -> u32` works,
/// so callers can close over a plain counter.
pub trait TempGen { fn next_temp(&mut self) -> u32; }

impl<F: FnMut() -> u32> TempGen for F {
  fn next_temp(&mut self) -> u32 { self() }
}

fn keyword_layout(k: Keyword) -> (u32, u32) {
  match k {
    Keyword::Void => (0, 1),
    Keyword::Bool | Keyword::Byte | Keyword::UByte | Keyword::Char => (1, 1),
    Keyword::Short | Keyword::UShort => (2, 2),
    Keyword::Int | Keyword::UInt | Keyword::WChar | Keyword::Float => (4, 4),
    Keyword::Long | Keyword::ULong | Keyword::Double => (8, 8),
  }
}

fn resolved_fields<'m, M: Modules>(ty: &Type, modules: &'m M) -> Option<&'m [(Symbol, Type)]> {
  match ty.unqualified().kind() {
    TypeKind::Reference { module, entry, .. } => match &modules.table(*module).get(*entry).kind {
      EntryKind::Struct { fields } => Some(fields),
      EntryKind::Union { options } => Some(options),
      EntryKind::Typedef { target } => resolved_fields(target, modules),
      _ => None,
    },
    _ => None,
  }
}

fn struct_fields_of<'m, M: Modules>(ty: &Type, modules: &'m M) -> Option<&'m [(Symbol, Type)]> {
  match ty.unqualified().kind() {
    TypeKind::Pointer(inner) => resolved_fields(inner, modules),
    _ => resolved_fields(ty, modules),
  }
}

fn offset_of<M: Modules>(fields: &[(Symbol, Type)], field: Symbol, modules: &M, ptr_width: u32) -> Option<(u32, Type)> {
  let mut offset = 0u32;
  for (n, t) in fields {
    if *n == field { return Some((offset, t.clone())) }
    let (size, _) = layout(t, modules, ptr_width);
    offset += size;
  }
  None
}

/// Size and alignment of `ty` (§3). Struct/union layout is a simple
/// sequential sum of field sizes with no inter-field padding — a pinned
/// simplification (`DESIGN.md`) that keeps [`offset_of`] and this function
/// in lockstep; a real ABI would align each field first.
#[must_use] pub fn layout<M: Modules>(ty: &Type, modules: &M, ptr_width: u32) -> (u32, u32) {
  match ty.kind() {
    TypeKind::Keyword(k) => keyword_layout(*k),
    TypeKind::Qualified { base, .. } => layout(base, modules, ptr_width),
    TypeKind::Pointer(_) | TypeKind::FuncPtr { .. } => (ptr_width, ptr_width),
    TypeKind::Array { len, elem } => {
      let (esize, ealign) = layout(elem, modules, ptr_width);
      (esize.saturating_mul(u32::try_from(*len).unwrap_or(u32::MAX)), ealign)
    }
    TypeKind::Aggregate(parts) => parts.iter().fold((0, 1), |(size, align), p| {
      let (psize, palign) = layout(p, modules, ptr_width);
      (size + psize, align.max(palign))
    }),
    TypeKind::Reference { module, entry, .. } => match &modules.table(*module).get(*entry).kind {
      EntryKind::Struct { fields } => fields.iter().fold((0, 1), |(size, align), (_, t)| {
        let (fsize, falign) = layout(t, modules, ptr_width);
        (size + fsize, align.max(falign))
      }),
      EntryKind::Union { options } => options.iter().fold((0, 1), |(size, align), (_, t)| {
        let (fsize, falign) = layout(t, modules, ptr_width);
        (size.max(fsize), align.max(falign))
      }),
      EntryKind::Enum { .. } => (4, 4),
      EntryKind::Typedef { target } => layout(target, modules, ptr_width),
      // An opaque type with no definition yet: the translator can only
      // have reached here through a pointer indirection the checker
      // already validated, so treat it as an opaque handle.
      _ => (ptr_width, ptr_width),
    },
  }
}

fn pointer_sized_int(width: u32) -> Type { Type::keyword(if width >= 8 { Keyword::ULong } else { Keyword::UInt }) }

fn is_float_ty(ty: &Type) -> bool { matches!(ty.unqualified().kind(), TypeKind::Keyword(k) if k.is_float()) }

fn is_unsigned_ty(ty: &Type) -> bool {
  match ty.unqualified().kind() {
    TypeKind::Keyword(k) => k.is_unsigned(),
    TypeKind::Pointer(_) => true,
    _ => false,
  }
}

fn keyword_size_of(ty: &Type) -> (u32, u32) {
  match ty.unqualified().kind() {
    TypeKind::Keyword(k) => keyword_layout(*k),
    _ => (4, 4),
  }
}

fn int_datum(n: i64, ty: &Type) -> Datum {
  match keyword_size_of(ty).0 {
    1 => Datum::Byte(n as u8),
    2 => Datum::Short(n as u16),
    4 => Datum::Int(n as u32),
    _ => Datum::Long(n as u64),
  }
}

fn float_datum(f: f64, ty: &Type) -> Datum {
  if keyword_size_of(ty).0 == 4 { Datum::Int((f as f32).to_bits()) } else { Datum::Long(f.to_bits()) }
}

fn const_int_operand(n: i64, ty: &Type) -> Operand {
  Operand::Constant { alignment: keyword_size_of(ty).1, data: vec![int_datum(n, ty)] }
}

fn const_float_operand(f: f64, ty: &Type) -> Operand {
  Operand::Constant { alignment: keyword_size_of(ty).1, data: vec![float_datum(f, ty)] }
}

fn const_uint(value: u64, width: u32) -> Operand {
  let datum = if width <= 4 { Datum::Int(value as u32) } else { Datum::Long(value) };
  Operand::Constant { alignment: width, data: vec![datum] }
}

fn zero_ptr(width: u32) -> Operand { const_uint(0, width) }

fn local_operand(id: BlockId) -> Operand { Operand::Constant { alignment: 1, data: vec![Datum::Local(id)] } }

fn global_operand(sym: Symbol) -> Operand { Operand::Constant { alignment: 1, data: vec![Datum::Global(sym)] } }

fn is_dense(labels: &[i64]) -> bool {
  if labels.len() < 4 { return false }
  let mut sorted = labels.to_vec();
  sorted.sort_unstable();
  sorted.dedup();
  if sorted.len() != labels.len() { return false }
  sorted.last().unwrap() - sorted[0] + 1 == labels.len() as i64
}

/// Fold the handful of initializer forms globals are allowed to use
/// (literals, and negation of one) into a single datum. Anything else
/// leaves the global `BSS`-initialized — a pinned simplification
/// (`DESIGN.md`): this translator never runs a constant-folding
/// interpreter over arbitrary initializer expressions.
fn const_eval_global(e: &Expr, ty: &Type) -> Option<Datum> {
  match &e.kind {
    ExprKind::IntLit(n) => Some(int_datum(*n, ty)),
    ExprKind::FloatLit(f) => Some(float_datum(*f, ty)),
    ExprKind::StringLit(s) => {
      let mut bytes = crate::symbol::resolve(*s).into_bytes();
      bytes.push(0);
      Some(Datum::String(bytes))
    }
    ExprKind::Unary { op: UnOp::Neg, operand } => match const_eval_global(operand, ty)? {
      Datum::Byte(b) => Some(Datum::Byte((b as i8).wrapping_neg() as u8)),
      Datum::Short(s) => Some(Datum::Short((s as i16).wrapping_neg() as u16)),
      Datum::Int(n) if is_float_ty(ty) => Some(Datum::Int((-f32::from_bits(n)).to_bits())),
      Datum::Int(n) => Some(Datum::Int((n as i32).wrapping_neg() as u32)),
      Datum::Long(n) if is_float_ty(ty) => Some(Datum::Long((-f64::from_bits(n)).to_bits())),
      Datum::Long(n) => Some(Datum::Long((n as i64).wrapping_neg() as u64)),
      other => Some(other),
    },
    _ => None,
  }
}

/// A module-scope variable: `DATA` if its initializer folds to a constant,
/// `BSS` otherwise (§4.7).
#[must_use] pub fn translate_global<M: Modules>(
  mid: ModuleId, name: Symbol, ty: &Type, init: Option<&Expr>, modules: &M, ptr_width: u32,
) -> Fragment {
  let frag_name = FragName::Global(mangle(modules.module_name(mid), name));
  let (size, alignment) = layout(ty, modules, ptr_width);
  match init.and_then(|e| const_eval_global(e, ty)) {
    Some(datum) => Fragment::Data { name: frag_name, alignment, data: vec![datum] },
    None => Fragment::Bss { name: frag_name, alignment, size: u64::from(size) },
  }
}

fn collect_address_taken(stmts: &[Stmt]) -> HashSet<Symbol> {
  let mut set = HashSet::new();
  for s in stmts { walk_stmt(s, &mut set); }
  set
}

fn walk_stmt(s: &Stmt, set: &mut HashSet<Symbol>) {
  match s {
    Stmt::Expr(e) => walk_expr(e, set),
    Stmt::VarDecl { init, .. } => if let Some(e) = init { walk_expr(e, set) },
    Stmt::Block(ss) => for s in ss { walk_stmt(s, set) },
    Stmt::If { cond, then, else_ } => {
      walk_expr(cond, set);
      walk_stmt(then, set);
      if let Some(e) = else_ { walk_stmt(e, set) }
    }
    Stmt::While { cond, body } | Stmt::DoWhile { body, cond } => { walk_expr(cond, set); walk_stmt(body, set); }
    Stmt::For { init, cond, step, body } => {
      if let Some(i) = init { walk_stmt(i, set) }
      if let Some(c) = cond { walk_expr(c, set) }
      if let Some(st) = step { walk_expr(st, set) }
      walk_stmt(body, set);
    }
    Stmt::Switch { scrutinee, cases } => {
      walk_expr(scrutinee, set);
      for (_, body) in cases { for s in body { walk_stmt(s, set) } }
    }
    Stmt::Break | Stmt::Continue | Stmt::Asm(_) => {}
    Stmt::Return(e) => if let Some(e) = e { walk_expr(e, set) },
  }
}

fn walk_expr(e: &Expr, set: &mut HashSet<Symbol>) {
  match &e.kind {
    ExprKind::Unary { op: UnOp::AddrOf, operand } => {
      if let ExprKind::Ident(ident) = &operand.kind { set.insert(ident.name); }
      walk_expr(operand, set);
    }
    ExprKind::Unary { operand, .. } | ExprKind::Cast { operand, .. } | ExprKind::SizeofExpr(operand) =>
      walk_expr(operand, set),
    ExprKind::Binary { lhs, rhs, .. } | ExprKind::Assign { lhs, rhs } => { walk_expr(lhs, set); walk_expr(rhs, set); }
    ExprKind::Call { callee, args } => { walk_expr(callee, set); for a in args { walk_expr(a, set) } }
    ExprKind::Subscript { base, index } => { walk_expr(base, set); walk_expr(index, set); }
    ExprKind::Member { base, .. } => walk_expr(base, set),
    ExprKind::Ternary { cond, yes, no } => { walk_expr(cond, set); walk_expr(yes, set); walk_expr(no, set); }
    ExprKind::IntLit(_) | ExprKind::FloatLit(_) | ExprKind::StringLit(_)
      | ExprKind::Ident(_) | ExprKind::Qualified { .. } | ExprKind::SizeofType(_) => {}
  }
}

fn binary_operator(op: BinOp, ty: &Type) -> Operator {
  let float = is_float_ty(ty);
  let unsigned = is_unsigned_ty(ty);
  match op {
    BinOp::Add => if float { Operator::FAdd } else { Operator::Add },
    BinOp::Sub => if float { Operator::FSub } else { Operator::Sub },
    BinOp::Mul => if float { Operator::FMul } else if unsigned { Operator::UMul } else { Operator::SMul },
    BinOp::Div => if float { Operator::FDiv } else if unsigned { Operator::UDiv } else { Operator::SDiv },
    BinOp::Mod => if float { Operator::FMod } else if unsigned { Operator::UMod } else { Operator::SMod },
    BinOp::BitAnd => Operator::And,
    BinOp::BitOr => Operator::Or,
    BinOp::BitXor => Operator::Xor,
    BinOp::Lt => if float { Operator::FL } else if unsigned { Operator::B } else { Operator::L },
    BinOp::Le => if float { Operator::FLe } else if unsigned { Operator::Be } else { Operator::Le },
    BinOp::Gt => if float { Operator::FG } else if unsigned { Operator::A } else { Operator::G },
    BinOp::Ge => if float { Operator::FGe } else if unsigned { Operator::Ae } else { Operator::Ge },
    BinOp::Eq => if float { Operator::FE } else { Operator::E },
    BinOp::Ne => if float { Operator::FNe } else { Operator::Ne },
    BinOp::Shl | BinOp::Shr | BinOp::And | BinOp::Or => unreachable!("shifts and logical ops are lowered separately"),
  }
}

/// Per-function lowering state: the block list under construction, the
/// temp/block counters, and the local-variable bindings in scope.
struct FuncBuilder<'a, M: Modules, T: Target> {
  modules: &'a M,
  target: &'a T,
  temp_gen: &'a mut dyn TempGen,
  options: &'a Options,
  mid: ModuleId,
  blocks: Vec<Block>,
  current: Vec<Instruction>,
  current_label: BlockId,
  next_block: u32,
  locals: HashMap<Symbol, Operand>,
  break_targets: Vec<BlockId>,
  continue_targets: Vec<BlockId>,
  ret_slot: Operand,
  ret_block: BlockId,
  ret_ty: Type,
  address_taken: HashSet<Symbol>,
  string_counter: u32,
  extra: Vec<Fragment>,
}

impl<'a, M: Modules, T: Target> FuncBuilder<'a, M, T> {
  fn ptr_width(&self) -> u32 { self.target.pointer_width() }

  fn layout_of(&self, ty: &Type) -> (u32, u32) { layout(ty, self.modules, self.ptr_width()) }

  fn hint_for(&self, ty: &Type) -> AllocHint {
    let (size, _) = self.layout_of(ty);
    if size > self.ptr_width() { AllocHint::Mem } else if is_float_ty(ty) { AllocHint::Fp } else { AllocHint::Gp }
  }

  fn fresh_temp(&mut self, ty: &Type, hint: AllocHint) -> Operand {
    let (size, alignment) = self.layout_of(ty);
    Operand::Temp { name: self.temp_gen.next_temp(), alignment, size, hint }
  }

  fn fresh_temp_pointer(&mut self) -> Operand {
    let width = self.ptr_width();
    Operand::Temp { name: self.temp_gen.next_temp(), alignment: width, size: width, hint: AllocHint::Gp }
  }

  fn emit(&mut self, op: Operator, operands: Vec<Operand>) { self.current.push(Instruction::new(op, operands)); }

  fn fresh_block(&mut self) -> BlockId {
    let id = BlockId::from_usize(self.next_block as usize);
    self.next_block += 1;
    id
  }

  fn start_block(&mut self, id: BlockId) {
    self.current_label = id;
    self.current.clear();
  }

  /// Ends the current block with `term`. The caller must [`Self::start_block`]
  /// before emitting anything further — this never advances the cursor
  /// itself, since callers sometimes need to finish two sibling blocks
  /// before either's successor exists yet (e.g. an `if`'s two arms).
  fn finish_block(&mut self, term: Instruction) {
    let mut instructions = std::mem::take(&mut self.current);
    instructions.push(term);
    self.blocks.push(Block { label: self.current_label, instructions });
  }

  fn jump_to(&mut self, target: BlockId) { self.finish_block(Instruction::new(Operator::Jump, vec![local_operand(target)])); }

  /// `zero`/`nonzero` name the two successor blocks of a `J2Z` terminator
  /// (§4.6's boolean family): operand 0 is taken when `cond == 0`,
  /// operand 1 otherwise.
  fn cond_jump(&mut self, cond: Operand, zero: BlockId, nonzero: BlockId) {
    self.finish_block(Instruction::new(Operator::J2Z, vec![local_operand(zero), local_operand(nonzero), cond]));
  }

  fn resolve_qualified_module(&self, name: Symbol) -> ModuleId {
    self.modules.table(self.mid).imports.iter().find(|(n, _)| *n == name)
      .map(|(_, m)| *m).expect("type-checked: import resolved")
  }

  fn bridge(&self, te: &TypeExpr) -> Type {
    let env = Environment::new(self.modules, self.mid);
    let mut scratch = Sink::new();
    bridge_type(te, &env, self.options, &mut scratch)
  }

  /// Widens/narrows/reinterprets `value` from `from` to `to`, per §4.6's
  /// conversion family (`SX`/`ZX`/`TRUNC`/`U2F`/`S2F`/`FRESIZE`/`F2I`).
  /// A no-op `Move` would violate `MOVE`'s `sizeof(1) == sizeof(0)`
  /// constraint whenever the sizes actually differ, so every implicit or
  /// explicit conversion site in this module must route through here.
  fn convert_if_needed(&mut self, value: Operand, from: &Type, to: &Type) -> Operand {
    if crate::symtab::type_equal(from, to, self.modules) { return value }
    let (fsize, _) = self.layout_of(from);
    let (tsize, _) = self.layout_of(to);
    let from_float = is_float_ty(from);
    let to_float = is_float_ty(to);
    let op = match (from_float, to_float) {
      (false, true) => if is_unsigned_ty(from) { Operator::U2F } else { Operator::S2F },
      (true, false) => Operator::F2I,
      (true, true) if tsize != fsize => Operator::FResize,
      (false, false) if tsize > fsize => if is_unsigned_ty(from) { Operator::Zx } else { Operator::Sx },
      (false, false) if tsize < fsize => Operator::Trunc,
      _ => return value, // same width, same float-ness: bits are already right
    };
    let dst = self.fresh_temp(to, self.hint_for(to));
    self.emit(op, vec![dst.clone(), value]);
    dst
  }

  fn lower_ident_value(&mut self, name: Symbol, ty: &Type) -> Operand {
    if let Some(storage) = self.locals.get(&name) { return storage.clone() }
    let sym = mangle(self.modules.module_name(self.mid), name);
    let dst = self.fresh_temp(ty, self.hint_for(ty));
    let width = self.ptr_width();
    self.emit(Operator::MemLoad, vec![dst.clone(), global_operand(sym), zero_ptr(width)]);
    dst
  }

  fn lower_string_literal(&mut self, s: Symbol) -> Operand {
    self.string_counter += 1;
    let owner = crate::symbol::resolve(self.modules.module_name(self.mid));
    let label = crate::symbol::intern(&format!("{owner}.str{}", self.string_counter));
    let mut bytes = crate::symbol::resolve(s).into_bytes();
    bytes.push(0);
    self.extra.push(Fragment::Rodata { name: FragName::Global(label), alignment: 1, data: vec![Datum::String(bytes)] });
    let width = self.ptr_width();
    Operand::Constant { alignment: width, data: vec![Datum::Global(label)] }
  }

  /// The address of `e` (§4.7): a pointer-typed expression already *is*
  /// one (just evaluate it); anything else needs its storage's address
  /// taken explicitly.
  fn lower_address(&mut self, e: &Expr) -> Operand {
    let ty = e.ty.borrow().clone().expect("type-checked");
    if matches!(ty.unqualified().kind(), TypeKind::Pointer(_)) { self.lower_expr(e) } else { self.lower_lvalue_addr(e) }
  }

  fn lower_lvalue_addr(&mut self, e: &Expr) -> Operand {
    match &e.kind {
      ExprKind::Ident(ident) => match self.locals.get(&ident.name).cloned() {
        Some(storage) => {
          let dst = self.fresh_temp_pointer();
          self.emit(Operator::AddrOf, vec![dst.clone(), storage]);
          dst
        }
        None => global_operand(mangle(self.modules.module_name(self.mid), ident.name)),
      },
      ExprKind::Subscript { base, index } => {
        let (base_addr, scaled) = self.lower_subscript_offset(base, index, &e.ty.borrow().clone().expect("checked"));
        let addr = self.fresh_temp_pointer();
        self.emit(Operator::Add, vec![addr.clone(), base_addr, scaled]);
        addr
      }
      ExprKind::Member { base, field } => {
        let (base_addr, offset) = self.lower_member_offset(base, *field);
        let addr = self.fresh_temp_pointer();
        self.emit(Operator::Add, vec![addr.clone(), base_addr, offset]);
        addr
      }
      ExprKind::Unary { op: UnOp::Deref, operand } => self.lower_expr(operand),
      _ => self.lower_expr(e),
    }
  }

  fn lower_subscript_offset(&mut self, base: &Expr, index: &Expr, elem_ty: &Type) -> (Operand, Operand) {
    let base_addr = self.lower_address(base);
    let index_ty = index.ty.borrow().clone().expect("checked");
    let idx_raw = self.lower_expr(index);
    let ptr_int = pointer_sized_int(self.ptr_width());
    let idx = self.convert_if_needed(idx_raw, &index_ty, &ptr_int);
    let (elem_size, _) = self.layout_of(elem_ty);
    let width = self.ptr_width();
    let scaled = self.fresh_temp_pointer();
    self.emit(Operator::SMul, vec![scaled.clone(), idx, const_uint(u64::from(elem_size), width)]);
    (base_addr, scaled)
  }

  fn lower_member_offset(&mut self, base: &Expr, field: Symbol) -> (Operand, Operand) {
    let base_addr = self.lower_address(base);
    let base_ty = base.ty.borrow().clone().expect("checked");
    let fields = struct_fields_of(&base_ty, self.modules).expect("type-checked: base is a composite");
    let width = self.ptr_width();
    let (offset, _) = offset_of(fields, field, self.modules, width).expect("type-checked: field exists");
    (base_addr, const_uint(u64::from(offset), width))
  }

  fn lower_subscript_value(&mut self, base: &Expr, index: &Expr, ty: &Type) -> Operand {
    let (base_addr, scaled) = self.lower_subscript_offset(base, index, ty);
    let dst = self.fresh_temp(ty, self.hint_for(ty));
    self.emit(Operator::MemLoad, vec![dst.clone(), base_addr, scaled]);
    dst
  }

  fn lower_member_value(&mut self, base: &Expr, field: Symbol, ty: &Type) -> Operand {
    let (base_addr, offset) = self.lower_member_offset(base, field);
    let dst = self.fresh_temp(ty, self.hint_for(ty));
    self.emit(Operator::MemLoad, vec![dst.clone(), base_addr, offset]);
    dst
  }

  fn lower_short_circuit(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Operand {
    let rhs_block = self.fresh_block();
    let short_block = self.fresh_block();
    let join_block = self.fresh_block();
    let result = self.fresh_temp(&Type::keyword(Keyword::Bool), AllocHint::Gp);

    let lo = self.lower_expr(lhs);
    match op {
      BinOp::And => self.cond_jump(lo, short_block, rhs_block),
      BinOp::Or => self.cond_jump(lo, rhs_block, short_block),
      _ => unreachable!("only && and || short-circuit"),
    }

    self.start_block(rhs_block);
    let ro = self.lower_expr(rhs);
    self.emit(Operator::Move, vec![result.clone(), ro]);
    self.jump_to(join_block);

    self.start_block(short_block);
    let short_value = matches!(op, BinOp::Or);
    self.emit(Operator::Move, vec![result.clone(), Operand::Constant { alignment: 1, data: vec![Datum::Byte(u8::from(short_value))] }]);
    self.jump_to(join_block);

    self.start_block(join_block);
    result
  }

  fn lower_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, result_ty: &Type) -> Operand {
    if matches!(op, BinOp::And | BinOp::Or) { return self.lower_short_circuit(op, lhs, rhs) }
    let lhs_ty = lhs.ty.borrow().clone().expect("checked");
    let rhs_ty = rhs.ty.borrow().clone().expect("checked");
    let lo_raw = self.lower_expr(lhs);
    let ro_raw = self.lower_expr(rhs);

    if matches!(op, BinOp::Shl | BinOp::Shr) {
      // SLL/SLR/SAR pin the shift amount to byte size and the shifted
      // value to the destination's size (§4.6).
      let lo = self.convert_if_needed(lo_raw, &lhs_ty, result_ty);
      let amount = self.convert_if_needed(ro_raw, &rhs_ty, &Type::keyword(Keyword::Byte));
      let dst = self.fresh_temp(result_ty, self.hint_for(result_ty));
      let instr = match op {
        BinOp::Shl => Operator::Sll,
        _ if is_unsigned_ty(&lhs_ty) => Operator::Slr,
        _ => Operator::Sar,
      };
      self.emit(instr, vec![dst.clone(), lo, amount]);
      return dst;
    }

    let common = crate::typeck::common_numeric(&lhs_ty, &rhs_ty).unwrap_or_else(|| lhs_ty.clone());
    let lo = self.convert_if_needed(lo_raw, &lhs_ty, &common);
    let ro = self.convert_if_needed(ro_raw, &rhs_ty, &common);
    let dst = self.fresh_temp(result_ty, self.hint_for(result_ty));
    self.emit(binary_operator(op, &common), vec![dst.clone(), lo, ro]);
    dst
  }

  fn lower_unary(&mut self, op: UnOp, operand: &Expr, ty: &Type) -> Operand {
    match op {
      UnOp::AddrOf => self.lower_lvalue_addr(operand),
      UnOp::Deref => {
        let addr = self.lower_expr(operand);
        let dst = self.fresh_temp(ty, self.hint_for(ty));
        let width = self.ptr_width();
        self.emit(Operator::MemLoad, vec![dst.clone(), addr, zero_ptr(width)]);
        dst
      }
      UnOp::Neg => {
        let v = self.lower_expr(operand);
        let dst = self.fresh_temp(ty, self.hint_for(ty));
        self.emit(if is_float_ty(ty) { Operator::FNeg } else { Operator::Neg }, vec![dst.clone(), v]);
        dst
      }
      UnOp::BitNot => {
        let v = self.lower_expr(operand);
        let dst = self.fresh_temp(ty, self.hint_for(ty));
        self.emit(Operator::Not, vec![dst.clone(), v]);
        dst
      }
      UnOp::Not => {
        let v = self.lower_expr(operand);
        // LNOT's source operand is pinned to byte size (§4.6); reduce an
        // arbitrary-width operand to a 0/1 truth value with NZ first.
        let truthy = self.fresh_temp(&Type::keyword(Keyword::Bool), AllocHint::Gp);
        self.emit(Operator::Nz, vec![truthy.clone(), v]);
        let dst = self.fresh_temp(&Type::keyword(Keyword::Bool), AllocHint::Gp);
        self.emit(Operator::LNot, vec![dst.clone(), truthy]);
        dst
      }
    }
  }

  fn lower_call(&mut self, callee: &Expr, args: &[Expr], result_ty: &Type) -> Operand {
    let (target_module, target_id, callee_name) = match &callee.kind {
      ExprKind::Ident(ident) => (self.mid, ident.resolved.get().expect("type-checked: callee resolved"), ident.name),
      ExprKind::Qualified { module, name, resolved } =>
        (self.resolve_qualified_module(*module), resolved.get().expect("type-checked: callee resolved"), *name),
      _ => panic!("type-checked: call target is a function name"),
    };

    let arg_tys: Vec<Type> = args.iter().map(|a| a.ty.borrow().clone().expect("checked")).collect();
    let arg_operands: Vec<Operand> = args.iter().map(|a| self.lower_expr(a)).collect();

    let EntryKind::Function { overloads } = &self.modules.table(target_module).get(target_id).kind
      else { panic!("type-checked: callee names a function") };
    let overload = match resolve_overload(overloads, &arg_tys, self.modules) {
      OverloadResolution::Match(i) => overloads.0[i].clone(),
      _ => panic!("type-checked: a call site's overload already resolved uniquely"),
    };

    for (i, (arg_op, arg_ty)) in arg_operands.into_iter().zip(arg_tys.iter()).enumerate() {
      let param_ty = overload.params[i].clone();
      let arg_op = self.convert_if_needed(arg_op, arg_ty, &param_ty);
      let (psize, palign) = self.layout_of(&param_ty);
      let hint = self.hint_for(&param_ty);
      let slot = self.target.param_operand(i, psize, palign, hint);
      self.emit(Operator::Move, vec![slot, arg_op]);
    }

    let callee_sym = mangle(self.modules.module_name(target_module), callee_name);
    self.emit(Operator::Call, vec![global_operand(callee_sym)]);

    if overload.ret.is_keyword(Keyword::Void) {
      return Operand::Constant { alignment: 1, data: vec![Datum::Byte(0)] };
    }
    let (rsize, _) = self.layout_of(&overload.ret);
    let ret_hint = self.hint_for(&overload.ret);
    let ret_slot = self.target.return_operand(rsize, ret_hint);
    let dst = self.fresh_temp(result_ty, ret_hint);
    self.emit(Operator::Move, vec![dst.clone(), ret_slot]);
    dst
  }

  fn lower_ternary(&mut self, cond: &Expr, yes: &Expr, no: &Expr, result_ty: &Type) -> Operand {
    let yes_block = self.fresh_block();
    let no_block = self.fresh_block();
    let join_block = self.fresh_block();
    let c = self.lower_expr(cond);
    self.cond_jump(c, no_block, yes_block);
    let result = self.fresh_temp(result_ty, self.hint_for(result_ty));

    self.start_block(yes_block);
    let yv_ty = yes.ty.borrow().clone().expect("checked");
    let yv = self.lower_expr(yes);
    let yv = self.convert_if_needed(yv, &yv_ty, result_ty);
    self.emit(Operator::Move, vec![result.clone(), yv]);
    self.jump_to(join_block);

    self.start_block(no_block);
    let nv_ty = no.ty.borrow().clone().expect("checked");
    let nv = self.lower_expr(no);
    let nv = self.convert_if_needed(nv, &nv_ty, result_ty);
    self.emit(Operator::Move, vec![result.clone(), nv]);
    self.jump_to(join_block);

    self.start_block(join_block);
    result
  }

  fn lower_cast(&mut self, to: &TypeExpr, operand: &Expr) -> Operand {
    let from_ty = operand.ty.borrow().clone().expect("checked");
    let v = self.lower_expr(operand);
    let to_ty = self.bridge(to);
    self.convert_if_needed(v, &from_ty, &to_ty)
  }

  fn lower_sizeof_type(&mut self, te: &TypeExpr, result_ty: &Type) -> Operand {
    let target_ty = self.bridge(te);
    let (size, _) = self.layout_of(&target_ty);
    const_int_operand(i64::from(size), result_ty)
  }

  fn lower_sizeof_expr(&mut self, inner: &Expr, result_ty: &Type) -> Operand {
    let inner_ty = inner.ty.borrow().clone().expect("checked");
    let (size, _) = self.layout_of(&inner_ty);
    const_int_operand(i64::from(size), result_ty)
  }

  fn lower_assign(&mut self, lhs: &Expr, rhs: &Expr) -> Operand {
    let rhs_ty = rhs.ty.borrow().clone().expect("checked");
    let lhs_ty = lhs.ty.borrow().clone().expect("checked");
    let raw = self.lower_expr(rhs);
    let value = self.convert_if_needed(raw, &rhs_ty, &lhs_ty);
    match &lhs.kind {
      ExprKind::Ident(ident) => match self.locals.get(&ident.name).cloned() {
        Some(storage) => { self.emit(Operator::Move, vec![storage, value.clone()]); value }
        None => {
          let sym = mangle(self.modules.module_name(self.mid), ident.name);
          let width = self.ptr_width();
          self.emit(Operator::MemStore, vec![global_operand(sym), value.clone(), zero_ptr(width)]);
          value
        }
      },
      ExprKind::Subscript { base, index } => {
        let (base_addr, scaled) = self.lower_subscript_offset(base, index, &lhs_ty);
        self.emit(Operator::MemStore, vec![base_addr, value.clone(), scaled]);
        value
      }
      ExprKind::Member { base, field } => {
        let (base_addr, offset) = self.lower_member_offset(base, *field);
        self.emit(Operator::MemStore, vec![base_addr, value.clone(), offset]);
        value
      }
      ExprKind::Unary { op: UnOp::Deref, operand } => {
        let addr = self.lower_expr(operand);
        let width = self.ptr_width();
        self.emit(Operator::MemStore, vec![addr, value.clone(), zero_ptr(width)]);
        value
      }
      _ => panic!("type-checked: assignment target is an lvalue"),
    }
  }

  fn lower_expr(&mut self, e: &Expr) -> Operand {
    let ty = e.ty.borrow().clone().expect("type-checked AST: every expression has a type");
    match &e.kind {
      ExprKind::IntLit(n) => const_int_operand(*n, &ty),
      ExprKind::FloatLit(f) => const_float_operand(*f, &ty),
      ExprKind::StringLit(s) => self.lower_string_literal(*s),
      ExprKind::Ident(ident) => self.lower_ident_value(ident.name, &ty),
      ExprKind::Qualified { .. } => panic!("type-checked: a bare qualified name only appears as a call callee"),
      ExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs, &ty),
      ExprKind::Unary { op, operand } => self.lower_unary(*op, operand, &ty),
      ExprKind::Call { callee, args } => self.lower_call(callee, args, &ty),
      ExprKind::Subscript { base, index } => self.lower_subscript_value(base, index, &ty),
      ExprKind::Member { base, field } => self.lower_member_value(base, *field, &ty),
      ExprKind::Ternary { cond, yes, no } => self.lower_ternary(cond, yes, no, &ty),
      ExprKind::Cast { to, operand } => self.lower_cast(to, operand),
      ExprKind::SizeofType(te) => self.lower_sizeof_type(te, &ty),
      ExprKind::SizeofExpr(inner) => self.lower_sizeof_expr(inner, &ty),
      ExprKind::Assign { lhs, rhs } => self.lower_assign(lhs, rhs),
    }
  }

  fn lower_switch(&mut self, value: &Operand, scrut_ty: &Type, cases: &[(Option<i64>, Vec<Stmt>)], exit: BlockId) {
    if cases.is_empty() { self.jump_to(exit); return }
    let case_blocks: Vec<BlockId> = cases.iter().map(|_| self.fresh_block()).collect();
    let default_idx = cases.iter().position(|(l, _)| l.is_none());
    let fallback = default_idx.map_or(exit, |i| case_blocks[i]);
    let labels: Vec<i64> = cases.iter().filter_map(|(l, _)| *l).collect();

    if is_dense(&labels) {
      self.lower_switch_table(value, scrut_ty, cases, &case_blocks, fallback);
    } else {
      self.lower_switch_chain(value, scrut_ty, cases, &case_blocks, fallback);
    }

    self.start_block(case_blocks[0]);
    for (i, (_, stmts)) in cases.iter().enumerate() {
      for s in stmts { self.lower_stmt(s); }
      let next = case_blocks.get(i + 1).copied().unwrap_or(exit);
      self.jump_to(next);
      if i + 1 < case_blocks.len() { self.start_block(case_blocks[i + 1]); }
    }
  }

  fn lower_switch_chain(
    &mut self, value: &Operand, scrut_ty: &Type, cases: &[(Option<i64>, Vec<Stmt>)],
    case_blocks: &[BlockId], fallback: BlockId,
  ) {
    for (i, (label, _)) in cases.iter().enumerate() {
      let Some(lit) = label else { continue };
      let next_test = self.fresh_block();
      let cmp = self.fresh_temp(&Type::keyword(Keyword::Bool), AllocHint::Gp);
      self.emit(Operator::E, vec![cmp.clone(), value.clone(), const_int_operand(*lit, scrut_ty)]);
      self.cond_jump(cmp, next_test, case_blocks[i]);
      self.start_block(next_test);
    }
    self.jump_to(fallback);
  }

  /// A dense, `>= 4`-case switch lowers to a bounds check plus `JUMPTABLE`
  /// rather than a chain of compares (§4.7).
  fn lower_switch_table(
    &mut self, value: &Operand, scrut_ty: &Type, cases: &[(Option<i64>, Vec<Stmt>)],
    case_blocks: &[BlockId], fallback: BlockId,
  ) {
    let labeled: Vec<(i64, BlockId)> = cases.iter().zip(case_blocks)
      .filter_map(|((l, _), b)| l.map(|v| (v, *b))).collect();
    let min = labeled.iter().map(|(v, _)| *v).min().expect("dense switch has labels");
    let max = labeled.iter().map(|(v, _)| *v).max().expect("dense switch has labels");

    let idx_native = self.fresh_temp(scrut_ty, self.hint_for(scrut_ty));
    self.emit(Operator::Sub, vec![idx_native.clone(), value.clone(), const_int_operand(min, scrut_ty)]);
    let in_range = self.fresh_temp(&Type::keyword(Keyword::Bool), AllocHint::Gp);
    self.emit(Operator::B, vec![in_range.clone(), idx_native.clone(), const_int_operand(max - min + 1, scrut_ty)]);
    let dispatch = self.fresh_block();
    self.cond_jump(in_range, fallback, dispatch);
    self.start_block(dispatch);

    let width = self.ptr_width();
    let (native_size, _) = self.layout_of(scrut_ty);
    let idx = if native_size == width {
      idx_native
    } else {
      let widened = self.fresh_temp(&pointer_sized_int(width), AllocHint::Gp);
      self.emit(Operator::Zx, vec![widened.clone(), idx_native]);
      widened
    };

    let table: Vec<Datum> = (min..=max)
      .map(|v| labeled.iter().find(|(lv, _)| *lv == v).map_or(fallback, |(_, b)| *b))
      .map(Datum::Local)
      .collect();
    self.emit(Operator::JumpTable, vec![idx, Operand::Constant { alignment: width, data: table }]);
  }

  fn lower_stmt(&mut self, s: &Stmt) {
    match s {
      Stmt::Expr(e) => { self.lower_expr(e); }

      Stmt::VarDecl { name, declared_ty, init, .. } => {
        let ty = self.bridge(declared_ty);
        let hint = if self.address_taken.contains(name) { AllocHint::Mem } else { self.hint_for(&ty) };
        let storage = self.fresh_temp(&ty, hint);
        if let Some(init) = init {
          let init_ty = init.ty.borrow().clone().expect("checked");
          let raw = self.lower_expr(init);
          let value = self.convert_if_needed(raw, &init_ty, &ty);
          self.emit(Operator::Move, vec![storage.clone(), value]);
        }
        self.locals.insert(*name, storage);
      }

      Stmt::Block(stmts) => for s in stmts { self.lower_stmt(s) },

      Stmt::If { cond, then, else_ } => {
        let then_block = self.fresh_block();
        let else_block = self.fresh_block();
        let join_block = self.fresh_block();
        let c = self.lower_expr(cond);
        self.cond_jump(c, else_block, then_block);

        self.start_block(then_block);
        self.lower_stmt(then);
        self.jump_to(join_block);

        self.start_block(else_block);
        if let Some(e) = else_ { self.lower_stmt(e); }
        self.jump_to(join_block);

        self.start_block(join_block);
      }

      Stmt::While { cond, body } => {
        let head = self.fresh_block();
        let body_block = self.fresh_block();
        let exit = self.fresh_block();
        self.jump_to(head);

        self.start_block(head);
        let c = self.lower_expr(cond);
        self.cond_jump(c, exit, body_block);

        self.start_block(body_block);
        self.break_targets.push(exit);
        self.continue_targets.push(head);
        self.lower_stmt(body);
        self.break_targets.pop();
        self.continue_targets.pop();
        self.jump_to(head);

        self.start_block(exit);
      }

      Stmt::DoWhile { body, cond } => {
        let body_block = self.fresh_block();
        let cond_block = self.fresh_block();
        let exit = self.fresh_block();
        self.jump_to(body_block);

        self.start_block(body_block);
        self.break_targets.push(exit);
        self.continue_targets.push(cond_block);
        self.lower_stmt(body);
        self.break_targets.pop();
        self.continue_targets.pop();
        self.jump_to(cond_block);

        self.start_block(cond_block);
        let c = self.lower_expr(cond);
        self.cond_jump(c, exit, body_block);

        self.start_block(exit);
      }

      Stmt::For { init, cond, step, body } => {
        if let Some(init) = init { self.lower_stmt(init); }
        let head = self.fresh_block();
        let body_block = self.fresh_block();
        let step_block = self.fresh_block();
        let exit = self.fresh_block();
        self.jump_to(head);

        self.start_block(head);
        match cond {
          Some(cond) => { let c = self.lower_expr(cond); self.cond_jump(c, exit, body_block); }
          None => self.jump_to(body_block),
        }

        self.start_block(body_block);
        self.break_targets.push(exit);
        self.continue_targets.push(step_block);
        self.lower_stmt(body);
        self.break_targets.pop();
        self.continue_targets.pop();
        self.jump_to(step_block);

        self.start_block(step_block);
        if let Some(step) = step { self.lower_expr(step); }
        self.jump_to(head);

        self.start_block(exit);
      }

      Stmt::Switch { scrutinee, cases } => {
        let exit = self.fresh_block();
        let scrut_ty = scrutinee.ty.borrow().clone().expect("checked");
        let value = self.lower_expr(scrutinee);
        self.break_targets.push(exit);
        self.lower_switch(&value, &scrut_ty, cases, exit);
        self.break_targets.pop();
        self.start_block(exit);
      }

      Stmt::Break => {
        let target = *self.break_targets.last().expect("type-checked: break is inside a loop or switch");
        self.jump_to(target);
        let dead = self.fresh_block();
        self.start_block(dead);
      }

      Stmt::Continue => {
        let target = *self.continue_targets.last().expect("type-checked: continue is inside a loop");
        self.jump_to(target);
        let dead = self.fresh_block();
        self.start_block(dead);
      }

      Stmt::Return(value) => {
        if let Some(e) = value {
          let e_ty = e.ty.borrow().clone().expect("checked");
          let raw = self.lower_expr(e);
          let target_ty = self.ret_ty.clone();
          let v = self.convert_if_needed(raw, &e_ty, &target_ty);
          let ret_slot = self.ret_slot.clone();
          self.emit(Operator::Move, vec![ret_slot, v]);
        }
        let ret_block = self.ret_block;
        self.jump_to(ret_block);
        let dead = self.fresh_block();
        self.start_block(dead);
      }

      Stmt::Asm(text) => self.emit(Operator::Asm, vec![Operand::Constant {
        alignment: 1, data: vec![Datum::String(crate::symbol::resolve(*text).into_bytes())],
      }]),
    }
  }
}

/// Lowers one function definition into a `TEXT` fragment plus any
/// supporting `RODATA` fragments its string literals need.
#[tracing::instrument(skip_all, fields(function = %crate::symbol::resolve(name)))]
#[must_use] pub fn translate_function<M: Modules, T: Target>(
  mid: ModuleId, name: Symbol, ret: &TypeExpr, params: &[Param], body: &[Stmt],
  modules: &M, target: &T, temp_gen: &mut dyn TempGen, options: &Options,
) -> Vec<Fragment> {
  let address_taken = collect_address_taken(body);
  let ret_ty = { let env = Environment::new(modules, mid); bridge_type(ret, &env, options, &mut Sink::new()) };

  let mut fb = FuncBuilder {
    modules, target, temp_gen, options, mid,
    blocks: Vec::new(), current: Vec::new(), current_label: BlockId(0), next_block: 1,
    locals: HashMap::new(), break_targets: Vec::new(), continue_targets: Vec::new(),
    ret_slot: Operand::Constant { alignment: 1, data: vec![] },
    ret_block: BlockId(0), ret_ty: ret_ty.clone(), address_taken, string_counter: 0,
    extra: Vec::new(),
  };

  let ret_hint = fb.hint_for(&ret_ty);
  let (ret_size, _) = fb.layout_of(&ret_ty);
  fb.ret_slot = fb.target.return_operand(ret_size, ret_hint);
  fb.ret_block = fb.fresh_block();

  for (i, p) in params.iter().enumerate() {
    let pty = fb.bridge(&p.ty);
    let hint = if fb.address_taken.contains(&p.name) { AllocHint::Mem } else { fb.hint_for(&pty) };
    let storage = fb.fresh_temp(&pty, hint);
    let (psize, palign) = fb.layout_of(&pty);
    let slot = fb.target.param_operand(i, psize, palign, hint);
    fb.emit(Operator::Move, vec![storage.clone(), slot]);
    fb.locals.insert(p.name, storage);
  }

  for s in body { fb.lower_stmt(s); }
  let ret_block = fb.ret_block;
  fb.jump_to(ret_block);
  fb.start_block(ret_block);
  fb.finish_block(Instruction::new(Operator::Return, vec![]));

  let mut fragments = std::mem::take(&mut fb.extra);
  fragments.push(Fragment::Text { name: FragName::Global(mangle(modules.module_name(mid), name)), blocks: fb.blocks });
  fragments
}

/// Lowers every top-level declaration with a body into fragments, in
/// declaration order (§4.7). Declarations with no body (`FuncDecl`,
/// composite/typedef forms) produce nothing: their layout information
/// lives entirely in the symbol table.
#[tracing::instrument(skip_all)]
#[must_use] pub fn translate_module<M: Modules, T: Target>(
  mid: ModuleId, decls: &[TopLevel], modules: &M, target: &T, temp_gen: &mut dyn TempGen, options: &Options,
) -> Vec<Fragment> {
  let mut fragments = Vec::new();
  for decl in decls {
    match decl {
      TopLevel::VarDecl { name, ty, init, .. } => {
        let checked_ty = { let env = Environment::new(modules, mid); bridge_type(ty, &env, options, &mut Sink::new()) };
        fragments.push(translate_global(mid, *name, &checked_ty, init.as_ref(), modules, target.pointer_width()));
      }
      TopLevel::FuncDefn { name, ret, params, body, .. } =>
        fragments.extend(translate_function(mid, *name, ret, params, body, modules, target, temp_gen, options)),
      TopLevel::FuncDecl { .. } | TopLevel::StructDecl { .. } | TopLevel::UnionDecl { .. }
        | TopLevel::EnumDecl { .. } | TopLevel::Typedef { .. } => {}
    }
  }
  fragments
}

/// A counter-backed [`TempGen`] for callers that don't need anything
/// fancier than "the next unused small integer" (§5's only contract).
#[must_use] pub fn counting_temp_gen() -> impl TempGen {
  let next = RefCell::new(0u32);
  move || { let mut n = next.borrow_mut(); let v = *n; *n += 1; v }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::{FileKind, Module as AstModule};
  use crate::build_symtab::{Builder, Program};
  use crate::ir::validator::validate_blocked;
  use crate::span::FileSpan;
  use crate::symbol::intern;

  fn span() -> FileSpan { FileSpan { file: intern("t.t"), line: 1, col: 1 } }
  fn int_te() -> TypeExpr { TypeExpr::Keyword(Keyword::Int) }

  struct TestTarget;
  impl Target for TestTarget {
    fn pointer_width(&self) -> u32 { 8 }
    fn param_operand(&self, index: usize, size: u32, _alignment: u32, _hint: AllocHint) -> Operand {
      Operand::Reg { name: 100 + index as u32, size }
    }
    fn return_operand(&self, size: u32, _hint: AllocHint) -> Operand { Operand::Reg { name: 0, size } }
  }

  fn int_expr(n: i64) -> Expr { Expr { kind: ExprKind::IntLit(n), span: span(), ty: RefCell::new(Some(Type::keyword(Keyword::Int))) } }

  fn build(decls: Vec<TopLevel>) -> (Program, ModuleId) {
    let module = AstModule { name: intern("m"), kind: FileKind::Code, imports: vec![], decls };
    let options = Options::default();
    let mut sink = Sink::new();
    let program = Builder::new(std::slice::from_ref(&module), &options).build(&mut sink);
    assert!(!sink.has_errors());
    let mid = program.module_id_of(intern("m")).unwrap();
    (program, mid)
  }

  #[test]
  fn mangle_joins_module_and_name_with_a_double_colon() {
    let sym = mangle(intern("geometry"), intern("area"));
    assert_eq!(crate::symbol::resolve(sym), "geometry::area");
  }

  #[test]
  fn layout_of_bool_is_one_byte_despite_zero_rank() {
    let (program, _) = build(vec![]);
    assert_eq!(layout(&Type::keyword(Keyword::Bool), &program, 8), (1, 1));
    assert_eq!(layout(&Type::keyword(Keyword::Long), &program, 8), (8, 8));
  }

  #[test]
  fn a_global_with_a_literal_initializer_becomes_a_data_fragment() {
    let (program, mid) = build(vec![
      TopLevel::VarDecl { name: intern("count"), span: span(), ty: int_te(), init: Some(int_expr(5)) },
    ]);
    let frag = translate_global(mid, intern("count"), &Type::keyword(Keyword::Int),
      Some(&int_expr(5)), &program, 8);
    assert!(matches!(frag, Fragment::Data { .. }));
  }

  #[test]
  fn an_uninitialized_global_becomes_a_bss_fragment() {
    let (program, mid) = build(vec![
      TopLevel::VarDecl { name: intern("count"), span: span(), ty: int_te(), init: None },
    ]);
    let frag = translate_global(mid, intern("count"), &Type::keyword(Keyword::Int), None, &program, 8);
    assert!(matches!(frag, Fragment::Bss { size: 4, .. }));
  }

  #[test]
  fn a_function_that_returns_a_literal_lowers_to_valid_blocked_ir() {
    let (program, mid) = build(vec![TopLevel::FuncDefn {
      name: intern("one"), span: span(), ret: int_te(), params: vec![],
      body: vec![Stmt::Return(Some(int_expr(1)))],
    }]);
    let target = TestTarget;
    let mut temp_gen = counting_temp_gen();
    let fragments = translate_function(mid, intern("one"), &int_te(), &[],
      &[Stmt::Return(Some(int_expr(1)))], &program, &target, &mut temp_gen, &Options::default());
    assert_eq!(fragments.len(), 1);
    let Fragment::Text { blocks, name } = &fragments[0] else { panic!("expected a text fragment") };
    assert_eq!(*name, FragName::Global(mangle(intern("m"), intern("one"))));
    assert!(validate_blocked(blocks).is_ok());
    let last = blocks.last().unwrap();
    assert_eq!(last.instructions.last().unwrap().op, Operator::Return);
  }

  #[test]
  fn an_if_else_lowers_to_a_diamond_that_passes_validation() {
    let (program, mid) = build(vec![TopLevel::FuncDefn {
      name: intern("pick"), span: span(), ret: int_te(), params: vec![],
      body: vec![],
    }]);
    let body = vec![Stmt::If {
      cond: int_expr(1),
      then: Box::new(Stmt::Return(Some(int_expr(1)))),
      else_: Some(Box::new(Stmt::Return(Some(int_expr(0))))),
    }];
    let target = TestTarget;
    let mut temp_gen = counting_temp_gen();
    let fragments = translate_function(mid, intern("pick"), &int_te(), &[], &body,
      &program, &target, &mut temp_gen, &Options::default());
    let Fragment::Text { blocks, .. } = &fragments[0] else { panic!("expected a text fragment") };
    assert!(validate_blocked(blocks).is_ok());
    assert!(blocks.len() >= 4); // entry + then + else + join (+ ret)
  }
}
