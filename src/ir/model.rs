//! C6: the IR data model — fragments, datums, operands, instructions,
//! blocks — and the flat operator/arity/operand-constraint table §9's
//! "recursive IR operator family" design note asks for.
//!
//! Every variant, every arity, and every per-operand constraint below is
//! transliterated from `ir/ir.h`'s `IROperator` doc comments in
//! `original_source`; nothing here is invented.

use bitflags::bitflags;

use crate::symbol::Symbol;
use crate::types::BlockId;

/// Allocation-class hint for a temp (§3, §4.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AllocHint { Gp, Fp, Mem }

bitflags! {
  /// A set of allowed [`AllocHint`]s for one operand slot.
  #[derive(Clone, Copy, Debug, PartialEq, Eq)]
  pub struct AllocSet: u8 {
    const GP = 0b001;
    const FP = 0b010;
    const MEM = 0b100;
  }
}

impl AllocHint {
  #[must_use] pub fn as_set(self) -> AllocSet {
    match self { AllocHint::Gp => AllocSet::GP, AllocHint::Fp => AllocSet::FP, AllocHint::Mem => AllocSet::MEM }
  }
}

bitflags! {
  /// A set of allowed [`Operand`] kinds for one operand slot — `ir.h`'s
  /// `OperandKind` (`OK_TEMP`/`OK_REG`/`OK_CONSTANT`) as a bitset so one
  /// slot can permit more than one.
  #[derive(Clone, Copy, Debug, PartialEq, Eq)]
  pub struct KindSet: u8 {
    const REG = 0b001;
    const TEMP = 0b010;
    const CONST = 0b100;
  }
}

/// One element of a constant operand's or a data fragment's payload
/// (`ir.h`'s `IRDatum`). The datum module is "responsible for encoding"
/// per §6; this crate stops at this typed representation and leaves byte
/// order and layout-to-bytes to whatever emits the final object, which is
/// out of scope here.
#[derive(Clone, Debug)]
pub enum Datum {
  Byte(u8),
  Short(u16),
  Int(u32),
  Long(u64),
  Padding(usize),
  String(Vec<u8>),
  WString(Vec<u32>),
  Local(BlockId),
  Global(Symbol),
}

/// One operand of an instruction (§3 "IR operand").
#[derive(Clone, Debug)]
pub enum Operand {
  /// `alignment` is a power of two; `size > pointer width` forces
  /// `hint == Mem` (`ir.h`: "size > POINTER_WIDTH ==> kind == MEM").
  Temp { name: u32, alignment: u32, size: u32, hint: AllocHint },
  /// A target-specific physical register; usable anywhere a temp is.
  Reg { name: u32, size: u32 },
  /// `alignment` is a power of two; a constant is always `MEM`-class.
  Constant { alignment: u32, data: Vec<Datum> },
}

impl Operand {
  #[must_use] pub fn kind(&self) -> KindSet {
    match self {
      Operand::Temp { .. } => KindSet::TEMP,
      Operand::Reg { .. } => KindSet::REG,
      Operand::Constant { .. } => KindSet::CONST,
    }
  }

  #[must_use] pub fn alloc(&self) -> Option<AllocSet> {
    match self {
      Operand::Temp { hint, .. } => Some(hint.as_set()),
      Operand::Reg { .. } => None,
      Operand::Constant { .. } => Some(AllocSet::MEM),
    }
  }

  #[must_use] pub fn size(&self) -> Option<u32> {
    match self {
      Operand::Temp { size, .. } | Operand::Reg { size, .. } => Some(*size),
      Operand::Constant { .. } => None,
    }
  }

  fn single_datum(&self) -> Option<&Datum> {
    match self {
      Operand::Constant { data, .. } if data.len() == 1 => data.first(),
      _ => None,
    }
  }

  /// A constant holding exactly one local-label datum (`localOperandCreate`).
  #[must_use] pub fn is_local(&self) -> bool { matches!(self.single_datum(), Some(Datum::Local(_))) }
  /// A constant holding exactly one global-label datum (`globalOperandCreate`).
  #[must_use] pub fn is_global(&self) -> bool { matches!(self.single_datum(), Some(Datum::Global(_))) }
  /// Either of the above — `ir.h`'s `irOperandIsLabel`.
  #[must_use] pub fn is_label(&self) -> bool { self.is_local() || self.is_global() }
}

/// The ~80-member flat operator family of §4.6, partitioned exactly as
/// `ir.h` groups them (move/memory, integer arithmetic, floating
/// arithmetic, bitwise, comparisons, unary predicates, conversions,
/// control flow, miscellaneous).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum Operator {
  Label, Volatile, Uninitialized, AddrOf, Nop,
  Move, MemStore, MemLoad, StkStore, StkLoad, OffsetStore, OffsetLoad,
  Add, Sub, SMul, UMul, SDiv, UDiv, SMod, UMod,
  FAdd, FSub, FMul, FDiv, FMod,
  Neg, FNeg,
  Sll, Slr, Sar, And, Xor, Or, Not,
  L, Le, E, Ne, G, Ge, A, Ae, B, Be,
  FL, FLe, FE, FNe, FG, FGe,
  Z, Nz, LNot,
  Sx, Zx, Trunc, U2F, S2F, FResize, F2I,
  Jump, JumpTable,
  J2L, J2Le, J2E, J2Ne, J2G, J2Ge, J2A, J2Ae, J2B, J2Be,
  J2FL, J2FLe, J2FE, J2FNe, J2FG, J2FGe,
  J2Z, J2Nz,
  J1L, J1Le, J1E, J1Ne, J1G, J1Ge, J1A, J1Ae, J1B, J1Be,
  J1FL, J1FLe, J1FE, J1FNe, J1FG, J1FGe,
  J1Z, J1Nz,
  Call, Return,
  /// Not part of `ir.h`'s operator list: an opaque escape hatch for inline
  /// `asm` statements (§4.7), carrying the assembly text as its one
  /// constant operand. The backend treats it as a black box; C8 only
  /// checks its shape, never its contents.
  Asm,
}

/// Fixed arity per operator (§9: "pair it with a compile-time arity ...
/// table").
#[must_use] pub const fn arity(op: Operator) -> usize {
  use Operator::*;
  match op {
    Nop | Return => 0,
    Label | Volatile | Uninitialized | Jump | Call | Asm => 1,
    AddrOf | Move | StkStore | StkLoad | Neg | FNeg | Not | Z | Nz | LNot
      | Sx | Zx | Trunc | U2F | S2F | FResize | F2I | JumpTable
      | J1Z | J1Nz => 2,
    MemStore | MemLoad | OffsetStore | OffsetLoad
      | Add | Sub | SMul | UMul | SDiv | UDiv | SMod | UMod
      | FAdd | FSub | FMul | FDiv | FMod
      | Sll | Slr | Sar | And | Xor | Or
      | L | Le | E | Ne | G | Ge | A | Ae | B | Be
      | FL | FLe | FE | FNe | FG | FGe
      | J2Z | J2Nz
      | J1L | J1Le | J1E | J1Ne | J1G | J1Ge | J1A | J1Ae | J1B | J1Be
      | J1FL | J1FLe | J1FE | J1FNe | J1FG | J1FGe => 3,
    J2L | J2Le | J2E | J2Ne | J2G | J2Ge | J2A | J2Ae | J2B | J2Be
      | J2FL | J2FLe | J2FE | J2FNe | J2FG | J2FGe => 4,
  }
}

/// Is this operator a block terminator (§4.8's blocked-IR check)?
#[must_use] pub fn is_terminator(op: Operator) -> bool {
  use Operator::*;
  matches!(op, Jump | JumpTable | Return
    | J2L | J2Le | J2E | J2Ne | J2G | J2Ge | J2A | J2Ae | J2B | J2Be
    | J2FL | J2FLe | J2FE | J2FNe | J2FG | J2FGe | J2Z | J2Nz)
}

/// Is this a two-target conditional jump (`J2…`, illegal once scheduled)?
#[must_use] pub fn is_two_target_jump(op: Operator) -> bool {
  use Operator::*;
  matches!(op, J2L | J2Le | J2E | J2Ne | J2G | J2Ge | J2A | J2Ae | J2B | J2Be
    | J2FL | J2FLe | J2FE | J2FNe | J2FG | J2FGe | J2Z | J2Nz)
}

/// Is this a one-target conditional jump (`J1…`, illegal while blocked)?
#[must_use] pub fn is_one_target_jump(op: Operator) -> bool {
  use Operator::*;
  matches!(op, J1L | J1Le | J1E | J1Ne | J1G | J1Ge | J1A | J1Ae | J1B | J1Be
    | J1FL | J1FLe | J1FE | J1FNe | J1FG | J1FGe | J1Z | J1Nz)
}

/// Whether operand `i` is written (as opposed to read) by `op`, per
/// `ir.h`'s per-operator doc comments. Used by C8 to check temp-consistency
/// independent of read/write role.
#[must_use] pub fn writes(op: Operator, i: usize) -> bool {
  use Operator::*;
  match (op, i) {
    (Uninitialized, 0) | (AddrOf, 0) | (Move, 0) => true,
    (MemLoad, 0) | (StkLoad, 0) | (OffsetLoad, 0) => true,
    (OffsetStore, 0) => true,
    (Add | Sub | SMul | UMul | SDiv | UDiv | SMod | UMod, 0) => true,
    (FAdd | FSub | FMul | FDiv | FMod, 0) => true,
    (Neg | FNeg, 0) => true,
    (Sll | Slr | Sar | And | Xor | Or | Not, 0) => true,
    (L | Le | E | Ne | G | Ge | A | Ae | B | Be, 0) => true,
    (FL | FLe | FE | FNe | FG | FGe, 0) => true,
    (Z | Nz | LNot, 0) => true,
    (Sx | Zx | Trunc | U2F | S2F | FResize | F2I, 0) => true,
    _ => false,
  }
}

/// How an operand's size is constrained relative to its siblings
/// (`ir.h`'s inline `sizeof(i) == sizeof(j)` notes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeClass {
  Any,
  Byte,
  Pointer,
  /// Must equal operand `usize`'s size.
  SameAs(usize),
}

/// The kind-set, allocation-class, and size requirement for operand slot
/// `i` of `op` — `ir.h`'s per-operator doc comments as data, realizing §9's
/// "compile-time arity and operand-kind table" note. `None` allocation
/// means the slot carries no allocation-class constraint (registers and
/// label/global constants aren't temps).
#[must_use] pub fn operand_constraint(op: Operator, i: usize) -> (KindSet, Option<AllocSet>, SizeClass) {
  use Operator::*;
  const GP_MEM: AllocSet = AllocSet::GP.union(AllocSet::MEM);
  const FP_MEM: AllocSet = AllocSet::FP.union(AllocSet::MEM);
  const RT: KindSet = KindSet::REG.union(KindSet::TEMP);
  const RTC: KindSet = RT.union(KindSet::CONST);
  match (op, i) {
    (Label, 0) => (KindSet::CONST, None, SizeClass::Any),
    (Volatile, 0) => (KindSet::TEMP, None, SizeClass::Any),
    (Uninitialized, 0) => (KindSet::TEMP, None, SizeClass::Any),
    (AddrOf, 0) => (RT, Some(GP_MEM), SizeClass::Pointer),
    (AddrOf, 1) => (KindSet::TEMP, Some(AllocSet::MEM), SizeClass::Any),

    (Move, 0) => (RT, None, SizeClass::Any),
    (Move, 1) => (RTC, None, SizeClass::SameAs(0)),

    (MemStore, 0 | 2) => (RTC, Some(GP_MEM), SizeClass::Pointer),
    (MemStore, 1) => (RTC, None, SizeClass::Any),
    (MemLoad, 0) => (RT, None, SizeClass::Any),
    (MemLoad, 1 | 2) => (RTC, Some(GP_MEM), SizeClass::Pointer),

    (StkStore, 0) => (RTC, Some(GP_MEM), SizeClass::Pointer),
    (StkStore, 1) => (RTC, None, SizeClass::Any),
    (StkLoad, 0) => (RT, None, SizeClass::Any),
    (StkLoad, 1) => (RTC, Some(GP_MEM), SizeClass::Pointer),

    (OffsetStore, 0) => (KindSet::TEMP, Some(AllocSet::MEM), SizeClass::Any),
    (OffsetStore, 1) => (RTC, None, SizeClass::Any),
    (OffsetStore, 2) => (RTC, Some(GP_MEM), SizeClass::Pointer),
    (OffsetLoad, 0) => (RT, None, SizeClass::Any),
    (OffsetLoad, 1) => (KindSet::TEMP, Some(AllocSet::MEM), SizeClass::Any),
    (OffsetLoad, 2) => (RTC, Some(GP_MEM), SizeClass::Pointer),

    (Add | Sub | SMul | UMul | SDiv | UDiv | SMod | UMod | And | Xor | Or, 0) =>
      (RT, Some(GP_MEM), SizeClass::Any),
    (Add | Sub | SMul | UMul | SDiv | UDiv | SMod | UMod | And | Xor | Or, 1 | 2) =>
      (RTC, Some(GP_MEM), SizeClass::SameAs(0)),

    (FAdd | FSub | FMul | FDiv | FMod, 0) => (RT, Some(FP_MEM), SizeClass::Any),
    (FAdd | FSub | FMul | FDiv | FMod, 1 | 2) => (RTC, Some(FP_MEM), SizeClass::SameAs(0)),

    (Neg | Not, 0) => (RT, Some(GP_MEM), SizeClass::Any),
    (Neg | Not, 1) => (RTC, Some(GP_MEM), SizeClass::SameAs(0)),
    (FNeg, 0) => (RT, Some(FP_MEM), SizeClass::Any),
    (FNeg, 1) => (RTC, Some(FP_MEM), SizeClass::SameAs(0)),

    (Sll | Slr | Sar, 0) => (RT, Some(GP_MEM), SizeClass::Any),
    (Sll | Slr | Sar, 1) => (RTC, Some(GP_MEM), SizeClass::SameAs(0)),
    (Sll | Slr | Sar, 2) => (RTC, Some(GP_MEM), SizeClass::Byte),

    (L | Le | E | Ne | G | Ge | A | Ae | B | Be, 0) => (RT, Some(GP_MEM), SizeClass::Byte),
    (L | Le | E | Ne | G | Ge | A | Ae | B | Be, 1 | 2) => (RTC, Some(GP_MEM), SizeClass::SameAs(1)),
    (FL | FLe | FE | FNe | FG | FGe, 0) => (RT, Some(GP_MEM), SizeClass::Byte),
    (FL | FLe | FE | FNe | FG | FGe, 1 | 2) => (RTC, Some(FP_MEM), SizeClass::SameAs(1)),

    (Z | Nz, 0) => (RT, None, SizeClass::Byte),
    (Z | Nz, 1) => (RTC, None, SizeClass::Any),
    (LNot, 0) => (RT, Some(GP_MEM), SizeClass::Byte),
    (LNot, 1) => (RTC, Some(GP_MEM), SizeClass::Byte),

    (Sx | Zx | Trunc, 0) => (RT, Some(GP_MEM), SizeClass::Any),
    (Sx | Zx | Trunc, 1) => (RTC, Some(GP_MEM), SizeClass::Any),
    (U2F | S2F, 0) => (RT, Some(FP_MEM), SizeClass::Any),
    (U2F | S2F, 1) => (RTC, Some(GP_MEM), SizeClass::Any),
    (FResize, 0) => (RT, Some(FP_MEM), SizeClass::Any),
    (FResize, 1) => (RTC, Some(GP_MEM), SizeClass::Any),
    (F2I, 0) => (RT, Some(GP_MEM), SizeClass::Any),
    (F2I, 1) => (RTC, Some(FP_MEM), SizeClass::Any),

    (Jump, 0) => (KindSet::CONST, None, SizeClass::Any),
    (JumpTable, 0) => (KindSet::TEMP, Some(GP_MEM), SizeClass::Pointer),
    (JumpTable, 1) => (KindSet::CONST, None, SizeClass::Any),

    (J2L | J2Le | J2E | J2Ne | J2G | J2Ge | J2A | J2Ae | J2B | J2Be, 0 | 1) =>
      (KindSet::CONST, None, SizeClass::Any),
    (J2L | J2Le | J2E | J2Ne | J2G | J2Ge | J2A | J2Ae | J2B | J2Be, 2 | 3) =>
      (RTC, Some(GP_MEM), SizeClass::SameAs(2)),
    (J2FL | J2FLe | J2FE | J2FNe | J2FG | J2FGe, 0 | 1) => (KindSet::CONST, None, SizeClass::Any),
    (J2FL | J2FLe | J2FE | J2FNe | J2FG | J2FGe, 2 | 3) => (RTC, Some(FP_MEM), SizeClass::SameAs(2)),
    (J2Z | J2Nz, 0 | 1) => (KindSet::CONST, None, SizeClass::Any),
    (J2Z | J2Nz, 2) => (RTC, None, SizeClass::Any),

    (J1L | J1Le | J1E | J1Ne | J1G | J1Ge | J1A | J1Ae | J1B | J1Be, 0) =>
      (KindSet::CONST, None, SizeClass::Any),
    (J1L | J1Le | J1E | J1Ne | J1G | J1Ge | J1A | J1Ae | J1B | J1Be, 1 | 2) =>
      (RTC, Some(GP_MEM), SizeClass::SameAs(1)),
    (J1FL | J1FLe | J1FE | J1FNe | J1FG | J1FGe, 0) => (KindSet::CONST, None, SizeClass::Any),
    (J1FL | J1FLe | J1FE | J1FNe | J1FG | J1FGe, 1 | 2) => (RTC, Some(FP_MEM), SizeClass::SameAs(1)),
    (J1Z | J1Nz, 0) => (KindSet::CONST, None, SizeClass::Any),
    (J1Z | J1Nz, 1) => (RTC, None, SizeClass::Any),

    (Call, 0) => (RTC, Some(GP_MEM), SizeClass::Pointer),
    (Asm, 0) => (KindSet::CONST, None, SizeClass::Any),

    _ => (RTC, None, SizeClass::Any),
  }
}

/// One instruction: an operator plus its fixed-arity operand list (§3
/// "IR instruction"). Observed max arity is 4 (`J2…`), so four inline
/// slots never spill.
#[derive(Clone, Debug)]
pub struct Instruction {
  pub op: Operator,
  pub operands: arrayvec::ArrayVec<Operand, 4>,
}

impl Instruction {
  #[must_use] pub fn new(op: Operator, operands: Vec<Operand>) -> Self {
    Self { op, operands: operands.into_iter().collect() }
  }
}

/// A label plus its straight-line instruction list (§3 "IR block").
#[derive(Clone, Debug)]
pub struct Block {
  pub label: BlockId,
  pub instructions: Vec<Instruction>,
}

/// The section a fragment belongs to (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionKind { Bss, Rodata, Data, Text }

/// A fragment's name: module-qualified global (mangled per §6) or a
/// numeric local label.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FragName { Global(Symbol), Local(u32) }

/// A unit of emitted output (§3 "IR fragment").
#[derive(Clone, Debug)]
pub enum Fragment {
  Bss { name: FragName, alignment: u32, size: u64 },
  Rodata { name: FragName, alignment: u32, data: Vec<Datum> },
  Data { name: FragName, alignment: u32, data: Vec<Datum> },
  Text { name: FragName, blocks: Vec<Block> },
}

impl Fragment {
  #[must_use] pub fn section(&self) -> SectionKind {
    match self {
      Fragment::Bss { .. } => SectionKind::Bss,
      Fragment::Rodata { .. } => SectionKind::Rodata,
      Fragment::Data { .. } => SectionKind::Data,
      Fragment::Text { .. } => SectionKind::Text,
    }
  }

  #[must_use] pub fn name(&self) -> FragName {
    match self {
      Fragment::Bss { name, .. } | Fragment::Rodata { name, .. }
        | Fragment::Data { name, .. } | Fragment::Text { name, .. } => *name,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn arity_matches_documented_operand_counts() {
    assert_eq!(arity(Operator::Return), 0);
    assert_eq!(arity(Operator::Jump), 1);
    assert_eq!(arity(Operator::Move), 2);
    assert_eq!(arity(Operator::Add), 3);
    assert_eq!(arity(Operator::J2L), 4);
  }

  #[test]
  fn two_target_jumps_are_terminators_but_not_one_target_jumps() {
    assert!(is_terminator(Operator::J2E));
    assert!(is_two_target_jump(Operator::J2E));
    assert!(!is_one_target_jump(Operator::J2E));
    assert!(is_one_target_jump(Operator::J1E));
    assert!(!is_terminator(Operator::J1E));
  }

  #[test]
  fn local_operand_is_a_label_but_not_global() {
    let op = Operand::Constant { alignment: 1, data: vec![Datum::Local(BlockId(0))] };
    assert!(op.is_local());
    assert!(op.is_label());
    assert!(!op.is_global());
  }
}
