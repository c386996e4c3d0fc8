//! C8: structural validation of IR at the "blocked" and "scheduled"
//! phases, mirroring `validateBlockedIr`/`validateScheduledIr` from
//! `ir/ir.h` exactly — same shared checks (temp consistency, per-operand
//! kind/allocation/size constraints), with the documented differences for
//! each phase.

use std::collections::HashMap;

use crate::diag::CoreError;
use crate::ir::model::{arity, is_one_target_jump, is_terminator, is_two_target_jump,
  operand_constraint, AllocHint, Block, Instruction, Operator, SizeClass};

#[derive(Default)]
struct TempTable(HashMap<u32, (u32, u32, AllocHint)>);

impl TempTable {
  fn check(&mut self, phase: &'static str, name: u32, alignment: u32, size: u32, hint: AllocHint) -> Result<(), CoreError> {
    match self.0.get(&name) {
      None => { self.0.insert(name, (alignment, size, hint)); Ok(()) }
      Some(&(a, s, h)) if a == alignment && s == size && h == hint => Ok(()),
      Some(_) => Err(CoreError::IrInvariant {
        phase,
        message: format!("temp {name} has inconsistent size/alignment/allocation across occurrences"),
      }),
    }
  }
}

fn check_operands(phase: &'static str, inst: &Instruction, temps: &mut TempTable) -> Result<(), CoreError> {
  if inst.operands.len() != arity(inst.op) {
    return Err(CoreError::IrInvariant {
      phase, message: format!("{:?} expects {} operands, found {}", inst.op, arity(inst.op), inst.operands.len()),
    });
  }

  for (i, operand) in inst.operands.iter().enumerate() {
    if let crate::ir::model::Operand::Temp { name, alignment, size, hint } = operand {
      temps.check(phase, *name, *alignment, *size, *hint)?;
    }

    let (kinds, alloc, size_class) = operand_constraint(inst.op, i);
    if !kinds.contains(operand.kind()) {
      return Err(CoreError::IrInvariant {
        phase, message: format!("{:?} operand {i} has an invalid operand kind", inst.op),
      });
    }
    if let Some(required) = alloc {
      match operand.alloc() {
        Some(actual) if required.intersects(actual) => {}
        _ => return Err(CoreError::IrInvariant {
          phase, message: format!("{:?} operand {i} has an invalid allocation class", inst.op),
        }),
      }
    }
    match size_class {
      SizeClass::Any => {}
      SizeClass::Byte => if operand.size().is_some_and(|s| s != 1) {
        return Err(CoreError::IrInvariant { phase, message: format!("{:?} operand {i} must be one byte wide", inst.op) });
      }
      SizeClass::Pointer => {} // pointer width is target-defined; left to the backend
      SizeClass::SameAs(j) => {
        if let (Some(a), Some(b)) = (operand.size(), inst.operands[j].size()) {
          if a != b {
            return Err(CoreError::IrInvariant {
              phase, message: format!("{:?} operand {i} must match the size of operand {j}", inst.op),
            });
          }
        }
      }
    }
  }
  Ok(())
}

/// Blocked IR: after translation, before scheduling (§4.8).
#[tracing::instrument(skip_all)]
pub fn validate_blocked(blocks: &[Block]) -> Result<(), CoreError> {
  const PHASE: &str = "blocked";
  let mut temps = TempTable::default();
  for block in blocks {
    if block.instructions.is_empty() {
      return Err(CoreError::IrInvariant { phase: PHASE, message: "block has no terminator".into() });
    }
    let last = block.instructions.len() - 1;
    for (idx, inst) in block.instructions.iter().enumerate() {
      if inst.op == Operator::Label {
        return Err(CoreError::IrInvariant { phase: PHASE, message: "stray LABEL operation in blocked IR".into() });
      }
      if is_one_target_jump(inst.op) {
        return Err(CoreError::IrInvariant { phase: PHASE, message: "one-target conditional jump in blocked IR".into() });
      }
      let terminal = is_terminator(inst.op);
      if idx == last && !terminal {
        return Err(CoreError::IrInvariant { phase: PHASE, message: "block does not end in a terminator".into() });
      }
      if idx != last && terminal {
        return Err(CoreError::IrInvariant { phase: PHASE, message: "terminator before the end of a block".into() });
      }
      check_operands(PHASE, inst, &mut temps)?;
    }
  }
  Ok(())
}

/// Scheduled IR: after block flattening (§4.8). Differs from blocked:
/// nonterminal jumps/returns are fine anywhere, two-target jumps are
/// forbidden (lowered to `J1…` + fall-through), explicit `LABEL`s are
/// allowed, `NOP`s are not.
#[tracing::instrument(skip_all)]
pub fn validate_scheduled(instructions: &[Instruction]) -> Result<(), CoreError> {
  const PHASE: &str = "scheduled";
  let mut temps = TempTable::default();
  for inst in instructions {
    if is_two_target_jump(inst.op) {
      return Err(CoreError::IrInvariant { phase: PHASE, message: "two-target conditional jump in scheduled IR".into() });
    }
    if inst.op == Operator::Nop {
      return Err(CoreError::IrInvariant { phase: PHASE, message: "NOP in scheduled IR".into() });
    }
    check_operands(PHASE, inst, &mut temps)?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ir::model::{AllocHint, Block, Datum, Instruction, Operand};
  use crate::types::BlockId;

  fn temp(name: u32) -> Operand { Operand::Temp { name, alignment: 4, size: 4, hint: AllocHint::Gp } }
  fn local(b: u32) -> Operand { Operand::Constant { alignment: 1, data: vec![Datum::Local(BlockId(b))] } }

  #[test]
  fn a_block_ending_in_a_two_target_jump_passes_blocked_validation() {
    // J2… is the blocked-phase conditional terminator; scheduling later
    // rewrites it to J1… plus an explicit fall-through label.
    let block = Block {
      label: BlockId(0),
      instructions: vec![Instruction::new(Operator::J2E, vec![local(1), local(2), temp(0), temp(1)])],
    };
    assert!(validate_blocked(&[block]).is_ok());
  }

  #[test]
  fn a_block_ending_in_a_one_target_jump_fails_blocked_validation() {
    let block = Block {
      label: BlockId(0),
      instructions: vec![Instruction::new(Operator::J1E, vec![local(1), temp(0), temp(1)])],
    };
    assert!(validate_blocked(&[block]).is_err());
  }

  #[test]
  fn the_same_fragment_scheduled_as_j1_and_fallthrough_passes() {
    let stream = vec![
      Instruction::new(Operator::J1E, vec![local(1), temp(0), temp(1)]),
      Instruction::new(Operator::Label, vec![local(2)]),
      Instruction::new(Operator::Return, vec![]),
    ];
    assert!(validate_scheduled(&stream).is_ok());
  }

  #[test]
  fn inconsistent_temp_properties_are_rejected() {
    let bad_temp = Operand::Temp { name: 0, alignment: 8, size: 8, hint: AllocHint::Gp };
    let block = Block {
      label: BlockId(0),
      instructions: vec![
        Instruction::new(Operator::Move, vec![temp(0), Operand::Constant { alignment: 4, data: vec![Datum::Int(1)] }]),
        Instruction::new(Operator::Move, vec![bad_temp, Operand::Constant { alignment: 4, data: vec![Datum::Int(1)] }]),
        Instruction::new(Operator::Return, vec![]),
      ],
    };
    assert!(validate_blocked(&[block]).is_err());
  }

  #[test]
  fn a_block_with_a_stray_label_instruction_fails_blocked_validation() {
    let block = Block {
      label: BlockId(0),
      instructions: vec![
        Instruction::new(Operator::Label, vec![local(1)]),
        Instruction::new(Operator::Return, vec![]),
      ],
    };
    assert!(validate_blocked(&[block]).is_err());
  }
}
