//! CFG well-formedness checks.
//!
//! Validates the invariants every consumer may rely on: each block ends
//! in exactly one terminator (by construction), every terminator
//! successor is a valid block id, and every place's root local is
//! declared in the owning function.

use thiserror::Error;

use super::function::MirFunction;
use super::place::{Place, ProjectionElem};
use super::statement::{Operand, Rvalue, Statement};
use super::terminator::Terminator;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("function `{0}` has no blocks")]
    Empty(String),

    #[error("block bb{block} of `{func}` branches to invalid block bb{target}")]
    BadSuccessor { func: String, block: usize, target: u32 },

    #[error("block bb{block} of `{func}` references undeclared local _{local}")]
    BadLocal { func: String, block: usize, local: u32 },
}

/// Validate one function; used by tests and debug assertions.
pub fn validate_function(func: &MirFunction) -> Result<(), ValidationError> {
    if func.blocks.is_empty() {
        return Err(ValidationError::Empty(func.symbol.clone()));
    }
    let n_blocks = func.blocks.len() as u32;
    let n_locals = func.locals.len() as u32;

    for (index, block) in func.blocks.iter().enumerate() {
        for target in block.terminator.successors() {
            if target >= n_blocks {
                return Err(ValidationError::BadSuccessor {
                    func: func.symbol.clone(),
                    block: index,
                    target,
                });
            }
        }
        let check_local = |local: u32| -> Result<(), ValidationError> {
            if local >= n_locals {
                Err(ValidationError::BadLocal { func: func.symbol.clone(), block: index, local })
            } else {
                Ok(())
            }
        };
        let check_place = |place: &Place| -> Result<(), ValidationError> {
            check_local(place.local)?;
            for proj in &place.projection {
                if let ProjectionElem::Index { local, .. } = proj {
                    check_local(*local)?;
                }
            }
            Ok(())
        };
        let check_operand = |op: &Operand| -> Result<(), ValidationError> {
            match op {
                Operand::Copy(place) | Operand::Move(place) => check_place(place),
                Operand::Constant(_) => Ok(()),
            }
        };

        for stmt in &block.statements {
            match stmt {
                Statement::Assign { place, rvalue } => {
                    check_place(place)?;
                    match rvalue {
                        Rvalue::Use(op) => check_operand(op)?,
                        Rvalue::BinaryOp { lhs, rhs, .. } => {
                            check_operand(lhs)?;
                            check_operand(rhs)?;
                        }
                        Rvalue::UnaryOp { operand, .. } => check_operand(operand)?,
                        Rvalue::Ref { place, .. } | Rvalue::AddressOf(place) => check_place(place)?,
                        Rvalue::Cast { operand, .. } => check_operand(operand)?,
                        Rvalue::Aggregate { operands, .. } => {
                            for op in operands {
                                check_operand(op)?;
                            }
                        }
                    }
                }
                Statement::StorageLive(local) | Statement::StorageDead(local) => {
                    check_local(*local)?;
                }
                Statement::Nop => {}
            }
        }

        match &block.terminator {
            Terminator::If { cond, .. } => check_operand(cond)?,
            Terminator::Switch { discr, .. } => check_operand(discr)?,
            Terminator::Call { args, destination, .. } => {
                check_place(destination)?;
                for arg in args {
                    check_operand(arg)?;
                }
            }
            Terminator::VirtualCall { receiver, args, destination, .. } => {
                check_operand(receiver)?;
                check_place(destination)?;
                for arg in args {
                    check_operand(arg)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}
