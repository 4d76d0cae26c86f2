//! Terminators: the only place control flow happens.

use std::fmt;

use super::function::BlockId;
use super::place::Place;
use super::statement::Operand;

/// Closes a basic block. Calls carry an optional `unwind` edge for
/// exception propagation; the current lowering never populates it and
/// rejects `try`/`throw`/`catch` instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Goto {
        target: BlockId,
    },
    If {
        cond: Operand,
        then_block: BlockId,
        else_block: BlockId,
    },
    Switch {
        discr: Operand,
        targets: Vec<(i128, BlockId)>,
        otherwise: BlockId,
    },
    Call {
        /// Mangled symbol of the static target.
        callee: String,
        args: Vec<Operand>,
        destination: Place,
        /// Continuation on normal return; `None` if the call never
        /// returns.
        target: Option<BlockId>,
        unwind: Option<BlockId>,
    },
    /// Dynamic dispatch through the receiver's vtable.
    VirtualCall {
        /// The object pointer (already pointing at the subobject whose
        /// static type declared the method's interface).
        receiver: Operand,
        /// Slot index within the interface's vtable group.
        slot: usize,
        /// Static call-site adjustment: byte offset from the
        /// receiver's static type to the interface subobject.
        adjustor: u64,
        args: Vec<Operand>,
        destination: Place,
        target: Option<BlockId>,
        unwind: Option<BlockId>,
    },
    Return,
    Unreachable,
}

impl Terminator {
    /// Every block this terminator can branch to.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Goto { target } => vec![*target],
            Terminator::If { then_block, else_block, .. } => vec![*then_block, *else_block],
            Terminator::Switch { targets, otherwise, .. } => {
                let mut out: Vec<BlockId> = targets.iter().map(|(_, b)| *b).collect();
                out.push(*otherwise);
                out
            }
            Terminator::Call { target, unwind, .. }
            | Terminator::VirtualCall { target, unwind, .. } => {
                target.iter().chain(unwind.iter()).copied().collect()
            }
            Terminator::Return | Terminator::Unreachable => Vec::new(),
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Goto { target } => write!(f, "goto -> bb{target};"),
            Terminator::If { cond, then_block, else_block } => {
                write!(f, "if {cond} -> [true: bb{then_block}, false: bb{else_block}];")
            }
            Terminator::Switch { discr, targets, otherwise } => {
                write!(f, "switch {discr} -> [")?;
                for (value, block) in targets {
                    write!(f, "{value}: bb{block}, ")?;
                }
                write!(f, "otherwise: bb{otherwise}];")
            }
            Terminator::Call { callee, args, destination, target, .. } => {
                write!(f, "{destination} = {callee}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                match target {
                    Some(t) => write!(f, ") -> bb{t};"),
                    None => write!(f, ") -> !;"),
                }
            }
            Terminator::VirtualCall { receiver, slot, adjustor, args, destination, target, .. } => {
                write!(f, "{destination} = virtual[slot {slot}, adj {adjustor}]({receiver}")?;
                for arg in args {
                    write!(f, ", {arg}")?;
                }
                match target {
                    Some(t) => write!(f, ") -> bb{t};"),
                    None => write!(f, ") -> !;"),
                }
            }
            Terminator::Return => write!(f, "return;"),
            Terminator::Unreachable => write!(f, "unreachable;"),
        }
    }
}
