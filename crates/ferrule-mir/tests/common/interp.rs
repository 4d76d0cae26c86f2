//! A minimal MIR interpreter.
//!
//! Enough machinery to execute the test corpus: flat byte memory,
//! 8-byte scalar slots, one fixed-size slot per local so class-typed
//! locals have real storage for field projections, and vtable pointers
//! stored as encoded `(blob, group)` handles resolved against the
//! unit's emitted vtable blobs. `DowncastBase` only ever carries
//! context-independent non-virtual offsets; virtual-base navigation
//! arrives as ordinary loads of the offset cells the constructors
//! embedded, so no interpreter-side layout knowledge is needed.
//! Floating point is out of scope; the executable scenarios are
//! integral.

use std::collections::HashMap;

use ferrule_mir::{
    BinOp, BlobEntry, Constant, LoweredUnit, MirFunction, Operand, Place, ProjectionElem, Rvalue,
    Statement, Terminator, UnOp,
};

/// Bytes reserved per local; large enough for every fixture class.
const SLOT: usize = 128;

pub struct Machine<'a> {
    unit: &'a LoweredUnit,
    functions: HashMap<&'a str, &'a MirFunction>,
    /// class decl index -> vtable blob index.
    blob_of_class: HashMap<u32, usize>,
    mem: Vec<u8>,
}

struct Frame {
    base: usize,
}

impl Frame {
    fn local_addr(&self, local: u32) -> usize {
        self.base + local as usize * SLOT
    }
}

impl<'a> Machine<'a> {
    pub fn new(unit: &'a LoweredUnit) -> Self {
        let functions = unit
            .functions
            .iter()
            .map(|f| (f.symbol.as_str(), f))
            .collect();
        let blob_of_class = unit
            .vtables
            .iter()
            .enumerate()
            .map(|(i, blob)| (blob.class.0, i))
            .collect();
        Machine {
            unit,
            functions,
            blob_of_class,
            // Address 0 stays unused so null pointers fault loudly.
            mem: vec![0; 64],
        }
    }

    pub fn call_by_name(&mut self, name: &str, args: &[i64]) -> i64 {
        let func = self
            .unit
            .functions
            .iter()
            .find(|f| f.name == name)
            .unwrap_or_else(|| panic!("no function named `{name}`"));
        self.call(func, args).unwrap_or(0)
    }

    pub fn call_by_symbol(&mut self, symbol: &str, args: &[i64]) -> Option<i64> {
        let func = *self
            .functions
            .get(symbol)
            .unwrap_or_else(|| panic!("no function with symbol `{symbol}`"));
        self.call(func, args)
    }

    fn call(&mut self, func: &'a MirFunction, args: &[i64]) -> Option<i64> {
        assert_eq!(
            args.len(),
            func.arg_count,
            "arity mismatch calling {}",
            func.symbol
        );
        let base = self.mem.len();
        self.mem.resize(base + func.locals.len().max(1) * SLOT, 0);
        let frame = Frame { base };
        for (i, &arg) in args.iter().enumerate() {
            self.write8(frame.local_addr(i as u32), arg);
        }

        let mut block = 0u32;
        loop {
            let bb = &func.blocks[block as usize];
            for stmt in &bb.statements {
                self.step(&frame, stmt);
            }
            match &bb.terminator {
                Terminator::Goto { target } => block = *target,
                Terminator::If { cond, then_block, else_block } => {
                    block = if self.operand(&frame, cond) != 0 {
                        *then_block
                    } else {
                        *else_block
                    };
                }
                Terminator::Switch { discr, targets, otherwise } => {
                    let v = self.operand(&frame, discr) as i128;
                    block = targets
                        .iter()
                        .find(|(case, _)| *case == v)
                        .map(|(_, b)| *b)
                        .unwrap_or(*otherwise);
                }
                Terminator::Call { callee, args, destination, target, .. } => {
                    let arg_vals: Vec<i64> =
                        args.iter().map(|a| self.operand(&frame, a)).collect();
                    let result = self.call_by_symbol_checked(callee, &arg_vals);
                    if let Some(v) = result {
                        let addr = self.place_addr(&frame, destination);
                        self.write8(addr, v);
                    }
                    match target {
                        Some(t) => block = *t,
                        None => return None,
                    }
                }
                Terminator::VirtualCall {
                    receiver,
                    slot,
                    adjustor,
                    args,
                    destination,
                    target,
                    ..
                } => {
                    let recv = self.operand(&frame, receiver);
                    let iface = recv + *adjustor as i64;
                    let vptr = self.read8(iface as usize);
                    let (blob_idx, group_idx) = decode_vptr(vptr);
                    let group = &self.unit.vtables[blob_idx].groups[group_idx];
                    let entry = &group.entries[*slot];
                    let (symbol, entry_adj) = match entry {
                        BlobEntry::Fn { symbol, adjustor } => (symbol.clone(), *adjustor),
                        BlobEntry::Pure => panic!("pure virtual call"),
                        BlobEntry::Rtti { .. } => panic!("dispatch through the RTTI slot"),
                    };
                    let this = iface - entry_adj as i64;
                    let mut arg_vals = vec![this];
                    for a in args {
                        arg_vals.push(self.operand(&frame, a));
                    }
                    let result = self.call_by_symbol_checked(&symbol, &arg_vals);
                    if let Some(v) = result {
                        let addr = self.place_addr(&frame, destination);
                        self.write8(addr, v);
                    }
                    match target {
                        Some(t) => block = *t,
                        None => return None,
                    }
                }
                Terminator::Return => {
                    return func.ret_local.map(|l| self.read8(frame.local_addr(l)));
                }
                Terminator::Unreachable => panic!("reached `unreachable` in {}", func.symbol),
            }
        }
    }

    fn call_by_symbol_checked(&mut self, symbol: &str, args: &[i64]) -> Option<i64> {
        let func = *self
            .functions
            .get(symbol)
            .unwrap_or_else(|| panic!("call to unknown symbol `{symbol}`"));
        self.call(func, args)
    }

    fn step(&mut self, frame: &Frame, stmt: &Statement) {
        match stmt {
            Statement::Assign { place, rvalue } => {
                let value = self.rvalue(frame, rvalue);
                let addr = self.place_addr(frame, place);
                self.write8(addr, value);
            }
            Statement::StorageLive(_) | Statement::StorageDead(_) | Statement::Nop => {}
        }
    }

    fn rvalue(&mut self, frame: &Frame, rvalue: &Rvalue) -> i64 {
        match rvalue {
            Rvalue::Use(op) => self.operand(frame, op),
            Rvalue::BinaryOp { op, lhs, rhs } => {
                let a = self.operand(frame, lhs);
                let b = self.operand(frame, rhs);
                binop(*op, a, b)
            }
            Rvalue::UnaryOp { op, operand } => {
                let v = self.operand(frame, operand);
                match op {
                    UnOp::Neg => -v,
                    UnOp::Not => !v,
                }
            }
            Rvalue::Ref { place, .. } | Rvalue::AddressOf(place) => {
                self.place_addr(frame, place) as i64
            }
            // All supported casts are value-preserving at this width.
            Rvalue::Cast { operand, .. } => self.operand(frame, operand),
            Rvalue::Aggregate { .. } => 0,
        }
    }

    fn operand(&mut self, frame: &Frame, op: &Operand) -> i64 {
        match op {
            Operand::Copy(place) | Operand::Move(place) => {
                let addr = self.place_addr(frame, place);
                self.read8(addr)
            }
            Operand::Constant(c) => match c {
                Constant::Int { value, .. } => *value as i64,
                Constant::Float { value, .. } => value.to_bits() as i64,
                Constant::Bool(b) => *b as i64,
                Constant::Unit => 0,
                Constant::Fn(_) => 0,
                Constant::VTable { class, group } => {
                    let blob = *self
                        .blob_of_class
                        .get(&class.0)
                        .unwrap_or_else(|| panic!("no vtable blob for class {class:?}"));
                    encode_vptr(blob, *group)
                }
            },
        }
    }

    fn place_addr(&mut self, frame: &Frame, place: &Place) -> usize {
        let mut addr = frame.local_addr(place.local);
        for proj in &place.projection {
            match proj {
                ProjectionElem::Field { offset, .. } => addr += *offset as usize,
                ProjectionElem::Deref => addr = self.read8(addr) as usize,
                ProjectionElem::Index { local, stride } => {
                    let idx = self.read8(frame.local_addr(*local));
                    addr = (addr as i64 + idx * *stride as i64) as usize;
                }
                ProjectionElem::DowncastBase { offset, .. } => addr += *offset as usize,
                ProjectionElem::VTableSlot(_) => {}
            }
        }
        addr
    }

    fn read8(&self, addr: usize) -> i64 {
        assert!(addr >= 8, "null or wild read at {addr}");
        let bytes: [u8; 8] = self.mem[addr..addr + 8].try_into().expect("in bounds");
        i64::from_le_bytes(bytes)
    }

    fn write8(&mut self, addr: usize, value: i64) {
        assert!(addr >= 8, "null or wild write at {addr}");
        self.mem[addr..addr + 8].copy_from_slice(&value.to_le_bytes());
    }
}

fn binop(op: BinOp, a: i64, b: i64) -> i64 {
    match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => a / b,
        BinOp::Rem => a % b,
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::Shl => a << b,
        BinOp::Shr => a >> b,
        BinOp::Eq => (a == b) as i64,
        BinOp::Ne => (a != b) as i64,
        BinOp::Lt => (a < b) as i64,
        BinOp::Le => (a <= b) as i64,
        BinOp::Gt => (a > b) as i64,
        BinOp::Ge => (a >= b) as i64,
    }
}

// Encoded vtable pointers are offset by one so an uninitialised
// (zero) vptr cell faults instead of dispatching through blob 0.
fn encode_vptr(blob: usize, group: usize) -> i64 {
    (((blob + 1) as i64) << 8) | group as i64
}

fn decode_vptr(value: i64) -> (usize, usize) {
    assert!(value != 0, "virtual call through uninitialised vtable pointer");
    ((value >> 8) as usize - 1, (value & 0xff) as usize)
}
