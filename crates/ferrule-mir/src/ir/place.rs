//! Places: memory locations addressed from a root local through a
//! projection chain.

use std::fmt;

use ferrule_sema::DeclId;

use super::function::LocalId;

/// An lvalue in the MIR: a root local plus ordered projections.
#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub local: LocalId,
    pub projection: Vec<ProjectionElem>,
}

/// One projection step. Byte offsets and strides are resolved at
/// lowering time from the class layouts, so consumers never need the
/// layout engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectionElem {
    /// A field access, with the field's resolved byte offset.
    Field { index: usize, offset: u64 },
    /// Read through a pointer or reference.
    Deref,
    /// Array element selected by the value of a local, scaled by the
    /// element stride.
    Index { local: LocalId, stride: u64 },
    /// Step into a base-class subobject at a known offset.
    DowncastBase { class: DeclId, offset: u64 },
    /// The vtable-pointer cell of group `group` of the object.
    VTableSlot(usize),
}

impl Place {
    pub fn from_local(local: LocalId) -> Self {
        Place { local, projection: Vec::new() }
    }

    pub fn field(mut self, index: usize, offset: u64) -> Self {
        self.projection.push(ProjectionElem::Field { index, offset });
        self
    }

    pub fn deref(mut self) -> Self {
        self.projection.push(ProjectionElem::Deref);
        self
    }

    pub fn index(mut self, local: LocalId, stride: u64) -> Self {
        self.projection.push(ProjectionElem::Index { local, stride });
        self
    }

    pub fn downcast_base(mut self, class: DeclId, offset: u64) -> Self {
        self.projection.push(ProjectionElem::DowncastBase { class, offset });
        self
    }

    pub fn vtable_slot(mut self, group: usize) -> Self {
        self.projection.push(ProjectionElem::VTableSlot(group));
        self
    }

    /// True for a bare local with no projections.
    pub fn is_local(&self) -> bool {
        self.projection.is_empty()
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_{}", self.local)?;
        for proj in &self.projection {
            match proj {
                ProjectionElem::Field { index, .. } => write!(f, ".{index}")?,
                ProjectionElem::Deref => write!(f, ".*")?,
                ProjectionElem::Index { local, .. } => write!(f, "[_{local}]")?,
                ProjectionElem::DowncastBase { offset, .. } => write!(f, ".base@{offset}")?,
                ProjectionElem::VTableSlot(group) => write!(f, ".vptr{group}")?,
            }
        }
        Ok(())
    }
}
