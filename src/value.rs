//! The runtime value representation: [`ValueKind`] (the closed set of
//! primitive/composite kinds, §3) and [`RValue`] (the tagged transport
//! value used when data temporarily leaves stack storage, §4.3).

use std::sync::Arc;

use crate::ids::{ArrayHandle, BufferHandle, StringHandle, TaskHandle, TypeId};

/// The closed set of value kinds the VM understands (§3). Used for
/// function-signature parameter/return types, array element types, and
/// registry member descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Integer,
    Integer16,
    Real,
    Boolean,
    String,
    Function,
    Address,
    TaskHandle,
    Buffer,
    Array(Box<ValueKind>),
    Tuple(TypeId),
    Record(TypeId),
}

impl ValueKind {
    /// Whether this kind is one of the two composite (struct-like) kinds.
    pub fn is_composite(&self) -> bool {
        matches!(self, ValueKind::Tuple(_) | ValueKind::Record(_))
    }
}

/// A member of a tuple or record RValue, or of an array element list,
/// carried together with its declared name when the owner is a tuple or
/// record.
pub type Member = (Arc<str>, RValue);

/// A tagged value used to move data between operations when it does not
/// reside directly on the value stack (§4.3). Tuples and records compare
/// and clone recursively; arrays compare and clone element-wise. There are
/// no cycles in an `RValue` graph because structured data is always owned
/// through scope lifetime rather than through arbitrary object references,
/// so a plain derive is sufficient for equality and cloning.
#[derive(Debug, Clone, PartialEq)]
pub enum RValue {
    Null,
    Integer(i32),
    Integer16(i16),
    Real(f32),
    Boolean(bool),
    String(StringHandle),
    Function(crate::ids::FunctionId),
    /// A bound reference to another scope's storage slot, used for
    /// reference-parameter binding. Opaque outside the scope subsystem.
    Address(crate::scope::StorageSlot),
    TaskHandle(TaskHandle),
    Buffer(BufferHandle),
    Array {
        element_type: ValueKind,
        elements: Vec<RValue>,
        /// Set once the array has escaped into a variable assignment and
        /// been copied into the array pool (§4.3, last paragraph).
        backing: Option<ArrayHandle>,
    },
    Tuple {
        type_id: TypeId,
        members: Vec<Member>,
    },
    Record {
        type_id: TypeId,
        members: Vec<Member>,
    },
}

impl RValue {
    /// Reports the [`ValueKind`] of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            RValue::Null => ValueKind::Null,
            RValue::Integer(_) => ValueKind::Integer,
            RValue::Integer16(_) => ValueKind::Integer16,
            RValue::Real(_) => ValueKind::Real,
            RValue::Boolean(_) => ValueKind::Boolean,
            RValue::String(_) => ValueKind::String,
            RValue::Function(_) => ValueKind::Function,
            RValue::Address(_) => ValueKind::Address,
            RValue::TaskHandle(_) => ValueKind::TaskHandle,
            RValue::Buffer(_) => ValueKind::Buffer,
            RValue::Array { element_type, .. } => ValueKind::Array(Box::new(element_type.clone())),
            RValue::Tuple { type_id, .. } => ValueKind::Tuple(*type_id),
            RValue::Record { type_id, .. } => ValueKind::Record(*type_id),
        }
    }

    /// Looks up a named member of a tuple or record value.
    pub fn member(&self, name: &str) -> Option<&RValue> {
        match self {
            RValue::Tuple { members, .. } | RValue::Record { members, .. } => members
                .iter()
                .find(|(member_name, _)| member_name.as_ref() == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }
}
