//! Tuple/record type registries and function signatures (§3, §4.3).
//!
//! The two registries are process-global for the lifetime of one
//! [`crate::program::Program`] and are reset when a new program is
//! constructed (§4.5, §9 open question on per-program isolation). Per the
//! indexed-arena redesign note, each registry is a single `Vec` guarded by
//! one mutex rather than a pointer-keyed owner map; the `TypeId` is simply
//! `index + 1` (0 stays reserved for "invalid").

use std::sync::{Arc, Mutex};

use crate::ids::TypeId;
use crate::value::ValueKind;

/// An ordered member list for a registered tuple or record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub members: Vec<(Arc<str>, ValueKind)>,
}

impl TypeDescriptor {
    /// Number of declared members. Stands in for the byte-layout size
    /// computation a packed-struct implementation would need; this VM
    /// represents composite values as `RValue` trees rather than byte
    /// buffers, so there is no offset table to precompute (see DESIGN.md).
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn member_type(&self, name: &str) -> Option<&ValueKind> {
        self.members
            .iter()
            .find(|(member_name, _)| member_name.as_ref() == name)
            .map(|(_, kind)| kind)
    }
}

/// A declared parameter of a [`FunctionSignature`] (§3: ordered parameter
/// types with per-parameter flags and type hints).
///
/// `kind` already carries the array flag: an array parameter's kind is
/// `ValueKind::Array(element_type)`, so there is no separate `is_array`
/// field to keep in sync with it. `function_signature` is the nested
/// signature hint §3 requires for function-typed parameters (`kind ==
/// ValueKind::Function`); two function-typed parameters only match if
/// their nested signatures also match pairwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    pub kind: ValueKind,
    pub is_reference: bool,
    pub function_signature: Option<Arc<FunctionSignature>>,
}

impl ParamDecl {
    /// A by-value, non-function parameter — the common case.
    pub fn value(kind: ValueKind) -> Self {
        Self {
            kind,
            is_reference: false,
            function_signature: None,
        }
    }

    /// A by-reference parameter.
    pub fn reference(kind: ValueKind) -> Self {
        Self {
            kind,
            is_reference: true,
            function_signature: None,
        }
    }

    /// A function-typed parameter carrying the nested signature it must
    /// match (§3).
    pub fn function(signature: Arc<FunctionSignature>) -> Self {
        Self {
            kind: ValueKind::Function,
            is_reference: false,
            function_signature: Some(signature),
        }
    }
}

/// The ordered parameter and return types of a function (§3). Two
/// signatures match iff every parameter and every return type matches
/// pairwise.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FunctionSignature {
    pub params: Vec<ParamDecl>,
    pub returns: Vec<ValueKind>,
}

impl FunctionSignature {
    pub fn matches(&self, other: &FunctionSignature) -> bool {
        self == other
    }
}

#[derive(Default)]
struct RegistryTable {
    descriptors: Vec<TypeDescriptor>,
}

impl RegistryTable {
    fn register(&mut self, members: Vec<(Arc<str>, ValueKind)>) -> TypeId {
        let candidate = TypeDescriptor { members };
        if let Some(index) = self.descriptors.iter().position(|d| *d == candidate) {
            return TypeId((index + 1) as u32);
        }
        self.descriptors.push(candidate);
        TypeId(self.descriptors.len() as u32)
    }

    fn get(&self, id: TypeId) -> Option<TypeDescriptor> {
        if id.is_invalid() {
            return None;
        }
        self.descriptors.get((id.0 - 1) as usize).cloned()
    }
}

/// The process-global (per-program) tuple and record type registries.
pub struct TypeRegistry {
    tuples: Mutex<RegistryTable>,
    records: Mutex<RegistryTable>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            tuples: Mutex::new(RegistryTable::default()),
            records: Mutex::new(RegistryTable::default()),
        }
    }

    /// Registers a tuple type, returning the existing ID if an equivalent
    /// descriptor (same member names in order, same element types) was
    /// already registered.
    pub fn register_tuple(&self, members: Vec<(Arc<str>, ValueKind)>) -> TypeId {
        self.tuples.lock().unwrap().register(members)
    }

    /// Registers a record type under the same idempotence rule as
    /// [`Self::register_tuple`].
    pub fn register_record(&self, members: Vec<(Arc<str>, ValueKind)>) -> TypeId {
        self.records.lock().unwrap().register(members)
    }

    pub fn tuple_descriptor(&self, id: TypeId) -> Option<TypeDescriptor> {
        self.tuples.lock().unwrap().get(id)
    }

    /// Finds the id of a tuple descriptor matching `members` exactly,
    /// without registering one if no match exists. Used by
    /// `effective-tuple` (§4.2), which treats a registry miss as a fatal
    /// internal error rather than registering on demand: the loader is
    /// responsible for registering the matching type when the function
    /// was created.
    pub fn tuple_descriptor_matching(&self, members: &[(Arc<str>, ValueKind)]) -> Option<TypeId> {
        let table = self.tuples.lock().unwrap();
        let candidate = TypeDescriptor {
            members: members.to_vec(),
        };
        table
            .descriptors
            .iter()
            .position(|d| *d == candidate)
            .map(|index| TypeId((index + 1) as u32))
    }

    pub fn record_descriptor(&self, id: TypeId) -> Option<TypeDescriptor> {
        self.records.lock().unwrap().get(id)
    }

    /// Clears both tables. Called once, at program construction (§4.5).
    pub fn reset(&self) {
        self.tuples.lock().unwrap().descriptors.clear();
        self.records.lock().unwrap().descriptors.clear();
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to a program's type registries.
pub type SharedTypeRegistry = Arc<TypeRegistry>;

#[cfg(test)]
mod tests {
    use super::*;

    fn members(pairs: &[(&str, ValueKind)]) -> Vec<(Arc<str>, ValueKind)> {
        pairs
            .iter()
            .map(|(name, kind)| (Arc::from(*name), kind.clone()))
            .collect()
    }

    #[test]
    fn duplicate_registration_is_idempotent() {
        let registry = TypeRegistry::new();
        let a = registry.register_tuple(members(&[("a", ValueKind::Integer), ("b", ValueKind::Integer)]));
        let b = registry.register_tuple(members(&[("a", ValueKind::Integer), ("b", ValueKind::Integer)]));
        assert_eq!(a, b);
    }

    #[test]
    fn differing_member_type_allocates_new_id() {
        let registry = TypeRegistry::new();
        let a = registry.register_tuple(members(&[("a", ValueKind::Integer)]));
        let b = registry.register_tuple(members(&[("a", ValueKind::Real)]));
        assert_ne!(a, b);
    }

    #[test]
    fn differing_member_name_allocates_new_id() {
        let registry = TypeRegistry::new();
        let a = registry.register_tuple(members(&[("a", ValueKind::Integer)]));
        let b = registry.register_tuple(members(&[("z", ValueKind::Integer)]));
        assert_ne!(a, b);
    }

    #[test]
    fn id_zero_is_never_allocated() {
        let registry = TypeRegistry::new();
        let id = registry.register_tuple(members(&[("a", ValueKind::Boolean)]));
        assert!(!id.is_invalid());
    }

    #[test]
    fn reset_clears_lookup() {
        let registry = TypeRegistry::new();
        let id = registry.register_tuple(members(&[("a", ValueKind::Boolean)]));
        assert!(registry.tuple_descriptor(id).is_some());
        registry.reset();
        assert!(registry.tuple_descriptor(id).is_none());
    }
}
