//! Lexical scope templates (§3, §4.2). A `ScopeDescription` is immutable
//! once execution begins; it is built once by the loader and shared by
//! every activation of that scope.

use std::sync::Arc;

use hashbrown::HashMap;

use crate::error::{VmError, VmResult};
use crate::ids::{FunctionId, TypeId};
use crate::types::FunctionSignature;
use crate::value::{RValue, ValueKind};

/// How a declared member's storage is bound at activation time.
#[derive(Debug, Clone)]
pub enum MemberKind {
    /// An ordinary owned local.
    Variable,
    /// A reference parameter: storage is borrowed from another scope.
    Reference,
    /// A first-class function value or function-typed parameter.
    Function(Arc<FunctionSignature>),
}

/// One declared member of a scope, in the order it was declared. This
/// order is the order used when binding to the stack (§3).
#[derive(Debug, Clone)]
pub struct MemberDecl {
    pub name: Arc<str>,
    pub kind: ValueKind,
    pub member_kind: MemberKind,
}

/// A lexical scope template: the ordered member list plus the side tables
/// described in §3.
pub struct ScopeDescription {
    pub members: Vec<MemberDecl>,
    pub tuple_hints: HashMap<Arc<str>, TypeId>,
    pub record_hints: HashMap<Arc<str>, TypeId>,
    /// Variable-bound function values (a variable whose value is a
    /// function, as opposed to a parameter of function type).
    pub function_bindings: HashMap<Arc<str>, FunctionId>,
    /// Function definitions nested lexically inside this scope.
    pub nested_functions: HashMap<Arc<str>, FunctionId>,
    pub constants: HashMap<Arc<str>, RValue>,
    /// Names of response maps declared in this scope. The maps themselves
    /// are owned by the function/task that declares them and looked up by
    /// name through [`crate::concurrency::messaging::ResponseMapRegistry`]
    /// to avoid a direct dependency from the scope layer onto concurrency
    /// types.
    pub response_map_names: Vec<Arc<str>>,
    pub parent: Option<Arc<ScopeDescription>>,
}

impl ScopeDescription {
    pub fn new(parent: Option<Arc<ScopeDescription>>) -> Self {
        Self {
            members: Vec::new(),
            tuple_hints: HashMap::new(),
            record_hints: HashMap::new(),
            function_bindings: HashMap::new(),
            nested_functions: HashMap::new(),
            constants: HashMap::new(),
            response_map_names: Vec::new(),
            parent,
        }
    }

    fn name_taken(&self, name: &str) -> bool {
        self.members.iter().any(|m| m.name.as_ref() == name)
            || self.tuple_hints.contains_key(name)
            || self.record_hints.contains_key(name)
            || self.function_bindings.contains_key(name)
            || self.nested_functions.contains_key(name)
            || self.constants.contains_key(name)
            || self.response_map_names.iter().any(|n| n.as_ref() == name)
    }

    /// Checks a prospective name against every name-introducing table in
    /// this scope and, recursively, its parent chain (§4.2 duplicate
    /// identifier discipline, §8 property outside the closed numbered
    /// list but implied by §7's `DuplicateIdentifier` kind).
    fn check_available(&self, name: &str) -> VmResult<()> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if scope.name_taken(name) {
                return Err(VmError::duplicate_identifier(name));
            }
            current = scope.parent.as_deref();
        }
        Ok(())
    }

    pub fn declare_variable(&mut self, name: impl Into<Arc<str>>, kind: ValueKind) -> VmResult<()> {
        let name = name.into();
        self.check_available(&name)?;
        self.members.push(MemberDecl {
            name,
            kind,
            member_kind: MemberKind::Variable,
        });
        Ok(())
    }

    pub fn declare_reference(&mut self, name: impl Into<Arc<str>>, kind: ValueKind) -> VmResult<()> {
        let name = name.into();
        self.check_available(&name)?;
        self.members.push(MemberDecl {
            name,
            kind,
            member_kind: MemberKind::Reference,
        });
        Ok(())
    }

    pub fn declare_function_param(
        &mut self,
        name: impl Into<Arc<str>>,
        signature: Arc<FunctionSignature>,
    ) -> VmResult<()> {
        let name = name.into();
        self.check_available(&name)?;
        self.members.push(MemberDecl {
            name,
            kind: ValueKind::Function,
            member_kind: MemberKind::Function(signature),
        });
        Ok(())
    }

    pub fn declare_constant(&mut self, name: impl Into<Arc<str>>, value: RValue) -> VmResult<()> {
        let name = name.into();
        self.check_available(&name)?;
        self.constants.insert(name, value);
        Ok(())
    }

    pub fn declare_function_binding(
        &mut self,
        name: impl Into<Arc<str>>,
        function: FunctionId,
    ) -> VmResult<()> {
        let name = name.into();
        self.check_available(&name)?;
        self.function_bindings.insert(name, function);
        Ok(())
    }

    pub fn declare_nested_function(
        &mut self,
        name: impl Into<Arc<str>>,
        function: FunctionId,
    ) -> VmResult<()> {
        let name = name.into();
        self.check_available(&name)?;
        self.nested_functions.insert(name, function);
        Ok(())
    }

    pub fn declare_response_map(&mut self, name: impl Into<Arc<str>>) -> VmResult<()> {
        let name = name.into();
        self.check_available(&name)?;
        self.response_map_names.push(name);
        Ok(())
    }

    pub fn declare_tuple_hint(&mut self, name: impl Into<Arc<str>>, type_id: TypeId) -> VmResult<()> {
        let name = name.into();
        self.check_available(&name)?;
        self.tuple_hints.insert(name, type_id);
        Ok(())
    }

    pub fn declare_record_hint(&mut self, name: impl Into<Arc<str>>, type_id: TypeId) -> VmResult<()> {
        let name = name.into();
        self.check_available(&name)?;
        self.record_hints.insert(name, type_id);
        Ok(())
    }

    /// Index of a declared member by name, searching only this
    /// description's own member list.
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name.as_ref() == name)
    }

    pub fn member(&self, index: usize) -> Option<&MemberDecl> {
        self.members.get(index)
    }

    /// Number of slots `enter` reserves for this description (§4.2). The
    /// source reserves storage only for non-reference, non-function-
    /// signature variables; this crate's `ActivatedScope` instead gives
    /// every declared member — references and function bindings included —
    /// one `RValue` slot, since each still needs somewhere to hold whatever
    /// gets bound into it (see the storage-model note on
    /// `crate::scope::ActivatedScope::enter`). So this is simply every
    /// declared member, not a filtered subset.
    pub fn storage_member_count(&self) -> usize {
        self.members.len()
    }
}
