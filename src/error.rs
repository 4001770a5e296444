//! Error types produced by the virtual machine core.
//!
//! Every fatal condition the VM can discover while building or executing a
//! tree converts to one of five kinds. Each kind carries its own
//! presentation prologue so the top-level thread handler can format a
//! message without inspecting the payload.

use thiserror::Error;

/// A fatal condition raised while executing or validating a code tree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VmError {
    /// A code path or type combination the VM does not support. Recovering
    /// by skipping would leave the stack or heap in an inconsistent state.
    #[error("not implemented: {reason}")]
    NotImplemented { reason: String },

    /// An internal invariant was violated (unbalanced scope enter/exit, an
    /// unknown type ID, a tuple-registry miss where the loader guaranteed a
    /// hit). Always a bug in the loader or the VM itself.
    #[error("internal failure: {reason}")]
    InternalFailure { reason: String },

    /// The running program did something illegal: an out-of-bounds array
    /// index, a type mismatch in a message payload, assignment through an
    /// unbound reference, a duplicate member name in a tuple RValue.
    #[error("execution error: {reason}")]
    Execution { reason: String },

    /// An identifier was not bound in any active scope, ghost set, or
    /// parent chain.
    #[error("missing variable: {name}")]
    MissingVariable { name: String },

    /// A name introduction collided with an existing name-introducing
    /// table during scope setup.
    #[error("duplicate identifier: {name}")]
    DuplicateIdentifier { name: String },
}

impl VmError {
    /// Builds a [`VmError::NotImplemented`].
    pub fn not_implemented<S: Into<String>>(reason: S) -> Self {
        Self::NotImplemented {
            reason: reason.into(),
        }
    }

    /// Builds a [`VmError::InternalFailure`].
    pub fn internal_failure<S: Into<String>>(reason: S) -> Self {
        Self::InternalFailure {
            reason: reason.into(),
        }
    }

    /// Builds a [`VmError::Execution`].
    pub fn execution<S: Into<String>>(reason: S) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }

    /// Builds a [`VmError::MissingVariable`].
    pub fn missing_variable<S: Into<String>>(name: S) -> Self {
        Self::MissingVariable { name: name.into() }
    }

    /// Builds a [`VmError::DuplicateIdentifier`].
    pub fn duplicate_identifier<S: Into<String>>(name: S) -> Self {
        Self::DuplicateIdentifier { name: name.into() }
    }

    /// Whether a worker thread that raises this error may simply terminate
    /// without corrupting shared state accessible to other threads. Every
    /// variant is unrecoverable at the point of discovery (§7); this exists
    /// so the thread-level handler can decide how much detail to log rather
    /// than whether to retry.
    pub fn is_recoverable(&self) -> bool {
        false
    }

    /// A short tag for log correlation, mirroring the prologue used in
    /// `Display`.
    pub fn category(&self) -> &'static str {
        match self {
            VmError::NotImplemented { .. } => "not_implemented",
            VmError::InternalFailure { .. } => "internal_failure",
            VmError::Execution { .. } => "execution",
            VmError::MissingVariable { .. } => "missing_variable",
            VmError::DuplicateIdentifier { .. } => "duplicate_identifier",
        }
    }
}

/// Result alias used throughout the crate.
pub type VmResult<T> = std::result::Result<T, VmError>;

impl<T> From<std::sync::PoisonError<T>> for VmError {
    fn from(error: std::sync::PoisonError<T>) -> Self {
        VmError::internal_failure(format!("lock poisoned: {error}"))
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for VmError {
    fn from(_error: crossbeam_channel::SendError<T>) -> Self {
        VmError::internal_failure("message channel receiver has disconnected")
    }
}

impl From<crossbeam_channel::RecvError> for VmError {
    fn from(_error: crossbeam_channel::RecvError) -> Self {
        VmError::internal_failure("message channel sender has disconnected")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prologue_matches_kind() {
        let error = VmError::missing_variable("x");
        assert_eq!(error.to_string(), "missing variable: x");
        assert_eq!(error.category(), "missing_variable");
    }

    #[test]
    fn duplicate_identifier_reports_name() {
        let error = VmError::duplicate_identifier("counter");
        assert!(error.to_string().contains("counter"));
    }

    #[test]
    fn none_of_the_five_kinds_are_recoverable() {
        let errors = [
            VmError::not_implemented("x"),
            VmError::internal_failure("x"),
            VmError::execution("x"),
            VmError::missing_variable("x"),
            VmError::duplicate_identifier("x"),
        ];
        for error in errors {
            assert!(!error.is_recoverable());
        }
    }
}
