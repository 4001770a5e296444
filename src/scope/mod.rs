//! The lexical-scope model: templates (§3, §4.2) and their runtime
//! activations.
//!
//! `description` holds the immutable compile-time template
//! ([`ScopeDescription`]); `activated` holds the per-entry runtime instance
//! ([`ActivatedScope`]) together with ghosting, futures, and
//! `effective-tuple`.

pub mod activated;
pub mod description;

pub use activated::{ActivatedScope, FutureCell, SharedScope, StorageSlot};
pub use description::{MemberDecl, MemberKind, ScopeDescription};
