//! A tree-walking virtual machine core: an operation tree executing
//! against lexical scopes and an explicit value stack, with first-class
//! tasks, futures, a typed inter-task message bus, and named worker
//! thread pools.
//!
//! The crate is split the way its reference virtual machine is: value
//! representation, type registries, handle pools, and scopes each get
//! their own module; the operation tree and function invocation sit on
//! top of them; concurrency is a self-contained module built on the same
//! primitives. [`program::Program`] ties everything together and is the
//! one entry point an embedder calls `execute` on.

pub mod concurrency;
pub mod config;
pub mod error;
pub mod function;
pub mod handles;
pub mod ids;
pub mod operation;
pub mod program;
pub mod scope;
pub mod stack;
pub mod types;
pub mod value;

pub use config::{HostInterface, NullHostInterface, ProgramConfig};
pub use error::{VmError, VmResult};
pub use function::Function;
pub use ids::{ArrayHandle, BufferHandle, FunctionId, StringHandle, TaskHandle, TypeId};
pub use operation::{Block, Context, FlowResult, Operation};
pub use program::Program;
pub use scope::{ActivatedScope, ScopeDescription, SharedScope};
pub use value::{RValue, ValueKind};
