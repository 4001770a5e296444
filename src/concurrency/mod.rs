//! The concurrency subsystem (§4.4, §5): forked tasks, forked thread-pool
//! work items, futures, parallel-for, and the typed inter-task message
//! bus.
//!
//! Every thread this subsystem spawns is a plain `std::thread`; there is
//! no async runtime in this core (§1 non-goals name cross-process
//! concurrency out of scope, but in-process OS-thread concurrency is the
//! whole point of this component, matching the source's model, §5).

pub mod future;
pub mod messaging;
pub mod parallel_for;
pub mod task;
pub mod thread_pool;

pub use messaging::ResponseMapRegistry;
pub use task::{Message, TaskRegistry};
pub use thread_pool::PoolRegistry;
