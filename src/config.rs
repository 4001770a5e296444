//! Program configuration and the host collaborator interface.
//!
//! The VM core never talks to a terminal, a file system, or an extension
//! catalog directly; those are external collaborators. `HostInterface` is
//! the one seam through which a program reaches them; `ProgramConfig` is
//! the crate's only configuration surface.

use std::sync::Arc;

/// Collaborator implementing the two I/O primitives and the pre-execution
/// hook that the VM core treats as external (§6).
///
/// An embedder supplies a real implementation; tests and
/// [`ProgramConfig::default`] use [`NullHostInterface`].
pub trait HostInterface: Send + Sync {
    /// Runs once, with no arguments, immediately before `entrypoint` is
    /// invoked. Any error from this hook is fatal to program execution.
    fn pre_execution(&self) -> Result<(), String> {
        Ok(())
    }

    /// Writes a line to the "debug" output stream.
    fn write_debug(&self, line: &str);

    /// Synchronously reads one line from the input stream. Returns `None`
    /// at end of input.
    fn read_line(&self) -> Option<String>;
}

/// A [`HostInterface`] that discards output and never yields input. Used as
/// the default collaborator so the core can be exercised without wiring a
/// real terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHostInterface;

impl HostInterface for NullHostInterface {
    fn write_debug(&self, _line: &str) {}

    fn read_line(&self) -> Option<String> {
        None
    }
}

/// Construction-time configuration for a [`crate::program::Program`].
///
/// This is a plain struct rather than a file-backed configuration loader:
/// the VM core has no persisted state (§6), so there is nothing to read
/// from disk at startup beyond what the embedder passes in directly.
#[derive(Clone)]
pub struct ProgramConfig {
    /// Number of worker OS threads a freshly created named thread pool
    /// starts with, absent an explicit override at creation time.
    pub default_pool_workers: usize,
    /// Initial capacity reserved on each thread's value stack, in number of
    /// `RValue` slots.
    pub initial_stack_capacity: usize,
    /// The host collaborator for the pre-execution hook and debug I/O.
    pub host: Arc<dyn HostInterface>,
}

impl ProgramConfig {
    /// Builds a configuration using [`NullHostInterface`] and the supplied
    /// worker count.
    pub fn with_pool_workers(default_pool_workers: usize) -> Self {
        Self {
            default_pool_workers,
            ..Self::default()
        }
    }
}

impl Default for ProgramConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            default_pool_workers: workers,
            initial_stack_capacity: 64 * 1024 / std::mem::size_of::<usize>(),
            host: Arc::new(NullHostInterface),
        }
    }
}
