//! Forked tasks (OS threads with their own stack and inbox) and the
//! message bus that connects them (§4.4).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::error::{VmError, VmResult};
use crate::ids::TaskHandle;
use crate::operation::{Block, Context};
use crate::scope::{ActivatedScope, ScopeDescription};
use crate::value::RValue;

/// One inter-task message: sender, message name, and an ordered payload
/// (§4.4). The source lays the payload out in a heap-frame keyed by
/// per-type storage sizes; this crate carries the already-evaluated
/// `RValue` sequence directly, since the heap-frame's only job was to
/// give the payload a stable home until the receiver copies it out, and
/// an owned `Vec<RValue>` already does that.
#[derive(Clone)]
pub struct Message {
    pub sender: TaskHandle,
    pub name: Arc<str>,
    pub payload: Vec<RValue>,
}

/// Process-wide (per-program) registry of running tasks: handle → inbox
/// sender, and name → handle for `SendTaskMessage`'s by-name form (§4.4).
pub struct TaskRegistry {
    next: AtomicU32,
    senders: Mutex<HashMap<TaskHandle, Sender<Message>>>,
    names: Mutex<HashMap<Arc<str>, TaskHandle>>,
    /// Blocking "wait for this unit of outstanding work" closures. A
    /// forked task's `JoinHandle` is one; a pool-dispatched work item
    /// (which has no `JoinHandle` of its own, since it runs on a shared,
    /// long-lived pool worker) is a closure that blocks on a completion
    /// barrier instead (see `thread_pool::fork_to_pool` and
    /// `future::schedule`'s pool branch).
    waiters: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
            senders: Mutex::new(HashMap::new()),
            names: Mutex::new(HashMap::new()),
            waiters: Mutex::new(Vec::new()),
        }
    }

    pub fn allocate(&self) -> TaskHandle {
        TaskHandle(self.next.fetch_add(1, Ordering::SeqCst))
    }

    pub fn register(&self, handle: TaskHandle, sender: Sender<Message>, name: Option<Arc<str>>) {
        self.senders.lock().insert(handle, sender);
        if let Some(name) = name {
            self.names.lock().insert(name, handle);
        }
    }

    pub fn sender(&self, handle: TaskHandle) -> Option<Sender<Message>> {
        self.senders.lock().get(&handle).cloned()
    }

    pub fn handle_by_name(&self, name: &str) -> Option<TaskHandle> {
        self.names.lock().get(name).copied()
    }

    /// Tracks a spawned thread so [`Self::join_all`] can wait for it
    /// (`Threads::wait-for-threads-to-finish`, §4.5).
    pub fn track(&self, handle: JoinHandle<()>) {
        self.track_waitable(move || {
            if handle.join().is_err() {
                log::error!("a spawned task thread panicked");
            }
        });
    }

    /// Tracks an arbitrary unit of outstanding work dispatched onto a
    /// shared thread pool, where there is no dedicated `JoinHandle` to
    /// join. `wait` must block until that specific unit of work has
    /// finished (not until the pool itself is idle, since other items may
    /// still be queued behind or ahead of it).
    pub fn track_waitable(&self, wait: impl FnOnce() + Send + 'static) {
        self.waiters.lock().push(Box::new(wait));
    }

    /// Blocks until every tracked thread/work item has finished. Called
    /// once, after `entrypoint` returns (§4.5).
    pub fn join_all(&self) {
        let waiters: Vec<_> = std::mem::take(&mut *self.waiters.lock());
        for wait in waiters {
            wait();
        }
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns a new OS thread owning its own value stack, activating `block`
/// against the program's global scope as its parent and inheriting
/// `task_origin` from the forking task (§4.4, item 1).
pub fn fork(ctx: &mut Context, block: Arc<Block>, name: Option<Arc<str>>) -> VmResult<()> {
    let handle = ctx.program.task_registry.allocate();
    let (sender, receiver) = crossbeam_channel::unbounded();
    ctx.program.task_registry.register(handle, sender, name.clone());

    let program = ctx.program.clone();
    let global = program.global_scope();
    let task_origin = ctx.task_handle;

    let join = std::thread::Builder::new()
        .name(format!("task-{}", handle.0))
        .spawn(move || {
            let mut task_ctx = Context::new(program.clone(), global.clone(), handle, receiver);
            let description = block
                .description
                .clone()
                .unwrap_or_else(|| Arc::new(ScopeDescription::new(None)));
            let scope = ActivatedScope::enter(description, Some(global), task_origin, &mut task_ctx.stack);
            task_ctx.enter_scope(scope.clone());
            log::info!("task {} started", handle);
            if let Err(err) = block.execute(&mut task_ctx, false, false, 0) {
                log::error!("task {} failed: {err}", handle);
            } else {
                log::info!("task {} completed", handle);
            }
            let _ = ActivatedScope::exit(&scope, &mut task_ctx.stack);
        })
        .expect("failed to spawn task thread");
    ctx.program.task_registry.track(join);
    Ok(())
}

/// Resolves `target` by handle and enqueues a message on its inbox
/// (`SendTaskMessage`, §4.4).
pub fn send_by_handle(ctx: &Context, target: TaskHandle, name: Arc<str>, payload: Vec<RValue>) -> VmResult<()> {
    let sender = ctx
        .program
        .task_registry
        .sender(target)
        .ok_or_else(|| VmError::execution(format!("no running task with handle {target}")))?;
    sender
        .send(Message {
            sender: ctx.task_handle,
            name,
            payload,
        })
        .map_err(|_| VmError::internal_failure("target task's inbox has been dropped"))
}

/// Resolves `target_name` by the task's registered name and enqueues a
/// message on its inbox (`SendTaskMessage`, §4.4).
pub fn send_by_name(ctx: &Context, target_name: &str, name: Arc<str>, payload: Vec<RValue>) -> VmResult<()> {
    let handle = ctx
        .program
        .task_registry
        .handle_by_name(target_name)
        .ok_or_else(|| VmError::execution(format!("no task registered under name '{target_name}'")))?;
    send_by_handle(ctx, handle, name, payload)
}
