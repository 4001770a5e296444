//! Named thread pools: a fixed number of worker OS threads dequeuing
//! arbitrary work items from an MPMC queue (§4.4 item 2, §5).

use std::sync::Arc;
use std::thread::JoinHandle;

use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};

/// A unit of work enqueued onto a pool. Each closure sets up its own
/// ephemeral task identity before running, so pool-dispatched work can
/// still send/receive messages like a forked task (see
/// `concurrency::task::fork` for the sibling path that gets a dedicated
/// thread instead of borrowing a pool worker).
pub type WorkItem = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct Pool {
    sender: crossbeam_channel::Sender<WorkItem>,
    _workers: Vec<JoinHandle<()>>,
}

impl Pool {
    fn new(name: &str, worker_count: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<WorkItem>();
        let workers = (0..worker_count.max(1))
            .map(|i| {
                let receiver = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("pool-{name}-{i}"))
                    .spawn(move || {
                        while let Ok(item) = receiver.recv() {
                            item();
                        }
                    })
                    .expect("failed to spawn pool worker thread")
            })
            .collect();
        Self {
            sender,
            _workers: workers,
        }
    }

    pub(crate) fn enqueue(&self, item: WorkItem) {
        if self.sender.send(item).is_err() {
            log::error!("thread pool's worker threads have all exited");
        }
    }
}

/// The program-wide registry from pool name to [`Pool`] (§4.4 item 2:
/// "The VM's program object owns a registry from pool-name → pool").
#[derive(Default)]
pub struct PoolRegistry {
    pools: Mutex<HashMap<Arc<str>, Arc<Pool>>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the named pool, creating it with `default_workers` worker
    /// threads if it does not exist yet. `ParallelFor` also uses this: it
    /// creates or reuses a pool named by the operation's identity (§4.4
    /// item 3).
    pub fn get_or_create(&self, name: &str, default_workers: usize) -> Arc<Pool> {
        let mut pools = self.pools.lock();
        if let Some(pool) = pools.get(name) {
            return pool.clone();
        }
        let pool = Arc::new(Pool::new(name, default_workers));
        pools.insert(Arc::from(name), pool.clone());
        pool
    }
}

/// Enqueues `block` as a single work item on the named pool, inheriting
/// `task_origin` from the forking context exactly as [`crate::concurrency::task::fork`]
/// does (§4.4 item 2).
///
/// Registers a [`crate::concurrency::task::TaskRegistry::track_waitable`]
/// closure that blocks until this particular item completes, so
/// `Program::execute`'s final `join_all` still waits for pool-dispatched
/// work (§4.5) even though the pool's own worker threads are long-lived
/// and never tracked directly.
pub fn fork_to_pool(ctx: &mut crate::operation::Context, pool_name: &str, block: Arc<crate::operation::Block>) -> crate::error::VmResult<()> {
    let pool = ctx
        .program
        .thread_pools
        .get_or_create(pool_name, ctx.program.config.default_pool_workers);
    let program = ctx.program.clone();
    let global = program.global_scope();
    let task_origin = ctx.task_handle;
    let handle = program.task_registry.allocate();
    let (sender, receiver) = crossbeam_channel::unbounded();
    program.task_registry.register(handle, sender, None);

    let done = Arc::new((Mutex::new(false), Condvar::new()));
    let done_for_worker = done.clone();

    pool.enqueue(Box::new(move || {
        use crate::operation::Context;
        use crate::scope::{ActivatedScope, ScopeDescription};

        let mut task_ctx = Context::new(program.clone(), global.clone(), handle, receiver);
        let description = block
            .description
            .clone()
            .unwrap_or_else(|| Arc::new(ScopeDescription::new(None)));
        let scope = ActivatedScope::enter(description, Some(global), task_origin, &mut task_ctx.stack);
        task_ctx.enter_scope(scope.clone());
        if let Err(err) = block.execute(&mut task_ctx, false, false, 0) {
            log::error!("pool work item failed: {err}");
        }
        let _ = ActivatedScope::exit(&scope, &mut task_ctx.stack);

        let (lock, condvar) = &*done_for_worker;
        *lock.lock() = true;
        condvar.notify_all();
    }));

    ctx.program.task_registry.track_waitable(move || {
        let (lock, condvar) = &*done;
        let mut finished = lock.lock();
        while !*finished {
            condvar.wait(&mut finished);
        }
    });
    Ok(())
}
