//! Single-shot futures: declare a computation without evaluating it, hand
//! back a name other code can `ReadVariable` later and block on (§4.2,
//! §4.4 items 4-5).

use std::sync::{Arc, Condvar, Mutex};

use crate::operation::{Context, Operation};
use crate::scope::ActivatedScope;

/// Declares `name` as a future over `operation` in the current scope, then
/// evaluates it on a dedicated thread (`pool = None`) or on the named
/// pool's workers (`pool = Some(...)`), writing the result into the
/// future's cell when done (`ScheduleFuture`/`ScheduleFutureToPool`, §4.4).
///
/// A later `ReadVariable(name)` against this same scope blocks in
/// [`ActivatedScope::get_variable`] until the cell is filled, matching §8
/// property 6 ("a future's value, once computed, is stable and repeatable
/// under concurrent readers").
///
/// Either branch registers its completion with
/// [`crate::concurrency::task::TaskRegistry::track`] /
/// [`crate::concurrency::task::TaskRegistry::track_waitable`] so
/// `Program::execute`'s final `join_all` waits for this future too (§4.5),
/// not just for `ForkTask`-spawned threads.
pub fn schedule(ctx: &mut Context, name: Arc<str>, operation: Arc<Operation>, pool: Option<Arc<str>>) {
    let cell = ActivatedScope::declare_future(&ctx.scope, name.clone(), operation.clone());

    let program = ctx.program.clone();
    let scope = ctx.scope.clone();
    let task_handle = ctx.task_handle;
    let inbox = ctx.inbox.clone();
    let thread_name = name.clone();

    let run = move || {
        let mut future_ctx = Context::new(program, scope, task_handle, inbox);
        match operation.execute_rvalue(&mut future_ctx) {
            Ok(value) => cell.set_result(value),
            Err(err) => {
                log::error!("future '{name}' failed: {err}");
                cell.set_result(crate::value::RValue::Null);
            }
        }
    };

    match pool {
        None => {
            let handle = std::thread::Builder::new()
                .name(format!("future-{thread_name}"))
                .spawn(run)
                .expect("failed to spawn future thread");
            ctx.program.task_registry.track(handle);
        }
        Some(pool_name) => {
            let pool = ctx
                .program
                .thread_pools
                .get_or_create(&pool_name, ctx.program.config.default_pool_workers);

            let done = Arc::new((Mutex::new(false), Condvar::new()));
            let done_for_worker = done.clone();
            pool.enqueue(Box::new(move || {
                run();
                let (lock, condvar) = &*done_for_worker;
                *lock.lock().unwrap() = true;
                condvar.notify_all();
            }));

            ctx.program.task_registry.track_waitable(move || {
                let (lock, condvar) = &*done;
                let mut finished = lock.lock().unwrap();
                while !*finished {
                    finished = condvar.wait(finished).unwrap();
                }
            });
        }
    }
}
