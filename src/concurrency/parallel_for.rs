//! Parallel-for: splits an integer range into contiguous chunks, runs one
//! chunk per worker on a named pool, and blocks the caller until every
//! chunk has finished (§4.4 item 3).

use std::sync::{Arc, Condvar, Mutex};

use crate::operation::{Block, Context, FlowResult};
use crate::scope::ActivatedScope;

/// Splits `lower..upper` into `workers` contiguous chunks (the last chunk
/// absorbs any remainder), runs `body` once per iteration re-entering its
/// scope and binding `counter_name` to the current index before each run,
/// and blocks until every chunk completes (`ParallelFor`, §4.4).
///
/// `Break` or `Return` inside one chunk's body ends that chunk only;
/// sibling chunks keep running to completion (§9 open question, resolved
/// in DESIGN.md: parallel-for has no shared flow-control channel back to
/// the caller, so there is nothing for a chunk's `Return` to cancel but
/// its own work).
pub fn run(
    ctx: &mut Context,
    pool_name: &str,
    lower: i32,
    upper: i32,
    workers: usize,
    counter_name: &str,
    body: &Arc<Block>,
) -> crate::error::VmResult<()> {
    if upper <= lower || workers == 0 {
        return Ok(());
    }
    let pool = ctx.program.thread_pools.get_or_create(pool_name, workers);
    let total = (upper - lower) as usize;
    let chunk_size = total.div_ceil(workers).max(1);

    let barrier = Arc::new((Mutex::new(0usize), Condvar::new()));
    let mut chunk_count = 0usize;

    let mut start = lower;
    while start < upper {
        let end = (start + chunk_size as i32).min(upper);
        chunk_count += 1;

        let program = ctx.program.clone();
        let parent_scope = ctx.scope.clone();
        let task_handle = ctx.task_handle;
        let inbox = ctx.inbox.clone();
        let body = body.clone();
        let counter_name: Arc<str> = Arc::from(counter_name);
        let barrier = barrier.clone();

        pool.enqueue(Box::new(move || {
            let mut chunk_ctx = Context::new(program, parent_scope.clone(), task_handle, inbox);
            for i in start..end {
                let description = match body.description.clone() {
                    Some(description) => description,
                    None => {
                        log::error!("parallel-for body has no bound scope");
                        break;
                    }
                };
                let scope = ActivatedScope::enter(
                    description,
                    Some(parent_scope.clone()),
                    crate::ids::TaskHandle::INVALID,
                    &mut chunk_ctx.stack,
                );
                if let Err(err) = ActivatedScope::set_variable(&scope, &counter_name, crate::value::RValue::Integer(i)) {
                    log::error!("parallel-for: failed to bind counter: {err}");
                    let _ = ActivatedScope::exit(&scope, &mut chunk_ctx.stack);
                    break;
                }
                let previous = chunk_ctx.enter_scope(scope);
                let outcome = body.execute(&mut chunk_ctx, false, false, 0);
                let activated = std::mem::replace(&mut chunk_ctx.scope, previous);
                if let Err(err) = outcome {
                    log::error!("parallel-for chunk failed at i={i}: {err}");
                    let _ = ActivatedScope::exit(&activated, &mut chunk_ctx.stack);
                    break;
                }
                let _ = ActivatedScope::exit(&activated, &mut chunk_ctx.stack);
                let should_end_chunk = matches!(chunk_ctx.flow, FlowResult::Return | FlowResult::Break);
                chunk_ctx.flow = FlowResult::Normal;
                if should_end_chunk {
                    break;
                }
            }

            let (lock, cvar) = &*barrier;
            let mut done = lock.lock().unwrap();
            *done += 1;
            cvar.notify_all();
        }));

        start = end;
    }

    let (lock, cvar) = &*barrier;
    let mut done = lock.lock().unwrap();
    while *done < chunk_count {
        done = cvar.wait(done).unwrap();
    }
    Ok(())
}
