//! Deferred callback scheduling.
//!
//! Two FIFO queues: macrotasks (`setTimeout` and friends) and microtasks
//! (`queueMicrotask`, promise reactions). The microtask queue drains
//! completely, including tasks enqueued while draining, before the next
//! macrotask runs.

use tracing::debug;

use crate::interp::{call, Ctx, HandleResult, Interp, Task};

/// Run queued tasks to quiescence after the toplevel finishes.
pub fn run_queues(it: &mut Interp, ctx: &Ctx) {
    drain_micro(it, ctx);
    while let Some(task) = it.macro_queue.pop_front() {
        if it.finished() {
            break;
        }
        run_task(it, ctx, task);
        drain_micro(it, ctx);
    }
}

fn drain_micro(it: &mut Interp, ctx: &Ctx) {
    while let Some(task) = it.micro_queue.pop_front() {
        if it.finished() {
            break;
        }
        run_task(it, ctx, task);
    }
}

fn run_task(it: &mut Interp, ctx: &Ctx, task: Task) {
    if task.funcs.is_empty() {
        return;
    }
    debug!(funcs = task.funcs.len(), args = task.args.len(), "running queued task");
    let args: Vec<HandleResult> = task
        .args
        .iter()
        .map(|objs| HandleResult::of_objs(objs.clone()))
        .collect();
    call::call_function(
        it,
        ctx,
        &task.funcs,
        &args,
        &task.this_objs,
        None,
        call::CallFlavor::default(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::graph::{JsType, JsValue, NodeId};
    use crate::model::add_obj_node;

    fn wildcard_obj(it: &mut Interp) -> NodeId {
        let env = it.env.clone();
        add_obj_node(&mut it.g, &env, None, JsType::Object, Some(JsValue::Wildcard))
    }

    #[test]
    fn queues_run_to_quiescence() {
        let mut it = Interp::new(Config::default());
        let ctx = Ctx::new(it.env.base_scope);
        // a macrotask that itself schedules a microtask when it runs
        let env = it.env.clone();
        let micro_builtin = crate::model::host::make_builtin(
            &mut it.g,
            &env,
            "queueMicrotask",
            crate::graph::Builtin::QueueMicrotask,
        );
        let cb = wildcard_obj(&mut it);
        it.macro_queue.push_back(Task {
            funcs: vec![micro_builtin],
            args: vec![vec![cb]],
            this_objs: vec![],
        });
        run_queues(&mut it, &ctx);
        assert!(it.macro_queue.is_empty(), "macro queue should drain");
        assert!(
            it.micro_queue.is_empty(),
            "microtask scheduled by a macrotask should run in the same turn"
        );
    }
}
