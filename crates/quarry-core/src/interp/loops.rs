//! Loops.
//!
//! A loop with a condition the evaluator cannot resolve runs its body a
//! bounded number of times, each pass under its own branch point so writes
//! stay conditional, folded immediately afterwards. `for-in`/`for-of`
//! iterate the known members of the iteratee; an opaque iteratee yields a
//! single wildcard pass. Loop-variable objects are stamped with iteration
//! tags so sibling passes cannot observe each other's values.

use tracing::debug;

use crate::ast::AstKind;
use crate::branch::{merge, BranchTag, Mark};
use crate::graph::{JsType, JsValue, NodeId, PropKey};
use crate::interp::{cond, func, Ctx, HandleResult, Interp};
use crate::model::{add_obj_node, is_wildcard_obj, PROTO};

pub fn handle_while(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    let (Some(cond_node), Some(body)) = (it.g.child_at(node, 0), it.g.child_at(node, 1)) else {
        return HandleResult::default();
    };
    let is_do_while = matches!(it.g.kind(node), Some(AstKind::DoWhile));
    // a do-while body runs once unconditionally
    if is_do_while {
        func::simurun_block(it, ctx, body, true, false);
    }
    run_conditional_passes(it, ctx, Some(cond_node), body, None);
    HandleResult::default()
}

pub fn handle_for(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    let children = it.g.ordered_children(node);
    let (Some(&init), Some(&cond_node), Some(&update), Some(&body)) = (
        children.first(),
        children.get(1),
        children.get(2),
        children.get(3),
    ) else {
        return HandleResult::default();
    };
    if !matches!(it.g.kind(init), Some(AstKind::Null)) {
        it.dispatch(&ctx.child(), init);
    }
    let cond_node = match it.g.kind(cond_node) {
        Some(AstKind::Null) => None,
        _ => Some(cond_node),
    };
    let update = match it.g.kind(update) {
        Some(AstKind::Null) => None,
        _ => Some(update),
    };
    run_conditional_passes(it, ctx, cond_node, body, update);
    HandleResult::default()
}

/// Shared driver for condition-controlled loops: resolve the condition
/// before each pass, stop when it is surely false or the unroll budget is
/// spent, and tag each unsure pass as its own branch.
fn run_conditional_passes(
    it: &mut Interp,
    ctx: &Ctx,
    cond_node: Option<NodeId>,
    body: NodeId,
    update: Option<NodeId>,
) {
    let limit = it.config.loop_limit.max(1);
    for pass in 0..limit {
        let (p, deterministic) = match cond_node {
            Some(c) => cond::check_condition(it, ctx, c),
            None => (0.5, false),
        };
        if deterministic && p == 0.0 {
            break;
        }
        if deterministic && p == 1.0 {
            func::simurun_block(it, ctx, body, true, false);
        } else {
            let point = it.mint_branch_point();
            let parent = ctx.branches.last_choice();
            let tag = BranchTag::choice(point, 0);
            let bctx = ctx.with_branches(
                ctx.branches
                    .with(tag)
                    .with(tag.with_mark(Mark::Loop)),
            );
            func::simurun_block(it, &bctx, body, true, false);
            if let Some(u) = update {
                it.dispatch(&bctx.child(), u);
            }
            // two slots: body ran, body did not
            merge(&mut it.g, point, 2, parent);
            debug!(pass, "unsure loop pass folded");
            continue;
        }
        if let Some(u) = update {
            it.dispatch(&ctx.child(), u);
        }
    }
}

pub fn handle_foreach(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    let (Some(iteratee), Some(loop_var), Some(body)) = (
        it.g.child_at(node, 0),
        it.g.child_at(node, 1),
        it.g.child_at(node, 2),
    ) else {
        return HandleResult::default();
    };
    let for_in = it
        .g
        .ast(node)
        .and_then(|a| a.flags.as_deref().map(|f| f == "for-in"))
        .unwrap_or(false);

    let iter_res = it.dispatch(&ctx.child(), iteratee);
    let iter_objs = it.to_obj_nodes(&iter_res, Some(iteratee));

    // gather one (key, values) pair per own member
    let mut entries: Vec<(String, Vec<NodeId>)> = Vec::new();
    let mut any_wildcard = false;
    for &obj in &iter_objs {
        if is_wildcard_obj(&it.g, obj) {
            any_wildcard = true;
        }
        for name_node in it.g.prop_name_nodes(obj) {
            let Some(nn) = it.g.name_node(name_node) else {
                continue;
            };
            let key = nn.name.as_str().to_string();
            if key == PROTO || key == "*" {
                continue;
            }
            let objs = it.g.bound_objs(name_node, &ctx.branches);
            entries.push((key, objs));
        }
    }

    let point = it.mint_branch_point();
    let parent = ctx.branches.last_choice();
    let limit = it.config.loop_limit.max(1) as usize;
    let env = it.env.clone();
    let mut passes: u32 = 0;

    for (i, (key, member_objs)) in entries.into_iter().take(limit).enumerate() {
        let tag = BranchTag::choice(point, i as u32);
        let branches = ctx
            .branches
            .with(tag)
            .with(tag.with_mark(Mark::Loop));
        let value_obj = if for_in {
            add_obj_node(
                &mut it.g,
                &env,
                Some(node),
                JsType::String,
                Some(JsValue::Str(key)),
            )
        } else {
            // for-of binds the member objects themselves; several collapse
            // into one pass
            member_objs.first().copied().unwrap_or(it.env.undefined_obj)
        };
        if for_in {
            if let Some(o) = it.g.obj_mut(value_obj) {
                o.for_tags = vec![tag.with_mark(Mark::LoopCreated)];
            }
        }
        bind_loop_var(it, ctx, loop_var, value_obj, &branches);
        let bctx = ctx.with_branches(branches);
        func::simurun_block(it, &bctx, body, true, false);
        passes += 1;
    }

    if any_wildcard {
        let tag = BranchTag::choice(point, passes);
        let branches = ctx.branches.with(tag).with(tag.with_mark(Mark::Loop));
        let value_obj = add_obj_node(
            &mut it.g,
            &env,
            Some(node),
            if for_in { JsType::String } else { JsType::Object },
            Some(JsValue::Wildcard),
        );
        let iter_tainted = iter_objs.iter().any(|&o| it.g.is_tainted(o));
        if let Some(o) = it.g.obj_mut(value_obj) {
            o.tainted = iter_tainted;
            o.for_tags = vec![tag.with_mark(Mark::LoopCreated)];
        }
        bind_loop_var(it, ctx, loop_var, value_obj, &branches);
        let bctx = ctx.with_branches(branches);
        func::simurun_block(it, &bctx, body, true, false);
        passes += 1;
    }

    if passes > 0 {
        // one extra slot: the collection may be empty
        merge(&mut it.g, point, passes + 1, parent);
    }
    HandleResult {
        used_objs: iter_objs,
        ..Default::default()
    }
}

fn bind_loop_var(
    it: &mut Interp,
    ctx: &Ctx,
    loop_var: NodeId,
    value_obj: NodeId,
    branches: &crate::branch::BranchPath,
) {
    let name = it.g.ast(loop_var).and_then(|a| a.code.clone());
    let Some(name) = name else { return };
    let name_node = match it.g.lookup_name(ctx.scope, &name) {
        Some((nn, _)) => nn,
        None => it.g.add_scope_name_node(ctx.scope, PropKey::Str(name)),
    };
    it.g.assign_name_node(name_node, &[value_obj], true, branches);
}
