//! `if`/`else` chains, ternaries, and `switch`.
//!
//! A deterministic condition commits to one arm. Anything else runs every
//! feasible arm under its own branch tag and folds the tagged writes into
//! the enclosing branch afterwards. An `if` without `else` still reserves a
//! branch slot for the untaken side, so a deletion inside the only arm
//! cannot masquerade as unconditional.

use crate::ast::AstKind;
use crate::branch::{merge, BranchTag};
use crate::graph::NodeId;
use crate::interp::{cond, func, Ctx, HandleResult, Interp};

pub fn handle_if(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    let point = it.mint_branch_point();
    let parent = ctx.branches.last_choice();
    let mut branch_count: u32 = 0;
    let mut else_is_deterministic = true;
    let elems = it.g.ordered_children(node);

    for elem in elems {
        // control flow restarts from the if statement for every arm
        it.cfg_stmt = Some(node);
        let (Some(cond_node), Some(body)) = (it.g.child_at(elem, 0), it.g.child_at(elem, 1))
        else {
            continue;
        };
        if matches!(it.g.kind(cond_node), Some(AstKind::Null)) {
            // else arm
            if else_is_deterministic || it.config.single_branch {
                func::simurun_block(it, ctx, body, true, false);
            } else {
                let tag = BranchTag::choice(point, branch_count);
                branch_count += 1;
                let bctx = ctx.with_branches(ctx.branches.with(tag));
                func::simurun_block(it, &bctx, body, true, false);
            }
            break;
        }
        let (p, deterministic) = cond::check_condition(it, ctx, cond_node);
        if deterministic && p == 1.0 {
            func::simurun_block(it, ctx, body, true, false);
            break;
        } else if deterministic && p == 0.0 {
            continue;
        } else if it.config.single_branch {
            func::simurun_block(it, ctx, body, true, false);
        } else {
            else_is_deterministic = false;
            let tag = BranchTag::choice(point, branch_count);
            branch_count += 1;
            let bctx = ctx.with_branches(ctx.branches.with(tag));
            func::simurun_block(it, &bctx, body, true, false);
        }
    }

    if !has_else(it, node) {
        branch_count += 1;
    }
    if !it.config.single_branch {
        merge(&mut it.g, point, branch_count, parent);
    }
    HandleResult::default()
}

fn has_else(it: &Interp, node: NodeId) -> bool {
    it.g
        .ordered_children(node)
        .last()
        .and_then(|&elem| it.g.child_at(elem, 0))
        .is_some_and(|c| matches!(it.g.kind(c), Some(AstKind::Null)))
}

/// Dispatched when an arm is reached directly: hoist its declarations.
pub fn handle_if_elem(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    if let Some(body) = it.g.child_at(node, 1) {
        func::decl_vars_and_funcs(it, ctx, body, false);
    }
    HandleResult::default()
}

pub fn handle_conditional(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    let (Some(test), Some(consequent), Some(alternate)) = (
        it.g.child_at(node, 0),
        it.g.child_at(node, 1),
        it.g.child_at(node, 2),
    ) else {
        return HandleResult::default();
    };
    let (p, deterministic) = cond::check_condition(it, ctx, test);
    if deterministic && p == 1.0 {
        it.dispatch(&ctx.child(), consequent)
    } else if deterministic && p == 0.0 {
        it.dispatch(&ctx.child(), alternate)
    } else {
        let a = it.dispatch(&ctx.child(), consequent);
        let b = it.dispatch(&ctx.child(), alternate);
        let mut out = a;
        for o in b.obj_nodes {
            if !out.obj_nodes.contains(&o) {
                out.obj_nodes.push(o);
            }
        }
        out.values.extend(b.values);
        out.value_sources.extend(b.value_sources);
        for o in b.used_objs {
            if !out.used_objs.contains(&o) {
                out.used_objs.push(o);
            }
        }
        out.name_nodes.extend(b.name_nodes);
        out.terminated |= b.terminated;
        out
    }
}

/// `switch` reuses the branch algebra: each case whose match is possible
/// runs as one arm; the default (or its absence) takes the last slot.
pub fn handle_switch(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    let (Some(disc), Some(case_list)) = (it.g.child_at(node, 0), it.g.child_at(node, 1)) else {
        return HandleResult::default();
    };
    let disc_res = it.dispatch(&ctx.child(), disc);
    let point = it.mint_branch_point();
    let parent = ctx.branches.last_choice();
    let mut branch_count: u32 = 0;
    let mut matched_deterministically = false;
    let mut saw_default = false;

    for case in it.g.ordered_children(case_list) {
        if matched_deterministically {
            break;
        }
        let (Some(test), Some(body)) = (it.g.child_at(case, 0), it.g.child_at(case, 1)) else {
            continue;
        };
        it.cfg_stmt = Some(node);
        let is_default = matches!(it.g.kind(test), Some(AstKind::Null));
        let (p, deterministic) = if is_default {
            saw_default = true;
            (0.5, false)
        } else {
            let test_res = it.dispatch(&ctx.child(), test);
            cond::compare_results(it, "===", &disc_res, &test_res)
        };
        if deterministic && p == 0.0 {
            continue;
        }
        if deterministic && p == 1.0 {
            func::simurun_block(it, ctx, body, true, false);
            matched_deterministically = true;
            break;
        }
        let tag = BranchTag::choice(point, branch_count);
        branch_count += 1;
        let bctx = ctx.with_branches(ctx.branches.with(tag));
        func::simurun_block(it, &bctx, body, true, false);
    }

    if !matched_deterministically && !saw_default {
        // no case may match at all
        branch_count += 1;
    }
    if !it.config.single_branch {
        merge(&mut it.g, point, branch_count, parent);
    }
    HandleResult::default()
}
