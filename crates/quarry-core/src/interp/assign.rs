//! Assignment.
//!
//! The right side is evaluated first; a right side that came back empty
//! because a call was skipped aborts the assignment (an unknown value must
//! not read as `undefined`). Prototype pollution is detected here,
//! synchronously: a write through a builtin prototype with attacker-tainted
//! input is recorded and the write itself suppressed.

use tracing::warn;

use crate::ast::AstKind;
use crate::graph::NodeId;
use crate::interp::{dataflow, ops, Ctx, HandleResult, Interp};

pub fn handle_assign(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    let (Some(left), Some(right)) = (it.g.child_at(node, 0), it.g.child_at(node, 1)) else {
        return HandleResult::default();
    };

    let rhs = if matches!(it.g.kind(node), Some(AstKind::AssignOp)) {
        // compound assignment reads the old value through the operator
        ops::binary_of(it, ctx, node, left, right)
    } else {
        it.dispatch(&ctx.child(), right)
    };

    // a skipped call yields "unknown", not "undefined": drop the write
    if rhs.obj_nodes.is_empty() && rhs.terminated {
        return rhs;
    }

    // array destructuring: bind element-wise and stop
    if matches!(it.g.kind(left), Some(AstKind::Array)) {
        return destructure(it, ctx, left, &rhs, right);
    }

    let lhs = it.dispatch(&ctx.lhs(), left);
    do_assign(it, ctx, node, &lhs, &rhs, right)
}

pub fn do_assign(
    it: &mut Interp,
    ctx: &Ctx,
    node: NodeId,
    lhs: &HandleResult,
    rhs: &HandleResult,
    rhs_ast: NodeId,
) -> HandleResult {
    let rhs_objs = it.to_obj_nodes(rhs, Some(rhs_ast));

    if it.config.checks_class("proto_pollution") && lhs.parent_is_proto {
        let rhs_tainted = rhs_objs.iter().any(|&o| it.g.is_tainted(o));
        if lhs.name_tainted || rhs_tainted {
            let lineno = it.g.line_of(node);
            warn!(?lineno, "prototype pollution at assignment");
            it.proto_pollution.push(crate::interp::PollutionSite {
                ast: node,
                lineno,
            });
            // leave the prototype unpolluted so the model stays clean
            return HandleResult {
                obj_nodes: rhs_objs,
                used_objs: rhs.used_objs.clone(),
                ..Default::default()
            };
        }
    }

    for &name_node in &lhs.name_nodes {
        it.g.assign_name_node(name_node, &rhs_objs, true, &ctx.branches);
    }

    let mut used = rhs.used_objs.clone();
    for &k in &lhs.key_objs {
        if !used.contains(&k) {
            used.push(k);
        }
    }
    dataflow::build_df(it, ctx, &used);

    HandleResult {
        obj_nodes: rhs_objs,
        used_objs: used,
        name_nodes: lhs.name_nodes.clone(),
        ..Default::default()
    }
}

/// `[a, b] = rhs`: each pattern element receives the matching numeric
/// member of the right side (or a synthesized wildcard member when the
/// right side is opaque).
fn destructure(
    it: &mut Interp,
    ctx: &Ctx,
    pattern: NodeId,
    rhs: &HandleResult,
    rhs_ast: NodeId,
) -> HandleResult {
    use crate::graph::PropKey;
    use crate::model::{is_wildcard_obj, materialize_prop, probe_prop};

    let rhs_objs = it.to_obj_nodes(rhs, Some(rhs_ast));
    for (index, elem) in it.g.ordered_children(pattern).into_iter().enumerate() {
        let target = match it.g.kind(elem) {
            Some(AstKind::ArrayElem) => it.g.child_at(elem, 0),
            _ => Some(elem),
        };
        let Some(target) = target else { continue };
        let key = PropKey::Str(index.to_string());
        let mut member_objs = Vec::new();
        for &src in &rhs_objs {
            let hit = probe_prop(&it.g, &it.env, src, &key, &ctx.branches, it.config.proto_depth);
            if hit.found() {
                member_objs.extend(hit.objs);
            } else if is_wildcard_obj(&it.g, src) {
                let env = it.env.clone();
                let (_, child) = materialize_prop(&mut it.g, &env, src, key.clone(), &ctx.branches);
                member_objs.push(child);
            }
        }
        if member_objs.is_empty() {
            member_objs.push(it.env.undefined_obj);
        }
        let target_lhs = it.dispatch(&ctx.lhs(), target);
        for &nn in &target_lhs.name_nodes {
            it.g.assign_name_node(nn, &member_objs, true, &ctx.branches);
        }
    }
    HandleResult {
        obj_nodes: rhs_objs,
        used_objs: rhs.used_objs.clone(),
        ..Default::default()
    }
}
