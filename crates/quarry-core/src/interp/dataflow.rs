//! Dataflow edge construction.
//!
//! Two edge families carry taint to the checker: `CONTRIBUTES_TO` relates
//! objects (operands to results), `OBJ_REACHES` relates statements (an
//! object's definition site to a statement that consumed it, carrying the
//! object).

use crate::graph::{EdgeKind, NodeId};
use crate::interp::{Ctx, Interp};
use crate::model::is_wildcard_obj;

/// Wire `sources -> target` dependency edges and chain taint through them.
pub fn add_contributes_to(it: &mut Interp, sources: &[NodeId], target: NodeId) {
    let mut tainted = false;
    for &src in sources {
        if src == target {
            continue;
        }
        it.g.add_edge_if_not_exist(src, target, EdgeKind::ContributesTo);
        tainted |= it.g.is_tainted(src);
    }
    if tainted {
        if let Some(o) = it.g.obj_mut(target) {
            o.tainted = true;
        }
    }
}

/// Emit `OBJ_REACHES` edges from the definition statement of every used
/// object to the current statement. Wildcard members also pull in the
/// objects they were read off, since their identity is a guess.
pub fn build_df(it: &mut Interp, ctx: &Ctx, used_objs: &[NodeId]) {
    let Some(cur_stmt) = ctx.stmt else {
        return;
    };
    let mut worklist: Vec<NodeId> = Vec::new();
    for &obj in used_objs {
        if !worklist.contains(&obj) {
            worklist.push(obj);
        }
        if is_wildcard_obj(&it.g, obj) {
            for parent in member_parents(it, obj) {
                if !worklist.contains(&parent) {
                    worklist.push(parent);
                }
            }
        }
    }
    for obj in worklist {
        for def_ast in it.g.successors(obj, EdgeKind::ObjToAst) {
            let Some(def_stmt) = it.g.nearest_stmt(def_ast) else {
                continue;
            };
            if def_stmt == cur_stmt {
                continue;
            }
            let dup = it
                .g
                .edges_between(def_stmt, cur_stmt, EdgeKind::ObjReaches)
                .into_iter()
                .any(|e| it.g.edge(e).obj == Some(obj));
            if !dup {
                it.g.add_edge_with(def_stmt, cur_stmt, EdgeKind::ObjReaches, None, Some(obj));
            }
        }
    }
}

/// Objects that hold `obj` as a property.
fn member_parents(it: &Interp, obj: NodeId) -> Vec<NodeId> {
    let mut parents = Vec::new();
    for name_node in it.g.predecessors(obj, EdgeKind::NameToObj) {
        for parent in it.g.predecessors(name_node, EdgeKind::ObjToProp) {
            if !parents.contains(&parent) {
                parents.push(parent);
            }
        }
    }
    parents
}
