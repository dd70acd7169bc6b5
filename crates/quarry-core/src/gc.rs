//! Scope reclamation.
//!
//! When a block scope ends, objects reachable only through it can be
//! dropped. An object survives if anything outside the closing scope still
//! refers to it: a binding in another scope, a property of a surviving
//! object, or membership in the enclosing function's return set. The scope
//! node itself stays so parent-scope chains held by closures remain intact.

use std::collections::HashSet;

use tracing::debug;

use crate::graph::{EdgeKind, Graph, NodeId};

/// Remove the scope's bindings and any objects that were private to it.
pub fn cleanup_scope(g: &mut Graph, scope: NodeId, exceptions: &[NodeId]) {
    let scope_names = g.scope_name_nodes(scope);

    // everything reachable from the scope's bindings, names and objects both
    let mut inside_names: HashSet<NodeId> = HashSet::new();
    let mut inside_objs: HashSet<NodeId> = HashSet::new();
    let mut frontier: Vec<NodeId> = scope_names.clone();
    while let Some(nn) = frontier.pop() {
        if !inside_names.insert(nn) {
            continue;
        }
        for obj in g.successors(nn, EdgeKind::NameToObj) {
            if inside_objs.insert(obj) {
                frontier.extend(g.prop_name_nodes(obj));
            }
        }
    }

    let mut removed = 0usize;
    for &obj in &inside_objs {
        if exceptions.contains(&obj) {
            continue;
        }
        let escapes = g.predecessors(obj, EdgeKind::NameToObj).iter().any(|&nn| {
            if let Some(&owner) = g.predecessors(nn, EdgeKind::ScopeToVar).first() {
                return owner != scope;
            }
            if let Some(&owner) = g.predecessors(nn, EdgeKind::ObjToProp).first() {
                return !inside_objs.contains(&owner);
            }
            // a name node nothing owns cannot keep an object alive
            false
        });
        if !escapes {
            g.remove_node(obj);
            removed += 1;
        }
    }
    for nn in scope_names {
        g.remove_node(nn);
    }
    debug!(scope = scope.index(), removed, "scope cleaned up");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::BranchPath;
    use crate::graph::{JsType, PropKey, ScopeKind};
    use crate::model::host::setup_host;
    use crate::model::add_obj_node;

    #[test]
    fn private_objects_are_collected() {
        let mut g = Graph::new();
        let env = setup_host(&mut g);
        let block = g.add_scope(ScopeKind::Block, "Block".into(), None, Some(env.base_scope));
        let obj = add_obj_node(&mut g, &env, None, JsType::Object, None);
        let nn = g.add_scope_name_node(block, PropKey::Str("tmp".into()));
        g.assign_name_node(nn, &[obj], true, &BranchPath::new());

        cleanup_scope(&mut g, block, &[]);
        assert!(g.is_removed(obj), "block-private object should be collected");
        assert!(g.is_removed(nn), "the binding should go with the scope");
    }

    #[test]
    fn escaping_objects_survive() {
        let mut g = Graph::new();
        let env = setup_host(&mut g);
        let block = g.add_scope(ScopeKind::Block, "Block".into(), None, Some(env.base_scope));
        let obj = add_obj_node(&mut g, &env, None, JsType::Object, None);
        let inner = g.add_scope_name_node(block, PropKey::Str("tmp".into()));
        g.assign_name_node(inner, &[obj], true, &BranchPath::new());
        // an outer binding to the same object
        let outer = g.add_scope_name_node(env.base_scope, PropKey::Str("kept".into()));
        g.assign_name_node(outer, &[obj], true, &BranchPath::new());

        cleanup_scope(&mut g, block, &[]);
        assert!(!g.is_removed(obj), "object bound outside the scope must survive");
    }

    #[test]
    fn returned_objects_survive() {
        let mut g = Graph::new();
        let env = setup_host(&mut g);
        let block = g.add_scope(ScopeKind::Block, "Block".into(), None, Some(env.base_scope));
        let obj = add_obj_node(&mut g, &env, None, JsType::Object, None);
        let nn = g.add_scope_name_node(block, PropKey::Str("tmp".into()));
        g.assign_name_node(nn, &[obj], true, &BranchPath::new());

        cleanup_scope(&mut g, block, &[obj]);
        assert!(!g.is_removed(obj), "returned object must survive collection");
    }
}
