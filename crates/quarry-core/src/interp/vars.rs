//! Identifier reads and writes.
//!
//! Reads walk the scope chain; a read of a missing name yields `undefined`
//! (with a warning, since it usually means the model lost track). Writes
//! only ever create bindings on the left-hand side of an assignment, in the
//! scope their declaration kind calls for.

use tracing::warn;

use crate::ast::flags;
use crate::graph::{EdgeKind, NodeId, PropKey};
use crate::interp::{Ctx, HandleResult, Interp, Side};

pub fn handle_var(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    let Some(name) = it.g.ast(node).and_then(|a| a.code.clone()) else {
        return HandleResult::default();
    };
    if name == "this" && !ctx.this_objs.is_empty() {
        return HandleResult {
            obj_nodes: ctx.this_objs.clone(),
            name: Some(name),
            ..Default::default()
        };
    }

    if let Some((name_node, _)) = it.g.lookup_name(ctx.scope, &name) {
        it.record_lookup(ctx, name_node);
        let mut objs = it.g.bound_objs(name_node, &ctx.branches);
        if objs.is_empty() && ctx.side != Some(Side::Left) {
            objs.push(it.env.undefined_obj);
        }
        return HandleResult {
            obj_nodes: objs,
            name: Some(name),
            name_nodes: vec![name_node],
            ..Default::default()
        };
    }

    if ctx.side == Some(Side::Left) {
        let name_node = declare(it, ctx, node, &name);
        return HandleResult {
            name: Some(name),
            name_nodes: vec![name_node],
            ..Default::default()
        };
    }

    warn!(name, line = ?it.g.line_of(node), "read of undeclared variable");
    HandleResult {
        obj_nodes: vec![it.env.undefined_obj],
        name: Some(name),
        ..Default::default()
    }
}

/// Create the binding a write asked for: `var` hoists to the nearest
/// function scope, `let`/`const` stay in the block, and a bare write lands
/// on the global object.
pub fn declare(it: &mut Interp, ctx: &Ctx, node: NodeId, name: &str) -> NodeId {
    let decl_flags = it.g.ast(node).and_then(|a| a.flags.clone());
    match decl_flags.as_deref() {
        Some(flags::DECL_VAR) => {
            let scope = it.g.ancestor_function_scope(ctx.scope);
            it.g.add_scope_name_node(scope, PropKey::Str(name.into()))
        }
        Some(flags::DECL_LET) | Some(flags::DECL_CONST) => {
            it.g.add_scope_name_node(ctx.scope, PropKey::Str(name.into()))
        }
        _ => {
            // implicit global
            let name_node = it
                .g
                .add_scope_name_node(it.env.base_scope, PropKey::Str(name.into()));
            let global = it.env.global_obj;
            it.g.add_edge_if_not_exist(global, name_node, EdgeKind::ObjToProp);
            name_node
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::graph::{JsType, JsValue};
    use crate::model::add_obj_node;

    fn interp_with_var(name: &str) -> (Interp, Ctx, NodeId) {
        let mut it = Interp::new(Config::default());
        let scope = it.g.add_scope(
            crate::graph::ScopeKind::Function,
            "f".into(),
            None,
            Some(it.env.base_scope),
        );
        let ctx = Ctx::new(scope);
        let env = it.env.clone();
        let obj = add_obj_node(&mut it.g, &env, None, JsType::Number, Some(JsValue::Num(7.0)));
        let nn = it.g.add_scope_name_node(scope, PropKey::Str(name.into()));
        it.g.assign_name_node(nn, &[obj], true, &ctx.branches);
        (it, ctx, obj)
    }

    fn var_node(it: &mut Interp, name: &str) -> NodeId {
        let mut ast = crate::graph::AstNode::new(crate::ast::AstKind::Var);
        ast.code = Some(name.into());
        it.g.add_node(crate::graph::NodeBody::Ast(ast))
    }

    #[test]
    fn read_resolves_through_scope_chain() {
        let (mut it, ctx, obj) = interp_with_var("x");
        let node = var_node(&mut it, "x");
        let r = handle_var(&mut it, &ctx, node);
        assert_eq!(r.obj_nodes, vec![obj]);
        assert_eq!(r.name.as_deref(), Some("x"));
    }

    #[test]
    fn undeclared_read_yields_undefined_without_binding() {
        let (mut it, ctx, _) = interp_with_var("x");
        let node = var_node(&mut it, "nope");
        let r = handle_var(&mut it, &ctx, node);
        assert_eq!(r.obj_nodes, vec![it.env.undefined_obj]);
        assert!(
            it.g.lookup_name(ctx.scope, "nope").is_none(),
            "reads must never create bindings"
        );
    }

    #[test]
    fn lhs_write_of_unknown_name_creates_binding() {
        let (mut it, ctx, _) = interp_with_var("x");
        let node = var_node(&mut it, "fresh");
        let r = handle_var(&mut it, &ctx.lhs(), node);
        assert_eq!(r.name_nodes.len(), 1);
        // bare write: lands on the global side
        assert!(it.g.scope_name_node(it.env.base_scope, "fresh").is_some());
    }
}
