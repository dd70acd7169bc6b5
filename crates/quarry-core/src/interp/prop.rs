//! Property access (`a.b` and `a[b]`).
//!
//! Reads probe the prototype chain without mutating anything; what a miss
//! does depends on the side and on the parent. A left-hand-side miss lays
//! down an own name node; a read off a wildcard parent synthesizes a
//! wildcard member (inheriting taint); a read off a concrete parent is just
//! `undefined`.

use crate::ast::AstKind;
use crate::graph::{JsType, JsValue, NodeId, PropKey};
use crate::interp::{Ctx, HandleResult, Interp, Side};
use crate::model::{
    add_obj_node, is_builtin_proto, is_wildcard_obj, materialize_prop, probe_prop,
};

pub fn handle_prop(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    let Some(parent_node) = it.g.child_at(node, 0) else {
        return HandleResult::default();
    };
    let Some(key_node) = it.g.child_at(node, 1) else {
        return HandleResult::default();
    };

    let parent_res = it.dispatch(&ctx.child(), parent_node);
    if parent_res.terminated && parent_res.is_empty() {
        return HandleResult::terminated();
    }
    let mut parent_objs = it.to_obj_nodes(&parent_res, Some(parent_node));

    // reading a member off `undefined` is an anomaly; replace the parent
    // with a fresh wildcard object so the walk can continue
    if parent_objs == vec![it.env.undefined_obj] && !parent_res.name_nodes.is_empty() {
        let env = it.env.clone();
        let substitute = add_obj_node(&mut it.g, &env, None, JsType::Object, Some(JsValue::Wildcard));
        for &nn in &parent_res.name_nodes {
            it.g.assign_name_node(nn, &[substitute], true, &ctx.branches);
        }
        parent_objs = vec![substitute];
    }

    let (keys, key_objs, name_tainted) = resolve_keys(it, ctx, key_node);
    let parent_is_proto = parent_objs.iter().any(|&o| is_builtin_proto(&it.env, o));

    let mut result = HandleResult {
        parent_objs: parent_objs.clone(),
        key_objs,
        parent_is_proto,
        name_tainted: name_tainted || parent_res.name_tainted,
        ..Default::default()
    };
    result.used_objs = parent_res.used_objs.clone();
    for &o in &parent_objs {
        if !result.used_objs.contains(&o) {
            result.used_objs.push(o);
        }
    }
    if let (Some(base), Some(key)) = (parent_res.name.as_deref(), keys.first()) {
        result.name = Some(format!("{base}.{}", key.as_str()));
    } else if let Some(key) = keys.first() {
        result.name = Some(key.as_str().to_string());
    }

    let depth = it.config.proto_depth;
    for &parent in &parent_objs {
        for key in &keys {
            let hit = probe_prop(&it.g, &it.env, parent, key, &ctx.branches, depth);
            let found = hit.found();
            for nn in hit.name_nodes {
                if !result.name_nodes.contains(&nn) {
                    it.record_lookup(ctx, nn);
                    result.name_nodes.push(nn);
                }
            }
            for o in hit.objs {
                if !result.obj_nodes.contains(&o) {
                    result.obj_nodes.push(o);
                }
            }
            if !found && ctx.side == Some(Side::Left) {
                let name_node = match key {
                    PropKey::Str(s) => it.g.prop_name_node(parent, s),
                    PropKey::Wildcard => None,
                }
                .unwrap_or_else(|| it.g.add_prop_name_node(parent, key.clone()));
                result.name_nodes.push(name_node);
                continue;
            }
            if ctx.side == Some(Side::Left) || !is_wildcard_obj(&it.g, parent) {
                continue;
            }
            // an opaque parent can always hold one more member: a concrete
            // key synthesizes on a miss, the wildcard key synthesizes once
            // even when matching props exist
            let synthesize = match key {
                PropKey::Wildcard => !has_own_wildcard_member(it, parent),
                PropKey::Str(_) => !found,
            };
            if synthesize {
                let env = it.env.clone();
                let (name_node, child) =
                    materialize_prop(&mut it.g, &env, parent, key.clone(), &ctx.branches);
                it.record_lookup(ctx, name_node);
                result.name_nodes.push(name_node);
                result.obj_nodes.push(child);
            }
        }
    }

    if result.obj_nodes.is_empty() && ctx.side != Some(Side::Left) {
        result.obj_nodes.push(it.env.undefined_obj);
    }
    result
}

fn has_own_wildcard_member(it: &Interp, obj: NodeId) -> bool {
    it.g.prop_name_nodes(obj).into_iter().any(|nn| {
        it.g
            .name_node(nn)
            .is_some_and(|n| matches!(n.name, PropKey::Wildcard))
    })
}

/// Compute the property keys a member expression refers to. A static key is
/// its string; a computed key is evaluated, and any unresolvable value
/// widens to the wildcard key. The key path is tainted when any value it
/// was computed from is.
fn resolve_keys(
    it: &mut Interp,
    ctx: &Ctx,
    key_node: NodeId,
) -> (Vec<PropKey>, Vec<NodeId>, bool) {
    if matches!(it.g.kind(key_node), Some(AstKind::Str)) {
        let key = it
            .g
            .ast(key_node)
            .and_then(|a| a.code.clone())
            .unwrap_or_default();
        return (vec![PropKey::Str(key)], Vec::new(), false);
    }
    let r = it.dispatch(&ctx.child(), key_node);
    let (values, sources) = it.to_values(&r);
    let mut keys = Vec::new();
    let mut tainted = r.name_tainted;
    for (value, srcs) in values.iter().zip(&sources) {
        let key = match value {
            JsValue::Str(s) => PropKey::Str(s.clone()),
            JsValue::Num(n) => PropKey::Str(n.to_string()),
            JsValue::Bool(b) => PropKey::Str(b.to_string()),
            JsValue::Undefined => PropKey::Str("undefined".into()),
            JsValue::Null => PropKey::Str("null".into()),
            JsValue::Wildcard => PropKey::Wildcard,
        };
        if !keys.contains(&key) {
            keys.push(key);
        }
        tainted |= srcs.iter().any(|&s| it.g.is_tainted(s));
    }
    if keys.is_empty() {
        keys.push(PropKey::Wildcard);
    }
    (keys, r.obj_nodes, tainted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::graph::{AstNode, NodeBody, PropKey};
    use crate::model::set_single_prop;

    fn member(it: &mut Interp, base: &str, key: &str) -> NodeId {
        let prop = it.g.add_node(NodeBody::Ast(AstNode::new(AstKind::Prop)));
        let mut var = AstNode::new(AstKind::Var);
        var.code = Some(base.into());
        var.childnum = Some(0);
        let var = it.g.add_node(NodeBody::Ast(var));
        let mut k = AstNode::new(AstKind::Str);
        k.code = Some(key.into());
        k.childnum = Some(1);
        let k = it.g.add_node(NodeBody::Ast(k));
        it.g.add_edge(prop, var, crate::graph::EdgeKind::ParentOf);
        it.g.add_edge(prop, k, crate::graph::EdgeKind::ParentOf);
        prop
    }

    fn bind_obj(it: &mut Interp, scope: NodeId, name: &str, obj: NodeId) {
        let nn = it.g.add_scope_name_node(scope, PropKey::Str(name.into()));
        it.g.assign_name_node(nn, &[obj], true, &crate::branch::BranchPath::new());
    }

    #[test]
    fn read_of_wildcard_member_synthesizes_tainted_child() {
        let mut it = Interp::new(Config::default());
        let ctx = Ctx::new(it.env.base_scope);
        let env = it.env.clone();
        let parent = add_obj_node(&mut it.g, &env, None, JsType::Object, Some(JsValue::Wildcard));
        it.g.obj_mut(parent).unwrap().tainted = true;
        let base_scope = it.env.base_scope;
        bind_obj(&mut it, base_scope, "req", parent);
        let node = member(&mut it, "req", "body");
        let r = handle_prop(&mut it, &ctx, node);
        assert_eq!(r.obj_nodes.len(), 1);
        assert!(it.g.is_tainted(r.obj_nodes[0]));
        // second read sees the same member, no fresh synthesis
        let r2 = handle_prop(&mut it, &ctx, node);
        assert_eq!(r2.obj_nodes, r.obj_nodes);
    }

    #[test]
    fn lhs_miss_creates_name_node_but_no_object() {
        let mut it = Interp::new(Config::default());
        let ctx = Ctx::new(it.env.base_scope);
        let env = it.env.clone();
        let parent = add_obj_node(&mut it.g, &env, None, JsType::Object, None);
        let base_scope = it.env.base_scope;
        bind_obj(&mut it, base_scope, "o", parent);
        let node = member(&mut it, "o", "fresh");
        let r = handle_prop(&mut it, &ctx.lhs(), node);
        assert_eq!(r.name_nodes.len(), 1);
        assert!(r.obj_nodes.is_empty());
        assert!(it.g.prop_name_node(parent, "fresh").is_some());
    }

    #[test]
    fn proto_member_parent_is_flagged() {
        let mut it = Interp::new(Config::default());
        let ctx = Ctx::new(it.env.base_scope);
        let env = it.env.clone();
        let parent = add_obj_node(&mut it.g, &env, None, JsType::Object, None);
        let base_scope = it.env.base_scope;
        bind_obj(&mut it, base_scope, "o", parent);
        // o.__proto__ resolves to Object.prototype
        let inner = member(&mut it, "o", "__proto__");
        let r = handle_prop(&mut it, &ctx, inner);
        assert_eq!(r.obj_nodes, vec![it.env.object_proto]);

        // writing through it flags the builtin-prototype parent
        let outer = it.g.add_node(NodeBody::Ast(AstNode::new(AstKind::Prop)));
        it.g.ast_mut(inner).unwrap().childnum = Some(0);
        let mut k = AstNode::new(AstKind::Str);
        k.code = Some("polluted".into());
        k.childnum = Some(1);
        let k = it.g.add_node(NodeBody::Ast(k));
        it.g.add_edge(outer, inner, crate::graph::EdgeKind::ParentOf);
        it.g.add_edge(outer, k, crate::graph::EdgeKind::ParentOf);
        let r = handle_prop(&mut it, &ctx.lhs(), outer);
        assert!(r.parent_is_proto);
        assert_eq!(r.name_nodes.len(), 1);
    }

    #[test]
    fn missing_member_of_concrete_object_is_undefined() {
        let mut it = Interp::new(Config::default());
        let ctx = Ctx::new(it.env.base_scope);
        let env = it.env.clone();
        let parent = add_obj_node(&mut it.g, &env, None, JsType::Object, None);
        let val = add_obj_node(&mut it.g, &env, None, JsType::Number, Some(JsValue::Num(1.0)));
        set_single_prop(&mut it.g, parent, PropKey::Str("a".into()), val);
        let base_scope = it.env.base_scope;
        bind_obj(&mut it, base_scope, "o", parent);
        let node = member(&mut it, "o", "b");
        let r = handle_prop(&mut it, &ctx, node);
        assert_eq!(r.obj_nodes, vec![it.env.undefined_obj]);
        assert!(
            it.g.prop_name_node(parent, "b").is_none(),
            "reads off concrete objects must not materialize members"
        );
    }
}
