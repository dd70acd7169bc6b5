//! Literals, template strings, and array/object literals.

use tracing::warn;

use crate::ast::{flags, AstKind};
use crate::graph::{JsType, JsValue, NodeId, PropKey};
use crate::interp::{dataflow, Ctx, HandleResult, Interp};
use crate::model::add_obj_node;

pub fn handle_literal(it: &mut Interp, _ctx: &Ctx, node: NodeId) -> HandleResult {
    let Some(ast) = it.g.ast(node) else {
        return HandleResult::default();
    };
    let code = ast.code.clone();
    match ast.kind {
        AstKind::Str => HandleResult::of_value(JsValue::Str(code.unwrap_or_default()), vec![]),
        AstKind::Integer | AstKind::Double => {
            let parsed = code.as_deref().and_then(|c| c.parse::<f64>().ok());
            match parsed {
                Some(n) => HandleResult::of_value(JsValue::Num(n), vec![]),
                None => {
                    warn!(?code, "unparseable numeric literal, degrading to wildcard");
                    HandleResult::of_value(JsValue::Wildcard, vec![])
                }
            }
        }
        AstKind::Null => HandleResult::of_objs(vec![it.env.null_obj]),
        _ => HandleResult::default(),
    }
}

/// Template string: concatenation over the value cross-product of its
/// parts. One wildcard part poisons the whole string.
pub fn handle_encaps_list(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    let mut values = vec![JsValue::Str(String::new())];
    let mut sources: Vec<Vec<NodeId>> = vec![Vec::new()];
    let mut used = Vec::new();
    for part in it.g.ordered_children(node) {
        let r = it.dispatch(&ctx.child(), part);
        let (part_values, part_sources) = it.to_values(&r);
        for &o in &r.obj_nodes {
            if !used.contains(&o) {
                used.push(o);
            }
        }
        for &o in &r.used_objs {
            if !used.contains(&o) {
                used.push(o);
            }
        }
        let mut next_values = Vec::new();
        let mut next_sources = Vec::new();
        for (acc, acc_src) in values.iter().zip(&sources) {
            for (pv, psrc) in part_values.iter().zip(&part_sources) {
                let combined = match (acc, super::ops::coerce_str(pv)) {
                    (JsValue::Str(a), Some(b)) => JsValue::Str(format!("{a}{b}")),
                    _ => JsValue::Wildcard,
                };
                let mut src = acc_src.clone();
                src.extend(psrc.iter().copied());
                next_values.push(combined);
                next_sources.push(src);
            }
        }
        if !next_values.is_empty() {
            values = next_values;
            sources = next_sources;
        }
    }
    HandleResult {
        values,
        value_sources: sources,
        used_objs: used,
        ..Default::default()
    }
}

/// Array and object literals share a kind; the flag tells them apart. Each
/// element becomes an own property of the fresh container.
pub fn handle_array(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    let is_object = it
        .g
        .ast(node)
        .and_then(|a| a.flags.as_deref().map(|f| f == flags::OBJECT_LIT))
        .unwrap_or(false);
    let js_type = if is_object {
        JsType::Object
    } else {
        JsType::Array
    };
    let env = it.env.clone();
    let container = add_obj_node(&mut it.g, &env, Some(node), js_type, None);
    let loop_tags = ctx.branches.loop_tags();
    if !loop_tags.is_empty() {
        if let Some(o) = it.g.obj_mut(container) {
            o.for_tags = loop_tags;
        }
    }

    for (index, elem) in it.g.ordered_children(node).into_iter().enumerate() {
        if !matches!(it.g.kind(elem), Some(AstKind::ArrayElem)) {
            continue;
        }
        let value_node = it.g.child_at(elem, 0);
        let key_node = it.g.child_at(elem, 1);
        let key = match key_node.and_then(|k| it.g.ast(k)).and_then(|a| a.code.clone()) {
            Some(k) => PropKey::Str(k),
            None => PropKey::Str(index.to_string()),
        };
        let Some(value_node) = value_node else { continue };
        let r = it.dispatch(&ctx.child(), value_node);
        let value_objs = it.to_obj_nodes(&r, Some(value_node));
        let name_node = match &key {
            PropKey::Str(s) => it.g.prop_name_node(container, s),
            PropKey::Wildcard => None,
        }
        .unwrap_or_else(|| it.g.add_prop_name_node(container, key));
        it.g.assign_name_node(name_node, &value_objs, true, &ctx.branches);
        dataflow::add_contributes_to(it, &value_objs, container);
    }
    HandleResult::of_objs(vec![container])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::graph::{AstNode, NodeBody};

    fn lit(it: &mut Interp, kind: AstKind, code: &str) -> NodeId {
        let mut ast = AstNode::new(kind);
        ast.code = Some(code.into());
        it.g.add_node(NodeBody::Ast(ast))
    }

    #[test]
    fn literals_become_values_not_objects() {
        let mut it = Interp::new(Config::default());
        let ctx = Ctx::new(it.env.base_scope);
        let n = lit(&mut it, AstKind::Integer, "42");
        let r = handle_literal(&mut it, &ctx, n);
        assert_eq!(r.values, vec![JsValue::Num(42.0)]);
        assert!(r.obj_nodes.is_empty(), "literals stay lazy until bound");
    }

    #[test]
    fn bad_number_degrades_to_wildcard() {
        let mut it = Interp::new(Config::default());
        let ctx = Ctx::new(it.env.base_scope);
        let n = lit(&mut it, AstKind::Integer, "0xnope!");
        let r = handle_literal(&mut it, &ctx, n);
        assert_eq!(r.values, vec![JsValue::Wildcard]);
    }
}
