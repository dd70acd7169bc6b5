//! Operators.
//!
//! Binary operators work over the cross-product of both sides' possible
//! values; one wildcard operand poisons every combination it touches. The
//! result stays a value (with its source objects) until something binds it.

use crate::graph::{JsValue, NodeId};
use crate::interp::{cond, Ctx, HandleResult, Interp};

const CROSS_PRODUCT_CAP: usize = 64;

pub fn handle_binary(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    let (Some(left), Some(right)) = (it.g.child_at(node, 0), it.g.child_at(node, 1)) else {
        return HandleResult::default();
    };
    binary_of(it, ctx, node, left, right)
}

/// Evaluate `left <op> right` where the operator is the node's flag.
pub fn binary_of(
    it: &mut Interp,
    ctx: &Ctx,
    node: NodeId,
    left: NodeId,
    right: NodeId,
) -> HandleResult {
    let op = it
        .g
        .ast(node)
        .and_then(|a| a.flags.clone())
        .unwrap_or_default();
    let lres = it.dispatch(&ctx.child(), left);
    let rres = it.dispatch(&ctx.child(), right);
    if (lres.terminated && lres.is_empty()) || (rres.terminated && rres.is_empty()) {
        return HandleResult::terminated();
    }

    let mut used = lres.used_objs.clone();
    for &o in rres
        .used_objs
        .iter()
        .chain(lres.obj_nodes.iter())
        .chain(rres.obj_nodes.iter())
    {
        if !used.contains(&o) {
            used.push(o);
        }
    }

    match op.as_str() {
        "&&" | "||" | "??" => {
            // either operand may be the result
            let mut r = HandleResult {
                obj_nodes: lres.obj_nodes.clone(),
                values: lres.values.clone(),
                value_sources: lres.value_sources.clone(),
                used_objs: used,
                ..Default::default()
            };
            for o in rres.obj_nodes {
                if !r.obj_nodes.contains(&o) {
                    r.obj_nodes.push(o);
                }
            }
            r.values.extend(rres.values);
            r.value_sources.extend(rres.value_sources);
            r
        }
        "==" | "===" | "!=" | "!==" | "<" | "<=" | ">" | ">=" => {
            let (p, deterministic) = cond::compare_results(it, &op, &lres, &rres);
            let objs = if deterministic && p == 1.0 {
                vec![it.env.true_obj]
            } else if deterministic && p == 0.0 {
                vec![it.env.false_obj]
            } else {
                vec![it.env.true_obj, it.env.false_obj]
            };
            HandleResult {
                obj_nodes: objs,
                used_objs: used,
                ..Default::default()
            }
        }
        _ => {
            let (lv, ls) = it.to_values(&lres);
            let (rv, rs) = it.to_values(&rres);
            let mut values = Vec::new();
            let mut sources = Vec::new();
            'outer: for (a, asrc) in lv.iter().zip(&ls) {
                for (b, bsrc) in rv.iter().zip(&rs) {
                    if values.len() >= CROSS_PRODUCT_CAP {
                        values.push(JsValue::Wildcard);
                        sources.push(Vec::new());
                        break 'outer;
                    }
                    values.push(apply_arith(&op, a, b));
                    let mut src = asrc.clone();
                    src.extend(bsrc.iter().copied());
                    sources.push(src);
                }
            }
            if values.is_empty() {
                values.push(JsValue::Wildcard);
                sources.push(Vec::new());
            }
            HandleResult {
                values,
                value_sources: sources,
                used_objs: used,
                ..Default::default()
            }
        }
    }
}

fn apply_arith(op: &str, a: &JsValue, b: &JsValue) -> JsValue {
    match op {
        "+" => match (coerce_num(a), coerce_num(b)) {
            (Some(x), Some(y))
                if !matches!(a, JsValue::Str(_)) && !matches!(b, JsValue::Str(_)) =>
            {
                JsValue::Num(x + y)
            }
            _ => match (coerce_str(a), coerce_str(b)) {
                (Some(x), Some(y)) => JsValue::Str(format!("{x}{y}")),
                _ => JsValue::Wildcard,
            },
        },
        "-" | "*" | "/" | "%" => match (coerce_num(a), coerce_num(b)) {
            (Some(x), Some(y)) => JsValue::Num(match op {
                "-" => x - y,
                "*" => x * y,
                "/" => x / y,
                _ => x % y,
            }),
            _ => JsValue::Wildcard,
        },
        _ => JsValue::Wildcard,
    }
}

pub fn coerce_num(v: &JsValue) -> Option<f64> {
    match v {
        JsValue::Num(n) => Some(*n),
        JsValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        JsValue::Null => Some(0.0),
        JsValue::Str(s) => {
            if s.trim().is_empty() {
                Some(0.0)
            } else {
                s.trim().parse::<f64>().ok()
            }
        }
        JsValue::Undefined => Some(f64::NAN),
        JsValue::Wildcard => None,
    }
}

pub fn coerce_str(v: &JsValue) -> Option<String> {
    match v {
        JsValue::Str(s) => Some(s.clone()),
        JsValue::Num(n) => Some(n.to_string()),
        JsValue::Bool(b) => Some(b.to_string()),
        JsValue::Null => Some("null".into()),
        JsValue::Undefined => Some("undefined".into()),
        JsValue::Wildcard => None,
    }
}

pub fn handle_unary(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    let Some(operand) = it.g.child_at(node, 0) else {
        return HandleResult::default();
    };
    let op = it
        .g
        .ast(node)
        .and_then(|a| a.flags.clone())
        .unwrap_or_default();
    match op.as_str() {
        "delete" => {
            let target = it.dispatch(&ctx.lhs(), operand);
            for &nn in &target.name_nodes {
                it.g.assign_name_node(nn, &[], true, &ctx.branches);
            }
            HandleResult::of_objs(vec![it.env.true_obj])
        }
        "!" => {
            let r = it.dispatch(&ctx.child(), operand);
            let (values, _) = it.to_values(&r);
            let truths: Vec<Option<bool>> = values.iter().map(|v| v.truthiness()).collect();
            let objs = if !truths.is_empty() && truths.iter().all(|t| *t == Some(false)) {
                vec![it.env.true_obj]
            } else if !truths.is_empty() && truths.iter().all(|t| *t == Some(true)) {
                vec![it.env.false_obj]
            } else {
                vec![it.env.true_obj, it.env.false_obj]
            };
            HandleResult {
                obj_nodes: objs,
                used_objs: r.obj_nodes,
                ..Default::default()
            }
        }
        "-" => {
            let r = it.dispatch(&ctx.child(), operand);
            let (values, sources) = it.to_values(&r);
            let negated: Vec<JsValue> = values
                .iter()
                .map(|v| match coerce_num(v) {
                    Some(n) => JsValue::Num(-n),
                    None => JsValue::Wildcard,
                })
                .collect();
            HandleResult {
                values: negated,
                value_sources: sources,
                used_objs: r.obj_nodes,
                ..Default::default()
            }
        }
        "typeof" => {
            let r = it.dispatch(&ctx.child(), operand);
            let mut values = Vec::new();
            for &obj in &r.obj_nodes {
                match it.g.obj(obj) {
                    Some(o) => values.push(JsValue::Str(o.js_type.as_str().into())),
                    None => values.push(JsValue::Wildcard),
                }
            }
            for v in &r.values {
                values.push(match v {
                    JsValue::Str(_) => JsValue::Str("string".into()),
                    JsValue::Num(_) => JsValue::Str("number".into()),
                    JsValue::Bool(_) => JsValue::Str("boolean".into()),
                    JsValue::Undefined => JsValue::Str("undefined".into()),
                    JsValue::Null => JsValue::Str("object".into()),
                    JsValue::Wildcard => JsValue::Wildcard,
                });
            }
            if values.is_empty() {
                values.push(JsValue::Wildcard);
            }
            let len = values.len();
            HandleResult {
                values,
                value_sources: vec![Vec::new(); len],
                used_objs: r.obj_nodes,
                ..Default::default()
            }
        }
        _ => {
            let r = it.dispatch(&ctx.child(), operand);
            HandleResult {
                values: vec![JsValue::Wildcard],
                value_sources: vec![r.obj_nodes.clone()],
                used_objs: r.obj_nodes,
                ..Default::default()
            }
        }
    }
}

/// `x++` and `x--`: numeric step written back through the target's name
/// nodes; the expression yields the original objects. The operator lives in
/// the node's flags.
pub fn handle_update(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    let Some(target) = it.g.child_at(node, 0) else {
        return HandleResult::default();
    };
    let step = match it.g.ast(node).and_then(|a| a.flags.as_deref()) {
        Some("--") => -1.0,
        _ => 1.0,
    };
    let r = it.dispatch(&ctx.child(), target);
    let (values, sources) = it.to_values(&r);
    let bumped = HandleResult {
        values: values
            .iter()
            .map(|v| match coerce_num(v) {
                Some(n) => JsValue::Num(n + step),
                None => JsValue::Wildcard,
            })
            .collect(),
        value_sources: sources,
        ..Default::default()
    };
    let new_objs = it.to_obj_nodes(&bumped, Some(node));
    for &nn in &r.name_nodes {
        it.g.assign_name_node(nn, &new_objs, true, &ctx.branches);
    }
    HandleResult {
        obj_nodes: r.obj_nodes.clone(),
        used_objs: r.obj_nodes,
        ..Default::default()
    }
}

/// Comma operator: evaluate in order, yield the last.
pub fn handle_expr_list(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    let mut last = HandleResult::default();
    for child in it.g.ordered_children(node) {
        last = it.dispatch(&ctx.child(), child);
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstKind;
    use crate::branch::BranchPath;
    use crate::config::Config;
    use crate::graph::{AstNode, JsType, NodeBody, PropKey};
    use crate::model::add_obj_node;

    #[test]
    fn decrement_subtracts_and_writes_back() {
        let mut it = Interp::new(Config::default());
        let ctx = Ctx::new(it.env.base_scope);
        let env = it.env.clone();
        let obj = add_obj_node(&mut it.g, &env, None, JsType::Number, Some(JsValue::Num(3.0)));
        let nn = it
            .g
            .add_scope_name_node(it.env.base_scope, PropKey::Str("i".into()));
        it.g.assign_name_node(nn, &[obj], true, &BranchPath::new());

        let mut update = AstNode::new(AstKind::UpdateOp);
        update.flags = Some("--".into());
        let update = it.g.add_node(NodeBody::Ast(update));
        let mut var = AstNode::new(AstKind::Var);
        var.code = Some("i".into());
        var.childnum = Some(0);
        let var = it.g.add_node(NodeBody::Ast(var));
        it.g.add_edge(update, var, crate::graph::EdgeKind::ParentOf);

        let r = handle_update(&mut it, &ctx, update);
        assert_eq!(r.obj_nodes, vec![obj], "the expression yields the old value");
        let bound = it.g.bound_objs(nn, &ctx.branches);
        assert_eq!(bound.len(), 1);
        assert_eq!(
            it.g.obj(bound[0]).and_then(|o| o.value.clone()),
            Some(JsValue::Num(2.0)),
            "i-- must step down, not up"
        );
    }

    #[test]
    fn addition_concatenates_strings_and_adds_numbers() {
        assert_eq!(
            apply_arith("+", &JsValue::Str("a".into()), &JsValue::Str("b".into())),
            JsValue::Str("ab".into())
        );
        assert_eq!(
            apply_arith("+", &JsValue::Num(1.0), &JsValue::Num(2.0)),
            JsValue::Num(3.0)
        );
        assert_eq!(
            apply_arith("+", &JsValue::Num(1.0), &JsValue::Str("b".into())),
            JsValue::Str("1b".into())
        );
    }

    #[test]
    fn wildcard_poisons_arithmetic() {
        assert_eq!(
            apply_arith("+", &JsValue::Wildcard, &JsValue::Str("cmd".into())),
            JsValue::Wildcard
        );
        assert_eq!(
            apply_arith("*", &JsValue::Wildcard, &JsValue::Num(2.0)),
            JsValue::Wildcard
        );
    }
}
