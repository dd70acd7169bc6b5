//! Three-valued condition evaluation.
//!
//! A condition evaluates to a possibility in `[0, 1]` plus a determinism
//! flag. `1`/`0` with the flag set mean the branch surely runs or surely
//! does not; everything else forks the world. Boolean structure composes
//! probabilistically: `!p` is `1-p`, `&&` multiplies, `||` adds minus the
//! overlap.

use crate::ast::AstKind;
use crate::graph::{JsValue, NodeId};
use crate::interp::{ops, Ctx, HandleResult, Interp};

pub fn check_condition(it: &mut Interp, ctx: &Ctx, node: NodeId) -> (f64, bool) {
    match it.g.kind(node).cloned() {
        Some(AstKind::ExprList) => {
            let Some(first) = it.g.child_at(node, 0) else {
                return (0.5, false);
            };
            check_condition(it, ctx, first)
        }
        Some(AstKind::UnaryOp) => {
            let op = it.g.ast(node).and_then(|a| a.flags.clone());
            if op.as_deref() == Some("!") {
                if let Some(operand) = it.g.child_at(node, 0) {
                    let (p, d) = check_condition(it, ctx, operand);
                    return (1.0 - p, d);
                }
            }
            truthiness_of_node(it, ctx, node)
        }
        Some(AstKind::BinaryOp) => {
            let op = it
                .g
                .ast(node)
                .and_then(|a| a.flags.clone())
                .unwrap_or_default();
            let (left, right) = (it.g.child_at(node, 0), it.g.child_at(node, 1));
            let (Some(left), Some(right)) = (left, right) else {
                return (0.5, false);
            };
            match op.as_str() {
                "&&" => {
                    let (lp, ld) = check_condition(it, ctx, left);
                    let (rp, rd) = check_condition(it, ctx, right);
                    (lp * rp, ld && rd)
                }
                "||" => {
                    let (lp, ld) = check_condition(it, ctx, left);
                    let (rp, rd) = check_condition(it, ctx, right);
                    (lp + rp - lp * rp, ld && rd)
                }
                "==" | "===" | "!=" | "!==" | "<" | "<=" | ">" | ">=" => {
                    let lres = it.dispatch(&ctx.child(), left);
                    let rres = it.dispatch(&ctx.child(), right);
                    compare_results(it, &op, &lres, &rres)
                }
                _ => truthiness_of_node(it, ctx, node),
            }
        }
        _ => truthiness_of_node(it, ctx, node),
    }
}

/// Compare two evaluated sides over the cross-product of their values.
pub fn compare_results(
    it: &Interp,
    op: &str,
    lres: &HandleResult,
    rres: &HandleResult,
) -> (f64, bool) {
    let (lv, _) = it.to_values(lres);
    let (rv, _) = it.to_values(rres);
    if lv.is_empty() || rv.is_empty() {
        return (0.5, false);
    }
    let mut total = 0u32;
    let mut hits = 0u32;
    for a in &lv {
        for b in &rv {
            match cmp_values(op, a, b) {
                Some(true) => {
                    total += 1;
                    hits += 1;
                }
                Some(false) => total += 1,
                None => return (0.5, false),
            }
        }
    }
    let p = hits as f64 / total as f64;
    (p, p == 0.0 || p == 1.0)
}

fn cmp_values(op: &str, a: &JsValue, b: &JsValue) -> Option<bool> {
    if a.is_wildcard() || b.is_wildcard() {
        return None;
    }
    let eq = loose_eq(a, b)?;
    match op {
        "==" => Some(eq),
        "!=" => Some(!eq),
        "===" => Some(strict_eq(a, b)),
        "!==" => Some(!strict_eq(a, b)),
        "<" | "<=" | ">" | ">=" => {
            let (x, y) = (ops::coerce_num(a)?, ops::coerce_num(b)?);
            if x.is_nan() || y.is_nan() {
                return Some(false);
            }
            Some(match op {
                "<" => x < y,
                "<=" => x <= y,
                ">" => x > y,
                _ => x >= y,
            })
        }
        _ => None,
    }
}

fn loose_eq(a: &JsValue, b: &JsValue) -> Option<bool> {
    use JsValue::*;
    Some(match (a, b) {
        (Undefined | Null, Undefined | Null) => true,
        (Undefined | Null, _) | (_, Undefined | Null) => false,
        (Str(x), Str(y)) => x == y,
        _ => {
            let (x, y) = (ops::coerce_num(a)?, ops::coerce_num(b)?);
            !x.is_nan() && !y.is_nan() && x == y
        }
    })
}

fn strict_eq(a: &JsValue, b: &JsValue) -> bool {
    use JsValue::*;
    match (a, b) {
        (Undefined, Undefined) | (Null, Null) => true,
        (Str(x), Str(y)) => x == y,
        (Num(x), Num(y)) => x == y,
        (Bool(x), Bool(y)) => x == y,
        _ => false,
    }
}

/// Fallback: evaluate the node and take the truthiness of everything it
/// could be.
fn truthiness_of_node(it: &mut Interp, ctx: &Ctx, node: NodeId) -> (f64, bool) {
    let r = it.dispatch(&ctx.child(), node);
    let (values, _) = it.to_values(&r);
    if values.is_empty() {
        return (0.5, false);
    }
    let truths: Vec<Option<bool>> = values.iter().map(|v| v.truthiness()).collect();
    if truths.iter().all(|t| *t == Some(true)) {
        (1.0, true)
    } else if truths.iter().all(|t| *t == Some(false)) {
        (0.0, true)
    } else {
        (0.5, false)
    }
}
