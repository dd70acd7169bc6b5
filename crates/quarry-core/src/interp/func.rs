//! Blocks, function declarations, and returns.
//!
//! A block runs its statements in order, chaining `FLOWS_TO` edges and
//! setting the current statement for dataflow attribution. Declarations
//! hoist before the first statement runs: function declarations bind their
//! object, `var` names hoist to the nearest function scope, `let`/`const`
//! to the block.

use tracing::debug;

use crate::ast::{flags, AstKind};
use crate::graph::{EdgeKind, JsType, NodeId, PropKey, ScopeKind};
use crate::interp::{dataflow, Ctx, HandleResult, Interp};
use crate::model::add_obj_node;

/// Run a statement list. Returns the objects returned (so far) by the
/// enclosing function.
pub fn simurun_block(
    it: &mut Interp,
    ctx: &Ctx,
    block: NodeId,
    block_scope: bool,
    decl_var: bool,
) -> Vec<NodeId> {
    let mut bctx = ctx.clone();
    bctx.side = None;
    if block_scope {
        let scope = it.g.add_scope(
            ScopeKind::Block,
            format!("Block{}", block.index()),
            Some(block),
            Some(ctx.scope),
        );
        bctx.scope = scope;
    }
    debug!(block = block.index(), scope = bctx.scope.index(), "block starts");
    decl_vars_and_funcs(it, &bctx, block, decl_var);

    for stmt in it.g.ordered_children(block) {
        if it.finished() {
            break;
        }
        if let Some(prev) = it.cfg_stmt {
            it.g.add_edge_if_not_exist(prev, stmt, EdgeKind::FlowsTo);
        }
        it.cfg_stmt = Some(stmt);
        let mut sctx = bctx.clone();
        sctx.stmt = Some(stmt);
        let r = it.dispatch(&sctx, stmt);
        dataflow::build_df(it, &sctx, &r.used_objs);
    }

    let func_scope = it.g.ancestor_function_scope(bctx.scope);
    let returned = it
        .func_returns
        .get(&func_scope)
        .cloned()
        .unwrap_or_default();
    if block_scope && it.config.scope_gc {
        crate::gc::cleanup_scope(&mut it.g, bctx.scope, &returned);
    }
    returned
}

/// Dispatched when a nested block statement is reached as a statement.
pub fn handle_block_stmt(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    simurun_block(it, ctx, node, true, false);
    HandleResult::default()
}

/// Hoisting pass. Walks statements and the bodies of non-function control
/// structures; never descends into nested functions.
pub fn decl_vars_and_funcs(it: &mut Interp, ctx: &Ctx, block: NodeId, include_var: bool) {
    let mut worklist = it.g.ordered_children(block);
    while let Some(node) = worklist.pop() {
        let Some(kind) = it.g.kind(node).cloned() else {
            continue;
        };
        match kind {
            AstKind::FuncDecl => {
                decl_function(it, ctx, node);
            }
            AstKind::Var => {
                let decl = it.g.ast(node).and_then(|a| a.flags.clone());
                let name = it.g.ast(node).and_then(|a| a.code.clone());
                let Some(name) = name else { continue };
                match decl.as_deref() {
                    Some(flags::DECL_VAR) if include_var => {
                        let scope = it.g.ancestor_function_scope(ctx.scope);
                        if it.g.scope_name_node(scope, &name).is_none() {
                            let nn = it.g.add_scope_name_node(scope, PropKey::Str(name));
                            let undef = it.env.undefined_obj;
                            it.g.assign_name_node(nn, &[undef], false, &ctx.branches);
                        }
                    }
                    Some(flags::DECL_LET) | Some(flags::DECL_CONST) => {
                        if it.g.scope_name_node(ctx.scope, &name).is_none() {
                            it.g.add_scope_name_node(ctx.scope, PropKey::Str(name));
                        }
                    }
                    _ => {}
                }
            }
            AstKind::Closure => {}
            AstKind::If
            | AstKind::IfElem
            | AstKind::Switch
            | AstKind::SwitchList
            | AstKind::SwitchCase
            | AstKind::While
            | AstKind::DoWhile
            | AstKind::For
            | AstKind::ForEach
            | AstKind::Try
            | AstKind::CatchList
            | AstKind::Catch
            | AstKind::StmtList
            | AstKind::Assign
            | AstKind::ExprList => {
                worklist.extend(it.g.ordered_children(node));
            }
            _ => {}
        }
    }
}

/// Create the function object for a declaration or expression. Named
/// declarations bind in the nearest function scope. The object remembers
/// its lexical scope for call-time parenting.
pub fn decl_function(it: &mut Interp, ctx: &Ctx, node: NodeId) -> NodeId {
    if let Some(&existing) = it.g.predecessors(node, EdgeKind::ObjToAst).first() {
        return existing;
    }
    let env = it.env.clone();
    let obj = add_obj_node(&mut it.g, &env, Some(node), JsType::Function, None);
    let name = it.g.ast(node).and_then(|a| a.name.clone());
    if let Some(o) = it.g.obj_mut(obj) {
        o.parent_scope = Some(ctx.scope);
        o.name = name.clone();
    }
    if let Some(name) = name {
        if matches!(it.g.kind(node), Some(AstKind::FuncDecl)) {
            let scope = it.g.ancestor_function_scope(ctx.scope);
            let name_node = it
                .g
                .scope_name_node(scope, &name)
                .unwrap_or_else(|| it.g.add_scope_name_node(scope, PropKey::Str(name)));
            it.g.assign_name_node(name_node, &[obj], true, &ctx.branches);
        }
    }
    obj
}

pub fn handle_func_decl(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    let obj = decl_function(it, ctx, node);
    HandleResult::of_objs(vec![obj])
}

pub fn handle_closure(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    let obj = decl_function(it, ctx, node);
    HandleResult::of_objs(vec![obj])
}

/// `return expr`: materialize the result and credit it to the enclosing
/// function scope.
pub fn handle_return(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    let r = match it.g.child_at(node, 0) {
        Some(expr) if !matches!(it.g.kind(expr), Some(AstKind::Null)) => {
            it.dispatch(&ctx.child(), expr)
        }
        _ => HandleResult::of_objs(vec![it.env.undefined_obj]),
    };
    if r.terminated && r.is_empty() {
        return r;
    }
    let objs = it.to_obj_nodes(&r, Some(node));
    let func_scope = it.g.ancestor_function_scope(ctx.scope);
    let entry = it.func_returns.entry(func_scope).or_default();
    for &o in &objs {
        if !entry.contains(&o) {
            entry.push(o);
        }
    }
    dataflow::build_df(it, ctx, &r.used_objs);
    r
}

/// `try`/`catch`/`finally`: no unwinding model; every block runs so no
/// flows are lost.
pub fn handle_try(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    for child in it.g.ordered_children(node) {
        match it.g.kind(child).cloned() {
            Some(AstKind::StmtList) => {
                simurun_block(it, ctx, child, true, false);
            }
            Some(AstKind::CatchList) => {
                for catch in it.g.ordered_children(child) {
                    if let Some(body) = it.g.child_at(catch, 1) {
                        simurun_block(it, ctx, body, true, false);
                    }
                }
            }
            _ => {}
        }
    }
    HandleResult::default()
}
