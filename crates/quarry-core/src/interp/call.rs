//! Call simulation.
//!
//! Known functions run in a fresh function scope parented to the scope the
//! function object closed over. Unknown callees get a blank artificial
//! function and the worst-case model: every argument and `this` feeds a
//! wildcard return (tainted if any input was), and function-valued
//! arguments are invoked as callbacks. Two limits keep simulation finite: a
//! call-stack depth cap and a per-site re-entry budget. A call refused by a
//! limit reports `terminated`, which is not the same as returning nothing.

use tracing::{debug, warn};

use crate::ast::AstKind;
use crate::branch::{merge, BranchTag};
use crate::graph::{
    AstNode, Builtin, EdgeKind, JsType, JsValue, NodeBody, NodeId, PropKey,
};
use crate::interp::{dataflow, func, Ctx, HandleResult, Interp, Task};
use crate::model::{add_obj_node, is_wildcard_obj, materialize_prop, probe_prop, set_single_prop};

pub fn ast_call(it: &mut Interp, ctx: &Ctx, node: NodeId) -> HandleResult {
    let kind = it.g.kind(node).cloned();
    let is_new = matches!(kind, Some(AstKind::New));

    let (mut func_objs, this_objs, callee_name_nodes, mut used, name) = match kind {
        Some(AstKind::Call) | Some(AstKind::New) => {
            let Some(callee) = it.g.child_at(node, 0) else {
                return HandleResult::default();
            };
            let r = it.dispatch(&ctx.child(), callee);
            let name = r.name.clone().or_else(|| it.g.name_from_child(callee));
            let funcs: Vec<NodeId> = r
                .obj_nodes
                .iter()
                .copied()
                .filter(|&o| o != it.env.undefined_obj && o != it.env.null_obj)
                .collect();
            (funcs, Vec::new(), r.name_nodes.clone(), r.used_objs, name)
        }
        Some(AstKind::MethodCall) => {
            let (Some(parent_node), Some(key_node)) =
                (it.g.child_at(node, 0), it.g.child_at(node, 1))
            else {
                return HandleResult::default();
            };
            let parent_res = it.dispatch(&ctx.child(), parent_node);
            let parent_objs = it.to_obj_nodes(&parent_res, Some(parent_node));
            let key = it
                .g
                .ast(key_node)
                .and_then(|a| a.code.clone())
                .unwrap_or_default();
            let mut funcs = Vec::new();
            let mut name_nodes = Vec::new();
            for &parent in &parent_objs {
                let hit = probe_prop(
                    &it.g,
                    &it.env,
                    parent,
                    &PropKey::Str(key.clone()),
                    &ctx.branches,
                    it.config.proto_depth,
                );
                if hit.found() {
                    name_nodes.extend(hit.name_nodes);
                    for o in hit.objs {
                        if !funcs.contains(&o) {
                            funcs.push(o);
                        }
                    }
                } else if is_wildcard_obj(&it.g, parent) {
                    let env = it.env.clone();
                    let (nn, child) =
                        materialize_prop(&mut it.g, &env, parent, PropKey::Str(key.clone()), &ctx.branches);
                    name_nodes.push(nn);
                    funcs.push(child);
                }
            }
            let mut used = parent_res.used_objs.clone();
            for &o in &parent_objs {
                if !used.contains(&o) {
                    used.push(o);
                }
            }
            let name = match parent_res.name.as_deref() {
                Some(base) => Some(format!("{base}.{key}")),
                None => Some(key),
            };
            (funcs, parent_objs, name_nodes, used, name)
        }
        _ => return HandleResult::default(),
    };

    // arguments
    let arg_list = match kind {
        Some(AstKind::MethodCall) => it.g.child_at(node, 2),
        _ => it.g.child_at(node, 1),
    };
    let mut args = Vec::new();
    if let Some(arg_list) = arg_list {
        for arg_node in it.g.ordered_children(arg_list) {
            let r = it.dispatch(&ctx.child(), arg_node);
            for &o in r.used_objs.iter().chain(r.obj_nodes.iter()) {
                if !used.contains(&o) {
                    used.push(o);
                }
            }
            args.push(r);
        }
    }

    // unknown callee: synthesize a blank function once and bind it back so
    // repeated calls reuse it
    if func_objs.is_empty() {
        let blank = add_blank_func(it, ctx, name.as_deref());
        for &nn in &callee_name_nodes {
            it.g.assign_name_node(nn, &[blank], false, &ctx.branches);
        }
        func_objs.push(blank);
    }

    let mut result = call_function(
        it,
        ctx,
        &func_objs,
        &args,
        &this_objs,
        Some(node),
        CallFlavor {
            is_new,
            fake_args: false,
            fake_taint: false,
        },
    );
    for o in used {
        if !result.used_objs.contains(&o) {
            result.used_objs.push(o);
        }
    }
    result.name = name;
    dataflow::build_df(it, ctx, &result.used_objs);
    result
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CallFlavor {
    pub is_new: bool,
    /// Synthesize an argument per declared parameter.
    pub fake_args: bool,
    /// Synthesized arguments carry taint (entry-point modeling).
    pub fake_taint: bool,
}

pub fn call_function(
    it: &mut Interp,
    ctx: &Ctx,
    funcs: &[NodeId],
    args: &[HandleResult],
    this_objs: &[NodeId],
    caller_ast: Option<NodeId>,
    flavor: CallFlavor,
) -> HandleResult {
    let mut returned: Vec<NodeId> = Vec::new();
    let mut used: Vec<NodeId> = Vec::new();
    let mut any_skipped = false;
    let multiple = funcs.len() > 1;
    let point = it.mint_branch_point();
    let parent = ctx.branches.last_choice();

    for (i, &func_obj) in funcs.iter().enumerate() {
        if it.finished() {
            break;
        }
        let branches = if multiple {
            ctx.branches.with(BranchTag::choice(point, i as u32))
        } else {
            ctx.branches.clone()
        };
        let bctx = ctx.with_branches(branches);

        if let Some(builtin) = it.g.obj(func_obj).and_then(|o| o.builtin) {
            let r = handle_builtin(it, &bctx, builtin, args, this_objs, caller_ast);
            collect(&mut returned, &r.obj_nodes);
            collect(&mut used, &r.used_objs);
            continue;
        }

        let func_ast = it
            .g
            .successors(func_obj, EdgeKind::ObjToAst)
            .first()
            .copied();
        let real_ast = func_ast.filter(|&a| {
            it.g.ast(a)
                .is_some_and(|x| !x.artificial && x.kind.is_function())
        });

        match real_ast {
            None => {
                let r = worst_case_call(it, &bctx, func_obj, func_ast, args, this_objs, caller_ast);
                collect(&mut returned, &r.obj_nodes);
                collect(&mut used, &r.used_objs);
            }
            Some(ast) => {
                if it.call_stack.len() as u32 >= it.config.call_depth {
                    warn!(depth = it.call_stack.len(), "call depth limit hit, skipping call");
                    any_skipped = true;
                    continue;
                }
                if let Some(site) = caller_ast {
                    let count = it.call_site_counter.entry(site).or_insert(0);
                    if *count >= it.config.call_limit {
                        debug!(site = site.index(), "call site budget spent, skipping call");
                        any_skipped = true;
                        continue;
                    }
                    *count += 1;
                }
                let rets =
                    simurun_function(it, &bctx, ast, func_obj, args, this_objs, caller_ast, flavor);
                collect(&mut returned, &rets);
            }
        }
    }

    if multiple && !it.config.single_branch {
        merge(&mut it.g, point, funcs.len() as u32, parent);
    }

    if returned.is_empty() {
        if any_skipped {
            let mut r = HandleResult::terminated();
            r.used_objs = used;
            return r;
        }
        returned.push(it.env.undefined_obj);
    }
    HandleResult {
        obj_nodes: returned,
        used_objs: used,
        terminated: any_skipped,
        ..Default::default()
    }
}

/// Run one declared function body in a fresh scope.
#[allow(clippy::too_many_arguments)]
fn simurun_function(
    it: &mut Interp,
    ctx: &Ctx,
    func_ast: NodeId,
    func_obj: NodeId,
    args: &[HandleResult],
    this_objs: &[NodeId],
    caller_ast: Option<NodeId>,
    flavor: CallFlavor,
) -> Vec<NodeId> {
    let env = it.env.clone();
    let parent_scope = it
        .g
        .obj(func_obj)
        .and_then(|o| o.parent_scope)
        .unwrap_or(it.env.base_scope);
    let fname = it
        .g
        .obj(func_obj)
        .and_then(|o| o.name.clone())
        .unwrap_or_else(|| "anonymous".into());
    let scope = it.g.add_scope(
        crate::graph::ScopeKind::Function,
        format!("Function_{fname}"),
        Some(func_ast),
        Some(parent_scope),
    );
    it.g.add_edge(func_obj, scope, EdgeKind::ObjToScope);

    // this binding
    let this_objs: Vec<NodeId> = if flavor.is_new {
        let fresh = add_obj_node(&mut it.g, &env, caller_ast, JsType::Object, None);
        let proto_hit = probe_prop(
            &it.g,
            &it.env,
            func_obj,
            &PropKey::Str("prototype".into()),
            &ctx.branches,
            it.config.proto_depth,
        );
        if let Some(&proto) = proto_hit.objs.first() {
            set_single_prop(&mut it.g, fresh, PropKey::Str(crate::model::PROTO.into()), proto);
        }
        vec![fresh]
    } else if !this_objs.is_empty() {
        this_objs.to_vec()
    } else {
        vec![it.env.global_obj]
    };
    let this_nn = it.g.add_scope_name_node(scope, PropKey::Str("this".into()));
    it.g.assign_name_node(this_nn, &this_objs, true, &ctx.branches);

    // parameters
    let param_list = it
        .g
        .ordered_children(func_ast)
        .into_iter()
        .find(|&c| matches!(it.g.kind(c), Some(AstKind::ParamList)));
    let params = param_list
        .map(|p| it.g.ordered_children(p))
        .unwrap_or_default();
    for (i, param) in params.iter().copied().enumerate() {
        let Some(pname) = it
            .g
            .ast(param)
            .and_then(|a| a.name.clone().or_else(|| a.code.clone()))
        else {
            continue;
        };
        let rest = it
            .g
            .ast(param)
            .and_then(|a| a.flags.as_deref().map(|f| f == "rest"))
            .unwrap_or(false);
        let objs: Vec<NodeId> = if rest {
            let arr = add_obj_node(&mut it.g, &env, Some(param), JsType::Array, None);
            for (j, extra) in args.iter().skip(i).enumerate() {
                let elems = it.to_obj_nodes(extra, Some(param));
                let nn = it.g.add_prop_name_node(arr, PropKey::Str(j.to_string()));
                it.g.assign_name_node(nn, &elems, true, &ctx.branches);
            }
            vec![arr]
        } else if let Some(arg) = args.get(i) {
            it.to_obj_nodes(arg, Some(param))
        } else if flavor.fake_args {
            let fake = add_obj_node(&mut it.g, &env, Some(param), JsType::Object, Some(JsValue::Wildcard));
            if let Some(o) = it.g.obj_mut(fake) {
                o.fake_arg = true;
                o.tainted = flavor.fake_taint;
            }
            vec![fake]
        } else {
            vec![it.env.undefined_obj]
        };
        let nn = it.g.add_scope_name_node(scope, PropKey::Str(pname));
        it.g.assign_name_node(nn, &objs, true, &ctx.branches);
    }

    // the arguments array exists only while the body runs
    let arguments_obj = add_obj_node(&mut it.g, &env, None, JsType::Array, None);
    for (i, arg) in args.iter().enumerate() {
        let objs = it.to_obj_nodes(arg, None);
        let nn = it
            .g
            .add_prop_name_node(arguments_obj, PropKey::Str(i.to_string()));
        it.g.assign_name_node(nn, &objs, true, &ctx.branches);
    }
    let arguments_nn = it
        .g
        .add_scope_name_node(scope, PropKey::Str("arguments".into()));
    it.g.assign_name_node(arguments_nn, &[arguments_obj], true, &ctx.branches);

    // call graph and control flow wiring
    if let Some(site) = caller_ast {
        it.g.add_edge_if_not_exist(site, func_ast, EdgeKind::Calls);
    }
    if let Some(&entry) = it.g.successors(func_ast, EdgeKind::Entry).first() {
        if let Some(prev) = it.cfg_stmt {
            it.g.add_edge_if_not_exist(prev, entry, EdgeKind::FlowsTo);
        }
        it.cfg_stmt = Some(entry);
    }

    let body = it
        .g
        .ordered_children(func_ast)
        .into_iter()
        .find(|&c| matches!(it.g.kind(c), Some(AstKind::StmtList)));
    it.call_stack.push(func_ast);
    it.func_returns.insert(scope, Vec::new());
    if let Some(body) = body {
        let mut fctx = ctx.with_scope(scope);
        fctx.this_objs = this_objs.clone();
        func::simurun_block(it, &fctx, body, false, true);
    }
    it.call_stack.pop();
    let mut returned = it.func_returns.remove(&scope).unwrap_or_default();

    if let Some(&exit) = it.g.successors(func_ast, EdgeKind::Exit).first() {
        if let Some(prev) = it.cfg_stmt {
            it.g.add_edge_if_not_exist(prev, exit, EdgeKind::FlowsTo);
        }
        it.cfg_stmt = Some(exit);
    }

    // tear the arguments array down again
    it.g.remove_node(arguments_nn);
    it.g.remove_node(arguments_obj);

    if flavor.is_new && returned.iter().all(|&o| o == it.env.undefined_obj) {
        returned = this_objs;
    }
    returned
}

/// Model a call through something with no body to run: consume every input,
/// produce a wildcard, and poke any callback arguments.
fn worst_case_call(
    it: &mut Interp,
    ctx: &Ctx,
    func_obj: NodeId,
    func_ast: Option<NodeId>,
    args: &[HandleResult],
    this_objs: &[NodeId],
    caller_ast: Option<NodeId>,
) -> HandleResult {
    let env = it.env.clone();
    let mut inputs: Vec<NodeId> = Vec::new();
    for arg in args {
        for o in it.to_obj_nodes(arg, caller_ast) {
            if !inputs.contains(&o) {
                inputs.push(o);
            }
        }
    }
    for &t in this_objs {
        if !inputs.contains(&t) {
            inputs.push(t);
        }
    }
    let tainted = inputs.iter().any(|&o| it.g.is_tainted(o));

    if let (Some(site), Some(ast)) = (caller_ast, func_ast) {
        it.g.add_edge_if_not_exist(site, ast, EdgeKind::Calls);
    }

    let ret = add_obj_node(&mut it.g, &env, caller_ast, JsType::Object, Some(JsValue::Wildcard));
    if tainted {
        if let Some(o) = it.g.obj_mut(ret) {
            o.tainted = true;
        }
    }
    dataflow::add_contributes_to(it, &inputs, ret);
    debug!(
        func = it.g.obj(func_obj).and_then(|o| o.name.as_deref()),
        tainted, "worst-case call model applied"
    );

    // a callback handed to an opaque function is assumed to be invoked,
    // with arguments as bad as the surrounding inputs
    if (it.call_stack.len() as u32) < it.config.call_depth {
        let callbacks: Vec<NodeId> = inputs
            .iter()
            .copied()
            .filter(|&o| {
                it.g.obj(o).is_some_and(|n| n.js_type == JsType::Function)
                    && !it.g.successors(o, EdgeKind::ObjToAst).is_empty()
            })
            .collect();
        for cb in callbacks {
            call_function(
                it,
                ctx,
                &[cb],
                &[],
                &[],
                caller_ast,
                CallFlavor {
                    is_new: false,
                    fake_args: true,
                    fake_taint: tainted,
                },
            );
        }
    }

    HandleResult {
        obj_nodes: vec![ret],
        used_objs: inputs,
        ..Default::default()
    }
}

/// Synthesize an artificial function (empty parameter list and body, ENTRY
/// and EXIT markers) for a callee nothing declared.
pub fn add_blank_func(it: &mut Interp, ctx: &Ctx, name: Option<&str>) -> NodeId {
    let mut func = AstNode::new(AstKind::FuncDecl);
    func.artificial = true;
    func.name = name.map(|s| s.to_string());
    let func_ast = it.g.add_node(NodeBody::Ast(func));
    let mut params = AstNode::new(AstKind::ParamList);
    params.artificial = true;
    params.childnum = Some(0);
    let params = it.g.add_node(NodeBody::Ast(params));
    let mut body = AstNode::new(AstKind::StmtList);
    body.artificial = true;
    body.childnum = Some(1);
    let body = it.g.add_node(NodeBody::Ast(body));
    it.g.add_edge(func_ast, params, EdgeKind::ParentOf);
    it.g.add_edge(func_ast, body, EdgeKind::ParentOf);
    for (kind, edge) in [
        ("CFG_FUNC_ENTRY", EdgeKind::Entry),
        ("CFG_FUNC_EXIT", EdgeKind::Exit),
    ] {
        let mut marker = AstNode::new(AstKind::Unknown(kind.to_string()));
        marker.artificial = true;
        let marker = it.g.add_node(NodeBody::Ast(marker));
        it.g.add_edge(func_ast, marker, edge);
    }
    let env = it.env.clone();
    let obj = add_obj_node(&mut it.g, &env, Some(func_ast), JsType::Function, None);
    if let Some(o) = it.g.obj_mut(obj) {
        o.name = name.map(|s| s.to_string());
        o.parent_scope = Some(ctx.scope);
    }
    obj
}

fn handle_builtin(
    it: &mut Interp,
    ctx: &Ctx,
    builtin: Builtin,
    args: &[HandleResult],
    this_objs: &[NodeId],
    caller_ast: Option<NodeId>,
) -> HandleResult {
    let env = it.env.clone();
    match builtin {
        Builtin::TaintSource => {
            let ret =
                add_obj_node(&mut it.g, &env, caller_ast, JsType::Object, Some(JsValue::Wildcard));
            if let Some(o) = it.g.obj_mut(ret) {
                o.tainted = true;
            }
            HandleResult::of_objs(vec![ret])
        }
        Builtin::Sanitizer => {
            let ret =
                add_obj_node(&mut it.g, &env, caller_ast, JsType::Number, Some(JsValue::Wildcard));
            // dependency edges without taint chaining: that is the point
            let mut used = Vec::new();
            for arg in args {
                for o in it.to_obj_nodes(arg, caller_ast) {
                    it.g.add_edge_if_not_exist(o, ret, EdgeKind::ContributesTo);
                    used.push(o);
                }
            }
            HandleResult {
                obj_nodes: vec![ret],
                used_objs: used,
                ..Default::default()
            }
        }
        Builtin::SetTimeout => {
            let funcs = args
                .first()
                .map(|a| a.obj_nodes.clone())
                .unwrap_or_default();
            let task_args: Vec<Vec<NodeId>> = args
                .iter()
                .skip(2)
                .map(|a| it.to_obj_nodes(a, caller_ast))
                .collect();
            it.macro_queue.push_back(Task {
                funcs,
                args: task_args,
                this_objs: Vec::new(),
            });
            let ret =
                add_obj_node(&mut it.g, &env, caller_ast, JsType::Number, Some(JsValue::Wildcard));
            HandleResult::of_objs(vec![ret])
        }
        Builtin::QueueMicrotask => {
            let funcs = args
                .first()
                .map(|a| a.obj_nodes.clone())
                .unwrap_or_default();
            it.micro_queue.push_back(Task {
                funcs,
                args: Vec::new(),
                this_objs: Vec::new(),
            });
            HandleResult::of_objs(vec![it.env.undefined_obj])
        }
        Builtin::PromiseResolve => {
            let promise = make_promise(it, caller_ast);
            let value_objs = args
                .first()
                .map(|a| it.to_obj_nodes(a, caller_ast))
                .unwrap_or_else(|| vec![it.env.undefined_obj]);
            let nn = it.g.add_prop_name_node(promise, PropKey::Str("value".into()));
            it.g.assign_name_node(nn, &value_objs, true, &ctx.branches);
            HandleResult::of_objs(vec![promise])
        }
        Builtin::PromiseThen => {
            let funcs = args
                .first()
                .map(|a| a.obj_nodes.clone())
                .unwrap_or_default();
            let mut value_objs = Vec::new();
            for &p in this_objs {
                let hit = probe_prop(
                    &it.g,
                    &it.env,
                    p,
                    &PropKey::Str("value".into()),
                    &ctx.branches,
                    it.config.proto_depth,
                );
                value_objs.extend(hit.objs);
            }
            it.micro_queue.push_back(Task {
                funcs,
                args: vec![value_objs],
                this_objs: Vec::new(),
            });
            // chaining yields another settled promise of unknown value
            let next = make_promise(it, caller_ast);
            let wildcard =
                add_obj_node(&mut it.g, &env, caller_ast, JsType::Object, Some(JsValue::Wildcard));
            let nn = it.g.add_prop_name_node(next, PropKey::Str("value".into()));
            it.g.assign_name_node(nn, &[wildcard], true, &ctx.branches);
            HandleResult::of_objs(vec![next])
        }
        Builtin::ArrayPush => {
            let mut used = Vec::new();
            for arg in args {
                let arg_objs = it.to_obj_nodes(arg, caller_ast);
                for &target in this_objs {
                    let index = it.g.prop_name_nodes(target).len();
                    let nn = it
                        .g
                        .add_prop_name_node(target, PropKey::Str(index.to_string()));
                    it.g.assign_name_node(nn, &arg_objs, true, &ctx.branches);
                    dataflow::add_contributes_to(it, &arg_objs, target);
                }
                used.extend(arg_objs);
            }
            let ret =
                add_obj_node(&mut it.g, &env, caller_ast, JsType::Number, Some(JsValue::Wildcard));
            HandleResult {
                obj_nodes: vec![ret],
                used_objs: used,
                ..Default::default()
            }
        }
        Builtin::ArrayForEach => {
            let callbacks = args
                .first()
                .map(|a| a.obj_nodes.clone())
                .unwrap_or_default();
            let limit = it.config.loop_limit.max(1) as usize;
            for &target in this_objs {
                let mut elem_sets: Vec<Vec<NodeId>> = Vec::new();
                for nn in it.g.prop_name_nodes(target).into_iter().take(limit) {
                    let is_index = it
                        .g
                        .name_node(nn)
                        .is_some_and(|n| n.name.as_str().parse::<usize>().is_ok());
                    if is_index {
                        elem_sets.push(it.g.bound_objs(nn, &ctx.branches));
                    }
                }
                if elem_sets.is_empty() && is_wildcard_obj(&it.g, target) {
                    let elem = add_obj_node(
                        &mut it.g,
                        &env,
                        caller_ast,
                        JsType::Object,
                        Some(JsValue::Wildcard),
                    );
                    if it.g.is_tainted(target) {
                        if let Some(o) = it.g.obj_mut(elem) {
                            o.tainted = true;
                        }
                    }
                    elem_sets.push(vec![elem]);
                }
                for elems in elem_sets {
                    call_function(
                        it,
                        ctx,
                        &callbacks,
                        &[HandleResult::of_objs(elems), HandleResult::of_objs(vec![target])],
                        &[],
                        caller_ast,
                        CallFlavor::default(),
                    );
                }
            }
            HandleResult::of_objs(vec![it.env.undefined_obj])
        }
    }
}

fn make_promise(it: &mut Interp, caller_ast: Option<NodeId>) -> NodeId {
    let env = it.env.clone();
    let promise = add_obj_node(&mut it.g, &env, caller_ast, JsType::Object, None);
    let then = crate::model::host::make_builtin(&mut it.g, &env, "then", Builtin::PromiseThen);
    set_single_prop(&mut it.g, promise, PropKey::Str("then".into()), then);
    promise
}

/// Invoke the configured entry points and every function hung off
/// `module.exports` with fake tainted arguments, the way an
/// attacker-reachable export would be driven.
pub fn run_entry_points(it: &mut Interp, ctx: &Ctx, file_scope: NodeId) {
    let mut targets: Vec<(String, Vec<NodeId>)> = Vec::new();

    for name in it.config.entry_points.clone() {
        let Some((nn, _)) = it.g.lookup_name(file_scope, &name) else {
            warn!(name, "entry point not found");
            continue;
        };
        let funcs = function_objs(it, &it.g.bound_objs(nn, &ctx.branches));
        targets.push((name, funcs));
    }

    // the export table
    if let Some((module_nn, _)) = it.g.lookup_name(it.env.base_scope, "module") {
        for module_obj in it.g.bound_objs(module_nn, &ctx.branches) {
            let hit = probe_prop(
                &it.g,
                &it.env,
                module_obj,
                &PropKey::Str("exports".into()),
                &ctx.branches,
                it.config.proto_depth,
            );
            for exports_obj in hit.objs {
                // the whole export object may itself be a function
                targets.push((
                    "module.exports".into(),
                    function_objs(it, &[exports_obj]),
                ));
                for prop_nn in it.g.prop_name_nodes(exports_obj) {
                    let Some(name) = it.g.name_node(prop_nn).map(|n| n.name.as_str().to_string())
                    else {
                        continue;
                    };
                    if name == crate::model::PROTO {
                        continue;
                    }
                    let funcs = function_objs(it, &it.g.bound_objs(prop_nn, &ctx.branches));
                    targets.push((format!("module.exports.{name}"), funcs));
                }
            }
        }
    }

    for (name, funcs) in targets {
        if funcs.is_empty() {
            continue;
        }
        debug!(name, "driving entry point with tainted arguments");
        call_function(
            it,
            ctx,
            &funcs,
            &[],
            &[],
            None,
            CallFlavor {
                is_new: false,
                fake_args: true,
                fake_taint: true,
            },
        );
    }
}

fn function_objs(it: &Interp, objs: &[NodeId]) -> Vec<NodeId> {
    objs.iter()
        .copied()
        .filter(|&o| it.g.obj(o).is_some_and(|n| n.js_type == JsType::Function))
        .collect()
}

fn collect(into: &mut Vec<NodeId>, from: &[NodeId]) {
    for &o in from {
        if !into.contains(&o) {
            into.push(o);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn empty_func(it: &mut Interp) -> NodeId {
        let mut ast = AstNode::new(AstKind::FuncDecl);
        ast.name = Some("noop".into());
        let func_ast = it.g.add_node(NodeBody::Ast(ast));
        let mut params = AstNode::new(AstKind::ParamList);
        params.childnum = Some(0);
        let params = it.g.add_node(NodeBody::Ast(params));
        let mut body = AstNode::new(AstKind::StmtList);
        body.childnum = Some(1);
        let body = it.g.add_node(NodeBody::Ast(body));
        it.g.add_edge(func_ast, params, EdgeKind::ParentOf);
        it.g.add_edge(func_ast, body, EdgeKind::ParentOf);
        let env = it.env.clone();
        let obj = add_obj_node(&mut it.g, &env, Some(func_ast), JsType::Function, None);
        if let Some(o) = it.g.obj_mut(obj) {
            o.name = Some("noop".into());
            o.parent_scope = Some(it.env.base_scope);
        }
        obj
    }

    #[test]
    fn spent_site_budget_reports_terminated_with_no_objects() {
        let mut it = Interp::new(Config::default());
        let ctx = Ctx::new(it.env.base_scope);
        let f = empty_func(&mut it);
        let site = it.g.add_node(NodeBody::Ast(AstNode::new(AstKind::Call)));
        it.call_site_counter.insert(site, it.config.call_limit);
        let r = call_function(&mut it, &ctx, &[f], &[], &[], Some(site), CallFlavor::default());
        assert!(r.terminated, "a refused call must be flagged, not silent");
        assert!(
            r.obj_nodes.is_empty(),
            "a refused call yields no value, not `undefined`"
        );
    }

    #[test]
    fn empty_body_returns_undefined_unlike_a_skipped_call() {
        let mut it = Interp::new(Config::default());
        let ctx = Ctx::new(it.env.base_scope);
        let f = empty_func(&mut it);
        let site = it.g.add_node(NodeBody::Ast(AstNode::new(AstKind::Call)));
        let r = call_function(&mut it, &ctx, &[f], &[], &[], Some(site), CallFlavor::default());
        assert!(!r.terminated);
        assert_eq!(r.obj_nodes, vec![it.env.undefined_obj]);
    }
}
