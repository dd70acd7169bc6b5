//! Host environment bootstrap.
//!
//! Builds the global scope, the global object mirroring it, the builtin
//! prototypes, the literal singletons, and the handful of modeled host
//! functions the task queues depend on. Everything later code reaches for
//! by id lives in [`HostEnv`].

use crate::branch::BranchPath;
use crate::graph::{
    Builtin, EdgeKind, Graph, JsType, JsValue, NodeBody, NodeId, ObjNode, PropKey, ScopeKind,
};

use super::{add_obj_node, set_single_prop, PROTO};

#[derive(Debug, Clone)]
pub struct HostEnv {
    pub base_scope: NodeId,
    pub global_obj: NodeId,
    pub object_proto: NodeId,
    pub function_proto: NodeId,
    pub array_proto: NodeId,
    pub string_proto: NodeId,
    pub number_proto: NodeId,
    pub boolean_proto: NodeId,
    pub null_obj: NodeId,
    pub undefined_obj: NodeId,
    pub true_obj: NodeId,
    pub false_obj: NodeId,
    pub nan_obj: NodeId,
    pub infinity_obj: NodeId,
    pub builtin_prototypes: Vec<NodeId>,
}

fn raw_obj(g: &mut Graph, js_type: JsType, value: Option<JsValue>, name: &str) -> NodeId {
    let mut node = ObjNode::new(js_type);
    node.value = value;
    node.name = Some(name.to_string());
    g.add_node(NodeBody::Object(node))
}

pub fn setup_host(g: &mut Graph) -> HostEnv {
    let object_proto = raw_obj(g, JsType::Object, None, "Object.prototype");
    let function_proto = raw_obj(g, JsType::Object, None, "Function.prototype");
    let array_proto = raw_obj(g, JsType::Object, None, "Array.prototype");
    let string_proto = raw_obj(g, JsType::Object, None, "String.prototype");
    let number_proto = raw_obj(g, JsType::Object, None, "Number.prototype");
    let boolean_proto = raw_obj(g, JsType::Object, None, "Boolean.prototype");

    let null_obj = raw_obj(g, JsType::Null, Some(JsValue::Null), "null");
    let undefined_obj = raw_obj(g, JsType::Undefined, Some(JsValue::Undefined), "undefined");
    let true_obj = raw_obj(g, JsType::Boolean, Some(JsValue::Bool(true)), "true");
    let false_obj = raw_obj(g, JsType::Boolean, Some(JsValue::Bool(false)), "false");
    let nan_obj = raw_obj(g, JsType::Number, Some(JsValue::Num(f64::NAN)), "NaN");
    let infinity_obj = raw_obj(
        g,
        JsType::Number,
        Some(JsValue::Num(f64::INFINITY)),
        "Infinity",
    );

    let base_scope = g.add_scope(ScopeKind::Base, "Global".into(), None, None);
    let global_obj = raw_obj(g, JsType::Object, None, "global");
    g.add_edge(global_obj, base_scope, EdgeKind::ObjToScope);

    let env = HostEnv {
        base_scope,
        global_obj,
        object_proto,
        function_proto,
        array_proto,
        string_proto,
        number_proto,
        boolean_proto,
        null_obj,
        undefined_obj,
        true_obj,
        false_obj,
        nan_obj,
        infinity_obj,
        builtin_prototypes: vec![
            object_proto,
            function_proto,
            array_proto,
            string_proto,
            number_proto,
            boolean_proto,
        ],
    };

    // prototype chains all end at Object.prototype, which ends at null
    set_single_prop(g, object_proto, PropKey::Str(PROTO.into()), null_obj);
    for proto in [
        function_proto,
        array_proto,
        string_proto,
        number_proto,
        boolean_proto,
        global_obj,
    ] {
        set_single_prop(g, proto, PropKey::Str(PROTO.into()), object_proto);
    }

    bind_global(g, &env, "this", global_obj);
    bind_global(g, &env, "globalThis", global_obj);
    bind_global(g, &env, "undefined", undefined_obj);
    bind_global(g, &env, "NaN", nan_obj);
    bind_global(g, &env, "Infinity", infinity_obj);
    // boolean literals lower to name reads
    bind_global(g, &env, "true", true_obj);
    bind_global(g, &env, "false", false_obj);

    // constructors: enough shape for `new X()` and prototype lookups
    for (name, proto) in [
        ("Object", object_proto),
        ("Function", function_proto),
        ("Array", array_proto),
        ("String", string_proto),
        ("Number", number_proto),
        ("Boolean", boolean_proto),
    ] {
        let cons = add_obj_node(g, &env, None, JsType::Function, None);
        if let Some(o) = g.obj_mut(cons) {
            o.name = Some(name.into());
        }
        set_single_prop(g, cons, PropKey::Str("prototype".into()), proto);
        set_single_prop(g, proto, PropKey::Str("constructor".into()), cons);
        bind_global(g, &env, name, cons);
    }

    // modeled host functions
    let set_timeout = make_builtin(g, &env, "setTimeout", Builtin::SetTimeout);
    bind_global(g, &env, "setTimeout", set_timeout);
    let queue_micro = make_builtin(g, &env, "queueMicrotask", Builtin::QueueMicrotask);
    bind_global(g, &env, "queueMicrotask", queue_micro);

    let promise = add_obj_node(g, &env, None, JsType::Object, None);
    if let Some(o) = g.obj_mut(promise) {
        o.name = Some("Promise".into());
    }
    let resolve = make_builtin(g, &env, "resolve", Builtin::PromiseResolve);
    set_single_prop(g, promise, PropKey::Str("resolve".into()), resolve);
    bind_global(g, &env, "Promise", promise);

    // CommonJS export table: `module.exports` and `exports` start as the
    // same fresh object
    let module_obj = add_obj_node(g, &env, None, JsType::Object, None);
    if let Some(o) = g.obj_mut(module_obj) {
        o.name = Some("module".into());
    }
    let exports_obj = add_obj_node(g, &env, None, JsType::Object, None);
    set_single_prop(g, module_obj, PropKey::Str("exports".into()), exports_obj);
    bind_global(g, &env, "module", module_obj);
    bind_global(g, &env, "exports", exports_obj);

    let push = make_builtin(g, &env, "push", Builtin::ArrayPush);
    set_single_prop(g, array_proto, PropKey::Str("push".into()), push);
    let for_each = make_builtin(g, &env, "forEach", Builtin::ArrayForEach);
    set_single_prop(g, array_proto, PropKey::Str("forEach".into()), for_each);

    env
}

pub fn make_builtin(g: &mut Graph, env: &HostEnv, name: &str, builtin: Builtin) -> NodeId {
    let func = add_obj_node(g, env, None, JsType::Function, None);
    if let Some(o) = g.obj_mut(func) {
        o.builtin = Some(builtin);
        o.name = Some(name.to_string());
    }
    func
}

/// Bind a name in the base scope and mirror it as a property of the global
/// object; both sides share one name node.
pub fn bind_global(g: &mut Graph, env: &HostEnv, name: &str, obj: NodeId) -> NodeId {
    let name_node = g
        .scope_name_node(env.base_scope, name)
        .unwrap_or_else(|| g.add_scope_name_node(env.base_scope, PropKey::Str(name.into())));
    g.add_edge_if_not_exist(env.global_obj, name_node, EdgeKind::ObjToProp);
    g.assign_name_node(name_node, &[obj], true, &BranchPath::new());
    name_node
}

/// Bind the configured taint-source and sanitizer function names.
pub fn bind_config_functions(g: &mut Graph, env: &HostEnv, sources: &[String], sanitizers: &[String]) {
    for name in sources {
        let f = make_builtin(g, env, name, Builtin::TaintSource);
        bind_global(g, env, name, f);
    }
    for name in sanitizers {
        let f = make_builtin(g, env, name, Builtin::Sanitizer);
        bind_global(g, env, name, f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::probe_prop;

    #[test]
    fn global_bindings_resolve_through_scope_and_object() {
        let mut g = Graph::new();
        let env = setup_host(&mut g);
        let (name_node, scope) = g
            .lookup_name(env.base_scope, "setTimeout")
            .expect("setTimeout should be bound");
        assert_eq!(scope, env.base_scope);
        let objs = g.bound_objs(name_node, &BranchPath::new());
        assert_eq!(objs.len(), 1);
        assert_eq!(g.obj(objs[0]).unwrap().builtin, Some(Builtin::SetTimeout));
        // same binding visible as a property of the global object
        let hit = probe_prop(
            &g,
            &env,
            env.global_obj,
            &PropKey::Str("setTimeout".into()),
            &BranchPath::new(),
            5,
        );
        assert_eq!(hit.objs, objs);
    }

    #[test]
    fn array_methods_are_inherited() {
        let mut g = Graph::new();
        let env = setup_host(&mut g);
        let arr = add_obj_node(&mut g, &env, None, JsType::Array, None);
        let hit = probe_prop(
            &g,
            &env,
            arr,
            &PropKey::Str("push".into()),
            &BranchPath::new(),
            5,
        );
        assert!(hit.from_proto);
        assert_eq!(g.obj(hit.objs[0]).unwrap().builtin, Some(Builtin::ArrayPush));
    }

    #[test]
    fn source_functions_bind_on_demand() {
        let mut g = Graph::new();
        let env = setup_host(&mut g);
        bind_config_functions(&mut g, &env, &["user_input".into()], &["parseInt".into()]);
        let (n, _) = g.lookup_name(env.base_scope, "user_input").unwrap();
        let objs = g.bound_objs(n, &BranchPath::new());
        assert_eq!(g.obj(objs[0]).unwrap().builtin, Some(Builtin::TaintSource));
    }
}
