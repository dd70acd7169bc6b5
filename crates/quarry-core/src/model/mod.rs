//! The abstract object and scope model layered on the graph store.
//!
//! Variables are name nodes hanging off scope nodes; properties are name
//! nodes hanging off object nodes. A binding is a `NAME_TO_OBJ` edge,
//! optionally branch-tagged. Prototype chains are ordinary `__proto__`
//! property hops ending at the null singleton.

pub mod host;

use tracing::warn;

use crate::branch::{BranchPath, BranchTag, Mark};
use crate::graph::{
    EdgeKind, Graph, JsType, JsValue, NameNode, NodeBody, NodeId, ObjNode, PropKey, ScopeKind,
    ScopeNode,
};

use self::host::HostEnv;

pub const PROTO: &str = "__proto__";

impl Graph {
    // ---- scopes ----

    pub fn add_scope(
        &mut self,
        kind: ScopeKind,
        name: String,
        decl_ast: Option<NodeId>,
        parent: Option<NodeId>,
    ) -> NodeId {
        let scope = self.add_node(NodeBody::Scope(ScopeNode { kind, name }));
        if let Some(parent) = parent {
            self.add_edge(parent, scope, EdgeKind::ParentScopeOf);
        }
        if let Some(ast) = decl_ast {
            self.add_edge(scope, ast, EdgeKind::ScopeToAst);
        }
        scope
    }

    pub fn parent_scope(&self, scope: NodeId) -> Option<NodeId> {
        self.predecessors(scope, EdgeKind::ParentScopeOf)
            .first()
            .copied()
    }

    /// Nearest enclosing non-block scope, `scope` included. Function returns
    /// and `var` hoisting land here.
    pub fn ancestor_function_scope(&self, scope: NodeId) -> NodeId {
        let mut cur = scope;
        loop {
            match self.scope_node(cur).map(|s| s.kind) {
                Some(ScopeKind::Block) => match self.parent_scope(cur) {
                    Some(p) => cur = p,
                    None => return cur,
                },
                _ => return cur,
            }
        }
    }

    // ---- name nodes ----

    pub fn add_scope_name_node(&mut self, scope: NodeId, key: PropKey) -> NodeId {
        let name = self.add_node(NodeBody::Name(NameNode { name: key }));
        self.add_edge(scope, name, EdgeKind::ScopeToVar);
        name
    }

    pub fn scope_name_node(&self, scope: NodeId, key: &str) -> Option<NodeId> {
        self.successors(scope, EdgeKind::ScopeToVar)
            .into_iter()
            .find(|&n| self.name_node(n).is_some_and(|nn| nn.name.as_str() == key))
    }

    pub fn scope_name_nodes(&self, scope: NodeId) -> Vec<NodeId> {
        self.successors(scope, EdgeKind::ScopeToVar)
    }

    /// Walk the scope chain for a variable. Returns the name node and the
    /// scope it was found in.
    pub fn lookup_name(&self, scope: NodeId, key: &str) -> Option<(NodeId, NodeId)> {
        let mut cur = Some(scope);
        while let Some(s) = cur {
            if let Some(n) = self.scope_name_node(s, key) {
                return Some((n, s));
            }
            cur = self.parent_scope(s);
        }
        None
    }

    pub fn add_prop_name_node(&mut self, obj: NodeId, key: PropKey) -> NodeId {
        let name = self.add_node(NodeBody::Name(NameNode { name: key }));
        self.add_edge(obj, name, EdgeKind::ObjToProp);
        name
    }

    pub fn prop_name_node(&self, obj: NodeId, key: &str) -> Option<NodeId> {
        self.successors(obj, EdgeKind::ObjToProp)
            .into_iter()
            .find(|&n| self.name_node(n).is_some_and(|nn| nn.name.as_str() == key))
    }

    pub fn prop_name_nodes(&self, obj: NodeId) -> Vec<NodeId> {
        self.successors(obj, EdgeKind::ObjToProp)
    }

    // ---- bindings ----

    /// Objects bound to a name node, as seen from `path`. Untagged edges are
    /// always visible; tagged edges apply in timestamp order when the path
    /// took their branch. Objects created in another loop iteration are
    /// filtered out.
    pub fn bound_objs(&self, name_node: NodeId, path: &BranchPath) -> Vec<NodeId> {
        let mut objs: Vec<NodeId> = Vec::new();
        for eid in self.out_edges(name_node, EdgeKind::NameToObj) {
            let edge = self.edge(eid);
            if self.is_removed(edge.to) {
                continue;
            }
            match edge.branch {
                None => {
                    if !objs.contains(&edge.to) {
                        objs.push(edge.to);
                    }
                }
                Some(tag) if path.sees(&tag) => {
                    if tag.mark == Some(Mark::Deletion) {
                        objs.retain(|&o| o != edge.to);
                    } else if !objs.contains(&edge.to) {
                        objs.push(edge.to);
                    }
                }
                Some(_) => {}
            }
        }
        objs.retain(|&o| {
            self.obj(o)
                .is_none_or(|node| path.sees_loop_tags(&node.for_tags))
        });
        objs
    }

    /// Rebind a name node. Outside any branch an overwrite drops every
    /// previous edge; inside a branch it retracts this branch's own
    /// additions and lays down deletion edges for what the branch can see,
    /// so sibling arms stay unaffected until the merge pass folds them.
    pub fn assign_name_node(
        &mut self,
        name_node: NodeId,
        objs: &[NodeId],
        overwrite: bool,
        path: &BranchPath,
    ) {
        let choice = path.last_choice();
        if overwrite {
            match choice {
                Some(branch) => {
                    let own: Vec<_> = self
                        .out_edges(name_node, EdgeKind::NameToObj)
                        .into_iter()
                        .filter(|&e| {
                            self.edge(e).branch.is_some_and(|t| {
                                t.same_choice(&branch) && t.mark == Some(Mark::Addition)
                            })
                        })
                        .collect();
                    for e in own {
                        self.remove_edge(e);
                    }
                    for old in self.bound_objs(name_node, path) {
                        if objs.contains(&old) {
                            continue;
                        }
                        self.add_edge_with(
                            name_node,
                            old,
                            EdgeKind::NameToObj,
                            Some(branch.with_mark(Mark::Deletion)),
                            None,
                        );
                    }
                }
                None => {
                    for e in self.out_edges(name_node, EdgeKind::NameToObj) {
                        self.remove_edge(e);
                    }
                }
            }
        }
        let tag: Option<BranchTag> = choice.map(|b| b.with_mark(Mark::Addition));
        for &obj in objs {
            let dup = self
                .edges_between(name_node, obj, EdgeKind::NameToObj)
                .into_iter()
                .any(|e| self.edge(e).branch == tag);
            if !dup {
                self.add_edge_with(name_node, obj, EdgeKind::NameToObj, tag, None);
            }
        }
    }

    /// Own properties of `obj` under `key`, wildcard name nodes included.
    /// A wildcard key matches every property.
    pub fn own_prop(&self, obj: NodeId, key: &PropKey, path: &BranchPath) -> Vec<(NodeId, Vec<NodeId>)> {
        let mut hits = Vec::new();
        for name_node in self.prop_name_nodes(obj) {
            let Some(nn) = self.name_node(name_node) else {
                continue;
            };
            let matched = match (key, &nn.name) {
                (PropKey::Wildcard, _) => true,
                (_, PropKey::Wildcard) => true,
                (PropKey::Str(a), PropKey::Str(b)) => a == b,
            };
            if matched {
                hits.push((name_node, self.bound_objs(name_node, path)));
            }
        }
        hits
    }
}

/// Whether an object reads as "could be anything".
pub fn is_wildcard_obj(g: &Graph, obj: NodeId) -> bool {
    g.obj(obj)
        .is_some_and(|o| matches!(o.value, Some(JsValue::Wildcard)))
}

/// Create an object node of `js_type`, wire its declaration site and its
/// prototype. Function objects get a fresh `prototype` property; string
/// objects get a `length`.
pub fn add_obj_node(
    g: &mut Graph,
    env: &HostEnv,
    ast: Option<NodeId>,
    js_type: JsType,
    value: Option<JsValue>,
) -> NodeId {
    let mut node = ObjNode::new(js_type);
    node.value = value;
    let obj = g.add_node(NodeBody::Object(node));
    if let Some(ast) = ast {
        g.add_edge(obj, ast, EdgeKind::ObjToAst);
        g.add_edge(obj, ast, EdgeKind::ObjDecl);
    }
    let proto = match js_type {
        JsType::Object => Some(env.object_proto),
        JsType::Function => Some(env.function_proto),
        JsType::Array => Some(env.array_proto),
        JsType::String => Some(env.string_proto),
        JsType::Number => Some(env.number_proto),
        JsType::Boolean => Some(env.boolean_proto),
        JsType::Null | JsType::Undefined => None,
    };
    if let Some(proto) = proto {
        set_single_prop(g, obj, PropKey::Str(PROTO.into()), proto);
    }
    match js_type {
        JsType::Function => {
            let proto_obj = {
                let mut p = ObjNode::new(JsType::Object);
                p.value = None;
                let p = g.add_node(NodeBody::Object(p));
                set_single_prop(g, p, PropKey::Str(PROTO.into()), env.object_proto);
                p
            };
            set_single_prop(g, obj, PropKey::Str("prototype".into()), proto_obj);
            set_single_prop(g, proto_obj, PropKey::Str("constructor".into()), obj);
        }
        JsType::String => {
            let len = match &g.obj(obj).and_then(|o| o.value.clone()) {
                Some(JsValue::Str(s)) => Some(JsValue::Num(s.len() as f64)),
                _ => Some(JsValue::Wildcard),
            };
            let mut l = ObjNode::new(JsType::Number);
            l.value = len;
            let l = g.add_node(NodeBody::Object(l));
            set_single_prop(g, obj, PropKey::Str("length".into()), l);
        }
        _ => {}
    }
    obj
}

/// Bind exactly one object under a fresh (or existing) property name node,
/// outside any branch. Setup-time helper.
pub fn set_single_prop(g: &mut Graph, obj: NodeId, key: PropKey, value: NodeId) -> NodeId {
    let name_node = match &key {
        PropKey::Str(s) => g.prop_name_node(obj, s),
        PropKey::Wildcard => None,
    }
    .unwrap_or_else(|| g.add_prop_name_node(obj, key));
    g.assign_name_node(name_node, &[value], true, &BranchPath::new());
    name_node
}

/// One resolved property read.
#[derive(Debug, Default, Clone)]
pub struct PropHit {
    pub name_nodes: Vec<NodeId>,
    pub objs: Vec<NodeId>,
    /// Found by walking the prototype chain rather than on the object.
    pub from_proto: bool,
}

impl PropHit {
    pub fn found(&self) -> bool {
        !self.name_nodes.is_empty() || !self.objs.is_empty()
    }
}

/// Pure prototype-chain lookup: first own hit shadows; otherwise follow
/// `__proto__` hops until the null singleton or the depth ceiling. Never
/// mutates the graph.
pub fn probe_prop(
    g: &Graph,
    env: &HostEnv,
    base: NodeId,
    key: &PropKey,
    path: &BranchPath,
    depth_limit: u32,
) -> PropHit {
    let mut hit = PropHit::default();
    let mut frontier = vec![base];
    let mut visited: Vec<NodeId> = Vec::new();
    for depth in 0..=depth_limit {
        let mut next = Vec::new();
        for &obj in &frontier {
            if visited.contains(&obj) {
                continue;
            }
            visited.push(obj);
            let own = g.own_prop(obj, key, path);
            if !own.is_empty() {
                for (name_node, objs) in own {
                    if !hit.name_nodes.contains(&name_node) {
                        hit.name_nodes.push(name_node);
                    }
                    for o in objs {
                        if !hit.objs.contains(&o) {
                            hit.objs.push(o);
                        }
                    }
                }
                hit.from_proto = depth > 0;
                continue;
            }
            for (_, protos) in g.own_prop(obj, &PropKey::Str(PROTO.into()), path) {
                for proto in protos {
                    if proto != env.null_obj && !next.contains(&proto) {
                        next.push(proto);
                    }
                }
            }
        }
        if hit.found() || next.is_empty() {
            break;
        }
        if depth == depth_limit {
            warn!(?key, "prototype chain exceeded depth ceiling, giving up");
        }
        frontier = next;
    }
    hit
}

/// Create the own property `key` on `base` with a fresh value object.
/// Wildcard parents yield wildcard children; taint flows parent to child.
pub fn materialize_prop(
    g: &mut Graph,
    env: &HostEnv,
    base: NodeId,
    key: PropKey,
    path: &BranchPath,
) -> (NodeId, NodeId) {
    let parent_tainted = g.is_tainted(base);
    let wildcard_parent = is_wildcard_obj(g, base);
    let name_node = match &key {
        PropKey::Str(s) => g.prop_name_node(base, s),
        PropKey::Wildcard => None,
    }
    .unwrap_or_else(|| g.add_prop_name_node(base, key));

    let value = if wildcard_parent {
        Some(JsValue::Wildcard)
    } else {
        None
    };
    let js_type = if wildcard_parent {
        JsType::Object
    } else {
        JsType::Undefined
    };
    let child = add_obj_node(g, env, None, js_type, value);
    if wildcard_parent && parent_tainted {
        if let Some(o) = g.obj_mut(child) {
            o.tainted = true;
        }
        g.add_edge(base, child, EdgeKind::ContributesTo);
    }
    g.assign_name_node(name_node, &[child], false, path);
    // keep the global object and the base scope in sync
    if base == env.global_obj {
        g.add_edge_if_not_exist(env.base_scope, name_node, EdgeKind::ScopeToVar);
    }
    (name_node, child)
}

/// Whether `obj` is one of the builtin prototypes pollution cares about.
pub fn is_builtin_proto(env: &HostEnv, obj: NodeId) -> bool {
    env.builtin_prototypes.contains(&obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branch::{BranchPoint, BranchTag};

    fn setup() -> (Graph, HostEnv) {
        let mut g = Graph::new();
        let env = host::setup_host(&mut g);
        (g, env)
    }

    #[test]
    fn fresh_object_points_at_object_prototype() {
        let (mut g, env) = setup();
        let obj = add_obj_node(&mut g, &env, None, JsType::Object, None);
        let hit = probe_prop(
            &g,
            &env,
            obj,
            &PropKey::Str(PROTO.into()),
            &BranchPath::new(),
            5,
        );
        assert_eq!(hit.objs, vec![env.object_proto]);
    }

    #[test]
    fn prototype_chain_lookup_terminates_at_null() {
        let (mut g, env) = setup();
        let obj = add_obj_node(&mut g, &env, None, JsType::Object, None);
        // missing prop: walks obj -> Object.prototype -> null and stops
        let hit = probe_prop(
            &g,
            &env,
            obj,
            &PropKey::Str("missing".into()),
            &BranchPath::new(),
            5,
        );
        assert!(!hit.found());
    }

    #[test]
    fn inherited_props_are_found_and_flagged() {
        let (mut g, env) = setup();
        let obj = add_obj_node(&mut g, &env, None, JsType::Object, None);
        let val = add_obj_node(&mut g, &env, None, JsType::Number, Some(JsValue::Num(1.0)));
        set_single_prop(&mut g, env.object_proto, PropKey::Str("shared".into()), val);
        let hit = probe_prop(
            &g,
            &env,
            obj,
            &PropKey::Str("shared".into()),
            &BranchPath::new(),
            5,
        );
        assert_eq!(hit.objs, vec![val]);
        assert!(hit.from_proto);
    }

    #[test]
    fn depth_ceiling_stops_synthetic_chains() {
        let (mut g, env) = setup();
        // a chain of 8 objects each the __proto__ of the previous
        let mut cur = add_obj_node(&mut g, &env, None, JsType::Object, None);
        let base = cur;
        for _ in 0..8 {
            let next = add_obj_node(&mut g, &env, None, JsType::Object, None);
            set_single_prop(&mut g, cur, PropKey::Str(PROTO.into()), next);
            cur = next;
        }
        let deep = add_obj_node(&mut g, &env, None, JsType::Number, None);
        set_single_prop(&mut g, cur, PropKey::Str("deep".into()), deep);
        let hit = probe_prop(
            &g,
            &env,
            base,
            &PropKey::Str("deep".into()),
            &BranchPath::new(),
            5,
        );
        assert!(!hit.found(), "lookup past the ceiling must give up");
    }

    #[test]
    fn wildcard_parent_materializes_tainted_child() {
        let (mut g, env) = setup();
        let parent = add_obj_node(&mut g, &env, None, JsType::Object, Some(JsValue::Wildcard));
        g.obj_mut(parent).unwrap().tainted = true;
        let (_, child) = materialize_prop(
            &mut g,
            &env,
            parent,
            PropKey::Str("anything".into()),
            &BranchPath::new(),
        );
        assert!(is_wildcard_obj(&g, child));
        assert!(g.is_tainted(child), "taint flows into synthesized props");
    }

    #[test]
    fn branch_write_is_invisible_to_sibling_arm() {
        let (mut g, env) = setup();
        let scope = env.base_scope;
        let name = g.add_scope_name_node(scope, PropKey::Str("x".into()));
        let obj = add_obj_node(&mut g, &env, None, JsType::Number, Some(JsValue::Num(1.0)));
        let point = BranchPoint(3);
        let arm0 = BranchPath::new().with(BranchTag::choice(point, 0));
        g.assign_name_node(name, &[obj], true, &arm0);
        let arm1 = BranchPath::new().with(BranchTag::choice(point, 1));
        assert!(g.bound_objs(name, &arm1).is_empty());
        assert_eq!(g.bound_objs(name, &arm0), vec![obj]);
    }

    #[test]
    fn overwrite_in_branch_deletes_old_binding_for_that_arm_only() {
        let (mut g, env) = setup();
        let name = g.add_scope_name_node(env.base_scope, PropKey::Str("x".into()));
        let old = add_obj_node(&mut g, &env, None, JsType::Number, Some(JsValue::Num(1.0)));
        g.assign_name_node(name, &[old], true, &BranchPath::new());
        let point = BranchPoint(9);
        let arm0 = BranchPath::new().with(BranchTag::choice(point, 0));
        let new = add_obj_node(&mut g, &env, None, JsType::Number, Some(JsValue::Num(2.0)));
        g.assign_name_node(name, &[new], true, &arm0);
        assert_eq!(g.bound_objs(name, &arm0), vec![new]);
        // outside the branch the old binding still holds
        assert_eq!(g.bound_objs(name, &BranchPath::new()), vec![old]);
    }

    #[test]
    fn global_object_props_become_base_scope_vars() {
        let (mut g, env) = setup();
        let (name_node, _) = materialize_prop(
            &mut g,
            &env,
            env.global_obj,
            PropKey::Str("injected".into()),
            &BranchPath::new(),
        );
        assert_eq!(g.scope_name_node(env.base_scope, "injected"), Some(name_node));
    }
}
