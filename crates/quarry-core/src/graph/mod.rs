//! The graph store.
//!
//! One arena-backed directed multigraph holds everything the analysis
//! produces: the ingested AST, abstract objects, name nodes, and scopes,
//! related by sixteen edge kinds. Edges carry a monotone timestamp minted at
//! insertion; removal tombstones nodes and their incident edges without ever
//! reusing or reordering timestamps, so "latest write" queries stay stable
//! across garbage collection.

pub mod table;

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use id_arena::{Arena, Id};

use crate::ast::AstKind;
use crate::branch::BranchTag;

pub type NodeId = Id<Node>;
pub type EdgeId = Id<Edge>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    ParentOf,
    NameToObj,
    ObjToProp,
    ObjToAst,
    ScopeToVar,
    ParentScopeOf,
    ScopeToAst,
    ObjToScope,
    ObjDecl,
    ContributesTo,
    ObjReaches,
    Lookup,
    FlowsTo,
    Calls,
    Entry,
    Exit,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParentOf => "PARENT_OF",
            Self::NameToObj => "NAME_TO_OBJ",
            Self::ObjToProp => "OBJ_TO_PROP",
            Self::ObjToAst => "OBJ_TO_AST",
            Self::ScopeToVar => "SCOPE_TO_VAR",
            Self::ParentScopeOf => "PARENT_SCOPE_OF",
            Self::ScopeToAst => "SCOPE_TO_AST",
            Self::ObjToScope => "OBJ_TO_SCOPE",
            Self::ObjDecl => "OBJ_DECL",
            Self::ContributesTo => "CONTRIBUTES_TO",
            Self::ObjReaches => "OBJ_REACHES",
            Self::Lookup => "LOOKUP",
            Self::FlowsTo => "FLOWS_TO",
            Self::Calls => "CALLS",
            Self::Entry => "ENTRY",
            Self::Exit => "EXIT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "PARENT_OF" => Self::ParentOf,
            "NAME_TO_OBJ" => Self::NameToObj,
            "OBJ_TO_PROP" => Self::ObjToProp,
            "OBJ_TO_AST" => Self::ObjToAst,
            "SCOPE_TO_VAR" => Self::ScopeToVar,
            "PARENT_SCOPE_OF" => Self::ParentScopeOf,
            "SCOPE_TO_AST" => Self::ScopeToAst,
            "OBJ_TO_SCOPE" => Self::ObjToScope,
            "OBJ_DECL" => Self::ObjDecl,
            "CONTRIBUTES_TO" => Self::ContributesTo,
            "OBJ_REACHES" => Self::ObjReaches,
            "LOOKUP" => Self::Lookup,
            "FLOWS_TO" => Self::FlowsTo,
            "CALLS" => Self::Calls,
            "ENTRY" => Self::Entry,
            "EXIT" => Self::Exit,
            _ => return None,
        })
    }
}

/// Abstract value carried by an object node or a literal expression.
#[derive(Debug, Clone, PartialEq)]
pub enum JsValue {
    /// Unknown value. Poisons every operation it participates in.
    Wildcard,
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
}

impl JsValue {
    /// Three-valued truthiness: `None` when unknown.
    pub fn truthiness(&self) -> Option<bool> {
        match self {
            JsValue::Wildcard => None,
            JsValue::Undefined | JsValue::Null => Some(false),
            JsValue::Bool(b) => Some(*b),
            JsValue::Num(n) => Some(*n != 0.0 && !n.is_nan()),
            JsValue::Str(s) => Some(!s.is_empty()),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, JsValue::Wildcard)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsType {
    Object,
    Function,
    Array,
    String,
    Number,
    Boolean,
    Null,
    Undefined,
}

impl JsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Function => "function",
            Self::Array => "array",
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Null => "null",
            Self::Undefined => "undefined",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AstNode {
    pub kind: AstKind,
    /// Literal payload, identifier name, or operator text.
    pub code: Option<String>,
    /// Declared name for functions.
    pub name: Option<String>,
    /// Declaration kind or literal-shape flag, see [`crate::ast::flags`].
    pub flags: Option<String>,
    pub childnum: Option<u32>,
    pub lineno: Option<u32>,
    pub endlineno: Option<u32>,
    /// Synthesized by the engine rather than ingested (blank functions,
    /// ENTRY/EXIT markers).
    pub artificial: bool,
}

impl AstNode {
    pub fn new(kind: AstKind) -> Self {
        Self {
            kind,
            code: None,
            name: None,
            flags: None,
            childnum: None,
            lineno: None,
            endlineno: None,
            artificial: false,
        }
    }
}

/// Names modeled host functions dispatch to Rust code instead of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    SetTimeout,
    QueueMicrotask,
    PromiseResolve,
    PromiseThen,
    TaintSource,
    Sanitizer,
    ArrayPush,
    ArrayForEach,
}

#[derive(Debug, Clone)]
pub struct ObjNode {
    pub js_type: JsType,
    /// Concrete value when known; `None` means "no value payload", which
    /// reads as a wildcard.
    pub value: Option<JsValue>,
    pub tainted: bool,
    /// Synthesized argument for an entry-point invocation.
    pub fake_arg: bool,
    pub builtin: Option<Builtin>,
    /// Lexical scope a function object closes over.
    pub parent_scope: Option<NodeId>,
    /// Loop-iteration tags; an object created inside one iteration is hidden
    /// from sibling iterations.
    pub for_tags: Vec<BranchTag>,
    pub name: Option<String>,
}

impl ObjNode {
    pub fn new(js_type: JsType) -> Self {
        Self {
            js_type,
            value: None,
            tainted: false,
            fake_arg: false,
            builtin: None,
            parent_scope: None,
            for_tags: Vec::new(),
            name: None,
        }
    }
}

/// Property/variable key. Wildcard names match any key on lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropKey {
    Str(String),
    Wildcard,
}

impl PropKey {
    pub fn as_str(&self) -> &str {
        match self {
            PropKey::Str(s) => s,
            PropKey::Wildcard => "*",
        }
    }

    pub fn from_str(s: &str) -> Self {
        if s == "*" {
            PropKey::Wildcard
        } else {
            PropKey::Str(s.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct NameNode {
    pub name: PropKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Base,
    File,
    Function,
    Block,
}

#[derive(Debug, Clone)]
pub struct ScopeNode {
    pub kind: ScopeKind,
    pub name: String,
}

#[derive(Debug, Clone)]
pub enum NodeBody {
    Ast(AstNode),
    Object(ObjNode),
    Name(NameNode),
    Scope(ScopeNode),
}

impl NodeBody {
    pub fn label(&self) -> &'static str {
        match self {
            NodeBody::Ast(a) if a.artificial => "Artificial_AST",
            NodeBody::Ast(_) => "AST",
            NodeBody::Object(_) => "Object",
            NodeBody::Name(_) => "Name",
            NodeBody::Scope(_) => "Scope",
        }
    }
}

#[derive(Debug)]
pub struct Node {
    pub body: NodeBody,
    out: Vec<EdgeId>,
    inc: Vec<EdgeId>,
    removed: bool,
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
    pub ts: u64,
    pub branch: Option<BranchTag>,
    /// Object carried by an `OBJ_REACHES` edge.
    pub obj: Option<NodeId>,
    removed: bool,
}

#[derive(Debug)]
pub struct Graph {
    nodes: Arena<Node>,
    edges: Arena<Edge>,
    next_ts: u64,
    stmt_cache: RefCell<HashMap<NodeId, Option<NodeId>>>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self {
            nodes: Arena::new(),
            edges: Arena::new(),
            next_ts: 0,
            stmt_cache: RefCell::new(HashMap::new()),
        }
    }

    // ---- nodes ----

    pub fn add_node(&mut self, body: NodeBody) -> NodeId {
        self.nodes.alloc(Node {
            body,
            out: Vec::new(),
            inc: Vec::new(),
            removed: false,
        })
    }

    pub fn body(&self, id: NodeId) -> &NodeBody {
        &self.nodes[id].body
    }

    pub fn body_mut(&mut self, id: NodeId) -> &mut NodeBody {
        &mut self.nodes[id].body
    }

    pub fn is_removed(&self, id: NodeId) -> bool {
        self.nodes[id].removed
    }

    pub fn ast(&self, id: NodeId) -> Option<&AstNode> {
        match &self.nodes[id].body {
            NodeBody::Ast(a) => Some(a),
            _ => None,
        }
    }

    pub fn ast_mut(&mut self, id: NodeId) -> Option<&mut AstNode> {
        match &mut self.nodes[id].body {
            NodeBody::Ast(a) => Some(a),
            _ => None,
        }
    }

    pub fn obj(&self, id: NodeId) -> Option<&ObjNode> {
        match &self.nodes[id].body {
            NodeBody::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn obj_mut(&mut self, id: NodeId) -> Option<&mut ObjNode> {
        match &mut self.nodes[id].body {
            NodeBody::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn name_node(&self, id: NodeId) -> Option<&NameNode> {
        match &self.nodes[id].body {
            NodeBody::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn scope_node(&self, id: NodeId) -> Option<&ScopeNode> {
        match &self.nodes[id].body {
            NodeBody::Scope(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind(&self, id: NodeId) -> Option<&AstKind> {
        self.ast(id).map(|a| &a.kind)
    }

    pub fn is_tainted(&self, id: NodeId) -> bool {
        self.obj(id).is_some_and(|o| o.tainted)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, n)| !n.removed)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|(_, n)| !n.removed).count()
    }

    /// Tombstone a node and every incident edge. Timestamps are not reused.
    pub fn remove_node(&mut self, id: NodeId) {
        let incident: Vec<EdgeId> = self.nodes[id]
            .out
            .iter()
            .chain(self.nodes[id].inc.iter())
            .copied()
            .collect();
        for eid in incident {
            self.edges[eid].removed = true;
        }
        self.nodes[id].removed = true;
        self.stmt_cache.borrow_mut().clear();
    }

    // ---- edges ----

    pub fn add_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) -> EdgeId {
        self.add_edge_with(from, to, kind, None, None)
    }

    pub fn add_edge_with(
        &mut self,
        from: NodeId,
        to: NodeId,
        kind: EdgeKind,
        branch: Option<BranchTag>,
        obj: Option<NodeId>,
    ) -> EdgeId {
        let ts = self.next_ts;
        self.next_ts += 1;
        let eid = self.edges.alloc(Edge {
            from,
            to,
            kind,
            ts,
            branch,
            obj,
            removed: false,
        });
        self.nodes[from].out.push(eid);
        self.nodes[to].inc.push(eid);
        eid
    }

    /// Deduplicating insert for structural edges (no branch, no payload).
    pub fn add_edge_if_not_exist(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) {
        if !self.has_edge(from, to, kind) {
            self.add_edge(from, to, kind);
        }
    }

    pub fn edge(&self, eid: EdgeId) -> &Edge {
        &self.edges[eid]
    }

    pub fn remove_edge(&mut self, eid: EdgeId) {
        self.edges[eid].removed = true;
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().filter(|(_, e)| !e.removed).count()
    }

    pub fn live_edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.edges.iter().filter(|(_, e)| !e.removed)
    }

    /// Outgoing edges of `kind`, in insertion (timestamp) order.
    pub fn out_edges(&self, id: NodeId, kind: EdgeKind) -> Vec<EdgeId> {
        self.nodes[id]
            .out
            .iter()
            .copied()
            .filter(|&e| !self.edges[e].removed && self.edges[e].kind == kind)
            .collect()
    }

    pub fn in_edges(&self, id: NodeId, kind: EdgeKind) -> Vec<EdgeId> {
        self.nodes[id]
            .inc
            .iter()
            .copied()
            .filter(|&e| !self.edges[e].removed && self.edges[e].kind == kind)
            .collect()
    }

    /// Distinct successor nodes over `kind`, in first-edge order.
    pub fn successors(&self, id: NodeId, kind: EdgeKind) -> Vec<NodeId> {
        let mut seen = Vec::new();
        for eid in self.out_edges(id, kind) {
            let to = self.edges[eid].to;
            if !self.nodes[to].removed && !seen.contains(&to) {
                seen.push(to);
            }
        }
        seen
    }

    pub fn predecessors(&self, id: NodeId, kind: EdgeKind) -> Vec<NodeId> {
        let mut seen = Vec::new();
        for eid in self.in_edges(id, kind) {
            let from = self.edges[eid].from;
            if !self.nodes[from].removed && !seen.contains(&from) {
                seen.push(from);
            }
        }
        seen
    }

    pub fn has_edge(&self, from: NodeId, to: NodeId, kind: EdgeKind) -> bool {
        self.out_edges(from, kind)
            .iter()
            .any(|&e| self.edges[e].to == to)
    }

    pub fn edges_between(&self, from: NodeId, to: NodeId, kind: EdgeKind) -> Vec<EdgeId> {
        self.out_edges(from, kind)
            .into_iter()
            .filter(|&e| self.edges[e].to == to)
            .collect()
    }

    // ---- AST helpers ----

    /// Children over `PARENT_OF`, ordered by their `childnum`.
    pub fn ordered_children(&self, id: NodeId) -> Vec<NodeId> {
        let mut children = self.successors(id, EdgeKind::ParentOf);
        children.sort_by_key(|&c| self.ast(c).and_then(|a| a.childnum).unwrap_or(u32::MAX));
        children
    }

    pub fn child_at(&self, id: NodeId, n: usize) -> Option<NodeId> {
        self.ordered_children(id).get(n).copied()
    }

    pub fn ast_parent(&self, id: NodeId) -> Option<NodeId> {
        self.predecessors(id, EdgeKind::ParentOf).first().copied()
    }

    /// Nearest enclosing node that is a direct child of a statement list.
    /// That node is the statement dataflow edges attach to. Memoized.
    pub fn nearest_stmt(&self, id: NodeId) -> Option<NodeId> {
        if let Some(&hit) = self.stmt_cache.borrow().get(&id) {
            return hit;
        }
        let mut cur = id;
        let result = loop {
            match self.ast_parent(cur) {
                Some(p) if matches!(self.kind(p), Some(AstKind::StmtList)) => break Some(cur),
                Some(p) => cur = p,
                None => break None,
            }
        };
        self.stmt_cache.borrow_mut().insert(id, result);
        result
    }

    /// Recover a human name for an expression by BFS over its subtree,
    /// taking the first string-bearing node. Used for callee naming.
    pub fn name_from_child(&self, id: NodeId) -> Option<String> {
        let mut queue = VecDeque::from([id]);
        while let Some(cur) = queue.pop_front() {
            if let Some(a) = self.ast(cur) {
                match a.kind {
                    AstKind::Str | AstKind::Var | AstKind::Name => {
                        if let Some(code) = &a.code {
                            return Some(code.clone());
                        }
                    }
                    _ => {
                        if let Some(name) = &a.name {
                            return Some(name.clone());
                        }
                    }
                }
            }
            // props resolve to their key, so scan children key-last
            for child in self.ordered_children(cur).into_iter().rev() {
                queue.push_front(child);
            }
        }
        None
    }

    /// Callee name of a call site: plain calls recover from the callee
    /// expression, method calls from the property key.
    pub fn callee_name(&self, call: NodeId) -> Option<String> {
        match self.kind(call)? {
            AstKind::Call | AstKind::New => {
                self.child_at(call, 0).and_then(|c| self.name_from_child(c))
            }
            AstKind::MethodCall => self
                .child_at(call, 1)
                .and_then(|c| self.ast(c))
                .and_then(|a| a.code.clone()),
            _ => None,
        }
    }

    pub fn enclosing_function(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = self.ast_parent(id)?;
        loop {
            match self.kind(cur) {
                Some(k) if k.is_function() => return Some(cur),
                Some(AstKind::Toplevel) => return None,
                _ => cur = self.ast_parent(cur)?,
            }
        }
    }

    pub fn line_of(&self, id: NodeId) -> Option<u32> {
        self.ast(id).and_then(|a| a.lineno)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ast(kind: AstKind, childnum: u32) -> NodeBody {
        let mut node = AstNode::new(kind);
        node.childnum = Some(childnum);
        NodeBody::Ast(node)
    }

    #[test]
    fn timestamps_are_monotone_across_removal() {
        let mut g = Graph::new();
        let a = g.add_node(ast(AstKind::Toplevel, 0));
        let b = g.add_node(ast(AstKind::StmtList, 0));
        let e1 = g.add_edge(a, b, EdgeKind::ParentOf);
        let e2 = g.add_edge(a, b, EdgeKind::FlowsTo);
        g.remove_edge(e1);
        let e3 = g.add_edge(a, b, EdgeKind::Lookup);
        let (t1, t2, t3) = (g.edge(e1).ts, g.edge(e2).ts, g.edge(e3).ts);
        assert!(t1 < t2 && t2 < t3, "timestamps must never rewind");
    }

    #[test]
    fn parallel_edges_of_different_kinds_coexist() {
        let mut g = Graph::new();
        let a = g.add_node(ast(AstKind::Var, 0));
        let b = g.add_node(ast(AstKind::Var, 1));
        g.add_edge(a, b, EdgeKind::FlowsTo);
        g.add_edge(a, b, EdgeKind::ObjReaches);
        g.add_edge(a, b, EdgeKind::ObjReaches);
        assert_eq!(g.out_edges(a, EdgeKind::FlowsTo).len(), 1);
        assert_eq!(g.out_edges(a, EdgeKind::ObjReaches).len(), 2);
        assert_eq!(g.successors(a, EdgeKind::ObjReaches), vec![b]);
    }

    #[test]
    fn remove_node_tombstones_incident_edges() {
        let mut g = Graph::new();
        let a = g.add_node(ast(AstKind::Var, 0));
        let b = g.add_node(NodeBody::Object(ObjNode::new(JsType::Object)));
        g.add_edge(a, b, EdgeKind::NameToObj);
        g.remove_node(b);
        assert!(g.is_removed(b));
        assert!(g.out_edges(a, EdgeKind::NameToObj).is_empty());
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn ordered_children_follow_childnum() {
        let mut g = Graph::new();
        let parent = g.add_node(ast(AstKind::StmtList, 0));
        let second = g.add_node(ast(AstKind::Var, 1));
        let first = g.add_node(ast(AstKind::Var, 0));
        g.add_edge(parent, second, EdgeKind::ParentOf);
        g.add_edge(parent, first, EdgeKind::ParentOf);
        assert_eq!(g.ordered_children(parent), vec![first, second]);
    }

    #[test]
    fn nearest_stmt_finds_statement_list_child() {
        let mut g = Graph::new();
        let list = g.add_node(ast(AstKind::StmtList, 0));
        let assign = g.add_node(ast(AstKind::Assign, 0));
        let var = g.add_node(ast(AstKind::Var, 0));
        g.add_edge(list, assign, EdgeKind::ParentOf);
        g.add_edge(assign, var, EdgeKind::ParentOf);
        assert_eq!(g.nearest_stmt(var), Some(assign));
        assert_eq!(g.nearest_stmt(assign), Some(assign));
        assert_eq!(g.nearest_stmt(list), None);
    }

    #[test]
    fn callee_name_for_method_calls_uses_property_key() {
        let mut g = Graph::new();
        let call = g.add_node(ast(AstKind::MethodCall, 0));
        let recv = g.add_node(ast(AstKind::Var, 0));
        let mut key = AstNode::new(AstKind::Str);
        key.code = Some("exec".into());
        key.childnum = Some(1);
        let key = g.add_node(NodeBody::Ast(key));
        g.add_edge(call, recv, EdgeKind::ParentOf);
        g.add_edge(call, key, EdgeKind::ParentOf);
        assert_eq!(g.callee_name(call).as_deref(), Some("exec"));
    }
}
