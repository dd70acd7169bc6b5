//! The abstract interpreter.
//!
//! One `Interp` owns the graph, the host environment, and every piece of
//! bookkeeping the simulation needs: the simulated call stack, per-site call
//! counters, accumulated function returns, the task queues, and the
//! cooperative timeout. Evaluation context that the original design kept in
//! process globals (current scope, current statement, branch path, LHS/RHS
//! side) is threaded explicitly through [`Ctx`].

pub mod assign;
pub mod branching;
pub mod call;
pub mod cond;
pub mod dataflow;
pub mod event_loop;
pub mod func;
pub mod literals;
pub mod loops;
pub mod ops;
pub mod prop;
pub mod vars;

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::ast::AstKind;
use crate::branch::{BranchPath, BranchPoint};
use crate::config::Config;
use crate::graph::{EdgeKind, Graph, JsType, JsValue, NodeId};
use crate::model::host::{self, HostEnv};
use crate::model::add_obj_node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Explicit evaluation context, cloned cheaply at each fork.
#[derive(Debug, Clone)]
pub struct Ctx {
    pub scope: NodeId,
    /// Statement dataflow edges attach to.
    pub stmt: Option<NodeId>,
    pub branches: BranchPath,
    pub side: Option<Side>,
    pub this_objs: Vec<NodeId>,
}

impl Ctx {
    pub fn new(scope: NodeId) -> Self {
        Self {
            scope,
            stmt: None,
            branches: BranchPath::new(),
            side: None,
            this_objs: Vec::new(),
        }
    }

    /// Context for evaluating a subexpression: same world, no LHS/RHS bias.
    pub fn child(&self) -> Self {
        let mut c = self.clone();
        c.side = None;
        c
    }

    pub fn lhs(&self) -> Self {
        let mut c = self.clone();
        c.side = Some(Side::Left);
        c
    }

    pub fn with_branches(&self, branches: BranchPath) -> Self {
        let mut c = self.child();
        c.branches = branches;
        c
    }

    pub fn with_scope(&self, scope: NodeId) -> Self {
        let mut c = self.child();
        c.scope = scope;
        c
    }
}

/// What evaluating one AST node produced.
#[derive(Debug, Clone, Default)]
pub struct HandleResult {
    pub obj_nodes: Vec<NodeId>,
    /// Literal values computed without materializing objects, with the
    /// objects each value came from.
    pub values: Vec<JsValue>,
    pub value_sources: Vec<Vec<NodeId>>,
    pub name: Option<String>,
    pub name_nodes: Vec<NodeId>,
    /// Objects read while computing this result; dataflow edges are built
    /// from them.
    pub used_objs: Vec<NodeId>,
    /// The property path's key was influenced by tainted input.
    pub name_tainted: bool,
    /// The property path's base resolved to a builtin prototype.
    pub parent_is_proto: bool,
    pub parent_objs: Vec<NodeId>,
    pub key_objs: Vec<NodeId>,
    /// A call on the way to this result was skipped by a resource limit;
    /// an empty result with this flag set means "unknown", not "nothing".
    pub terminated: bool,
}

impl HandleResult {
    pub fn of_objs(obj_nodes: Vec<NodeId>) -> Self {
        Self {
            obj_nodes,
            ..Default::default()
        }
    }

    pub fn of_value(value: JsValue, sources: Vec<NodeId>) -> Self {
        Self {
            values: vec![value],
            value_sources: vec![sources],
            ..Default::default()
        }
    }

    pub fn terminated() -> Self {
        Self {
            terminated: true,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.obj_nodes.is_empty() && self.values.is_empty()
    }
}

/// A queued callback invocation.
#[derive(Debug, Clone)]
pub struct Task {
    pub funcs: Vec<NodeId>,
    /// One entry per positional argument, each holding its possible objects.
    pub args: Vec<Vec<NodeId>>,
    pub this_objs: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct PollutionSite {
    pub ast: NodeId,
    pub lineno: Option<u32>,
}

pub struct Interp {
    pub g: Graph,
    pub env: HostEnv,
    pub config: Config,
    /// Function AST nodes currently being simulated.
    pub(crate) call_stack: Vec<NodeId>,
    /// Times each call site has been entered.
    pub(crate) call_site_counter: HashMap<NodeId, u32>,
    /// Objects returned so far, per function scope.
    pub(crate) func_returns: HashMap<NodeId, Vec<NodeId>>,
    next_branch_point: u32,
    /// Previous statement in the current control-flow chain.
    pub(crate) cfg_stmt: Option<NodeId>,
    pub(crate) macro_queue: VecDeque<Task>,
    pub(crate) micro_queue: VecDeque<Task>,
    started: Option<Instant>,
    timed_out: bool,
    pub proto_pollution: Vec<PollutionSite>,
    logged_unknown: HashSet<String>,
}

impl Interp {
    pub fn new(config: Config) -> Self {
        let mut g = Graph::new();
        let env = host::setup_host(&mut g);
        host::bind_config_functions(&mut g, &env, &config.sources, &config.sanitizers);
        Self {
            g,
            env,
            config,
            call_stack: Vec::new(),
            call_site_counter: HashMap::new(),
            func_returns: HashMap::new(),
            next_branch_point: 0,
            cfg_stmt: None,
            macro_queue: VecDeque::new(),
            micro_queue: VecDeque::new(),
            started: None,
            timed_out: false,
            proto_pollution: Vec::new(),
            logged_unknown: HashSet::new(),
        }
    }

    pub fn mint_branch_point(&mut self) -> BranchPoint {
        let p = BranchPoint(self.next_branch_point);
        self.next_branch_point += 1;
        p
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Cooperative timeout check, consulted at every dispatch.
    pub fn finished(&mut self) -> bool {
        if self.timed_out {
            return true;
        }
        if let (Some(started), Some(budget)) = (self.started, self.config.timeout) {
            if started.elapsed() > budget {
                warn!("time budget exhausted, unwinding with partial results");
                self.timed_out = true;
                return true;
            }
        }
        false
    }

    /// Run the toplevel of an ingested program: file scope, hoisting, then
    /// the statements in order.
    pub fn run_toplevel(&mut self, toplevel: NodeId) {
        self.started = Some(Instant::now());
        let file_scope = self.g.add_scope(
            crate::graph::ScopeKind::File,
            "File".into(),
            Some(toplevel),
            Some(self.env.base_scope),
        );
        let ctx = Ctx::new(file_scope);
        let body = match self.g.kind(toplevel) {
            Some(AstKind::Toplevel) => self.g.child_at(toplevel, 0).unwrap_or(toplevel),
            _ => toplevel,
        };
        func::simurun_block(self, &ctx, body, false, true);
        call::run_entry_points(self, &ctx, file_scope);
        event_loop::run_queues(self, &ctx);
        info!(
            nodes = self.g.node_count(),
            edges = self.g.edge_count(),
            timed_out = self.timed_out,
            "abstract interpretation finished"
        );
    }

    /// Evaluate one AST node.
    pub fn dispatch(&mut self, ctx: &Ctx, node: NodeId) -> HandleResult {
        if self.finished() {
            return HandleResult::terminated();
        }
        let Some(kind) = self.g.kind(node).cloned() else {
            return HandleResult::default();
        };
        debug!(?kind, "dispatch");
        match kind {
            AstKind::Toplevel | AstKind::StmtList => func::handle_block_stmt(self, ctx, node),
            AstKind::FuncDecl => func::handle_func_decl(self, ctx, node),
            AstKind::Closure => func::handle_closure(self, ctx, node),
            AstKind::Return => func::handle_return(self, ctx, node),
            AstKind::Assign | AstKind::AssignOp => assign::handle_assign(self, ctx, node),
            AstKind::Var | AstKind::Name => vars::handle_var(self, ctx, node),
            AstKind::Prop | AstKind::Dim => prop::handle_prop(self, ctx, node),
            AstKind::Call | AstKind::MethodCall | AstKind::New => call::ast_call(self, ctx, node),
            AstKind::If => branching::handle_if(self, ctx, node),
            AstKind::IfElem => branching::handle_if_elem(self, ctx, node),
            AstKind::Conditional => branching::handle_conditional(self, ctx, node),
            AstKind::Switch => branching::handle_switch(self, ctx, node),
            AstKind::While | AstKind::DoWhile => loops::handle_while(self, ctx, node),
            AstKind::For => loops::handle_for(self, ctx, node),
            AstKind::ForEach => loops::handle_foreach(self, ctx, node),
            AstKind::BinaryOp => ops::handle_binary(self, ctx, node),
            AstKind::UnaryOp => ops::handle_unary(self, ctx, node),
            AstKind::UpdateOp => ops::handle_update(self, ctx, node),
            AstKind::ExprList => ops::handle_expr_list(self, ctx, node),
            AstKind::EncapsList => literals::handle_encaps_list(self, ctx, node),
            AstKind::Array => literals::handle_array(self, ctx, node),
            AstKind::Str | AstKind::Integer | AstKind::Double | AstKind::Null => {
                literals::handle_literal(self, ctx, node)
            }
            AstKind::Try => func::handle_try(self, ctx, node),
            AstKind::Throw => {
                if let Some(child) = self.g.child_at(node, 0) {
                    self.dispatch(&ctx.child(), child);
                }
                HandleResult::default()
            }
            AstKind::Break | AstKind::Continue => HandleResult::default(),
            AstKind::Unknown(name) => self.not_implemented(&name, node),
            other => self.not_implemented(other.as_str(), node),
        }
    }

    /// Fallback for node kinds the simulation does not model: log once per
    /// kind, contribute nothing.
    fn not_implemented(&mut self, kind: &str, node: NodeId) -> HandleResult {
        if self.logged_unknown.insert(kind.to_string()) {
            warn!(
                kind,
                line = ?self.g.line_of(node),
                "no handler for node kind, treating as opaque"
            );
        }
        HandleResult::default()
    }

    // ---- value plumbing ----

    /// Flatten a result into literal values plus, per value, the objects it
    /// came from.
    pub fn to_values(&self, r: &HandleResult) -> (Vec<JsValue>, Vec<Vec<NodeId>>) {
        let mut values = r.values.clone();
        let mut sources = r.value_sources.clone();
        sources.resize(values.len(), Vec::new());
        for &obj in &r.obj_nodes {
            let value = match self.g.obj(obj) {
                Some(o) => match (&o.value, o.js_type) {
                    (Some(v), _) => v.clone(),
                    (None, JsType::Undefined) => JsValue::Undefined,
                    (None, JsType::Null) => JsValue::Null,
                    (None, _) => JsValue::Wildcard,
                },
                None => JsValue::Wildcard,
            };
            values.push(value);
            sources.push(vec![obj]);
        }
        (values, sources)
    }

    /// Force a result into object nodes, materializing literal values that
    /// were never bound. An empty result reads as `undefined`.
    pub fn to_obj_nodes(&mut self, r: &HandleResult, ast: Option<NodeId>) -> Vec<NodeId> {
        if !r.obj_nodes.is_empty() {
            return r.obj_nodes.clone();
        }
        if r.values.is_empty() {
            return vec![self.env.undefined_obj];
        }
        let mut out = Vec::new();
        for (i, value) in r.values.iter().enumerate() {
            let js_type = match value {
                JsValue::Str(_) => JsType::String,
                JsValue::Num(_) => JsType::Number,
                JsValue::Bool(_) => JsType::Boolean,
                JsValue::Null => JsType::Null,
                JsValue::Undefined => JsType::Undefined,
                JsValue::Wildcard => JsType::Object,
            };
            let env = self.env.clone();
            let obj = add_obj_node(&mut self.g, &env, ast, js_type, Some(value.clone()));
            if let Some(srcs) = r.value_sources.get(i) {
                dataflow::add_contributes_to(self, srcs, obj);
            }
            out.push(obj);
        }
        out
    }

    /// Record a `LOOKUP` edge from the current statement to a name node.
    pub fn record_lookup(&mut self, ctx: &Ctx, name_node: NodeId) {
        if let Some(stmt) = ctx.stmt {
            self.g.add_edge_if_not_exist(stmt, name_node, EdgeKind::Lookup);
        }
    }
}
