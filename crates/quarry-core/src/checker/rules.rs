//! Path predicates.
//!
//! A rule is a conjunction: every predicate must hold on a candidate
//! source-to-sink path for the path to be reported. Predicates look only at
//! the graph, never mutate it. The per-class rule lists live in
//! [`super::catalogue`].

use crate::graph::{EdgeKind, Graph, NodeId};

/// One condition over a statement path (ordered source first).
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Every hop carries an object influenced by tainted input.
    HasTaintedInput,
    /// Some statement on the path calls one of the named functions.
    ExistFunc(Vec<String>),
    /// No statement on the path calls any of the named functions.
    NotExistFunc(Vec<String>),
    /// The sink statement calls one of the named functions.
    EndWithFunc(Vec<String>),
    /// The source statement reads one of the named variables.
    StartWithVar(Vec<String>),
    /// The source statement does not call any of the named functions.
    NotStartWithFunc(Vec<String>),
    /// The source statement belongs to the analyzed file, not to something
    /// the engine synthesized (blank functions, modeled builtins).
    NotStartSynthetic,
}

#[derive(Debug, Clone, Default)]
pub struct Rule {
    pub predicates: Vec<Predicate>,
}

impl Rule {
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    pub fn matches(&self, g: &Graph, path: &[NodeId]) -> bool {
        self.predicates.iter().all(|p| p.matches(g, path))
    }
}

impl Predicate {
    pub fn matches(&self, g: &Graph, path: &[NodeId]) -> bool {
        match self {
            Predicate::HasTaintedInput => path.windows(2).all(|w| tainted_hop(g, w[0], w[1])),
            Predicate::ExistFunc(names) => path.iter().any(|&s| calls_any(g, s, names)),
            Predicate::NotExistFunc(names) => !path.iter().any(|&s| calls_any(g, s, names)),
            Predicate::EndWithFunc(names) => {
                path.last().is_some_and(|&s| calls_any(g, s, names))
            }
            Predicate::StartWithVar(names) => path
                .first()
                .is_some_and(|&s| names.iter().any(|n| reads_var(g, s, n))),
            Predicate::NotStartWithFunc(names) => {
                !path.first().is_some_and(|&s| calls_any(g, s, names))
            }
            Predicate::NotStartSynthetic => path
                .first()
                .is_some_and(|&s| g.ast(s).is_some_and(|a| !a.artificial)),
        }
    }
}

/// A hop holds if some dataflow edge between the statements carries a
/// tainted object.
fn tainted_hop(g: &Graph, def: NodeId, use_: NodeId) -> bool {
    g.edges_between(def, use_, EdgeKind::ObjReaches)
        .iter()
        .any(|&e| g.edge(e).obj.is_some_and(|obj| g.is_tainted(obj)))
}

fn calls_any(g: &Graph, stmt: NodeId, names: &[String]) -> bool {
    names.iter().any(|n| calls_func(g, stmt, n))
}

/// Does the statement contain a call to `name`? Matches the full callee
/// name and its last dot-segment.
pub fn calls_func(g: &Graph, stmt: NodeId, name: &str) -> bool {
    let mut worklist = vec![stmt];
    while let Some(node) = worklist.pop() {
        if let Some(kind) = g.kind(node) {
            if kind.is_call() {
                if let Some(callee) = g.callee_name(node) {
                    if callee == name || callee.rsplit('.').next() == Some(name) {
                        return true;
                    }
                }
            }
        }
        worklist.extend(g.ordered_children(node));
    }
    false
}

fn reads_var(g: &Graph, stmt: NodeId, name: &str) -> bool {
    let mut worklist = vec![stmt];
    while let Some(node) = worklist.pop() {
        if let Some(ast) = g.ast(node) {
            if matches!(ast.kind, crate::ast::AstKind::Var | crate::ast::AstKind::Name)
                && ast.code.as_deref() == Some(name)
            {
                return true;
            }
        }
        worklist.extend(g.ordered_children(node));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstKind;
    use crate::graph::{AstNode, NodeBody};

    fn stmt_with_call(g: &mut Graph, callee: &str) -> NodeId {
        let stmt = g.add_node(NodeBody::Ast(AstNode::new(AstKind::Call)));
        let mut name = AstNode::new(AstKind::Name);
        name.code = Some(callee.to_string());
        name.childnum = Some(0);
        let name = g.add_node(NodeBody::Ast(name));
        g.add_edge(stmt, name, EdgeKind::ParentOf);
        stmt
    }

    #[test]
    fn exist_func_scans_the_whole_path() {
        let mut g = Graph::new();
        let a = stmt_with_call(&mut g, "parseInt");
        let b = stmt_with_call(&mut g, "exec");
        let path = vec![a, b];
        assert!(Predicate::ExistFunc(vec!["parseInt".into()]).matches(&g, &path));
        assert!(Predicate::EndWithFunc(vec!["exec".into()]).matches(&g, &path));
        assert!(!Predicate::NotExistFunc(vec!["exec".into()]).matches(&g, &path));
        assert!(Predicate::NotStartWithFunc(vec!["exec".into()]).matches(&g, &path));
    }

    #[test]
    fn start_with_var_checks_the_source_statement() {
        let mut g = Graph::new();
        let stmt = g.add_node(NodeBody::Ast(AstNode::new(AstKind::Assign)));
        let mut var = AstNode::new(AstKind::Var);
        var.code = Some("input".to_string());
        let var = g.add_node(NodeBody::Ast(var));
        g.add_edge(stmt, var, EdgeKind::ParentOf);
        assert!(Predicate::StartWithVar(vec!["input".into()]).matches(&g, &[stmt]));
        assert!(!Predicate::StartWithVar(vec!["other".into()]).matches(&g, &[stmt]));
    }

    #[test]
    fn synthetic_sources_fail_the_in_file_check() {
        let mut g = Graph::new();
        let real = g.add_node(NodeBody::Ast(AstNode::new(AstKind::Assign)));
        let mut fake = AstNode::new(AstKind::Assign);
        fake.artificial = true;
        let fake = g.add_node(NodeBody::Ast(fake));
        assert!(Predicate::NotStartSynthetic.matches(&g, &[real, fake]));
        assert!(!Predicate::NotStartSynthetic.matches(&g, &[fake, real]));
    }
}
