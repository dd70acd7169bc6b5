//! Vulnerability checking over the finished object graph.
//!
//! Sinks are call sites whose callee matches a class's sink list. From each
//! sink statement the checker walks dataflow edges backwards, collecting
//! every acyclic source-to-sink statement path, longest first, and keeps
//! the paths accepted by one of the class's rules. Prototype pollution is not
//! path-based: the interpreter records those sites the moment a tainted
//! write through a builtin prototype happens, and the checker only reports
//! them.

pub mod catalogue;
pub mod rules;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::Config;
use crate::graph::{EdgeKind, Graph, NodeId};
use crate::interp::Interp;

/// One reported flow.
#[derive(Debug, Clone)]
pub struct Finding {
    pub class: String,
    /// Callee name at the sink, as written.
    pub sink: String,
    pub sink_line: Option<u32>,
    /// Statement path, source first, sink last.
    pub path: Vec<NodeId>,
    /// Source line per path statement, where known.
    pub lines: Vec<Option<u32>>,
}

/// Check every configured class against the graph.
pub fn check(it: &Interp) -> Vec<Finding> {
    let mut findings = Vec::new();
    for class in &it.config.classes {
        if class == "proto_pollution" {
            findings.extend(pollution_findings(it));
            continue;
        }
        findings.extend(check_class(&it.g, class, &it.config));
    }
    findings
}

fn check_class(g: &Graph, class: &str, config: &Config) -> Vec<Finding> {
    let sinks = catalogue::sinks_for(class);
    if sinks.is_empty() {
        warn!(class, "unknown vulnerability class, skipping");
        return Vec::new();
    }
    let rules = catalogue::rules_for(class, config);
    let patterns: Vec<Regex> = sinks
        .iter()
        .filter_map(|s| Regex::new(&format!("^(?:{s})$")).ok())
        .collect();

    let mut findings = Vec::new();
    for site in g.node_ids() {
        let Some(kind) = g.kind(site) else { continue };
        if !kind.is_call() {
            continue;
        }
        let Some(callee) = g.callee_name(site) else {
            continue;
        };
        let tail = callee.rsplit('.').next().unwrap_or(&callee);
        if !patterns.iter().any(|p| p.is_match(&callee) || p.is_match(tail)) {
            continue;
        }
        let Some(sink_stmt) = g.nearest_stmt(site) else {
            continue;
        };
        for path in backward_paths(g, sink_stmt) {
            if path.len() < 2 {
                continue;
            }
            if !rules.iter().any(|r| r.matches(g, &path)) {
                continue;
            }
            debug!(class, callee, hops = path.len(), "flow accepted");
            findings.push(Finding {
                class: class.to_string(),
                sink: callee.clone(),
                sink_line: g.line_of(site),
                lines: path.iter().map(|&s| g.line_of(s)).collect(),
                path,
            });
        }
    }
    findings
}

/// All acyclic statement paths ending at `sink_stmt`, walked backwards over
/// dataflow edges, returned source first and longest first.
fn backward_paths(g: &Graph, sink_stmt: NodeId) -> Vec<Vec<NodeId>> {
    let mut paths = Vec::new();
    // stack of (path-so-far, reversed: sink first)
    let mut stack: Vec<Vec<NodeId>> = vec![vec![sink_stmt]];
    while let Some(path) = stack.pop() {
        let tip = *path.last().unwrap();
        let mut extended = false;
        for eid in g.in_edges(tip, EdgeKind::ObjReaches) {
            let def = g.edge(eid).from;
            if path.contains(&def) {
                continue;
            }
            let mut next = path.clone();
            next.push(def);
            stack.push(next);
            extended = true;
        }
        if !extended {
            let mut forward = path;
            forward.reverse();
            paths.push(forward);
        }
    }
    paths.sort_by(|a, b| b.len().cmp(&a.len()));
    paths
}

fn pollution_findings(it: &Interp) -> Vec<Finding> {
    it.proto_pollution
        .iter()
        .map(|site| Finding {
            class: "proto_pollution".to_string(),
            sink: "__proto__".to_string(),
            sink_line: site.lineno,
            path: vec![site.ast],
            lines: vec![site.lineno],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstKind;
    use crate::graph::{AstNode, NodeBody, ObjNode};

    fn stmt_in_list(g: &mut Graph, list: NodeId, childnum: u32) -> NodeId {
        let mut ast = AstNode::new(AstKind::Assign);
        ast.childnum = Some(childnum);
        let stmt = g.add_node(NodeBody::Ast(ast));
        g.add_edge(list, stmt, EdgeKind::ParentOf);
        stmt
    }

    #[test]
    fn longest_path_sorts_first() {
        let mut g = Graph::new();
        let list = g.add_node(NodeBody::Ast(AstNode::new(AstKind::StmtList)));
        let a = stmt_in_list(&mut g, list, 0);
        let b = stmt_in_list(&mut g, list, 1);
        let c = stmt_in_list(&mut g, list, 2);
        let obj = g.add_node(NodeBody::Object(ObjNode::new(crate::graph::JsType::Object)));
        g.add_edge_with(a, c, EdgeKind::ObjReaches, None, Some(obj));
        g.add_edge_with(a, b, EdgeKind::ObjReaches, None, Some(obj));
        g.add_edge_with(b, c, EdgeKind::ObjReaches, None, Some(obj));

        let paths = backward_paths(&g, c);
        assert_eq!(paths[0], vec![a, b, c], "three-hop path should sort first");
        assert!(paths.contains(&vec![a, c]), "direct path should also be found");
    }

    #[test]
    fn cycles_do_not_hang_the_walk() {
        let mut g = Graph::new();
        let list = g.add_node(NodeBody::Ast(AstNode::new(AstKind::StmtList)));
        let a = stmt_in_list(&mut g, list, 0);
        let b = stmt_in_list(&mut g, list, 1);
        g.add_edge_with(a, b, EdgeKind::ObjReaches, None, None);
        g.add_edge_with(b, a, EdgeKind::ObjReaches, None, None);

        let paths = backward_paths(&g, b);
        assert!(paths.iter().all(|p| p.len() <= 2));
    }
}
