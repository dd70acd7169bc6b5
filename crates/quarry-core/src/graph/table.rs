//! The node/edge record table.
//!
//! This is the ingestion contract: any parser that can emit these records
//! can feed the engine. The bundled swc frontend is one such producer. The
//! same shapes serve as the export format, so a finished graph (objects,
//! names, scopes, dataflow edges, timestamps) can be dumped for downstream
//! tooling.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ast::AstKind;
use crate::error::IngestError;
use crate::graph::{AstNode, EdgeKind, Graph, JsValue, NodeBody, NodeId};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: u32,
    pub labels: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub flags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub lineno: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub endlineno: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub childnum: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub start: u32,
    pub end: u32,
    #[serde(rename = "type")]
    pub edge_type: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ts: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl Table {
    /// Read a table from its JSON form, the interchange format for
    /// external producers.
    pub fn from_json(json: &str) -> Result<Self, IngestError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, IngestError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug)]
pub struct Ingested {
    pub graph: Graph,
    /// External record id to graph node.
    pub ids: HashMap<u32, NodeId>,
    pub toplevel: Option<NodeId>,
}

/// Where a table landed after ingestion into an existing graph.
#[derive(Debug)]
pub struct Loaded {
    pub ids: HashMap<u32, NodeId>,
    pub toplevel: Option<NodeId>,
}

/// Build a graph from an AST record table. Malformed records are fatal for
/// the input; unknown AST kind strings are not (they become
/// [`AstKind::Unknown`] and fall into the interpreter's dispatch fallback).
pub fn ingest(table: &Table) -> Result<Ingested, IngestError> {
    let mut graph = Graph::new();
    let loaded = ingest_into(&mut graph, table)?;
    Ok(Ingested {
        graph,
        ids: loaded.ids,
        toplevel: loaded.toplevel,
    })
}

/// Ingest a table into a graph that may already hold other nodes (the host
/// environment, typically).
pub fn ingest_into(graph: &mut Graph, table: &Table) -> Result<Loaded, IngestError> {
    let mut ids = HashMap::new();
    let mut toplevel = None;

    for rec in &table.nodes {
        if ids.contains_key(&rec.id) {
            return Err(IngestError::DuplicateNodeId(rec.id));
        }
        let artificial = match rec.labels.as_str() {
            "AST" => false,
            "Artificial_AST" => true,
            other => return Err(IngestError::UnknownLabel(other.to_string())),
        };
        if rec.node_type.is_empty() {
            return Err(IngestError::MissingField {
                id: rec.id,
                field: "type",
            });
        }
        let mut node = AstNode::new(AstKind::from_str(&rec.node_type));
        node.code = rec.code.clone();
        node.name = rec.name.clone();
        node.flags = rec.flags.clone();
        node.childnum = rec.childnum;
        node.lineno = rec.lineno;
        node.endlineno = rec.endlineno;
        node.artificial = artificial;
        let is_toplevel = node.kind == AstKind::Toplevel;
        let id = graph.add_node(NodeBody::Ast(node));
        if is_toplevel && toplevel.is_none() {
            toplevel = Some(id);
        }
        ids.insert(rec.id, id);
    }

    for rec in &table.edges {
        let kind = EdgeKind::from_str(&rec.edge_type)
            .ok_or_else(|| IngestError::UnknownEdgeType(rec.edge_type.clone()))?;
        let from = *ids
            .get(&rec.start)
            .ok_or(IngestError::UnknownNodeId(rec.start))?;
        let to = *ids
            .get(&rec.end)
            .ok_or(IngestError::UnknownNodeId(rec.end))?;
        graph.add_edge(from, to, kind);
    }

    Ok(Loaded { ids, toplevel })
}

fn value_code(value: &JsValue) -> String {
    match value {
        JsValue::Wildcard => "*".into(),
        JsValue::Undefined => "undefined".into(),
        JsValue::Null => "null".into(),
        JsValue::Bool(b) => b.to_string(),
        JsValue::Num(n) => n.to_string(),
        JsValue::Str(s) => s.clone(),
    }
}

/// Dump the whole graph, synthesized nodes and dataflow edges included.
pub fn export(graph: &Graph) -> Table {
    let mut nodes = Vec::new();
    for id in graph.node_ids() {
        let mut rec = NodeRecord {
            id: id.index() as u32,
            labels: graph.body(id).label().to_string(),
            ..Default::default()
        };
        match graph.body(id) {
            NodeBody::Ast(a) => {
                rec.node_type = a.kind.as_str().to_string();
                rec.flags = a.flags.clone();
                rec.lineno = a.lineno;
                rec.endlineno = a.endlineno;
                rec.childnum = a.childnum;
                rec.code = a.code.clone();
                rec.name = a.name.clone();
            }
            NodeBody::Object(o) => {
                rec.node_type = o.js_type.as_str().to_string();
                rec.code = o.value.as_ref().map(value_code);
                rec.name = o.name.clone();
                if o.tainted {
                    rec.flags = Some("tainted".into());
                }
            }
            NodeBody::Name(n) => {
                rec.node_type = "NAME".into();
                rec.name = Some(n.name.as_str().to_string());
            }
            NodeBody::Scope(s) => {
                rec.node_type = format!("{:?}", s.kind).to_uppercase();
                rec.name = Some(s.name.clone());
            }
        }
        nodes.push(rec);
    }

    let mut edges: Vec<EdgeRecord> = graph
        .live_edges()
        .map(|(_, e)| EdgeRecord {
            start: e.from.index() as u32,
            end: e.to.index() as u32,
            edge_type: e.kind.as_str().to_string(),
            ts: Some(e.ts),
            tag: e.branch.map(|t| {
                format!(
                    "{}:{}:{}",
                    t.point.0,
                    t.branch,
                    t.mark.map(|m| m.as_str()).unwrap_or("-")
                )
            }),
        })
        .collect();
    edges.sort_by_key(|e| e.ts);

    Table { nodes, edges }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u32, node_type: &str, childnum: Option<u32>) -> NodeRecord {
        NodeRecord {
            id,
            labels: "AST".into(),
            node_type: node_type.into(),
            childnum,
            ..Default::default()
        }
    }

    fn edge(start: u32, end: u32) -> EdgeRecord {
        EdgeRecord {
            start,
            end,
            edge_type: "PARENT_OF".into(),
            ts: None,
            tag: None,
        }
    }

    #[test]
    fn ingests_a_minimal_tree() {
        let table = Table {
            nodes: vec![
                node(10, "AST_TOPLEVEL", None),
                node(11, "AST_STMT_LIST", Some(0)),
            ],
            edges: vec![edge(10, 11)],
        };
        let ingested = ingest(&table).expect("table should ingest");
        let top = ingested.toplevel.expect("toplevel should be found");
        assert_eq!(ingested.graph.ordered_children(top).len(), 1);
    }

    #[test]
    fn duplicate_node_id_is_fatal() {
        let table = Table {
            nodes: vec![node(1, "AST_VAR", None), node(1, "AST_VAR", None)],
            edges: vec![],
        };
        assert!(matches!(
            ingest(&table),
            Err(IngestError::DuplicateNodeId(1))
        ));
    }

    #[test]
    fn dangling_edge_is_fatal() {
        let table = Table {
            nodes: vec![node(1, "AST_TOPLEVEL", None)],
            edges: vec![edge(1, 99)],
        };
        assert!(matches!(ingest(&table), Err(IngestError::UnknownNodeId(99))));
    }

    #[test]
    fn unknown_kind_string_is_not_fatal() {
        let table = Table {
            nodes: vec![node(1, "AST_YIELD", None)],
            edges: vec![],
        };
        let ingested = ingest(&table).expect("unknown kinds must not fail ingestion");
        let id = ingested.ids[&1];
        assert!(matches!(
            ingested.graph.kind(id),
            Some(AstKind::Unknown(s)) if s == "AST_YIELD"
        ));
    }

    #[test]
    fn json_form_round_trips() {
        let table = Table {
            nodes: vec![node(0, "AST_TOPLEVEL", None)],
            edges: vec![],
        };
        let json = table.to_json().expect("serialize");
        let back = Table::from_json(&json).expect("deserialize");
        assert_eq!(back.nodes.len(), 1);
        assert_eq!(back.nodes[0].node_type, "AST_TOPLEVEL");
        assert!(matches!(
            Table::from_json("{"),
            Err(IngestError::Json(_))
        ));
    }

    #[test]
    fn export_round_trips_the_ast() {
        let table = Table {
            nodes: vec![
                node(0, "AST_TOPLEVEL", None),
                node(1, "AST_STMT_LIST", Some(0)),
            ],
            edges: vec![edge(0, 1)],
        };
        let ingested = ingest(&table).expect("ingest");
        let dumped = export(&ingested.graph);
        assert_eq!(dumped.nodes.len(), 2);
        assert_eq!(dumped.edges.len(), 1);
        assert!(dumped.edges[0].ts.is_some(), "export carries timestamps");
        // the dump itself is ingestible
        assert!(ingest(&dumped).is_ok());
    }
}
