//! Object-graph taint analysis for JavaScript.
//!
//! The engine ingests a node/edge record table describing a program's AST
//! (the bundled SWC frontend produces one from source), abstractly
//! interprets it into an object graph — objects, scopes, name bindings, and
//! dataflow edges, with conditional writes tracked by branch tags — and
//! then searches that graph for flows from taint sources to dangerous
//! sinks.
//!
//! ```no_run
//! use quarry_core::{Analyzer, Config};
//!
//! let analyzer = Analyzer::new(Config::default());
//! let report = analyzer.run_source("const x = user_input(); exec(x);")?;
//! for finding in &report.findings {
//!     println!("{}: {} at line {:?}", finding.class, finding.sink, finding.sink_line);
//! }
//! # Ok::<(), quarry_core::Error>(())
//! ```

pub mod ast;
pub mod branch;
pub mod checker;
pub mod config;
pub mod error;
pub mod frontend;
pub mod gc;
pub mod graph;
pub mod interp;
pub mod model;

use tracing::info;

pub use checker::Finding;
pub use config::Config;
pub use error::{Error, Result};
pub use graph::table::Table;

use graph::{table, Graph};
use interp::Interp;

/// The analysis pipeline: parse (optional), ingest, interpret, check.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    config: Config,
}

/// Everything one analysis run produced.
pub struct Report {
    pub findings: Vec<Finding>,
    /// The time budget ran out; the graph and findings are partial.
    pub timed_out: bool,
    graph: Graph,
}

impl Report {
    /// The finished object graph, dataflow edges included.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Dump the graph back to the record-table format.
    pub fn export(&self) -> Table {
        table::export(&self.graph)
    }
}

impl Analyzer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Parse JavaScript source and analyze it.
    pub fn run_source(&self, code: &str) -> Result<Report> {
        let table = frontend::lower_source(code)?;
        self.run_table(&table)
    }

    /// Analyze a pre-built record table.
    pub fn run_table(&self, table: &Table) -> Result<Report> {
        let mut it = Interp::new(self.config.clone());
        let loaded = table::ingest_into(&mut it.g, table)?;
        if let Some(toplevel) = loaded.toplevel {
            it.run_toplevel(toplevel);
        }
        let findings = checker::check(&it);
        info!(findings = findings.len(), "analysis finished");
        Ok(Report {
            findings,
            timed_out: it.timed_out(),
            graph: it.g,
        })
    }
}
