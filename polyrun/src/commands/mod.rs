//! Command implementations for the CLI.

mod discovery;
mod execution;
mod info;

use std::path::PathBuf;

use anyhow::Result;
use polyrun_core::{
    Combine, Config, ExecutionMode, Filter, Graph, NpmRegistry, Registry, Scanner, Selection,
    Summary,
};
use tracing::debug;
use tracing::level_filters::LevelFilter;

use crate::formatting::{print_summary_table, print_verdict};

pub use discovery::{cmd_graph, cmd_list};
pub use execution::{cmd_exec, cmd_run};
pub use info::{cmd_ranges, cmd_validate, cmd_why};

/// Global options shared by every command.
pub struct Context {
    pub root: PathBuf,
    pub filters: Vec<String>,
    pub combine: Combine,
    pub level: LevelFilter,
}

/// Command-line overrides for `run` and `exec`.
pub struct RunOptions {
    pub mode: Option<ExecutionMode>,
    pub jobs: Option<usize>,
    pub bail: bool,
    pub strict: bool,
}

impl Context {
    fn load(&self) -> Result<(Config, Graph)> {
        let config = Config::load(&self.root)?;
        let workspaces = Scanner::new(&self.root).scan()?;
        let graph = Graph::build(workspaces)?;
        debug!(workspaces = graph.len(), "Loaded repository");
        Ok((config, graph))
    }

    async fn select(&self, graph: &Graph, config: &Config) -> Result<Selection> {
        let filters = self
            .filters
            .iter()
            .map(|expression| Filter::compile(expression))
            .collect::<polyrun_core::Result<Vec<_>>>()?;

        let registry = if filters.iter().any(Filter::needs_registry) {
            Some(NpmRegistry::new(&config.registry.url)?)
        } else {
            None
        };

        let selection = Selection::resolve(
            graph,
            &filters,
            self.combine,
            registry.as_ref().map(|r| r as &dyn Registry),
        )
        .await?;
        debug!(selected = selection.len(), "Resolved selection");
        Ok(selection)
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| anyhow::anyhow!("Failed to create tokio runtime: {}", e))
}

/// Prints the per-workspace table, if visible at `level`, then the verdict.
fn print_summary(summary: &Summary, level: LevelFilter) {
    let lines = summary.visible_lines(level);
    if !lines.is_empty() {
        print_summary_table(lines);
        println!();
    }
    print_verdict(summary);
}
