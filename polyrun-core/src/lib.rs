//! Workspace dependency graph and concurrent execution engine for monorepos.

pub mod config;
pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod registry;
pub mod scanner;
pub mod selection;
pub mod spec;
pub mod status;
pub mod workspace;

pub use config::{Config, RegistryConfig, RunConfig};
pub use error::{Error, Result};
pub use graph::{Graph, LinkFilter, WorkspaceLink};
pub use orchestrator::{ExecutionMode, Orchestrator, TaskFailure, TaskOutcome};
pub use registry::{NpmRegistry, Registry};
pub use scanner::Scanner;
pub use selection::{Combine, Filter, Selection};
pub use spec::DependencySpec;
pub use status::{summarize, Severity, Status, Summary, SummaryLine};
pub use workspace::{DependencyMaps, DependencyType, Workspace, WorkspaceId};
