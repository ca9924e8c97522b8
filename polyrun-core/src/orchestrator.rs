//! Concurrent execution of per-workspace work.
//!
//! The orchestrator only decides *when* each callback runs. It never reads
//! or writes a workspace's [`Status`](crate::status::Status); callbacks
//! record their own outcome and return a value the caller folds afterwards.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::selection::Selection;
use crate::workspace::{Workspace, WorkspaceId};

/// Ordering and concurrency policy of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Concurrent, but a workspace starts only once its selected
    /// dependencies have settled.
    #[default]
    Ordered,
    /// Everything starts at once, bounded only by the concurrency limit.
    Independent,
    /// One workspace at a time, dependencies first.
    Sequential,
}

impl ExecutionMode {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Ordered => "ordered",
            ExecutionMode::Independent => "independent",
            ExecutionMode::Sequential => "sequential",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ordered" => Ok(ExecutionMode::Ordered),
            "independent" | "parallel" => Ok(ExecutionMode::Independent),
            "sequential" | "serial" => Ok(ExecutionMode::Sequential),
            _ => Err(Error::Config(format!(
                "Unknown execution mode '{}'. Expected ordered, independent or sequential",
                s
            ))),
        }
    }
}

/// Why a callback did not produce a value.
#[derive(Debug)]
pub enum TaskFailure<E> {
    /// The callback returned an error.
    Error(E),
    /// The callback panicked; carries the panic message.
    Panicked(String),
}

impl<E: fmt::Display> fmt::Display for TaskFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Error(e) => write!(f, "{}", e),
            TaskFailure::Panicked(message) => write!(f, "panicked: {}", message),
        }
    }
}

/// The settled result of one workspace's callback.
#[derive(Debug)]
pub struct TaskOutcome<T, E> {
    pub id: WorkspaceId,
    pub workspace: Arc<Workspace>,
    pub result: std::result::Result<T, TaskFailure<E>>,
}

impl<T, E> TaskOutcome<T, E> {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Host parallelism, or 1 if it cannot be determined.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Marks a workspace as settled when dropped, even if its task unwinds.
struct SettledGuard(watch::Sender<bool>);

impl Drop for SettledGuard {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

/// Runs a unit of work over selected workspaces.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    mode: ExecutionMode,
    concurrency: usize,
    strict: bool,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(ExecutionMode::default())
    }
}

impl Orchestrator {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            concurrency: default_concurrency(),
            strict: false,
        }
    }

    /// Caps the number of callbacks running at once; values below 1 mean 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// In sequential mode, reject selections containing a cycle.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    #[inline]
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    #[inline]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs `work` for every selected workspace under the configured mode.
    ///
    /// A failing or panicking callback never prevents the others from
    /// running. Outcomes are returned in scheduling order, one per selected
    /// workspace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CircularDependency`] only for strict sequential runs
    /// over a cyclic selection.
    pub async fn run<W, Fut, T, E>(
        &self,
        graph: &Graph,
        selection: &Selection,
        work: W,
    ) -> Result<Vec<TaskOutcome<T, E>>>
    where
        W: Fn(Arc<Workspace>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let work = Arc::new(work);
        debug!(
            mode = %self.mode,
            concurrency = self.concurrency,
            selected = selection.len(),
            "Starting run"
        );

        match self.mode {
            ExecutionMode::Sequential => {
                let order = if self.strict {
                    let subset = selection.iter().collect();
                    graph.strict_order(&subset)?
                } else {
                    selection.ordered(graph)
                };
                let mut outcomes = Vec::with_capacity(order.len());
                for id in order {
                    let workspace = Arc::clone(graph.get(id));
                    debug!(workspace = %workspace.name, "Running");
                    let result = invoke(&work, Arc::clone(&workspace)).await;
                    outcomes.push(TaskOutcome {
                        id,
                        workspace,
                        result,
                    });
                }
                Ok(outcomes)
            }
            ExecutionMode::Ordered => Ok(self.run_concurrent(graph, selection, work, true).await),
            ExecutionMode::Independent => {
                Ok(self.run_concurrent(graph, selection, work, false).await)
            }
        }
    }

    async fn run_concurrent<W, Fut, T, E>(
        &self,
        graph: &Graph,
        selection: &Selection,
        work: Arc<W>,
        respect_dependencies: bool,
    ) -> Vec<TaskOutcome<T, E>>
    where
        W: Fn(Arc<Workspace>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let order = selection.ordered(graph);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut settled: HashMap<WorkspaceId, watch::Receiver<bool>> = HashMap::new();
        let mut tasks = JoinSet::new();

        for (slot, &id) in order.iter().enumerate() {
            // Dependencies placed later in the order close a cycle; waiting
            // on them would deadlock, so only earlier ones are awaited.
            let waits: Vec<watch::Receiver<bool>> = if respect_dependencies {
                graph
                    .dependencies(id)
                    .into_iter()
                    .filter(|dep| {
                        selection.contains(*dep) && graph.position(*dep) < graph.position(id)
                    })
                    .filter_map(|dep| settled.get(&dep).cloned())
                    .collect()
            } else {
                Vec::new()
            };

            let (tx, rx) = watch::channel(false);
            settled.insert(id, rx);

            let workspace = Arc::clone(graph.get(id));
            let semaphore = Arc::clone(&semaphore);
            let work = Arc::clone(&work);
            tasks.spawn(async move {
                let _settled = SettledGuard(tx);
                for mut wait in waits {
                    // A closed channel also means the dependency settled.
                    while !*wait.borrow_and_update() {
                        if wait.changed().await.is_err() {
                            break;
                        }
                    }
                }
                let permit = semaphore.acquire_owned().await;
                debug!(workspace = %workspace.name, "Running");
                let result = invoke(&work, Arc::clone(&workspace)).await;
                // Free the slot before dependents can observe settlement.
                drop(permit);
                (
                    slot,
                    TaskOutcome {
                        id,
                        workspace,
                        result,
                    },
                )
            });
        }

        let mut outcomes: Vec<Option<TaskOutcome<T, E>>> =
            (0..order.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, outcome)) => outcomes[slot] = Some(outcome),
                Err(e) => warn!("Scheduler task did not complete: {}", e),
            }
        }
        outcomes.into_iter().flatten().collect()
    }
}

/// Runs the callback in its own task so a panic is contained.
async fn invoke<W, Fut, T, E>(
    work: &Arc<W>,
    workspace: Arc<Workspace>,
) -> std::result::Result<T, TaskFailure<E>>
where
    W: Fn(Arc<Workspace>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let work = Arc::clone(work);
    let name = workspace.name.clone();
    match tokio::spawn(async move { work(workspace).await }).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(TaskFailure::Error(e)),
        Err(e) => {
            let message = panic_message(e);
            warn!(workspace = %name, "Work panicked: {}", message);
            Err(TaskFailure::Panicked(message))
        }
    }
}

fn panic_message(error: JoinError) -> String {
    if !error.is_panic() {
        return "task was cancelled".to_string();
    }
    let payload: Box<dyn Any + Send> = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
