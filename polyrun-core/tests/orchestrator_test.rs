use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use polyrun_core::graph::Graph;
use polyrun_core::orchestrator::{ExecutionMode, Orchestrator, TaskFailure};
use polyrun_core::selection::Selection;
use polyrun_core::status::{summarize, Severity};
use polyrun_core::workspace::{DependencyType, Workspace};
use polyrun_core::Error;
use tokio::sync::{Barrier, Notify};
use tokio::time::{sleep, timeout};

fn workspace(name: &str, deps: &[&str]) -> Workspace {
    deps.iter().fold(
        Workspace::new(name, format!("/repo/{}", name)),
        |ws, dep| ws.with_dependency(DependencyType::Dependencies, *dep, "*"),
    )
}

/// `a -> b -> c`
fn chain() -> Graph {
    Graph::build(vec![
        workspace("a", &["b"]),
        workspace("b", &["c"]),
        workspace("c", &[]),
    ])
    .unwrap()
}

fn select(graph: &Graph, names: &[&str]) -> Selection {
    names.iter().map(|n| graph.resolve(n).unwrap()).collect()
}

type Log = Arc<Mutex<Vec<String>>>;

fn recorder(log: &Log) -> impl Fn(Arc<Workspace>) -> std::future::Ready<Result<(), String>> + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |ws: Arc<Workspace>| {
        log.lock().unwrap().push(ws.name.clone());
        std::future::ready(Ok(()))
    }
}

#[tokio::test]
async fn test_ordered_runs_dependencies_first() {
    let graph = chain();
    let selection = select(&graph, &["a", "b", "c"]);
    let log: Log = Arc::default();

    let outcomes = Orchestrator::new(ExecutionMode::Ordered)
        .with_concurrency(1)
        .run(&graph, &selection, recorder(&log))
        .await
        .unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["c", "b", "a"]);
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.is_success()));
}

#[tokio::test]
async fn test_unselected_dependency_is_not_awaited() {
    let graph = chain();
    let selection = select(&graph, &["a", "c"]);
    let signal = Arc::new(Notify::new());

    // `c` can only finish once `a` has started, so `a` must not wait on it.
    let work = {
        let signal = Arc::clone(&signal);
        move |ws: Arc<Workspace>| {
            let signal = Arc::clone(&signal);
            async move {
                if ws.name == "c" {
                    signal.notified().await;
                } else {
                    signal.notify_one();
                }
                Ok::<_, String>(ws.name.clone())
            }
        }
    };

    let outcomes = timeout(
        Duration::from_secs(5),
        Orchestrator::new(ExecutionMode::Ordered)
            .with_concurrency(2)
            .run(&graph, &selection, work),
    )
    .await
    .expect("ordered run blocked on an unselected dependency")
    .unwrap();

    let names: Vec<&str> = outcomes.iter().map(|o| o.workspace.name.as_str()).collect();
    assert_eq!(names, vec!["c", "a"]);
}

#[tokio::test]
async fn test_dependencies_settle_before_dependents_start() {
    let graph = Graph::build(vec![
        workspace("app", &["left", "right"]),
        workspace("left", &["base"]),
        workspace("right", &["base"]),
        workspace("base", &[]),
        workspace("solo", &[]),
    ])
    .unwrap();
    let selection = Selection::all(&graph);
    let clock = Arc::new(AtomicUsize::new(0));
    let spans: Arc<Mutex<HashMap<String, (usize, usize)>>> = Arc::default();

    let work = {
        let clock = Arc::clone(&clock);
        let spans = Arc::clone(&spans);
        move |ws: Arc<Workspace>| {
            let clock = Arc::clone(&clock);
            let spans = Arc::clone(&spans);
            async move {
                let start = clock.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(10)).await;
                let end = clock.fetch_add(1, Ordering::SeqCst);
                spans.lock().unwrap().insert(ws.name.clone(), (start, end));
                Ok::<_, String>(())
            }
        }
    };

    Orchestrator::new(ExecutionMode::Ordered)
        .with_concurrency(4)
        .run(&graph, &selection, work)
        .await
        .unwrap();

    let spans = spans.lock().unwrap();
    for link in graph.links() {
        let dependency = &spans[&graph.get(link.dependency).name];
        let dependent = &spans[&graph.get(link.dependent).name];
        assert!(
            dependency.1 < dependent.0,
            "{} started before {} finished",
            graph.get(link.dependent).name,
            graph.get(link.dependency).name
        );
    }
}

#[tokio::test]
async fn test_failure_does_not_stop_others() {
    let graph = Graph::build(vec![
        workspace("first", &[]),
        workspace("second", &[]),
        workspace("third", &[]),
    ])
    .unwrap();
    let selection = Selection::all(&graph);

    let work = |ws: Arc<Workspace>| async move {
        ws.status().set(Severity::Pending, Some("running"));
        if ws.name == "second" {
            ws.status().set(Severity::Failure, Some("exit code 1"));
            return Err(format!("{} failed", ws.name));
        }
        ws.status().set(Severity::Success, None);
        Ok(())
    };

    let outcomes = Orchestrator::new(ExecutionMode::Ordered)
        .run(&graph, &selection, work)
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 3);

    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|o| !o.is_success())
        .map(|o| o.workspace.name.as_str())
        .collect();
    assert_eq!(failed, vec!["second"]);

    let summary = summarize(
        graph
            .workspaces()
            .map(|(_, ws)| (ws.name.as_str(), ws.status())),
    );
    let severities: Vec<Severity> = summary.lines.iter().map(|l| l.severity).collect();
    assert_eq!(
        severities,
        vec![Severity::Success, Severity::Failure, Severity::Success]
    );
    assert_eq!(summary.overall, Severity::Failure);
    assert!(summary.is_failure());
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn test_panic_is_contained() {
    let graph = chain();
    let selection = Selection::all(&graph);
    let log: Log = Arc::default();

    let work = {
        let log = Arc::clone(&log);
        move |ws: Arc<Workspace>| {
            let log = Arc::clone(&log);
            async move {
                if ws.name == "b" {
                    panic!("boom in {}", ws.name);
                }
                log.lock().unwrap().push(ws.name.clone());
                Ok::<_, String>(())
            }
        }
    };

    let outcomes = Orchestrator::new(ExecutionMode::Ordered)
        .with_concurrency(2)
        .run(&graph, &selection, work)
        .await
        .unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["c", "a"]);
    let b = outcomes.iter().find(|o| o.workspace.name == "b").unwrap();
    match &b.result {
        Err(TaskFailure::Panicked(message)) => assert_eq!(message, "boom in b"),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_sequential_runs_one_at_a_time() {
    let graph = chain();
    let selection = Selection::all(&graph);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let log: Log = Arc::default();

    let work = {
        let (running, peak, log) = (Arc::clone(&running), Arc::clone(&peak), Arc::clone(&log));
        move |ws: Arc<Workspace>| {
            let (running, peak, log) = (Arc::clone(&running), Arc::clone(&peak), Arc::clone(&log));
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(5)).await;
                log.lock().unwrap().push(ws.name.clone());
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, String>(())
            }
        }
    };

    Orchestrator::new(ExecutionMode::Sequential)
        .with_concurrency(8)
        .run(&graph, &selection, work)
        .await
        .unwrap();

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(*log.lock().unwrap(), vec!["c", "b", "a"]);
}

#[tokio::test]
async fn test_strict_sequential_rejects_cycles() {
    let graph = Graph::build(vec![workspace("a", &["b"]), workspace("b", &["a"])]).unwrap();
    let selection = Selection::all(&graph);
    let log: Log = Arc::default();

    let result = Orchestrator::new(ExecutionMode::Sequential)
        .with_strict(true)
        .run(&graph, &selection, recorder(&log))
        .await;
    assert!(matches!(result, Err(Error::CircularDependency(_))));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_ordered_mode_tolerates_cycles() {
    let graph = Graph::build(vec![
        workspace("a", &["b"]),
        workspace("b", &["a"]),
        workspace("c", &["a"]),
    ])
    .unwrap();
    let selection = Selection::all(&graph);
    let log: Log = Arc::default();

    let outcomes = timeout(
        Duration::from_secs(5),
        Orchestrator::new(ExecutionMode::Ordered).run(&graph, &selection, recorder(&log)),
    )
    .await
    .expect("cyclic selection deadlocked")
    .unwrap();
    assert_eq!(outcomes.len(), 3);
    assert_eq!(log.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_independent_ignores_dependencies() {
    let graph = chain();
    let selection = Selection::all(&graph);
    let barrier = Arc::new(Barrier::new(3));

    // Every callback waits for all three to be running at once.
    let work = {
        let barrier = Arc::clone(&barrier);
        move |_: Arc<Workspace>| {
            let barrier = Arc::clone(&barrier);
            async move {
                barrier.wait().await;
                Ok::<_, String>(())
            }
        }
    };

    let outcomes = timeout(
        Duration::from_secs(5),
        Orchestrator::new(ExecutionMode::Independent)
            .with_concurrency(3)
            .run(&graph, &selection, work),
    )
    .await
    .expect("independent run serialized its callbacks")
    .unwrap();
    assert!(outcomes.iter().all(|o| o.is_success()));
}

#[tokio::test]
async fn test_concurrency_limit_respected() {
    let graph = Graph::build(
        ["p1", "p2", "p3", "p4", "p5", "p6"]
            .iter()
            .map(|n| workspace(n, &[]))
            .collect(),
    )
    .unwrap();
    let selection = Selection::all(&graph);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let work = {
        let (running, peak) = (Arc::clone(&running), Arc::clone(&peak));
        move |_: Arc<Workspace>| {
            let (running, peak) = (Arc::clone(&running), Arc::clone(&peak));
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, String>(())
            }
        }
    };

    let outcomes = Orchestrator::new(ExecutionMode::Independent)
        .with_concurrency(2)
        .run(&graph, &selection, work)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 6);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_empty_selection() {
    let graph = chain();
    let log: Log = Arc::default();
    let outcomes = Orchestrator::default()
        .run(&graph, &Selection::default(), recorder(&log))
        .await
        .unwrap();
    assert!(outcomes.is_empty());
}

#[test]
fn test_execution_mode_parsing() {
    assert_eq!("ordered".parse::<ExecutionMode>().unwrap(), ExecutionMode::Ordered);
    assert_eq!("Parallel".parse::<ExecutionMode>().unwrap(), ExecutionMode::Independent);
    assert_eq!("serial".parse::<ExecutionMode>().unwrap(), ExecutionMode::Sequential);
    assert!(matches!("fast".parse::<ExecutionMode>(), Err(Error::Config(_))));
    assert_eq!(Orchestrator::new(ExecutionMode::Ordered).with_concurrency(0).concurrency(), 1);
}
