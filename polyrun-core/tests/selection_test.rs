use std::collections::HashMap;

use async_trait::async_trait;
use polyrun_core::graph::Graph;
use polyrun_core::registry::Registry;
use polyrun_core::selection::{Combine, Filter, Selection};
use polyrun_core::workspace::{DependencyType, Workspace};
use polyrun_core::{Error, Result};

/// Registry answering from a fixed table of published versions.
struct FakeRegistry {
    published: HashMap<String, String>,
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn published_version(&self, name: &str, version: &str) -> Result<Option<String>> {
        Ok(self
            .published
            .get(name)
            .filter(|v| v.as_str() == version)
            .cloned())
    }
}

fn repo() -> Graph {
    Graph::build(vec![
        Workspace::new("monorepo", "/repo").with_root(true).with_private(true),
        Workspace::new("app", "/repo/apps/app")
            .with_relative_dir("apps/app")
            .with_private(true)
            .with_keywords(vec!["frontend".to_string()])
            .with_dependency(DependencyType::Dependencies, "ui", "^1.0.0"),
        Workspace::new("ui", "/repo/packages/ui")
            .with_relative_dir("packages/ui")
            .with_version("1.0.0")
            .with_keywords(vec!["frontend".to_string(), "lib".to_string()])
            .with_dependency(DependencyType::Dependencies, "core", "^2.0.0"),
        Workspace::new("core", "/repo/packages/core")
            .with_relative_dir("packages/core")
            .with_version("2.0.0")
            .with_keywords(vec!["lib".to_string()]),
        Workspace::new("tools", "/repo/packages/nested/tools")
            .with_relative_dir("packages/nested/tools")
            .with_version("0.1.0"),
    ])
    .unwrap()
}

fn filters(expressions: &[&str]) -> Vec<Filter> {
    expressions
        .iter()
        .map(|e| Filter::compile(e).unwrap())
        .collect()
}

async fn select(graph: &Graph, expressions: &[&str], combine: Combine) -> Vec<String> {
    let registry = FakeRegistry {
        published: [("core".to_string(), "2.0.0".to_string())]
            .into_iter()
            .collect(),
    };
    let registry: &dyn Registry = &registry;
    let selection = Selection::resolve(graph, &filters(expressions), combine, Some(registry))
        .await
        .unwrap();
    let mut names: Vec<String> = selection
        .iter()
        .map(|id| graph.get(id).name.clone())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_no_filters_selects_all_but_root() {
    let graph = repo();
    assert_eq!(
        select(&graph, &[], Combine::Any).await,
        vec!["app", "core", "tools", "ui"]
    );
}

#[tokio::test]
async fn test_directory_globs() {
    let graph = repo();
    assert_eq!(
        select(&graph, &["./packages/*"], Combine::Any).await,
        vec!["core", "ui"]
    );
    assert_eq!(
        select(&graph, &["./packages/**"], Combine::Any).await,
        vec!["core", "tools", "ui"]
    );
    assert_eq!(select(&graph, &["./"], Combine::Any).await, vec!["monorepo"]);
}

#[tokio::test]
async fn test_name_and_keyword_filters() {
    let graph = repo();
    assert_eq!(select(&graph, &["u*"], Combine::Any).await, vec!["ui"]);
    assert_eq!(
        select(&graph, &["#frontend"], Combine::Any).await,
        vec!["app", "ui"]
    );
    assert_eq!(
        select(&graph, &["#frontend", "#lib"], Combine::All).await,
        vec!["ui"]
    );
    assert_eq!(
        select(&graph, &["app", "core"], Combine::Any).await,
        vec!["app", "core"]
    );
}

#[tokio::test]
async fn test_visibility_filters() {
    let graph = repo();
    assert_eq!(
        select(&graph, &["@private"], Combine::Any).await,
        vec!["app", "monorepo"]
    );
    assert_eq!(
        select(&graph, &["@public"], Combine::Any).await,
        vec!["core", "tools", "ui"]
    );
}

#[tokio::test]
async fn test_published_filters_skip_versionless() {
    let graph = repo();
    assert_eq!(select(&graph, &["@published"], Combine::Any).await, vec!["core"]);
    // app and the root have no version and match neither.
    assert_eq!(
        select(&graph, &["@unpublished"], Combine::Any).await,
        vec!["tools", "ui"]
    );
}

#[tokio::test]
async fn test_published_requires_registry() {
    let graph = repo();
    let result = Selection::resolve(&graph, &filters(&["@published"]), Combine::Any, None).await;
    assert!(matches!(result, Err(Error::Registry { .. })));
}

#[tokio::test]
async fn test_relational_filters_see_prior_selection() {
    let graph = repo();
    // Everything `app` depends on, transitively.
    assert_eq!(
        select(&graph, &["app", "@dependencies"], Combine::Any).await,
        vec!["app", "core", "ui"]
    );
    // Everything depending on `core`, transitively.
    assert_eq!(
        select(&graph, &["core", "@dependents"], Combine::Any).await,
        vec!["app", "core", "ui"]
    );
    // With nothing selected yet, a relational filter matches nothing.
    assert!(select(&graph, &["@dependencies"], Combine::Any)
        .await
        .is_empty());
}

#[tokio::test]
async fn test_all_combination_narrows() {
    let graph = repo();
    assert_eq!(
        select(&graph, &["./packages/**", "@public", "#lib"], Combine::All).await,
        vec!["core", "ui"]
    );
}

#[tokio::test]
async fn test_resolution_is_deterministic() {
    let graph = repo();
    let first = select(&graph, &["#lib", "@dependents"], Combine::Any).await;
    let second = select(&graph, &["#lib", "@dependents"], Combine::Any).await;
    assert_eq!(first, second);
    assert_eq!(first, vec!["app", "core", "ui"]);
}

#[test]
fn test_invalid_expressions() {
    for expression in ["", "#", "@unknown", "packages/ui", "@"] {
        assert!(
            matches!(
                Filter::compile(expression),
                Err(Error::InvalidFilterExpression(_))
            ),
            "expected '{}' to be rejected",
            expression
        );
    }
}

#[test]
fn test_filter_metadata() {
    let filter = Filter::compile(" @dependents ").unwrap();
    assert_eq!(filter.expression(), "@dependents");
    assert!(filter.is_relational());
    assert!(!filter.needs_registry());
    assert!(Filter::compile("@unpublished").unwrap().needs_registry());
}

#[test]
fn test_ordered_follows_topology() {
    let graph = repo();
    let selection = Selection::all(&graph);
    let order: Vec<String> = selection
        .ordered(&graph)
        .into_iter()
        .map(|id| graph.get(id).name.clone())
        .collect();
    let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
    assert!(pos("core") < pos("ui"));
    assert!(pos("ui") < pos("app"));
}
