//! Information and validation commands.

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Result;
use polyrun_core::spec::is_valid_range;
use polyrun_core::{
    summarize, ExecutionMode, Graph, Orchestrator, Severity, Workspace, WorkspaceId,
};

use crate::formatting::{
    print_error, print_key_value, print_link_table, print_section_header,
    print_separator_with_spacing, print_success, print_workspace_list, SectionStyle,
};

use super::{print_summary, runtime, Context};

pub fn cmd_why(ctx: &Context, workspace: String) -> Result<()> {
    let (_, graph) = ctx.load()?;
    let id = graph.resolve(&workspace)?;

    let names = |ids: Vec<WorkspaceId>| -> Vec<String> {
        ids.into_iter()
            .filter(|other| *other != id)
            .map(|other| graph.get(other).name.clone())
            .collect()
    };
    let direct = names(graph.dependencies(id));
    let transitive = names(graph.all_dependencies(id));
    let dependents = names(graph.dependents(id));
    let all_dependents = names(graph.all_dependents(id));

    print_section_header("Workspace Dependencies", SectionStyle::Primary);
    print_key_value("Workspace", &workspace);
    print_key_value("Directory", &graph.get(id).display_dir());
    print_separator_with_spacing();

    print_key_value("Depends on", &format!("{} workspaces", direct.len()));
    print_workspace_list(&direct);
    println!();
    print_key_value(
        "Including transitive",
        &format!("{} workspaces", transitive.len()),
    );
    print_workspace_list(&transitive);
    println!();

    print_key_value("Depended on by", &format!("{} workspaces", dependents.len()));
    print_workspace_list(&dependents);
    println!();
    print_key_value(
        "Including transitive",
        &format!("{} workspaces", all_dependents.len()),
    );
    print_workspace_list(&all_dependents);
    println!();

    Ok(())
}

pub fn cmd_validate(ctx: &Context, json: bool) -> Result<()> {
    let (_, graph) = ctx.load()?;
    let cycles = graph.cycles();

    if json {
        let data = serde_json::json!({
            "valid": cycles.is_empty(),
            "workspaces": graph.len(),
            "links": graph.links().len(),
            "cycles": cycles,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else if cycles.is_empty() {
        print_section_header("Validation", SectionStyle::Success);
        print_success(&format!("All {} workspace manifests are valid", graph.len()));
        print_success("No circular dependencies detected");
        println!();
    } else {
        print_section_header("Validation", SectionStyle::Error);
        for cycle in &cycles {
            print_error(&format!("Circular dependency: {}", cycle.join(" ⇄ ")));
        }
        println!();
    }

    if !cycles.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}

/// A declared range that no longer admits its dependency's version.
struct Mismatch {
    workspace: String,
    dependency: String,
    range: String,
    current: String,
}

fn check_ranges(graph: &Graph, workspace: &Workspace) -> Vec<Mismatch> {
    let Some(id) = graph.find(&workspace.name) else {
        return Vec::new();
    };

    let mismatches: Vec<Mismatch> = graph
        .links_from(id, false, None)
        .into_iter()
        .filter_map(|link| {
            let range = link.spec.range().filter(|r| is_valid_range(r))?;
            let dependency = graph.get(link.dependency);
            let current = dependency.version.as_deref()?;
            let version = semver::Version::parse(current).ok()?;
            (!link.spec.matches(&version)).then(|| Mismatch {
                workspace: workspace.name.clone(),
                dependency: dependency.name.clone(),
                range: range.to_string(),
                current: current.to_string(),
            })
        })
        .collect();

    if mismatches.is_empty() {
        workspace.status().set(Severity::Success, None);
    } else {
        let detail = mismatches
            .iter()
            .map(|m| format!("{}@{} excludes {}", m.dependency, m.range, m.current))
            .collect::<Vec<_>>()
            .join(", ");
        workspace.status().set(Severity::Warning, Some(&detail));
    }
    mismatches
}

pub fn cmd_ranges(ctx: &Context, json: bool) -> Result<()> {
    let (config, graph) = ctx.load()?;
    let rt = runtime()?;
    let selection = rt.block_on(ctx.select(&graph, &config))?;
    let graph = Arc::new(graph);

    let work = {
        let graph = Arc::clone(&graph);
        move |workspace: Arc<Workspace>| {
            let graph = Arc::clone(&graph);
            async move { Ok::<_, Infallible>(check_ranges(&graph, &workspace)) }
        }
    };
    let outcomes = rt.block_on(
        Orchestrator::new(ExecutionMode::Independent)
            .with_concurrency(config.concurrency(None))
            .run(&graph, &selection, work),
    )?;

    let mismatches: Vec<Mismatch> = outcomes
        .into_iter()
        .filter_map(|outcome| outcome.result.ok())
        .flatten()
        .collect();

    if json {
        let data: Vec<serde_json::Value> = mismatches
            .iter()
            .map(|m| {
                serde_json::json!({
                    "workspace": m.workspace,
                    "dependency": m.dependency,
                    "range": m.range,
                    "current": m.current,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    print_section_header("Dependency Ranges", SectionStyle::Primary);
    if !mismatches.is_empty() {
        let rows = mismatches
            .into_iter()
            .map(|m| vec![m.workspace, m.dependency, m.range, m.current])
            .collect();
        print_link_table(&["Workspace", "Dependency", "Range", "Current"], rows);
        println!();
    }

    let summary = summarize(
        selection
            .ordered(&graph)
            .into_iter()
            .map(|id| graph.get(id))
            .map(|ws| (ws.name.as_str(), ws.status())),
    );
    print_summary(&summary, ctx.level);
    println!();

    if summary.is_failure() {
        std::process::exit(summary.exit_code());
    }

    Ok(())
}
