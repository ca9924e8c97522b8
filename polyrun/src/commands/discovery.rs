//! Discovery and inspection commands.

use anyhow::Result;
use owo_colors::OwoColorize;
use polyrun_core::{Workspace, WorkspaceId};

use crate::formatting::{
    print_link_table, print_section_header, print_warning, print_workspace_table, SectionStyle,
};

use super::{runtime, Context};

pub fn cmd_list(ctx: &Context, json: bool) -> Result<()> {
    let (config, graph) = ctx.load()?;
    let selection = runtime()?.block_on(ctx.select(&graph, &config))?;

    let workspaces: Vec<&Workspace> = selection
        .ordered(&graph)
        .into_iter()
        .map(|id| graph.get(id).as_ref())
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&workspaces)?);
        return Ok(());
    }

    print_section_header("Workspaces", SectionStyle::Primary);
    if workspaces.is_empty() {
        print_warning("No workspaces selected");
    } else {
        let mut sorted = workspaces;
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        print_workspace_table(&sorted);
    }
    println!();

    Ok(())
}

pub fn cmd_graph(ctx: &Context, json: bool, dot: bool) -> Result<()> {
    let (_, graph) = ctx.load()?;

    if dot {
        print!("{}", graph.to_dot());
        return Ok(());
    }

    let name = |id: WorkspaceId| graph.get(id).name.as_str();

    if json {
        let order: Vec<&str> = graph.topological_order().iter().map(|id| name(*id)).collect();
        let links: Vec<serde_json::Value> = graph
            .links()
            .iter()
            .map(|link| {
                serde_json::json!({
                    "dependent": name(link.dependent),
                    "dependency": name(link.dependency),
                    "type": link.dependency_type,
                    "id": link.id,
                    "spec": link.spec,
                })
            })
            .collect();
        let data = serde_json::json!({
            "workspaces": order,
            "links": links,
            "cycles": graph.cycles(),
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{}", "[Dependency Graph]".bold().cyan());
    println!();

    if graph.links().is_empty() {
        println!("  {} No links between workspaces", "WARNING:".yellow());
        println!();
        return Ok(());
    }

    let rows: Vec<Vec<String>> = graph
        .topological_order()
        .iter()
        .flat_map(|id| graph.links_from(*id, false, None))
        .map(|link| {
            vec![
                name(link.dependent).to_string(),
                name(link.dependency).to_string(),
                link.dependency_type.to_string(),
                link.spec.to_string(),
            ]
        })
        .collect();
    print_link_table(&["Workspace", "Depends on", "Section", "Range"], rows);
    println!();

    Ok(())
}
