//! Workspace dependency graph.
//!
//! Edges are discovered by name: a link exists whenever a workspace's
//! manifest lists an entry resolving to another workspace's name, whatever
//! the declared range. The graph may therefore contain cycles, and every
//! traversal here is written to terminate on them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::dot::{Config as DotConfig, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::spec::DependencySpec;
use crate::workspace::{DependencyType, Workspace, WorkspaceId};

/// A directed dependency relationship between two workspaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceLink {
    pub dependent: WorkspaceId,
    pub dependency: WorkspaceId,
    pub dependency_type: DependencyType,
    /// The manifest key; differs from the dependency's name under an alias.
    pub id: String,
    pub spec: DependencySpec,
}

impl WorkspaceLink {
    #[inline]
    fn far_end(&self, direction: Direction) -> WorkspaceId {
        match direction {
            Direction::Outgoing => self.dependency,
            Direction::Incoming => self.dependent,
        }
    }
}

/// Predicate deciding whether a traversal may follow a link.
pub type LinkFilter<'a> = &'a dyn Fn(&WorkspaceLink) -> bool;

/// Dependency graph over an immutable set of workspaces.
#[derive(Debug)]
pub struct Graph {
    workspaces: Vec<Arc<Workspace>>,
    by_name: HashMap<String, WorkspaceId>,
    links: Vec<WorkspaceLink>,
    /// Per dependent, indices of its links sorted by dependency name.
    outgoing: Vec<Vec<usize>>,
    /// Per dependency, indices of its links sorted by dependent name.
    incoming: Vec<Vec<usize>>,
    /// Mirror of the links as a petgraph graph (dependent -> dependency).
    inner: DiGraph<WorkspaceId, usize>,
    order: Vec<WorkspaceId>,
    positions: Vec<usize>,
}

impl Graph {
    /// Builds the graph from discovered workspaces.
    ///
    /// # Errors
    ///
    /// Returns an error if two workspaces share a name or if a dependency
    /// range cannot be classified.
    pub fn build(workspaces: Vec<Workspace>) -> Result<Self> {
        let workspaces: Vec<Arc<Workspace>> = workspaces.into_iter().map(Arc::new).collect();

        let mut by_name = HashMap::with_capacity(workspaces.len());
        for (idx, workspace) in workspaces.iter().enumerate() {
            if let Some(previous) = by_name.insert(workspace.name.clone(), WorkspaceId(idx)) {
                return Err(Error::DuplicateWorkspace {
                    name: workspace.name.clone(),
                    first: workspaces[previous.0].directory.clone(),
                    second: workspace.directory.clone(),
                });
            }
        }

        let mut links = Vec::new();
        let mut seen = HashSet::new();
        for (idx, workspace) in workspaces.iter().enumerate() {
            let dependent = WorkspaceId(idx);
            for (dependency_type, id, raw) in workspace.dependencies.iter() {
                let spec = DependencySpec::classify(raw).map_err(|e| {
                    warn!(
                        workspace = %workspace.name,
                        entry = id,
                        "Unclassifiable {} entry",
                        dependency_type
                    );
                    e
                })?;
                let Some(&dependency) = by_name.get(spec.package_name(id)) else {
                    continue;
                };
                if dependency == dependent {
                    debug!(workspace = %workspace.name, "Ignoring self-referencing entry {}", id);
                    continue;
                }
                if !seen.insert((dependent, dependency, dependency_type)) {
                    continue;
                }
                links.push(WorkspaceLink {
                    dependent,
                    dependency,
                    dependency_type,
                    id: id.to_string(),
                    spec,
                });
            }
        }

        let name_of = |id: WorkspaceId| workspaces[id.0].name.as_str();
        let mut outgoing = vec![Vec::new(); workspaces.len()];
        let mut incoming = vec![Vec::new(); workspaces.len()];
        for (idx, link) in links.iter().enumerate() {
            outgoing[link.dependent.0].push(idx);
            incoming[link.dependency.0].push(idx);
        }
        for list in &mut outgoing {
            list.sort_by(|&a, &b| {
                name_of(links[a].dependency)
                    .cmp(name_of(links[b].dependency))
                    .then(links[a].dependency_type.cmp(&links[b].dependency_type))
            });
        }
        for list in &mut incoming {
            list.sort_by(|&a, &b| {
                name_of(links[a].dependent)
                    .cmp(name_of(links[b].dependent))
                    .then(links[a].dependency_type.cmp(&links[b].dependency_type))
            });
        }

        let mut inner = DiGraph::with_capacity(workspaces.len(), links.len());
        for idx in 0..workspaces.len() {
            inner.add_node(WorkspaceId(idx));
        }
        for (idx, link) in links.iter().enumerate() {
            inner.add_edge(
                NodeIndex::new(link.dependent.0),
                NodeIndex::new(link.dependency.0),
                idx,
            );
        }

        let mut graph = Self {
            workspaces,
            by_name,
            links,
            outgoing,
            incoming,
            inner,
            order: Vec::new(),
            positions: Vec::new(),
        };
        graph.order = graph.compute_order();
        graph.positions = vec![0; graph.order.len()];
        for (position, id) in graph.order.iter().enumerate() {
            graph.positions[id.0] = position;
        }

        debug!(
            workspaces = graph.workspaces.len(),
            links = graph.links.len(),
            "Built workspace graph"
        );
        Ok(graph)
    }

    /// Dependency-first order over every workspace, cycles broken at the
    /// first revisited node.
    fn compute_order(&self) -> Vec<WorkspaceId> {
        let mut roots: Vec<WorkspaceId> = self.ids().collect();
        roots.sort_by(|a, b| self.workspaces[a.0].name.cmp(&self.workspaces[b.0].name));

        let mut visited = vec![false; self.workspaces.len()];
        let mut order = Vec::with_capacity(self.workspaces.len());
        let mut stack: Vec<(WorkspaceId, usize)> = Vec::new();

        for root in roots {
            if visited[root.0] {
                continue;
            }
            visited[root.0] = true;
            stack.push((root, 0));
            while let Some(top) = stack.len().checked_sub(1) {
                let (node, cursor) = stack[top];
                match self.outgoing[node.0].get(cursor) {
                    Some(&link) => {
                        stack[top].1 += 1;
                        let next = self.links[link].dependency;
                        if !visited[next.0] {
                            visited[next.0] = true;
                            stack.push((next, 0));
                        }
                    }
                    None => {
                        stack.pop();
                        order.push(node);
                    }
                }
            }
        }
        order
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = WorkspaceId> {
        (0..self.workspaces.len()).map(WorkspaceId)
    }

    #[inline]
    pub fn get(&self, id: WorkspaceId) -> &Arc<Workspace> {
        &self.workspaces[id.0]
    }

    pub fn workspaces(&self) -> impl Iterator<Item = (WorkspaceId, &Arc<Workspace>)> {
        self.workspaces
            .iter()
            .enumerate()
            .map(|(idx, ws)| (WorkspaceId(idx), ws))
    }

    #[inline]
    pub fn find(&self, name: &str) -> Option<WorkspaceId> {
        self.by_name.get(name).copied()
    }

    /// Looks up a workspace by name.
    ///
    /// # Errors
    ///
    /// Returns an error naming the available workspaces if none matches.
    pub fn resolve(&self, name: &str) -> Result<WorkspaceId> {
        self.find(name).ok_or_else(|| {
            let mut available: Vec<&str> =
                self.workspaces.iter().map(|w| w.name.as_str()).collect();
            available.sort_unstable();
            Error::WorkspaceNotFound {
                name: name.to_string(),
                available: available.join(", "),
            }
        })
    }

    #[inline]
    pub fn links(&self) -> &[WorkspaceLink] {
        &self.links
    }

    /// Links from `dependent` to the workspaces it depends on.
    ///
    /// When `recursive`, follows dependency edges transitively and returns
    /// one link per reachable workspace, dependencies before dependents. A
    /// `filter` rejecting a link also prunes whatever is only reachable
    /// through it.
    pub fn links_from(
        &self,
        dependent: WorkspaceId,
        recursive: bool,
        filter: Option<LinkFilter<'_>>,
    ) -> Vec<&WorkspaceLink> {
        self.walk(dependent, Direction::Outgoing, recursive, filter)
    }

    /// Links from workspaces depending on `dependency`; see [`Graph::links_from`].
    pub fn links_to(
        &self,
        dependency: WorkspaceId,
        recursive: bool,
        filter: Option<LinkFilter<'_>>,
    ) -> Vec<&WorkspaceLink> {
        self.walk(dependency, Direction::Incoming, recursive, filter)
    }

    fn adjacency(&self, direction: Direction) -> &[Vec<usize>] {
        match direction {
            Direction::Outgoing => &self.outgoing,
            Direction::Incoming => &self.incoming,
        }
    }

    fn walk(
        &self,
        start: WorkspaceId,
        direction: Direction,
        recursive: bool,
        filter: Option<LinkFilter<'_>>,
    ) -> Vec<&WorkspaceLink> {
        let adjacency = self.adjacency(direction);
        let accepts = |link: &WorkspaceLink| filter.map_or(true, |f| f(link));

        if !recursive {
            return adjacency[start.0]
                .iter()
                .map(|&idx| &self.links[idx])
                .filter(|link| accepts(*link))
                .collect();
        }

        let mut visited = vec![false; self.workspaces.len()];
        let mut result = Vec::new();
        // (link index, cursor into the far end's adjacency)
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for &first in &adjacency[start.0] {
            let link = &self.links[first];
            let target = link.far_end(direction);
            if visited[target.0] || !accepts(link) {
                continue;
            }
            visited[target.0] = true;
            stack.push((first, 0));

            while let Some(top) = stack.len().checked_sub(1) {
                let (current, cursor) = stack[top];
                let node = self.links[current].far_end(direction);
                match adjacency[node.0].get(cursor) {
                    Some(&next) => {
                        stack[top].1 += 1;
                        let link = &self.links[next];
                        let target = link.far_end(direction);
                        if !visited[target.0] && accepts(link) {
                            visited[target.0] = true;
                            stack.push((next, 0));
                        }
                    }
                    None => {
                        stack.pop();
                        result.push(&self.links[current]);
                    }
                }
            }
        }
        result
    }

    /// Direct dependencies of a workspace.
    pub fn dependencies(&self, id: WorkspaceId) -> Vec<WorkspaceId> {
        dedup_ids(self.links_from(id, false, None).iter().map(|l| l.dependency))
    }

    /// Direct dependents of a workspace.
    pub fn dependents(&self, id: WorkspaceId) -> Vec<WorkspaceId> {
        dedup_ids(self.links_to(id, false, None).iter().map(|l| l.dependent))
    }

    /// Every workspace reachable through dependency edges, dependencies first.
    pub fn all_dependencies(&self, id: WorkspaceId) -> Vec<WorkspaceId> {
        self.links_from(id, true, None)
            .iter()
            .map(|l| l.dependency)
            .collect()
    }

    /// Every workspace reachable through dependent edges.
    pub fn all_dependents(&self, id: WorkspaceId) -> Vec<WorkspaceId> {
        self.links_to(id, true, None)
            .iter()
            .map(|l| l.dependent)
            .collect()
    }

    /// All workspaces, dependencies before dependents.
    ///
    /// Ties are broken by name. On cyclic input the cycle is cut at the
    /// first workspace revisited.
    #[inline]
    pub fn topological_order(&self) -> &[WorkspaceId] {
        &self.order
    }

    /// Position of a workspace in [`Graph::topological_order`].
    #[inline]
    pub fn position(&self, id: WorkspaceId) -> usize {
        self.positions[id.0]
    }

    /// Topological order of a subset, rejecting cycles inside it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CircularDependency`] if the selected workspaces
    /// contain a cycle.
    pub fn strict_order(&self, subset: &HashSet<WorkspaceId>) -> Result<Vec<WorkspaceId>> {
        let sub = self.inner.filter_map(
            |_, id| subset.contains(id).then_some(*id),
            |_, link| Some(*link),
        );
        toposort(&sub, None).map_err(|cycle| {
            let id = sub[cycle.node_id()];
            Error::CircularDependency(format!(
                "Cycle detected involving: {}",
                self.workspaces[id.0].name
            ))
        })?;

        Ok(self
            .order
            .iter()
            .copied()
            .filter(|id| subset.contains(id))
            .collect())
    }

    /// Groups of workspaces that depend on each other in a cycle.
    pub fn cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.inner)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut names: Vec<String> = component
                    .into_iter()
                    .map(|node| self.workspaces[self.inner[node].0].name.clone())
                    .collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Renders the graph in Graphviz DOT format.
    pub fn to_dot(&self) -> String {
        let named = self.inner.map(
            |_, id| self.workspaces[id.0].name.as_str(),
            |_, link| self.links[*link].dependency_type.as_str(),
        );
        format!("{}", Dot::with_config(&named, &[DotConfig::EdgeNoLabel]))
    }
}

fn dedup_ids(ids: impl Iterator<Item = WorkspaceId>) -> Vec<WorkspaceId> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}
