//! Workspace selection from filter expressions.
//!
//! Each expression compiles to one [`Filter`]. How several filters combine
//! is the caller's choice, expressed with [`Combine`] when resolving a
//! [`Selection`].

use std::collections::BTreeSet;
use std::fmt;

use globset::{GlobBuilder, GlobMatcher};
use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::registry::Registry;
use crate::workspace::{Workspace, WorkspaceId};

#[derive(Debug, Clone)]
enum FilterKind {
    /// Glob over the directory relative to the repository root. `None`
    /// matches the root itself.
    Directory(Option<GlobMatcher>),
    Name(GlobMatcher),
    Keyword(String),
    Private(bool),
    Published(bool),
    Dependencies,
    Dependents,
}

/// A compiled selection expression.
#[derive(Debug, Clone)]
pub struct Filter {
    expression: String,
    kind: FilterKind,
}

impl Filter {
    /// Compiles a single filter expression.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilterExpression`] if the expression matches
    /// none of the supported forms, or a glob error for a malformed pattern.
    pub fn compile(expression: &str) -> Result<Self> {
        let expr = expression.trim();
        let kind = if let Some(path) = expr.strip_prefix("./").or_else(|| expr.strip_prefix('/')) {
            let path = path.trim_matches('/');
            if path.is_empty() || path == "." {
                FilterKind::Directory(None)
            } else {
                FilterKind::Directory(Some(glob(path)?))
            }
        } else if let Some(keyword) = expr.strip_prefix('#') {
            if keyword.is_empty() {
                return Err(Error::InvalidFilterExpression(expression.to_string()));
            }
            FilterKind::Keyword(keyword.to_string())
        } else if expr.starts_with('@') {
            match expr {
                "@public" => FilterKind::Private(false),
                "@private" => FilterKind::Private(true),
                "@published" => FilterKind::Published(true),
                "@unpublished" => FilterKind::Published(false),
                "@dependency" | "@dependencies" => FilterKind::Dependencies,
                "@dependent" | "@dependents" => FilterKind::Dependents,
                _ => return Err(Error::InvalidFilterExpression(expression.to_string())),
            }
        } else if !expr.is_empty() && !expr.contains('/') {
            FilterKind::Name(glob(expr)?)
        } else {
            return Err(Error::InvalidFilterExpression(expression.to_string()));
        };

        Ok(Self {
            expression: expr.to_string(),
            kind,
        })
    }

    #[inline]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whether the filter is evaluated against the current selection.
    #[inline]
    pub fn is_relational(&self) -> bool {
        matches!(self.kind, FilterKind::Dependencies | FilterKind::Dependents)
    }

    #[inline]
    pub fn needs_registry(&self) -> bool {
        matches!(self.kind, FilterKind::Published(_))
    }

    /// Tests a workspace against this filter.
    ///
    /// Relational filters consult `current`; the published filters query
    /// `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if a registry is needed but missing, or the lookup fails.
    pub async fn matches(
        &self,
        graph: &Graph,
        id: WorkspaceId,
        current: &Selection,
        registry: Option<&dyn Registry>,
    ) -> Result<bool> {
        let workspace = graph.get(id);
        match &self.kind {
            FilterKind::Directory(None) => Ok(workspace.relative_dir.as_os_str().is_empty()),
            FilterKind::Directory(Some(matcher)) => {
                Ok(!workspace.is_root && matcher.is_match(workspace.display_dir()))
            }
            FilterKind::Name(matcher) => Ok(matcher.is_match(&workspace.name)),
            FilterKind::Keyword(keyword) => Ok(workspace.keywords.iter().any(|k| k == keyword)),
            FilterKind::Private(private) => Ok(workspace.is_private == *private),
            FilterKind::Published(published) => {
                let registry = registry.ok_or_else(|| Error::Registry {
                    package: workspace.name.clone(),
                    message: format!("'{}' requires a registry", self.expression),
                })?;
                is_published(workspace, registry)
                    .await
                    .map(|state| state == Some(*published))
            }
            FilterKind::Dependencies => Ok(graph
                .links_to(id, true, None)
                .iter()
                .any(|link| current.contains(link.dependent))),
            FilterKind::Dependents => Ok(graph
                .links_from(id, true, None)
                .iter()
                .any(|link| current.contains(link.dependency))),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn glob(pattern: &str) -> Result<GlobMatcher> {
    Ok(GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

/// `None` for workspaces without a version: they are never published.
async fn is_published(workspace: &Workspace, registry: &dyn Registry) -> Result<Option<bool>> {
    let Some(version) = workspace.version.as_deref() else {
        return Ok(None);
    };
    let found = registry.published_version(&workspace.name, version).await?;
    Ok(Some(found.as_deref() == Some(version)))
}

/// How the results of several filters are merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Combine {
    /// A workspace is selected if any filter matches it.
    #[default]
    Any,
    /// A workspace is selected only if every filter matches it.
    All,
}

/// The set of workspaces in scope for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: BTreeSet<WorkspaceId>,
}

impl Selection {
    /// Every workspace except the repository root.
    pub fn all(graph: &Graph) -> Self {
        graph
            .workspaces()
            .filter(|(_, ws)| !ws.is_root)
            .map(|(id, _)| id)
            .collect()
    }

    /// Resolves filters into a selection.
    ///
    /// Filters are applied in order, so relational filters see the
    /// selection built by the filters before them. Without filters every
    /// non-root workspace is selected.
    ///
    /// # Errors
    ///
    /// Returns an error if a registry lookup fails.
    pub async fn resolve(
        graph: &Graph,
        filters: &[Filter],
        combine: Combine,
        registry: Option<&dyn Registry>,
    ) -> Result<Self> {
        if filters.is_empty() {
            return Ok(Self::all(graph));
        }

        let mut current = match combine {
            Combine::Any => Selection::default(),
            Combine::All => graph.ids().collect(),
        };

        for filter in filters {
            let snapshot = current.clone();
            match combine {
                Combine::Any => {
                    for id in graph.ids() {
                        if !snapshot.contains(id)
                            && filter.matches(graph, id, &snapshot, registry).await?
                        {
                            current.insert(id);
                        }
                    }
                }
                Combine::All => {
                    for id in snapshot.iter() {
                        if !filter.matches(graph, id, &snapshot, registry).await? {
                            current.remove(id);
                        }
                    }
                }
            }
            debug!(filter = %filter, selected = current.len(), "Applied filter");
        }

        Ok(current)
    }

    #[inline]
    pub fn contains(&self, id: WorkspaceId) -> bool {
        self.ids.contains(&id)
    }

    #[inline]
    pub fn insert(&mut self, id: WorkspaceId) -> bool {
        self.ids.insert(id)
    }

    #[inline]
    pub fn remove(&mut self, id: WorkspaceId) -> bool {
        self.ids.remove(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = WorkspaceId> + '_ {
        self.ids.iter().copied()
    }

    /// Selected workspaces in the graph's dependency-first order.
    pub fn ordered(&self, graph: &Graph) -> Vec<WorkspaceId> {
        graph
            .topological_order()
            .iter()
            .copied()
            .filter(|id| self.contains(*id))
            .collect()
    }
}

impl FromIterator<WorkspaceId> for Selection {
    fn from_iter<T: IntoIterator<Item = WorkspaceId>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
