//! Workspace data model.

use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::status::Status;

/// The manifest section a dependency entry was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DependencyType {
    #[serde(rename = "dependencies")]
    Dependencies,
    #[serde(rename = "devDependencies")]
    DevDependencies,
    #[serde(rename = "peerDependencies")]
    PeerDependencies,
    #[serde(rename = "optionalDependencies")]
    OptionalDependencies,
}

impl DependencyType {
    pub const ALL: [DependencyType; 4] = [
        DependencyType::Dependencies,
        DependencyType::DevDependencies,
        DependencyType::PeerDependencies,
        DependencyType::OptionalDependencies,
    ];

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyType::Dependencies => "dependencies",
            DependencyType::DevDependencies => "devDependencies",
            DependencyType::PeerDependencies => "peerDependencies",
            DependencyType::OptionalDependencies => "optionalDependencies",
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dependency maps of a manifest, keyed by section then by entry id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyMaps {
    #[serde(default, rename = "dependencies")]
    pub dependencies: IndexMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    pub dev_dependencies: IndexMap<String, String>,
    #[serde(default, rename = "peerDependencies")]
    pub peer_dependencies: IndexMap<String, String>,
    #[serde(default, rename = "optionalDependencies")]
    pub optional_dependencies: IndexMap<String, String>,
}

impl DependencyMaps {
    #[inline]
    pub fn get(&self, dependency_type: DependencyType) -> &IndexMap<String, String> {
        match dependency_type {
            DependencyType::Dependencies => &self.dependencies,
            DependencyType::DevDependencies => &self.dev_dependencies,
            DependencyType::PeerDependencies => &self.peer_dependencies,
            DependencyType::OptionalDependencies => &self.optional_dependencies,
        }
    }

    pub fn get_mut(&mut self, dependency_type: DependencyType) -> &mut IndexMap<String, String> {
        match dependency_type {
            DependencyType::Dependencies => &mut self.dependencies,
            DependencyType::DevDependencies => &mut self.dev_dependencies,
            DependencyType::PeerDependencies => &mut self.peer_dependencies,
            DependencyType::OptionalDependencies => &mut self.optional_dependencies,
        }
    }

    /// Iterates every entry as `(section, id, raw range)`.
    pub fn iter(&self) -> impl Iterator<Item = (DependencyType, &str, &str)> {
        DependencyType::ALL.into_iter().flat_map(move |ty| {
            self.get(ty)
                .iter()
                .map(move |(id, raw)| (ty, id.as_str(), raw.as_str()))
        })
    }
}

/// Index of a workspace inside a [`Graph`](crate::graph::Graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct WorkspaceId(pub(crate) usize);

/// One sub-project of the repository.
#[derive(Debug, Serialize)]
pub struct Workspace {
    pub name: String,
    /// Absolute directory of the workspace.
    pub directory: PathBuf,
    /// Directory relative to the repository root; empty for the root itself.
    pub relative_dir: PathBuf,
    pub version: Option<String>,
    pub is_private: bool,
    pub is_root: bool,
    pub keywords: Vec<String>,
    pub dependencies: DependencyMaps,
    /// The full manifest document, for callbacks.
    #[serde(skip)]
    pub manifest: serde_json::Value,
    #[serde(skip)]
    status: Status,
}

impl Workspace {
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
            relative_dir: PathBuf::new(),
            version: None,
            is_private: false,
            is_root: false,
            keywords: Vec::new(),
            dependencies: DependencyMaps::default(),
            manifest: serde_json::Value::Null,
            status: Status::default(),
        }
    }

    pub fn with_relative_dir(mut self, relative_dir: impl Into<PathBuf>) -> Self {
        self.relative_dir = relative_dir.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_private(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }

    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn with_manifest(mut self, manifest: serde_json::Value) -> Self {
        self.manifest = manifest;
        self
    }

    /// Adds a dependency entry to one of the manifest sections.
    pub fn with_dependency(
        mut self,
        dependency_type: DependencyType,
        id: impl Into<String>,
        raw: impl Into<String>,
    ) -> Self {
        self.dependencies
            .get_mut(dependency_type)
            .insert(id.into(), raw.into());
        self
    }

    #[inline]
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Relative directory rendered with forward slashes, `"."` for the root.
    pub fn display_dir(&self) -> String {
        let rendered = self
            .relative_dir
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if rendered.is_empty() {
            ".".to_string()
        } else {
            rendered
        }
    }
}
