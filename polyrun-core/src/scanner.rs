//! Repository scanner for discovering workspaces.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use serde::Deserialize;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};
use crate::workspace::{DependencyMaps, Workspace};

const MANIFEST: &str = "package.json";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WorkspacesField {
    Globs(Vec<String>),
    Object {
        #[serde(default)]
        packages: Vec<String>,
    },
}

impl WorkspacesField {
    fn patterns(&self) -> &[String] {
        match self {
            WorkspacesField::Globs(globs) => globs,
            WorkspacesField::Object { packages } => packages,
        }
    }
}

/// The parts of a `package.json` the scanner reads.
#[derive(Debug, Deserialize)]
struct PackageManifest {
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    keywords: Vec<String>,
    workspaces: Option<WorkspacesField>,
    #[serde(flatten)]
    dependencies: DependencyMaps,
}

/// Scans a repository for workspaces.
///
/// The root `package.json` is itself a workspace; its `workspaces` field
/// lists globs for the others.
pub struct Scanner {
    root: PathBuf,
}

impl Scanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Discovers every workspace, root first, then the rest sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the root manifest is missing or any manifest
    /// cannot be parsed.
    pub fn scan(&self) -> Result<Vec<Workspace>> {
        let root_manifest = self.root.join(MANIFEST);
        if !root_manifest.exists() {
            return Err(Error::ManifestNotFound(root_manifest));
        }

        let (root_value, root) = read_manifest(&root_manifest)?;
        let patterns: Vec<String> = root
            .workspaces
            .as_ref()
            .map(|w| w.patterns().to_vec())
            .unwrap_or_default();

        let root_name = root.name.clone().unwrap_or_else(|| {
            self.root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "root".to_string())
        });
        let root_workspace =
            into_workspace(root_name, &self.root, PathBuf::new(), root, root_value)
                .with_root(true);

        let directories = self.workspace_directories(&patterns)?;
        debug!(
            patterns = patterns.len(),
            candidates = directories.len(),
            "Resolved workspace directories"
        );

        let discovered: Result<Vec<Option<Workspace>>> = directories
            .into_par_iter()
            .map(|relative| {
                let directory = self.root.join(&relative);
                let path = directory.join(MANIFEST);
                let (value, manifest) = read_manifest(&path)?;
                let Some(name) = manifest.name.clone() else {
                    warn!("Skipping {}: manifest has no name", path.display());
                    return Ok(None);
                };
                Ok(Some(into_workspace(
                    name, &directory, relative, manifest, value,
                )))
            })
            .collect();

        let mut workspaces: Vec<Workspace> = discovered?.into_iter().flatten().collect();
        workspaces.sort_by(|a, b| a.name.cmp(&b.name));
        workspaces.insert(0, root_workspace);

        let mut seen: HashMap<&str, &Path> = HashMap::with_capacity(workspaces.len());
        for workspace in &workspaces {
            if let Some(first) = seen.insert(workspace.name.as_str(), workspace.directory.as_path()) {
                return Err(Error::DuplicateWorkspace {
                    name: workspace.name.clone(),
                    first: first.to_path_buf(),
                    second: workspace.directory.clone(),
                });
            }
        }
        Ok(workspaces)
    }

    /// Relative directories matching the patterns that hold a manifest.
    fn workspace_directories(&self, patterns: &[String]) -> Result<Vec<PathBuf>> {
        let (include, exclude) = compile_patterns(patterns)?;
        if include.is_empty() {
            return Ok(Vec::new());
        }

        let mut directories: Vec<PathBuf> = WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| !is_ignored(entry))
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&self.root).ok()?.to_path_buf();
                let rendered = to_slash(&relative);
                (include.is_match(&rendered) && !exclude.is_match(&rendered))
                    .then_some(relative)
            })
            .filter(|relative| self.root.join(relative).join(MANIFEST).is_file())
            .collect();
        directories.sort();
        Ok(directories)
    }
}

fn is_ignored(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    entry.file_type().is_dir() && (name == "node_modules" || name.starts_with('.'))
}

fn compile_patterns(patterns: &[String]) -> Result<(GlobSet, GlobSet)> {
    let mut include = GlobSetBuilder::new();
    let mut exclude = GlobSetBuilder::new();
    for pattern in patterns {
        let (builder, pattern) = match pattern.strip_prefix('!') {
            Some(negated) => (&mut exclude, negated),
            None => (&mut include, pattern.as_str()),
        };
        let pattern = pattern.trim_start_matches("./").trim_end_matches('/');
        if pattern.is_empty() {
            continue;
        }
        builder.add(GlobBuilder::new(pattern).literal_separator(true).build()?);
    }
    Ok((include.build()?, exclude.build()?))
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_manifest(path: &Path) -> Result<(serde_json::Value, PackageManifest)> {
    let content = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&content).map_err(|error| Error::Json {
        error,
        context: path.display().to_string(),
    })?;
    let manifest: PackageManifest =
        serde_json::from_value(value.clone()).map_err(|e| Error::InvalidManifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    Ok((value, manifest))
}

fn into_workspace(
    name: String,
    directory: &Path,
    relative: PathBuf,
    manifest: PackageManifest,
    value: serde_json::Value,
) -> Workspace {
    let version = manifest
        .version
        .filter(|v| match semver::Version::parse(v) {
            Ok(_) => true,
            Err(e) => {
                warn!(workspace = %name, "Ignoring invalid version '{}': {}", v, e);
                false
            }
        });

    let mut workspace = Workspace::new(name, directory)
        .with_relative_dir(relative)
        .with_private(manifest.private)
        .with_keywords(manifest.keywords)
        .with_manifest(value);
    workspace.version = version;
    workspace.dependencies = manifest.dependencies;
    workspace
}
