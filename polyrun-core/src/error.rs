//! Error types and result aliases.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error in {context}: {error}")]
    Json {
        error: serde_json::Error,
        context: String,
    },

    #[error("TOML parse error in {context}: {error}")]
    Toml {
        error: toml::de::Error,
        context: String,
    },

    #[error("Invalid glob pattern '{pattern}': {message}")]
    Glob { pattern: String, message: String },

    #[error("Invalid dependency spec: {0:?}")]
    InvalidSpec(String),

    #[error("Invalid filter expression: {0}. Expected a name glob, a path starting with '/' or './', '#keyword', or one of @public, @private, @published, @unpublished, @dependencies, @dependents.")]
    InvalidFilterExpression(String),

    #[error("Circular dependency detected: {0}. Use 'polyrun validate' to list cycles.")]
    CircularDependency(String),

    #[error("Workspace not found: {name}. Available workspaces: {available}")]
    WorkspaceNotFound { name: String, available: String },

    #[error("Duplicate workspace name '{name}' in {first} and {second}")]
    DuplicateWorkspace {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Manifest not found: {0}. Expected 'package.json' at the repository root.")]
    ManifestNotFound(PathBuf),

    #[error("Invalid manifest {path}: {message}")]
    InvalidManifest { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Registry error for {package}: {message}")]
    Registry { package: String, message: String },
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Toml {
            error,
            context: "polyrun.toml".to_string(),
        }
    }
}

impl From<globset::Error> for Error {
    fn from(error: globset::Error) -> Self {
        Error::Glob {
            pattern: error.glob().unwrap_or_default().to_string(),
            message: error.kind().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
