//! Read-only view of the build graph.
//!
//! The build tool exports a snapshot of its library builders (name, build
//! directory, source directory, library version). The core never mutates it;
//! it is passed explicitly to the resolver as a plain value.

use crate::descriptor::ComponentName;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One library/component compile configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Builder {
    pub name: ComponentName,
    /// Directory the builder writes objects into
    pub build_dir: PathBuf,
    /// Directory holding the builder's sources
    #[serde(default)]
    pub source_dir: Option<PathBuf>,
    /// Library version as declared by the dependency
    #[serde(default)]
    pub version: Option<String>,
}

impl Builder {
    pub fn new(name: impl Into<ComponentName>, build_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            build_dir: build_dir.into(),
            source_dir: None,
            version: None,
        }
    }

    #[must_use]
    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("failed to read build graph {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse build graph TOML ({path}): {source}")]
    Toml {
        path: PathBuf,
        source: toml_edit::de::Error,
    },

    #[error("failed to parse build graph JSON ({path}): {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    #[serde(default)]
    project_dir: Option<PathBuf>,
    #[serde(default)]
    builders: Vec<Builder>,
}

/// Enumerable set of builders plus the project root they live under.
#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    project_dir: PathBuf,
    builders: Vec<Builder>,
    // First occurrence of each name, in enumeration order.
    index: HashMap<ComponentName, usize>,
}

impl BuildGraph {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            builders: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn with_builders(project_dir: impl Into<PathBuf>, builders: Vec<Builder>) -> Self {
        let mut graph = Self::new(project_dir);
        for builder in builders {
            graph.push(builder);
        }
        graph
    }

    /// Append a builder. A name already present keeps pointing at the first
    /// builder that declared it.
    pub fn push(&mut self, builder: Builder) {
        let position = self.builders.len();
        if self.index.contains_key(&builder.name) {
            tracing::debug!(
                component = %builder.name,
                "duplicate builder name, keeping first in enumeration order"
            );
        } else {
            self.index.insert(builder.name.clone(), position);
        }
        self.builders.push(builder);
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn builders(&self) -> &[Builder] {
        &self.builders
    }

    pub fn find(&self, name: &ComponentName) -> Option<&Builder> {
        self.index.get(name).map(|&position| &self.builders[position])
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    /// Parse a snapshot from TOML text. A relative `project_dir` is anchored
    /// at `base`; a missing one means `base` itself.
    pub fn from_toml_str(input: &str, base: &Path) -> Result<Self, toml_edit::de::Error> {
        let snapshot: Snapshot = toml_edit::de::from_str(input)?;
        Ok(Self::from_snapshot(snapshot, base))
    }

    pub fn from_json_str(input: &str, base: &Path) -> Result<Self, serde_json::Error> {
        let snapshot: Snapshot = serde_json::from_str(input)?;
        Ok(Self::from_snapshot(snapshot, base))
    }

    /// Load a snapshot file; `.json` files are read as JSON, anything else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| GraphError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        // Relative snapshot paths anchor at the cwd once, here, so the project
        // dir handed to the resolver is always absolute.
        let absolute = std::path::absolute(path).map_err(|source| GraphError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base = absolute.parent().unwrap_or_else(|| Path::new("/"));

        let is_json = path.extension().and_then(|ext| ext.to_str()) == Some("json");
        if is_json {
            Self::from_json_str(&contents, base).map_err(|source| GraphError::Json {
                path: path.to_path_buf(),
                source,
            })
        } else {
            Self::from_toml_str(&contents, base).map_err(|source| GraphError::Toml {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    fn from_snapshot(snapshot: Snapshot, base: &Path) -> Self {
        let project_dir = match snapshot.project_dir {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => base.join(dir),
            None => base.to_path_buf(),
        };
        Self::with_builders(project_dir, snapshot.builders)
    }
}
