use serde::Deserialize;
use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};

/// Name of a library/component builder in the build graph.
///
/// Lookups in [`crate::graph::BuildGraph`] are keyed by this type rather than
/// by ad-hoc string comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct ComponentName(String);

impl ComponentName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ComponentName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ComponentName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Static description of one patch: which diff, which component, which
/// source it rewrites and which compiled object depends on that source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PatchDescriptor {
    /// Identifier used in diagnostics and reports
    pub id: String,
    /// Unified diff to apply (relative paths resolve against the project root)
    #[serde(rename = "patch")]
    pub patch_file: PathBuf,
    /// Builder the patched source belongs to
    pub component: ComponentName,
    /// Patched source, relative to the builder's source directory
    pub source: PathBuf,
    /// Compiled object, relative to the builder's build directory
    pub artifact: PathBuf,
    /// Optional semver requirement on the builder's library version
    #[serde(default)]
    pub version_range: Option<String>,
}

impl PatchDescriptor {
    pub fn new(
        id: impl Into<String>,
        patch_file: impl Into<PathBuf>,
        component: impl Into<ComponentName>,
        source: impl Into<PathBuf>,
        artifact: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            patch_file: patch_file.into(),
            component: component.into(),
            source: source.into(),
            artifact: artifact.into(),
            version_range: None,
        }
    }

    #[must_use]
    pub fn with_version_range(mut self, range: impl Into<String>) -> Self {
        self.version_range = Some(range.into());
        self
    }

    /// Patch file path anchored at `project_dir` when relative.
    pub fn patch_path(&self, project_dir: &Path) -> PathBuf {
        if self.patch_file.is_absolute() {
            self.patch_file.clone()
        } else {
            project_dir.join(&self.patch_file)
        }
    }
}
