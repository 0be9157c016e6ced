//! Target resolution: which compiled object depends on a patched source.

use crate::descriptor::PatchDescriptor;
use crate::graph::{BuildGraph, Builder};
use std::path::{Component, Path, PathBuf};

/// Where a descriptor lands in this build.
///
/// Derived from the current graph on every invocation; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Object path, relative to the project root when the build dir lives
    /// under it. This is the key the build tool uses for the object.
    pub artifact_path: PathBuf,
    /// Source file the patch rewrites
    pub source_path: PathBuf,
}

/// Resolve `descriptor` against `graph`.
///
/// Returns `None` when the graph has no builder for the descriptor's
/// component; builds that exclude the component simply have nothing to patch.
pub fn resolve(descriptor: &PatchDescriptor, graph: &BuildGraph) -> Option<ResolvedTarget> {
    let Some(builder) = graph.find(&descriptor.component) else {
        tracing::debug!(
            patch = %descriptor.id,
            component = %descriptor.component,
            "component not in build graph"
        );
        return None;
    };

    let build_dir = relative_build_dir(builder, graph.project_dir());
    let artifact_path = normalize(&build_dir.join(&descriptor.artifact));
    let source_path = source_path(builder, graph.project_dir(), &descriptor.source);

    tracing::debug!(
        patch = %descriptor.id,
        artifact = %artifact_path.display(),
        source = %source_path.display(),
        "resolved patch target"
    );

    Some(ResolvedTarget {
        artifact_path,
        source_path,
    })
}

/// The builder's output directory relative to the project root.
///
/// Computed against the graph's project dir, never the process working
/// directory, so the same graph always yields the same path.
pub fn relative_build_dir(builder: &Builder, project_dir: &Path) -> PathBuf {
    let project_dir = normalize(project_dir);
    let build_dir = normalize(&anchor(&builder.build_dir, &project_dir));

    match pathdiff::diff_paths(&build_dir, &project_dir) {
        Some(relative) if relative.as_os_str().is_empty() => PathBuf::from("."),
        Some(relative) => relative,
        None => build_dir,
    }
}

fn source_path(builder: &Builder, project_dir: &Path, source: &Path) -> PathBuf {
    let base = match &builder.source_dir {
        Some(dir) => anchor(dir, project_dir),
        None => project_dir.to_path_buf(),
    };
    normalize(&anchor(source, &base))
}

fn anchor(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Lexical normalisation: drops `.` and folds `..` into its parent where
/// possible. Does not touch the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}
