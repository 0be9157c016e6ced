//! One build invocation's worth of patch wiring.
//!
//! Patches are applied lazily: each descriptor that resolves against the
//! current graph gets a pre-build action on its artifact, and nothing else
//! happens until the build tool is about to produce that artifact. A build
//! that excludes a component never touches that component's sources.

use crate::applicator::PatchApplicator;
use crate::config::version::{satisfies, VersionError};
use crate::descriptor::{ComponentName, PatchDescriptor};
use crate::graph::BuildGraph;
use crate::hooks::{register, PreBuildHooks};
use crate::resolver::{resolve, ResolvedTarget};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// A descriptor that received a pre-build action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub id: String,
    /// Patch file, anchored at the project root
    pub patch: PathBuf,
    pub target: ResolvedTarget,
}

/// Why a descriptor got no action this build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skipped {
    /// The graph has no builder with that name
    ComponentNotFound {
        id: String,
        component: ComponentName,
    },
    /// The builder's library version is outside the descriptor's range
    Version { id: String, reason: String },
}

impl Skipped {
    pub fn id(&self) -> &str {
        match self {
            Skipped::ComponentNotFound { id, .. } | Skipped::Version { id, .. } => id,
        }
    }
}

impl fmt::Display for Skipped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Skipped::ComponentNotFound { component, .. } => {
                write!(f, "component {component} not in this build")
            }
            Skipped::Version { reason, .. } => write!(f, "{reason}"),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PlanReport {
    pub registered: Vec<Registration>,
    pub skipped: Vec<Skipped>,
}

#[derive(Error, Debug)]
#[error("patch '{id}': {source}")]
pub struct PlanError {
    pub id: String,
    pub source: VersionError,
}

/// Resolve every descriptor in order and register actions for the matches.
///
/// Descriptors targeting the same artifact register in the order given, which
/// is the order their patches will apply.
pub fn prepare(
    descriptors: &[PatchDescriptor],
    graph: &BuildGraph,
    hooks: &mut dyn PreBuildHooks,
    applicator: Arc<dyn PatchApplicator>,
) -> Result<PlanReport, PlanError> {
    let mut report = PlanReport::default();

    for descriptor in descriptors {
        let Some(target) = resolve(descriptor, graph) else {
            tracing::info!(
                patch = %descriptor.id,
                component = %descriptor.component,
                "component not in build graph, nothing to patch"
            );
            report.skipped.push(Skipped::ComponentNotFound {
                id: descriptor.id.clone(),
                component: descriptor.component.clone(),
            });
            continue;
        };

        if let Some(range) = descriptor.version_range.as_deref() {
            // resolve() succeeded, so the builder exists.
            let version = graph
                .find(&descriptor.component)
                .and_then(|builder| builder.version.as_deref());
            let passes = satisfies(version, Some(range)).map_err(|source| PlanError {
                id: descriptor.id.clone(),
                source,
            })?;
            if !passes {
                let reason = match version {
                    Some(v) => format!(
                        "{} {v} does not satisfy version_range {range}",
                        descriptor.component
                    ),
                    None => format!(
                        "{} declares no version; version_range {range} cannot be checked",
                        descriptor.component
                    ),
                };
                tracing::info!(patch = %descriptor.id, %reason, "skipping patch");
                report.skipped.push(Skipped::Version {
                    id: descriptor.id.clone(),
                    reason,
                });
                continue;
            }
        }

        register(
            hooks,
            &target,
            descriptor,
            graph.project_dir(),
            Arc::clone(&applicator),
        );
        report.registered.push(Registration {
            id: descriptor.id.clone(),
            patch: descriptor.patch_path(graph.project_dir()),
            target,
        });
    }

    Ok(report)
}
