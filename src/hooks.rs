//! Pre-build hooks and the registrar that binds resolved targets to them.

use crate::applicator::{PatchApplicator, PatchError, PatchOutcome};
use crate::descriptor::PatchDescriptor;
use crate::resolver::ResolvedTarget;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Work to run immediately before an artifact is produced.
pub trait PreBuildAction {
    /// Short label for diagnostics
    fn label(&self) -> &str;

    fn run(&self) -> Result<PatchOutcome, PatchError>;
}

/// The build tool's hook API: run `action` before `artifact` is built.
pub trait PreBuildHooks {
    fn add_pre_build_action(&mut self, artifact: PathBuf, action: Box<dyn PreBuildAction>);
}

/// Applies one descriptor's patch through a shared applicator.
pub struct PatchAction {
    id: String,
    patch: PathBuf,
    source: PathBuf,
    applicator: Arc<dyn PatchApplicator>,
}

impl fmt::Debug for PatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchAction")
            .field("id", &self.id)
            .field("patch", &self.patch)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl PreBuildAction for PatchAction {
    fn label(&self) -> &str {
        &self.id
    }

    fn run(&self) -> Result<PatchOutcome, PatchError> {
        let outcome = self.applicator.apply(&self.patch, &self.source)?;
        match &outcome {
            PatchOutcome::Applied { file } => {
                tracing::info!(patch = %self.id, file = %file.display(), "patch applied");
            }
            PatchOutcome::AlreadyApplied { file } => {
                tracing::debug!(patch = %self.id, file = %file.display(), "patch already applied");
            }
        }
        Ok(outcome)
    }
}

/// Register the patch for `descriptor` to run before `target` is built.
///
/// Performs no patching itself. Relative patch paths resolve against
/// `project_dir`.
pub fn register(
    hooks: &mut dyn PreBuildHooks,
    target: &ResolvedTarget,
    descriptor: &PatchDescriptor,
    project_dir: &Path,
    applicator: Arc<dyn PatchApplicator>,
) {
    let action = PatchAction {
        id: descriptor.id.clone(),
        patch: descriptor.patch_path(project_dir),
        source: target.source_path.clone(),
        applicator,
    };
    tracing::debug!(
        patch = %descriptor.id,
        artifact = %target.artifact_path.display(),
        "registering pre-build action"
    );
    hooks.add_pre_build_action(target.artifact_path.clone(), Box::new(action));
}

#[derive(Error, Debug)]
#[error("pre-build action '{action}' for {artifact} failed: {source}")]
pub struct HookError {
    pub artifact: PathBuf,
    pub action: String,
    pub source: PatchError,
}

/// In-process hook table.
///
/// Actions for one artifact run sequentially in registration order, and at
/// most once per table (one table per build invocation).
#[derive(Default)]
pub struct HookTable {
    actions: BTreeMap<PathBuf, Vec<Box<dyn PreBuildAction>>>,
    completed: HashSet<PathBuf>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Artifacts with registered actions, in path order.
    pub fn artifacts(&self) -> impl Iterator<Item = &Path> {
        self.actions.keys().map(PathBuf::as_path)
    }

    pub fn actions_for(&self, artifact: &Path) -> &[Box<dyn PreBuildAction>] {
        self.actions.get(artifact).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn has_run(&self, artifact: &Path) -> bool {
        self.completed.contains(artifact)
    }

    /// Run every action registered for `artifact`.
    ///
    /// Stops at the first failure; the artifact must not be compiled then.
    /// A second call for the same artifact returns an empty list.
    pub fn run_before(
        &mut self,
        artifact: &Path,
    ) -> Result<Vec<(String, PatchOutcome)>, HookError> {
        if self.completed.contains(artifact) {
            return Ok(Vec::new());
        }

        let mut outcomes = Vec::new();
        for action in self.actions_for(artifact) {
            let outcome = action.run().map_err(|source| HookError {
                artifact: artifact.to_path_buf(),
                action: action.label().to_string(),
                source,
            })?;
            outcomes.push((action.label().to_string(), outcome));
        }

        self.completed.insert(artifact.to_path_buf());
        Ok(outcomes)
    }
}

impl PreBuildHooks for HookTable {
    fn add_pre_build_action(&mut self, artifact: PathBuf, action: Box<dyn PreBuildAction>) {
        self.actions.entry(artifact).or_default().push(action);
    }
}

impl fmt::Debug for HookTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (artifact, actions) in &self.actions {
            let labels: Vec<&str> = actions.iter().map(|a| a.label()).collect();
            map.entry(artifact, &labels);
        }
        map.finish()
    }
}
