//! Prebuild Patcher: apply unified-diff patches to dependency sources right
//! before the objects that depend on them compile.
//!
//! # Architecture
//!
//! - [`PatchDescriptor`]: static data naming a patch, the component it
//!   belongs to, the source it rewrites and the object built from it.
//! - [`resolve`]: looks the component up in a [`BuildGraph`] and computes the
//!   object path the build tool knows it by.
//! - [`PatchApplicator`]: idempotent application. A reverse check decides
//!   "already applied" before anything is written.
//! - [`hooks::register`]: binds a resolved target to a pre-build action on
//!   the build tool's [`PreBuildHooks`].
//!
//! Patches are applied lazily, from pre-build actions only. A build that
//! excludes a component never touches its sources.
//!
//! # Example
//!
//! ```no_run
//! use prebuild_patcher::{
//!     plan, BuildGraph, Builder, HookTable, InProcess, PatchDescriptor,
//! };
//! use std::sync::Arc;
//!
//! let graph = BuildGraph::with_builders(
//!     "/work/furble",
//!     vec![Builder::new("NimBLE-Arduino", "/work/furble/.pio/build/m5stick-c/lib1a2")
//!         .with_source_dir("/work/furble/.pio/libdeps/m5stick-c/NimBLE-Arduino/src")],
//! );
//! let descriptors = vec![PatchDescriptor::new(
//!     "ble-gap",
//!     "patches/ble_gap.patch",
//!     "NimBLE-Arduino",
//!     "nimble/nimble/host/src/ble_gap.c",
//!     "nimble/nimble/host/src/ble_gap.c.o",
//! )];
//!
//! let mut hooks = HookTable::new();
//! let report = plan::prepare(&descriptors, &graph, &mut hooks, Arc::new(InProcess))?;
//!
//! for registration in &report.registered {
//!     hooks.run_before(&registration.target.artifact_path)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod applicator;
pub mod config;
pub mod descriptor;
pub mod graph;
pub mod hooks;
pub mod manifest;
pub mod plan;
pub mod resolver;

// Re-exports
pub use applicator::{InProcess, PatchApplicator, PatchError, PatchOutcome, PatchTool};
pub use config::{load_all, load_from_path, load_from_str, ConfigError, PatchConfig};
pub use descriptor::{ComponentName, PatchDescriptor};
pub use graph::{BuildGraph, Builder, GraphError};
pub use hooks::{HookError, HookTable, PatchAction, PreBuildAction, PreBuildHooks};
pub use manifest::{ManifestError, ManifestVars};
pub use plan::{PlanError, PlanReport, Registration, Skipped};
pub use resolver::{resolve, ResolvedTarget};
