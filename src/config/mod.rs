pub mod loader;
pub mod schema;
pub mod version;

pub use loader::{discover, load_all, load_from_path, load_from_str, ConfigError};
pub use schema::{Metadata, PatchConfig, ToolConfig, ToolKind, ValidationError, ValidationIssue};
pub use version::{satisfies, VersionError};
