use crate::config::schema::{PatchConfig, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Walk {
        dir: PathBuf,
        source: walkdir::Error,
    },
    NoConfigs {
        dir: PathBuf,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read patch config from {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Walk { dir, source } => {
                write!(f, "failed to scan {} for patch configs: {}", dir.display(), source)
            }
            ConfigError::NoConfigs { dir } => {
                write!(f, "no .toml patch configs found in {}", dir.display())
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse patch config TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse patch config TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid patch config ({}): {}", path.display(), source),
                None => write!(f, "invalid patch config: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Walk { source, .. } => Some(source),
            ConfigError::NoConfigs { .. } => None,
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

pub fn load_from_str(input: &str) -> Result<PatchConfig, ConfigError> {
    let config: PatchConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&contents).map_err(|error| error.with_path(path))
}

/// Find the `.toml` patch configs directly inside `dir`, sorted by path so
/// descriptors always register in the same order.
pub fn discover(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, ConfigError> {
    let dir = dir.as_ref();
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).max_depth(1) {
        let entry = entry.map_err(|source| ConfigError::Walk {
            dir: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
        {
            files.push(entry.path().to_path_buf());
        }
    }

    if files.is_empty() {
        return Err(ConfigError::NoConfigs {
            dir: dir.to_path_buf(),
        });
    }

    files.sort();
    Ok(files)
}

/// Load several configs and flatten their descriptors in file order.
///
/// The tool settings of the first config win; a build uses one patch tool.
pub fn load_all(paths: &[PathBuf]) -> Result<PatchConfig, ConfigError> {
    let mut merged: Option<PatchConfig> = None;
    for path in paths {
        let config = load_from_path(path)?;
        match merged.as_mut() {
            None => merged = Some(config),
            Some(acc) => acc.patches.extend(config.patches),
        }
    }

    let merged = merged.unwrap_or_default();
    if let Err(source) = merged.validate() {
        return Err(ConfigError::Validation { path: None, source });
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ToolKind, ValidationIssue};

    const BASIC: &str = r#"
[meta]
name = "nimble-fixes"

[tool]
kind = "in-process"

[[patches]]
id = "ble-gap"
patch = "patches/ble_gap.patch"
component = "NimBLE-Arduino"
source = "nimble/nimble/host/src/ble_gap.c"
artifact = "nimble/nimble/host/src/ble_gap.c.o"
version_range = ">=1.4.0"
"#;

    #[test]
    fn test_load_basic() {
        let config = load_from_str(BASIC).unwrap();
        assert_eq!(config.meta.name, "nimble-fixes");
        assert_eq!(config.tool.kind, ToolKind::InProcess);
        assert_eq!(config.tool.strip, 1);
        assert_eq!(config.patches[0].component.as_str(), "NimBLE-Arduino");
        assert_eq!(
            config.patches[0].patch_file,
            PathBuf::from("patches/ble_gap.patch")
        );
    }

    #[test]
    fn test_empty_config_rejected() {
        let err = load_from_str("[meta]\nname = \"x\"\n").unwrap_err();
        match err {
            ConfigError::Validation { source, .. } => {
                assert!(matches!(source.issues[0], ValidationIssue::EmptyPatchList));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_version_range_rejected() {
        let input = BASIC.replace(">=1.4.0", ">=nope");
        let err = load_from_str(&input).unwrap_err();
        assert!(err.to_string().contains("invalid version requirement"));
    }

    #[test]
    fn test_missing_field_is_toml_error() {
        let input = BASIC.replace("component = \"NimBLE-Arduino\"\n", "");
        assert!(matches!(
            load_from_str(&input),
            Err(ConfigError::Toml { .. })
        ));
    }

    #[test]
    fn test_discover_sorted_and_load_all() {
        let temp_dir = tempfile::tempdir().unwrap();
        let second = BASIC.replace("ble-gap", "ble-client");
        fs::write(temp_dir.path().join("b.toml"), second).unwrap();
        fs::write(temp_dir.path().join("a.toml"), BASIC).unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let files = discover(temp_dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.toml"));

        let merged = load_all(&files).unwrap();
        let ids: Vec<&str> = merged.patches.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["ble-gap", "ble-client"]);
    }

    #[test]
    fn test_load_all_rejects_duplicate_ids_across_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("a.toml"), BASIC).unwrap();
        fs::write(temp_dir.path().join("b.toml"), BASIC).unwrap();

        let files = discover(temp_dir.path()).unwrap();
        assert!(matches!(
            load_all(&files),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_discover_empty_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover(temp_dir.path()),
            Err(ConfigError::NoConfigs { .. })
        ));
    }
}
