use crate::applicator::{InProcess, PatchApplicator, PatchTool};
use crate::config::version::parse_requirement;
use crate::descriptor::PatchDescriptor;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatchConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub tool: ToolConfig,
    #[serde(default)]
    pub patches: Vec<PatchDescriptor>,
}

impl PatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.patches.is_empty() {
            issues.push(ValidationIssue::EmptyPatchList);
        }

        if self.tool.kind == ToolKind::PatchTool && self.tool.program.trim().is_empty() {
            issues.push(ValidationIssue::InvalidCombo {
                patch_id: None,
                message: "tool.program must name a patch executable".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for patch in &self.patches {
            if patch.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    patch_id: None,
                    field: "id",
                });
            } else if !seen.insert(patch.id.as_str()) {
                issues.push(ValidationIssue::DuplicateId(patch.id.clone()));
            }

            let required = [
                ("patch", patch.patch_file.as_os_str().is_empty()),
                ("component", patch.component.as_str().trim().is_empty()),
                ("source", patch.source.as_os_str().is_empty()),
                ("artifact", patch.artifact.as_os_str().is_empty()),
            ];
            for (field, missing) in required {
                if missing {
                    issues.push(ValidationIssue::MissingField {
                        patch_id: Some(patch.id.clone()),
                        field,
                    });
                }
            }

            if patch.artifact.is_absolute() {
                issues.push(ValidationIssue::InvalidCombo {
                    patch_id: Some(patch.id.clone()),
                    message: "artifact must be relative to the builder's build directory"
                        .to_string(),
                });
            }

            if let Some(range) = &patch.version_range {
                if let Err(e) = parse_requirement(range) {
                    issues.push(ValidationIssue::InvalidCombo {
                        patch_id: Some(patch.id.clone()),
                        message: e.to_string(),
                    });
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    /// External `patch(1)` compatible executable
    #[default]
    PatchTool,
    /// Built-in unified diff application
    InProcess,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ToolConfig {
    #[serde(default)]
    pub kind: ToolKind,
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_strip")]
    pub strip: u32,
}

fn default_program() -> String {
    "patch".to_string()
}

fn default_strip() -> u32 {
    1
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            kind: ToolKind::default(),
            program: default_program(),
            strip: default_strip(),
        }
    }
}

impl ToolConfig {
    pub fn applicator(&self) -> Arc<dyn PatchApplicator> {
        match self.kind {
            ToolKind::PatchTool => Arc::new(PatchTool::new(self.program.clone(), self.strip)),
            ToolKind::InProcess => Arc::new(InProcess),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatchList,
    DuplicateId(String),
    MissingField {
        patch_id: Option<String>,
        field: &'static str,
    },
    InvalidCombo {
        patch_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatchList => write!(f, "patch config contains no patches"),
            ValidationIssue::DuplicateId(id) => write!(f, "patch id '{id}' is declared twice"),
            ValidationIssue::MissingField { patch_id, field } => match patch_id {
                Some(id) => write!(f, "patch '{id}' missing required field '{field}'"),
                None => write!(f, "patch missing required field '{field}'"),
            },
            ValidationIssue::InvalidCombo { patch_id, message } => match patch_id {
                Some(id) => write!(f, "patch '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid patch configuration: {message}"),
            },
        }
    }
}
