//! Web-installer manifest templating.
//!
//! Substitutes `PLATFORM` and `VERSION` into a text template. Shares nothing
//! with the patching core.
//!
//! Placeholder grammar: `$NAME` or `${NAME}` where `NAME` is an ASCII
//! identifier, and `$$` for a literal `$`. Any other `$` is invalid, and any
//! name other than the two known ones is an error; rendering never produces
//! partial output.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const PLATFORM: &str = "PLATFORM";
pub const VERSION: &str = "VERSION";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("required environment variable {0} is not set")]
    MissingEnvironmentVariable(&'static str),

    #[error("unknown placeholder ${{{name}}} at line {line}, column {column}")]
    UnknownPlaceholder {
        name: String,
        line: usize,
        column: usize,
    },

    #[error("invalid placeholder at line {line}, column {column}")]
    InvalidPlaceholder { line: usize, column: usize },

    #[error("failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestVars {
    pub platform: String,
    pub version: String,
}

impl ManifestVars {
    pub fn new(platform: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            version: version.into(),
        }
    }

    /// Read both values from the process environment.
    pub fn from_env() -> Result<Self, ManifestError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read both values through `lookup`; either one missing is fatal.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ManifestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let platform = lookup(PLATFORM).ok_or(ManifestError::MissingEnvironmentVariable(PLATFORM))?;
        let version = lookup(VERSION).ok_or(ManifestError::MissingEnvironmentVariable(VERSION))?;
        Ok(Self { platform, version })
    }

    fn get(&self, name: &str) -> Option<&str> {
        match name {
            PLATFORM => Some(&self.platform),
            VERSION => Some(&self.version),
            _ => None,
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

fn position(template: &str, offset: usize) -> (usize, usize) {
    let before = &template[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before.rfind('\n').map_or(offset, |nl| offset - nl - 1) + 1;
    (line, column)
}

/// Substitute `vars` into `template`.
pub fn render(template: &str, vars: &ManifestVars) -> Result<String, ManifestError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(dollar) = rest.find('$') {
        out.push_str(&rest[..dollar]);
        let offset = template.len() - rest.len() + dollar;
        let after = &rest[dollar + 1..];

        let invalid = || {
            let (line, column) = position(template, offset);
            ManifestError::InvalidPlaceholder { line, column }
        };

        let (name, consumed) = if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
            continue;
        } else if let Some(braced) = after.strip_prefix('{') {
            let close = braced.find('}').ok_or_else(invalid)?;
            let name = &braced[..close];
            let mut chars = name.chars();
            let valid = chars.next().is_some_and(is_ident_start) && chars.all(is_ident_continue);
            if !valid {
                return Err(invalid());
            }
            (name, close + 2)
        } else {
            let len = after
                .char_indices()
                .find(|&(i, c)| if i == 0 { !is_ident_start(c) } else { !is_ident_continue(c) })
                .map_or(after.len(), |(i, _)| i);
            if len == 0 {
                return Err(invalid());
            }
            (&after[..len], len)
        };

        let value = vars.get(name).ok_or_else(|| {
            let (line, column) = position(template, offset);
            ManifestError::UnknownPlaceholder {
                name: name.to_string(),
                line,
                column,
            }
        })?;
        out.push_str(value);
        rest = &after[consumed..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Read the template at `path` and render it.
pub fn generate(path: impl AsRef<Path>, vars: &ManifestVars) -> Result<String, ManifestError> {
    let path = path.as_ref();
    let template = fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    render(&template, vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars() -> ManifestVars {
        ManifestVars::new("esp32", "1.2.3")
    }

    #[test]
    fn test_braced_and_bare_placeholders() {
        assert_eq!(render("v${VERSION}-${PLATFORM}", &vars()).unwrap(), "v1.2.3-esp32");
        assert_eq!(render("$PLATFORM/$VERSION.bin", &vars()).unwrap(), "esp32/1.2.3.bin");
    }

    #[test]
    fn test_escaped_dollar() {
        assert_eq!(render("cost: $$5 on $PLATFORM", &vars()).unwrap(), "cost: $5 on esp32");
    }

    #[test]
    fn test_json_manifest_template() {
        let template = r#"{
  "name": "Furble",
  "version": "${VERSION}",
  "builds": [{ "chipFamily": "${PLATFORM}" }]
}"#;
        let rendered = render(template, &vars()).unwrap();
        assert!(rendered.contains(r#""version": "1.2.3""#));
        assert!(rendered.contains(r#""chipFamily": "esp32""#));
    }

    #[test]
    fn test_unknown_placeholder() {
        let err = render("a\n  ${BOARD}", &vars()).unwrap_err();
        match err {
            ManifestError::UnknownPlaceholder { name, line, column } => {
                assert_eq!(name, "BOARD");
                assert_eq!((line, column), (2, 3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_placeholders() {
        for template in ["trailing $", "$1abc", "${VERSION", "${1x}", "$ space"] {
            assert!(
                matches!(
                    render(template, &vars()),
                    Err(ManifestError::InvalidPlaceholder { .. })
                ),
                "{template}"
            );
        }
    }

    #[test]
    fn test_from_lookup_requires_both() {
        let env: HashMap<&str, &str> = HashMap::from([("PLATFORM", "esp32")]);
        let err = ManifestVars::from_lookup(|name| env.get(name).map(|v| v.to_string()))
            .unwrap_err();
        assert!(matches!(err, ManifestError::MissingEnvironmentVariable("VERSION")));

        let env: HashMap<&str, &str> = HashMap::from([("PLATFORM", "esp32"), ("VERSION", "1.2.3")]);
        let vars = ManifestVars::from_lookup(|name| env.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(vars, ManifestVars::new("esp32", "1.2.3"));
    }

    #[test]
    fn test_generate_from_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("manifest.tmpl");
        fs::write(&path, "furble-${PLATFORM}-${VERSION}.bin").unwrap();

        assert_eq!(generate(&path, &vars()).unwrap(), "furble-esp32-1.2.3.bin");
        assert!(matches!(
            generate(temp_dir.path().join("missing.tmpl"), &vars()),
            Err(ManifestError::Io { .. })
        ));
    }
}
