//! Version gating for descriptors.
//!
//! A descriptor may carry a semver requirement such as ">=1.4.0, <1.5.0"; the
//! patch only applies to builders whose declared library version satisfies it.

use semver::{Version, VersionReq};
use std::fmt;

#[derive(Debug, Clone)]
pub enum VersionError {
    /// Builder version is not valid semver (e.g., "not-a-version")
    InvalidVersion { value: String, source: String },
    /// Requirement is not a valid semver requirement (e.g., ">=bad")
    InvalidRequirement { value: String, source: String },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::InvalidVersion { value, source } => {
                write!(f, "invalid library version '{}': {}", value, source)
            }
            VersionError::InvalidRequirement { value, source } => {
                write!(f, "invalid version requirement '{}': {}", value, source)
            }
        }
    }
}

impl std::error::Error for VersionError {}

/// Parse a requirement string. Empty or whitespace-only means "any version".
pub fn parse_requirement(requirement: &str) -> Result<Option<VersionReq>, VersionError> {
    let trimmed = requirement.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    VersionReq::parse(trimmed)
        .map(Some)
        .map_err(|e| VersionError::InvalidRequirement {
            value: trimmed.to_string(),
            source: e.to_string(),
        })
}

/// Decide whether a builder's version passes a descriptor's requirement.
///
/// No requirement passes everything. A requirement against a builder that
/// declares no version does not pass: the patch was written for specific
/// upstream sources.
///
/// # Examples
///
/// ```
/// use prebuild_patcher::config::version::satisfies;
///
/// assert!(satisfies(Some("1.4.1"), Some(">=1.4.0, <1.5.0")).unwrap());
/// assert!(!satisfies(Some("1.3.9"), Some(">=1.4.0")).unwrap());
/// assert!(!satisfies(None, Some(">=1.4.0")).unwrap());
/// assert!(satisfies(None, None).unwrap());
/// ```
pub fn satisfies(version: Option<&str>, requirement: Option<&str>) -> Result<bool, VersionError> {
    let Some(req) = requirement.map(parse_requirement).transpose()?.flatten() else {
        return Ok(true);
    };
    let Some(version) = version else {
        return Ok(false);
    };

    // Library manifests often carry a leading "v".
    let cleaned = version.trim().trim_start_matches('v');
    let version = Version::parse(cleaned).map_err(|e| VersionError::InvalidVersion {
        value: version.to_string(),
        source: e.to_string(),
    })?;

    Ok(req.matches(&version))
}
