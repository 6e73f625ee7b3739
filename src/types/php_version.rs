// ABOUTME: Supported PHP runtime versions and resolution of user input.
// ABOUTME: Unsupported minors fall back to the newest release of the same major.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhpVersionError {
    #[error("invalid PHP version: {0}")]
    Invalid(String),

    #[error("unsupported PHP version: {0}")]
    Unsupported(String),
}

/// A PHP release line with a published runtime image.
///
/// 8.0 is served by the `latest` image and therefore has no variant of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PhpVersion {
    V5_6,
    V7_0,
    V7_2,
    V7_3,
    V7_4,
    V8_1,
    V8_2,
    V8_3,
    V8_4,
    #[default]
    Latest,
}

/// Outcome of resolving a requested version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPhp {
    pub version: PhpVersion,
    /// The requested version when it had to be replaced by a fallback.
    pub fallback_from: Option<String>,
}

impl PhpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhpVersion::V5_6 => "5.6",
            PhpVersion::V7_0 => "7.0",
            PhpVersion::V7_2 => "7.2",
            PhpVersion::V7_3 => "7.3",
            PhpVersion::V7_4 => "7.4",
            PhpVersion::V8_1 => "8.1",
            PhpVersion::V8_2 => "8.2",
            PhpVersion::V8_3 => "8.3",
            PhpVersion::V8_4 => "8.4",
            PhpVersion::Latest => "latest",
        }
    }

    /// Whether the runtime needs the legacy php.ini layout.
    pub fn is_legacy(&self) -> bool {
        matches!(self, PhpVersion::V5_6)
    }

    /// Resolve a requested version string.
    ///
    /// `latest` and every supported `major.minor` map directly; `8.0` maps to
    /// `latest`. Any other minor of major 5, 7 or 8 falls back to 5.6, 7.4 or
    /// 8.3 respectively. Other majors are rejected.
    pub fn resolve(input: &str) -> Result<ResolvedPhp, PhpVersionError> {
        let input = input.trim();
        if input.eq_ignore_ascii_case("latest") {
            return Ok(ResolvedPhp {
                version: PhpVersion::Latest,
                fallback_from: None,
            });
        }

        let (major, minor) = parse_numeric(input)?;
        if let Some(version) = exact(major, minor) {
            return Ok(ResolvedPhp {
                version,
                fallback_from: None,
            });
        }

        let fallback = match major {
            5 => PhpVersion::V5_6,
            7 => PhpVersion::V7_4,
            8 => PhpVersion::V8_3,
            _ => return Err(PhpVersionError::Unsupported(input.to_string())),
        };
        Ok(ResolvedPhp {
            version: fallback,
            fallback_from: Some(input.to_string()),
        })
    }
}

fn parse_numeric(input: &str) -> Result<(u32, u32), PhpVersionError> {
    let invalid = || PhpVersionError::Invalid(input.to_string());
    let (major, minor) = match input.split_once('.') {
        Some((major, minor)) => (major, minor),
        None => (input, "0"),
    };
    let major = major.parse().map_err(|_| invalid())?;
    let minor = minor.parse().map_err(|_| invalid())?;
    Ok((major, minor))
}

fn exact(major: u32, minor: u32) -> Option<PhpVersion> {
    let version = match (major, minor) {
        (5, 6) => PhpVersion::V5_6,
        (7, 0) => PhpVersion::V7_0,
        (7, 2) => PhpVersion::V7_2,
        (7, 3) => PhpVersion::V7_3,
        (7, 4) => PhpVersion::V7_4,
        (8, 0) => PhpVersion::Latest,
        (8, 1) => PhpVersion::V8_1,
        (8, 2) => PhpVersion::V8_2,
        (8, 3) => PhpVersion::V8_3,
        (8, 4) => PhpVersion::V8_4,
        _ => return None,
    };
    Some(version)
}

impl fmt::Display for PhpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PhpVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PhpVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let resolved = PhpVersion::resolve(&raw).map_err(serde::de::Error::custom)?;
        if resolved.fallback_from.is_some() {
            return Err(serde::de::Error::custom(format!(
                "stored PHP version {raw} is not supported"
            )));
        }
        Ok(resolved.version)
    }
}
