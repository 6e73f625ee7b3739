// ABOUTME: Validated host names for sites and their alias domains.
// ABOUTME: SiteUrl is a concrete domain; Domain additionally allows a leading wildcard label.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain cannot be empty")]
    Empty,

    #[error("domain exceeds maximum length of 253 characters")]
    TooLong,

    #[error("invalid label '{0}' in domain")]
    InvalidLabel(String),

    #[error("invalid character in domain: '{0}'")]
    InvalidChar(char),

    #[error("wildcard is not allowed here: {0}")]
    Wildcard(String),
}

/// A lowercase DNS name, optionally starting with a `*.` wildcard label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Domain(String);

impl Domain {
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let normalized = input
            .trim()
            .trim_end_matches('/')
            .trim_end_matches('.')
            .to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(DomainError::Empty);
        }
        if normalized.len() > MAX_DOMAIN_LEN {
            return Err(DomainError::TooLong);
        }

        for (index, label) in normalized.split('.').enumerate() {
            if index == 0 && label == "*" {
                continue;
            }
            validate_label(label)?;
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.0.starts_with("*.")
    }

    /// The domain with its first label removed, if at least two labels remain.
    ///
    /// `blog.example.com` yields `example.com`; `example.com` yields `None`.
    pub fn parent(&self) -> Option<Domain> {
        let (_, rest) = self.0.split_once('.')?;
        rest.contains('.').then(|| Domain(rest.to_string()))
    }
}

fn validate_label(label: &str) -> Result<(), DomainError> {
    if label.is_empty() || label.len() > MAX_LABEL_LEN {
        return Err(DomainError::InvalidLabel(label.to_string()));
    }
    if label.starts_with('-') || label.ends_with('-') {
        return Err(DomainError::InvalidLabel(label.to_string()));
    }
    if let Some(c) = label
        .chars()
        .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-')
    {
        return Err(DomainError::InvalidChar(c));
    }
    Ok(())
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Domain {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Domain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Domain {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Domain::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// The primary domain of a site. Never a wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteUrl(Domain);

impl SiteUrl {
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let domain = Domain::parse(input)?;
        if domain.is_wildcard() {
            return Err(DomainError::Wildcard(domain.0));
        }
        Ok(Self(domain))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn domain(&self) -> &Domain {
        &self.0
    }

    /// Compose project prefix: the URL with every non-alphanumeric character dropped.
    pub fn prefix(&self) -> String {
        self.as_str()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect()
    }

    /// Default database name: dots and hyphens become underscores.
    pub fn default_db_name(&self) -> String {
        self.as_str().replace(['.', '-'], "_")
    }

    pub fn default_admin_email(&self) -> String {
        format!("admin@{}", self.as_str())
    }
}

impl fmt::Display for SiteUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SiteUrl {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SiteUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SiteUrl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SiteUrl::parse(&raw).map_err(serde::de::Error::custom)
    }
}
