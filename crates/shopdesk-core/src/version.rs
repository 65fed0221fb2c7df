//! Version tokens.
//!
//! A row's `version` column is a counter bumped by every successful write.
//! Clients see it as the opaque strong validator `"v{n}"` in `ETag` and
//! send it back in `If-Match`. Comparison is byte-for-byte on the opaque
//! part; weak validators never match.

use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Opaque version token derived from a row version counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(String);

impl VersionToken {
    /// Token for row version `version`.
    #[must_use]
    pub fn from_version(version: i64) -> Self {
        Self(format!("v{version}"))
    }

    /// The opaque token without quotes, e.g. `v3`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `ETag` header value, e.g. `"v3"`.
    #[must_use]
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Whether an `If-Match` precondition is satisfied by this token.
    #[must_use]
    pub fn satisfies(&self, if_match: &IfMatch) -> bool {
        if_match
            .tags()
            .iter()
            .any(|tag| !tag.weak && tag.opaque.as_bytes() == self.0.as_bytes())
    }
}

impl Display for VersionToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entity tag from an `If-Match` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTag {
    pub weak: bool,
    pub opaque: String,
}

/// Parsed `If-Match` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfMatch(Vec<EntityTag>);

/// Why an `If-Match` header cannot be used as a precondition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IfMatchError {
    /// Header present but blank.
    #[error("If-Match header is empty")]
    Empty,
    /// `*` asserts nothing about the version and is not accepted.
    #[error("If-Match: * is not accepted, send the ETag of the resource")]
    Wildcard,
    /// Quoting is broken.
    #[error("Malformed If-Match header: {0}")]
    Malformed(String),
}

impl IfMatch {
    /// Parse an `If-Match` header value.
    ///
    /// Accepts a comma-separated list of entity tags. Bare tokens such as
    /// `v3` are accepted as strong tags for clients that drop the quotes.
    pub fn parse(raw: &str) -> Result<Self, IfMatchError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(IfMatchError::Empty);
        }
        if raw == "*" {
            return Err(IfMatchError::Wildcard);
        }

        let mut tags = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            tags.push(parse_tag(part)?);
        }
        if tags.is_empty() {
            return Err(IfMatchError::Empty);
        }
        Ok(Self(tags))
    }

    /// Entity tags in header order.
    #[must_use]
    pub fn tags(&self) -> &[EntityTag] {
        &self.0
    }
}

fn parse_tag(part: &str) -> Result<EntityTag, IfMatchError> {
    let (weak, rest) = match part.strip_prefix("W/") {
        Some(rest) => (true, rest),
        None => (false, part),
    };

    let opaque = if let Some(inner) = rest.strip_prefix('"') {
        inner
            .strip_suffix('"')
            .ok_or_else(|| IfMatchError::Malformed(part.to_string()))?
    } else if weak || rest.contains('"') {
        return Err(IfMatchError::Malformed(part.to_string()));
    } else {
        rest
    };

    if opaque.contains('"') {
        return Err(IfMatchError::Malformed(part.to_string()));
    }

    Ok(EntityTag {
        weak,
        opaque: opaque.to_string(),
    })
}
