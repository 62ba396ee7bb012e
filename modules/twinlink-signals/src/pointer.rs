use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SignalError, SignalResult};

/// Slash-separated path into a thing's JSON, e.g. `/attributes/location/lat`.
///
/// The root pointer has no segments and renders as `/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JsonPointer {
    segments: Vec<String>,
}

impl JsonPointer {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a pointer. A leading slash is optional; empty segments (`a//b`,
    /// trailing `/`) are rejected.
    pub fn parse(raw: &str) -> SignalResult<Self> {
        let body = raw.strip_prefix('/').unwrap_or(raw);
        if body.is_empty() {
            return Ok(Self::root());
        }

        let mut segments = Vec::new();
        for segment in body.split('/') {
            if segment.is_empty() {
                return Err(SignalError::InvalidPointer(raw.to_string()));
            }
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append one segment. The segment is taken verbatim.
    pub fn push(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    pub fn join(mut self, other: &JsonPointer) -> Self {
        self.segments.extend(other.segments.iter().cloned());
        self
    }

    pub fn starts_with(&self, prefix: &JsonPointer) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// True when one pointer is a prefix of the other, i.e. the subtrees
    /// they address intersect.
    pub fn overlaps(&self, other: &JsonPointer) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for JsonPointer {
    type Err = SignalError;

    fn from_str(s: &str) -> SignalResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for JsonPointer {
    type Error = SignalError;

    fn try_from(value: String) -> SignalResult<Self> {
        Self::parse(&value)
    }
}

impl From<JsonPointer> for String {
    fn from(pointer: JsonPointer) -> String {
        pointer.to_string()
    }
}
