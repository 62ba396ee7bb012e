//! Identifiers: namespaced entity ids and per-command correlation ids.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SignalError, SignalResult};

/// Split `namespace:name`, requiring both halves to be non-empty.
fn split_namespaced(raw: &str) -> Option<(&str, &str)> {
    let (namespace, name) = raw.split_once(':')?;
    if namespace.is_empty() || name.is_empty() {
        return None;
    }
    Some((namespace, name))
}

macro_rules! namespaced_id {
    ($(#[$meta:meta])* $name:ident, $err:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: impl AsRef<str>) -> SignalResult<Self> {
                let raw = raw.as_ref().trim();
                match split_namespaced(raw) {
                    Some(_) => Ok(Self(raw.to_string())),
                    None => Err(SignalError::$err(raw.to_string())),
                }
            }

            pub fn namespace(&self) -> &str {
                self.0.split_once(':').map(|(ns, _)| ns).unwrap_or_default()
            }

            pub fn name(&self) -> &str {
                self.0.split_once(':').map(|(_, n)| n).unwrap_or_default()
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = SignalError;

            fn from_str(s: &str) -> SignalResult<Self> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = SignalError;

            fn try_from(value: String) -> SignalResult<Self> {
                Self::parse(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = SignalError;

            fn try_from(value: &str) -> SignalResult<Self> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

namespaced_id!(
    /// Identifier of a remote twin, `namespace:name`.
    ThingId,
    InvalidThingId
);

namespaced_id!(
    /// Identifier of the policy governing access to a thing.
    PolicyId,
    InvalidPolicyId
);

/// Opaque token linking an outgoing command to its response.
///
/// The client mints these; the backend echoes them back verbatim in the
/// `correlation-id` header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap a correlation id read off the wire. No format is enforced.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
