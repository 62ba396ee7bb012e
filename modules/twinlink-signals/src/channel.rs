use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SignalError;

/// Which view of a thing a signal addresses: the persisted twin, or the live
/// device behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Twin,
    Live,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Twin, Channel::Live];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Twin => "twin",
            Channel::Live => "live",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "twin" => Ok(Channel::Twin),
            "live" => Ok(Channel::Live),
            other => Err(SignalError::UnknownChannel(other.to_string())),
        }
    }
}
