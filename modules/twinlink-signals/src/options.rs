//! Per-command options. Whether a combination is legal is decided by the
//! client's gateway, which knows the command semantics.

use std::fmt;
use std::time::Duration;

use crate::ids::{PolicyId, ThingId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModifyOption {
    /// `true` requires the target to exist (`if-match: *`), `false`
    /// requires it to be absent (`if-none-match: *`).
    Exists(bool),
    /// Create the thing with a copy of an existing policy.
    CopyPolicy(PolicyId),
    /// Create the thing with a copy of another thing's policy.
    CopyPolicyFromThing(ThingId),
    ResponseRequired(bool),
    Timeout(Duration),
}

impl ModifyOption {
    pub fn exists(exists: bool) -> Self {
        ModifyOption::Exists(exists)
    }

    pub fn copy_policy(policy_id: PolicyId) -> Self {
        ModifyOption::CopyPolicy(policy_id)
    }

    pub fn copy_policy_from_thing(thing_id: ThingId) -> Self {
        ModifyOption::CopyPolicyFromThing(thing_id)
    }

    pub fn response_required(required: bool) -> Self {
        ModifyOption::ResponseRequired(required)
    }

    pub fn timeout(timeout: Duration) -> Self {
        ModifyOption::Timeout(timeout)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModifyOption::Exists(_) => "exists",
            ModifyOption::CopyPolicy(_) => "copyPolicy",
            ModifyOption::CopyPolicyFromThing(_) => "copyPolicyFromThing",
            ModifyOption::ResponseRequired(_) => "responseRequired",
            ModifyOption::Timeout(_) => "timeout",
        }
    }

    pub fn is_policy_copy(&self) -> bool {
        matches!(
            self,
            ModifyOption::CopyPolicy(_) | ModifyOption::CopyPolicyFromThing(_)
        )
    }
}

impl fmt::Display for ModifyOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModifyOption::Exists(v) => write!(f, "exists({v})"),
            ModifyOption::CopyPolicy(id) => write!(f, "copyPolicy({id})"),
            ModifyOption::CopyPolicyFromThing(id) => write!(f, "copyPolicyFromThing({id})"),
            ModifyOption::ResponseRequired(v) => write!(f, "responseRequired({v})"),
            ModifyOption::Timeout(d) => write!(f, "timeout({}ms)", d.as_millis()),
        }
    }
}

/// Placeholder the backend resolves to another thing's policy id.
pub fn copy_policy_placeholder(thing_id: &ThingId) -> String {
    format!("{{{{ ref:things/{thing_id}/policyId }}}}")
}
