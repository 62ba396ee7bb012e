//! Thin thing model. The client never interprets attribute or feature
//! contents; it only needs the id, the policy references and the JSON shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{SignalError, SignalResult};
use crate::ids::{PolicyId, ThingId};
use crate::pointer::JsonPointer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thing {
    pub thing_id: ThingId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<PolicyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Map<String, Value>>,
    /// Policy created alongside the thing (`_policy` on the wire).
    #[serde(rename = "_policy", default, skip_serializing_if = "Option::is_none")]
    pub inline_policy: Option<Map<String, Value>>,
}

impl Thing {
    pub fn new(thing_id: ThingId) -> Self {
        Self {
            thing_id,
            policy_id: None,
            attributes: None,
            features: None,
            inline_policy: None,
        }
    }

    /// Build a thing from its JSON form. `thingId` is mandatory.
    pub fn from_json(value: &Value) -> SignalResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| SignalError::InvalidThing("expected a JSON object".into()))?;
        if !obj.contains_key("thingId") {
            return Err(SignalError::InvalidThing("missing thingId".into()));
        }
        serde_json::from_value(value.clone()).map_err(|e| SignalError::InvalidThing(e.to_string()))
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn with_policy_id(mut self, policy_id: PolicyId) -> Self {
        self.policy_id = Some(policy_id);
        self
    }

    pub fn with_inline_policy(mut self, policy: Map<String, Value>) -> Self {
        self.inline_policy = Some(policy);
        self
    }

    /// Set an attribute at `path`, creating intermediate objects.
    pub fn with_attribute(mut self, path: &JsonPointer, value: impl Into<Value>) -> Self {
        let attrs = self.attributes.get_or_insert_with(Map::new);
        set_at(attrs, path.segments(), value.into());
        self
    }

    pub fn with_feature(mut self, feature_id: impl Into<String>, feature: Value) -> Self {
        self.features
            .get_or_insert_with(Map::new)
            .insert(feature_id.into(), feature);
        self
    }

    pub fn attribute(&self, path: &JsonPointer) -> Option<&Value> {
        let mut segments = path.segments().iter();
        let first = segments.next()?;
        let mut current = self.attributes.as_ref()?.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

impl From<ThingId> for Thing {
    fn from(thing_id: ThingId) -> Self {
        Thing::new(thing_id)
    }
}

fn set_at(map: &mut Map<String, Value>, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.insert(head.clone(), value);
        return;
    }
    let child = map
        .entry(head.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    if let Value::Object(child_map) = child {
        set_at(child_map, rest, value);
    }
}
