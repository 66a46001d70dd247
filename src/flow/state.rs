//! Per-invocation interpreter state.
//!
//! A fresh [`FlowContextState`] is created for every flow invocation and
//! shared only with the placeholder engine; nothing here ever hangs off the
//! compiled graph. The state is what gets frozen into a resume point when a
//! flow suspends, so serialization skips everything empty to keep stored
//! payloads small.

use rustc_hash::FxHashMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::thing::Thing;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowContextState {
    #[serde(
        default,
        serialize_with = "serialize_non_empty_states",
        skip_serializing_if = "all_states_empty"
    )]
    pub node_states: FxHashMap<String, FlowNodeState>,
    /// Node IDs that stored a result, in execution order. Placeholder
    /// enumeration and debugging rely on the ordering.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub result_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowNodeState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_base_value: Option<Thing>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub condition_item_met: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Thing>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub loop_exited: bool,
}

impl FlowNodeState {
    pub fn is_empty(&self) -> bool {
        self.condition_base_value.is_none()
            && !self.condition_item_met
            && self.result.is_none()
            && !self.loop_exited
    }
}

impl FlowContextState {
    pub fn node_state_mut(&mut self, node_id: &str) -> &mut FlowNodeState {
        self.node_states.entry(node_id.to_owned()).or_default()
    }

    pub fn node_state(&self, node_id: &str) -> Option<&FlowNodeState> {
        self.node_states.get(node_id)
    }

    pub fn store_result(&mut self, node_id: &str, value: Thing) {
        if !self.result_keys.iter().any(|k| k == node_id) {
            self.result_keys.push(node_id.to_owned());
        }
        self.node_state_mut(node_id).result = Some(value);
    }

    pub fn result(&self, node_id: &str) -> Thing {
        self.node_states
            .get(node_id)
            .and_then(|s| s.result.clone())
            .unwrap_or_default()
    }

    pub fn condition_item_met(&self, node_id: &str) -> bool {
        self.node_states
            .get(node_id)
            .is_some_and(|s| s.condition_item_met)
    }

    pub fn loop_exited(&self, node_id: &str) -> bool {
        self.node_states
            .get(node_id)
            .is_some_and(|s| s.loop_exited)
    }
}

fn all_states_empty(states: &FxHashMap<String, FlowNodeState>) -> bool {
    states.values().all(FlowNodeState::is_empty)
}

fn serialize_non_empty_states<S: Serializer>(
    states: &FxHashMap<String, FlowNodeState>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let non_empty: Vec<(&String, &FlowNodeState)> = states
        .iter()
        .filter(|(_, state)| !state.is_empty())
        .collect();
    let mut map = serializer.serialize_map(Some(non_empty.len()))?;
    for (id, state) in non_empty {
        map.serialize_entry(id, state)?;
    }
    map.end()
}
