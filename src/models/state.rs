use serde::{ Serialize, Deserialize };
use serde_json::{ json, Value };

/// Fixed key of the single stored record.
pub const STATE_ID: &str = "latest";

/// `{"state": ...}` wrapper used by both directions of the state endpoint.
/// A missing `state` field reads as JSON null.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateEnvelope {
    #[serde(default)]
    pub state: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveAck {
    pub success: bool,
}

/// Document a client starts from when nothing has been saved yet.
pub fn default_state() -> Value {
    json!({ "counter": 0, "notes": "" })
}
