use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::FlowExpressionId;

/// Business fields carried by a workitem.
pub type Fields = serde_json::Map<String, Value>;

/// Stamp set on the applied workitem of an expression that timed out.
pub const TIMED_OUT_FIELD: &str = "__timed_out__";

/// Stamp set on the workitem a failing expression replies with when it has no
/// `on_error` handler.
pub const FAILED_FIELD: &str = "__failed__";

/// Business payload threaded through execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workitem {
    /// Expression currently holding (or last replying with) this workitem.
    #[serde(default)]
    pub fei: Option<FlowExpressionId>,
    #[serde(default)]
    pub fields: Fields,
}

impl Workitem {
    pub fn new(fields: Fields) -> Self {
        Self { fei: None, fields }
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn set_field(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }
}
