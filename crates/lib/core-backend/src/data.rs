use std::collections::HashMap;

use serde_json::Value;

/// Optional per-deployment overrides read by workers at startup.
pub type WorkerConfiguration = HashMap<String, Value>;
