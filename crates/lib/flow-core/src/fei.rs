use serde::{Deserialize, Serialize};

/// Flow expression identifier: addresses one execution node inside one
/// process instance and doubles as its storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowExpressionId {
    /// Workflow instance id.
    pub wfid: String,
    /// Position of the node in the tree: `"0"` for the root, then one
    /// `_{index}` suffix per level.
    pub expid: String,
    pub definition_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_wfid: Option<String>,
}

impl FlowExpressionId {
    pub const ROOT_EXPID: &'static str = "0";

    pub fn root(wfid: impl Into<String>, definition_id: impl Into<String>) -> Self {
        Self {
            wfid: wfid.into(),
            expid: Self::ROOT_EXPID.to_string(),
            definition_id: definition_id.into(),
            sub_wfid: None,
        }
    }

    /// Identifier of the (possibly not yet existing) child at `index`.
    pub fn child(&self, index: usize) -> Self {
        Self {
            expid: format!("{}_{}", self.expid, index),
            ..self.clone()
        }
    }

    /// Index of this node among `parent`'s tree children, or `None` when it
    /// is not one of them (a sub-process, or another part of the tree).
    pub fn tree_index_under(&self, parent: &FlowExpressionId) -> Option<usize> {
        if self.wfid != parent.wfid || self.sub_wfid != parent.sub_wfid {
            return None;
        }
        let index = self.expid.strip_prefix(&parent.expid)?.strip_prefix('_')?;
        index.parse().ok()
    }

    pub fn to_storage_id(&self) -> String {
        format!(
            "{}!{}!{}",
            self.expid,
            self.sub_wfid.as_deref().unwrap_or(""),
            self.wfid
        )
    }
}

impl std::fmt::Display for FlowExpressionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_storage_id())
    }
}
