use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{FlowExpressionId, TreeNode, Variables, Workitem};

/// Lifecycle state of a persisted expression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionState {
    #[default]
    Active,
    Failing,
    Cancelling,
    CancellingByKill,
    CancellingByTimeout,
}

impl ExpressionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Failing => "failing",
            Self::Cancelling => "cancelling",
            Self::CancellingByKill => "cancelling_by_kill",
            Self::CancellingByTimeout => "cancelling_by_timeout",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for ExpressionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `on_cancel` / `on_error` / `on_timeout` handler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HandlerSpec {
    /// A node name, or one of the keywords `redo`, `undo`, `error`.
    Named(String),
    Tree(TreeNode),
}

impl HandlerSpec {
    pub fn from_attribute(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) if !name.is_empty() => Some(Self::Named(name.clone())),
            Value::Array(_) => serde_json::from_value(value.clone()).ok().map(Self::Tree),
            _ => None,
        }
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Self::Named(name) if name == keyword)
    }
}

/// Persisted execution node. Its storage key is `fei`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionRecord {
    pub fei: FlowExpressionId,
    #[serde(default)]
    pub parent_id: Option<FlowExpressionId>,
    pub original_tree: TreeNode,
    #[serde(default)]
    pub updated_tree: Option<TreeNode>,
    #[serde(default)]
    pub state: ExpressionState,
    pub applied_workitem: Workitem,
    /// Own variable scope; `None` means the expression reads its ancestors'.
    #[serde(default)]
    pub variables: Option<Variables>,
    /// Dispatched children that have not replied yet.
    #[serde(default)]
    pub children: Vec<FlowExpressionId>,
    #[serde(default)]
    pub on_cancel: Option<HandlerSpec>,
    #[serde(default)]
    pub on_error: Option<HandlerSpec>,
    #[serde(default)]
    pub on_timeout: Option<HandlerSpec>,
    #[serde(default)]
    pub tag: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(default)]
    pub timeout_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timeout_job_id: Option<Uuid>,
}

impl ExpressionRecord {
    pub fn new(
        fei: FlowExpressionId,
        parent_id: Option<FlowExpressionId>,
        tree: TreeNode,
        variables: Option<Variables>,
        mut workitem: Workitem,
    ) -> Self {
        let now = Utc::now();
        workitem.fei = Some(fei.clone());
        let handler = |key: &str| tree.attribute(key).and_then(HandlerSpec::from_attribute);
        let on_cancel = handler("on_cancel");
        let on_error = handler("on_error");
        let on_timeout = handler("on_timeout");
        Self {
            on_cancel,
            on_error,
            on_timeout,
            fei,
            parent_id,
            original_tree: tree,
            updated_tree: None,
            state: ExpressionState::Active,
            applied_workitem: workitem,
            variables,
            children: Vec::new(),
            tag: None,
            created_at: now,
            modified_at: now,
            timeout_at: None,
            timeout_job_id: None,
        }
    }

    pub fn storage_id(&self) -> String {
        self.fei.to_storage_id()
    }

    pub fn tree(&self) -> &TreeNode {
        self.updated_tree.as_ref().unwrap_or(&self.original_tree)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_new_record_reads_handlers_and_stamps_workitem() {
        let fei = FlowExpressionId::root("wf-1", "def");
        let tree = TreeNode::new("sequence")
            .with_attribute("on_error", "undo")
            .with_attribute("on_cancel", json!(["cleanup", {}, []]))
            .with_attribute("on_timeout", "");
        let record = ExpressionRecord::new(fei.clone(), None, tree, None, Workitem::default());

        assert_eq!(record.on_error, Some(HandlerSpec::Named("undo".to_string())));
        assert_eq!(
            record.on_cancel,
            Some(HandlerSpec::Tree(TreeNode::new("cleanup")))
        );
        assert_eq!(record.on_timeout, None);
        assert_eq!(record.applied_workitem.fei, Some(fei));
        assert!(record.state.is_active());
    }

    #[test]
    fn test_tree_prefers_updated_tree() {
        let fei = FlowExpressionId::root("wf-1", "def");
        let mut record = ExpressionRecord::new(
            fei,
            None,
            TreeNode::new("sequence"),
            None,
            Workitem::default(),
        );
        assert_eq!(record.tree().name, "sequence");
        record.updated_tree = Some(TreeNode::new("concurrence"));
        assert_eq!(record.tree().name, "concurrence");
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let value = serde_json::to_value(ExpressionState::CancellingByTimeout).expect("serialize");
        assert_eq!(value, json!("cancelling_by_timeout"));
    }
}
