use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{FlowExpressionId, TreeNode, Variables, Workitem};

/// What a queued task asks the worker to do (or, for notifications and
/// terminal events, what happened).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Launch,
    Apply,
    Reply,
    Cancel,
    Terminated,
    Cancelled,
    Killed,
    Error,
    EnteredTag,
    LeftTag,
    Forgotten,
    #[serde(other)]
    Unknown,
}

impl TaskAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Launch => "launch",
            Self::Apply => "apply",
            Self::Reply => "reply",
            Self::Cancel => "cancel",
            Self::Terminated => "terminated",
            Self::Cancelled => "cancelled",
            Self::Killed => "killed",
            Self::Error => "error",
            Self::EnteredTag => "entered_tag",
            Self::LeftTag => "left_tag",
            Self::Forgotten => "forgotten",
            Self::Unknown => "unknown",
        }
    }

    /// Process-level terminal events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::Cancelled | Self::Killed)
    }
}

impl std::fmt::Display for TaskAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelFlavour {
    #[default]
    Normal,
    Kill,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Node-type logic failed while a task was dispatched.
    Apply,
    /// An expiry configured with `on_timeout: error`.
    Timeout,
}

/// Error payload carried by `error` tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub timeout: Option<String>,
    /// Action of the task whose dispatch failed.
    #[serde(default)]
    pub action: Option<TaskAction>,
}

impl ErrorRecord {
    pub fn apply(action: TaskAction, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Apply,
            message: message.into(),
            timeout: None,
            action: Some(action),
        }
    }

    pub fn timeout(timeout: Option<String>) -> Self {
        let message = match &timeout {
            Some(duration) => format!("expression timed out after {duration}"),
            None => "expression timed out".to_string(),
        };
        Self {
            kind: ErrorKind::Timeout,
            message,
            timeout,
            action: None,
        }
    }
}

/// A record on the shared task queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub action: TaskAction,
    #[serde(default)]
    pub fei: Option<FlowExpressionId>,
    #[serde(default)]
    pub wfid: Option<String>,
    #[serde(default)]
    pub parent_id: Option<FlowExpressionId>,
    #[serde(default)]
    pub tree: Option<TreeNode>,
    #[serde(default)]
    pub workitem: Option<Workitem>,
    #[serde(default)]
    pub variables: Option<Variables>,
    /// Definition id used when launching a new process.
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default)]
    pub flavour: Option<CancelFlavour>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub error: Option<ErrorRecord>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(action: TaskAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            fei: None,
            wfid: None,
            parent_id: None,
            tree: None,
            workitem: None,
            variables: None,
            definition: None,
            flavour: None,
            tag: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Launch request for a brand new process instance.
    pub fn launch(wfid: impl Into<String>, tree: TreeNode, workitem: Workitem) -> Self {
        Self::new(TaskAction::Launch)
            .with_wfid(wfid)
            .with_tree(tree)
            .with_workitem(workitem)
    }

    pub fn with_fei(mut self, fei: FlowExpressionId) -> Self {
        if self.wfid.is_none() {
            self.wfid = Some(fei.wfid.clone());
        }
        self.fei = Some(fei);
        self
    }

    pub fn with_wfid(mut self, wfid: impl Into<String>) -> Self {
        self.wfid = Some(wfid.into());
        self
    }

    pub fn with_parent_id(mut self, parent_id: Option<FlowExpressionId>) -> Self {
        self.parent_id = parent_id;
        self
    }

    pub fn with_tree(mut self, tree: TreeNode) -> Self {
        self.tree = Some(tree);
        self
    }

    pub fn with_workitem(mut self, workitem: Workitem) -> Self {
        self.workitem = Some(workitem);
        self
    }

    pub fn with_variables(mut self, variables: Option<Variables>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }

    pub fn with_flavour(mut self, flavour: CancelFlavour) -> Self {
        self.flavour = Some(flavour);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_error(mut self, error: ErrorRecord) -> Self {
        self.error = Some(error);
        self
    }
}
