use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute mapping carried by a tree node.
pub type Attributes = serde_json::Map<String, Value>;

type RawTree = (String, Attributes, Vec<TreeNode>);

/// One node of a process definition: `(name, attributes, children)`.
///
/// Serializes as the JSON triple `[name, {attributes}, [children]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTree", into = "RawTree")]
pub struct TreeNode {
    pub name: String,
    pub attributes: Attributes,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Attributes::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: TreeNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = TreeNode>,
    {
        self.children.extend(children);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Attribute rendered as a string; null and missing attributes are `None`.
    pub fn attribute_str(&self, key: &str) -> Option<String> {
        match self.attributes.get(key)? {
            Value::Null => None,
            Value::String(value) => Some(value.clone()),
            other => Some(other.to_string()),
        }
    }

    /// `true` for the boolean `true` or the string `"true"`.
    pub fn attribute_flag(&self, key: &str) -> bool {
        match self.attributes.get(key) {
            Some(Value::Bool(value)) => *value,
            Some(Value::String(value)) => value == "true",
            _ => false,
        }
    }
}

impl From<RawTree> for TreeNode {
    fn from((name, attributes, children): RawTree) -> Self {
        Self {
            name,
            attributes,
            children,
        }
    }
}

impl From<TreeNode> for RawTree {
    fn from(node: TreeNode) -> Self {
        (node.name, node.attributes, node.children)
    }
}
