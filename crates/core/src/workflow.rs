//! ComfyUI workflow graphs in API format and their parameter mappings.
//!
//! A graph is a JSON object keyed by node ID, where each node record
//! looks like `{"class_type": "KSampler", "inputs": {...}}`. Graphs are
//! kept as raw JSON so that unknown node types round-trip untouched.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Key of the field mapping inside a node record.
pub const NODE_INPUTS_KEY: &str = "inputs";

/// Key of the node type inside a node record.
pub const NODE_CLASS_TYPE_KEY: &str = "class_type";

// ---------------------------------------------------------------------------
// WorkflowGraph
// ---------------------------------------------------------------------------

/// A workflow graph: node ID -> node record.
///
/// Cloning yields an independent deep copy, which is how each job gets
/// its own mutable graph from a shared template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowGraph(Map<String, Value>);

impl WorkflowGraph {
    /// Build a graph from arbitrary JSON, rejecting anything that is not
    /// an object.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        match value {
            Value::Object(nodes) => Ok(Self(nodes)),
            other => Err(CoreError::InvalidInput(format!(
                "workflow graph must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.0.contains_key(node_id)
    }

    pub fn node(&self, node_id: &str) -> Option<&Value> {
        self.0.get(node_id)
    }

    pub fn node_mut(&mut self, node_id: &str) -> Option<&mut Value> {
        self.0.get_mut(node_id)
    }

    /// Class type of a node, if the node exists and declares one.
    pub fn class_type(&self, node_id: &str) -> Option<&str> {
        self.node(node_id)?.get(NODE_CLASS_TYPE_KEY)?.as_str()
    }

    /// Value of `graph[node_id].inputs[field]`.
    pub fn input(&self, node_id: &str, field: &str) -> Option<&Value> {
        self.node(node_id)?.get(NODE_INPUTS_KEY)?.get(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for WorkflowGraph {
    fn from(nodes: Map<String, Value>) -> Self {
        Self(nodes)
    }
}

// ---------------------------------------------------------------------------
// Parameter mapping
// ---------------------------------------------------------------------------

/// Where a named caller parameter lands inside the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParamTarget {
    /// Target node ID.
    pub node_id: String,
    /// Dotted path inside the node record, e.g. `inputs.seed`.
    pub field: String,
}

impl ParamTarget {
    pub fn new(node_id: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            field: field.into(),
        }
    }

    /// Path segments of [`field`](Self::field). Empty when the field is blank.
    pub fn path(&self) -> Vec<String> {
        if self.field.trim().is_empty() {
            return Vec::new();
        }
        self.field.split('.').map(|s| s.to_string()).collect()
    }

    /// A target is usable when both the node and the first path segment
    /// are non-empty.
    pub fn is_usable(&self) -> bool {
        !self.node_id.is_empty() && self.path().first().is_some_and(|s| !s.is_empty())
    }
}

/// Caller parameter name -> graph target.
pub type ParamsMap = HashMap<String, ParamTarget>;

/// Parse the `params_map` object of a template's metadata document.
///
/// `node_id` may be a string or a number. Entries that are not objects
/// are skipped with a warning. Entries with missing fields are kept (as unusable targets)
/// so that their key is still claimed by the mapping during injection.
pub fn parse_params_map(value: &Value) -> ParamsMap {
    let Some(entries) = value.as_object() else {
        if !value.is_null() {
            tracing::warn!(kind = json_kind(value), "params_map is not an object, ignoring");
        }
        return ParamsMap::new();
    };

    let mut map = ParamsMap::with_capacity(entries.len());
    for (key, entry) in entries {
        let Some(entry) = entry.as_object() else {
            tracing::warn!(param = %key, "Skipping malformed params_map entry");
            continue;
        };
        let node_id = entry
            .get("node_id")
            .and_then(scalar_to_string)
            .unwrap_or_default();
        let field = entry
            .get("field")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        map.insert(key.clone(), ParamTarget::new(node_id, field));
    }
    map
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// A named template as loaded from the store.
#[derive(Debug, Clone, Default)]
pub struct Template {
    pub graph: WorkflowGraph,
    pub params_map: ParamsMap,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Render a JSON string or number as a trimmed string.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Short name of a JSON value's kind, for diagnostics.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn graph_from_object() {
        let graph = WorkflowGraph::from_value(json!({
            "3": {"class_type": "KSampler", "inputs": {"seed": 1}}
        }))
        .unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.class_type("3"), Some("KSampler"));
        assert_eq!(graph.input("3", "seed"), Some(&json!(1)));
    }

    #[test]
    fn graph_keeps_template_node_order() {
        let value: Value =
            serde_json::from_str(r#"{"9": {"inputs": {}}, "10": {"inputs": {}}, "3": {"inputs": {}}}"#)
                .unwrap();
        let graph = WorkflowGraph::from_value(value).unwrap();
        let text = serde_json::to_string(&graph).unwrap();
        assert!(text.starts_with(r#"{"9":"#), "{text}");
        assert!(text.find(r#""10""#) < text.find(r#""3""#));
    }

    #[test]
    fn graph_from_array_is_rejected() {
        let err = WorkflowGraph::from_value(json!([1, 2])).unwrap_err();
        assert_matches!(err, CoreError::InvalidInput(msg) if msg.contains("array"));
    }

    #[test]
    fn cloned_graphs_do_not_share_state() {
        let template = WorkflowGraph::from_value(json!({"1": {"inputs": {"text": "a"}}})).unwrap();
        let mut copy = template.clone();
        copy.node_mut("1").unwrap()["inputs"]["text"] = json!("b");
        assert_eq!(template.input("1", "text"), Some(&json!("a")));
        assert_eq!(copy.input("1", "text"), Some(&json!("b")));
    }

    #[test]
    fn params_map_accepts_numeric_node_ids() {
        let map = parse_params_map(&json!({
            "seed": {"node_id": 3, "field": "inputs.seed"},
            "prompt": {"node_id": " 6 ", "field": "inputs.text"}
        }));
        assert_eq!(map["seed"], ParamTarget::new("3", "inputs.seed"));
        assert_eq!(map["prompt"].node_id, "6");
    }

    #[test]
    fn params_map_skips_non_object_entries() {
        let map = parse_params_map(&json!({"seed": "3.inputs.seed", "cfg": {"node_id": "3"}}));
        assert!(!map.contains_key("seed"));
        assert!(!map["cfg"].is_usable());
    }

    #[test]
    fn params_map_of_non_object_is_empty() {
        assert!(parse_params_map(&json!(null)).is_empty());
        assert!(parse_params_map(&json!([1])).is_empty());
    }

    #[test]
    fn target_path_splits_on_dots() {
        let target = ParamTarget::new("3", "inputs.sampler.seed");
        assert_eq!(target.path(), vec!["inputs", "sampler", "seed"]);
        assert!(target.is_usable());
        assert!(ParamTarget::new("3", "").path().is_empty());
    }
}
