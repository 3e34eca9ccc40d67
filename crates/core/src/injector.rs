//! Parameter injection into workflow graphs.
//!
//! Caller inputs arrive in one of two shapes (see [`JobInputs`]). Both are
//! first normalised into a flat list of [`Assignment`]s, then written into
//! the graph by [`apply`]. Values are coerced from loosely-typed text with
//! [`coerce_value`] because the destination field's type is not declared
//! anywhere.

use serde_json::{Map, Value};

use crate::workflow::{json_kind, scalar_to_string, ParamsMap, WorkflowGraph, NODE_INPUTS_KEY};

/// Accepted spellings of the node ID in list-form entries.
const NODE_ID_KEYS: [&str; 3] = ["nodeId", "node_id", "id"];

/// Accepted spellings of the field name in list-form entries.
const FIELD_NAME_KEYS: [&str; 3] = ["fieldName", "field_name", "field"];

/// Accepted spellings of the value in list-form entries.
const FIELD_VALUE_KEYS: [&str; 3] = ["fieldValue", "field_value", "value"];

// ---------------------------------------------------------------------------
// Input forms
// ---------------------------------------------------------------------------

/// One `{node, field, value}` entry of a list-form input.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFieldInput {
    pub node_id: String,
    pub field: String,
    pub value: Value,
}

/// Caller-supplied parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum JobInputs {
    /// Ordered `{nodeId, fieldName, fieldValue}` entries.
    List(Vec<NodeFieldInput>),
    /// Parameter name -> raw value, resolved through the params map or the
    /// `node:type.field` / `node.field` key conventions.
    Map(Map<String, Value>),
}

impl JobInputs {
    /// Classify raw request JSON.
    ///
    /// Arrays become [`JobInputs::List`] (entries without a node or field
    /// are dropped), objects become [`JobInputs::Map`], anything else
    /// carries no parameters.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(Self::List(
                items.iter().filter_map(parse_list_entry).collect(),
            )),
            Value::Object(map) => Some(Self::Map(map.clone())),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::List(items) => items.is_empty(),
            Self::Map(map) => map.is_empty(),
        }
    }
}

fn parse_list_entry(item: &Value) -> Option<NodeFieldInput> {
    let entry = item.as_object()?;

    let node_id = NODE_ID_KEYS
        .iter()
        .filter_map(|k| entry.get(*k).and_then(scalar_to_string))
        .find(|s| !s.is_empty())?;
    let field = FIELD_NAME_KEYS
        .iter()
        .filter_map(|k| entry.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())?
        .to_string();
    let value = FIELD_VALUE_KEYS
        .iter()
        .find_map(|k| entry.get(*k))
        .cloned()
        .unwrap_or(Value::Null);

    Some(NodeFieldInput {
        node_id,
        field,
        value,
    })
}

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

/// A single write: `graph[node_id]` at `path` gets `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub node_id: String,
    /// Path inside the node record, e.g. `["inputs", "seed"]`.
    pub path: Vec<String>,
    /// Already coerced.
    pub value: Value,
}

impl Assignment {
    fn input(node_id: impl Into<String>, field: impl Into<String>, value: Value) -> Self {
        Self {
            node_id: node_id.into(),
            path: vec![NODE_INPUTS_KEY.to_string(), field.into()],
            value,
        }
    }
}

/// Resolve caller inputs into canonical assignments.
///
/// Map keys are resolved in precedence order: params map entry, then
/// `"<node>:<type>.<field>"`, then `"<node>.<field>"`. Keys matching none
/// of these are ignored. A params map entry always claims its key, even
/// when the entry itself is unusable. Assignments keep the caller's key
/// order, so a later key wins when two target the same field.
pub fn normalize(inputs: &JobInputs, params_map: &ParamsMap) -> Vec<Assignment> {
    match inputs {
        JobInputs::List(items) => items
            .iter()
            .map(|item| Assignment::input(&item.node_id, &item.field, coerce_value(&item.value)))
            .collect(),
        JobInputs::Map(map) => map
            .iter()
            .filter_map(|(key, raw)| resolve_key(key, coerce_value(raw), params_map))
            .collect(),
    }
}

fn resolve_key(key: &str, value: Value, params_map: &ParamsMap) -> Option<Assignment> {
    if let Some(target) = params_map.get(key) {
        if !target.is_usable() {
            tracing::debug!(param = %key, "params_map entry has no usable target");
            return None;
        }
        return Some(Assignment {
            node_id: target.node_id.clone(),
            path: target.path(),
            value,
        });
    }

    if let Some((node_part, field_part)) = key.split_once(':') {
        let node_id = node_part.trim();
        let field = field_part.rsplit('.').next().unwrap_or_default().trim();
        return (!node_id.is_empty() && !field.is_empty())
            .then(|| Assignment::input(node_id, field, value));
    }

    if let Some((node_part, field_part)) = key.split_once('.') {
        let node_id = node_part.trim();
        let field = field_part.trim();
        return (!node_id.is_empty() && !field.is_empty())
            .then(|| Assignment::input(node_id, field, value));
    }

    None
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// A write that could not be performed.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectionFailure {
    pub node_id: String,
    pub path: String,
    pub reason: String,
}

/// Diagnostics from one injection pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InjectionReport {
    /// Number of values written.
    pub applied: usize,
    /// Node IDs that were targeted but do not exist in the graph.
    pub missing_nodes: Vec<String>,
    /// Writes that hit a non-object along the path.
    pub failures: Vec<InjectionFailure>,
}

impl InjectionReport {
    pub fn is_clean(&self) -> bool {
        self.missing_nodes.is_empty() && self.failures.is_empty()
    }
}

/// Merge caller inputs into `graph` in place.
///
/// Never fails as a whole: missing nodes are skipped and unwritable paths
/// are recorded in the returned report while the remaining inputs are
/// still applied.
pub fn apply(graph: &mut WorkflowGraph, params_map: &ParamsMap, inputs: &JobInputs) -> InjectionReport {
    apply_assignments(graph, normalize(inputs, params_map))
}

/// Write pre-resolved assignments into `graph` in place.
pub fn apply_assignments(graph: &mut WorkflowGraph, assignments: Vec<Assignment>) -> InjectionReport {
    let mut report = InjectionReport::default();

    for assignment in assignments {
        let Some(node) = graph.node_mut(&assignment.node_id) else {
            report.missing_nodes.push(assignment.node_id);
            continue;
        };

        match set_by_path(node, &assignment.path, assignment.value) {
            Ok(()) => report.applied += 1,
            Err(reason) => {
                let path = assignment.path.join(".");
                tracing::warn!(
                    node_id = %assignment.node_id,
                    path = %path,
                    reason = %reason,
                    "Failed to inject parameter",
                );
                report.failures.push(InjectionFailure {
                    node_id: assignment.node_id,
                    path,
                    reason,
                });
            }
        }
    }

    report
}

/// Set `target[path[0]][path[1]]...` to `value`, creating missing
/// intermediate objects. Fails if an existing value along the way is not
/// an object.
pub fn set_by_path(target: &mut Value, path: &[String], value: Value) -> Result<(), String> {
    let Some((last, parents)) = path.split_last() else {
        return Err("empty field path".to_string());
    };

    let mut current = target;
    for part in parents {
        current = match current {
            Value::Object(map) => map
                .entry(part.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            other => {
                return Err(format!(
                    "cannot descend into '{part}': parent is a {}",
                    json_kind(other)
                ))
            }
        };
    }

    match current {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        other => Err(format!("cannot set '{last}' on a {}", json_kind(other))),
    }
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

/// Coerce loosely-typed caller text into the JSON type a node most likely
/// expects.
///
/// * `"true"` / `"false"` (any case) -> boolean
/// * blank -> `""`
/// * integer text -> integer (JSON numbers are 64-bit here, so integer
///   text beyond the `u64` range stays a string)
/// * text containing `.` that parses as a finite float -> float
/// * anything else, and all non-strings, unchanged
pub fn coerce_value(value: &Value) -> Value {
    let Value::String(raw) = value else {
        return value.clone();
    };
    let trimmed = raw.trim();

    if trimmed.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if trimmed.is_empty() {
        return Value::String(String::new());
    }

    if trimmed.contains('.') {
        if let Some(n) = trimmed
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
        {
            return Value::Number(n);
        }
    } else if let Ok(n) = trimmed.parse::<i64>() {
        return Value::from(n);
    } else if let Ok(n) = trimmed.parse::<u64>() {
        return Value::from(n);
    }

    value.clone()
}
