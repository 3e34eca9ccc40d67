//! ComfyUI WebSocket message types and parser.
//!
//! ComfyUI sends JSON messages over WebSocket with the shape
//! `{"type": "<kind>", "data": {...}}`. This module deserializes them
//! into a strongly-typed [`ComfyUIMessage`] enum.

use serde::Deserialize;

/// Message kinds understood by [`parse_message`].
pub const KNOWN_MESSAGE_TYPES: [&str; 7] = [
    "status",
    "execution_start",
    "execution_cached",
    "executing",
    "progress",
    "executed",
    "execution_error",
];

/// Fallback error text when ComfyUI omits `exception_message`.
pub const DEFAULT_EXECUTION_ERROR: &str = "execution_error";

/// All known ComfyUI WebSocket message types.
///
/// Deserialized via the adjacently-tagged `"type"` field with
/// associated `"data"` content.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ComfyUIMessage {
    /// Server status broadcast (queue depth, etc.).
    #[serde(rename = "status")]
    Status(StatusData),

    /// A prompt has started executing.
    #[serde(rename = "execution_start")]
    ExecutionStart(ExecutionStartData),

    /// Some nodes were skipped because their outputs are cached.
    #[serde(rename = "execution_cached")]
    ExecutionCached(ExecutionCachedData),

    /// A specific node is currently executing (or execution finished when `node` is `None`).
    #[serde(rename = "executing")]
    Executing(ExecutingData),

    /// Progress update from a long-running node (e.g. KSampler).
    #[serde(rename = "progress")]
    Progress(ProgressData),

    /// A node has finished and produced output.
    #[serde(rename = "executed")]
    Executed(ExecutedData),

    /// Execution failed with an error.
    #[serde(rename = "execution_error")]
    ExecutionError(ErrorData),
}

impl ComfyUIMessage {
    /// The `prompt_id` this message refers to, if any.
    pub fn prompt_id(&self) -> Option<&str> {
        match self {
            Self::Status(_) => None,
            Self::ExecutionStart(d) => Some(&d.prompt_id),
            Self::ExecutionCached(d) => Some(&d.prompt_id),
            Self::Executing(d) => Some(&d.prompt_id),
            Self::Progress(d) => d.prompt_id.as_deref(),
            Self::Executed(d) => Some(&d.prompt_id),
            Self::ExecutionError(d) => Some(&d.prompt_id),
        }
    }
}

/// Queue status information.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueStatus,
}

/// Current queue state.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub exec_info: ExecInfo,
}

/// Execution queue statistics.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: i32,
}

/// Payload for `execution_start` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionStartData {
    pub prompt_id: String,
}

/// Payload for `execution_cached` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionCachedData {
    pub prompt_id: String,
    /// Node IDs whose outputs were served from cache.
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Payload for `executing` messages.
///
/// When `node` is `None`, execution of the prompt has completed.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    pub prompt_id: String,
}

/// Payload for `progress` messages (step-level progress within a node).
///
/// Older ComfyUI builds omit `prompt_id`; such updates cannot be
/// correlated and are ignored downstream.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    /// Current step number.
    pub value: i64,
    /// Total number of steps.
    pub max: i64,
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
}

/// Payload for `executed` messages (node output).
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    /// The node that produced this output.
    #[serde(default)]
    pub node: Option<String>,
    /// Raw output value (images, filenames, etc.).
    #[serde(default)]
    pub output: serde_json::Value,
    pub prompt_id: String,
}

impl ExecutedData {
    /// Entries of `output.images` that carry at least a filename.
    ///
    /// Malformed entries are skipped rather than failing the whole event.
    pub fn images(&self) -> Vec<OutputImage> {
        self.output
            .get("images")
            .and_then(serde_json::Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| OutputImage::deserialize(item).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One file produced by an output node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutputImage {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// `output`, `temp` or `input`.
    #[serde(rename = "type", default = "default_image_type")]
    pub kind: String,
}

fn default_image_type() -> String {
    "output".to_string()
}

/// Payload for `execution_error` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub exception_message: Option<String>,
    #[serde(default)]
    pub exception_type: Option<String>,
}

impl ErrorData {
    /// Human-readable failure reason.
    pub fn message(&self) -> &str {
        self.exception_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_EXECUTION_ERROR)
    }
}

/// Parse a ComfyUI WebSocket text message into a typed enum.
///
/// Returns `Err` for malformed JSON or unknown `type` values.
/// Callers should log unknown types and continue.
pub fn parse_message(text: &str) -> Result<ComfyUIMessage, serde_json::Error> {
    serde_json::from_str(text)
}

/// Read just the `type` tag of a raw message, if it has one.
///
/// Used to tell unrecognised message kinds (ComfyUI and its extensions
/// emit many) apart from malformed messages of a known kind.
pub fn message_type(text: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Envelope {
        #[serde(rename = "type")]
        kind: String,
    }
    serde_json::from_str::<Envelope>(text).ok().map(|e| e.kind)
}

/// Whether `kind` is one of [`KNOWN_MESSAGE_TYPES`].
pub fn is_known_type(kind: &str) -> bool {
    KNOWN_MESSAGE_TYPES.contains(&kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_message() {
        let json = r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":3}},"sid":"abc"}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            ComfyUIMessage::Status(data) => {
                assert_eq!(data.status.exec_info.queue_remaining, 3);
            }
            other => panic!("Expected Status, got {other:?}"),
        }
    }

    #[test]
    fn parse_execution_cached_without_nodes() {
        let json = r#"{"type":"execution_cached","data":{"prompt_id":"abc"}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            ComfyUIMessage::ExecutionCached(data) => {
                assert!(data.nodes.is_empty());
            }
            other => panic!("Expected ExecutionCached, got {other:?}"),
        }
    }

    #[test]
    fn parse_executing_finished() {
        let json = r#"{"type":"executing","data":{"node":null,"prompt_id":"xyz"}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            ComfyUIMessage::Executing(data) => {
                assert!(data.node.is_none());
            }
            other => panic!("Expected Executing, got {other:?}"),
        }
    }

    #[test]
    fn parse_progress_with_prompt_id() {
        let json = r#"{"type":"progress","data":{"value":5,"max":20,"prompt_id":"p1","node":"3"}}"#;
        let msg = parse_message(json).unwrap();
        assert_eq!(msg.prompt_id(), Some("p1"));
        match msg {
            ComfyUIMessage::Progress(data) => {
                assert_eq!(data.value, 5);
                assert_eq!(data.max, 20);
            }
            other => panic!("Expected Progress, got {other:?}"),
        }
    }

    #[test]
    fn parse_progress_without_prompt_id() {
        let json = r#"{"type":"progress","data":{"value":1,"max":2}}"#;
        let msg = parse_message(json).unwrap();
        assert!(msg.prompt_id().is_none());
    }

    #[test]
    fn parse_executed_without_node() {
        let json = r#"{"type":"executed","data":{"prompt_id":"p1","output":{"images":[{"filename":"a.png","subfolder":"","type":"output"}]}}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            ComfyUIMessage::Executed(data) => {
                assert!(data.node.is_none());
                assert_eq!(
                    data.images(),
                    vec![OutputImage {
                        filename: "a.png".into(),
                        subfolder: String::new(),
                        kind: "output".into(),
                    }]
                );
            }
            other => panic!("Expected Executed, got {other:?}"),
        }
    }

    #[test]
    fn executed_images_skip_malformed_entries() {
        let json = r#"{"type":"executed","data":{"node":"9","prompt_id":"p1","output":{"images":[{"subfolder":"x"},{"filename":"b.png"}],"text":["hi"]}}}"#;
        let ComfyUIMessage::Executed(data) = parse_message(json).unwrap() else {
            panic!("Expected Executed");
        };
        let images = data.images();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].filename, "b.png");
        assert_eq!(images[0].kind, "output");
    }

    #[test]
    fn executed_without_images_yields_nothing() {
        let json = r#"{"type":"executed","data":{"node":"9","prompt_id":"p1","output":{"text":["hi"]}}}"#;
        let ComfyUIMessage::Executed(data) = parse_message(json).unwrap() else {
            panic!("Expected Executed");
        };
        assert!(data.images().is_empty());
    }

    #[test]
    fn parse_execution_error_message() {
        let json = r#"{"type":"execution_error","data":{"prompt_id":"abc","node_id":"5","exception_message":"out of memory","exception_type":"RuntimeError"}}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            ComfyUIMessage::ExecutionError(data) => {
                assert_eq!(data.prompt_id, "abc");
                assert_eq!(data.node_id.as_deref(), Some("5"));
                assert_eq!(data.message(), "out of memory");
            }
            other => panic!("Expected ExecutionError, got {other:?}"),
        }
    }

    #[test]
    fn execution_error_without_message_uses_fallback() {
        let json = r#"{"type":"execution_error","data":{"prompt_id":"abc"}}"#;
        let ComfyUIMessage::ExecutionError(data) = parse_message(json).unwrap() else {
            panic!("Expected ExecutionError");
        };
        assert_eq!(data.message(), DEFAULT_EXECUTION_ERROR);
    }

    #[test]
    fn parse_unknown_type_returns_error() {
        let json = r#"{"type":"crystools.monitor","data":{}}"#;
        assert!(parse_message(json).is_err());
        assert_eq!(message_type(json).as_deref(), Some("crystools.monitor"));
        assert!(!is_known_type("crystools.monitor"));
    }

    #[test]
    fn malformed_known_type_is_detected() {
        let json = r#"{"type":"executed","data":{"output":{}}}"#;
        assert!(parse_message(json).is_err());
        assert!(is_known_type(&message_type(json).unwrap()));
    }

    #[test]
    fn parse_invalid_json_returns_error() {
        assert!(parse_message("not json at all").is_err());
        assert!(message_type("not json at all").is_none());
    }
}
