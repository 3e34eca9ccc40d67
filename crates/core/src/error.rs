/// Domain errors shared by the orchestrator, the engine client and the
/// HTTP layer.
///
/// Every variant is terminal for the affected job only. The rendered
/// message is what callers see in a failed job's `error` field.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("ComfyUI unreachable: {0}")]
    EngineUnreachable(String),

    #[error("ComfyUI rejected the prompt: {0}")]
    EngineRejected(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Timed out after {secs}s waiting for generation results")]
    Timeout { secs: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a missing workflow template.
    pub fn template_not_found(name: &str) -> Self {
        Self::NotFound {
            entity: "Template",
            id: name.to_string(),
        }
    }

    /// Shorthand for an unknown job or execution identifier.
    pub fn job_not_found(id: &str) -> Self {
        Self::NotFound {
            entity: "Job",
            id: id.to_string(),
        }
    }

    /// Text recorded in a failed job's `error` field.
    ///
    /// Engine execution errors keep the engine's own wording; every other
    /// variant uses its rendered message.
    pub fn job_message(&self) -> String {
        match self {
            Self::ExecutionError(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}
