//! Workflow template store.
//!
//! Templates live on disk as one directory per app:
//!
//! ```text
//! <root>/<app_id>/template.json   ComfyUI graph in API format (required)
//! <root>/<app_id>/meta.json       {"params_map": {...}}      (optional)
//! ```
//!
//! Files are read fresh on every call so edits take effect without a
//! restart.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::CoreError;
use crate::workflow::{parse_params_map, ParamsMap, Template, WorkflowGraph};

/// File name of the graph document inside a template directory.
pub const TEMPLATE_FILE: &str = "template.json";

/// File name of the optional metadata document.
pub const META_FILE: &str = "meta.json";

/// UTF-8 byte-order mark some editors prepend to JSON files.
const BOM: char = '\u{feff}';

/// Source of named workflow templates.
#[async_trait::async_trait]
pub trait TemplateStore: Send + Sync {
    /// Load a template graph and its parameter mapping.
    async fn load(&self, app_id: &str) -> Result<Template, CoreError>;

    /// Whether a template graph exists under this name.
    async fn exists(&self, app_id: &str) -> Result<bool, CoreError>;

    /// All template names, sorted.
    async fn list(&self) -> Result<Vec<String>, CoreError>;
}

/// Filesystem-backed [`TemplateStore`].
#[derive(Debug, Clone)]
pub struct FsTemplateStore {
    root: PathBuf,
}

impl FsTemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn template_dir(&self, app_id: &str) -> Result<PathBuf, CoreError> {
        validate_app_id(app_id)?;
        Ok(self.root.join(app_id))
    }
}

#[async_trait::async_trait]
impl TemplateStore for FsTemplateStore {
    async fn load(&self, app_id: &str) -> Result<Template, CoreError> {
        let dir = self.template_dir(app_id)?;

        let graph_text = match tokio::fs::read_to_string(dir.join(TEMPLATE_FILE)).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CoreError::template_not_found(app_id));
            }
            Err(e) => {
                return Err(CoreError::Internal(format!(
                    "failed to read template {app_id}: {e}"
                )));
            }
        };
        let graph = WorkflowGraph::from_value(parse_json(&graph_text, app_id, TEMPLATE_FILE)?)?;

        let params_map = match tokio::fs::read_to_string(dir.join(META_FILE)).await {
            Ok(text) => {
                let meta = parse_json(&text, app_id, META_FILE)?;
                meta.get("params_map")
                    .map(parse_params_map)
                    .unwrap_or_default()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ParamsMap::new(),
            Err(e) => {
                return Err(CoreError::Internal(format!(
                    "failed to read metadata for {app_id}: {e}"
                )));
            }
        };

        tracing::debug!(
            app_id,
            nodes = graph.len(),
            params = params_map.len(),
            "Loaded workflow template",
        );

        Ok(Template { graph, params_map })
    }

    async fn exists(&self, app_id: &str) -> Result<bool, CoreError> {
        let path = self.template_dir(app_id)?.join(TEMPLATE_FILE);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| CoreError::Internal(format!("failed to stat {}: {e}", path.display())))
    }

    async fn list(&self) -> Result<Vec<String>, CoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(CoreError::Internal(format!(
                    "failed to list {}: {e}",
                    self.root.display()
                )));
            }
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if let (true, Some(name)) = (is_dir, entry.file_name().to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Reject names that could escape the template root.
pub fn validate_app_id(app_id: &str) -> Result<(), CoreError> {
    let invalid = app_id.is_empty()
        || app_id == "."
        || app_id == ".."
        || app_id.contains(['/', '\\', '\0']);
    if invalid {
        return Err(CoreError::InvalidInput(format!(
            "invalid template name: {app_id:?}"
        )));
    }
    Ok(())
}

/// Parse JSON text, tolerating a leading byte-order mark.
fn parse_json(text: &str, app_id: &str, file: &str) -> Result<Value, CoreError> {
    serde_json::from_str(text.trim_start_matches(BOM)).map_err(|e| {
        CoreError::InvalidInput(format!("malformed {file} for template {app_id}: {e}"))
    })
}
