//! External collaborator contracts.
//!
//! The core never talks to storage, commands, the shell, or the network
//! directly; it goes through the traits here. The host application
//! provides real implementations; this crate ships reference adapters
//! (`http`, `local`, `memory`) so the core is exercisable end-to-end
//! without a host.

pub mod http;
pub mod local;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::{DiagramFactory, DocumentView, WidgetTracker};

/// Command identifiers the core dispatches to the host executor.
pub mod command_ids {
    /// Create an untitled file in a directory. Args: `{path, type, ext}`.
    pub const NEW_UNTITLED: &str = "documents:new-untitled";
    /// Open a file with a named widget factory. Args: `{path, factory}`.
    pub const OPEN: &str = "documents:open";
}

// ══════════════════════════════════════════════════════════════
// Data carried across the boundary
// ══════════════════════════════════════════════════════════════

/// A file as the host's content service describes it.
///
/// `content` is populated only when a call asked for it; existence
/// probes carry metadata alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileModel {
    pub path: String,
    pub name: String,
    pub content_type: String,
    pub mimetype: Option<String>,
    pub format: Option<String>,
    pub content: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl FileModel {
    /// A metadata-only model for `path`, name derived from the basename.
    pub fn stub(path: impl Into<String>) -> Self {
        let path = path.into();
        let name = crate::host::basename(&path).to_string();
        Self {
            path,
            name,
            content_type: "file".to_string(),
            mimetype: None,
            format: None,
            content: None,
            last_modified: None,
        }
    }
}

/// Everything `ContentService::save` needs to persist one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavePayload {
    pub content_type: String,
    /// Content representation: `"text"` or `"base64"`.
    pub format: String,
    pub mimetype: String,
    pub content: String,
}

/// What a host command produced.
///
/// Command results are heterogeneous: file creation yields a model,
/// opening yields a live view, most commands yield nothing.
pub enum CommandOutcome {
    None,
    Model(FileModel),
    Document(Arc<DocumentView>),
}

impl CommandOutcome {
    pub fn into_model(self, command: &str) -> Result<FileModel, HostError> {
        match self {
            Self::Model(model) => Ok(model),
            _ => Err(HostError::UnexpectedOutcome {
                command: command.to_string(),
            }),
        }
    }

    pub fn into_document(self, command: &str) -> Result<Arc<DocumentView>, HostError> {
        match self {
            Self::Document(view) => Ok(view),
            _ => Err(HostError::UnexpectedOutcome {
                command: command.to_string(),
            }),
        }
    }
}

impl std::fmt::Debug for CommandOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "CommandOutcome::None"),
            Self::Model(m) => write!(f, "CommandOutcome::Model({})", m.path),
            Self::Document(d) => write!(f, "CommandOutcome::Document({})", d.path()),
        }
    }
}

/// File-type registration passed to the host's document registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTypeSpec {
    pub name: String,
    pub content_type: String,
    pub display_name: String,
    pub mimetypes: Vec<String>,
    pub extensions: Vec<String>,
    pub icon: Option<String>,
    /// Content representation: `"text"` or `"base64"`.
    pub file_format: String,
    /// Optional path-matching regex for files the extension misses.
    pub pattern: Option<String>,
}

/// How to rebuild a tracker's views after a process restart.
pub struct RestoreSpec {
    /// Command the restorer replays to reopen one view.
    pub command: String,
    /// Arguments for the reopen command, derived from a live view.
    pub args: Box<dyn Fn(&DocumentView) -> serde_json::Value + Send + Sync>,
    /// Stable per-view name the restorer keys its records by.
    pub name: Box<dyn Fn(&DocumentView) -> String + Send + Sync>,
}

// ══════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════

/// Failures at the collaborator boundary.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("command `{command}` returned an unexpected result")]
    UnexpectedOutcome { command: String },

    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("restoration failed: {0}")]
    Restore(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// True when the error means "the path does not exist" — the
    /// signal the export path probe looks for.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// ══════════════════════════════════════════════════════════════
// Collaborator traits
// ══════════════════════════════════════════════════════════════

/// The host's file storage, addressed by path.
#[async_trait]
pub trait ContentService: Send + Sync {
    /// Create an untitled file of `content_type` with `ext` under `cwd`.
    async fn create_untitled(
        &self,
        cwd: &str,
        content_type: &str,
        ext: &str,
    ) -> Result<FileModel, HostError>;

    async fn rename(&self, old_path: &str, new_path: &str) -> Result<FileModel, HostError>;

    async fn save(&self, path: &str, payload: SavePayload) -> Result<FileModel, HostError>;

    /// Metadata-only lookup. `Err(NotFound)` when the path is free.
    async fn get_metadata(&self, path: &str) -> Result<FileModel, HostError>;
}

/// The host's command system, keyed by string identifiers.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(
        &self,
        command: &str,
        args: serde_json::Value,
    ) -> Result<CommandOutcome, HostError>;
}

/// The host's registry of file types and widget factories.
pub trait DocumentTypeRegistry: Send + Sync {
    fn add_file_type(&self, spec: FileTypeSpec);

    fn add_widget_factory(&self, factory: Arc<DiagramFactory>);

    /// Factory names able to open `path`, best first. Empty when the
    /// host knows no viewer for the path.
    fn preferred_factories_for(&self, path: &str) -> Vec<String>;
}

/// The host's layout restoration mechanism.
#[async_trait]
pub trait RestorationService: Send + Sync {
    /// Arrange for the tracker's views to be reopened on next startup.
    async fn restore(
        &self,
        tracker: Arc<WidgetTracker>,
        spec: RestoreSpec,
    ) -> Result<(), HostError>;

    /// Update the stored restoration record for one view.
    async fn persist(
        &self,
        namespace: &str,
        name: &str,
        args: serde_json::Value,
    ) -> Result<(), HostError>;
}

/// The host's top-level shell: widget activation and focus.
pub trait WorkbenchShell: Send + Sync {
    fn activate(&self, widget_id: uuid::Uuid);

    /// The widget currently holding focus, if any.
    fn current_widget(&self) -> Option<uuid::Uuid>;

    /// The directory new and exported files land in.
    fn active_directory(&self) -> String;
}

/// Best-effort text fetch, used for the template manifest and for
/// template seed content.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, HostError>;
}

/// Every collaborator handle the manager needs, bundled.
#[derive(Clone)]
pub struct HostContext {
    pub contents: Arc<dyn ContentService>,
    pub commands: Arc<dyn CommandExecutor>,
    pub doc_types: Arc<dyn DocumentTypeRegistry>,
    pub restorer: Arc<dyn RestorationService>,
    pub shell: Arc<dyn WorkbenchShell>,
    pub fetcher: Arc<dyn RemoteFetcher>,
}

impl std::fmt::Debug for HostContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HostContext { .. }")
    }
}

// ══════════════════════════════════════════════════════════════
// Path helpers
// ══════════════════════════════════════════════════════════════

/// Last path segment, or the whole path when there is no separator.
pub(crate) fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Everything before the last separator; empty for bare names.
pub(crate) fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Join two segments with exactly one `/`, tolerating either side
/// carrying its own.
pub(crate) fn join(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_and_dirname() {
        assert_eq!(basename("a/b/c.dio"), "c.dio");
        assert_eq!(basename("c.dio"), "c.dio");
        assert_eq!(dirname("a/b/c.dio"), "a/b");
        assert_eq!(dirname("c.dio"), "");
    }

    #[test]
    fn join_normalizes_separators() {
        assert_eq!(join("a/b", "c.dio"), "a/b/c.dio");
        assert_eq!(join("a/b/", "/c.dio"), "a/b/c.dio");
        assert_eq!(join("", "c.dio"), "c.dio");
    }

    #[test]
    fn stub_model_derives_name() {
        let model = FileModel::stub("work/diagrams/flow.dio");
        assert_eq!(model.name, "flow.dio");
        assert_eq!(model.content_type, "file");
        assert!(model.content.is_none());
    }

    #[test]
    fn not_found_is_distinguishable() {
        assert!(HostError::NotFound("x".into()).is_not_found());
        assert!(!HostError::Restore("x".into()).is_not_found());
    }
}
