//! Creation of new untitled diagram documents.
//!
//! A new document starts as a host-created untitled file, optionally
//! renamed, then opened with the format's factory. Creation parameters
//! may carry a template reference; the seed content is fetched and
//! loaded once the opened document reports ready, replacing whatever
//! default content the editor put there.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::DocumentView;
use crate::format::FormatRegistry;
use crate::host::{
    self, command_ids, CommandExecutor, ContentService, HostError, RemoteFetcher,
};
use crate::status::StatusBroadcaster;

/// Creation parameter naming a template to seed the new document from.
pub const TEMPLATE_PARAM: &str = "template-filename";

/// Arguments for [`CreationWorkflow::create_new`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateNewArgs {
    /// Format key; the registry's default format when absent or unknown.
    pub format: Option<String>,
    /// Explicit document name (without extension).
    pub name: Option<String>,
    /// Directory the new file is created in.
    pub cwd: String,
    /// Opaque creation parameters passed through to the view. The
    /// `template-filename` entry triggers template seeding.
    pub url_params: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Error)]
pub enum CreateError {
    #[error("no format given and no default format registered")]
    NoDefaultFormat,

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Creates new untitled documents, optionally seeded from a template.
pub struct CreationWorkflow {
    registry: Arc<RwLock<FormatRegistry>>,
    status: StatusBroadcaster,
    contents: Arc<dyn ContentService>,
    commands: Arc<dyn CommandExecutor>,
    fetcher: Arc<dyn RemoteFetcher>,
}

impl CreationWorkflow {
    pub fn new(
        registry: Arc<RwLock<FormatRegistry>>,
        status: StatusBroadcaster,
        contents: Arc<dyn ContentService>,
        commands: Arc<dyn CommandExecutor>,
        fetcher: Arc<dyn RemoteFetcher>,
    ) -> Self {
        Self {
            registry,
            status,
            contents,
            commands,
            fetcher,
        }
    }

    /// Create, name, open, and optionally seed a new document.
    pub async fn create_new(&self, args: CreateNewArgs) -> Result<Arc<DocumentView>, CreateError> {
        let format = {
            let registry = self.registry.read().expect("format registry poisoned");
            args.format
                .as_deref()
                .and_then(|key| registry.get(key))
                .or_else(|| registry.default_format())
                .cloned()
                .ok_or(CreateError::NoDefaultFormat)?
        };

        self.status
            .set(format!("Creating diagram in {}...", args.cwd));

        let mut model = self
            .commands
            .execute(
                command_ids::NEW_UNTITLED,
                serde_json::json!({
                    "path": args.cwd,
                    "type": format.content_type,
                    "ext": format.ext,
                }),
            )
            .await?
            .into_model(command_ids::NEW_UNTITLED)?;

        if let Some(name) = args.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            let new_path = host::join(
                host::dirname(&model.path),
                &format!("{name}{}", format.ext),
            );
            model = self.contents.rename(&model.path, &new_path).await?;
        }

        self.status
            .set(format!("Opening diagram {}...", model.path));

        let view = self
            .commands
            .execute(
                command_ids::OPEN,
                serde_json::json!({
                    "path": model.path,
                    "factory": format.factory_name,
                }),
            )
            .await?
            .into_document(command_ids::OPEN)?;

        if let Some(params) = args.url_params {
            view.set_url_params(params.clone());

            if let Some(template_url) = params.get(TEMPLATE_PARAM).and_then(|v| v.as_str()) {
                view.ready().await;
                let seed = self.fetcher.fetch_text(template_url).await?;
                view.surface().load(&seed).await?;
                tracing::info!(path = %view.path(), template = %template_url, "template loaded");
            }
        }

        Ok(view)
    }
}
