//! One-shot export of a live document to another format.
//!
//! An export converts the active document's content, computes a
//! collision-free target path under the working directory, persists the
//! result, and launches the host's best viewer for it. The job is
//! ephemeral: nothing survives the call but the written file and a
//! trail of status messages.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::PATH_RETRY_BOUND;
use crate::document::DocumentView;
use crate::format::FormatRegistry;
use crate::host::{
    self, command_ids, CommandExecutor, ContentService, DocumentTypeRegistry, FileModel,
    HostError, SavePayload,
};
use crate::status::StatusBroadcaster;

/// Produces a format's raw representation of a document.
///
/// Formats without a custom exporter fall back to [`DefaultExporter`],
/// which asks the document's surface for the representation by format
/// key. `Ok(None)` means the surface could not produce one — a
/// reported, non-fatal outcome.
#[async_trait]
pub trait DiagramExporter: Send + Sync {
    async fn export(
        &self,
        view: &Arc<DocumentView>,
        format_key: &str,
        settings: &serde_json::Value,
    ) -> Result<Option<String>, HostError>;
}

/// Asks the document surface for its representation by format key.
pub struct DefaultExporter;

#[async_trait]
impl DiagramExporter for DefaultExporter {
    async fn export(
        &self,
        view: &Arc<DocumentView>,
        format_key: &str,
        _settings: &serde_json::Value,
    ) -> Result<Option<String>, HostError> {
        view.surface().export_as(format_key).await
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unknown export format `{0}`")]
    UnknownFormat(String),

    #[error("no active diagram document to export")]
    NoActiveDocument,

    #[error("no available path for `{stem}{ext}` after {attempts} attempts")]
    PathExhaustion {
        stem: String,
        ext: String,
        attempts: usize,
    },

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Converts, persists, and launches exports of the active document.
pub struct ExportPipeline {
    registry: Arc<RwLock<FormatRegistry>>,
    status: StatusBroadcaster,
    contents: Arc<dyn ContentService>,
    commands: Arc<dyn CommandExecutor>,
    doc_types: Arc<dyn DocumentTypeRegistry>,
}

impl ExportPipeline {
    pub fn new(
        registry: Arc<RwLock<FormatRegistry>>,
        status: StatusBroadcaster,
        contents: Arc<dyn ContentService>,
        commands: Arc<dyn CommandExecutor>,
        doc_types: Arc<dyn DocumentTypeRegistry>,
    ) -> Self {
        Self {
            registry,
            status,
            contents,
            commands,
            doc_types,
        }
    }

    /// Export `view` to the format named `format_key`, writing under `cwd`.
    ///
    /// Returns the written file's model, or `Ok(None)` when the
    /// exporter produced nothing — the failure is reported through the
    /// status line and no file is written.
    pub async fn export(
        &self,
        format_key: &str,
        view: &Arc<DocumentView>,
        cwd: &str,
        settings: &serde_json::Value,
    ) -> Result<Option<FileModel>, ExportError> {
        let format = self
            .registry
            .read()
            .expect("format registry poisoned")
            .get(format_key)
            .cloned()
            .ok_or_else(|| ExportError::UnknownFormat(format_key.to_string()))?;

        let stem = self.derive_stem(&view.path());
        let label = &format.label;

        self.status
            .set(format!("Exporting {stem} to {label}..."));

        let exporter: Arc<dyn DiagramExporter> = format
            .exporter
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultExporter));
        let raw = exporter.export(view, &format.key, settings).await?;

        let Some(raw) = raw else {
            tracing::warn!(key = %format.key, path = %view.path(), "exporter produced nothing");
            self.status
                .set(format!("Failed to export {stem} to {label}, please retry"));
            return Ok(None);
        };

        self.status.set(format!("{stem} ready, saving..."));

        let new_path = find_available_path(
            self.contents.as_ref(),
            cwd,
            &stem,
            &format.ext,
            PATH_RETRY_BOUND,
        )
        .await?;

        let serialized = match &format.serializer {
            Some(serialize) => serialize(&raw),
            None => raw,
        };

        let model = self
            .contents
            .save(
                &new_path,
                SavePayload {
                    content_type: format.content_type.clone(),
                    format: format.content_kind.as_str().to_string(),
                    mimetype: format.mimetype.clone(),
                    content: serialized,
                },
            )
            .await?;

        let file_name = host::basename(&new_path).to_string();
        self.status
            .set(format!("{stem} {label} saved as {file_name}, launching..."));

        self.launch(&model.path).await;

        self.status.set(format!("{file_name} launched"));
        Ok(Some(model))
    }

    /// Open the written file with the host's best viewer, if any.
    /// No viewer is not an error; a failing viewer only logs.
    async fn launch(&self, path: &str) {
        let factories = self.doc_types.preferred_factories_for(path);
        let Some(factory) = factories.first() else {
            tracing::debug!(path, "no viewer registered for exported file");
            return;
        };

        let args = serde_json::json!({ "path": path, "factory": factory });
        if let Err(error) = self.commands.execute(command_ids::OPEN, args).await {
            tracing::warn!(path, factory = %factory, %error, "failed to launch exported file");
        }
    }

    /// Base filename with the source extension — and any chained
    /// secondary extension — stripped.
    fn derive_stem(&self, path: &str) -> String {
        let registry = self.registry.read().expect("format registry poisoned");
        let extensions = registry.extensions();

        let mut stem = host::basename(path).to_string();
        loop {
            let stripped = extensions
                .iter()
                .find(|ext| stem.len() > ext.len() && stem.ends_with(ext.as_str()))
                .map(|ext| stem[..stem.len() - ext.len()].to_string());
            match stripped {
                Some(shorter) => stem = shorter,
                None => break,
            }
        }
        stem
    }
}

/// Find an available sibling filename under `cwd`.
///
/// Candidate 0 is `stem + ext`; candidate i ≥ 1 is `stem-NN.ext` with
/// `NN = i - 1` zero-padded to two digits. Each candidate costs one
/// metadata probe against the content service; the first path that does
/// not exist is returned. Concurrent callers can race on the same
/// candidate — storage write order decides, nothing here locks.
pub(crate) async fn find_available_path(
    contents: &dyn ContentService,
    cwd: &str,
    stem: &str,
    ext: &str,
    retries: usize,
) -> Result<String, ExportError> {
    for attempt in 0..retries {
        let file_name = if attempt == 0 {
            format!("{stem}{ext}")
        } else {
            format!("{stem}-{:02}{ext}", attempt - 1)
        };
        let candidate = host::join(cwd, &file_name);

        match contents.get_metadata(&candidate).await {
            Ok(_) => {
                tracing::debug!(path = %candidate, "path not available");
            }
            Err(error) if error.is_not_found() => return Ok(candidate),
            Err(error) => return Err(ExportError::Host(error)),
        }
    }

    Err(ExportError::PathExhaustion {
        stem: stem.to_string(),
        ext: ext.to_string(),
        attempts: retries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ContentKind, FormatDescriptor};
    use crate::host::memory::{MemoryContents, MemoryDocTypes, MemoryExecutor, ScriptedSurface};

    fn registry_with_formats() -> Arc<RwLock<FormatRegistry>> {
        let mut registry = FormatRegistry::new();
        registry
            .register(
                FormatDescriptor::new("dio", "Diagram", ".dio", "application/dio+xml")
                    .default_format(),
            )
            .unwrap();
        registry
            .register(
                FormatDescriptor::new("diosvg", "SVG", ".dio.svg", "image/svg+xml").export(),
            )
            .unwrap();
        Arc::new(RwLock::new(registry))
    }

    fn pipeline(
        registry: Arc<RwLock<FormatRegistry>>,
        contents: Arc<MemoryContents>,
    ) -> (ExportPipeline, StatusBroadcaster, Arc<MemoryDocTypes>) {
        let status = StatusBroadcaster::new();
        let doc_types = MemoryDocTypes::new();
        let executor = MemoryExecutor::new(contents.clone(), doc_types.clone());
        let pipeline = ExportPipeline::new(
            registry,
            status.clone(),
            contents,
            executor,
            doc_types.clone(),
        );
        (pipeline, status, doc_types)
    }

    fn view_with_export(path: &str, key: &str, content: &str) -> Arc<DocumentView> {
        let surface = ScriptedSurface::new();
        surface.set_export(key, content);
        DocumentView::new(path, "Diagram", surface)
    }

    #[tokio::test]
    async fn first_candidate_is_stem_plus_ext() {
        let contents = MemoryContents::new();
        let path = find_available_path(contents.as_ref(), "work", "Untitled", ".dio", 99)
            .await
            .unwrap();
        assert_eq!(path, "work/Untitled.dio");
    }

    #[tokio::test]
    async fn taken_paths_roll_to_numbered_siblings() {
        let contents = MemoryContents::new();
        contents.insert("work/Untitled.dio", "x");

        let path = find_available_path(contents.as_ref(), "work", "Untitled", ".dio", 99)
            .await
            .unwrap();
        assert_eq!(path, "work/Untitled-00.dio");

        contents.insert("work/Untitled-00.dio", "x");
        let path = find_available_path(contents.as_ref(), "work", "Untitled", ".dio", 99)
            .await
            .unwrap();
        assert_eq!(path, "work/Untitled-01.dio");
    }

    #[tokio::test]
    async fn exhausted_candidates_fail() {
        let contents = MemoryContents::new();
        contents.insert("work/Untitled.dio", "x");
        for i in 0..98 {
            contents.insert(&format!("work/Untitled-{i:02}.dio"), "x");
        }

        let err = find_available_path(contents.as_ref(), "work", "Untitled", ".dio", 99)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::PathExhaustion { attempts: 99, .. }));
    }

    #[tokio::test]
    async fn export_writes_converted_content() {
        let registry = registry_with_formats();
        let contents = MemoryContents::new();
        let (pipeline, status, _) = pipeline(registry, contents.clone());

        let view = view_with_export("work/flow.dio", "diosvg", "<svg/>");
        let settings = serde_json::Value::Null;

        let model = pipeline
            .export("diosvg", &view, "work", &settings)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(model.path, "work/flow.dio.svg");
        let written = contents.read("work/flow.dio.svg").unwrap();
        assert_eq!(written.content.as_deref(), Some("<svg/>"));
        assert_eq!(written.mimetype.as_deref(), Some("image/svg+xml"));
        assert_eq!(status.current(), "flow.dio.svg launched");
    }

    #[tokio::test]
    async fn export_strips_chained_extensions_from_stem() {
        let registry = registry_with_formats();
        let contents = MemoryContents::new();
        let (pipeline, _, _) = pipeline(registry, contents.clone());

        // Exporting an already-exported file must not stack extensions.
        let view = view_with_export("work/flow.dio.svg", "diosvg", "<svg/>");
        let model = pipeline
            .export("diosvg", &view, "work", &serde_json::Value::Null)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(model.path, "work/flow.dio.svg");
    }

    #[tokio::test]
    async fn null_exporter_result_reports_and_writes_nothing() {
        let registry = registry_with_formats();
        let contents = MemoryContents::new();
        let (pipeline, status, _) = pipeline(registry, contents.clone());

        // Surface with no scripted representation: export_as returns None.
        let view = DocumentView::new("work/flow.dio", "Diagram", ScriptedSurface::new());

        let outcome = pipeline
            .export("diosvg", &view, "work", &serde_json::Value::Null)
            .await
            .unwrap();

        assert!(outcome.is_none());
        assert_eq!(contents.len(), 0);
        let message = status.current();
        assert!(message.contains("flow"), "status was: {message}");
        assert!(message.contains("Failed"), "status was: {message}");
    }

    #[tokio::test]
    async fn unknown_format_is_an_error() {
        let registry = registry_with_formats();
        let contents = MemoryContents::new();
        let (pipeline, _, _) = pipeline(registry, contents);

        let view = view_with_export("work/flow.dio", "diosvg", "<svg/>");
        let err = pipeline
            .export("nope", &view, "work", &serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::UnknownFormat(key) if key == "nope"));
    }

    #[tokio::test]
    async fn custom_serializer_shapes_persisted_content() {
        let mut registry = FormatRegistry::new();
        registry
            .register(
                FormatDescriptor::new("dio", "Diagram", ".dio", "application/dio+xml")
                    .default_format(),
            )
            .unwrap();
        registry
            .register(
                FormatDescriptor::new("diopng", "PNG", ".dio.png", "image/png")
                    .export()
                    .with_content_kind(ContentKind::Base64)
                    .with_serializer(|raw| {
                        raw.split_once(',').map(|(_, b)| b.to_string()).unwrap_or_else(|| raw.to_string())
                    }),
            )
            .unwrap();
        let registry = Arc::new(RwLock::new(registry));

        let contents = MemoryContents::new();
        let (pipeline, _, _) = pipeline(registry, contents.clone());

        let view = view_with_export("work/flow.dio", "diopng", "data:image/png;base64,QUJD");
        pipeline
            .export("diopng", &view, "work", &serde_json::Value::Null)
            .await
            .unwrap()
            .unwrap();

        let written = contents.read("work/flow.dio.png").unwrap();
        assert_eq!(written.content.as_deref(), Some("QUJD"));
        assert_eq!(written.format.as_deref(), Some("base64"));
    }

    #[tokio::test]
    async fn export_launches_preferred_viewer() {
        let registry = registry_with_formats();
        let contents = MemoryContents::new();
        let status = StatusBroadcaster::new();
        let doc_types = MemoryDocTypes::new();
        let executor = MemoryExecutor::new(contents.clone(), doc_types.clone());

        // A viewer claims .svg files.
        doc_types.add_file_type(crate::host::FileTypeSpec {
            name: "svg-viewer".to_string(),
            content_type: "file".to_string(),
            display_name: "SVG Viewer".to_string(),
            mimetypes: vec!["image/svg+xml".to_string()],
            extensions: vec![".svg".to_string()],
            icon: None,
            file_format: "text".to_string(),
            pattern: None,
        });
        doc_types.add_widget_factory(Arc::new(crate::document::DiagramFactory::new(
            crate::document::FactoryOptions {
                name: "SVG Viewer".to_string(),
                model_name: "text".to_string(),
                file_types: vec!["svg-viewer".to_string()],
                default_for: vec![],
            },
        )));

        let pipeline = ExportPipeline::new(
            registry,
            status,
            contents,
            executor.clone(),
            doc_types,
        );

        let view = view_with_export("work/flow.dio", "diosvg", "<svg/>");
        pipeline
            .export("diosvg", &view, "work", &serde_json::Value::Null)
            .await
            .unwrap()
            .unwrap();

        let opened = executor.opened();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].0, "work/flow.dio.svg");
        assert_eq!(opened[0].1, "SVG Viewer");
    }
}
