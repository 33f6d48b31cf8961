//! The diagram manager facade.
//!
//! One object composes the format registry, template catalog, status
//! line, lifecycle coordinator, export pipeline, and creation workflow
//! behind the public contract, and owns the cross-cutting state:
//! active-view lookup and settings propagation.

use std::sync::{Arc, RwLock};

use thiserror::Error;
use uuid::Uuid;

use crate::create::{CreateError, CreateNewArgs, CreationWorkflow};
use crate::document::{DocumentView, WidgetTracker};
use crate::export::{ExportError, ExportPipeline};
use crate::format::{FormatDescriptor, FormatRegistry, RegistryError};
use crate::host::{FileModel, HostContext};
use crate::lifecycle::{DocumentLifecycleCoordinator, MountError};
use crate::status::StatusBroadcaster;
use crate::template::{TemplateCatalog, TemplateRecord};

/// Failures while registering a format. Both variants are configuration
/// errors: the registration is aborted, already-registered formats are
/// untouched.
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error(transparent)]
    Format(#[from] RegistryError),

    #[error(transparent)]
    Mount(#[from] MountError),
}

/// The default manager of diagram concerns.
pub struct DiagramManager {
    host: HostContext,
    registry: Arc<RwLock<FormatRegistry>>,
    status: StatusBroadcaster,
    templates: TemplateCatalog,
    lifecycle: DocumentLifecycleCoordinator,
    export: ExportPipeline,
    create: CreationWorkflow,
    settings: RwLock<serde_json::Value>,
}

impl DiagramManager {
    /// Wire a manager against the host's collaborator set.
    ///
    /// `template_base_url` is where the template manifest and its
    /// entries live; call [`init_templates`](Self::init_templates) to
    /// populate the catalog from it.
    pub fn new(host: HostContext, template_base_url: impl Into<String>) -> Self {
        let registry = Arc::new(RwLock::new(FormatRegistry::new()));
        let status = StatusBroadcaster::new();
        let templates = TemplateCatalog::new(template_base_url, host.fetcher.clone());
        let lifecycle = DocumentLifecycleCoordinator::new(
            registry.clone(),
            status.clone(),
            host.doc_types.clone(),
            host.restorer.clone(),
            host.shell.clone(),
        );
        let export = ExportPipeline::new(
            registry.clone(),
            status.clone(),
            host.contents.clone(),
            host.commands.clone(),
            host.doc_types.clone(),
        );
        let create = CreationWorkflow::new(
            registry.clone(),
            status.clone(),
            host.contents.clone(),
            host.commands.clone(),
            host.fetcher.clone(),
        );

        Self {
            host,
            registry,
            status,
            templates,
            lifecycle,
            export,
            create,
            settings: RwLock::new(serde_json::Value::Null),
        }
    }

    // ── Formats ─────────────────────────────────────────────

    /// Register a format: registry entry, host file type, factory and
    /// tracker. Duplicate keys and duplicate namespaces abort the
    /// registration.
    pub async fn register_format(&self, format: FormatDescriptor) -> Result<(), RegisterError> {
        self.registry
            .write()
            .expect("format registry poisoned")
            .register(format.clone())?;

        self.host.doc_types.add_file_type(format.file_type_spec());
        self.lifecycle.mount(&format).await?;
        Ok(())
    }

    pub fn formats(&self) -> Vec<FormatDescriptor> {
        self.registry
            .read()
            .expect("format registry poisoned")
            .list()
            .to_vec()
    }

    pub fn resolve_format_for_path(&self, path: &str) -> Option<FormatDescriptor> {
        self.registry
            .read()
            .expect("format registry poisoned")
            .resolve_for_path(path)
            .cloned()
    }

    pub fn resolve_format_for_model(&self, model: &FileModel) -> Option<FormatDescriptor> {
        self.registry
            .read()
            .expect("format registry poisoned")
            .resolve_for_model(model)
            .cloned()
    }

    // ── Documents ───────────────────────────────────────────

    /// Create a new untitled document. An empty `cwd` defaults to the
    /// shell's active directory.
    pub async fn create_new(
        &self,
        mut args: CreateNewArgs,
    ) -> Result<Arc<DocumentView>, CreateError> {
        if args.cwd.is_empty() {
            args.cwd = self.host.shell.active_directory();
        }
        self.create.create_new(args).await
    }

    /// Export the active document to the format named `format_key`,
    /// writing into the shell's active directory.
    pub async fn export(&self, format_key: &str) -> Result<Option<FileModel>, ExportError> {
        let view = self
            .active_document_view()
            .ok_or(ExportError::NoActiveDocument)?;
        let cwd = self.host.shell.active_directory();
        let settings = self.settings();
        self.export.export(format_key, &view, &cwd, &settings).await
    }

    /// The tracked view currently focused in the shell, if any.
    pub fn active_document_view(&self) -> Option<Arc<DocumentView>> {
        let id = self.host.shell.current_widget()?;
        self.lifecycle.find_view(id)
    }

    pub fn tracker(&self, namespace: &str) -> Option<Arc<WidgetTracker>> {
        self.lifecycle.tracker(namespace)
    }

    /// Untrack a view the host has closed.
    pub fn release_view(&self, id: Uuid) -> Option<Arc<DocumentView>> {
        self.lifecycle.release_view(id)
    }

    // ── Templates ───────────────────────────────────────────

    /// Populate the catalog from the remote manifest. Best effort.
    pub async fn init_templates(&self) {
        self.templates.refresh().await;
    }

    pub fn list_templates(&self) -> Vec<TemplateRecord> {
        self.templates.list()
    }

    pub fn add_templates(&self, records: Vec<TemplateRecord>) {
        self.templates.add(records);
    }

    pub fn on_templates_changed(&self, slot: impl Fn(&()) + Send + Sync + 'static) {
        self.templates.on_changed(slot);
    }

    // ── Status & settings ───────────────────────────────────

    pub fn status(&self) -> &StatusBroadcaster {
        &self.status
    }

    pub fn current_status(&self) -> String {
        self.status.current()
    }

    pub fn set_status(&self, message: impl Into<String>) {
        self.status.set(message);
    }

    pub fn settings(&self) -> serde_json::Value {
        self.settings.read().expect("settings poisoned").clone()
    }

    /// Store new settings and push them into every open view.
    pub fn update_settings(&self, settings: serde_json::Value) {
        *self.settings.write().expect("settings poisoned") = settings.clone();
        self.status.set("settings changed");
        for view in self.lifecycle.all_views() {
            view.apply_settings(&settings);
        }
    }
}

impl std::fmt::Debug for DiagramManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagramManager")
            .field("formats", &self.formats().len())
            .field("status", &self.current_status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RenderSurface;
    use crate::format::ContentKind;
    use crate::formats;
    use crate::host::memory::{MemoryHost, ScriptedSurface};

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    async fn manager_with_stock_formats(host: &MemoryHost) -> DiagramManager {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();

        let manager = DiagramManager::new(host.context(), "https://templates.example");
        for format in formats::all() {
            manager.register_format(format).await.unwrap();
        }
        manager
    }

    #[tokio::test]
    async fn register_format_rejects_duplicate_keys() {
        let host = MemoryHost::new("work");
        let manager = manager_with_stock_formats(&host).await;

        let err = manager.register_format(formats::xml_native()).await.unwrap_err();
        assert!(matches!(err, RegisterError::Format(RegistryError::DuplicateFormat(_))));
        assert_eq!(manager.formats().len(), 3);
    }

    #[tokio::test]
    async fn registration_publishes_the_file_type() {
        let host = MemoryHost::new("work");
        let _manager = manager_with_stock_formats(&host).await;

        let names: Vec<String> = host.doc_types.file_types().iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["dio", "diosvg", "diopng"]);
        assert!(host.doc_types.find_factory("Diagram").is_some());
    }

    #[tokio::test]
    async fn create_then_export_round_trip() {
        let host = MemoryHost::new("work");
        let manager = manager_with_stock_formats(&host).await;

        let surface = ScriptedSurface::new();
        surface.set_export("diosvg", "<svg/>");
        {
            let surface = surface.clone();
            host.executor
                .set_surface_factory(move || surface.clone() as Arc<dyn RenderSurface>);
        }

        // Empty cwd falls back to the shell's active directory.
        let view = manager.create_new(CreateNewArgs::default()).await.unwrap();
        assert_eq!(view.path(), "work/untitled.dio");

        host.shell.set_current(Some(view.id()));
        let model = manager.export("diosvg").await.unwrap().unwrap();

        assert_eq!(model.path, "work/untitled.dio.svg");
        let written = host.contents.read("work/untitled.dio.svg").unwrap();
        assert_eq!(written.content.as_deref(), Some("<svg/>"));
    }

    #[tokio::test]
    async fn export_without_active_view_fails() {
        let host = MemoryHost::new("work");
        let manager = manager_with_stock_formats(&host).await;

        let err = manager.export("diosvg").await.unwrap_err();
        assert!(matches!(err, ExportError::NoActiveDocument));
    }

    #[tokio::test]
    async fn active_view_is_resolved_through_trackers() {
        let host = MemoryHost::new("work");
        let manager = manager_with_stock_formats(&host).await;

        let view = manager.create_new(CreateNewArgs::default()).await.unwrap();
        assert!(manager.active_document_view().is_none());

        host.shell.set_current(Some(view.id()));
        assert_eq!(manager.active_document_view().unwrap().id(), view.id());

        // A focused widget the manager does not track is not "active".
        host.shell.set_current(Some(Uuid::new_v4()));
        assert!(manager.active_document_view().is_none());
    }

    #[tokio::test]
    async fn released_views_stop_being_tracked() {
        let host = MemoryHost::new("work");
        let manager = manager_with_stock_formats(&host).await;

        let view = manager.create_new(CreateNewArgs::default()).await.unwrap();
        let tracker = manager.tracker("diagram-dio").unwrap();
        assert_eq!(tracker.len(), 1);

        manager.release_view(view.id());
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn settings_updates_reach_every_open_view() {
        let host = MemoryHost::new("work");
        let manager = manager_with_stock_formats(&host).await;
        let view = manager.create_new(CreateNewArgs::default()).await.unwrap();
        // Drain the view's ready continuation before touching status.
        settle().await;

        let settings = serde_json::json!({ "grid": false });
        manager.update_settings(settings.clone());

        assert_eq!(view.settings(), settings);
        assert_eq!(manager.current_status(), "settings changed");
    }

    #[tokio::test]
    async fn templates_flow_through_the_facade() {
        let host = MemoryHost::new("work");
        host.fetcher.insert(
            "https://templates.example/index.xml",
            r#"<templates><template url="shapes/basic_flow.xml"/></templates>"#,
        );
        let manager = manager_with_stock_formats(&host).await;

        use std::sync::atomic::{AtomicUsize, Ordering};
        let notified = Arc::new(AtomicUsize::new(0));
        {
            let notified = notified.clone();
            manager.on_templates_changed(move |_| {
                notified.fetch_add(1, Ordering::SeqCst);
            });
        }

        manager.init_templates().await;
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        let records = manager.list_templates();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].label, "flow");
    }

    #[tokio::test]
    async fn export_format_resolution_matches_longest_extension() {
        let host = MemoryHost::new("work");
        let manager = manager_with_stock_formats(&host).await;

        assert_eq!(manager.resolve_format_for_path("a.dio").unwrap().key, "dio");
        assert_eq!(
            manager.resolve_format_for_path("a.dio.svg").unwrap().key,
            "diosvg"
        );
        assert_eq!(
            manager
                .resolve_format_for_path("a.dio.png")
                .unwrap()
                .content_kind,
            ContentKind::Base64
        );
    }
}
