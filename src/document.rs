//! Live document instances and their bookkeeping.
//!
//! A `DocumentView` is one open editing instance bound to a file path.
//! A `DiagramFactory` announces new instances for one format; a
//! `WidgetTracker` owns the live set for one namespace so the host can
//! restore it across restarts.

use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use crate::host::{FileModel, HostError};
use crate::signal::Signal;

/// Load/export primitives of the rendering surface behind a view.
///
/// The editor itself is out of scope; the core only needs to push
/// content in and pull representations out.
#[async_trait]
pub trait RenderSurface: Send + Sync {
    /// The document's representation in the format named by `key`, or
    /// `None` when the surface cannot produce it right now.
    async fn export_as(&self, format_key: &str) -> Result<Option<String>, HostError>;

    /// Replace the document's content, default content included.
    async fn load(&self, content: &str) -> Result<(), HostError>;
}

/// One open editing instance bound to exactly one file path.
pub struct DocumentView {
    id: Uuid,
    factory_name: String,
    path: RwLock<String>,
    icon: RwLock<Option<String>>,
    contents_model: RwLock<Option<FileModel>>,
    url_params: RwLock<Option<serde_json::Map<String, serde_json::Value>>>,
    settings: RwLock<serde_json::Value>,
    surface: Arc<dyn RenderSurface>,
    ready_tx: watch::Sender<bool>,
    /// Emitted with the new path after a rename.
    pub path_changed: Signal<String>,
    /// Emitted when the user clicks inside the editing surface.
    pub frame_clicked: Signal<()>,
}

impl DocumentView {
    pub fn new(
        path: impl Into<String>,
        factory_name: impl Into<String>,
        surface: Arc<dyn RenderSurface>,
    ) -> Arc<Self> {
        let (ready_tx, _) = watch::channel(false);
        Arc::new(Self {
            id: Uuid::new_v4(),
            factory_name: factory_name.into(),
            path: RwLock::new(path.into()),
            icon: RwLock::new(None),
            contents_model: RwLock::new(None),
            url_params: RwLock::new(None),
            settings: RwLock::new(serde_json::Value::Null),
            surface,
            ready_tx,
            path_changed: Signal::new(),
            frame_clicked: Signal::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn factory_name(&self) -> &str {
        &self.factory_name
    }

    pub fn path(&self) -> String {
        self.path.read().expect("view path poisoned").clone()
    }

    /// Rebind the view to a new path and notify observers.
    pub fn set_path(&self, path: impl Into<String>) {
        let path = path.into();
        *self.path.write().expect("view path poisoned") = path.clone();
        self.path_changed.emit(&path);
    }

    pub fn icon(&self) -> Option<String> {
        self.icon.read().expect("view icon poisoned").clone()
    }

    pub fn set_icon(&self, icon: impl Into<String>) {
        *self.icon.write().expect("view icon poisoned") = Some(icon.into());
    }

    pub fn surface(&self) -> &Arc<dyn RenderSurface> {
        &self.surface
    }

    pub fn url_params(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        self.url_params.read().expect("view params poisoned").clone()
    }

    pub fn set_url_params(&self, params: serde_json::Map<String, serde_json::Value>) {
        *self.url_params.write().expect("view params poisoned") = Some(params);
    }

    pub fn settings(&self) -> serde_json::Value {
        self.settings.read().expect("view settings poisoned").clone()
    }

    /// Take the manager's current settings snapshot.
    pub fn apply_settings(&self, settings: &serde_json::Value) {
        *self.settings.write().expect("view settings poisoned") = settings.clone();
    }

    /// The contents model reported at readiness, if any.
    pub fn contents_model(&self) -> Option<FileModel> {
        self.contents_model
            .read()
            .expect("view model poisoned")
            .clone()
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_tx.borrow()
    }

    /// Mark the view ready, recording the contents model the host
    /// loaded it from. A host that failed to produce a model passes
    /// `None`; downstream icon selection is skipped in that case.
    pub fn mark_ready(&self, model: Option<FileModel>) {
        *self.contents_model.write().expect("view model poisoned") = model;
        self.ready_tx.send_replace(true);
    }

    /// Resolve once the view has reported ready. Returns immediately if
    /// it already has.
    pub async fn ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Readiness channel for waiters that must not keep the view alive.
    /// The channel closes when the view is dropped.
    pub fn ready_watch(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }

    /// Host hook: the user clicked inside the editing surface.
    pub fn notify_frame_clicked(&self) {
        self.frame_clicked.emit(&());
    }
}

impl fmt::Debug for DocumentView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentView")
            .field("id", &self.id)
            .field("path", &self.path())
            .field("factory", &self.factory_name)
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Construction options for a [`DiagramFactory`].
#[derive(Debug, Clone)]
pub struct FactoryOptions {
    pub name: String,
    pub model_name: String,
    pub file_types: Vec<String>,
    pub default_for: Vec<String>,
}

/// Produces editing instances for one format and announces each one.
pub struct DiagramFactory {
    options: FactoryOptions,
    /// Emitted with every newly created view.
    widget_created: Signal<Arc<DocumentView>>,
}

impl DiagramFactory {
    pub fn new(options: FactoryOptions) -> Self {
        Self {
            options,
            widget_created: Signal::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn model_name(&self) -> &str {
        &self.options.model_name
    }

    pub fn file_types(&self) -> &[String] {
        &self.options.file_types
    }

    pub fn default_for(&self) -> &[String] {
        &self.options.default_for
    }

    pub fn on_widget_created(&self, slot: impl Fn(&Arc<DocumentView>) + Send + Sync + 'static) {
        self.widget_created.connect(slot);
    }

    /// Build a view for `path` and announce it.
    pub fn create_view(&self, path: &str, surface: Arc<dyn RenderSurface>) -> Arc<DocumentView> {
        let view = DocumentView::new(path, self.options.name.clone(), surface);
        tracing::debug!(path, factory = %self.options.name, "widget created");
        self.widget_created.emit(&view);
        view
    }
}

impl fmt::Debug for DiagramFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagramFactory")
            .field("name", &self.options.name)
            .field("file_types", &self.options.file_types)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("view for `{path}` is already tracked in `{namespace}`")]
    AlreadyTracked { namespace: String, path: String },
}

/// Registry of live views scoped to one format namespace.
///
/// Each view belongs to exactly one tracker for its entire lifetime.
pub struct WidgetTracker {
    namespace: String,
    views: RwLock<Vec<Arc<DocumentView>>>,
}

impl WidgetTracker {
    pub fn new(namespace: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.into(),
            views: RwLock::new(Vec::new()),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn add(&self, view: Arc<DocumentView>) -> Result<(), TrackError> {
        let mut views = self.views.write().expect("tracker poisoned");
        if views.iter().any(|v| v.id() == view.id()) {
            return Err(TrackError::AlreadyTracked {
                namespace: self.namespace.clone(),
                path: view.path(),
            });
        }
        views.push(view);
        Ok(())
    }

    /// Drop a view when the host closes it.
    pub fn remove(&self, id: Uuid) -> Option<Arc<DocumentView>> {
        let mut views = self.views.write().expect("tracker poisoned");
        let idx = views.iter().position(|v| v.id() == id)?;
        Some(views.remove(idx))
    }

    pub fn find(&self, id: Uuid) -> Option<Arc<DocumentView>> {
        self.views
            .read()
            .expect("tracker poisoned")
            .iter()
            .find(|v| v.id() == id)
            .cloned()
    }

    pub fn views(&self) -> Vec<Arc<DocumentView>> {
        self.views.read().expect("tracker poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.views.read().expect("tracker poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for WidgetTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetTracker")
            .field("namespace", &self.namespace)
            .field("views", &self.len())
            .finish()
    }
}
