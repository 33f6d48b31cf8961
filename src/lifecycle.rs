//! Per-format document lifecycle wiring.
//!
//! Mounting a format builds its widget factory and instance tracker,
//! hooks the factory into the host's document-type registry, asks the
//! restorer to reopen the format's views from the previous session, and
//! wires every newly created view: status, focus, icons, restoration
//! snapshots, tracking. One tracker per namespace — ever.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::config::{DEFAULT_ICON, NAMESPACE_PREFIX, STATUS_REVERT};
use crate::document::{DiagramFactory, DocumentView, FactoryOptions, WidgetTracker};
use crate::format::{FormatDescriptor, FormatRegistry};
use crate::host::{
    command_ids, DocumentTypeRegistry, RestorationService, RestoreSpec, WorkbenchShell,
};
use crate::status::StatusBroadcaster;

#[derive(Debug, Error)]
pub enum MountError {
    #[error("widget tracker namespace `{0}` already exists")]
    DuplicateNamespace(String),
}

/// Creates and wires one factory + tracker pair per format.
pub struct DocumentLifecycleCoordinator {
    registry: Arc<RwLock<FormatRegistry>>,
    status: StatusBroadcaster,
    doc_types: Arc<dyn DocumentTypeRegistry>,
    restorer: Arc<dyn RestorationService>,
    shell: Arc<dyn WorkbenchShell>,
    trackers: RwLock<HashMap<String, Arc<WidgetTracker>>>,
}

impl DocumentLifecycleCoordinator {
    pub fn new(
        registry: Arc<RwLock<FormatRegistry>>,
        status: StatusBroadcaster,
        doc_types: Arc<dyn DocumentTypeRegistry>,
        restorer: Arc<dyn RestorationService>,
        shell: Arc<dyn WorkbenchShell>,
    ) -> Self {
        Self {
            registry,
            status,
            doc_types,
            restorer,
            shell,
            trackers: RwLock::new(HashMap::new()),
        }
    }

    /// Build the editing surface plumbing for one format.
    ///
    /// Fails when the format's namespace already has a tracker.
    /// Restoration failure is logged and absorbed — the format still
    /// mounts, it just won't reopen old views.
    pub async fn mount(
        &self,
        format: &FormatDescriptor,
    ) -> Result<Arc<WidgetTracker>, MountError> {
        let namespace = format!("{NAMESPACE_PREFIX}-{}", format.key);

        let tracker = WidgetTracker::new(namespace.clone());
        {
            let mut trackers = self.trackers.write().expect("trackers poisoned");
            if trackers.contains_key(&namespace) {
                return Err(MountError::DuplicateNamespace(namespace));
            }
            trackers.insert(namespace.clone(), tracker.clone());
        }

        let factory = Arc::new(DiagramFactory::new(FactoryOptions {
            name: format.factory_name.clone(),
            model_name: format.model_name.clone(),
            file_types: vec![format.name.clone()],
            default_for: if format.is_default {
                vec![format.name.clone()]
            } else {
                Vec::new()
            },
        }));

        self.wire_factory(&factory, &tracker, &namespace);

        // Reopen last session's views. Best effort only.
        let spec = RestoreSpec {
            command: command_ids::OPEN.to_string(),
            args: {
                let factory_name = format.factory_name.clone();
                Box::new(move |view: &DocumentView| {
                    serde_json::json!({ "path": view.path(), "factory": factory_name })
                })
            },
            name: Box::new(|view: &DocumentView| view.path()),
        };
        if let Err(error) = self.restorer.restore(tracker.clone(), spec).await {
            tracing::warn!(namespace = %tracker.namespace(), %error, "view restoration failed");
        }

        self.doc_types.add_widget_factory(factory);
        tracing::info!(namespace = %tracker.namespace(), factory = %format.factory_name, "format mounted");

        Ok(tracker)
    }

    /// Hook every view the factory will ever create.
    fn wire_factory(
        &self,
        factory: &Arc<DiagramFactory>,
        tracker: &Arc<WidgetTracker>,
        namespace: &str,
    ) {
        let status = self.status.clone();
        let shell = self.shell.clone();
        let restorer = self.restorer.clone();
        let registry = self.registry.clone();
        let tracker = tracker.clone();
        let namespace = namespace.to_string();
        let factory_name = factory.name().to_string();

        factory.on_widget_created(move |view: &Arc<DocumentView>| {
            status.set_transient("Loading diagram...", STATUS_REVERT);

            // A click inside the frame focuses the view — unless it
            // already is the current widget.
            {
                let weak = Arc::downgrade(view);
                let shell = shell.clone();
                let status = status.clone();
                view.frame_clicked.connect(move |_| {
                    let Some(view) = weak.upgrade() else { return };
                    if shell.current_widget() != Some(view.id()) {
                        shell.activate(view.id());
                    }
                    status.set(format!("Editing {}", view.path()));
                });
            }

            view.set_icon(DEFAULT_ICON);

            // Renames invalidate the stored restoration record.
            {
                let restorer = restorer.clone();
                let namespace = namespace.clone();
                let factory_name = factory_name.clone();
                view.path_changed.connect(move |path: &String| {
                    let restorer = restorer.clone();
                    let namespace = namespace.clone();
                    let args =
                        serde_json::json!({ "path": path, "factory": factory_name });
                    let name = path.clone();
                    tokio::spawn(async move {
                        if let Err(error) = restorer.persist(&namespace, &name, args).await {
                            tracing::warn!(%error, name = %name, "restoration snapshot failed");
                        }
                    });
                });
            }

            // Finish initialization once the view reports ready.
            {
                let mut ready_rx = view.ready_watch();
                let weak = Arc::downgrade(view);
                let registry = registry.clone();
                let status = status.clone();
                tokio::spawn(async move {
                    while !*ready_rx.borrow_and_update() {
                        if ready_rx.changed().await.is_err() {
                            // View dropped before it ever became ready.
                            return;
                        }
                    }
                    let Some(view) = weak.upgrade() else { return };

                    let Some(model) = view.contents_model() else {
                        tracing::warn!(path = %view.path(), "view ready without a contents model");
                        return;
                    };

                    if let Some(mimetype) = model.mimetype.as_deref() {
                        let icon = registry
                            .read()
                            .expect("format registry poisoned")
                            .best_export_for_mime(mimetype)
                            .and_then(|f| f.icon.clone());
                        if let Some(icon) = icon {
                            view.set_icon(icon);
                        }
                    }
                    status.set(format!("{} ready", view.path()));
                });
            }

            if let Err(error) = tracker.add(view.clone()) {
                tracing::warn!(%error, "could not track new view");
            }
        });
    }

    pub fn tracker(&self, namespace: &str) -> Option<Arc<WidgetTracker>> {
        self.trackers
            .read()
            .expect("trackers poisoned")
            .get(namespace)
            .cloned()
    }

    pub fn trackers(&self) -> Vec<Arc<WidgetTracker>> {
        self.trackers
            .read()
            .expect("trackers poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Search every tracker for a view by widget id.
    pub fn find_view(&self, id: uuid::Uuid) -> Option<Arc<DocumentView>> {
        self.trackers()
            .into_iter()
            .find_map(|tracker| tracker.find(id))
    }

    /// Every live view across all namespaces.
    pub fn all_views(&self) -> Vec<Arc<DocumentView>> {
        self.trackers()
            .into_iter()
            .flat_map(|tracker| tracker.views())
            .collect()
    }

    /// Untrack a view the host has closed.
    pub fn release_view(&self, id: uuid::Uuid) -> Option<Arc<DocumentView>> {
        self.trackers().into_iter().find_map(|t| t.remove(id))
    }
}

impl std::fmt::Debug for DocumentLifecycleCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentLifecycleCoordinator")
            .field("trackers", &self.trackers.read().expect("trackers poisoned").len())
            .finish()
    }
}
