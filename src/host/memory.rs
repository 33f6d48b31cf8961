//! In-memory host adapters.
//!
//! A complete collaborator set backed by process memory: enough host to
//! run the manager end-to-end in tests or in an embedding that brings
//! its own storage later. Nothing here persists.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use uuid::Uuid;

use crate::document::{DiagramFactory, DocumentView, RenderSurface, WidgetTracker};
use crate::host::{
    self, command_ids, CommandExecutor, CommandOutcome, ContentService, DocumentTypeRegistry,
    FileModel, FileTypeSpec, HostContext, HostError, RemoteFetcher, RestorationService,
    RestoreSpec, SavePayload, WorkbenchShell,
};

// ══════════════════════════════════════════════════════════════
// Content service
// ══════════════════════════════════════════════════════════════

/// Path-keyed file store.
pub struct MemoryContents {
    files: Mutex<HashMap<String, FileModel>>,
}

impl MemoryContents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            files: Mutex::new(HashMap::new()),
        })
    }

    /// Seed a file directly, bypassing the service contract.
    pub fn insert(&self, path: &str, content: &str) {
        let mut model = FileModel::stub(path);
        model.content = Some(content.to_string());
        model.mimetype = guess_mimetype(path);
        model.last_modified = Some(Utc::now());
        self.files
            .lock()
            .expect("memory contents poisoned")
            .insert(path.to_string(), model);
    }

    /// Full model including content, when the path exists.
    pub fn read(&self, path: &str) -> Option<FileModel> {
        self.files
            .lock()
            .expect("memory contents poisoned")
            .get(path)
            .cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files
            .lock()
            .expect("memory contents poisoned")
            .contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.lock().expect("memory contents poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn guess_mimetype(path: &str) -> Option<String> {
    mime_guess::from_path(path).first().map(|m| m.to_string())
}

#[async_trait]
impl ContentService for MemoryContents {
    async fn create_untitled(
        &self,
        cwd: &str,
        content_type: &str,
        ext: &str,
    ) -> Result<FileModel, HostError> {
        let mut files = self.files.lock().expect("memory contents poisoned");

        let mut candidate = host::join(cwd, &format!("untitled{ext}"));
        let mut counter = 1u32;
        while files.contains_key(&candidate) {
            candidate = host::join(cwd, &format!("untitled{counter}{ext}"));
            counter += 1;
        }

        let mut model = FileModel::stub(&candidate);
        model.content_type = content_type.to_string();
        model.mimetype = guess_mimetype(&candidate);
        model.content = Some(String::new());
        model.last_modified = Some(Utc::now());
        files.insert(candidate, model.clone());
        Ok(model)
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> Result<FileModel, HostError> {
        let mut files = self.files.lock().expect("memory contents poisoned");
        let mut model = files
            .remove(old_path)
            .ok_or_else(|| HostError::NotFound(old_path.to_string()))?;
        model.path = new_path.to_string();
        model.name = host::basename(new_path).to_string();
        files.insert(new_path.to_string(), model.clone());
        Ok(model)
    }

    async fn save(&self, path: &str, payload: SavePayload) -> Result<FileModel, HostError> {
        let mut model = FileModel::stub(path);
        model.content_type = payload.content_type;
        model.format = Some(payload.format);
        model.mimetype = Some(payload.mimetype);
        model.content = Some(payload.content);
        model.last_modified = Some(Utc::now());
        self.files
            .lock()
            .expect("memory contents poisoned")
            .insert(path.to_string(), model.clone());
        Ok(model)
    }

    async fn get_metadata(&self, path: &str) -> Result<FileModel, HostError> {
        let files = self.files.lock().expect("memory contents poisoned");
        let model = files
            .get(path)
            .ok_or_else(|| HostError::NotFound(path.to_string()))?;
        let mut metadata = model.clone();
        metadata.content = None;
        Ok(metadata)
    }
}

// ══════════════════════════════════════════════════════════════
// Shell
// ══════════════════════════════════════════════════════════════

/// Records activations; tracks the focused widget and working directory.
pub struct MemoryShell {
    directory: String,
    current: Mutex<Option<Uuid>>,
    activations: Mutex<Vec<Uuid>>,
}

impl MemoryShell {
    pub fn new(directory: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            directory: directory.into(),
            current: Mutex::new(None),
            activations: Mutex::new(Vec::new()),
        })
    }

    pub fn set_current(&self, id: Option<Uuid>) {
        *self.current.lock().expect("shell poisoned") = id;
    }

    pub fn activations(&self) -> Vec<Uuid> {
        self.activations.lock().expect("shell poisoned").clone()
    }
}

impl WorkbenchShell for MemoryShell {
    fn activate(&self, widget_id: Uuid) {
        self.activations
            .lock()
            .expect("shell poisoned")
            .push(widget_id);
        *self.current.lock().expect("shell poisoned") = Some(widget_id);
    }

    fn current_widget(&self) -> Option<Uuid> {
        *self.current.lock().expect("shell poisoned")
    }

    fn active_directory(&self) -> String {
        self.directory.clone()
    }
}

// ══════════════════════════════════════════════════════════════
// Document-type registry
// ══════════════════════════════════════════════════════════════

/// File types and widget factories, with suffix/pattern matching.
pub struct MemoryDocTypes {
    file_types: Mutex<Vec<FileTypeSpec>>,
    factories: Mutex<Vec<Arc<DiagramFactory>>>,
}

impl MemoryDocTypes {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            file_types: Mutex::new(Vec::new()),
            factories: Mutex::new(Vec::new()),
        })
    }

    pub fn find_factory(&self, name: &str) -> Option<Arc<DiagramFactory>> {
        self.factories
            .lock()
            .expect("doc types poisoned")
            .iter()
            .find(|f| f.name() == name)
            .cloned()
    }

    pub fn file_types(&self) -> Vec<FileTypeSpec> {
        self.file_types.lock().expect("doc types poisoned").clone()
    }
}

impl DocumentTypeRegistry for MemoryDocTypes {
    fn add_file_type(&self, spec: FileTypeSpec) {
        self.file_types.lock().expect("doc types poisoned").push(spec);
    }

    fn add_widget_factory(&self, factory: Arc<DiagramFactory>) {
        self.factories
            .lock()
            .expect("doc types poisoned")
            .push(factory);
    }

    fn preferred_factories_for(&self, path: &str) -> Vec<String> {
        // Longest matching extension first; pattern matches rank below
        // any extension match. Patterns are compiled per query — this
        // adapter is test-scale.
        let mut matched: Vec<(usize, String)> = Vec::new();
        for spec in self.file_types.lock().expect("doc types poisoned").iter() {
            let ext_len = spec
                .extensions
                .iter()
                .filter(|ext| path.ends_with(ext.as_str()))
                .map(|ext| ext.len())
                .max();
            if let Some(len) = ext_len {
                matched.push((len, spec.name.clone()));
            } else if let Some(pattern) = &spec.pattern {
                let hits = Regex::new(pattern)
                    .map(|re| re.is_match(path))
                    .unwrap_or(false);
                if hits {
                    matched.push((0, spec.name.clone()));
                }
            }
        }
        matched.sort_by_key(|(len, _)| std::cmp::Reverse(*len));

        let factories = self.factories.lock().expect("doc types poisoned");
        let mut names: Vec<String> = Vec::new();
        for (_, file_type) in &matched {
            // Factories claiming the type as default outrank the rest.
            for factory in factories.iter() {
                let claims_default = factory.default_for().iter().any(|t| t == file_type);
                if claims_default && !names.iter().any(|n| n == factory.name()) {
                    names.push(factory.name().to_string());
                }
            }
            for factory in factories.iter() {
                let claims = factory.file_types().iter().any(|t| t == file_type);
                if claims && !names.iter().any(|n| n == factory.name()) {
                    names.push(factory.name().to_string());
                }
            }
        }
        names
    }
}

// ══════════════════════════════════════════════════════════════
// Restoration
// ══════════════════════════════════════════════════════════════

/// Records restore requests and persisted entries; optionally fails.
pub struct MemoryRestorer {
    failing: bool,
    restored: Mutex<Vec<String>>,
    persisted: Mutex<Vec<(String, String, serde_json::Value)>>,
}

impl MemoryRestorer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            failing: false,
            restored: Mutex::new(Vec::new()),
            persisted: Mutex::new(Vec::new()),
        })
    }

    /// A restorer whose every call fails, for degraded-path tests.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            failing: true,
            restored: Mutex::new(Vec::new()),
            persisted: Mutex::new(Vec::new()),
        })
    }

    /// Namespaces `restore` was requested for.
    pub fn restored(&self) -> Vec<String> {
        self.restored.lock().expect("restorer poisoned").clone()
    }

    /// `(namespace, name, args)` triples recorded by `persist`.
    pub fn persisted(&self) -> Vec<(String, String, serde_json::Value)> {
        self.persisted.lock().expect("restorer poisoned").clone()
    }
}

#[async_trait]
impl RestorationService for MemoryRestorer {
    async fn restore(
        &self,
        tracker: Arc<WidgetTracker>,
        _spec: RestoreSpec,
    ) -> Result<(), HostError> {
        if self.failing {
            return Err(HostError::Restore("scripted restore failure".to_string()));
        }
        self.restored
            .lock()
            .expect("restorer poisoned")
            .push(tracker.namespace().to_string());
        Ok(())
    }

    async fn persist(
        &self,
        namespace: &str,
        name: &str,
        args: serde_json::Value,
    ) -> Result<(), HostError> {
        if self.failing {
            return Err(HostError::Restore("scripted persist failure".to_string()));
        }
        self.persisted.lock().expect("restorer poisoned").push((
            namespace.to_string(),
            name.to_string(),
            args,
        ));
        Ok(())
    }
}

// ══════════════════════════════════════════════════════════════
// Remote fetch
// ══════════════════════════════════════════════════════════════

/// Serves canned pages by url.
pub struct StaticFetcher {
    pages: Mutex<HashMap<String, String>>,
}

impl StaticFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(HashMap::new()),
        })
    }

    pub fn insert(&self, url: &str, body: &str) {
        self.pages
            .lock()
            .expect("fetcher poisoned")
            .insert(url.to_string(), body.to_string());
    }
}

#[async_trait]
impl RemoteFetcher for StaticFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, HostError> {
        self.pages
            .lock()
            .expect("fetcher poisoned")
            .get(url)
            .cloned()
            .ok_or_else(|| HostError::NotFound(url.to_string()))
    }
}

// ══════════════════════════════════════════════════════════════
// Render surface
// ══════════════════════════════════════════════════════════════

/// Surface with scripted export representations; records every load.
pub struct ScriptedSurface {
    exports: Mutex<HashMap<String, String>>,
    loaded: Mutex<Vec<String>>,
}

impl ScriptedSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            exports: Mutex::new(HashMap::new()),
            loaded: Mutex::new(Vec::new()),
        })
    }

    /// Script the representation returned for `format_key`.
    pub fn set_export(&self, format_key: &str, content: &str) {
        self.exports
            .lock()
            .expect("surface poisoned")
            .insert(format_key.to_string(), content.to_string());
    }

    /// Every content string loaded into this surface, oldest first.
    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().expect("surface poisoned").clone()
    }
}

#[async_trait]
impl RenderSurface for ScriptedSurface {
    async fn export_as(&self, format_key: &str) -> Result<Option<String>, HostError> {
        Ok(self
            .exports
            .lock()
            .expect("surface poisoned")
            .get(format_key)
            .cloned())
    }

    async fn load(&self, content: &str) -> Result<(), HostError> {
        self.loaded
            .lock()
            .expect("surface poisoned")
            .push(content.to_string());
        Ok(())
    }
}

// ══════════════════════════════════════════════════════════════
// Command executor
// ══════════════════════════════════════════════════════════════

type SurfaceFactory = Box<dyn Fn() -> Arc<dyn RenderSurface> + Send + Sync>;

/// Dispatches the document commands against the in-memory services.
pub struct MemoryExecutor {
    contents: Arc<MemoryContents>,
    doc_types: Arc<MemoryDocTypes>,
    surface_factory: Mutex<SurfaceFactory>,
    auto_ready: AtomicBool,
    opened: Mutex<Vec<(String, String)>>,
    views: Mutex<Vec<Arc<DocumentView>>>,
}

impl MemoryExecutor {
    pub fn new(contents: Arc<MemoryContents>, doc_types: Arc<MemoryDocTypes>) -> Arc<Self> {
        Arc::new(Self {
            contents,
            doc_types,
            surface_factory: Mutex::new(Box::new(|| {
                ScriptedSurface::new() as Arc<dyn RenderSurface>
            })),
            auto_ready: AtomicBool::new(true),
            opened: Mutex::new(Vec::new()),
            views: Mutex::new(Vec::new()),
        })
    }

    /// Replace the surface supplied to newly opened views.
    pub fn set_surface_factory(
        &self,
        factory: impl Fn() -> Arc<dyn RenderSurface> + Send + Sync + 'static,
    ) {
        *self.surface_factory.lock().expect("executor poisoned") = Box::new(factory);
    }

    /// Whether opened views report ready immediately (default true).
    pub fn set_auto_ready(&self, auto_ready: bool) {
        self.auto_ready.store(auto_ready, Ordering::SeqCst);
    }

    /// `(path, factory)` pairs opened so far.
    pub fn opened(&self) -> Vec<(String, String)> {
        self.opened.lock().expect("executor poisoned").clone()
    }

    /// Views created through the open command.
    pub fn views(&self) -> Vec<Arc<DocumentView>> {
        self.views.lock().expect("executor poisoned").clone()
    }
}

fn required_str<'a>(
    args: &'a serde_json::Value,
    field: &str,
    command: &str,
) -> Result<&'a str, HostError> {
    args.get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HostError::CommandFailed {
            command: command.to_string(),
            reason: format!("missing `{field}` argument"),
        })
}

#[async_trait]
impl CommandExecutor for MemoryExecutor {
    async fn execute(
        &self,
        command: &str,
        args: serde_json::Value,
    ) -> Result<CommandOutcome, HostError> {
        match command {
            command_ids::NEW_UNTITLED => {
                let cwd = args.get("path").and_then(|v| v.as_str()).unwrap_or("");
                let content_type = args.get("type").and_then(|v| v.as_str()).unwrap_or("file");
                let ext = required_str(&args, "ext", command)?;
                let model = self.contents.create_untitled(cwd, content_type, ext).await?;
                Ok(CommandOutcome::Model(model))
            }
            command_ids::OPEN => {
                let path = required_str(&args, "path", command)?;
                let factory_name = required_str(&args, "factory", command)?;
                let factory = self.doc_types.find_factory(factory_name).ok_or_else(|| {
                    HostError::CommandFailed {
                        command: command.to_string(),
                        reason: format!("no factory named `{factory_name}`"),
                    }
                })?;

                let surface = {
                    let make_surface = self.surface_factory.lock().expect("executor poisoned");
                    (*make_surface)()
                };
                let view = factory.create_view(path, surface);
                self.opened
                    .lock()
                    .expect("executor poisoned")
                    .push((path.to_string(), factory_name.to_string()));

                if self.auto_ready.load(Ordering::SeqCst) {
                    let model = match self.contents.get_metadata(path).await {
                        Ok(model) => Some(model),
                        Err(_) => Some(FileModel::stub(path)),
                    };
                    view.mark_ready(model);
                }

                self.views.lock().expect("executor poisoned").push(view.clone());
                Ok(CommandOutcome::Document(view))
            }
            other => Err(HostError::CommandFailed {
                command: other.to_string(),
                reason: "unknown command".to_string(),
            }),
        }
    }
}

// ══════════════════════════════════════════════════════════════
// Bundle
// ══════════════════════════════════════════════════════════════

/// The full in-memory collaborator set, wired together.
pub struct MemoryHost {
    pub contents: Arc<MemoryContents>,
    pub doc_types: Arc<MemoryDocTypes>,
    pub shell: Arc<MemoryShell>,
    pub restorer: Arc<MemoryRestorer>,
    pub fetcher: Arc<StaticFetcher>,
    pub executor: Arc<MemoryExecutor>,
}

impl MemoryHost {
    pub fn new(directory: impl Into<String>) -> Self {
        let contents = MemoryContents::new();
        let doc_types = MemoryDocTypes::new();
        let executor = MemoryExecutor::new(contents.clone(), doc_types.clone());
        Self {
            contents,
            doc_types,
            shell: MemoryShell::new(directory),
            restorer: MemoryRestorer::new(),
            fetcher: StaticFetcher::new(),
            executor,
        }
    }

    pub fn context(&self) -> HostContext {
        HostContext {
            contents: self.contents.clone(),
            commands: self.executor.clone(),
            doc_types: self.doc_types.clone(),
            restorer: self.restorer.clone(),
            shell: self.shell.clone(),
            fetcher: self.fetcher.clone(),
        }
    }
}
