//! Format descriptors and the format registry.
//!
//! A format is data plus optional behavior: how one supported file type
//! is named, matched, represented, and (when export-capable) produced.
//! No inheritance — custom behavior rides along as function or trait
//! object fields on the descriptor.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::export::DiagramExporter;
use crate::host::FileModel;

/// How a format's content travels through the content service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Base64,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Base64 => "base64",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turns raw exporter output into the string persisted to storage.
pub type ContentSerializer = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Claims ownership of a file by inspecting its content model, ahead of
/// any extension match.
pub type OwnershipPredicate = Arc<dyn Fn(&FileModel) -> bool + Send + Sync>;

/// One supported file type.
///
/// Immutable once registered. `key` is the identity; registering two
/// descriptors with the same key is a configuration error.
#[derive(Clone)]
pub struct FormatDescriptor {
    pub key: String,
    pub name: String,
    pub label: String,
    /// Extension including the leading dot; may be chained (`.dio.svg`).
    pub ext: String,
    pub mimetype: String,
    pub content_kind: ContentKind,
    pub content_type: String,
    pub factory_name: String,
    pub model_name: String,
    pub is_default: bool,
    pub is_export: bool,
    pub exporter: Option<Arc<dyn DiagramExporter>>,
    pub serializer: Option<ContentSerializer>,
    pub icon: Option<String>,
    /// Path-matching regex for files the extension misses.
    pub pattern: Option<String>,
    pub wants_model: Option<OwnershipPredicate>,
}

impl FormatDescriptor {
    pub fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        ext: impl Into<String>,
        mimetype: impl Into<String>,
    ) -> Self {
        let key = key.into();
        let label = label.into();
        Self {
            name: key.clone(),
            factory_name: label.clone(),
            key,
            label,
            ext: ext.into(),
            mimetype: mimetype.into(),
            content_kind: ContentKind::Text,
            content_type: "file".to_string(),
            model_name: "text".to_string(),
            is_default: false,
            is_export: false,
            exporter: None,
            serializer: None,
            icon: None,
            pattern: None,
            wants_model: None,
        }
    }

    pub fn with_factory(mut self, factory_name: impl Into<String>) -> Self {
        self.factory_name = factory_name.into();
        self
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_content_kind(mut self, kind: ContentKind) -> Self {
        self.content_kind = kind;
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Mark this format as the one `create_new` falls back to.
    pub fn default_format(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Mark this format as an export target.
    pub fn export(mut self) -> Self {
        self.is_export = true;
        self
    }

    pub fn with_exporter(mut self, exporter: Arc<dyn DiagramExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn with_serializer(
        mut self,
        serializer: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.serializer = Some(Arc::new(serializer));
        self
    }

    pub fn with_wants_model(
        mut self,
        predicate: impl Fn(&FileModel) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.wants_model = Some(Arc::new(predicate));
        self
    }

    /// The host-facing file-type registration for this format.
    pub fn file_type_spec(&self) -> crate::host::FileTypeSpec {
        crate::host::FileTypeSpec {
            name: self.name.clone(),
            content_type: self.content_type.clone(),
            display_name: self.label.clone(),
            mimetypes: vec![self.mimetype.clone()],
            extensions: vec![self.ext.clone()],
            icon: self.icon.clone(),
            file_format: self.content_kind.as_str().to_string(),
            pattern: self.pattern.clone(),
        }
    }
}

impl fmt::Debug for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatDescriptor")
            .field("key", &self.key)
            .field("label", &self.label)
            .field("ext", &self.ext)
            .field("mimetype", &self.mimetype)
            .field("is_default", &self.is_default)
            .field("is_export", &self.is_export)
            .finish()
    }
}

/// Configuration errors raised at registration time.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("format `{0}` is already registered")]
    DuplicateFormat(String),
}

/// The set of registered format descriptors, in registration order.
#[derive(Debug, Default)]
pub struct FormatRegistry {
    formats: Vec<FormatDescriptor>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a descriptor. Fails when the key is already present; the
    /// registry is left unchanged in that case.
    pub fn register(&mut self, descriptor: FormatDescriptor) -> Result<(), RegistryError> {
        if self.formats.iter().any(|f| f.key == descriptor.key) {
            return Err(RegistryError::DuplicateFormat(descriptor.key));
        }
        tracing::debug!(key = %descriptor.key, ext = %descriptor.ext, "format registered");
        self.formats.push(descriptor);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&FormatDescriptor> {
        self.formats.iter().find(|f| f.key == key)
    }

    pub fn list(&self) -> &[FormatDescriptor] {
        &self.formats
    }

    /// The format `create_new` falls back to when none is named.
    pub fn default_format(&self) -> Option<&FormatDescriptor> {
        self.formats.iter().find(|f| f.is_default)
    }

    /// Best format for a content model.
    ///
    /// A descriptor whose ownership predicate accepts the model wins
    /// outright. Otherwise the longest extension matching a suffix of
    /// the path wins; ties keep the first-registered descriptor.
    pub fn resolve_for_model(&self, model: &FileModel) -> Option<&FormatDescriptor> {
        let mut longest = 0usize;
        let mut candidate = None;

        for fmt in &self.formats {
            if let Some(wants) = &fmt.wants_model {
                if wants(model) {
                    return Some(fmt);
                }
            }
            if model.path.ends_with(&fmt.ext) && fmt.ext.len() > longest {
                candidate = Some(fmt);
                longest = fmt.ext.len();
            }
        }

        candidate
    }

    /// Best format for a bare path, by extension alone.
    pub fn resolve_for_path(&self, path: &str) -> Option<&FormatDescriptor> {
        self.resolve_for_model(&FileModel::stub(path))
    }

    /// First-registered export-capable format producing `mimetype`.
    /// Backs icon selection for ready views.
    pub fn best_export_for_mime(&self, mimetype: &str) -> Option<&FormatDescriptor> {
        self.formats
            .iter()
            .find(|f| f.is_export && f.mimetype == mimetype)
    }

    /// Every registered extension, longest first. Used to strip
    /// extension chains off a filename when deriving an export stem.
    pub fn extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.formats.iter().map(|f| f.ext.clone()).collect();
        exts.sort_by_key(|e| std::cmp::Reverse(e.len()));
        exts
    }
}
