//! Draftboard — lifecycle management for multi-format diagram
//! documents inside a host workbench application.
//!
//! The core coordinates a format registry, per-format editing-instance
//! trackers with restoration, an asynchronous export pipeline with
//! collision-free file naming, a remote template catalog, and an
//! ephemeral status line — behind one [`DiagramManager`] facade.
//!
//! The host supplies storage, commands, shell, restoration, and network
//! access through the traits in [`host`]; reference adapters
//! ([`host::http`], [`host::local`], [`host::memory`]) cover the common
//! cases. Rendering, file parsing, and the visual editor itself stay on
//! the host side of the boundary.

pub mod config;
pub mod create;
pub mod document;
pub mod export;
pub mod format;
pub mod formats;
pub mod host;
pub mod lifecycle;
pub mod manager;
pub mod signal;
pub mod status;
pub mod template;

pub use create::{CreateError, CreateNewArgs};
pub use document::{DiagramFactory, DocumentView, RenderSurface, WidgetTracker};
pub use export::{DiagramExporter, ExportError};
pub use format::{ContentKind, FormatDescriptor, FormatRegistry, RegistryError};
pub use host::{HostContext, HostError};
pub use lifecycle::MountError;
pub use manager::{DiagramManager, RegisterError};
pub use status::StatusBroadcaster;
pub use template::{TemplateCatalog, TemplateRecord};
