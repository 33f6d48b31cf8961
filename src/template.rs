//! Remote template catalog.
//!
//! Starter documents live behind a remote manifest: a small XML file
//! listing `<template url="..."/>` entries relative to the catalog
//! base. The catalog keeps the parsed records, upserts by url, and
//! tells subscribers that *something* changed — they re-pull `list()`.
//!
//! Manifest fetch or parse failure is never fatal; the catalog keeps
//! whatever it had and logs a warning.

use std::sync::{Arc, Mutex};

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{BUILTIN_TAG, TEMPLATE_MANIFEST};
use crate::host::{self, RemoteFetcher};
use crate::signal::Signal;

/// Metadata describing one reusable starter document.
///
/// The url is the identity: re-adding a url replaces the prior record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub url: String,
    pub label: String,
    pub tags: Vec<String>,
    pub thumbnail: String,
}

#[derive(Debug, Error)]
enum ManifestError {
    #[error("XML parse error at position {position}: {reason}")]
    Xml { position: u64, reason: String },

    #[error("malformed attribute: {0}")]
    Attr(String),
}

/// The set of known templates plus a change notification channel.
pub struct TemplateCatalog {
    base_url: String,
    fetcher: Arc<dyn RemoteFetcher>,
    records: Mutex<Vec<TemplateRecord>>,
    changed: Signal<()>,
}

impl TemplateCatalog {
    pub fn new(base_url: impl Into<String>, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self {
            base_url: base_url.into(),
            fetcher,
            records: Mutex::new(Vec::new()),
            changed: Signal::new(),
        }
    }

    /// Current records, in first-seen order.
    pub fn list(&self) -> Vec<TemplateRecord> {
        self.records.lock().expect("catalog poisoned").clone()
    }

    /// Subscribe to change notifications. No payload — re-pull `list()`.
    pub fn on_changed(&self, slot: impl Fn(&()) + Send + Sync + 'static) {
        self.changed.connect(slot);
    }

    /// Idempotent upsert keyed by url.
    ///
    /// Emits exactly one change notification per call, even when
    /// `records` is empty — callers treat "I was asked to add" as a
    /// change event regardless of the payload.
    pub fn add(&self, records: Vec<TemplateRecord>) {
        {
            let mut current = self.records.lock().expect("catalog poisoned");
            for record in records {
                match current.iter_mut().find(|r| r.url == record.url) {
                    Some(existing) => *existing = record,
                    None => current.push(record),
                }
            }
        }
        self.changed.emit(&());
    }

    /// Fetch and parse the remote manifest, merging its entries in.
    ///
    /// Failures leave the catalog unchanged.
    pub async fn refresh(&self) {
        let manifest_url = host::join(&self.base_url, TEMPLATE_MANIFEST);

        let body = match self.fetcher.fetch_text(&manifest_url).await {
            Ok(body) => body,
            Err(error) => {
                tracing::warn!(url = %manifest_url, %error, "template manifest fetch failed");
                return;
            }
        };

        let entries = match parse_manifest(&body) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(url = %manifest_url, %error, "template manifest parse failed");
                return;
            }
        };

        let records: Vec<TemplateRecord> = entries
            .iter()
            .map(|rel| self.record_for_entry(rel))
            .collect();

        tracing::info!(count = records.len(), url = %manifest_url, "templates refreshed");
        self.add(records);
    }

    fn record_for_entry(&self, rel_url: &str) -> TemplateRecord {
        let (group, label) = derive_group_label(rel_url);
        let url = host::join(&self.base_url, rel_url);
        let thumbnail = match url.strip_suffix(".xml") {
            Some(stem) => format!("{stem}.png"),
            None => url.clone(),
        };
        TemplateRecord {
            url,
            label,
            tags: vec![group, BUILTIN_TAG.to_string()],
            thumbnail,
        }
    }
}

impl std::fmt::Debug for TemplateCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCatalog")
            .field("base_url", &self.base_url)
            .field("records", &self.records.lock().expect("catalog poisoned").len())
            .finish()
    }
}

/// Pull the `url` attribute off every `<template>` element.
fn parse_manifest(xml: &str) -> Result<Vec<String>, ManifestError> {
    let mut reader = Reader::from_str(xml);
    let mut urls = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.name().as_ref() != b"template" {
                    continue;
                }
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| ManifestError::Attr(e.to_string()))?;
                    if attr.key.as_ref() == b"url" {
                        let value = attr
                            .unescape_value()
                            .map_err(|e| ManifestError::Attr(e.to_string()))?;
                        if !value.is_empty() {
                            urls.push(value.into_owned());
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ManifestError::Xml {
                    position: reader.error_position() as u64,
                    reason: e.to_string(),
                });
            }
            _ => {}
        }
    }

    Ok(urls)
}

/// Derive `(group, label)` from a manifest entry.
///
/// The trailing `.xml` is stripped and underscores act as segment
/// separators alongside `/`; the last two segments are the group and
/// label. `shapes/basic_flow.xml` → group `basic`, label `flow`.
fn derive_group_label(rel_url: &str) -> (String, String) {
    let trimmed = rel_url.strip_suffix(".xml").unwrap_or(rel_url);
    let segments: Vec<&str> = trimmed
        .split(['/', '_'])
        .filter(|s| !s.is_empty())
        .collect();

    match segments.as_slice() {
        [] => (BUILTIN_TAG.to_string(), rel_url.to_string()),
        [only] => (only.to_string(), only.to_string()),
        [.., group, label] => (group.to_string(), label.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::StaticFetcher;

    fn catalog_with_manifest(manifest: &str) -> TemplateCatalog {
        let fetcher = StaticFetcher::new();
        fetcher.insert("https://templates.example/index.xml", manifest);
        TemplateCatalog::new("https://templates.example", fetcher)
    }

    #[test]
    fn manifest_parsing_collects_template_urls() {
        let urls = parse_manifest(
            r#"<?xml version="1.0"?>
            <templates>
              <template url="shapes/basic_flow.xml"/>
              <template url="shapes/cloud.xml"></template>
              <other url="ignored.xml"/>
            </templates>"#,
        )
        .unwrap();

        assert_eq!(urls, vec!["shapes/basic_flow.xml", "shapes/cloud.xml"]);
    }

    #[test]
    fn malformed_manifest_is_an_error() {
        // Duplicated attribute trips the attribute checks.
        assert!(parse_manifest(r#"<templates><template url="a.xml" url="b.xml"/></templates>"#)
            .is_err());
        assert!(parse_manifest("<templates><template url=").is_err());
    }

    #[test]
    fn group_and_label_derivation() {
        assert_eq!(
            derive_group_label("shapes/basic_flow.xml"),
            ("basic".to_string(), "flow".to_string())
        );
        assert_eq!(
            derive_group_label("network/router.xml"),
            ("network".to_string(), "router".to_string())
        );
        assert_eq!(
            derive_group_label("blank.xml"),
            ("blank".to_string(), "blank".to_string())
        );
    }

    #[tokio::test]
    async fn refresh_builds_records_from_manifest() {
        let catalog = catalog_with_manifest(
            r#"<templates><template url="shapes/basic_flow.xml"/></templates>"#,
        );

        catalog.refresh().await;

        let records = catalog.list();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.url, "https://templates.example/shapes/basic_flow.xml");
        assert_eq!(record.label, "flow");
        assert_eq!(record.tags, vec!["basic".to_string(), "builtin".to_string()]);
        assert_eq!(
            record.thumbnail,
            "https://templates.example/shapes/basic_flow.png"
        );
    }

    #[tokio::test]
    async fn refresh_failure_leaves_catalog_unchanged() {
        let catalog = TemplateCatalog::new("https://unreachable.example", StaticFetcher::new());
        catalog.add(vec![TemplateRecord {
            url: "kept".to_string(),
            label: "kept".to_string(),
            tags: vec![],
            thumbnail: String::new(),
        }]);

        catalog.refresh().await;

        let records = catalog.list();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "kept");
    }

    #[tokio::test]
    async fn refresh_with_unparseable_manifest_keeps_records() {
        let catalog = catalog_with_manifest("<templates><template url=");
        catalog.add(vec![TemplateRecord {
            url: "kept".to_string(),
            label: "kept".to_string(),
            tags: vec![],
            thumbnail: String::new(),
        }]);

        catalog.refresh().await;
        assert_eq!(catalog.list().len(), 1);
    }

    #[test]
    fn add_upserts_by_url() {
        let catalog = catalog_with_manifest("<templates/>");
        let first = TemplateRecord {
            url: "a.xml".to_string(),
            label: "first".to_string(),
            tags: vec![],
            thumbnail: String::new(),
        };
        let second = TemplateRecord {
            label: "second".to_string(),
            ..first.clone()
        };

        catalog.add(vec![first]);
        catalog.add(vec![second]);

        let records = catalog.list();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].label, "second");
    }

    #[test]
    fn every_add_call_notifies_even_empty_ones() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let catalog = catalog_with_manifest("<templates/>");
        let notified = Arc::new(AtomicUsize::new(0));
        {
            let notified = notified.clone();
            catalog.on_changed(move |_| {
                notified.fetch_add(1, Ordering::SeqCst);
            });
        }

        catalog.add(Vec::new());
        catalog.add(vec![TemplateRecord {
            url: "a.xml".to_string(),
            label: "a".to_string(),
            tags: vec![],
            thumbnail: String::new(),
        }]);

        assert_eq!(notified.load(Ordering::SeqCst), 2);
    }
}
