//! Loader registry and resource-kind detection.
//!
//! Every supported extension maps to exactly one loader. Registration
//! rejects overlap outright so a dispatch never depends on insertion
//! order.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::loader::{
    DocumentLoader, ImageLoader, JsonLoader, MarkdownLoader, OfficeLoader, PdfLoader,
    PlainTextLoader, TabularLoader,
};
use crate::models::{DocumentType, ResourceKind};
use crate::vault::Vault;

pub struct LoaderRegistry {
    loaders: Vec<Arc<dyn DocumentLoader>>,
    by_extension: HashMap<&'static str, Arc<dyn DocumentLoader>>,
}

impl LoaderRegistry {
    /// Registry with the full built-in loader set.
    pub fn new() -> Result<Self> {
        let mut registry = LoaderRegistry {
            loaders: Vec::new(),
            by_extension: HashMap::new(),
        };
        registry.register(Arc::new(MarkdownLoader))?;
        registry.register(Arc::new(PlainTextLoader))?;
        registry.register(Arc::new(JsonLoader))?;
        registry.register(Arc::new(TabularLoader))?;
        registry.register(Arc::new(PdfLoader))?;
        registry.register(Arc::new(OfficeLoader))?;
        registry.register(Arc::new(ImageLoader))?;
        Ok(registry)
    }

    pub fn register(&mut self, loader: Arc<dyn DocumentLoader>) -> Result<()> {
        for ext in loader.supported_extensions() {
            if self.by_extension.contains_key(ext) {
                bail!("Extension '{}' is claimed by two loaders", ext);
            }
            self.by_extension.insert(ext, Arc::clone(&loader));
        }
        self.loaders.push(loader);
        Ok(())
    }

    pub fn for_extension(&self, extension: &str) -> Option<&dyn DocumentLoader> {
        self.by_extension.get(extension).map(|l| l.as_ref())
    }

    pub fn for_path(&self, rel_path: &str) -> Option<&dyn DocumentLoader> {
        self.for_extension(&crate::vault::extension_of(rel_path))
    }

    pub fn for_type(&self, doc_type: DocumentType) -> Option<&dyn DocumentLoader> {
        self.loaders
            .iter()
            .find(|l| l.doc_type() == doc_type)
            .map(|l| l.as_ref())
    }

    pub fn all(&self) -> impl Iterator<Item = &dyn DocumentLoader> {
        self.loaders.iter().map(|l| l.as_ref())
    }

    pub fn supported_extensions(&self) -> Vec<&'static str> {
        let mut exts: Vec<&'static str> = self.by_extension.keys().copied().collect();
        exts.sort_unstable();
        exts
    }
}

/// Classify a free-form token (CLI argument, link target) into the
/// resource it names. Checks run in strict precedence order; the first
/// match wins.
pub fn detect_resource_kind(vault: &Vault, token: &str) -> ResourceKind {
    let token = token.trim();
    if token.starts_with("http://") || token.starts_with("https://") {
        return ResourceKind::Url;
    }
    if let Some(tag) = token.strip_prefix('#') {
        if !tag.is_empty() {
            return ResourceKind::Tag;
        }
    }
    if let Some(inner) = token.strip_prefix("[[").and_then(|t| t.strip_suffix("]]")) {
        let target = inner.split('|').next().unwrap_or(inner).trim();
        if vault.is_dir(target) {
            return ResourceKind::Folder;
        }
        return ResourceKind::Document(DocumentType::Markdown);
    }
    if token.ends_with('/') || vault.is_dir(token) {
        return ResourceKind::Folder;
    }
    let ext = crate::vault::extension_of(token);
    if !ext.is_empty() {
        match DocumentType::from_extension(&ext) {
            DocumentType::Unknown => ResourceKind::Unknown,
            doc_type => ResourceKind::Document(doc_type),
        }
    } else {
        ResourceKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VaultConfig;

    fn vault(root: &std::path::Path) -> Vault {
        Vault::open(&VaultConfig {
            root: root.to_path_buf(),
            exclude_globs: vec![],
            follow_symlinks: false,
            scan_batch_size: 100,
        })
        .unwrap()
    }

    #[test]
    fn every_extension_resolves_to_one_loader() {
        let registry = LoaderRegistry::new().unwrap();
        for ext in ["md", "txt", "json", "csv", "pdf", "docx", "png", "canvas"] {
            assert!(registry.for_extension(ext).is_some(), "missing {}", ext);
        }
        assert!(registry.for_extension("exe").is_none());
        assert!(registry.for_type(DocumentType::Pdf).is_some());
        assert!(registry.for_type(DocumentType::Unknown).is_none());
    }

    #[test]
    fn duplicate_extension_is_rejected() {
        let mut registry = LoaderRegistry::new().unwrap();
        assert!(registry.register(Arc::new(MarkdownLoader)).is_err());
    }

    #[test]
    fn detection_precedence() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("projects")).unwrap();
        let vault = vault(dir.path());

        assert_eq!(
            detect_resource_kind(&vault, "https://example.com/page"),
            ResourceKind::Url
        );
        assert_eq!(detect_resource_kind(&vault, "#planning"), ResourceKind::Tag);
        assert_eq!(
            detect_resource_kind(&vault, "[[projects]]"),
            ResourceKind::Folder
        );
        assert_eq!(
            detect_resource_kind(&vault, "[[Some Note|alias]]"),
            ResourceKind::Document(DocumentType::Markdown)
        );
        assert_eq!(
            detect_resource_kind(&vault, "projects/"),
            ResourceKind::Folder
        );
        assert_eq!(
            detect_resource_kind(&vault, "notes/plan.md"),
            ResourceKind::Document(DocumentType::Markdown)
        );
        assert_eq!(detect_resource_kind(&vault, "mystery"), ResourceKind::Unknown);
    }
}
