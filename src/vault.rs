//! Read-only view of the user's vault on disk.
//!
//! The indexing pipeline never writes vault files; this module only
//! enumerates them, reads their content, and reports metadata. Scanning is
//! the cheap path used by the change detector: it walks the tree and
//! returns batched `{path, mtime, type}` records without reading content.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::VaultConfig;
use crate::models::DocumentType;

/// Lightweight per-file record produced by [`Vault::scan`].
#[derive(Debug, Clone)]
pub struct ScanRecord {
    /// Vault-relative path.
    pub path: String,
    pub mtime: i64,
    pub doc_type: DocumentType,
}

/// File metadata without content.
#[derive(Debug, Clone, Copy)]
pub struct FileStat {
    pub size: i64,
    pub mtime: i64,
    pub ctime: i64,
}

pub struct Vault {
    root: PathBuf,
    exclude_set: GlobSet,
    follow_symlinks: bool,
    batch_size: usize,
}

impl Vault {
    pub fn open(config: &VaultConfig) -> Result<Vault> {
        if !config.root.exists() {
            bail!("Vault root does not exist: {}", config.root.display());
        }

        let mut excludes = vec![
            "**/.git/**".to_string(),
            "**/.obsidian/**".to_string(),
            "**/.trash/**".to_string(),
        ];
        excludes.extend(config.exclude_globs.clone());

        Ok(Vault {
            root: config.root.clone(),
            exclude_set: build_globset(&excludes)?,
            follow_symlinks: config.follow_symlinks,
            batch_size: config.scan_batch_size.max(1),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the vault and return batched scan records for files whose
    /// extension appears in `extensions`. Content is never read. Each call
    /// re-scans; ordering is deterministic (sorted by relative path).
    pub fn scan(&self, extensions: &[&str], limit: Option<usize>) -> Result<Vec<Vec<ScanRecord>>> {
        let mut records = Vec::new();

        let walker = WalkDir::new(&self.root).follow_links(self.follow_symlinks);
        for entry in walker {
            // One unreadable directory entry must not abort the scan.
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    eprintln!("Warning: skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let rel = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = rel.to_string_lossy().to_string();

            if self.exclude_set.is_match(&rel_str) {
                continue;
            }

            let ext = extension_of(&rel_str);
            if !extensions.contains(&ext.as_str()) {
                continue;
            }

            let mtime = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|t| t.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            records.push(ScanRecord {
                path: rel_str,
                mtime,
                doc_type: DocumentType::from_extension(&ext),
            });
        }

        records.sort_by(|a, b| a.path.cmp(&b.path));
        if let Some(lim) = limit {
            records.truncate(lim);
        }

        Ok(records
            .chunks(self.batch_size)
            .map(|c| c.to_vec())
            .collect())
    }

    pub fn read_text(&self, rel_path: &str) -> Result<String> {
        Ok(std::fs::read_to_string(self.root.join(rel_path))?)
    }

    pub fn read_bytes(&self, rel_path: &str) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.root.join(rel_path))?)
    }

    pub fn exists(&self, rel_path: &str) -> bool {
        self.root.join(rel_path).exists()
    }

    pub fn is_dir(&self, rel_path: &str) -> bool {
        self.root.join(rel_path).is_dir()
    }

    pub fn stat(&self, rel_path: &str) -> Result<FileStat> {
        let metadata = std::fs::metadata(self.root.join(rel_path))?;
        let to_secs = |t: std::io::Result<std::time::SystemTime>| {
            t.ok()
                .and_then(|t| t.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0)
        };
        Ok(FileStat {
            size: metadata.len() as i64,
            mtime: to_secs(metadata.modified()),
            ctime: to_secs(metadata.created()),
        })
    }
}

pub fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VaultConfig;

    fn vault_config(root: &Path) -> VaultConfig {
        VaultConfig {
            root: root.to_path_buf(),
            exclude_globs: vec![],
            follow_symlinks: false,
            scan_batch_size: 2,
        }
    }

    #[test]
    fn scan_batches_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.md", "a.md", "b.md", "skip.xyz"] {
            std::fs::write(dir.path().join(name), "content").unwrap();
        }
        let vault = Vault::open(&vault_config(dir.path())).unwrap();
        let batches = vault.scan(&["md"], None).unwrap();
        assert_eq!(batches.len(), 2);
        let flat: Vec<&str> = batches
            .iter()
            .flatten()
            .map(|r| r.path.as_str())
            .collect();
        assert_eq!(flat, vec!["a.md", "b.md", "c.md"]);
    }

    #[test]
    fn excludes_apply_to_scan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".obsidian")).unwrap();
        std::fs::write(dir.path().join(".obsidian/cfg.md"), "x").unwrap();
        std::fs::write(dir.path().join("note.md"), "x").unwrap();
        let vault = Vault::open(&vault_config(dir.path())).unwrap();
        let batches = vault.scan(&["md"], None).unwrap();
        let flat: Vec<&str> = batches
            .iter()
            .flatten()
            .map(|r| r.path.as_str())
            .collect();
        assert_eq!(flat, vec!["note.md"]);
    }

    #[test]
    fn missing_root_fails() {
        let config = vault_config(Path::new("/definitely/not/here"));
        assert!(Vault::open(&config).is_err());
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension_of("Notes/Réunion.MD"), "md");
        assert_eq!(extension_of("no_extension"), "");
    }
}
