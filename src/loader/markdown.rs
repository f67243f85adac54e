//! Markdown loader: frontmatter, wiki-links, and inline tags.

use async_trait::async_trait;

use super::{read_text_document, DocumentLoader};
use crate::models::{Document, DocumentReference, DocumentType, RefKind};
use crate::vault::Vault;

pub struct MarkdownLoader;

#[async_trait]
impl DocumentLoader for MarkdownLoader {
    fn supported_extensions(&self) -> &'static [&'static str] {
        &["md", "markdown"]
    }

    fn doc_type(&self) -> DocumentType {
        DocumentType::Markdown
    }

    async fn read_by_path(
        &self,
        vault: &Vault,
        rel_path: &str,
        _gen_cache_content: bool,
    ) -> Option<Document> {
        let mut doc = read_text_document(vault, rel_path, DocumentType::Markdown)?;

        let text = doc.source_info.content.clone();
        let (frontmatter, body) = split_frontmatter(&text);

        if let Some(fm) = frontmatter {
            if let Some(title) = fm_scalar(&fm, "title") {
                doc.metadata.title = title;
            }
            doc.metadata.tags = fm_list(&fm, "tags");
            doc.metadata.categories = fm_list(&fm, "categories");
            doc.metadata.frontmatter = Some(frontmatter_json(&fm));
        }

        if doc.metadata.title == file_stem(rel_path) {
            if let Some(heading) = first_heading(body) {
                doc.metadata.title = heading;
            }
        }

        for tag in inline_tags(body) {
            if !doc.metadata.tags.contains(&tag) {
                doc.metadata.tags.push(tag);
            }
        }

        doc.outgoing = extract_references(&doc.metadata, body);
        Some(doc)
    }
}

/// Split a leading `---` frontmatter block from the body. Returns the raw
/// frontmatter lines (without fences) and the remaining body.
fn split_frontmatter(text: &str) -> (Option<Vec<String>>, &str) {
    let rest = match text.strip_prefix("---\n") {
        Some(r) => r,
        None => return (None, text),
    };
    match rest.find("\n---") {
        Some(end) => {
            let fm = rest[..end].lines().map(|l| l.to_string()).collect();
            let body_start = rest[end + 4..].find('\n').map(|i| end + 5 + i).unwrap_or(rest.len());
            (Some(fm), &rest[body_start.min(rest.len())..])
        }
        None => (None, text),
    }
}

/// Scalar frontmatter value: `key: value`.
fn fm_scalar(lines: &[String], key: &str) -> Option<String> {
    let prefix = format!("{}:", key);
    lines.iter().find_map(|line| {
        line.strip_prefix(&prefix).map(|v| {
            v.trim().trim_matches('"').trim_matches('\'').to_string()
        })
    }).filter(|v| !v.is_empty())
}

/// List frontmatter value: inline `key: [a, b]` or a dash-list under the key.
fn fm_list(lines: &[String], key: &str) -> Vec<String> {
    let prefix = format!("{}:", key);
    let mut out = Vec::new();
    let mut in_block = false;
    for line in lines {
        if let Some(rest) = line.strip_prefix(&prefix) {
            let rest = rest.trim();
            if let Some(inline) = rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
                out.extend(
                    inline
                        .split(',')
                        .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
                        .filter(|s| !s.is_empty()),
                );
                return out;
            }
            in_block = rest.is_empty();
            continue;
        }
        if in_block {
            if let Some(item) = line.trim().strip_prefix("- ") {
                out.push(item.trim().trim_matches('"').to_string());
            } else if !line.starts_with(' ') && !line.starts_with('-') {
                in_block = false;
            }
        }
    }
    out
}

/// Raw frontmatter as a JSON object of string values, for storage.
fn frontmatter_json(lines: &[String]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            if !key.is_empty() && !line.starts_with(' ') && !line.starts_with('-') {
                map.insert(
                    key.to_string(),
                    serde_json::Value::String(value.trim().to_string()),
                );
            }
        }
    }
    serde_json::Value::Object(map)
}

fn first_heading(body: &str) -> Option<String> {
    body.lines().find_map(|line| {
        line.strip_prefix("# ")
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
    })
}

/// `[[target]]` and `[[target|alias]]` wiki-links.
fn wiki_links(body: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find("[[") {
        let after = &rest[start + 2..];
        match after.find("]]") {
            Some(end) => {
                let inner = &after[..end];
                let target = inner.split('|').next().unwrap_or(inner).trim();
                if !target.is_empty() {
                    out.push(target.to_string());
                }
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    out
}

/// Inline `#tag` tokens. Headings (`# `) and fenced code are skipped.
fn inline_tags(body: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut in_fence = false;
    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        for token in line.split_whitespace() {
            if let Some(tag) = token.strip_prefix('#') {
                let tag: String = tag
                    .chars()
                    .take_while(|c| c.is_alphanumeric() || *c == '-' || *c == '_' || *c == '/')
                    .collect();
                if !tag.is_empty() && !tag.chars().all(|c| c.is_numeric()) && !out.contains(&tag) {
                    out.push(tag);
                }
            }
        }
    }
    out
}

fn extract_references(
    metadata: &crate::models::DocumentMetadata,
    body: &str,
) -> Vec<DocumentReference> {
    let mut refs: Vec<DocumentReference> = wiki_links(body)
        .into_iter()
        .map(|target| DocumentReference {
            target,
            kind: RefKind::Link,
        })
        .collect();
    refs.extend(metadata.tags.iter().map(|t| DocumentReference {
        target: t.clone(),
        kind: RefKind::Tag,
    }));
    refs.extend(metadata.categories.iter().map(|c| DocumentReference {
        target: c.clone(),
        kind: RefKind::Category,
    }));
    refs
}

fn file_stem(rel_path: &str) -> String {
    std::path::Path::new(rel_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| rel_path.to_string())
}

#[cfg(test)]
mod tests {
    use super::super::test_util::open_vault;
    use super::*;

    #[tokio::test]
    async fn frontmatter_title_and_tags() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("note.md"),
            "---\ntitle: Project Plan\ntags: [planning, q3]\n---\n\nBody text with [[Other Note]] and #urgent flag.\n",
        )
        .unwrap();
        let vault = open_vault(dir.path());
        let doc = MarkdownLoader
            .read_by_path(&vault, "note.md", true)
            .await
            .unwrap();

        assert_eq!(doc.metadata.title, "Project Plan");
        assert!(doc.metadata.tags.contains(&"planning".to_string()));
        assert!(doc.metadata.tags.contains(&"urgent".to_string()));

        let links: Vec<&str> = doc
            .outgoing
            .iter()
            .filter(|r| r.kind == RefKind::Link)
            .map(|r| r.target.as_str())
            .collect();
        assert_eq!(links, vec!["Other Note"]);
    }

    #[tokio::test]
    async fn heading_fallback_title() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.md"), "# Actual Title\n\nbody\n").unwrap();
        let vault = open_vault(dir.path());
        let doc = MarkdownLoader.read_by_path(&vault, "x.md", true).await.unwrap();
        assert_eq!(doc.metadata.title, "Actual Title");
    }

    #[test]
    fn wiki_link_alias_resolves_to_target() {
        let links = wiki_links("see [[Target Note|the alias]] and [[Plain]]");
        assert_eq!(links, vec!["Target Note", "Plain"]);
    }

    #[test]
    fn tags_skip_code_fences_and_headings() {
        let body = "# Heading\n\n#real-tag here\n```\n#not-a-tag\n```\n";
        let tags = inline_tags(body);
        assert_eq!(tags, vec!["real-tag"]);
    }

    #[test]
    fn dash_list_frontmatter() {
        let lines: Vec<String> = vec![
            "tags:".to_string(),
            "  - alpha".to_string(),
            "  - beta".to_string(),
            "title: T".to_string(),
        ];
        assert_eq!(fm_list(&lines, "tags"), vec!["alpha", "beta"]);
    }
}
