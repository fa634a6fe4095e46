use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Identifies one generated wiki: repository plus the language it was
/// written in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub owner: String,
    pub repo: String,
    pub repo_type: String,
    pub language: String,
}

impl CacheKey {
    pub fn file_name(&self) -> String {
        format!(
            "deepwiki_cache_{}_{}_{}_{}.json",
            self.repo_type, self.owner, self.repo, self.language
        )
    }

    pub fn display_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRef {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub title: String,
    pub pages: Vec<PageRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WikiStructure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub sections: Vec<Section>,
}

impl WikiStructure {
    /// Page ids in reading order, each listed once.
    pub fn page_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.sections
            .iter()
            .flat_map(|section| section.pages.iter())
            .filter(|page| seen.insert(page.id.as_str()))
            .map(|page| page.id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiPage {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_paths: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_pages: Option<Vec<String>>,
}

/// A structure and the generated pages it was stored with, read together.
#[derive(Debug, Clone, PartialEq)]
pub struct WikiContents {
    pub structure: WikiStructure,
    pub pages: HashMap<String, WikiPage>,
}

/// Read-only access to generated wikis.
#[async_trait]
pub trait WikiCache: Send + Sync {
    async fn structure(&self, key: &CacheKey) -> Result<Option<WikiStructure>, CacheError>;

    async fn page(&self, key: &CacheKey, page_id: &str) -> Result<Option<WikiPage>, CacheError>;

    /// Structure plus every generated page from a single read, so a reader
    /// never mixes two versions of the same wiki.
    async fn contents(&self, key: &CacheKey) -> Result<Option<WikiContents>, CacheError>;
}

/// Reads the JSON files the wiki generator leaves under
/// `~/.adalflow/wikicache`.
#[derive(Debug, Clone)]
pub struct FileWikiCache {
    dir: PathBuf,
}

impl FileWikiCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn load(&self, key: &CacheKey) -> Result<Option<CacheFile>, CacheError> {
        let path = self.dir.join(key.file_name());
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "wiki cache file not found");
                return Ok(None);
            }
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        serde_json::from_str::<CacheFile>(&content)
            .map(Some)
            .map_err(|source| CacheError::Parse { path, source })
    }
}

#[async_trait]
impl WikiCache for FileWikiCache {
    async fn structure(&self, key: &CacheKey) -> Result<Option<WikiStructure>, CacheError> {
        Ok(self
            .load(key)
            .await?
            .and_then(|file| file.wiki_structure)
            .map(CachedStructure::into_structure))
    }

    async fn page(&self, key: &CacheKey, page_id: &str) -> Result<Option<WikiPage>, CacheError> {
        let Some(mut file) = self.load(key).await? else {
            return Ok(None);
        };
        Ok(file
            .generated_pages
            .remove(page_id)
            .map(|page| page.into_page(page_id)))
    }

    async fn contents(&self, key: &CacheKey) -> Result<Option<WikiContents>, CacheError> {
        let Some(file) = self.load(key).await? else {
            return Ok(None);
        };
        let Some(structure) = file.wiki_structure else {
            return Ok(None);
        };
        let pages = file
            .generated_pages
            .into_iter()
            .map(|(id, page)| {
                let page = page.into_page(&id);
                (id, page)
            })
            .collect();
        Ok(Some(WikiContents {
            structure: structure.into_structure(),
            pages,
        }))
    }
}

#[derive(Debug, Default, Deserialize)]
struct CacheFile {
    #[serde(default)]
    wiki_structure: Option<CachedStructure>,
    #[serde(default)]
    generated_pages: HashMap<String, CachedPage>,
}

#[derive(Debug, Default, Deserialize)]
struct CachedStructure {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    pages: Vec<CachedPage>,
    #[serde(default)]
    sections: Vec<CachedSection>,
    #[serde(default, rename = "rootSections")]
    root_sections: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CachedSection {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    pages: Vec<String>,
    #[serde(default)]
    subsections: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CachedPage {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default, alias = "filePaths")]
    file_paths: Option<Vec<String>>,
    #[serde(default)]
    importance: Option<String>,
    #[serde(default, alias = "relatedPages")]
    related_pages: Option<Vec<String>>,
}

impl CachedPage {
    fn into_page(self, fallback_id: &str) -> WikiPage {
        let id = if self.id.trim().is_empty() {
            fallback_id.to_string()
        } else {
            self.id
        };
        let title = if self.title.trim().is_empty() {
            id.clone()
        } else {
            self.title
        };
        WikiPage {
            id,
            title,
            content: self.content,
            file_paths: self.file_paths,
            importance: self.importance,
            related_pages: self.related_pages,
        }
    }
}

const UNSECTIONED_PAGES_TITLE: &str = "Pages";

impl CachedStructure {
    /// Flattens the section tree depth-first from the root sections, then
    /// any sections not reachable from them, then pages no section lists.
    fn into_structure(self) -> WikiStructure {
        let titles = self
            .pages
            .iter()
            .filter(|page| !page.id.is_empty())
            .map(|page| {
                let title = if page.title.trim().is_empty() {
                    page.id.clone()
                } else {
                    page.title.clone()
                };
                (page.id.clone(), title)
            })
            .collect::<HashMap<_, _>>();
        let by_id = self
            .sections
            .iter()
            .enumerate()
            .filter(|(_, section)| !section.id.is_empty())
            .map(|(index, section)| (section.id.as_str(), index))
            .collect::<HashMap<_, _>>();

        let mut visited = vec![false; self.sections.len()];
        let mut order = Vec::new();
        for root in &self.root_sections {
            if let Some(index) = by_id.get(root.as_str()) {
                visit_section(*index, &self.sections, &by_id, &mut visited, &mut order);
            }
        }
        for index in 0..self.sections.len() {
            visit_section(index, &self.sections, &by_id, &mut visited, &mut order);
        }

        let mut sections = order
            .into_iter()
            .map(|index| &self.sections[index])
            .map(|section| Section {
                title: section.title.clone(),
                pages: section
                    .pages
                    .iter()
                    .map(|page_id| PageRef {
                        id: page_id.clone(),
                        title: titles.get(page_id).cloned().unwrap_or_else(|| page_id.clone()),
                    })
                    .collect(),
            })
            .collect::<Vec<_>>();

        let listed = sections
            .iter()
            .flat_map(|section| section.pages.iter().map(|page| page.id.clone()))
            .collect::<HashSet<_>>();
        let unsectioned = self
            .pages
            .iter()
            .filter(|page| !page.id.is_empty() && !listed.contains(&page.id))
            .map(|page| PageRef {
                id: page.id.clone(),
                title: titles.get(&page.id).cloned().unwrap_or_else(|| page.id.clone()),
            })
            .collect::<Vec<_>>();
        if !unsectioned.is_empty() {
            sections.push(Section {
                title: UNSECTIONED_PAGES_TITLE.to_string(),
                pages: unsectioned,
            });
        }

        WikiStructure {
            id: self.id,
            title: self.title,
            description: self.description,
            sections,
        }
    }
}

fn visit_section(
    index: usize,
    sections: &[CachedSection],
    by_id: &HashMap<&str, usize>,
    visited: &mut [bool],
    order: &mut Vec<usize>,
) {
    if visited[index] {
        return;
    }
    visited[index] = true;
    order.push(index);
    for child in &sections[index].subsections {
        if let Some(child) = by_id.get(child.as_str()) {
            visit_section(*child, sections, by_id, visited, order);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn key() -> CacheKey {
        CacheKey {
            owner: "o".to_string(),
            repo: "r".to_string(),
            repo_type: "github".to_string(),
            language: "en".to_string(),
        }
    }

    fn write_cache(dir: &Path, value: serde_json::Value) {
        std::fs::write(dir.join(key().file_name()), value.to_string()).expect("write cache file");
    }

    #[test]
    fn file_name_follows_generator_convention() {
        assert_eq!(key().file_name(), "deepwiki_cache_github_o_r_en.json");
    }

    #[tokio::test]
    async fn missing_file_is_not_an_error() {
        let dir = tempdir().expect("tempdir");
        let cache = FileWikiCache::new(dir.path());
        assert_eq!(cache.structure(&key()).await.expect("structure"), None);
        assert_eq!(cache.page(&key(), "intro").await.expect("page"), None);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_parse_error() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join(key().file_name()), "{not json").expect("write");
        let cache = FileWikiCache::new(dir.path());
        let error = cache.structure(&key()).await.expect_err("parse failure");
        assert!(matches!(error, CacheError::Parse { .. }));
    }

    #[tokio::test]
    async fn structure_walks_root_sections_depth_first() {
        let dir = tempdir().expect("tempdir");
        write_cache(
            dir.path(),
            json!({
                "wiki_structure": {
                    "id": "wiki",
                    "title": "Widget Wiki",
                    "pages": [
                        { "id": "intro", "title": "Introduction" },
                        { "id": "setup", "title": "Setup" },
                        { "id": "api", "title": "API" },
                        { "id": "faq", "title": "FAQ" }
                    ],
                    "sections": [
                        { "id": "s-ref", "title": "Reference", "pages": ["api"] },
                        { "id": "s-start", "title": "Getting Started", "pages": ["intro"], "subsections": ["s-setup"] },
                        { "id": "s-setup", "title": "Installation", "pages": ["setup"] }
                    ],
                    "rootSections": ["s-start", "s-ref"]
                },
                "generated_pages": {}
            }),
        );
        let cache = FileWikiCache::new(dir.path());
        let structure = cache
            .structure(&key())
            .await
            .expect("structure")
            .expect("cached structure");

        let titles = structure
            .sections
            .iter()
            .map(|section| section.title.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            titles,
            vec!["Getting Started", "Installation", "Reference", "Pages"]
        );
        assert_eq!(structure.sections[0].pages[0].title, "Introduction");
        assert_eq!(structure.page_ids(), vec!["intro", "setup", "api", "faq"]);
        assert_eq!(structure.title.as_deref(), Some("Widget Wiki"));
        assert_eq!(structure.description, None);
    }

    #[tokio::test]
    async fn structure_without_roots_keeps_section_order_and_serializes_compactly() {
        let dir = tempdir().expect("tempdir");
        write_cache(
            dir.path(),
            json!({
                "wiki_structure": {
                    "sections": [{ "id": "s1", "title": "Overview", "pages": ["intro"] }]
                }
            }),
        );
        let cache = FileWikiCache::new(dir.path());
        let structure = cache
            .structure(&key())
            .await
            .expect("structure")
            .expect("cached structure");

        assert_eq!(
            serde_json::to_value(&structure).expect("serialize"),
            json!({ "sections": [{ "title": "Overview", "pages": [{ "id": "intro", "title": "intro" }] }] })
        );
    }

    #[tokio::test]
    async fn page_reads_generated_page_with_camel_case_fields() {
        let dir = tempdir().expect("tempdir");
        write_cache(
            dir.path(),
            json!({
                "generated_pages": {
                    "intro": {
                        "id": "intro",
                        "title": "Introduction",
                        "content": "# Widget",
                        "filePaths": ["README.md"],
                        "importance": "high",
                        "relatedPages": ["setup"]
                    },
                    "bare": { "content": "text only" }
                }
            }),
        );
        let cache = FileWikiCache::new(dir.path());

        let page = cache
            .page(&key(), "intro")
            .await
            .expect("page")
            .expect("cached page");
        assert_eq!(page.file_paths, Some(vec!["README.md".to_string()]));
        assert_eq!(page.related_pages, Some(vec!["setup".to_string()]));

        let bare = cache
            .page(&key(), "bare")
            .await
            .expect("page")
            .expect("cached page");
        assert_eq!(bare.id, "bare");
        assert_eq!(bare.title, "bare");
        assert_eq!(
            serde_json::to_value(&bare).expect("serialize"),
            json!({ "id": "bare", "title": "bare", "content": "text only" })
        );

        assert_eq!(cache.page(&key(), "missing").await.expect("page"), None);
    }

    #[tokio::test]
    async fn contents_reads_structure_and_pages_together() {
        let dir = tempdir().expect("tempdir");
        write_cache(
            dir.path(),
            json!({
                "wiki_structure": {
                    "sections": [{ "id": "s1", "title": "Overview", "pages": ["intro", "setup"] }]
                },
                "generated_pages": {
                    "intro": { "title": "Introduction", "content": "# Widget" },
                    "setup": { "id": "setup", "content": "cargo install widget" }
                }
            }),
        );
        let cache = FileWikiCache::new(dir.path());

        let contents = cache
            .contents(&key())
            .await
            .expect("contents")
            .expect("cached contents");
        assert_eq!(contents.structure.page_ids(), vec!["intro", "setup"]);
        assert_eq!(contents.pages.len(), 2);
        assert_eq!(contents.pages["intro"].id, "intro");
        assert_eq!(contents.pages["setup"].content, "cargo install widget");
    }

    #[tokio::test]
    async fn contents_without_structure_is_absent() {
        let dir = tempdir().expect("tempdir");
        write_cache(
            dir.path(),
            json!({ "generated_pages": { "intro": { "content": "orphan" } } }),
        );
        let cache = FileWikiCache::new(dir.path());
        assert_eq!(cache.contents(&key()).await.expect("contents"), None);
    }
}
