//! File-backed `KnowledgeStore` (spec §4.2).
//!
//! Directory layout: `{root}/{auto|manual}/{category}/{slug}.md`. Reads
//! prefer the manual side; `writeAuto` silently no-ops when a manual
//! file already occupies the same `(category, slug)` key, honoring I5.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use super::front_matter::FrontMatter;
use super::types::{KnowledgeCategory, KnowledgeItem, KnowledgeSource};
use crate::error::{CoreError, CoreResult};

pub struct KnowledgeStore {
    root: PathBuf,
}

impl KnowledgeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, source: KnowledgeSource, category: KnowledgeCategory, slug: &str) -> PathBuf {
        self.root
            .join(source.as_str())
            .join(category.as_str())
            .join(format!("{slug}.md"))
    }

    async fn read_item(&self, path: &Path, slug: &str) -> CoreResult<Option<KnowledgeItem>> {
        match fs::read_to_string(path).await {
            Ok(raw) => {
                let (fm, body) = FrontMatter::parse_document(&raw)?;
                Ok(KnowledgeItem::from_front_matter(fm, body, slug))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_item(&self, path: &Path, item: &KnowledgeItem) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, item.render()).await?;
        Ok(())
    }

    /// Write an auto-generated item, unless a manual item already owns
    /// this `(category, slug)` key.
    pub async fn write_auto(&self, mut item: KnowledgeItem) -> CoreResult<bool> {
        let manual_path = self.path_for(KnowledgeSource::Manual, item.category, &item.slug);
        if fs::try_exists(&manual_path).await.unwrap_or(false) {
            debug!(slug = %item.slug, "writeAuto skipped: manual item exists");
            return Ok(false);
        }
        item.source = KnowledgeSource::Auto;
        let path = self.path_for(KnowledgeSource::Auto, item.category, &item.slug);
        self.write_item(&path, &item).await?;
        info!(slug = %item.slug, category = item.category.as_str(), "wrote auto knowledge item");
        Ok(true)
    }

    /// Write a manual item; always wins over any existing auto item on
    /// read, though the auto file itself is left untouched.
    pub async fn write_manual(&self, mut item: KnowledgeItem) -> CoreResult<()> {
        item.source = KnowledgeSource::Manual;
        item.manual_edited = true;
        let path = self.path_for(KnowledgeSource::Manual, item.category, &item.slug);
        self.write_item(&path, &item).await?;
        info!(slug = %item.slug, category = item.category.as_str(), "wrote manual knowledge item");
        Ok(())
    }

    /// Read an item, preferring the manual side.
    pub async fn read(
        &self,
        category: KnowledgeCategory,
        slug: &str,
    ) -> CoreResult<Option<KnowledgeItem>> {
        let manual_path = self.path_for(KnowledgeSource::Manual, category, slug);
        if let Some(item) = self.read_item(&manual_path, slug).await? {
            return Ok(Some(item));
        }
        let auto_path = self.path_for(KnowledgeSource::Auto, category, slug);
        self.read_item(&auto_path, slug).await
    }

    /// Flip `reflector_can_update` on the item at `path` (auto or
    /// manual); honored by the consolidation loop, not enforced here.
    pub async fn lock(&self, category: KnowledgeCategory, slug: &str, locked: bool) -> CoreResult<()> {
        for source in [KnowledgeSource::Manual, KnowledgeSource::Auto] {
            let path = self.path_for(source, category, slug);
            if let Some(mut item) = self.read_item(&path, slug).await? {
                item.reflector_can_update = !locked;
                self.write_item(&path, &item).await?;
                return Ok(());
            }
        }
        Err(CoreError::not_found(format!(
            "knowledge item {}/{slug}",
            category.as_str()
        )))
    }

    /// Atomically move an auto item to manual (copy+delete), switching
    /// its `source` field.
    pub async fn promote_to_manual(&self, category: KnowledgeCategory, slug: &str) -> CoreResult<()> {
        let auto_path = self.path_for(KnowledgeSource::Auto, category, slug);
        let mut item = self
            .read_item(&auto_path, slug)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("auto knowledge item {}/{slug}", category.as_str())))?;
        item.source = KnowledgeSource::Manual;
        let manual_path = self.path_for(KnowledgeSource::Manual, category, slug);
        self.write_item(&manual_path, &item).await?;
        fs::remove_file(&auto_path).await?;
        info!(slug = %slug, category = category.as_str(), "promoted auto item to manual");
        Ok(())
    }

    /// Delete an item on one side only; never touches the other.
    pub async fn delete(
        &self,
        source: KnowledgeSource,
        category: KnowledgeCategory,
        slug: &str,
    ) -> CoreResult<()> {
        let path = self.path_for(source, category, slug);
        fs::remove_file(&path)
            .await
            .map_err(|e| if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::not_found(format!("knowledge item {}/{slug}", category.as_str()))
            } else {
                e.into()
            })
    }

    async fn all_items(&self) -> CoreResult<Vec<KnowledgeItem>> {
        let mut items = Vec::new();
        for source in [KnowledgeSource::Manual, KnowledgeSource::Auto] {
            let source_dir = self.root.join(source.as_str());
            if !fs::try_exists(&source_dir).await.unwrap_or(false) {
                continue;
            }
            let mut cat_entries = fs::read_dir(&source_dir).await?;
            while let Some(cat_entry) = cat_entries.next_entry().await? {
                let Some(category) = cat_entry
                    .file_name()
                    .to_str()
                    .and_then(KnowledgeCategory::parse)
                else {
                    continue;
                };
                let mut file_entries = fs::read_dir(cat_entry.path()).await?;
                while let Some(file_entry) = file_entries.next_entry().await? {
                    let path = file_entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("md") {
                        continue;
                    }
                    let Some(slug) = path.file_stem().and_then(|s| s.to_str()) else {
                        continue;
                    };
                    if let Some(item) = self.read_item(&path, slug).await? {
                        items.push(item);
                    }
                }
            }
        }
        Ok(items)
    }

    /// Substring match on slug or title, stable order.
    pub async fn search_by_filename(&self, query: &str) -> CoreResult<Vec<KnowledgeItem>> {
        let query_lower = query.to_lowercase();
        let mut items = self.all_items().await?;
        items.retain(|item| {
            item.slug.to_lowercase().contains(&query_lower)
                || item.title.to_lowercase().contains(&query_lower)
        });
        items.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(items)
    }

    /// Weighted content search; returns items sorted by descending
    /// score, ties broken by slug for determinism.
    pub async fn search_by_content(&self, query: &str) -> CoreResult<Vec<(KnowledgeItem, u32)>> {
        let items = self.all_items().await?;
        let mut scored: Vec<(KnowledgeItem, u32)> = items
            .into_iter()
            .map(|item| {
                let score = item.score_for_term(query);
                (item, score)
            })
            .filter(|(_, score)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.slug.cmp(&b.0.slug)));
        Ok(scored)
    }

    pub async fn list(&self) -> CoreResult<Vec<KnowledgeItem>> {
        self.all_items().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(category: KnowledgeCategory, slug: &str, title: &str) -> KnowledgeItem {
        KnowledgeItem::new(category, slug, KnowledgeSource::Auto, title, "body text retry")
    }

    #[tokio::test]
    async fn write_auto_then_promote_switches_source() {
        let dir = tempdir().unwrap();
        let store = KnowledgeStore::new(dir.path());
        let item = sample(KnowledgeCategory::Pits, "flaky-retry", "Flaky retry loop");
        store.write_auto(item).await.unwrap();

        let read = store
            .read(KnowledgeCategory::Pits, "flaky-retry")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.source, KnowledgeSource::Auto);

        store
            .promote_to_manual(KnowledgeCategory::Pits, "flaky-retry")
            .await
            .unwrap();

        let read = store
            .read(KnowledgeCategory::Pits, "flaky-retry")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.source, KnowledgeSource::Manual);

        let auto_path = store.path_for(KnowledgeSource::Auto, KnowledgeCategory::Pits, "flaky-retry");
        assert!(!fs::try_exists(&auto_path).await.unwrap());
    }

    #[tokio::test]
    async fn write_auto_skips_when_manual_exists() {
        let dir = tempdir().unwrap();
        let store = KnowledgeStore::new(dir.path());
        let manual = KnowledgeItem::new(
            KnowledgeCategory::Decisions,
            "use-axum",
            KnowledgeSource::Manual,
            "Use axum",
            "decided",
        );
        store.write_manual(manual).await.unwrap();

        let auto = sample(KnowledgeCategory::Decisions, "use-axum", "Use axum (auto)");
        let wrote = store.write_auto(auto).await.unwrap();
        assert!(!wrote);

        let read = store
            .read(KnowledgeCategory::Decisions, "use-axum")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.source, KnowledgeSource::Manual);
        assert_eq!(read.title, "Use axum");
    }

    #[tokio::test]
    async fn search_by_content_scores_title_highest() {
        let dir = tempdir().unwrap();
        let store = KnowledgeStore::new(dir.path());
        store
            .write_auto(sample(KnowledgeCategory::Patterns, "retry-pattern", "retry backoff"))
            .await
            .unwrap();
        store
            .write_auto(sample(KnowledgeCategory::Patterns, "other", "unrelated"))
            .await
            .unwrap();

        let results = store.search_by_content("retry").await.unwrap();
        assert_eq!(results[0].0.slug, "retry-pattern");
        assert!(results[0].1 >= 10);
    }

    #[tokio::test]
    async fn delete_is_scoped_to_one_side() {
        let dir = tempdir().unwrap();
        let store = KnowledgeStore::new(dir.path());
        store
            .write_auto(sample(KnowledgeCategory::Solutions, "s1", "Solution one"))
            .await
            .unwrap();
        store
            .write_manual(KnowledgeItem::new(
                KnowledgeCategory::Solutions,
                "s1",
                KnowledgeSource::Manual,
                "Solution one (manual)",
                "manual body",
            ))
            .await
            .unwrap();

        store
            .delete(KnowledgeSource::Auto, KnowledgeCategory::Solutions, "s1")
            .await
            .unwrap();

        let read = store
            .read(KnowledgeCategory::Solutions, "s1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.source, KnowledgeSource::Manual);
    }
}
