//! Hand-curated seed lists for categories with no live source.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use evcol_core::{Category, EventCandidate, Region, RegionClassifier};
use evcol_storage::PageFetcher;
use serde::Deserialize;

use crate::{
    assign_region, clean_text, AdapterContext, AdapterError, ListingPage, SourceAdapter,
    SourceConfig, SourceKind,
};

#[derive(Debug, Clone, Deserialize)]
struct SeedFile {
    entries: Vec<SeedEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SeedEntry {
    pub title: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub region: Option<Region>,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub organizer: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub is_free: Option<bool>,
}

/// Stand-in identity for seed entries that have no page of their own.
pub fn seed_key(source_id: &str, start_date: NaiveDate, title: &str) -> String {
    let slug = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_lowercase().next().unwrap_or(c) } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    format!("seed:{source_id}:{start_date}:{slug}")
}

#[derive(Debug, Clone)]
pub struct StaticListAdapter {
    source_id: String,
    category: Category,
    entries: Vec<SeedEntry>,
    classifier: Arc<RegionClassifier>,
}

impl StaticListAdapter {
    pub fn new(
        source_id: impl Into<String>,
        category: Category,
        entries: Vec<SeedEntry>,
        classifier: Arc<RegionClassifier>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            category,
            entries,
            classifier,
        }
    }

    /// Loads `seed_file`, resolved against `base_dir` when relative.
    pub fn from_config(
        config: &SourceConfig,
        base_dir: &Path,
        classifier: Arc<RegionClassifier>,
    ) -> Result<Self, AdapterError> {
        let seed_file = config.seed_file.as_ref().ok_or_else(|| {
            AdapterError::Config(format!("source {} has no seed_file", config.source_id))
        })?;
        let path = base_dir.join(seed_file);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading seed file {}", path.display()))?;
        let seeds: SeedFile = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing seed file {}", path.display()))?;
        Ok(Self::new(
            config.source_id.clone(),
            config.category,
            seeds.entries,
            classifier,
        ))
    }

    pub fn candidates(&self) -> Vec<EventCandidate> {
        self.entries
            .iter()
            .map(|entry| {
                let title = clean_text(&entry.title);
                let source_url = entry
                    .source_url
                    .clone()
                    .filter(|u| !u.trim().is_empty())
                    .unwrap_or_else(|| seed_key(&self.source_id, entry.start_date, &title));
                let mut candidate = EventCandidate::new(
                    &self.source_id,
                    self.category,
                    title,
                    source_url,
                    entry.start_date,
                );
                candidate.end_date = entry.end_date;
                candidate.location = clean_text(&entry.location);
                candidate.image_url = entry.image_url.clone();
                candidate.description = entry.description.clone();
                candidate.organizer = entry.organizer.clone();
                candidate.price = entry.price.clone();
                candidate.is_free = entry.is_free;
                assign_region(&mut candidate, entry.region, &self.classifier);
                candidate
            })
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for StaticListAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::StaticList
    }

    fn category(&self) -> Category {
        self.category
    }

    async fn fetch_page(
        &self,
        _fetcher: &dyn PageFetcher,
        _ctx: &AdapterContext,
        page: u32,
    ) -> Result<ListingPage, AdapterError> {
        if page > 1 {
            return Ok(ListingPage::exhausted(page));
        }
        let candidates = self.candidates();
        Ok(ListingPage {
            page,
            url: None,
            listings_seen: candidates.len(),
            candidates,
            exhausted: true,
            raw_body: None,
            content_type: None,
        })
    }
}
