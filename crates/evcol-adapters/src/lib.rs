//! Source adapter contract, source registry and per-source implementations.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use evcol_core::{CandidateWarning, Category, EventCandidate, Region, RegionClassifier};
use evcol_storage::{FetchError, FetchRequest, FetchedResponse, PageFetcher, Url};
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod contest;
pub mod dates;
pub mod exhibition;
pub mod festival;
pub mod static_list;

pub use contest::ContestBoardAdapter;
pub use exhibition::ExhibitionBoardAdapter;
pub use festival::FestivalPortalAdapter;
pub use static_list::{SeedEntry, StaticListAdapter};

pub const CRATE_NAME: &str = "evcol-adapters";

/// Placeholder substituted with the page number in listing URL templates.
pub const PAGE_PLACEHOLDER: &str = "{page}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    FestivalHtml,
    ExhibitionHtml,
    ContestHybrid,
    StaticList,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub kind: SourceKind,
    pub category: Category,
    #[serde(default)]
    pub listing_url: Option<String>,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default)]
    pub enrich_details: bool,
    #[serde(default)]
    pub max_pages: Option<u32>,
    #[serde(default)]
    pub payload_delimiter: Option<String>,
    #[serde(default)]
    pub html_segment: Option<usize>,
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_enabled() -> bool {
    true
}

pub fn load_source_registry(path: impl AsRef<Path>) -> Result<SourceRegistry> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterContext {
    pub run_id: Uuid,
    pub fetched_at: DateTime<Utc>,
    /// Date substituted for listings whose date text cannot be parsed.
    pub today: NaiveDate,
}

impl AdapterContext {
    pub fn new(run_id: Uuid, fetched_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            fetched_at,
            today: fetched_at.date_naive(),
        }
    }
}

/// Candidates parsed out of one listing document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedListing {
    pub listings_seen: usize,
    pub candidates: Vec<EventCandidate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingPage {
    pub page: u32,
    pub url: Option<String>,
    pub listings_seen: usize,
    pub candidates: Vec<EventCandidate>,
    pub exhausted: bool,
    pub raw_body: Option<Vec<u8>>,
    pub content_type: Option<String>,
}

impl ListingPage {
    pub fn from_response(page: u32, parsed: ParsedListing, response: FetchedResponse) -> Self {
        Self {
            page,
            url: Some(response.final_url),
            listings_seen: parsed.listings_seen,
            exhausted: parsed.listings_seen == 0,
            candidates: parsed.candidates,
            raw_body: Some(response.body),
            content_type: response.content_type,
        }
    }

    pub fn exhausted(page: u32) -> Self {
        Self {
            page,
            url: None,
            listings_seen: 0,
            candidates: Vec::new(),
            exhausted: true,
            raw_body: None,
            content_type: None,
        }
    }
}

/// Supplementary fields scraped from a record's own detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailFields {
    pub website_url: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AdapterError {
    pub fn is_transport(&self) -> bool {
        matches!(self, AdapterError::Fetch(_))
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &str;
    fn kind(&self) -> SourceKind;
    fn category(&self) -> Category;

    /// Retrieves and parses one page of listings. `exhausted` is set when the
    /// page held no listings at all.
    async fn fetch_page(
        &self,
        fetcher: &dyn PageFetcher,
        ctx: &AdapterContext,
        page: u32,
    ) -> Result<ListingPage, AdapterError>;

    fn supports_detail(&self) -> bool {
        false
    }

    fn detail_request(&self, source_url: &str) -> FetchRequest {
        FetchRequest::get(source_url)
    }

    fn parse_detail(
        &self,
        _body: &str,
        _min_description_len: usize,
    ) -> Result<DetailFields, AdapterError> {
        Ok(DetailFields::default())
    }
}

pub fn adapter_for_source(
    config: &SourceConfig,
    base_dir: &Path,
    classifier: Arc<RegionClassifier>,
) -> Result<Box<dyn SourceAdapter>, AdapterError> {
    let adapter: Box<dyn SourceAdapter> = match config.kind {
        SourceKind::FestivalHtml => {
            Box::new(FestivalPortalAdapter::from_config(config, classifier)?)
        }
        SourceKind::ExhibitionHtml => {
            Box::new(ExhibitionBoardAdapter::from_config(config, classifier)?)
        }
        SourceKind::ContestHybrid => {
            Box::new(ContestBoardAdapter::from_config(config, classifier)?)
        }
        SourceKind::StaticList => {
            Box::new(StaticListAdapter::from_config(config, base_dir, classifier)?)
        }
    };
    Ok(adapter)
}

pub(crate) fn required_listing_url(config: &SourceConfig) -> Result<String, AdapterError> {
    let url = config
        .listing_url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| {
            AdapterError::Config(format!("source {} has no listing_url", config.source_id))
        })?;
    Url::parse(&url.replace(PAGE_PLACEHOLDER, "1")).map_err(|e| {
        AdapterError::Config(format!("source {} listing_url is invalid: {e}", config.source_id))
    })?;
    Ok(url)
}

pub(crate) fn listing_url_for_page(template: &str, page: u32) -> String {
    template.replace(PAGE_PLACEHOLDER, &page.to_string())
}

pub(crate) fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Parse(format!("selector `{css}`: {e}")))
}

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn text_or_none(value: &str) -> Option<String> {
    let cleaned = clean_text(value);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub(crate) fn first_text(element: &ElementRef<'_>, sel: &Selector) -> Option<String> {
    element
        .select(sel)
        .next()
        .and_then(|n| text_or_none(&element_text(n)))
}

pub(crate) fn first_attr(element: &ElementRef<'_>, sel: &Selector, attr: &str) -> Option<String> {
    element
        .select(sel)
        .next()
        .and_then(|n| n.value().attr(attr))
        .and_then(text_or_none)
}

/// Resolves `href` against `base`; absolute links pass through unchanged.
pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base_url = Url::parse(base).ok()?;
    base_url.join(href).ok().map(|u| u.to_string())
}

/// Fills the candidate's region from the source's own code when it has one,
/// otherwise from the classifier; a non-blank location that matched nothing
/// is flagged.
pub fn assign_region(
    candidate: &mut EventCandidate,
    source_region: Option<Region>,
    classifier: &RegionClassifier,
) {
    if let Some(region) = source_region {
        candidate.region = Some(region);
        return;
    }
    let region = classifier.classify(&candidate.location);
    if region.is_default() && !candidate.location.trim().is_empty() {
        candidate.warnings.push(CandidateWarning::RegionDefaulted {
            location: candidate.location.clone(),
        });
    }
    candidate.region = Some(region);
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    use chrono::TimeZone;

    use super::*;

    pub fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .expect("workspace root")
    }

    pub fn fixture(source_id: &str, name: &str) -> String {
        let path = workspace_root().join("fixtures").join(source_id).join(name);
        fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()))
    }

    pub fn ctx() -> AdapterContext {
        let fetched_at = Utc.with_ymd_and_hms(2025, 10, 1, 3, 0, 0).single().unwrap();
        AdapterContext::new(Uuid::nil(), fetched_at)
    }

    pub fn config(source_id: &str, kind: SourceKind, category: Category) -> SourceConfig {
        SourceConfig {
            source_id: source_id.to_string(),
            display_name: source_id.to_string(),
            enabled: true,
            kind,
            category,
            listing_url: Some(format!("https://{source_id}.example.kr/list?page={{page}}")),
            referer: Some(format!("https://{source_id}.example.kr/")),
            enrich_details: false,
            max_pages: None,
            payload_delimiter: None,
            html_segment: None,
            seed_file: None,
            notes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_context_serializes_with_its_run_id() {
        let ctx = test_support::ctx();
        let yaml = serde_yaml::to_string(&ctx).expect("serialize");
        assert!(yaml.contains("00000000-0000-0000-0000-000000000000"));
        let back: AdapterContext = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back, ctx);
    }

    #[test]
    fn absolute_url_resolves_relative_links() {
        assert_eq!(
            absolute_url(
                "https://festival.example.kr/festival/list?page=2",
                Some("/festival/detail?id=7".to_string())
            )
            .as_deref(),
            Some("https://festival.example.kr/festival/detail?id=7")
        );
        assert_eq!(
            absolute_url("https://a.example.kr/", Some("https://b.example.kr/x".to_string()))
                .as_deref(),
            Some("https://b.example.kr/x")
        );
        assert_eq!(absolute_url("https://a.example.kr/", Some("#top".to_string())), None);
        assert_eq!(absolute_url("https://a.example.kr/", None), None);
    }

    #[test]
    fn region_assignment_prefers_source_codes_and_flags_fallbacks() {
        let classifier = RegionClassifier::default();
        let date = NaiveDate::from_ymd_opt(2025, 10, 3).unwrap();

        let mut coded = EventCandidate::new("s", Category::Festival, "t", "u", date);
        coded.location = "서울".to_string();
        assign_region(&mut coded, Some(Region::Jeju), &classifier);
        assert_eq!(coded.region, Some(Region::Jeju));

        let mut unknown = EventCandidate::new("s", Category::Festival, "t", "u", date);
        unknown.location = "어딘가 공원".to_string();
        assign_region(&mut unknown, None, &classifier);
        assert_eq!(unknown.region, Some(Region::Nationwide));
        assert_eq!(unknown.warnings.len(), 1);

        let mut blank = EventCandidate::new("s", Category::Contest, "t", "u", date);
        assign_region(&mut blank, None, &classifier);
        assert_eq!(blank.region, Some(Region::Nationwide));
        assert!(blank.warnings.is_empty());
    }

    #[test]
    fn registry_requires_listing_urls_for_live_sources() {
        let mut config = test_support::config(
            "festival-portal",
            SourceKind::FestivalHtml,
            Category::Festival,
        );
        config.listing_url = None;
        let err = adapter_for_source(&config, Path::new("."), Arc::new(RegionClassifier::default()))
            .err()
            .expect("missing url must fail");
        assert!(matches!(err, AdapterError::Config(_)));
    }

    #[test]
    fn registry_yaml_parses_with_defaults() {
        let registry: SourceRegistry = serde_yaml::from_str(
            "sources:\n  - source_id: contest-board\n    display_name: Contest Board\n    kind: contest_hybrid\n    category: contest\n    listing_url: \"https://contest.example.kr/list.ajax?page={page}\"\n",
        )
        .unwrap();
        let source = &registry.sources[0];
        assert!(source.enabled);
        assert!(!source.enrich_details);
        assert_eq!(source.kind, SourceKind::ContestHybrid);
        assert_eq!(source.category, Category::Contest);
    }
}
