//! Festival portal: paged HTML listing plus per-festival detail pages.

use std::sync::Arc;

use async_trait::async_trait;
use evcol_core::{Category, EventCandidate, Region, RegionClassifier};
use evcol_storage::{FetchRequest, PageFetcher};
use scraper::Html;
use tracing::debug;

use crate::dates::{apply_date_range, parse_date_range};
use crate::{
    absolute_url, assign_region, element_text, first_attr, first_text, listing_url_for_page,
    required_listing_url, selector, AdapterContext, AdapterError, DetailFields, ListingPage,
    ParsedListing, SourceAdapter, SourceConfig, SourceKind,
};

const ITEM: &str = "ul.festival-list > li.item";
const TITLE: &str = ".title";
const LINK: &str = "a.item-link";
const IMAGE: &str = "img";
const DATE: &str = ".date";
const PLACE: &str = ".place";

const INFO_ROW: &str = "table tr";
const INFO_LABEL: &str = "th";
const INFO_LINK: &str = "td a[href]";
const HOMEPAGE_LABELS: [&str; 2] = ["홈페이지", "homepage"];
/// Detail content areas, most specific first.
const CONTENT_AREAS: [&str; 3] = [".festival-intro", ".detail-content", "#contents .txt"];

#[derive(Debug, Clone)]
pub struct FestivalPortalAdapter {
    source_id: String,
    category: Category,
    listing_url: String,
    referer: Option<String>,
    enrich_details: bool,
    classifier: Arc<RegionClassifier>,
}

impl FestivalPortalAdapter {
    pub fn from_config(
        config: &SourceConfig,
        classifier: Arc<RegionClassifier>,
    ) -> Result<Self, AdapterError> {
        Ok(Self {
            source_id: config.source_id.clone(),
            category: config.category,
            listing_url: required_listing_url(config)?,
            referer: config.referer.clone(),
            enrich_details: config.enrich_details,
            classifier,
        })
    }

    pub fn listing_request(&self, page: u32) -> FetchRequest {
        FetchRequest::get(listing_url_for_page(&self.listing_url, page))
            .with_referer(self.referer.clone())
    }

    pub fn parse_listing(
        &self,
        html: &str,
        base_url: &str,
        ctx: &AdapterContext,
    ) -> Result<ParsedListing, AdapterError> {
        let document = Html::parse_document(html);
        let item_sel = selector(ITEM)?;
        let title_sel = selector(TITLE)?;
        let link_sel = selector(LINK)?;
        let image_sel = selector(IMAGE)?;
        let date_sel = selector(DATE)?;
        let place_sel = selector(PLACE)?;

        let mut parsed = ParsedListing::default();
        for item in document.select(&item_sel) {
            parsed.listings_seen += 1;

            let Some(title) = first_text(&item, &title_sel) else {
                debug!(source_id = %self.source_id, "listing without title skipped");
                continue;
            };
            let Some(source_url) = absolute_url(base_url, first_attr(&item, &link_sel, "href"))
            else {
                debug!(source_id = %self.source_id, %title, "listing without link skipped");
                continue;
            };

            let raw_date = first_text(&item, &date_sel).unwrap_or_default();
            let mut candidate =
                EventCandidate::new(&self.source_id, self.category, title, source_url, ctx.today);
            apply_date_range(&mut candidate, &raw_date, parse_date_range(&raw_date, ctx.today));
            candidate.location = first_text(&item, &place_sel).unwrap_or_default();
            candidate.image_url = absolute_url(
                base_url,
                first_attr(&item, &image_sel, "data-src")
                    .or_else(|| first_attr(&item, &image_sel, "src")),
            );

            let area = item
                .value()
                .attr("data-area")
                .and_then(|code| code.parse::<Region>().ok());
            assign_region(&mut candidate, area, &self.classifier);
            parsed.candidates.push(candidate);
        }
        Ok(parsed)
    }
}

#[async_trait]
impl SourceAdapter for FestivalPortalAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::FestivalHtml
    }

    fn category(&self) -> Category {
        self.category
    }

    async fn fetch_page(
        &self,
        fetcher: &dyn PageFetcher,
        ctx: &AdapterContext,
        page: u32,
    ) -> Result<ListingPage, AdapterError> {
        let request = self.listing_request(page);
        let response = fetcher.fetch(&self.source_id, &request).await?;
        let parsed = self.parse_listing(&response.text(), &response.final_url, ctx)?;
        Ok(ListingPage::from_response(page, parsed, response))
    }

    fn supports_detail(&self) -> bool {
        self.enrich_details
    }

    fn detail_request(&self, source_url: &str) -> FetchRequest {
        FetchRequest::get(source_url).with_referer(self.referer.clone())
    }

    fn parse_detail(
        &self,
        body: &str,
        min_description_len: usize,
    ) -> Result<DetailFields, AdapterError> {
        let document = Html::parse_document(body);
        let row_sel = selector(INFO_ROW)?;
        let label_sel = selector(INFO_LABEL)?;
        let link_sel = selector(INFO_LINK)?;

        let website_url = document
            .select(&row_sel)
            .filter(|row| {
                first_text(row, &label_sel).is_some_and(|label| {
                    let label = label.to_lowercase();
                    HOMEPAGE_LABELS.iter().any(|l| label.contains(l))
                })
            })
            .filter_map(|row| first_attr(&row, &link_sel, "href"))
            .find(|href| href.starts_with("http://") || href.starts_with("https://"));

        let mut description = None;
        for css in CONTENT_AREAS {
            let sel = selector(css)?;
            if let Some(text) = document
                .select(&sel)
                .map(element_text)
                .find(|text| text.chars().count() > min_description_len)
            {
                description = Some(text);
                break;
            }
        }

        Ok(DetailFields {
            website_url,
            description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config, ctx, fixture};
    use chrono::NaiveDate;
    use evcol_core::CandidateWarning;

    const BASE: &str = "https://festival-portal.example.kr/list?page=1";

    fn adapter() -> FestivalPortalAdapter {
        let mut config = config("festival-portal", SourceKind::FestivalHtml, Category::Festival);
        config.enrich_details = true;
        FestivalPortalAdapter::from_config(&config, Arc::new(RegionClassifier::default())).unwrap()
    }

    #[test]
    fn parses_listing_fixture() {
        let parsed = adapter()
            .parse_listing(&fixture("festival-portal", "page1.html"), BASE, &ctx())
            .unwrap();
        assert_eq!(parsed.listings_seen, 4);
        assert_eq!(parsed.candidates.len(), 3, "untitled listing is skipped");

        let lantern = &parsed.candidates[0];
        assert_eq!(lantern.title, "서울빛초롱축제");
        assert_eq!(
            lantern.source_url,
            "https://festival-portal.example.kr/festival/detail?id=101"
        );
        assert_eq!(
            lantern.image_url.as_deref(),
            Some("https://festival-portal.example.kr/upload/101.jpg")
        );
        assert_eq!(lantern.start_date, NaiveDate::from_ymd_opt(2025, 11, 14).unwrap());
        assert_eq!(lantern.end_date, NaiveDate::from_ymd_opt(2025, 11, 30));
        assert_eq!(lantern.region, Some(Region::Seoul));
        assert!(lantern.warnings.is_empty());

        let fireworks = &parsed.candidates[1];
        assert_eq!(fireworks.region, Some(Region::Busan), "data-area wins");

        let undated = &parsed.candidates[2];
        assert_eq!(undated.start_date, ctx().today);
        assert!(matches!(
            undated.warnings.as_slice(),
            [CandidateWarning::DateDefaulted { .. }]
        ));
    }

    #[test]
    fn empty_listing_reports_zero_listings() {
        let parsed = adapter()
            .parse_listing(&fixture("festival-portal", "empty.html"), BASE, &ctx())
            .unwrap();
        assert_eq!(parsed.listings_seen, 0);
        assert!(parsed.candidates.is_empty());
    }

    #[test]
    fn listing_request_fills_page_and_referer() {
        let request = adapter().listing_request(3);
        assert_eq!(request.url, "https://festival-portal.example.kr/list?page=3");
        assert_eq!(
            request.referer.as_deref(),
            Some("https://festival-portal.example.kr/")
        );
    }

    #[test]
    fn detail_page_yields_homepage_and_long_description() {
        let detail = adapter()
            .parse_detail(&fixture("festival-portal", "detail.html"), 50)
            .unwrap();
        assert_eq!(detail.website_url.as_deref(), Some("https://www.seoullantern.example.kr"));
        let description = detail.description.unwrap();
        assert!(description.starts_with("서울빛초롱축제는"));
        assert!(description.chars().count() > 50);
    }

    #[test]
    fn detail_page_skips_short_blocks_and_relative_links() {
        let html = r#"<html><body>
            <table><tr><th>홈페이지</th><td><a href="/home">home</a></td></tr></table>
            <div class="festival-intro">짧은 소개</div>
            <div class="detail-content">두 번째 영역에는 충분히 긴 설명이 들어 있어서 최소 길이 기준을 넘깁니다. 축제 일정과 프로그램 안내가 포함됩니다.</div>
        </body></html>"#;
        let detail = adapter().parse_detail(html, 50).unwrap();
        assert_eq!(detail.website_url, None);
        assert!(detail.description.unwrap().starts_with("두 번째 영역"));
    }
}
