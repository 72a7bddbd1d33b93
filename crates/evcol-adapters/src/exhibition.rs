use std::sync::Arc;

use async_trait::async_trait;
use evcol_core::{derive_is_free, Category, EventCandidate, RegionClassifier};
use evcol_storage::{FetchRequest, PageFetcher};
use scraper::Html;
use tracing::debug;

use crate::dates::{apply_date_range, parse_date_range};
use crate::{
    absolute_url, assign_region, first_attr, first_text, listing_url_for_page,
    required_listing_url, selector, AdapterContext, AdapterError, ListingPage, ParsedListing,
    SourceAdapter, SourceConfig, SourceKind,
};

const CARD: &str = "div.exhibit-card";
const TITLE_LINK: &str = "h3.exhibit-title a";
const IMAGE: &str = "img";
const PERIOD: &str = ".period";
const VENUE: &str = ".venue";
const PRICE: &str = ".price";
const HOST: &str = ".host";

/// Card-grid exhibition board. Serves both the `exhibition` and `art`
/// categories depending on the configured listing.
#[derive(Debug, Clone)]
pub struct ExhibitionBoardAdapter {
    source_id: String,
    category: Category,
    listing_url: String,
    referer: Option<String>,
    classifier: Arc<RegionClassifier>,
}

impl ExhibitionBoardAdapter {
    pub fn from_config(
        config: &SourceConfig,
        classifier: Arc<RegionClassifier>,
    ) -> Result<Self, AdapterError> {
        Ok(Self {
            source_id: config.source_id.clone(),
            category: config.category,
            listing_url: required_listing_url(config)?,
            referer: config.referer.clone(),
            classifier,
        })
    }

    pub fn parse_listing(
        &self,
        html: &str,
        base_url: &str,
        ctx: &AdapterContext,
    ) -> Result<ParsedListing, AdapterError> {
        let document = Html::parse_document(html);
        let card_sel = selector(CARD)?;
        let title_sel = selector(TITLE_LINK)?;
        let image_sel = selector(IMAGE)?;
        let period_sel = selector(PERIOD)?;
        let venue_sel = selector(VENUE)?;
        let price_sel = selector(PRICE)?;
        let host_sel = selector(HOST)?;

        let mut parsed = ParsedListing::default();
        for card in document.select(&card_sel) {
            parsed.listings_seen += 1;

            let (Some(title), Some(source_url)) = (
                first_text(&card, &title_sel),
                absolute_url(base_url, first_attr(&card, &title_sel, "href")),
            ) else {
                debug!(source_id = %self.source_id, "exhibit card missing title or link");
                continue;
            };

            let raw_period = first_text(&card, &period_sel).unwrap_or_default();
            let mut candidate =
                EventCandidate::new(&self.source_id, self.category, title, source_url, ctx.today);
            apply_date_range(
                &mut candidate,
                &raw_period,
                parse_date_range(&raw_period, ctx.today),
            );
            candidate.location = first_text(&card, &venue_sel).unwrap_or_default();
            candidate.image_url = absolute_url(base_url, first_attr(&card, &image_sel, "src"));
            candidate.organizer = first_text(&card, &host_sel);
            candidate.price = first_text(&card, &price_sel);
            candidate.is_free = Some(derive_is_free(candidate.price.as_deref()));
            assign_region(&mut candidate, None, &self.classifier);
            parsed.candidates.push(candidate);
        }
        Ok(parsed)
    }
}

#[async_trait]
impl SourceAdapter for ExhibitionBoardAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::ExhibitionHtml
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
        let request = FetchRequest::get(listing_url_for_page(&self.listing_url, page))
            .with_referer(self.referer.clone());
        let response = fetcher.fetch(&self.source_id, &request).await?;
        let parsed = self.parse_listing(&response.text(), &response.final_url, ctx)?;
        Ok(ListingPage::from_response(page, parsed, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{config, ctx, fixture};
    use chrono::NaiveDate;
    use evcol_core::{CandidateWarning, Region};

    const BASE: &str = "https://exhibition-board.example.kr/exhibits?page=1";

    fn adapter(category: Category) -> ExhibitionBoardAdapter {
        let config = config("exhibition-board", SourceKind::ExhibitionHtml, category);
        ExhibitionBoardAdapter::from_config(&config, Arc::new(RegionClassifier::default())).unwrap()
    }

    #[test]
    fn parses_exhibit_cards() {
        let parsed = adapter(Category::Exhibition)
            .parse_listing(&fixture("exhibition-board", "page1.html"), BASE, &ctx())
            .unwrap();
        assert_eq!(parsed.listings_seen, 3);
        assert_eq!(parsed.candidates.len(), 3);

        let first = &parsed.candidates[0];
        assert_eq!(first.title, "빛의 정원: 미디어아트 특별전");
        assert_eq!(first.category, Category::Exhibition);
        assert_eq!(
            first.source_url,
            "https://exhibition-board.example.kr/exhibits/2201"
        );
        assert_eq!(first.start_date, NaiveDate::from_ymd_opt(2025, 10, 3).unwrap());
        assert_eq!(first.end_date, NaiveDate::from_ymd_opt(2026, 1, 18));
        assert_eq!(first.region, Some(Region::Daegu));
        assert_eq!(first.organizer.as_deref(), Some("대구미술관"));
        assert_eq!(first.is_free, Some(false));

        let free = &parsed.candidates[1];
        assert_eq!(free.price.as_deref(), Some("무료"));
        assert_eq!(free.is_free, Some(true));
        assert_eq!(free.region, Some(Region::Jeju));
    }

    #[test]
    fn unknown_venue_is_flagged_not_dropped() {
        let parsed = adapter(Category::Art)
            .parse_listing(&fixture("exhibition-board", "page1.html"), BASE, &ctx())
            .unwrap();
        let last = &parsed.candidates[2];
        assert_eq!(last.category, Category::Art);
        assert_eq!(last.region, Some(Region::Nationwide));
        assert!(last
            .warnings
            .iter()
            .any(|w| matches!(w, CandidateWarning::RegionDefaulted { .. })));
    }

    #[test]
    fn cards_without_links_are_skipped_individually() {
        let html = r#"<div class="exhibit-card"><h3 class="exhibit-title">no link</h3></div>
            <div class="exhibit-card"><h3 class="exhibit-title"><a href="/exhibits/9">Solo Show</a></h3>
            <p class="period">2025.10.10 ~ 2025.10.20</p><p class="venue">광주 비엔날레전시관</p></div>"#;
        let parsed = adapter(Category::Art).parse_listing(html, BASE, &ctx()).unwrap();
        assert_eq!(parsed.listings_seen, 2);
        assert_eq!(parsed.candidates.len(), 1);
        assert_eq!(parsed.candidates[0].region, Some(Region::Gwangju));
    }
}
