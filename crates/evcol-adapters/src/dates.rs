//! Date-range parsing for listing text such as `2025.10.03(금) ~ 10.12(일)`.

use chrono::{Datelike, NaiveDate};
use evcol_core::{CandidateWarning, EventCandidate};
use once_cell::sync::Lazy;
use regex::Regex;

static FULL_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})\s*[./\-년]\s*(\d{1,2})\s*[./\-월]\s*(\d{1,2})")
        .expect("valid full date regex")
});
static SHORT_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})\s*[./\-월]\s*(\d{1,2})").expect("valid short date regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
    /// The text held no usable start date and `start` is the fallback.
    pub defaulted: bool,
}

fn ymd(y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    md(y.parse().ok()?, m, d)
}

/// Parses the first full date as the start and either a second full date or
/// a year-less `month.day` after `~` as the end. Text without any full date
/// falls back to a year-less start in `today`'s year. Text with no date at
/// all yields `today` with `defaulted` set.
pub fn parse_date_range(text: &str, today: NaiveDate) -> DateRange {
    let defaulted = DateRange {
        start: today,
        end: None,
        defaulted: true,
    };

    let (start_match_end, start) = if FULL_DATE_RE.is_match(text) {
        let mut full = FULL_DATE_RE
            .captures_iter(text)
            .filter_map(|c| Some((c.get(0)?.end(), ymd(&c[1], &c[2], &c[3])?)));
        let Some((offset, start)) = full.next() else {
            return defaulted;
        };
        if let Some((_, end)) = full.next() {
            return DateRange {
                start,
                end: Some(end),
                defaulted: false,
            };
        }
        (offset, start)
    } else {
        let Some(found) = SHORT_DATE_RE
            .captures_iter(text)
            .find_map(|c| Some((c.get(0)?.end(), md(today.year(), &c[1], &c[2])?)))
        else {
            return defaulted;
        };
        found
    };

    DateRange {
        start,
        end: short_end_date(&text[start_match_end..], start),
        defaulted: false,
    }
}

fn md(year: i32, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, m.parse().ok()?, d.parse().ok()?)
}

fn short_end_date(rest: &str, start: NaiveDate) -> Option<NaiveDate> {
    let tilde = rest.find('~')?;
    let caps = SHORT_DATE_RE.captures(&rest[tilde..])?;
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    let same_year = NaiveDate::from_ymd_opt(start.year(), month, day)?;
    if same_year < start {
        NaiveDate::from_ymd_opt(start.year() + 1, month, day)
    } else {
        Some(same_year)
    }
}

/// Applies a parsed range to a candidate, recording the fallback warning.
pub fn apply_date_range(candidate: &mut EventCandidate, raw: &str, range: DateRange) {
    candidate.start_date = range.start;
    candidate.end_date = range.end;
    if range.defaulted {
        candidate.warnings.push(CandidateWarning::DateDefaulted {
            raw: raw.to_string(),
        });
    }
}
