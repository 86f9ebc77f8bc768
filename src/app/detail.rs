//! Job posting detail page parser.
//!
//! Detail pages are schema.org microdata annotated. Only the title is
//! required; every other field falls back to a documented default.

use chrono::NaiveDate;
use scraper::{ElementRef, Html};

use super::config::CrawlConfig;
use super::error::ParseError;
use super::html::{
    element_text, first_element, first_within, raw_text, selector, text_after, text_within,
};
use super::types::JobPosting;

pub const EMPLOYER_FALLBACK: &str = "Not available";

const TITLE: &str = r#"h1.title span[property="title"]"#;
const DATE_POSTED: &str = r#"span[property="datePosted"]"#;
const HIRING_ORGANIZATION: &str = r#"span[property="hiringOrganization"]"#;
const BRIEF_ITEMS: &str = "ul.job-posting-brief.colcount-lg-2 > li";
const LMIA_DISCLAIMER: &str = "div.disclaimer.tfw.col-md-12";
const POSTED_DATE_FORMAT: &str = "%B %d, %Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BriefItem {
    Location,
    WorkplaceInformation,
    Salary,
    TermsOfEmployment,
    SpecialCommitments,
    Vacancies,
    Source,
}

/// Label substrings in match order; the first hit decides the item.
const BRIEF_LABELS: [(&str, BriefItem); 7] = [
    ("Location", BriefItem::Location),
    ("Workplace information", BriefItem::WorkplaceInformation),
    ("Salary", BriefItem::Salary),
    ("Terms of employment", BriefItem::TermsOfEmployment),
    ("Special commitments", BriefItem::SpecialCommitments),
    ("vacancies", BriefItem::Vacancies),
    ("Source", BriefItem::Source),
];

pub fn parse_detail(
    config: &CrawlConfig,
    job_id: &str,
    html: &str,
) -> Result<JobPosting, ParseError> {
    let doc = Html::parse_document(html);

    let title = first_element(&doc, TITLE)
        .map(element_text)
        .ok_or_else(|| ParseError::MissingTitle {
            job_id: job_id.to_string(),
        })?;

    let posted_raw = first_element(&doc, DATE_POSTED)
        .map(element_text)
        .unwrap_or_default();
    let posted_date = normalize_posted_date(posted_raw.replace("Posted on", "").trim());

    let (employer_name, employer_link) = extract_employer(&doc);

    let mut posting = JobPosting {
        id: job_id.to_string(),
        url: config.detail_url(job_id),
        title,
        posted_date,
        employer_name,
        employer_link,
        location: String::new(),
        region: String::new(),
        workplace_info: None,
        salary: String::new(),
        hours: String::new(),
        employment_type: String::new(),
        commitments: None,
        vacancies: None,
        source: String::new(),
        lmia: first_element(&doc, LMIA_DISCLAIMER).is_some(),
    };

    if let Some(items) = selector(BRIEF_ITEMS) {
        for li in doc.select(&items) {
            apply_brief_item(&mut posting, li);
        }
    }

    Ok(posting)
}

/// "January 5, 2024" becomes "2024-01-05"; anything else is kept verbatim.
/// The month must be spelled out in full.
pub fn normalize_posted_date(raw: &str) -> String {
    match NaiveDate::parse_from_str(raw, POSTED_DATE_FORMAT) {
        Ok(date) if has_full_month_name(raw, date) => date.format("%Y-%m-%d").to_string(),
        _ => raw.to_string(),
    }
}

// chrono's %B also accepts the abbreviated form.
fn has_full_month_name(raw: &str, date: NaiveDate) -> bool {
    let month = date.format("%B ").to_string();
    raw.get(..month.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(&month))
}

fn extract_employer(doc: &Html) -> (String, String) {
    let Some(org) = first_element(doc, HIRING_ORGANIZATION) else {
        return (EMPLOYER_FALLBACK.to_string(), String::new());
    };

    match first_within(org, "a") {
        Some(anchor) => (
            element_text(anchor),
            anchor.value().attr("href").unwrap_or_default().trim().to_string(),
        ),
        None => {
            let name = element_text(org);
            if name.is_empty() {
                (EMPLOYER_FALLBACK.to_string(), String::new())
            } else {
                (name, String::new())
            }
        }
    }
}

fn classify_brief_item(label_text: &str) -> Option<BriefItem> {
    BRIEF_LABELS
        .iter()
        .find(|(label, _)| label_text.contains(label))
        .map(|(_, item)| *item)
}

fn apply_brief_item(posting: &mut JobPosting, li: ElementRef<'_>) {
    let Some(item) = classify_brief_item(&raw_text(li)) else {
        return;
    };

    match item {
        BriefItem::Location => {
            posting.location = text_within(li, r#"span[property="addressLocality"]"#);
            posting.region = text_within(li, r#"span[property="addressRegion"]"#);
        }
        BriefItem::WorkplaceInformation => {
            let info = first_within(li, "span.wb-inv")
                .and_then(text_after)
                .unwrap_or_default();
            posting.workplace_info = Some(info);
        }
        BriefItem::Salary => {
            posting.salary = text_within(li, r#"span[property="minValue"]"#);
            posting.hours = text_within(li, r#"span[property="workHours"]"#);
        }
        BriefItem::TermsOfEmployment => {
            posting.employment_type = text_within(li, r#"span[property="employmentType"]"#);
        }
        BriefItem::SpecialCommitments => {
            posting.commitments = Some(text_within(li, r#"span[property="specialCommitments"]"#));
        }
        BriefItem::Vacancies => {
            // Icon spans come first; the count is the first span with text.
            let count = selector("span")
                .and_then(|spans| li.select(&spans).map(element_text).find(|t| !t.is_empty()))
                .unwrap_or_default();
            posting.vacancies = Some(count);
        }
        BriefItem::Source => {
            posting.source = element_text(li).replace("Source", "").trim().to_string();
        }
    }
}
