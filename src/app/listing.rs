use scraper::Html;
use tracing::warn;

use super::html::{element_text, first_element, first_within, selector};

const ARTICLE_ID_PREFIX: &str = "article-";

/// Job ids from the `article-<digits>` result containers, in page order.
/// An empty page is not an error.
pub fn extract_ids(html: &str) -> Vec<String> {
    let Some(articles) = selector("article[id]") else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);

    doc.select(&articles)
        .filter_map(|el| el.value().attr("id"))
        .filter_map(|id| id.strip_prefix(ARTICLE_ID_PREFIX))
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .map(ToString::to_string)
        .collect()
}

/// Total result count from the results summary; 0 when it is missing.
pub fn extract_total(html: &str) -> u64 {
    let doc = Html::parse_document(html);
    let Some(summary) = first_element(&doc, "div.results-summary") else {
        return 0;
    };
    let Some(found) = first_within(summary, "span.found") else {
        return 0;
    };

    let text = element_text(found);
    let digits = text.replace(',', "");
    match digits.trim().parse::<u64>() {
        Ok(total) => total,
        Err(_) => {
            warn!(count = %text, "unreadable result count, treating as empty");
            0
        }
    }
}

pub fn page_count(total: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}
