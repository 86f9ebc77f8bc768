use std::sync::Arc;

use scraper::Html;
use tracing::{debug, warn};

use super::config::CrawlConfig;
use super::error::FetchError;
use super::html::{element_text, selector};
use super::net::HttpTransport;
use super::partial::FormPoster;
use super::types::EmailResolution;

const MAILTO_ANCHOR: &str = r#"a[href^="mailto:"]"#;

#[derive(Clone)]
pub struct ContactResolver {
    poster: FormPoster,
}

impl ContactResolver {
    pub fn new(transport: Arc<dyn HttpTransport>, config: Arc<CrawlConfig>) -> Self {
        Self {
            poster: FormPoster::new(transport, config),
        }
    }

    pub async fn resolve_email(&self, job_id: &str) -> EmailResolution {
        match self.poster.post(job_id).await {
            Ok(fragment) => {
                let resolution = email_from_fragment(&fragment);
                debug!(job_id, outcome = resolution.label(), "contact resolved");
                resolution
            }
            Err(FetchError::MissingUpdate { .. }) => {
                warn!(job_id, "apply-now region missing from partial response");
                EmailResolution::NotFound
            }
            Err(FetchError::Status { status, .. }) => {
                debug!(job_id, status, "contact request rejected");
                EmailResolution::RequestFailed
            }
            Err(err @ (FetchError::RetriesExhausted { .. } | FetchError::Transport { .. })) => {
                debug!(job_id, error = %err, "contact request did not complete");
                EmailResolution::NetworkError
            }
        }
    }
}

/// First `mailto:` anchor in the apply-now markup. The anchor text is the
/// address; an empty anchor falls back to the href.
pub fn email_from_fragment(fragment: &str) -> EmailResolution {
    let Some(anchors) = selector(MAILTO_ANCHOR) else {
        return EmailResolution::NotFound;
    };
    let doc = Html::parse_fragment(fragment);
    let Some(anchor) = doc.select(&anchors).next() else {
        return EmailResolution::NotFound;
    };

    let text = element_text(anchor);
    if !text.is_empty() {
        return EmailResolution::Found(text);
    }

    anchor
        .value()
        .attr("href")
        .and_then(|href| href.strip_prefix("mailto:"))
        .and_then(|addr| addr.split('?').next())
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(|addr| EmailResolution::Found(addr.to_string()))
        .unwrap_or(EmailResolution::NotFound)
}
