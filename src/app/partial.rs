//! Jakarta Faces partial-request emulation for the "apply now" button.
//!
//! The server answers with a `<partial-response>` envelope whose `<update>`
//! elements carry re-rendered markup, usually inside CDATA sections.

use std::sync::Arc;

use super::config::CrawlConfig;
use super::error::FetchError;
use super::net::{HttpRequest, HttpTransport, classify_status, send_with_retry};

pub const UPDATE_REGION: &str = "applynow";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";
const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";
const UPDATE_OPEN: &str = "<update";
const UPDATE_CLOSE: &str = "</update>";

#[derive(Clone)]
pub struct FormPoster {
    transport: Arc<dyn HttpTransport>,
    config: Arc<CrawlConfig>,
}

impl FormPoster {
    pub fn new(transport: Arc<dyn HttpTransport>, config: Arc<CrawlConfig>) -> Self {
        Self { transport, config }
    }

    /// Posts the apply-now partial request and returns the markup of the
    /// `applynow` update region.
    pub async fn post(&self, job_id: &str) -> Result<String, FetchError> {
        let url = self.config.contact_url(job_id);
        let request = HttpRequest::post_form(url.as_str(), form_fields(job_id))
            .header("Content-Type", FORM_CONTENT_TYPE)
            .header("User-Agent", self.config.user_agent.as_str());

        let envelope = send_with_retry(
            self.transport.as_ref(),
            self.config.retry,
            &request,
            classify_status,
        )
        .await?;

        extract_update_region(&envelope, UPDATE_REGION).ok_or(FetchError::MissingUpdate {
            url,
            region: UPDATE_REGION,
        })
    }
}

/// Stateless view plus the control and regions the click executes/renders.
pub fn form_fields(job_id: &str) -> Vec<(String, String)> {
    [
        ("seekeractivity:jobid", job_id),
        ("seekeractivity_SUBMIT", "1"),
        ("jakarta.faces.ViewState", "stateless"),
        ("jakarta.faces.behavior.event", "action"),
        ("action", "applynowbutton"),
        ("jakarta.faces.partial.event", "click"),
        ("jakarta.faces.source", "seekeractivity"),
        ("jakarta.faces.partial.ajax", "true"),
        ("jakarta.faces.partial.execute", "jobid"),
        ("jakarta.faces.partial.render", "applynow markappliedgroup"),
        ("seekeractivity", "seekeractivity"),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect()
}

/// Text content of the first `<update id="{region}">` element, CDATA
/// unwrapped and entities decoded.
pub fn extract_update_region(xml: &str, region: &str) -> Option<String> {
    let mut start = 0usize;
    while let Some(open_rel) = xml[start..].find(UPDATE_OPEN) {
        let tag_start = start + open_rel;
        let after_name = tag_start + UPDATE_OPEN.len();
        let boundary = xml[after_name..].chars().next()?;
        if !(boundary.is_whitespace() || boundary == '>' || boundary == '/') {
            start = after_name;
            continue;
        }

        let tag_end = after_name + xml[after_name..].find('>')?;
        let tag = &xml[tag_start..tag_end];
        let self_closing = tag.ends_with('/');
        let matches = attribute_value(tag, "id") == Some(region);

        if self_closing {
            if matches {
                return Some(String::new());
            }
            start = tag_end + 1;
            continue;
        }

        let (content, next) = read_element_text(xml, tag_end + 1)?;
        if matches {
            return Some(content);
        }
        start = next;
    }
    None
}

/// Reads text up to the closing `</update>`, returning it with the offset
/// just past the closing tag.
fn read_element_text(xml: &str, from: usize) -> Option<(String, usize)> {
    let mut out = String::new();
    let mut pos = from;
    loop {
        let rest = &xml[pos..];
        if rest.starts_with(UPDATE_CLOSE) {
            return Some((out, pos + UPDATE_CLOSE.len()));
        }
        if let Some(cdata) = rest.strip_prefix(CDATA_OPEN) {
            let end = cdata.find(CDATA_CLOSE)?;
            out.push_str(&cdata[..end]);
            pos += CDATA_OPEN.len() + end + CDATA_CLOSE.len();
            continue;
        }
        if rest.is_empty() {
            return None;
        }

        // A stray '<' that opens neither CDATA nor the close tag is kept as text.
        let text_len = match rest.find('<') {
            Some(0) => 1,
            Some(idx) => idx,
            None => rest.len(),
        };
        out.push_str(&decode_entities(&rest[..text_len]));
        pos += text_len;
    }
}

fn attribute_value<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let mut search = 0usize;
    while let Some(rel) = tag[search..].find(name) {
        let idx = search + rel;
        search = idx + name.len();
        let preceded_by_space = tag[..idx]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        let rest = tag[search..].trim_start();
        let Some(rest) = rest.strip_prefix('=') else {
            continue;
        };
        if !preceded_by_space {
            continue;
        }
        let rest = rest.trim_start();
        let quote = rest.chars().next()?;
        if quote != '"' && quote != '\'' {
            continue;
        }
        let value = &rest[1..];
        let end = value.find(quote)?;
        return Some(&value[..end]);
    }
    None
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
