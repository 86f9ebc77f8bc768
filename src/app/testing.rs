//! Scripted transport for tests.
//!
//! Responses are queued per URL. The last queued response for a URL is
//! sticky and answers every later call; unknown URLs get a 404. Latency can
//! be attached to URL prefixes, and the peak number of concurrent calls is
//! recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::error::{TransportError, TransportErrorKind};
use super::net::{HttpRequest, HttpResponse, HttpTransport};

type Scripted = Result<HttpResponse, TransportError>;

#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<HttpRequest>>,
    latencies: Mutex<Vec<(String, Duration)>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) -> &Self {
        self.push(
            url,
            Ok(HttpResponse {
                status,
                body: body.to_string(),
            }),
        )
    }

    pub fn fail(&self, url: &str, kind: TransportErrorKind, message: &str) -> &Self {
        self.push(url, Err(TransportError::new(kind, message)))
    }

    fn push(&self, url: &str, scripted: Scripted) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(scripted);
        self
    }

    /// Every call to a URL starting with `prefix` sleeps `delay` first.
    pub fn delay(&self, prefix: &str, delay: Duration) -> &Self {
        self.latencies
            .lock()
            .unwrap()
            .push((prefix.to_string(), delay));
        self
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn latency_for(&self, url: &str) -> Option<Duration> {
        self.latencies
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, delay)| *delay)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.url == url)
            .count()
    }

    pub fn calls_with_prefix(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.url.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.latency_for(&request.url) {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut routes = self.routes.lock().unwrap();
        let Some(queue) = routes.get_mut(&request.url) else {
            return Ok(HttpResponse {
                status: 404,
                body: String::new(),
            });
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }
}

/// Search results page with the given summary count and article ids.
pub fn listing_page(total: &str, ids: &[&str]) -> String {
    let articles = ids
        .iter()
        .map(|id| format!(r#"<article id="article-{id}"><a href="/jobsearch/jobposting/{id}">Posting {id}</a></article>"#))
        .collect::<String>();
    format!(
        r#"<html><body><div class="results-summary"><span class="found">{total}</span> jobs found</div><div id="results">{articles}</div></body></html>"#
    )
}

pub fn detail_page(title: &str) -> String {
    format!(
        r#"<html><body><h1 class="title"><span property="title">{title}</span></h1>
<span property="datePosted">Posted on March 3, 2024</span>
<span property="hiringOrganization"><a href="https://employer.test">Employer</a></span></body></html>"#
    )
}

pub fn apply_envelope(email: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><partial-response id="j_id1"><changes><update id="applynow"><![CDATA[<p>By email</p><a href="mailto:{email}">{email}</a>]]></update></changes></partial-response>"#
    )
}
