use std::time::Duration;

use super::net::RetryPolicy;
use super::types::Cli;

const SEARCH_URL: &str = "https://www.jobbank.gc.ca/jobsearch/jobsearch";
const DETAIL_BASE: &str = "https://www.jobbank.gc.ca/jobsearch/jobposting/";
const CONTACT_BASE: &str = "https://www.jobbank.gc.ca/jobsearch/jobpostingtfw/";
const RECOVERY_URL: &str = "https://account.live.com/ResetPassword.aspx";
const RECOVERY_REFERER: &str = "https://account.live.com/";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.6668.71 Safari/537.36";

const RECOVERY_DOMAINS: [&str; 6] = [
    "hotmail.com",
    "hotmail.ca",
    "outlook.com",
    "live.com",
    "live.ca",
    "msn.com",
];

const MAX_WORKERS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub search_url: String,
    pub detail_base: String,
    pub contact_base: String,
    pub recovery_url: String,
    pub recovery_referer: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            search_url: SEARCH_URL.to_string(),
            detail_base: DETAIL_BASE.to_string(),
            contact_base: CONTACT_BASE.to_string(),
            recovery_url: RECOVERY_URL.to_string(),
            recovery_referer: RECOVERY_REFERER.to_string(),
        }
    }
}

/// Listing filters sent with every search page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub age_days: u32,
    pub sort: String,
    pub province: String,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            age_days: 30,
            sort: "M".to_string(),
            province: "ON".to_string(),
        }
    }
}

/// Immutable run configuration. Built once and shared by `Arc` with every
/// component; nothing reads process-wide state after startup.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub endpoints: Endpoints,
    pub search: SearchParams,
    pub page_size: u64,
    pub max_pages: Option<u64>,
    pub workers: usize,
    pub retry: RetryPolicy,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub recovery_enabled: bool,
    pub recovery_domains: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            search: SearchParams::default(),
            page_size: 25,
            max_pages: None,
            workers: 5,
            retry: RetryPolicy::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(30),
            recovery_enabled: true,
            recovery_domains: RECOVERY_DOMAINS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl CrawlConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        let defaults = Self::default();
        Self {
            search: SearchParams {
                age_days: cli.age_days,
                sort: cli.sort.clone(),
                province: cli.province.clone(),
            },
            page_size: cli.page_size.max(1),
            max_pages: cli.max_pages,
            workers: sanitize_workers(cli.workers),
            retry: RetryPolicy {
                max_attempts: cli.retries.max(1),
                backoff_base: cli.backoff_base,
            },
            user_agent: cli
                .user_agent
                .clone()
                .filter(|ua| !ua.trim().is_empty())
                .unwrap_or(defaults.user_agent.clone()),
            request_timeout: Duration::from_secs(cli.timeout_secs.max(1)),
            recovery_enabled: !cli.skip_recovery,
            ..defaults
        }
    }

    /// Search results page `page` (1-based).
    pub fn listing_url(&self, page: u64) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("fage", &self.search.age_days.to_string())
            .append_pair("page", &page.to_string())
            .append_pair("sort", &self.search.sort)
            .append_pair("fprov", &self.search.province)
            .finish();
        format!("{}?{query}", self.endpoints.search_url)
    }

    /// Canonical detail URL; the only URL a record ever carries.
    pub fn detail_url(&self, job_id: &str) -> String {
        format!("{}{job_id}", self.endpoints.detail_base)
    }

    pub fn contact_url(&self, job_id: &str) -> String {
        format!("{}{job_id}", self.endpoints.contact_base)
    }

    pub fn recovery_url(&self, email: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("username", email)
            .finish();
        format!("{}?{query}", self.endpoints.recovery_url)
    }

    pub fn is_recovery_domain(&self, email: &str) -> bool {
        let Some((_, domain)) = email.trim().rsplit_once('@') else {
            return false;
        };
        self.recovery_domains
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(domain))
    }
}

fn sanitize_workers(value: usize) -> usize {
    value.clamp(1, MAX_WORKERS)
}
