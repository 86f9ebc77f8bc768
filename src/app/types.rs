use clap::{Parser, ValueEnum};
use serde::Serialize;

use super::error::{FetchError, PipelineError};

#[derive(Debug, Parser, Clone)]
#[command(
    name = "jobbank-harvest",
    version,
    about = "Job Bank crawler with employer contact resolution and live CSV/JSON output"
)]
pub struct Cli {
    #[arg(short, long, value_name = "FILE", default_value = "job_data.csv")]
    pub output: String,

    #[arg(long, value_enum, default_value_t = FileFormatArg::Csv)]
    pub format: FileFormatArg,

    #[arg(long, value_name = "CODE", default_value = "ON")]
    pub province: String,

    #[arg(long, value_name = "DAYS", default_value_t = 30)]
    pub age_days: u32,

    #[arg(long, value_name = "MODE", default_value = "M")]
    pub sort: String,

    #[arg(long, value_name = "N", default_value_t = 25)]
    pub page_size: u64,

    #[arg(long, value_name = "N")]
    pub max_pages: Option<u64>,

    #[arg(long, value_name = "N", default_value_t = 5)]
    pub workers: usize,

    #[arg(long, value_name = "N", default_value_t = 3)]
    pub retries: u32,

    #[arg(long, value_name = "BASE", default_value_t = 2)]
    pub backoff_base: u64,

    #[arg(long, value_name = "UA")]
    pub user_agent: Option<String>,

    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    #[arg(long, default_value_t = false)]
    pub skip_recovery: bool,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Copy, Clone, ValueEnum, PartialEq, Eq)]
pub enum FileFormatArg {
    Csv,
    Json,
    Jsonl,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataFormat {
    Csv,
    Json,
    JsonLines,
}

impl From<FileFormatArg> for DataFormat {
    fn from(value: FileFormatArg) -> Self {
        match value {
            FileFormatArg::Csv => DataFormat::Csv,
            FileFormatArg::Json => DataFormat::Json,
            FileFormatArg::Jsonl => DataFormat::JsonLines,
        }
    }
}

/// Employer contact address behind the "apply" action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "address", rename_all = "snake_case")]
pub enum EmailResolution {
    Found(String),
    NotFound,
    RequestFailed,
    NetworkError,
}

impl EmailResolution {
    pub fn address(&self) -> Option<&str> {
        match self {
            EmailResolution::Found(address) => Some(address),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EmailResolution::Found(_) => "found",
            EmailResolution::NotFound => "not_found",
            EmailResolution::RequestFailed => "request_failed",
            EmailResolution::NetworkError => "network_error",
        }
    }

    /// Value for the `email` column. Non-addresses keep the sentinels older
    /// exports used so downstream sheets keep working.
    pub fn column_value(&self) -> String {
        match self {
            EmailResolution::Found(address) => address.clone(),
            EmailResolution::NotFound => "Not found".to_string(),
            EmailResolution::RequestFailed => "Failed".to_string(),
            EmailResolution::NetworkError => "Error".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "address", rename_all = "snake_case")]
pub enum RecoveryEmailResolution {
    NotAttempted,
    Found(String),
    NotFound,
}

impl RecoveryEmailResolution {
    pub fn address(&self) -> Option<&str> {
        match self {
            RecoveryEmailResolution::Found(address) => Some(address),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecoveryEmailResolution::NotAttempted => "not_attempted",
            RecoveryEmailResolution::Found(_) => "found",
            RecoveryEmailResolution::NotFound => "not_found",
        }
    }
}

/// Everything read from a detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobPosting {
    pub id: String,
    pub url: String,
    pub title: String,
    pub posted_date: String,
    pub employer_name: String,
    pub employer_link: String,
    pub location: String,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workplace_info: Option<String>,
    pub salary: String,
    pub hours: String,
    pub employment_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commitments: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vacancies: Option<String>,
    pub source: String,
    pub lmia: bool,
}

/// One finished posting, built inside a single worker and written once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRecord {
    #[serde(flatten)]
    pub posting: JobPosting,
    pub email: EmailResolution,
    pub recovery_email: RecoveryEmailResolution,
}

pub const CSV_HEADERS: [&str; 20] = [
    "id",
    "url",
    "title",
    "posted_date",
    "employer_name",
    "employer_link",
    "location",
    "region",
    "workplace_info",
    "salary",
    "hours",
    "employment_type",
    "commitments",
    "vacancies",
    "source",
    "lmia",
    "email",
    "email_status",
    "recovery_email",
    "recovery_status",
];

impl JobRecord {
    /// Every column in `CSV_HEADERS` order. Legacy fields the page did not
    /// carry are empty.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let p = &self.posting;
        let values = [
            p.id.clone(),
            p.url.clone(),
            p.title.clone(),
            p.posted_date.clone(),
            p.employer_name.clone(),
            p.employer_link.clone(),
            p.location.clone(),
            p.region.clone(),
            p.workplace_info.clone().unwrap_or_default(),
            p.salary.clone(),
            p.hours.clone(),
            p.employment_type.clone(),
            p.commitments.clone().unwrap_or_default(),
            p.vacancies.clone().unwrap_or_default(),
            p.source.clone(),
            p.lmia.to_string(),
            self.email.column_value(),
            self.email.label().to_string(),
            self.recovery_email
                .address()
                .unwrap_or_default()
                .to_string(),
            self.recovery_email.label().to_string(),
        ];
        CSV_HEADERS.into_iter().zip(values).collect()
    }
}

#[derive(Debug)]
pub enum CrawlEvent {
    Started { total: u64, pages: u64 },
    Page { page: u64, discovered: usize },
    PageFailed { page: u64, error: FetchError },
    Record(Box<JobRecord>),
    ItemFailed { job_id: String, error: PipelineError },
    WorkerPanicked(String),
    Finished,
}

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CrawlSummary {
    pub total_listed: u64,
    pub pages_planned: u64,
    pub pages_crawled: u64,
    pub pages_failed: u64,
    pub discovered: usize,
    pub written: usize,
    pub fetch_failed: usize,
    pub parse_failed: usize,
    pub panicked: usize,
    pub emails_found: usize,
    pub recovery_found: usize,
    pub finished: bool,
}

impl CrawlSummary {
    pub fn failed(&self) -> usize {
        self.fetch_failed + self.parse_failed + self.panicked
    }
}
