use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use super::config::CrawlConfig;
use super::contact::ContactResolver;
use super::detail::parse_detail;
use super::error::{CrawlError, PipelineError};
use super::listing::{extract_ids, extract_total, page_count};
use super::net::{Fetcher, HttpTransport};
use super::recovery::RecoveryResolver;
use super::types::{CrawlEvent, JobRecord};

/// Per-posting work: detail page, contact address, recovery lookup. The three
/// calls run in order inside one task.
#[derive(Clone)]
pub struct ItemPipeline {
    fetcher: Fetcher,
    contact: ContactResolver,
    recovery: RecoveryResolver,
    config: Arc<CrawlConfig>,
}

impl ItemPipeline {
    pub fn new(transport: Arc<dyn HttpTransport>, config: Arc<CrawlConfig>) -> Self {
        Self {
            fetcher: Fetcher::new(transport.clone(), config.clone()),
            contact: ContactResolver::new(transport.clone(), config.clone()),
            recovery: RecoveryResolver::new(transport, config.clone()),
            config,
        }
    }

    pub async fn run(&self, job_id: &str) -> Result<JobRecord, PipelineError> {
        let detail = self.fetcher.fetch(&self.config.detail_url(job_id)).await?;
        let posting = parse_detail(&self.config, job_id, &detail)?;
        let email = self.contact.resolve_email(job_id).await;
        let recovery_email = self.recovery.resolve_recovery(&email).await;

        Ok(JobRecord {
            posting,
            email,
            recovery_email,
        })
    }
}

/// Walks the listing pages in order and fans every posting out to a bounded
/// worker pool. Results reach `tx` in completion order.
///
/// Only a failed first page aborts the run. Every submitted task is joined
/// before `Finished` is sent.
pub async fn run_crawler(
    transport: Arc<dyn HttpTransport>,
    config: Arc<CrawlConfig>,
    tx: UnboundedSender<CrawlEvent>,
) -> Result<(), CrawlError> {
    let fetcher = Fetcher::new(transport.clone(), config.clone());
    let pipeline = ItemPipeline::new(transport, config.clone());

    let first_url = config.listing_url(1);
    let first_page = fetcher.fetch(&first_url).await.map_err(|err| {
        error!(url = %first_url, error = %err, "first listing page failed, aborting");
        CrawlError::FirstPage(err)
    })?;

    let total = extract_total(&first_page);
    let mut pages = page_count(total, config.page_size);
    if let Some(cap) = config.max_pages {
        pages = pages.min(cap);
    }
    info!(total, pages, workers = config.workers, "crawl planned");
    let _ = tx.send(CrawlEvent::Started { total, pages });

    let permits = Arc::new(Semaphore::new(config.workers.max(1)));
    let mut items = JoinSet::new();
    let mut first_page = Some(first_page);

    for page in 1..=pages {
        let html = match first_page.take() {
            Some(html) => html,
            None => match fetcher.fetch(&config.listing_url(page)).await {
                Ok(html) => html,
                Err(err) => {
                    warn!(page, error = %err, "listing page failed, skipping");
                    let _ = tx.send(CrawlEvent::PageFailed { page, error: err });
                    continue;
                }
            },
        };

        let ids = extract_ids(&html);
        debug!(page, discovered = ids.len(), "listing page parsed");
        let _ = tx.send(CrawlEvent::Page {
            page,
            discovered: ids.len(),
        });

        for job_id in ids {
            items.spawn(process_item(
                pipeline.clone(),
                permits.clone(),
                job_id,
                tx.clone(),
            ));
        }

        while let Some(joined) = items.try_join_next() {
            report_join(joined, &tx);
        }
    }

    while let Some(joined) = items.join_next().await {
        report_join(joined, &tx);
    }

    info!(pages, "crawl finished");
    let _ = tx.send(CrawlEvent::Finished);
    Ok(())
}

async fn process_item(
    pipeline: ItemPipeline,
    permits: Arc<Semaphore>,
    job_id: String,
    tx: UnboundedSender<CrawlEvent>,
) {
    // Closed only if the crawler is torn down.
    let Ok(_permit) = permits.acquire_owned().await else {
        return;
    };

    match pipeline.run(&job_id).await {
        Ok(record) => {
            debug!(job_id = %job_id, email = record.email.label(), "posting complete");
            let _ = tx.send(CrawlEvent::Record(Box::new(record)));
        }
        Err(err) => {
            warn!(job_id = %job_id, kind = err.label(), error = %err, "posting skipped");
            let _ = tx.send(CrawlEvent::ItemFailed { job_id, error: err });
        }
    }
}

fn report_join(joined: Result<(), JoinError>, tx: &UnboundedSender<CrawlEvent>) {
    if let Err(err) = joined {
        error!(error = %err, "posting worker panicked");
        let _ = tx.send(CrawlEvent::WorkerPanicked(err.to_string()));
    }
}
