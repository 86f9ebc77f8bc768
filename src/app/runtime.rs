use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::config::CrawlConfig;
use super::crawl::run_crawler;
use super::data_io::{OutputSink, detect_data_format};
use super::error::{CrawlError, PipelineError, SinkError};
use super::net::{HttpTransport, ReqwestTransport};
use super::types::{Cli, CrawlEvent, CrawlSummary, DataFormat};

fn handle_crawl_event(
    summary: &mut CrawlSummary,
    sink: &mut OutputSink,
    event: CrawlEvent,
) -> Result<(), SinkError> {
    match event {
        CrawlEvent::Started { total, pages } => {
            summary.total_listed = total;
            summary.pages_planned = pages;
        }
        CrawlEvent::Page { page, discovered } => {
            debug!(page, discovered, "page queued");
            summary.pages_crawled += 1;
            summary.discovered += discovered;
        }
        CrawlEvent::PageFailed { .. } => summary.pages_failed += 1,
        CrawlEvent::Record(record) => {
            sink.write_record(&record)?;
            sink.flush()?;
            summary.written += 1;
            if record.email.address().is_some() {
                summary.emails_found += 1;
            }
            if record.recovery_email.address().is_some() {
                summary.recovery_found += 1;
            }
        }
        CrawlEvent::ItemFailed { error, .. } => match error {
            PipelineError::Fetch(_) => summary.fetch_failed += 1,
            PipelineError::Parse(_) => summary.parse_failed += 1,
        },
        CrawlEvent::WorkerPanicked(_) => summary.panicked += 1,
        CrawlEvent::Finished => summary.finished = true,
    }

    Ok(())
}

pub async fn run(cli: Cli) -> Result<CrawlSummary, CrawlError> {
    let config = Arc::new(CrawlConfig::from_cli(&cli));
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(&config)?);
    let configured_format: DataFormat = cli.format.into();
    let output_format = detect_data_format(&cli.output, configured_format);
    let mut sink = OutputSink::new(&cli.output, output_format);

    info!(
        output = %cli.output,
        format = ?output_format,
        province = %config.search.province,
        workers = config.workers,
        recovery = config.recovery_enabled,
        "starting crawl"
    );
    execute(transport, config, &mut sink).await
}

/// Runs the crawler and drains its events into `sink` on this task, the
/// only writer. A sink failure stops the crawl.
pub async fn execute(
    transport: Arc<dyn HttpTransport>,
    config: Arc<CrawlConfig>,
    sink: &mut OutputSink,
) -> Result<CrawlSummary, CrawlError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<CrawlEvent>();
    let crawl_handle = tokio::spawn(run_crawler(transport, config, tx));

    let mut summary = CrawlSummary::default();
    while let Some(event) = rx.recv().await {
        if let Err(err) = handle_crawl_event(&mut summary, sink, event) {
            error!(error = %err, "output failed, stopping crawl");
            crawl_handle.abort();
            return Err(err.into());
        }
    }
    sink.finalize()?;

    match crawl_handle.await {
        Ok(result) => result?,
        Err(err) => return Err(CrawlError::Join(err.to_string())),
    }
    Ok(summary)
}
