//! Scrape pipeline: quote phase then author phase, each tracked independently.
//!
//! The orchestrator owns all task-record writes. Each phase returns its result or fails;
//! a failed phase is recorded as `FAILED` with its fault payload and the next phase still
//! runs. The final value always carries both a `quotes` and an `authors` key.

use std::sync::Mutex;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::{error, info};
use url::Url;

use crate::db::Store;
use crate::enrich::enrich_authors;
use crate::fetch::{PageSource, SessionFactory};
use crate::ingest::{ingest_batch, IngestStats};
use crate::models::{PhaseStatus, TaskPhases};
use crate::promote::promote_authors;
use crate::walker::PageWalker;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub source_url: Url,
    pub single_page: bool,
}

/// Final state of one run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub phases: TaskPhases,
    pub result: Value,
}

/// Remembers the last progress payload so a failing phase can report how far it got.
struct Progress<'a> {
    sink: &'a (dyn Fn(Value) + Send + Sync),
    last: Mutex<Value>,
}

impl<'a> Progress<'a> {
    fn new(sink: &'a (dyn Fn(Value) + Send + Sync)) -> Self {
        Self {
            sink,
            last: Mutex::new(Value::Null),
        }
    }

    fn push(&self, meta: Value) {
        if let Ok(mut last) = self.last.lock() {
            *last = meta.clone();
        }
        (self.sink)(meta);
    }

    fn fault(&self, err: &anyhow::Error) -> Value {
        let progress = self.last.lock().map(|l| l.clone()).unwrap_or(Value::Null);
        json!({ "error": format!("{:#}", err), "progress": progress })
    }
}

/// Runs both phases against a fresh session, closed again on every exit path.
pub async fn run_scrape(
    store: &Store,
    sessions: &dyn SessionFactory,
    task_id: i64,
    options: &PipelineOptions,
    on_progress: &(dyn Fn(Value) + Send + Sync),
) -> Result<PipelineOutcome> {
    let session = sessions.open().context("opening fetch session")?;
    run_pipeline(store, session.as_ref(), task_id, options, on_progress).await
}

pub async fn run_pipeline(
    store: &Store,
    source: &dyn PageSource,
    task_id: i64,
    options: &PipelineOptions,
    on_progress: &(dyn Fn(Value) + Send + Sync),
) -> Result<PipelineOutcome> {
    let progress = Progress::new(on_progress);

    let mut phases = TaskPhases::default().with_quote(PhaseStatus::InProgress);
    store.update_task_status(task_id, phases)?;
    info!(
        task_id,
        url = %options.source_url,
        single_page = options.single_page,
        "Quote phase started"
    );

    let quotes = match quote_phase(store, source, options, &progress).await {
        Ok(stats) => {
            phases = phases.with_quote(PhaseStatus::Success);
            serde_json::to_value(stats)?
        }
        Err(err) => {
            error!(task_id, "Quote phase failed: {:#}", err);
            phases = phases.with_quote(PhaseStatus::Failed);
            progress.fault(&err)
        }
    };

    phases = phases.with_author(PhaseStatus::InProgress);
    store.update_task_status(task_id, phases)?;
    info!(task_id, "Author phase started");

    let authors = match author_phase(store, source, &progress).await {
        Ok(report) => {
            phases = phases.with_author(PhaseStatus::Success);
            report
        }
        Err(err) => {
            error!(task_id, "Author phase failed: {:#}", err);
            phases = phases.with_author(PhaseStatus::Failed);
            progress.fault(&err)
        }
    };

    store.update_task_status(task_id, phases)?;
    info!(
        task_id,
        quote_phase = %phases.quote_phase,
        author_phase = %phases.author_phase,
        "Scrape finished"
    );

    Ok(PipelineOutcome {
        phases,
        result: json!({ "quotes": quotes, "authors": authors }),
    })
}

async fn quote_phase(
    store: &Store,
    source: &dyn PageSource,
    options: &PipelineOptions,
    progress: &Progress<'_>,
) -> Result<IngestStats> {
    progress.push(json!({"scraping": "quotes", "fetched_records": 0}));

    let mut walker = PageWalker::new(source, options.source_url.clone(), options.single_page);
    let mut stats = IngestStats::default();
    while let Some(page) = walker
        .next_page()
        .await
        .with_context(|| format!("fetching listing {}", options.source_url))?
    {
        stats.skipped += page.skipped;
        ingest_batch(store, &page.quotes, &mut stats).context("storing quotes")?;
        progress.push(json!({"scraping": "quotes", "fetched_records": stats.fetched_records}));
    }

    info!(pages = walker.pages_visited(), ?stats, "Quote phase done");
    Ok(stats)
}

/// Enrichment then promotion. Promotion runs even when enrichment fetched nothing, but
/// the phase only counts as a success if at least one eligible author was enriched.
async fn author_phase(
    store: &Store,
    source: &dyn PageSource,
    progress: &Progress<'_>,
) -> Result<Value> {
    let report = enrich_authors(store, source, |r| {
        progress.push(json!({
            "scraping": "authors",
            "fetched_records": r.fetched_records,
            "total": r.total,
        }))
    })
    .await
    .context("enriching authors")?;

    let promoted = promote_authors(store).context("promoting authors")?;
    info!(?report, ?promoted, "Author phase done");

    if report.all_failed() {
        anyhow::bail!("all {} author detail fetches failed", report.total);
    }

    Ok(json!({
        "fetched_records": report.fetched_records,
        "total": report.total,
        "failed": report.failed,
        "promoted": promoted,
    }))
}
