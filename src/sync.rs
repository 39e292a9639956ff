use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::error::{CheckpointError, SinkError, SyncError};
use crate::filter::{ArticleFilter, SkipReason};
use crate::metrics::MetricsReporter;
use crate::model::Article;
use crate::pinboard::{Bookmark, BookmarkSink};
use crate::reader::{DocumentSource, ListQuery, Location};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    CheckpointLoaded,
    Fetching,
    Processing,
    Reporting,
    Checkpointing,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::CheckpointLoaded => "checkpoint_loaded",
            Phase::Fetching => "fetching",
            Phase::Processing => "processing",
            Phase::Reporting => "reporting",
            Phase::Checkpointing => "checkpointing",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// What to do when no checkpoint has ever been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPolicy {
    /// Fetch the whole archive.
    FullHistory,
    /// Stop without touching anything.
    Abort,
}

/// How the next checkpoint is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkMode {
    /// Newest `updated_at` seen, never moving backwards. The safety margin
    /// widens the next query; documents at or before the mark are dropped.
    #[default]
    Data,
    /// Time of the checkpoint write.
    WallClock,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub bootstrap: BootstrapPolicy,
    pub watermark: WatermarkMode,
    pub safety_margin: Duration,
    /// Minimum spacing between two sink calls.
    pub publish_interval: std::time::Duration,
    pub dry_run: bool,
}

impl SyncOptions {
    pub fn new(bootstrap: BootstrapPolicy) -> Self {
        Self {
            bootstrap,
            watermark: WatermarkMode::default(),
            safety_margin: Duration::zero(),
            publish_interval: crate::pinboard::MIN_PUBLISH_INTERVAL,
            dry_run: false,
        }
    }
}

pub enum ItemOutcome {
    Archived,
    Skipped(SkipReason),
    Rejected(SinkError),
    DryRun,
}

impl ItemOutcome {
    pub fn record(self, title: &str, report: &mut SyncReport) {
        match self {
            ItemOutcome::Archived => {
                report.eligible_count += 1;
                report.archived_count += 1;
            }
            ItemOutcome::Skipped(reason) => report.skipped.push((title.to_string(), reason)),
            ItemOutcome::Rejected(e) => {
                report.eligible_count += 1;
                report.rejected.push((title.to_string(), e.to_string()));
            }
            ItemOutcome::DryRun => report.eligible_count += 1,
        }
    }
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub read_count: usize,
    pub eligible_count: usize,
    pub archived_count: usize,
    pub skipped: Vec<(String, SkipReason)>,
    pub rejected: Vec<(String, String)>,
    pub metrics_status: Option<u16>,
    pub checkpoint: Option<Checkpoint>,
}

/// One incremental run: checkpoint, fetch, filter and publish, report, checkpoint.
pub struct Syncer {
    source: Arc<dyn DocumentSource>,
    sink: Arc<dyn BookmarkSink>,
    metrics: Arc<dyn MetricsReporter>,
    store: Arc<dyn CheckpointStore>,
    filter: ArticleFilter,
    options: SyncOptions,
    clock: Clock,
}

impl Syncer {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        sink: Arc<dyn BookmarkSink>,
        metrics: Arc<dyn MetricsReporter>,
        store: Arc<dyn CheckpointStore>,
        filter: ArticleFilter,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            sink,
            metrics,
            store,
            filter,
            options,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let started_at = (self.clock)();
        tracing::info!(phase = %Phase::Init, dry_run = self.options.dry_run, "sync run starting");

        let previous = self.load_checkpoint().await?;
        tracing::info!(
            phase = %Phase::CheckpointLoaded,
            checkpoint = previous.as_ref().map(|c| c.as_str()).unwrap_or(""),
            "checkpoint loaded"
        );

        let mark = match self.options.watermark {
            WatermarkMode::Data => previous.as_ref().and_then(Checkpoint::to_datetime),
            WatermarkMode::WallClock => None,
        };
        let query = ListQuery {
            updated_after: self.updated_after(previous.as_ref(), mark),
            location: Some(Location::Archive),
        };
        tracing::info!(phase = %Phase::Fetching, "fetching archived documents");
        let mut articles = self.source.fetch_all(&query).await?;

        if let Some(mark) = mark {
            let fetched = articles.len();
            articles.retain(|a| a.updated_at.is_none_or(|updated| updated > mark));
            if articles.len() < fetched {
                tracing::info!(
                    dropped = fetched - articles.len(),
                    "dropping documents already covered by the checkpoint"
                );
            }
        }

        tracing::info!(phase = %Phase::Processing, documents = articles.len(), "processing documents");
        let mut report = SyncReport::default();
        let mut last_publish = None;
        for article in &articles {
            report.read_count += 1;
            self.process(article, &mut last_publish)
                .await?
                .record(&article.title, &mut report);
        }

        if self.options.dry_run {
            tracing::info!(
                read = report.read_count,
                eligible = report.eligible_count,
                "dry run finished, nothing published or saved"
            );
            return Ok(report);
        }

        tracing::info!(phase = %Phase::Reporting, read = report.read_count, "reporting metrics");
        if report.read_count > 0 {
            match self.metrics.report(report.read_count).await {
                Ok(status) => {
                    tracing::info!(status, "metrics webhook called");
                    report.metrics_status = Some(status);
                }
                Err(e) => tracing::warn!(error = %e, "metrics webhook failed"),
            }
        }

        let next = self.next_checkpoint(previous.as_ref(), mark, &articles, started_at);
        tracing::info!(phase = %Phase::Checkpointing, checkpoint = %next, "saving checkpoint");
        self.store.save(&next).await.map_err(SyncError::Save)?;
        report.checkpoint = Some(next);

        tracing::info!(
            phase = %Phase::Done,
            read = report.read_count,
            archived = report.archived_count,
            skipped = report.skipped.len(),
            rejected = report.rejected.len(),
            "sync run complete"
        );
        Ok(report)
    }

    async fn load_checkpoint(&self) -> Result<Option<Checkpoint>, SyncError> {
        match self.store.load().await {
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(e @ CheckpointError::NotFound(_)) => match self.options.bootstrap {
                BootstrapPolicy::FullHistory => {
                    tracing::info!(error = %e, "no checkpoint yet, fetching full archive history");
                    Ok(None)
                }
                BootstrapPolicy::Abort => Err(SyncError::MissingCheckpoint(e)),
            },
            Err(e) => Err(SyncError::Checkpoint(e)),
        }
    }

    /// The stored checkpoint, widened by the safety margin when it parses.
    fn updated_after(
        &self,
        previous: Option<&Checkpoint>,
        mark: Option<DateTime<Utc>>,
    ) -> Option<Checkpoint> {
        match mark {
            Some(mark) if !self.options.safety_margin.is_zero() => {
                let widened = mark
                    .checked_sub_signed(self.options.safety_margin)
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                Some(Checkpoint::from_datetime(widened))
            }
            _ => previous.filter(|c| !c.is_blank()).cloned(),
        }
    }

    async fn process(
        &self,
        article: &Article,
        last_publish: &mut Option<Instant>,
    ) -> Result<ItemOutcome, SyncError> {
        if let Err(reason) = self.filter.eligibility(article) {
            tracing::info!(title = %article.title, reason = %reason, "skipping document");
            return Ok(ItemOutcome::Skipped(reason));
        }

        let bookmark = Bookmark::from_article(article);
        if self.options.dry_run {
            tracing::info!(title = %article.title, url = %bookmark.url, "would archive document");
            return Ok(ItemOutcome::DryRun);
        }

        if let Some(last) = *last_publish {
            tokio::time::sleep_until(last + self.options.publish_interval).await;
        }
        *last_publish = Some(Instant::now());

        match self.sink.publish(&bookmark).await {
            Ok(()) => {
                tracing::info!(title = %article.title, url = %bookmark.url, "archived document");
                Ok(ItemOutcome::Archived)
            }
            Err(error) if error.is_fatal() => {
                tracing::error!(title = %article.title, error = %error, "sink unavailable, aborting run");
                Err(SyncError::Sink {
                    title: article.title.clone(),
                    error,
                })
            }
            Err(error) => {
                tracing::warn!(title = %article.title, error = %error, "sink rejected document, skipping");
                Ok(ItemOutcome::Rejected(error))
            }
        }
    }

    fn next_checkpoint(
        &self,
        previous: Option<&Checkpoint>,
        mark: Option<DateTime<Utc>>,
        articles: &[Article],
        started_at: DateTime<Utc>,
    ) -> Checkpoint {
        if self.options.watermark == WatermarkMode::WallClock {
            return Checkpoint::from_datetime((self.clock)());
        }

        let observed = articles.iter().filter_map(|a| a.updated_at).max();

        match (observed, mark) {
            (Some(observed), Some(mark)) => Checkpoint::from_datetime(observed.max(mark)),
            (Some(observed), None) => Checkpoint::from_datetime(observed),
            (None, _) => match previous.filter(|c| !c.is_blank()) {
                Some(previous) => previous.clone(),
                None => Checkpoint::from_datetime(started_at),
            },
        }
    }
}
