//! Backward pagination over the activity feed.
//!
//! The controller walks pages newest-first. Each entry moves the cursor to its
//! own timestamp before the boundary check, so the cursor always names the
//! last entry considered. Detail and asset calls run strictly one after
//! another; the first error ends the run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::asset::AssetMaterializer;
use crate::cli::CrawlArgs;
use crate::config::Config;
use crate::detail::EntryDetailFetcher;
use crate::error::{Error, Result};
use crate::feed::FeedPageFetcher;
use crate::formats::{AssetDescriptor, DetailRecord, FeedEntry};
use crate::store;
use crate::transport::{HttpExecutor, ReqwestExecutor};

/// The remote calls a crawl is made of.
#[async_trait]
pub trait FeedBackend: Send + Sync {
    async fn fetch_page(&self, cursor: DateTime<Utc>) -> Result<Vec<FeedEntry>>;
    async fn fetch_detail(&self, id: &str) -> Result<DetailRecord>;
    async fn materialize(&self, asset: &AssetDescriptor, dir: &Path) -> Result<PathBuf>;
}

/// Production backend: templated feed and detail requests plus plain asset
/// downloads, all through one executor.
#[derive(Clone)]
pub struct RemoteFeed {
    pages: FeedPageFetcher,
    details: EntryDetailFetcher,
    assets: AssetMaterializer,
}

impl RemoteFeed {
    pub fn new(executor: Arc<dyn HttpExecutor>, config: &Config) -> Self {
        Self {
            pages: FeedPageFetcher::new(Arc::clone(&executor), config.feed_request.clone()),
            details: EntryDetailFetcher::new(Arc::clone(&executor), config.detail_request.clone()),
            assets: AssetMaterializer::new(executor),
        }
    }
}

#[async_trait]
impl FeedBackend for RemoteFeed {
    async fn fetch_page(&self, cursor: DateTime<Utc>) -> Result<Vec<FeedEntry>> {
        self.pages.fetch(cursor).await
    }

    async fn fetch_detail(&self, id: &str) -> Result<DetailRecord> {
        self.details.fetch(id).await
    }

    async fn materialize(&self, asset: &AssetDescriptor, dir: &Path) -> Result<PathBuf> {
        self.assets.materialize(asset, dir).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    /// The feed returned an empty page, or stopped moving backward.
    NoMoreEntries,
    /// An entry at or before the `from` boundary was reached.
    BoundaryReached,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub pages: u64,
    pub entries: u64,
    pub assets: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOutcome {
    pub reason: CompletionReason,
    pub cursor: DateTime<Utc>,
    pub stats: CrawlStats,
}

/// Terminal failure: the first error, plus where the crawl stood.
#[derive(Debug, thiserror::Error)]
#[error("crawl failed at cursor {}", .cursor.to_rfc3339())]
pub struct CrawlFailure {
    pub cursor: DateTime<Utc>,
    pub stats: CrawlStats,
    #[source]
    pub error: Error,
}

pub struct CrawlController<B> {
    backend: B,
    output_dir: PathBuf,
    from: DateTime<Utc>,
    cancel: CancellationToken,
}

impl<B: FeedBackend> CrawlController<B> {
    pub fn new(backend: B, output_dir: impl Into<PathBuf>, from: DateTime<Utc>) -> Self {
        Self {
            backend,
            output_dir: output_dir.into(),
            from,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Crawls backward from `start` until completion or the first failure.
    pub async fn run(&self, start: DateTime<Utc>) -> std::result::Result<CrawlOutcome, CrawlFailure> {
        let mut cursor = start;
        let mut stats = CrawlStats::default();

        loop {
            match self.crawl_page(&mut cursor, &mut stats).await {
                Ok(None) => continue,
                Ok(Some(reason)) => {
                    tracing::info!(
                        ?reason,
                        cursor = %cursor.to_rfc3339(),
                        pages = stats.pages,
                        entries = stats.entries,
                        assets = stats.assets,
                        "crawl completed"
                    );
                    return Ok(CrawlOutcome {
                        reason,
                        cursor,
                        stats,
                    });
                }
                Err(error) => {
                    tracing::error!(cursor = %cursor.to_rfc3339(), error = %error, "crawl failed");
                    return Err(CrawlFailure {
                        cursor,
                        stats,
                        error,
                    });
                }
            }
        }
    }

    /// One pagination step. `None` means fetch the next page.
    async fn crawl_page(
        &self,
        cursor: &mut DateTime<Utc>,
        stats: &mut CrawlStats,
    ) -> Result<Option<CompletionReason>> {
        let page_cursor = *cursor;
        self.ensure_not_cancelled("fetch feed page")?;
        let entries = self.backend.fetch_page(page_cursor).await?;
        stats.pages += 1;
        tracing::info!(
            until = %page_cursor.to_rfc3339(),
            entries = entries.len(),
            "feed page fetched"
        );

        if entries.is_empty() {
            return Ok(Some(CompletionReason::NoMoreEntries));
        }

        for entry in &entries {
            *cursor = entry.updated_at;
            if *cursor <= self.from {
                tracing::debug!(post_id = %entry.post_id, "entry at or before boundary");
                return Ok(Some(CompletionReason::BoundaryReached));
            }
            self.crawl_entry(entry, stats).await?;
        }

        if *cursor >= page_cursor {
            tracing::warn!(
                until = %page_cursor.to_rfc3339(),
                "feed did not move past the cursor; treating it as exhausted"
            );
            return Ok(Some(CompletionReason::NoMoreEntries));
        }
        Ok(None)
    }

    async fn crawl_entry(&self, entry: &FeedEntry, stats: &mut CrawlStats) -> Result<()> {
        self.ensure_not_cancelled("fetch story")?;
        let record = self.backend.fetch_detail(&entry.post_id).await?;
        stats.entries += 1;

        if record.media.is_empty() {
            tracing::debug!(post_id = %entry.post_id, "story has no media");
            return Ok(());
        }

        let dir = store::entry_dir(&self.output_dir, entry.updated_at, &record.id, &record.title);
        store::ensure_dir(&dir).await?;

        for asset in &record.media {
            self.ensure_not_cancelled("download asset")?;
            self.backend.materialize(asset, &dir).await?;
            stats.assets += 1;
        }
        tracing::info!(
            post_id = %entry.post_id,
            assets = record.media.len(),
            dir = %dir.display(),
            "story saved"
        );
        Ok(())
    }

    fn ensure_not_cancelled(&self, step: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::cancelled(step));
        }
        Ok(())
    }
}

/// Token cancelled on the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; cancelling");
            token.cancel();
        }
    });
    cancel
}

pub fn build_executor(
    config: &Config,
    cancel: CancellationToken,
) -> anyhow::Result<Arc<dyn HttpExecutor>> {
    let mut builder =
        reqwest::Client::builder().redirect(reqwest::redirect::Policy::limited(10));
    if let Some(user_agent) = config.user_agent.as_deref() {
        builder = builder.user_agent(user_agent);
    }
    let client = builder.build().context("build http client")?;
    Ok(Arc::new(ReqwestExecutor::new(client, cancel)))
}

pub async fn run(args: CrawlArgs) -> anyhow::Result<()> {
    let config = Config::load(&args.config).context("load config")?;
    let output_dir = args
        .out
        .map(PathBuf::from)
        .unwrap_or_else(|| config.output_dir.clone());
    let from = args.from.unwrap_or_default();
    let until = args.until.unwrap_or_else(Utc::now);
    if until <= from {
        anyhow::bail!(
            "--until ({}) must be after --from ({})",
            until.to_rfc3339(),
            from.to_rfc3339()
        );
    }

    let cancel = cancel_on_ctrl_c();
    let executor = build_executor(&config, cancel.clone())?;
    let controller = CrawlController::new(RemoteFeed::new(executor, &config), &output_dir, from)
        .with_cancellation(cancel);

    tracing::info!(
        until = %until.to_rfc3339(),
        from = %from.to_rfc3339(),
        out = %output_dir.display(),
        "crawl started"
    );
    let outcome = controller.run(until).await?;
    tracing::info!(reason = ?outcome.reason, "crawl finished");
    Ok(())
}
