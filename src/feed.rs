use std::sync::{Arc, LazyLock};

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};

use crate::cli::FeedArgs;
use crate::error::{Error, Result};
use crate::formats::FeedEntry;
use crate::request::{self, Placeholder};
use crate::transport::{self, HttpExecutor};

static ARTICLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article").expect("article selector is valid"));
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1").expect("title selector is valid"));

const POST_ID_ATTR: &str = "data-post-id";
const UPDATED_AT_ATTR: &str = "data-updated-at";
const TYPE_ATTR: &str = "data-type";

/// Fetches one activity page ending at a cursor.
#[derive(Clone)]
pub struct FeedPageFetcher {
    executor: Arc<dyn HttpExecutor>,
    template: String,
}

impl FeedPageFetcher {
    pub fn new(executor: Arc<dyn HttpExecutor>, template: impl Into<String>) -> Self {
        Self {
            executor,
            template: template.into(),
        }
    }

    pub async fn fetch(&self, cursor: DateTime<Utc>) -> Result<Vec<FeedEntry>> {
        let until = cursor.timestamp();
        let raw = Placeholder::Cursor.fill(&self.template, &until.to_string());
        let request = request::parse(&raw, None)?;

        let response = self
            .executor
            .execute(request)
            .await
            .map_err(|err| Error::transport(format!("fetch feed page until={until}"), err))?;
        let body = transport::read_decoded_body(response)
            .await
            .map_err(|err| Error::transport(format!("read feed page until={until}"), err))?;

        let entries = parse_feed_page(&String::from_utf8_lossy(&body));
        tracing::debug!(until, entries = entries.len(), "feed page decoded");
        Ok(entries)
    }
}

/// Decodes entries in document order. Articles without an id or a valid
/// update timestamp are dropped.
pub fn parse_feed_page(html: &str) -> Vec<FeedEntry> {
    let document = Html::parse_document(html);
    document.select(&ARTICLE).filter_map(parse_article).collect()
}

fn parse_article(article: ElementRef<'_>) -> Option<FeedEntry> {
    let element = article.value();

    let post_id = element.attr(POST_ID_ATTR).filter(|id| !id.is_empty())?;
    let Some(updated_at) = element.attr(UPDATED_AT_ATTR).and_then(parse_unix_seconds) else {
        tracing::debug!(post_id, "skip article without valid {UPDATED_AT_ATTR}");
        return None;
    };

    let entry_type = element
        .attr(TYPE_ATTR)
        .filter(|t| !t.is_empty())
        .map(str::to_owned);

    let title = article
        .select(&TITLE)
        .next()
        .and_then(|h1| h1.children().next())
        .and_then(|node| node.value().as_text().map(|text| text.to_string()))
        .unwrap_or_default();

    Some(FeedEntry {
        post_id: post_id.to_owned(),
        updated_at,
        entry_type,
        title,
    })
}

fn parse_unix_seconds(raw: &str) -> Option<DateTime<Utc>> {
    let seconds = raw.trim().parse::<i64>().ok()?;
    DateTime::from_timestamp(seconds, 0)
}

/// Prints one page of entries as JSON lines.
pub async fn run(args: FeedArgs) -> anyhow::Result<()> {
    let config = crate::config::Config::load(&args.config).context("load config")?;
    let cancel = crate::crawl::cancel_on_ctrl_c();
    let executor = crate::crawl::build_executor(&config, cancel).context("build http client")?;
    let fetcher = FeedPageFetcher::new(executor, config.feed_request);

    let until = args.until.unwrap_or_else(Utc::now);
    let entries = fetcher
        .fetch(until)
        .await
        .with_context(|| format!("fetch feed page until {}", until.to_rfc3339()))?;

    for entry in &entries {
        let line = serde_json::to_string(entry).context("serialize feed entry")?;
        println!("{line}");
    }
    Ok(())
}
