use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Walk the feed backward and save every story's media.
    Crawl(CrawlArgs),
    /// Fetch one feed page and print its entries as JSON lines.
    Feed(FeedArgs),
}

#[derive(Debug, Args)]
pub struct CrawlArgs {
    /// Path to the YAML config holding the request templates.
    #[arg(long)]
    pub config: PathBuf,

    /// Start cursor (RFC 3339 or Unix seconds). Defaults to now.
    #[arg(long, value_parser = parse_timestamp)]
    pub until: Option<DateTime<Utc>>,

    /// Stop at entries updated at or before this instant (RFC 3339 or Unix seconds).
    #[arg(long, value_parser = parse_timestamp)]
    pub from: Option<DateTime<Utc>>,

    /// Output root; overrides `output_dir` from the config.
    #[arg(long)]
    pub out: Option<String>,
}

#[derive(Debug, Args)]
pub struct FeedArgs {
    /// Path to the YAML config holding the request templates.
    #[arg(long)]
    pub config: PathBuf,

    /// Page cursor (RFC 3339 or Unix seconds). Defaults to now.
    #[arg(long, value_parser = parse_timestamp)]
    pub until: Option<DateTime<Utc>>,
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(seconds) = raw.parse::<i64>() {
        return DateTime::from_timestamp(seconds, 0)
            .ok_or_else(|| format!("timestamp out of range: {seconds}"));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| format!("expected RFC 3339 or Unix seconds: {err}"))
}
