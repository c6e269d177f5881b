use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = feedcrawl::cli::Cli::parse();
    feedcrawl::logging::init(cli.verbose).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        feedcrawl::cli::Command::Crawl(args) => {
            feedcrawl::crawl::run(args).await.context("crawl")?;
        }
        feedcrawl::cli::Command::Feed(args) => {
            feedcrawl::feed::run(args).await.context("feed")?;
        }
    }

    Ok(())
}
