use anyhow::{anyhow, bail, Result};
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use feed_walker::config::AppConfig;
use feed_walker::controller::FeedController;
use feed_walker::feed::Status;
use feed_walker::fixture::FixtureSource;
use feed_walker::http::HttpSource;
use feed_walker::query::Query;
use feed_walker::sentinel::Viewport;
use feed_walker::source::PageSource;

const VIEWPORT_EXTENT: f32 = 800.0;
/// Slack over the request timeout before the loop gives up on a page.
const WAIT_MARGIN: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "feedwalker")]
#[command(about = "Walk a paginated feed: search, filter and scroll until it runs out")]
struct Args {
    #[arg(long, conflicts_with = "fixture")]
    endpoint: Option<String>,
    #[arg(long)]
    fixture: Option<PathBuf>,
    #[arg(long, default_value = "")]
    search: String,
    #[arg(long = "filter", value_name = "FACET=VALUE", value_parser = parse_filter)]
    filters: Vec<(String, String)>,
    /// Stop after this many pages; 0 walks until the feed is exhausted.
    #[arg(long, default_value_t = 0)]
    pages: u32,
    #[arg(long)]
    per_page: Option<u32>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Request timeout; overrides `http.timeout_ms` from --config.
    #[arg(long)]
    timeout_ms: Option<u64>,
    #[arg(long, default_value_t = 0)]
    retries: u32,
    /// Fixture fields searched by --search (default: every string field).
    #[arg(long, value_delimiter = ',')]
    text_fields: Vec<String>,
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    let (facet, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FACET=VALUE, got {raw:?}"))?;
    let facet = facet.trim();
    if facet.is_empty() {
        return Err(format!("expected FACET=VALUE, got {raw:?}"));
    }
    Ok((facet.to_string(), value.trim().to_string()))
}

/// Opens the page source and returns it with its per-request timeout.
fn open_source(
    args: &Args,
    config: &AppConfig,
) -> Result<(Box<dyn PageSource<Item = Value>>, Duration)> {
    let mut http = config.http.clone().unwrap_or_default();
    if let Some(timeout_ms) = args.timeout_ms {
        http.timeout_ms = timeout_ms;
    }
    let timeout = Duration::from_millis(http.timeout_ms);

    if let Some(path) = &args.fixture {
        let source = FixtureSource::from_file(path)?.with_text_fields(args.text_fields.clone());
        return Ok((Box::new(source), timeout));
    }

    if let Some(endpoint) = &args.endpoint {
        http.base_url = endpoint.clone();
    }
    if http.base_url.is_empty() {
        bail!("either --endpoint or --fixture is required");
    }
    Ok((Box::new(HttpSource::new(http)), timeout))
}

fn run_cli(args: &Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    config.apply_env();
    if let Some(per_page) = args.per_page {
        if per_page == 0 {
            bail!("--per-page must be positive");
        }
        config.feed.per_page = per_page;
    }

    let (source, request_timeout) = open_source(args, &config)?;
    let query = args
        .filters
        .iter()
        .fold(Query::new(args.search.clone()), |query, (facet, value)| {
            query.with_filter(facet.clone(), value.clone())
        });
    let timeout = request_timeout + WAIT_MARGIN;
    let mut feed = FeedController::new(source, config.feed.clone(), query);
    let mut printed = 0usize;
    let mut retries_left = args.retries;

    loop {
        while feed.is_loading() {
            if !feed.wait_for_fetch(timeout) {
                bail!("timed out waiting for page {}", feed.pages_loaded() + 1);
            }
        }
        for item in &feed.items()[printed..] {
            println!("{}", serde_json::to_string(item)?);
        }
        printed = feed.items().len();

        match feed.status() {
            Status::Error => {
                let retryable = feed.last_error().is_some_and(|e| e.is_retryable());
                if !retryable || retries_left == 0 {
                    break;
                }
                retries_left -= 1;
                warn!(retries_left, "retrying page {}", feed.pages_loaded() + 1);
                feed.retry();
            }
            Status::Ready => {
                if args.pages != 0 && feed.pages_loaded() >= args.pages {
                    break;
                }
                let Some(marker) = feed.sentinel_marker() else {
                    break;
                };
                feed.observe_viewport(Viewport::new(
                    (marker.offset - VIEWPORT_EXTENT).max(0.0),
                    VIEWPORT_EXTENT,
                ));
                if !feed.is_loading() {
                    break;
                }
            }
            _ => break,
        }
    }

    let total = feed
        .total_count()
        .map(|n| n.to_string())
        .unwrap_or_else(|| "?".to_string());
    eprintln!(
        "Items: {} | Pages: {} | Total: {} | Status: {:?}",
        feed.items().len(),
        feed.pages_loaded(),
        total,
        feed.status()
    );

    match feed.last_error() {
        Some(err) if feed.status() == Status::Error => Err(anyhow!("feed stopped: {err}")),
        _ => Ok(()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("feed_walker=info,feedwalker=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    run_cli(&args)
}
