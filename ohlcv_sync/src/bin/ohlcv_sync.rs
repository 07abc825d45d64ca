use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use market_data_ingestor::{
    models::bar::StreamBar,
    providers::alpaca_rest::provider::{AlpacaCredentials, AlpacaProvider},
};
use ohlcv_sync::{
    config::AppConfig,
    engine::{EngineSettings, SeriesEngine, open_store},
    logging::init_tracing,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[derive(Parser)]
#[command(version, about = "OHLCV series ingestion and retention")]
struct Cli {
    /// TOML configuration. Built-in defaults when omitted.
    #[arg(long, short, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Backfill history for every (timeframe, symbol) pair.
    Populate {
        /// Overrides `[backfill].symbols`.
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,
        /// Overrides `[backfill].timeframes`.
        #[arg(long, value_delimiter = ',')]
        timeframes: Vec<String>,
        /// Overrides `[backfill].start` (YYYY-MM-DD).
        #[arg(long)]
        start: Option<NaiveDate>,
    },
    /// Apply the `[retention]` policy.
    Trim,
    /// Print one series as JSON lines.
    Query {
        symbol: String,
        timeframe: String,
        /// Epoch seconds, RFC 3339, or YYYY-MM-DD.
        #[arg(long, value_parser = parse_instant)]
        start: Option<i64>,
        #[arg(long, value_parser = parse_instant)]
        end: Option<i64>,
    },
    /// Write newline-delimited JSON stream bars read from stdin.
    Stream,
    /// Destroy every series in the given timeframes.
    Clear {
        /// Defaults to the timeframes named in `[retention]`.
        #[arg(long, value_delimiter = ',')]
        timeframes: Vec<String>,
    },
    /// Print the crate and store versions.
    Version,
}

fn parse_instant(s: &str) -> Result<i64, String> {
    if let Ok(epoch) = s.parse::<i64>() {
        return Ok(epoch);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.timestamp());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| d.and_time(NaiveTime::MIN).and_utc().timestamp())
        .map_err(|_| format!("{s:?} is neither epoch seconds, RFC 3339, nor YYYY-MM-DD"))
}

fn or_default(given: Vec<String>, configured: &[String]) -> Vec<String> {
    if given.is_empty() {
        configured.to_vec()
    } else {
        given
    }
}

/// The file at `path`, or the built-in defaults. Validated either way.
fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            AppConfig::load(path).with_context(|| format!("loading {}", path.display()))
        }
        None => {
            let cfg = AppConfig::default();
            cfg.validate().context("validating built-in defaults")?;
            Ok(cfg)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = load_config(cli.config.as_deref())?;
    if let Some(log_file) = init_tracing(&cfg.logging)? {
        info!(path = %log_file.display(), "logging to file");
    }

    let settings = EngineSettings::from_config(&cfg)?;
    let engine = SeriesEngine::connect(open_store(&cfg)?, settings).await?;

    match cli.cmd {
        Cmd::Populate {
            symbols,
            timeframes,
            start,
        } => {
            let symbols = or_default(symbols, &cfg.backfill.symbols);
            let timeframes = or_default(timeframes, &cfg.backfill.timeframes);
            if symbols.is_empty() {
                bail!("no symbols to backfill; pass --symbols or set [backfill].symbols");
            }

            let creds = cfg.credentials()?;
            info!(mode = %creds.mode, "using feed credentials");
            let provider = AlpacaProvider::new(&AlpacaCredentials::from(&creds))?
                .with_data_url(cfg.feed.data_url.clone())
                .with_feed(cfg.feed.feed);

            let report = engine
                .backfill(Arc::new(provider), cfg.backfill_settings())
                .populate(&symbols, &timeframes, start.unwrap_or(cfg.backfill.start))
                .await;

            for pair in &report.pairs {
                match &pair.outcome {
                    Ok(w) => println!(
                        "{:<8} {:<6} {:>7} rows{}",
                        pair.symbol,
                        pair.timeframe,
                        w.rows_written,
                        if pair.truncated { " (truncated)" } else { "" }
                    ),
                    Err(e) => println!(
                        "{:<8} {:<6} FAILED{}: {e}",
                        pair.symbol,
                        pair.timeframe,
                        if pair.is_transient() { " (transient)" } else { "" }
                    ),
                }
            }
            let failed = report.failed().count();
            if failed > 0 {
                bail!(
                    "{failed} of {} pairs failed, {} of them transient",
                    report.pairs.len(),
                    report.transient().count()
                );
            }
        }

        Cmd::Trim => {
            let report = engine.trim(&cfg.retention).await?;
            for t in &report.trimmed {
                println!("{}: {} -> {}", t.key, t.before, t.after);
            }
            println!(
                "examined {} series, trimmed {}",
                report.examined,
                report.trimmed.len()
            );
        }

        Cmd::Query {
            symbol,
            timeframe,
            start,
            end,
        } => {
            let started = Instant::now();
            let bars = engine.query(&symbol, &timeframe, start, end).await?;
            let elapsed = started.elapsed();
            for bar in &bars {
                println!("{}", serde_json::to_string(bar)?);
            }
            eprintln!("{} bars in {:.3} ms", bars.len(), elapsed.as_secs_f64() * 1e3);
        }

        Cmd::Stream => {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let (mut written, mut rejected) = (0usize, 0usize);
            while let Some(line) = lines.next_line().await? {
                if line.trim().is_empty() {
                    continue;
                }
                let bar: StreamBar = match serde_json::from_str(&line) {
                    Ok(bar) => bar,
                    Err(e) => {
                        rejected += 1;
                        error!(error = %e, "unreadable stream line");
                        continue;
                    }
                };
                match engine.write_stream(&bar).await {
                    Ok(_) => written += 1,
                    Err(e) => {
                        rejected += 1;
                        error!(error = %e, "stream bar rejected");
                    }
                }
            }
            info!(written, rejected, "stream closed");
        }

        Cmd::Clear { timeframes } => {
            let timeframes = or_default(
                timeframes,
                &cfg.retention.timeframes().map(str::to_string).collect::<Vec<_>>(),
            );
            let cleared = engine.clear(&timeframes).await?;
            println!("cleared {} series", cleared.len());
        }

        Cmd::Version => {
            println!("ohlcv-sync {}", env!("CARGO_PKG_VERSION"));
            println!("store {}", engine.server_version());
        }
    }

    Ok(())
}
