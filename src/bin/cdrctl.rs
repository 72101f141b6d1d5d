//! Command-line harness: loads a config file, replays a scripted event file
//! through the engine, and prints every dispatched record as it posts.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use cdr_engine::{Backend, Config, Engine, Event, PublicRecord};
use clap::Parser;

/// Replay a scripted CDR event file through the engine.
#[derive(Parser, Debug)]
#[command(name = "cdrctl", about = "Replay CDR events and print dispatched records")]
struct Args {
    /// Path to a TOML config file containing a `[cdr]` table. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to a newline-delimited JSON file of events, one `Event` object per line.
    #[arg(long)]
    script: PathBuf,
}

struct StdoutBackend;

impl Backend for StdoutBackend {
    fn name(&self) -> &str {
        "stdout"
    }

    fn post(&self, record: &PublicRecord) -> anyhow::Result<()> {
        println!(
            "{channel} -> {dst} [{disposition:?}] dur={duration}s bill={billsec}s seq={sequence}",
            channel = record.channel,
            dst = record.dstchannel,
            disposition = record.disposition,
            duration = record.duration,
            billsec = record.billsec,
            sequence = record.sequence,
        );
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading config {path:?}"))?,
        None => Config::default(),
    };

    let engine = Engine::new(config);
    engine
        .register_backend("stdout", std::sync::Arc::new(StdoutBackend))
        .context("registering stdout backend")?;

    let file = fs::File::open(&args.script)
        .with_context(|| format!("opening event script {:?}", args.script))?;
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading line {}", lineno + 1))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: Event = serde_json::from_str(line)
            .with_context(|| format!("parsing event on line {}", lineno + 1))?;
        engine.dispatch(event);
    }

    engine.shutdown();
    Ok(())
}
