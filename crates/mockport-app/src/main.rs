mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use mockport_core::logbuf::format_row;
use mockport_core::{DisplaySink, MockSerialPort, SeededBursts};
use settings::Settings;
use std::path::PathBuf;
use std::time::Duration;

/// Shows bytes "received" from a simulated serial port.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Settings file (JSON). Defaults to <config dir>/mockport/settings.json.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for the burst generator.
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many seconds.
    #[arg(long)]
    run_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(seed) = args.seed {
        settings.seed = seed;
    }
    if args.run_secs.is_some() {
        settings.run_secs = args.run_secs;
    }
    let cfg = settings.serial_config().context("invalid port settings")?;

    let port = MockSerialPort::new(cfg, SeededBursts::from_seed(settings.seed));
    let sink = DisplaySink::new();
    let records = sink.subscribe();
    sink.attach(&port);

    println!("{:<17} Data", "Timestamp");
    port.open();

    let deadline = async {
        match settings.run_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    // Event polling timer
    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for record in records.try_iter() {
                    println!("{}", format_row(&record));
                }
            }
            res = tokio::signal::ctrl_c() => {
                res.context("listening for Ctrl-C")?;
                break;
            }
            _ = &mut deadline => break,
        }
    }

    port.close();
    for record in records.try_iter() {
        println!("{}", format_row(&record));
    }
    log::info!("{}: {} records received", port.port_name(), sink.len());
    Ok(())
}
