use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use heptap::capture::{self, FrameSource, PcapReplay};
use heptap::config;
use heptap::correlation::SdpCorrelator;
use heptap::decoder::{maintenance, Decoder};
use heptap::queue::{self, RecordReceiver};
use heptap::telemetry::init_logging;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "heptap")]
#[command(about = "VoIP capture decoder: SIP, RTCP, DNS and syslog out of tunneled traffic")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Decode a pcap file and log the resulting records
    Replay {
        /// Path to heptap.toml
        #[arg(short, long, default_value = "heptap.toml")]
        config: PathBuf,

        /// Capture file to decode
        #[arg(short, long)]
        pcap: PathBuf,

        /// Frames are already HEP encapsulated; pass them through
        #[arg(long)]
        hep: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate heptap.toml
    Validate {
        /// Path to heptap.toml
        #[arg(short, long, default_value = "heptap.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Config {
            action: ConfigAction::Validate { config },
        } => cmd_config_validate(&config),
        Commands::Replay { config, pcap, hep } => cmd_replay(&config, &pcap, hep),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn cmd_config_validate(config_path: &Path) -> Result<(), String> {
    init_logging(None);
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}

fn cmd_replay(config_path: &Path, pcap_path: &Path, hep: bool) -> Result<(), String> {
    use tokio::runtime::Runtime;

    let mut cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;
    init_logging(Some(&cfg.log));

    let validation = config::validate(&cfg);
    validation.print_diagnostics();
    if validation.has_errors() {
        return Err("Validation failed".to_string());
    }

    let mut source = PcapReplay::open(pcap_path)
        .map_err(|e| format!("Failed to open {}: {}", pcap_path.display(), e))?;
    // The capture header decides the first layer
    cfg.decoder.link_type = source.link_type();

    info!(
        pcap = %pcap_path.display(),
        mode = ?cfg.decoder.mode,
        link_type = ?cfg.decoder.link_type,
        "starting replay"
    );

    let (tx, rx) = queue::channel(cfg.decoder.queue_capacity);
    let decoder = Arc::new(Decoder::new(&cfg, tx, Arc::new(SdpCorrelator::default())));
    let consumer = std::thread::spawn(move || log_records(rx));

    let rt = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;
    let frames = rt.block_on(async {
        let handle = maintenance::spawn(Arc::clone(&decoder), &cfg.maintenance);

        // Enqueue blocks under backpressure; keep it off the async workers
        let worker = {
            let decoder = Arc::clone(&decoder);
            tokio::task::spawn_blocking(move || capture::replay(&mut source, &decoder, hep))
        };
        let result = worker.await;

        handle.shutdown().await;
        result
    });

    info!(stats = %decoder.stats().report_line(), "replay finished");
    // Last sender goes with the decoder; the consumer then drains and exits
    drop(decoder);
    let records = consumer
        .join()
        .map_err(|_| "Record consumer panicked".to_string())?;

    let frames = frames
        .map_err(|e| format!("Replay task failed: {}", e))?
        .map_err(|e| format!("Replay failed: {}", e))?;
    info!(frames, records, "done");
    Ok(())
}

/// Log exporter: one line per record
fn log_records(rx: RecordReceiver) -> u64 {
    let mut count = 0;
    for record in rx.iter() {
        let ts: DateTime<Utc> = record.timestamp().into();
        if record.is_hep() {
            info!(ts = %ts.format("%Y-%m-%d %H:%M:%S%.6f"), len = record.payload.len(), "hep");
        } else if record.payload.is_empty() {
            warn!(ts = %ts.format("%Y-%m-%d %H:%M:%S%.6f"), %record, "record without payload");
        } else {
            info!(ts = %ts.format("%Y-%m-%d %H:%M:%S%.6f"), %record, "record");
        }
        count += 1;
    }
    count
}
