use clap::Parser;
use guard::replay::Replayer;
use guard::{AlertRecipient, GuardConfig};
use log::info;
use protocol::{Capture, PlayerId};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Recorded connection to replay
    capture: PathBuf,

    /// Read the capture as JSON instead of bincode
    #[arg(long)]
    json: bool,

    /// JSON configuration file; defaults apply to missing fields
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Override the alert coalescing window in milliseconds
    #[arg(short = 'w', long)]
    window: Option<u64>,

    /// Simulated client round trip in milliseconds
    #[arg(short = 'l', long, default_value = "50")]
    rtt: u64,
}

/// Prints every delivered alert to stdout.
struct ConsoleRecipient {
    id: PlayerId,
}

impl AlertRecipient for ConsoleRecipient {
    fn id(&self) -> PlayerId {
        self.id
    }

    fn send_alert(&self, message: &str) {
        println!("{}", message);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GuardConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => GuardConfig::default(),
    };
    if let Some(window) = args.window {
        config.alert_window_ms = window;
    }

    let data = std::fs::read(&args.capture)?;
    let capture = if args.json {
        serde_json::from_slice::<Capture>(&data)?
    } else {
        Capture::decode(&data)?
    };

    let replayer = Replayer::new(config, tokio::runtime::Handle::current(), args.rtt)?;
    replayer
        .guard()
        .alerts()
        .enable_alerts(Arc::new(ConsoleRecipient { id: Uuid::new_v4() }));

    let report = replayer.replay(&capture)?;
    info!(
        "Replayed {} packets, {} probes answered, last sample {} left / {} right cps",
        report.packets, report.probes_answered, report.cps.0, report.cps.1
    );

    // Buffered alerts flush one window after their first violation.
    let window = replayer.guard().alerts().window();
    tokio::time::sleep(window + Duration::from_millis(200)).await;

    if report.violations.is_empty() {
        println!("{}: no violations", report.name);
    } else {
        println!("{}:", report.name);
        for (check, count) in &report.violations {
            println!("  {:<12} x{}", check, count);
        }
    }

    replayer.finish(report.player);
    Ok(())
}
