use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use laneguard::{Monitor, MonitorConfig};
use laneguard::report;

#[derive(Parser)]
#[command(name = "laneguard", about = "Shipping-route disruption risk monitor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a single route and print the decision.
    Run {
        /// Shipping route label.
        #[arg(long)]
        route: String,
        /// Skip database writes and live delivery.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the autonomous monitoring loop.
    Monitor {
        /// Run one cycle and exit.
        #[arg(long)]
        once: bool,
        /// Do not send live emails.
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-attempt previously failed alert dispatches.
    Retry {
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = MonitorConfig::from_env()?;
    let monitor = Monitor::from_config(config).await?;

    match cli.command {
        Command::Run { route, dry_run } => {
            let decision = monitor.process_route(&route, dry_run).await?;
            println!("{}", serde_json::to_string_pretty(&decision)?);
            println!("\n--- Alert Draft ---\n");
            println!("{}", report::draft_alert_text(&decision));
        }
        Command::Monitor { once, dry_run } => {
            if once {
                let failures = monitor.run_once(dry_run).await?;
                if failures > 0 {
                    std::process::exit(1);
                }
            } else {
                monitor.monitoring_loop(dry_run).await?;
            }
        }
        Command::Retry { dry_run } => {
            let retried = monitor.retry_sweep(dry_run).await?;
            info!(retried, "retry sweep finished");
        }
    }
    Ok(())
}
