//! EvalForge server binary.

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use evalforge::scheduler::run_schedule;
use evalforge::server::{publish_dashboard_metrics, serve, ServiceName};

#[derive(Parser)]
#[command(name = "evalforge", version, about = "Failure-trace to safety-artifact pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one pipeline service as an HTTP server.
    Serve {
        /// Which service to run.
        #[arg(long, value_enum)]
        service: ServiceName,
        /// Port to listen on.
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Periodically trigger batch endpoints.
    Schedule {
        /// Full run-once URLs to POST, e.g. http://extraction:8080/extraction/run-once
        #[arg(long, required = true)]
        target: Vec<String>,
        /// Seconds between trigger rounds.
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
    },
    /// Publish suggestion-state gauges to the observability provider once.
    PublishMetrics,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("evalforge=info,warn"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json().with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Serve { service, port } => serve(service, port).await,
        Command::Schedule {
            target,
            interval_secs,
        } => run_schedule(target, Duration::from_secs(interval_secs)).await,
        Command::PublishMetrics => publish_dashboard_metrics().await,
    }
}
