//! promshm demo - drive a shared metric store and print the exposition.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use promshm_demo::{run, Args};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "promshm_demo=info,promshm_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = args.into_config()?;

    tracing::info!(
        registry = %config.store.registry_name,
        segment_size = config.store.segment_size,
        workers = config.workers,
        iterations = config.iterations,
        "configuration loaded"
    );

    let report = match run(&config) {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "workload failed");
            return Err(e.into());
        }
    };

    tracing::info!(
        requests = report.requests,
        arena_bytes = report.arena_bytes,
        arena_peak = report.arena_peak,
        "rendering exposition"
    );
    print!("{}", report.exposition);

    Ok(())
}
