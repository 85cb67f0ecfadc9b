//! Entry point: parse CLI flags, install the global tracing subscriber,
//! and hand off to the system controller. Exit code follows spec §6:
//! zero on success, non-zero on any failure the controller reports.

use aiperf::Cli;
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = aiperf_otel::init_tracing(cli.log_json) {
        eprintln!("warning: failed to initialize tracing: {err}");
    }

    let overrides = cli.to_overrides();
    match aiperf::controller::run(cli.config.as_deref(), &overrides).await {
        Ok(results) => {
            tracing::info!(
                total_records = results.total_records,
                error_records = results.error_records,
                "aiperf run finished"
            );
        }
        Err(err) => {
            tracing::error!(error = %err, "aiperf run failed");
            std::process::exit(1);
        }
    }
}
