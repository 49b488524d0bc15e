use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fpn")]
#[command(about = "Freelance project notifier: forwards new qualifying listings to a chat")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Poll and notify until interrupted (default)
    Run,
    /// Run a single cycle and print its summary
    Once,
    /// Create the dedupe table and exit
    Migrate,
}

/// Resolves on Ctrl-C. If the handler cannot be installed the loop keeps running
/// and the default signal disposition ends the process instead.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(err) => {
            error!(error = %err, "could not install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("fpn=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = fpn_sync::SyncConfig::from_env()?;
    config.log_redacted();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let dispatcher = fpn_sync::build_live_loop(&config).await?;
            info!("dispatch loop starting");
            dispatcher
                .run_until(shutdown_signal())
                .await;
        }
        Commands::Once => {
            let dispatcher = fpn_sync::build_live_loop(&config).await?;
            let summary = dispatcher.run_cycle().await?;
            println!(
                "cycle complete: run_id={} fetched={} qualified={} sent={} already_notified={} send_failures={}",
                summary.run_id,
                summary.fetched,
                summary.qualified,
                summary.sent,
                summary.already_notified,
                summary.send_failures
            );
        }
        Commands::Migrate => {
            let store = fpn_sync::open_store(&config).await?;
            println!("dedupe table ready ({})", store.backend_name());
        }
    }

    Ok(())
}
