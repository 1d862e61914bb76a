use clap::{Parser, Subcommand};
use tracing::{error, info};

mod app;

use app::HostApp;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("PLUGHOST_GIT_SHA"), ")");

/// Runs scheduled workers supplied by deploy-time modules.
#[derive(Debug, Parser)]
#[command(name = "plughost", version = VERSION, about)]
struct Cli {
    /// Config file. Defaults to $PLUGHOST_CONFIG, then ./plughost.toml.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Start every configured worker and run until Ctrl-C (default).
    Run,
    /// Validate configuration and resolve every module and type, then exit.
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "plughost=info,plughost_workers=info,plughost_scheduler=info,plughost_modules=info,plughost_samples=info"
                    .into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = plughost_core::config::PlugHostConfig::load(cli.config.as_deref())?;
    info!(host = %config.host.name, version = VERSION, "plughost starting");

    let app = HostApp::bootstrap(config)?;
    match cli.command.unwrap_or(Command::Run) {
        Command::Check => {
            let problems = app.check().await;
            if problems > 0 {
                anyhow::bail!("configuration check found {problems} problem(s)");
            }
        }
        Command::Run => {
            app.run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("failed to listen for Ctrl-C: {e}");
                    std::future::pending::<()>().await;
                }
            })
            .await?;
        }
    }

    info!("plughost stopped");
    Ok(())
}
