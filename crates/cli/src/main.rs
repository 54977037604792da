mod config_commands;
mod simulate_commands;

use std::path::{Path, PathBuf};

use {
    anyhow::bail,
    clap::{Parser, Subcommand},
    spamgate_config::{SpamgateConfig, validate::Severity},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "spamgate",
    about = "spamgate: moderation plugin for the random_spam channel",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of ./spamgate.toml and friends).
    #[arg(long, global = true, env = "SPAMGATE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the hooks to the host over stdio (default when no subcommand is provided).
    Serve,
    /// Run a post through the hooks against an in-memory host.
    Simulate(simulate_commands::SimulateArgs),
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

/// Initialise tracing. Everything goes to stderr: stdout carries the wire
/// protocol when serving.
fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Load the configuration and refuse to continue when it has errors.
/// Warnings are logged.
pub(crate) fn load_validated(path: Option<&Path>) -> anyhow::Result<SpamgateConfig> {
    let config = spamgate_config::load_or_discover(path)?;

    let result = spamgate_config::validate(&config);
    for d in &result.diagnostics {
        warn!(path = %d.path, severity = %d.severity, "{}", d.message);
    }
    if result.has_errors() {
        bail!(
            "configuration has {} error(s); run `spamgate config check`",
            result.count(Severity::Error)
        );
    }
    Ok(config)
}

async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_validated(config_path.as_deref())?;
    let registry = spamgate_plugins::default_registry(&config);
    spamgate_plugins::client_main(registry, &config).await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "spamgate starting");

    match cli.command {
        // Default: serve when no subcommand is provided
        None | Some(Commands::Serve) => serve(cli.config).await,
        Some(Commands::Simulate(args)) => {
            simulate_commands::handle_simulate(args, cli.config.as_deref()).await
        },
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action, cli.config.as_deref())
        },
    }
}
