//! salesdesk CLI — the main entry point.
//!
//! Commands:
//! - `ask`     — Run one customer request through the pipeline
//! - `chat`    — Interactive sales chat
//! - `seed`    — Load the demo catalog into the configured store
//! - `doctor`  — Diagnose config, store and provider
//! - `config`  — Print or check configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "salesdesk",
    about = "salesdesk — LLM sales assistant for an electronics shop",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single customer query
    Ask {
        /// The customer's message
        #[arg(short, long)]
        message: String,

        /// Customer context as a JSON object, e.g. '{"customer_name": "Lan"}'
        #[arg(short, long)]
        context: Option<String>,

        /// Reuse a session id instead of generating one
        #[arg(short, long)]
        session: Option<String>,

        /// User id recorded with the request
        #[arg(short, long, default_value = "cli")]
        user: String,

        /// Print every stage's output
        #[arg(long)]
        trace: bool,
    },

    /// Chat interactively; type `quit` or `exit` to leave
    Chat {
        /// User id recorded with each request
        #[arg(short, long, default_value = "cli")]
        user: String,

        /// Print every stage's output
        #[arg(long)]
        trace: bool,
    },

    /// Insert the demo catalog into the configured store
    Seed,

    /// Diagnose system health
    Doctor,

    /// Configuration commands (prints the default config by default)
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the default configuration
    Default,
    /// Print the effective configuration (API key redacted)
    Show,
    /// Validate the configuration file
    Validate,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Ask {
            message,
            context,
            session,
            user,
            trace,
        } => commands::ask::run(message, context, session, user, trace).await?,
        Commands::Chat { user, trace } => commands::chat::run(user, trace).await?,
        Commands::Seed => commands::seed::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Default) {
            ConfigAction::Default => commands::config_cmd::default(),
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Validate => commands::config_cmd::validate()?,
            ConfigAction::Path => commands::config_cmd::path(),
        },
    }

    Ok(())
}
