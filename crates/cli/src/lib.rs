pub mod commands;

use std::io;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use shopdesk_agent::MessageContext;
use shopdesk_core::config::AppConfig;

#[derive(Debug, Parser)]
#[command(
    name = "shopdesk",
    about = "Shopdesk support assistant CLI",
    long_about = "Ask the support assistant questions, run an interactive session, and inspect configuration readiness.",
    after_help = "Examples:\n  shopdesk ask \"What is your return policy?\"\n  shopdesk chat --customer-id cust_42\n  shopdesk doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct Identity {
    #[arg(long, help = "Conversation owner; enables per-user memory")]
    user_id: Option<String>,
    #[arg(long, help = "Customer id used for order history lookups")]
    customer_id: Option<String>,
}

impl From<Identity> for MessageContext {
    fn from(identity: Identity) -> Self {
        Self { user_id: identity.user_id, customer_id: identity.customer_id }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Answer a single message and print the structured reply")]
    Ask {
        message: String,
        #[command(flatten)]
        identity: Identity,
    },
    #[command(about = "Interactive session over stdin; type `exit` to leave")]
    Chat {
        #[command(flatten)]
        identity: Identity,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, knowledge base, profile and generation readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List the intent labels the classifier can produce")]
    Intents,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { message, identity } => commands::ask::run(&message, identity.into()),
        Command::Chat { identity } => commands::chat::run(identity.into()),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Intents => commands::intents::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout carries only command output.
pub fn init_logging(config: &AppConfig) {
    use shopdesk_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder =
        tracing_subscriber::fmt().with_target(false).with_max_level(log_level).with_writer(io::stderr);

    // A subscriber may already be installed when commands run in-process.
    let _ = match config.logging.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };
}
