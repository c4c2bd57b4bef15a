use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chat_relay::db::{CheckpointRepo, ConversationRepo};
use chat_relay::{Config, Daemon};

/// Chat Relay - GroupMe and SMS bot with conversation memory
#[derive(Parser)]
#[command(name = "chat-relay", version, about)]
struct Cli {
    /// Port to listen on (overrides `RELAY_PORT`/`PORT`)
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve webhooks and poll (default)
    Serve,
    /// Catch up on missed group messages once and exit
    PollOnce,
    /// Print a user's stored conversation
    Show {
        /// User ID (`GroupMe` user id, or `sms:<number>`)
        user: String,
    },
    /// Print a group's checkpoint
    Checkpoint {
        /// `GroupMe` group id
        group: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,chat_relay=info",
        1 => "info,chat_relay=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let daemon = Daemon::new(config)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => daemon.run().await?,
        Command::PollOnce => {
            let processed = daemon.catch_up().await?;
            println!("processed {processed} message(s)");
        }
        Command::Show { user } => show_conversation(&daemon, &user).await,
        Command::Checkpoint { group } => {
            let repo = CheckpointRepo::new(daemon.db().clone());
            match repo.load(&group).await {
                Some(checkpoint) => println!(
                    "{group}: {} (updated {})",
                    checkpoint.last_message_id.as_deref().unwrap_or("-"),
                    checkpoint.updated_at.to_rfc3339()
                ),
                None => println!("{group}: no checkpoint"),
            }
        }
    }

    Ok(())
}

async fn show_conversation(daemon: &Daemon, user: &str) {
    let repo = ConversationRepo::new(daemon.db().clone());
    let record = repo.load(user).await;

    if record.history.is_empty() && record.summary.is_empty() {
        println!("No conversation stored for {user}");
        return;
    }

    if !record.summary.is_empty() {
        println!("Summary:\n{}\n", record.summary);
    }

    println!("History ({} turns):", record.history.len());
    for turn in &record.history {
        println!("  [{}] {}", turn.role, turn.content);
    }
}
