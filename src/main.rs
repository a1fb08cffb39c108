use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use chatportal_rust::api::Portal;
use chatportal_rust::config::AppConfig;
use chatportal_rust::rag::QueryMode;

#[derive(Parser)]
#[command(
    author,
    version = env!("CARGO_PKG_VERSION"),
    about = "AI chat portal: conversations, summaries and retrieval",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new conversation
    New {
        #[arg(long)]
        title: Option<String>,

        /// Owner id; omit for a guest conversation
        #[arg(long)]
        owner: Option<String>,
    },

    /// Send a user message and print the AI reply
    Say { id: String, text: String },

    /// End a conversation, summarize it and index its messages
    End { id: String },

    /// Search past conversations
    Ask {
        query: String,

        /// lexical or vector; defaults to what the active backend supports
        #[arg(long)]
        mode: Option<QueryMode>,
    },

    /// List conversations, most recently active first
    List,

    /// Show a conversation with its messages
    Show { id: String },

    Rename { id: String, title: String },

    Delete { id: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let portal = Portal::open(&config)?;
    debug!(
        backend = config.backend.as_str(),
        provider = portal.provider_name(),
        query_mode = portal.query_mode().as_str(),
        "portal ready"
    );

    match cli.command {
        Commands::New { title, owner } => {
            print_json(&portal.start_conversation(owner.as_deref(), title.as_deref())?)?
        }
        Commands::Say { id, text } => print_json(&portal.send_message(&id, &text)?)?,
        Commands::End { id } => print_json(&portal.end_conversation(&id)?)?,
        Commands::Ask { query, mode } => {
            let mode = mode.unwrap_or(portal.query_mode());
            print_json(&portal.query_with_mode(&query, mode)?)?
        }
        Commands::List => print_json(&portal.list_conversations()?)?,
        Commands::Show { id } => print_json(&portal.conversation_detail(&id)?)?,
        Commands::Rename { id, title } => print_json(&portal.rename_conversation(&id, &title)?)?,
        Commands::Delete { id } => {
            portal.delete_conversation(&id)?;
            println!("deleted {id}");
        }
    }

    Ok(())
}
