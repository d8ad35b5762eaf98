mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "quotebot")]
#[command(about = "Free-text market queries in, chat-ready answers out", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one query and print the rendered message parts
    Ask {
        /// Query text, e.g. 茅台近30日K线
        query: String,

        /// Channel profile: qq, telegram or plain
        #[arg(short, long)]
        channel: Option<String>,

        /// Print the raw result record as JSON instead of rendering
        #[arg(long)]
        json: bool,
    },

    /// Interactive query loop (exit or quit to leave)
    Repl {
        /// Channel profile: qq, telegram or plain
        #[arg(short, long)]
        channel: Option<String>,
    },

    /// Show resolved configuration, rule tables and cache usage
    Status,

    /// Generate shell completion scripts
    Completions {
        /// Target shell: bash, zsh, fish, powershell, elvish
        shell: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    match cli.command {
        Commands::Ask {
            query,
            channel,
            json,
        } => {
            commands::ask::run(&query, channel.as_deref(), json).await?;
        }
        Commands::Repl { channel } => {
            commands::repl::run(channel.as_deref()).await?;
        }
        Commands::Status => {
            commands::status::run().await?;
        }
        Commands::Completions { shell } => {
            commands::completions_cmd::run(&shell).await?;
        }
    }

    Ok(())
}
