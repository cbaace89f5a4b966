//! CLI entry and dispatch.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use bnews_core::config;
use bnews_core::news::NewsQuery;
use chrono::{DateTime, Utc};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

/// Environment variable holding the log filter (`RUST_LOG` syntax).
const LOG_ENV: &str = "BNEWS_LOG";

#[derive(Parser)]
#[command(name = "bnews")]
#[command(version)]
#[command(about = "Breaking News command-line client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Log in with an existing account
    Login {
        /// Account username
        #[arg(short, long)]
        username: String,

        /// Password (read from stdin when omitted)
        #[arg(long, env = "BNEWS_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Create a new account and log in
    Register {
        /// Display name shown with your articles
        #[arg(short, long)]
        nickname: String,

        /// Account username
        #[arg(short, long)]
        username: String,

        /// Password (read from stdin when omitted)
        #[arg(long, env = "BNEWS_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Log out and forget stored credentials
    Logout,

    /// Rotate the stored tokens
    Refresh,

    /// Show the current session
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Read and publish news
    News {
        #[command(subcommand)]
        command: NewsCommands,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum NewsCommands {
    /// List the news feed, newest first
    List {
        /// Page number
        #[arg(long, default_value_t = 0)]
        page: u32,

        /// Only articles by this author
        #[arg(long)]
        author: Option<String>,

        /// Only articles in this category
        #[arg(long)]
        category: Option<u32>,

        /// Only articles whose title contains this text
        #[arg(long)]
        title: Option<String>,

        /// Only articles whose body contains this text
        #[arg(long)]
        text: Option<String>,

        /// Only articles created at this time (RFC 3339)
        #[arg(long, value_name = "TIME")]
        created_at: Option<DateTime<Utc>>,

        /// Only articles created at or before this time (RFC 3339)
        #[arg(long, value_name = "TIME")]
        until: Option<DateTime<Utc>>,

        /// Only articles created at or after this time (RFC 3339)
        #[arg(long, value_name = "TIME")]
        since: Option<DateTime<Utc>>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Publish an article (requires login)
    Create {
        /// Article title
        #[arg(long)]
        title: String,

        /// Article body
        #[arg(long)]
        content: String,

        /// Image file to attach (repeatable)
        #[arg(long = "image", value_name = "PATH")]
        images: Vec<PathBuf>,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Generate a fresh config from Rust defaults
    Generate,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    // Config commands must work even when the config file is broken.
    let command = match cli.command {
        Commands::Config { command } => {
            return match command {
                ConfigCommands::Path => {
                    commands::config::path();
                    Ok(())
                }
                ConfigCommands::Init => commands::config::init(),
                ConfigCommands::Generate => commands::config::generate(),
            };
        }
        other => other,
    };

    let config = config::Config::load().context("load config")?;

    match command {
        Commands::Login { username, password } => {
            commands::auth::login(&config, &username, password).await
        }
        Commands::Register {
            nickname,
            username,
            password,
        } => commands::auth::register(&config, &nickname, &username, password).await,
        Commands::Logout => commands::auth::logout(&config).await,
        Commands::Refresh => commands::auth::refresh(&config).await,
        Commands::Status { json } => commands::auth::status(json),

        Commands::News { command } => match command {
            NewsCommands::List {
                page,
                author,
                category,
                title,
                text,
                created_at,
                until,
                since,
                json,
            } => {
                let query = NewsQuery {
                    page: Some(page),
                    created_at,
                    created_until: until,
                    created_since: since,
                    author,
                    category,
                    title_contains: title,
                    text_contains: text,
                };
                commands::news::list(&config, &query, json).await
            }
            NewsCommands::Create {
                title,
                content,
                images,
            } => commands::news::create(&config, title, content, &images).await,
        },

        // handled before config load
        Commands::Config { .. } => Ok(()),
    }
}
