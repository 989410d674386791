//! vtsync CLI
//!
//! Runs a vtsync client against an in-process reference server.
//!
//! # Commands
//!
//! - `demo` - Subscribe to a key, publish values and print what arrives
//! - `acls` - Refresh and print the ACL set

mod commands;

use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vtsync_protocol::Acl;

/// vtsync pub/sub sync tools.
#[derive(Parser)]
#[command(name = "vtsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(global = true, short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe to a key, publish values and print what arrives
    Demo {
        /// Key to publish under
        #[arg(short, long, default_value = "room/5")]
        key: String,

        /// Number of values to publish
        #[arg(short, long, default_value = "3")]
        count: usize,

        /// Advance poll interval in milliseconds
        #[arg(short, long, default_value = "100")]
        interval_ms: u64,
    },

    /// Refresh and print the ACL set
    Acls {
        /// ACL to serve, as `id=principal,principal` (repeatable)
        #[arg(short, long = "acl", value_parser = commands::acls::parse_acl)]
        acls: Vec<Acl>,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Demo {
            key,
            count,
            interval_ms,
        } => {
            commands::demo::run(&key, count, Duration::from_millis(interval_ms), &cli.format)
                .await?;
        }
        Commands::Acls { acls } => {
            commands::acls::run(acls, &cli.format).await?;
        }
        Commands::Version => {
            println!("vtsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
