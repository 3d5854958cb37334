//! Labelmap CLI
//!
//! Command-line tools for labelmap segmentations.
//!
//! # Commands
//!
//! - `import` - Build a segmentation from a descriptor and report the result
//! - `align` - Check where each segment of a descriptor lands
//!
//! A descriptor is a JSON file naming the reference volume geometry and the
//! discrete segments to merge into it.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Labelmap segmentation tools.
#[derive(Parser)]
#[command(name = "labelmap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import discrete segments into a new labelmap
    Import {
        /// Path to the descriptor file
        descriptor: PathBuf,

        /// Remove this segment after importing (repeatable)
        #[arg(short, long = "remove")]
        remove: Vec<u16>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show each segment's destination slice without importing
    Align {
        /// Path to the descriptor file
        descriptor: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Import {
            descriptor,
            remove,
            format,
        } => {
            commands::import::run(&descriptor, &remove, &format).await?;
        }
        Commands::Align { descriptor, format } => {
            commands::align::run(&descriptor, &format)?;
        }
        Commands::Version => {
            println!("labelmap CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
