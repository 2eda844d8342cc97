//! # Trellis CLI Module
//!
//! This module implements the CLI interface for Trellis.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `resources` - List resource types, their paths and capabilities
//! - `check` - Validate the configuration and seed
//! - `get` - Print one normalized resource document
//! - `list` - Print a normalized collection document

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use trellis_core::TrellisError;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Trellis - JSON:API server
///
/// Serves typed, linked resources as flat `{ data, included }` documents.
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Use the built-in User/Post/Comment data set instead of a config file
    #[arg(long, global = true)]
    pub demo: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides the config file)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List resource types, paths and capabilities
    Resources,

    /// Validate the configuration and seed data
    Check,

    /// Print one resource as a normalized document
    Get {
        /// Resource type or collection path (e.g. `User` or `users`)
        resource_type: String,

        /// Resource id
        id: String,

        /// Relationships to include (e.g. `Posts.Comments,Comments`)
        #[arg(short, long)]
        include: Option<String>,
    },

    /// Print a collection as a normalized document
    List {
        /// Resource type or collection path
        resource_type: String,

        /// Relationships to include
        #[arg(short, long)]
        include: Option<String>,

        /// Equality filters (`attribute=value`), repeatable
        #[arg(short, long)]
        filter: Vec<String>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), TrellisError> {
    let source = Source::from_flags(cli.config, cli.demo)?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => cmd_server(&source, host, port).await,
        Some(Commands::Resources) | None => cmd_resources(&source, json_mode),
        Some(Commands::Check) => cmd_check(&source, json_mode),
        Some(Commands::Get {
            resource_type,
            id,
            include,
        }) => cmd_get(&source, &resource_type, &id, include.as_deref()).await,
        Some(Commands::List {
            resource_type,
            include,
            filter,
        }) => cmd_list(&source, &resource_type, include.as_deref(), &filter).await,
    }
}

// =============================================================================
// TESTS
// =============================================================================
