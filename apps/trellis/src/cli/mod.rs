//! # Trellis CLI Module
//!
//! This module implements the CLI interface for Trellis.
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new record database
//! - `status` - Show database status and effective settings
//! - `demo` - Store the demonstration mission
//! - `records` - Dump every stored record
//! - `load` - Load an entity and print its object graph
//! - `delete` - Delete an entity's record

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use trellis_core::TrellisError;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Trellis - object graphs over key/value records
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

    /// Path to the record database
    #[arg(short = 'D', long, global = true, default_value = "trellis.db")]
    pub database: PathBuf,

    /// Path to a TOML settings file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

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
    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Show database status
    Status,

    /// Store the demonstration mission
    Demo,

    /// Dump every stored record
    Records,

    /// Load an entity and print its object graph
    Load {
        /// Type name (Mission, RocketShip)
        #[arg(short = 't', long = "type")]
        type_name: String,

        /// Entity id: a number or a name
        #[arg(short, long)]
        id: String,

        /// Activation depth (overrides the settings file)
        #[arg(short, long)]
        depth: Option<u32>,
    },

    /// Delete an entity's record
    Delete {
        /// Type name (Mission, RocketShip)
        #[arg(short = 't', long = "type")]
        type_name: String,

        /// Entity id: a number or a name
        #[arg(short, long)]
        id: String,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), TrellisError> {
    let json_mode = cli.json_mode;
    let settings = crate::config::load_settings(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&cli.database, &settings, force),
        Some(Commands::Status) => cmd_status(&cli.database, &settings, json_mode),
        Some(Commands::Demo) => cmd_demo(&cli.database, &settings, json_mode),
        Some(Commands::Records) => cmd_records(&cli.database, &settings, json_mode),
        Some(Commands::Load {
            type_name,
            id,
            depth,
        }) => cmd_load(&cli.database, &settings, json_mode, &type_name, &id, depth),
        Some(Commands::Delete { type_name, id }) => {
            cmd_delete(&cli.database, &settings, json_mode, &type_name, &id)
        }
        None => {
            // No subcommand - show status by default
            cmd_status(&cli.database, &settings, json_mode)
        }
    }
}
