// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 fnship contributors

//! fnship CLI
//!
//! Local command-line interface for fnship projects.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

/// fnship - Deploy and version serverless functions
#[derive(Parser)]
#[command(name = "fnship")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Project directory
    #[arg(short = 'C', long = "chdir", default_value = ".")]
    pub chdir: PathBuf,

    /// Environment selecting project.<env>.json
    #[arg(short, long = "env")]
    pub env: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List functions in the project
    List,

    /// Validate the project and function configuration
    Validate {
        /// Function name patterns
        names: Vec<String>,
    },

    /// Build a function archive
    Build {
        /// Function name
        name: String,

        /// Output file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run the clean hooks of functions
    Clean {
        /// Function name patterns
        names: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so `build` can stream the archive to stdout.
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .init();

    let project = commands::ProjectArgs {
        path: cli.chdir,
        environment: cli.env,
    };

    match cli.command {
        Commands::List => commands::list::execute(&project).await,
        Commands::Validate { names } => commands::validate::execute(&project, &names).await,
        Commands::Build { name, output } => {
            commands::build::execute(&project, &name, output.as_deref()).await
        }
        Commands::Clean { names } => commands::clean::execute(&project, &names).await,
    }
}
