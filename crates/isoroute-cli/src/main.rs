// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use clap::{Parser, Subcommand};
use isoroute_cli::commands;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "isoroute")]
#[command(author = "Maravilla Labs")]
#[command(version)]
#[command(about = "File-system routed, isomorphic Lua web apps", long_about = None)]
struct Cli {
    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start development server with live reload
    Dev {
        /// Port to run the dev server on (default: config or 3000)
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind to (default: config or 127.0.0.1)
        #[arg(long)]
        host: Option<String>,
    },
    /// Serve the application for production (no live reload)
    Serve {
        /// Port to run the server on (default: config or 3000)
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind to (default: config or 127.0.0.1)
        #[arg(long)]
        host: Option<String>,
    },
    /// Print the compiled route table
    Routes,
    /// Write the client route manifest
    Manifest {
        /// Output file, or "-" for stdout (default: <out_dir>/manifest.json)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with the specified log level
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Dev { port, host } => commands::dev::run(host, port).await,
        Commands::Serve { port, host } => commands::serve::run(host, port).await,
        Commands::Routes => commands::routes::run(),
        Commands::Manifest { output } => commands::manifest::run(output),
    }
}
