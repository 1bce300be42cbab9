//! Inventory CLI - inspect schemas and replay requests against the graph engine.
//!
//! # Usage
//!
//! ```bash
//! # List node types of a schema version
//! inventory schema types --schema-version v1
//!
//! # Show how a request path compiles
//! inventory explain /cloud-infrastructure/pservers/pserver/h1
//!
//! # Look up the edge rule between two types
//! inventory rule pserver complex
//!
//! # Replay a request script
//! inventory run requests.yaml --format json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use inventory_cli::{commands, output, OutputFormat};
use inventory_core::logging;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "inventory")]
#[command(about = "Schema-governed inventory graph", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "INVENTORY_CONFIG")]
    config: Option<PathBuf>,

    /// Output format (human, json, yaml)
    #[arg(long, global = true, default_value = "human")]
    format: OutputFormatArg,

    /// Schema version to inspect (default: the engine's default version)
    #[arg(long, global = true)]
    schema_version: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormatArg {
    Human,
    Json,
    Yaml,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Yaml => OutputFormat::Yaml,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Schema inspection
    #[command(subcommand)]
    Schema(SchemaCommands),

    /// Show the edge rule between two node types
    Rule {
        /// First node type
        a: String,

        /// Second node type
        b: String,
    },

    /// Compile a request path into its traversal plan
    Explain {
        /// Request path, optionally versioned and with a query string
        path: String,
    },

    /// Replay a YAML or JSON request script against an empty graph
    Run {
        /// Script path
        script: PathBuf,

        /// Skip resource-version checks
        #[arg(long)]
        no_version_check: bool,
    },
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// List loaded schema versions
    Versions,

    /// List node types
    Types,

    /// Show one node type
    Show {
        /// Node type name
        node_type: String,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::error(format!("{:#}", e));
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = commands::load_config(cli.config.as_deref()).await?;
    if cli.verbose {
        config.general_mut().log_level = "debug".to_string();
    }
    if let Commands::Run { no_version_check: true, .. } = cli.command {
        config.serializer_mut().version_check = false;
    }
    logging::init_from_config(&config);

    let format = OutputFormat::from(cli.format);
    let version = cli.schema_version.as_deref();
    let engine = commands::open_engine(config).await?;

    match cli.command {
        Commands::Schema(schema_cmd) => match schema_cmd {
            SchemaCommands::Versions => commands::schema_versions(&engine, format)?,
            SchemaCommands::Types => commands::schema_types(&engine, version, format)?,
            SchemaCommands::Show { node_type } => {
                commands::schema_show(&engine, version, &node_type, format)?
            }
        },

        Commands::Rule { a, b } => commands::edge_rule(&engine, version, &a, &b, format)?,

        Commands::Explain { path } => commands::explain(&engine, &path, format)?,

        Commands::Run { script, .. } => commands::run(&engine, &script, format).await?,
    }

    Ok(())
}
