//! CLI binary entry point for libdb-loader

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use libdb_loader::cli::commands::load::{LoadArgs, handle_config, handle_load, handle_schema};
#[cfg(feature = "cli")]
use libdb_loader::cli::commands::query::{QueryArgs, handle_query};
#[cfg(feature = "cli")]
use libdb_loader::pipeline::PipelineMode;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "libdb-loader")]
#[command(about = "Build and load the library database from an Excel workbook")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ./libdb.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Workbook to import, overriding EXCEL_PATH and the configuration file
    #[arg(short, long, global = true)]
    workbook: Option<PathBuf>,

    /// DDL file, overriding LIBDB_DDL_PATH and the bundled schema
    #[arg(long, global = true)]
    ddl: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Drop every library table and enumerated type
    Drop,
    /// Drop, install the schema, then import the workbook
    Rebuild,
    /// Install the schema, then import the workbook
    Build,
    /// Import the workbook into the existing schema
    Import,
    /// Parse the workbook and print the rows one table would receive
    DryRun {
        /// Sheet or table name
        #[arg(short, long, default_value = "Book")]
        table: String,
    },
    /// Print the DDL the build commands install
    Schema,
    /// Print a sample configuration file
    Config,
    /// Execute a SQL statement against the library database
    Query {
        /// SQL statement to execute
        sql: String,
        /// Output format (table, json, csv)
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();

    let load = |mode: PipelineMode| LoadArgs {
        config: cli.config.clone(),
        workbook: cli.workbook.clone(),
        ddl: cli.ddl.clone(),
        mode,
    };

    let result = match &cli.command {
        Commands::Drop => handle_load(&load(PipelineMode::DropOnly)),
        Commands::Rebuild => handle_load(&load(PipelineMode::DropAndBuild)),
        Commands::Build => handle_load(&load(PipelineMode::BuildOnly)),
        Commands::Import => handle_load(&load(PipelineMode::ImportOnly)),
        Commands::DryRun { table } => handle_load(&load(PipelineMode::DryRun {
            target: table.clone(),
        })),
        Commands::Schema => handle_schema(cli.config.as_deref(), cli.ddl.as_deref()),
        Commands::Config => handle_config(),
        Commands::Query { sql, format } => {
            let args = QueryArgs {
                sql: sql.clone(),
                config: cli.config.clone(),
                format: format.clone(),
            };
            handle_query(&args)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature is not enabled. Build with --features cli");
    std::process::exit(1);
}
