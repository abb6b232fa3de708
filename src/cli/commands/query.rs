//! SQL query CLI command
//!
//! Provides a command to execute SQL statements against the library database.

use std::path::PathBuf;

use crate::cli::error::CliError;

/// Query command arguments
#[derive(Debug, Clone)]
pub struct QueryArgs {
    /// SQL statement to execute
    pub sql: String,
    /// Configuration file
    pub config: Option<PathBuf>,
    /// Output format
    pub format: String,
}

/// Execute a SQL statement and print any rows it returns
#[cfg(feature = "postgres-backend")]
pub fn handle_query(args: &QueryArgs) -> Result<(), CliError> {
    use crate::database::{
        Connector, DatabaseBackend, LoaderConfig, OutputFormat, PostgresConnector,
        format_query_result,
    };

    if args.sql.trim().is_empty() {
        return Err(CliError::InvalidArgument("No SQL statement provided".to_string()));
    }

    let config = LoaderConfig::load(args.config.as_deref())
        .map_err(|e| CliError::ConfigError(e.to_string()))?;

    // Parse output format
    let output_format: OutputFormat = args
        .format
        .parse()
        .map_err(|e: String| CliError::InvalidArgument(e))?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::IoError(format!("Failed to create runtime: {}", e)))?;

    rt.block_on(async {
        let connector = PostgresConnector::new(config.database.clone());
        let mut backend = connector.connect().await?;

        let result = backend.query(&args.sql).await;
        backend.close().await?;
        let result = result?;

        let output = format_query_result(&result, output_format);
        println!("{}", output);

        // Print execution time for non-JSON formats
        if output_format != OutputFormat::Json {
            eprintln!("\nExecution time: {}ms", result.execution_time_ms);
        }

        Ok::<(), CliError>(())
    })
}

#[cfg(not(feature = "postgres-backend"))]
pub fn handle_query(_args: &QueryArgs) -> Result<(), CliError> {
    Err(CliError::InvalidArgument(
        "Database support not enabled. Build with --features postgres-backend".to_string(),
    ))
}
