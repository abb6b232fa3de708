//! Pipeline command handlers (drop, rebuild, build, import, dry-run)

use std::borrow::Cow;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::cli::error::CliError;
use crate::database::LoaderConfig;
use crate::database::config::sample_config;
use crate::database::schema::{InstallReport, LIBRARY_DDL, load_ddl};
use crate::pipeline::{PipelineMode, PipelineReport, SheetStatus, SkipReason};

/// Arguments shared by every pipeline command
#[derive(Debug, Clone)]
pub struct LoadArgs {
    /// Configuration file
    pub config: Option<PathBuf>,
    /// Workbook override
    pub workbook: Option<PathBuf>,
    /// DDL file override
    pub ddl: Option<PathBuf>,
    /// What to run
    pub mode: PipelineMode,
}

fn load_config(path: Option<&Path>) -> Result<LoaderConfig, CliError> {
    if let Some(path) = path
        && !path.exists()
    {
        return Err(CliError::FileNotFound(path.to_path_buf()));
    }

    LoaderConfig::load(path).map_err(|e| CliError::ConfigError(e.to_string()))
}

/// DDL text: explicit override, then configured path, then the bundled schema
fn resolve_ddl(
    config: &LoaderConfig,
    ddl_override: Option<&Path>,
) -> Result<Cow<'static, str>, CliError> {
    match ddl_override.or(config.import.ddl.as_deref()) {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::FileNotFound(path.to_path_buf()));
            }
            Ok(Cow::Owned(load_ddl(path)?))
        }
        None => Ok(Cow::Borrowed(LIBRARY_DDL)),
    }
}

fn needs_workbook(mode: &PipelineMode) -> bool {
    !matches!(mode, PipelineMode::DropOnly)
}

/// Run a pipeline mode against the configured database and workbook
#[cfg(feature = "postgres-backend")]
pub fn handle_load(args: &LoadArgs) -> Result<(), CliError> {
    use crate::database::PostgresConnector;
    use crate::import::WorkbookSource;
    use crate::pipeline::Pipeline;

    let config = load_config(args.config.as_deref())?;

    let workbook = match &args.workbook {
        Some(path) => path.clone(),
        None if needs_workbook(&args.mode) => config.workbook_path()?.to_path_buf(),
        None => PathBuf::new(),
    };
    if needs_workbook(&args.mode) && !workbook.exists() {
        return Err(CliError::FileNotFound(workbook));
    }

    let ddl = resolve_ddl(&config, args.ddl.as_deref())?;

    let connector = PostgresConnector::new(config.database.clone());
    let mut pipeline = Pipeline::new(connector, WorkbookSource::new(workbook)).with_ddl(ddl);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::IoError(format!("Failed to create runtime: {}", e)))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let report = rt.block_on(pipeline.run(&args.mode, &mut out))?;
    drop(out);

    let mut err = std::io::stderr().lock();
    print_summary(&report, &args.mode, &mut err)
        .map_err(|e| CliError::IoError(format!("Failed to write summary: {}", e)))
}

#[cfg(not(feature = "postgres-backend"))]
pub fn handle_load(_args: &LoadArgs) -> Result<(), CliError> {
    Err(CliError::InvalidArgument(
        "PostgreSQL backend not enabled. Build with --features postgres-backend".to_string(),
    ))
}

/// Print warnings and totals for a finished run
pub fn print_summary(
    report: &PipelineReport,
    mode: &PipelineMode,
    out: &mut dyn Write,
) -> std::io::Result<()> {
    if report.dropped {
        writeln!(out, "All managed tables dropped.")?;
    }

    if let Some(schema) = &report.schema {
        print_install(schema, out)?;
    }

    for warning in report.warnings() {
        writeln!(out, "[WARNING] {}", warning)?;
    }

    for sheet in &report.sheets {
        if let SheetStatus::Skipped { reason } = &sheet.status {
            match reason {
                SkipReason::Empty => {}
                SkipReason::Unreadable { cause } => {
                    writeln!(out, "[WARNING] {}: not loaded, {}", sheet.sheet, cause)?;
                }
                SkipReason::NoConnection { cause } => {
                    writeln!(
                        out,
                        "[WARNING] {}: not loaded, could not connect to DB: {}",
                        sheet.sheet, cause
                    )?;
                }
            }
        }
    }

    match mode {
        PipelineMode::DropOnly => {}
        PipelineMode::DryRun { target } => {
            writeln!(
                out,
                "Dry run for {}: {} sheets read, {} rows would be rejected",
                target,
                report.sheets.len(),
                report.errors()
            )?;
        }
        _ => {
            writeln!(
                out,
                "Import finished: {} rows inserted, {} errors",
                report.inserted(),
                report.errors()
            )?;
        }
    }

    Ok(())
}

fn print_install(schema: &InstallReport, out: &mut dyn Write) -> std::io::Result<()> {
    for failure in schema.failures() {
        writeln!(
            out,
            "[WARNING] Schema statement {} failed ({}): {}",
            failure.index,
            failure.summary(),
            failure.error.as_deref().unwrap_or_default()
        )?;
    }
    writeln!(
        out,
        "Schema installed: {} of {} statements succeeded",
        schema.executed(),
        schema.outcomes.len()
    )
}

/// Print the DDL the build modes would install
pub fn handle_schema(config: Option<&Path>, ddl: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(config)?;
    let ddl = resolve_ddl(&config, ddl)?;
    println!("{}", ddl.trim_end());
    Ok(())
}

/// Print a sample configuration file
pub fn handle_config() -> Result<(), CliError> {
    print!("{}", sample_config());
    Ok(())
}
