use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use entiflow_cli::commands;
use entiflow_cli::config::{CliConfig, DEFAULT_LOG_FILTER};
use entiflow_core::types::DbId;

#[derive(Parser)]
#[command(name = "entiflow")]
#[command(about = "Inspect and validate entity workflows from JSON snapshots")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the display status of every step of a workflow record
    Statuses {
        /// Workflow definition JSON
        #[arg(long)]
        definition: PathBuf,

        /// Workflow record JSON
        #[arg(long)]
        record: PathBuf,
    },

    /// Validate a workflow definition as the editor would before saving
    ///
    /// Exits non-zero when the definition has issues.
    Validate {
        /// Workflow definition JSON
        #[arg(long)]
        definition: PathBuf,

        /// Optional list of workflow options, to check start_workflow targets
        #[arg(long)]
        workflow_options: Option<PathBuf>,
    },

    /// Resolve the completion actions of a completed record into instructions
    ResolveActions {
        /// Workflow definition JSON
        #[arg(long)]
        definition: PathBuf,

        /// Workflow record JSON
        #[arg(long)]
        record: PathBuf,

        /// JSON list of the record's step submissions
        #[arg(long)]
        submissions: PathBuf,

        /// Entity type of the record's entity
        #[arg(long)]
        entity_type_id: DbId,
    },

    /// Compile a JSON list of field definitions into a metadata schema
    FieldsToSchema {
        /// Field definitions JSON
        input: PathBuf,
    },

    /// Parse a metadata schema into a list of field definitions
    SchemaToFields {
        /// Metadata schema JSON
        input: PathBuf,
    },

    /// Check entity metadata against its entity type's schema
    ///
    /// Exits non-zero when the metadata has issues.
    ValidateMetadata {
        /// Entity type JSON
        #[arg(long)]
        entity_type: PathBuf,

        /// Metadata object JSON
        #[arg(long)]
        metadata: PathBuf,
    },
}

fn run(cli: Cli, config: &CliConfig) -> anyhow::Result<ExitCode> {
    let (output, code) = match cli.command {
        Commands::Statuses { definition, record } => {
            let out = commands::statuses(&definition, &record)?;
            (commands::render(&out, config.pretty)?, ExitCode::SUCCESS)
        }
        Commands::Validate {
            definition,
            workflow_options,
        } => {
            let report = commands::validate(&definition, workflow_options.as_deref())?;
            let code = if report.is_valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            };
            (commands::render(&report, config.pretty)?, code)
        }
        Commands::ResolveActions {
            definition,
            record,
            submissions,
            entity_type_id,
        } => {
            let outcomes = commands::resolve(&definition, &record, &submissions, entity_type_id)?;
            (commands::render(&outcomes, config.pretty)?, ExitCode::SUCCESS)
        }
        Commands::FieldsToSchema { input } => {
            let schema = commands::compile_fields(&input)?;
            (commands::render(&schema, config.pretty)?, ExitCode::SUCCESS)
        }
        Commands::SchemaToFields { input } => {
            let fields = commands::parse_schema(&input)?;
            (commands::render(&fields, config.pretty)?, ExitCode::SUCCESS)
        }
        Commands::ValidateMetadata {
            entity_type,
            metadata,
        } => {
            let issues = commands::validate_metadata(&entity_type, &metadata)?;
            let code = if issues.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            };
            (commands::render(&issues, config.pretty)?, code)
        }
    };
    println!("{output}");
    Ok(code)
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let config = match CliConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&config.log_filter)
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli, &config) {
        Ok(code) => code,
        Err(e) => {
            let message = format!("{e:#}");
            tracing::error!(error = %message, "Command failed");
            ExitCode::FAILURE
        }
    }
}
