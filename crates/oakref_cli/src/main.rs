//! Command-line entry point for the oak reference store.
//!
//! # Responsibility
//! - Wire config, logging and the core operations together.
//! - Keep interactive editing out; conflicts use a fixed policy.

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use oakref_core::merge::FixedChoice;
use oakref_core::schema::store::open_schema_store;
use oakref_core::{
    build_export, load_config, open_db, ConflictChoice, Entry, ImportEngine, SchemaValidator,
    SourceId, SourceRepository, SqliteSourceRepository,
};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

/// Oak reference store maintenance tool.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML config file.
    #[arg(short, long, default_value = "oakref.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Prints the core version.
    Version,
    /// Writes the public JSON export.
    Export {
        /// Output file; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Appends an allowed value to an enumerated field.
    AddEnumValue { field: String, value: String },
    /// Lists sources.
    Sources,
    /// Deletes an unreferenced source.
    DeleteSource { id: SourceId },
    /// Bulk-imports a JSON array of entries attributed to one source.
    Import {
        #[arg(short, long)]
        source: SourceId,
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = OnConflict::Keep)]
        on_conflict: OnConflict,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OnConflict {
    Keep,
    Take,
    Skip,
}

impl From<OnConflict> for ConflictChoice {
    fn from(value: OnConflict) -> Self {
        match value {
            OnConflict::Keep => ConflictChoice::Keep,
            OnConflict::Take => ConflictChoice::Take,
            OnConflict::Skip => ConflictChoice::Skip,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    if let Commands::Version = cli.command {
        println!("oakref {}", oakref_core::core_version());
        return Ok(());
    }

    let config = load_config(&cli.config)?;
    oakref_core::logging::init_from_config(&config.logging)?;
    let conn = open_db(&config.database_path)?;

    match cli.command {
        Commands::Version => {}
        Commands::Export { output } => {
            let json = build_export(&conn)?.to_json_pretty()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("wrote {}", path.display());
                }
                None => println!("{json}"),
            }
        }
        Commands::AddEnumValue { field, value } => {
            let store = open_schema_store(config.schema_path.as_deref(), &conn);
            let mut validator = SchemaValidator::new(store.load_or_builtin()?)?;
            validator.add_enum_value(&field, &value, store.as_ref())?;
            println!("added `{}` to {field}", value.trim());
        }
        Commands::Sources => {
            let repo = SqliteSourceRepository::try_new(&conn)?;
            for source in repo.list_sources()? {
                println!("{}\t{}\t{}", source.id, source.source_type, source.name);
            }
        }
        Commands::DeleteSource { id } => {
            let repo = SqliteSourceRepository::try_new(&conn)?;
            repo.delete_source(id)?;
            println!("deleted source {id}");
        }
        Commands::Import {
            source,
            file,
            on_conflict,
        } => {
            let entries: Vec<Entry> = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
            let store = open_schema_store(config.schema_path.as_deref(), &conn);
            let validator = SchemaValidator::new(store.load_or_builtin()?)?;
            let engine = ImportEngine::try_new(&conn, &validator)?;
            let mut resolver = FixedChoice(on_conflict.into());
            let report = engine.import(source, entries, &mut resolver)?;

            for (name, outcome) in &report.entries {
                println!("{name}\t{outcome:?}");
            }
            println!(
                "written={} skipped={} invalid={} new_points={} unchanged_points={} conflicts={}",
                report.written(),
                report.skipped(),
                report.invalid(),
                report.new_points,
                report.unchanged_points,
                report.conflicts.len()
            );
            info!("event=cli_import module=cli status=ok");
        }
    }
    Ok(())
}
