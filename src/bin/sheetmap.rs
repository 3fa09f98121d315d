//! sheetmap CLI - run spreadsheet imports against a workspace file
//!
//! The workspace seeds an in-memory store with requests, configurations,
//! attachments and lookup tables; see `sheetmap::config_loader`.

use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use sheetmap::{
    load_workspace, Collaborators, ExtensionRegistry, ImportOrchestrator, MappingSpec,
    NdjsonWriter,
};

#[derive(Parser)]
#[command(name = "sheetmap")]
#[command(version, about = "Declarative spreadsheet import engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import the newest spreadsheet attachment of a request
    Run {
        /// Path to the workspace YAML file
        #[arg(short, long, default_value = "workspace.yaml")]
        workspace: PathBuf,

        /// Import request ID
        #[arg(short, long)]
        request: String,

        /// Write created records as NDJSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a mapping document without importing anything
    Validate {
        /// Path to the JSON mapping document
        #[arg(short, long)]
        mapping: PathBuf,
    },

    /// List the registered extension functions
    Extensions,
}

fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            workspace,
            request,
            output,
        } => run(workspace, &request, output),
        Commands::Validate { mapping } => validate(mapping),
        Commands::Extensions => {
            for name in ExtensionRegistry::with_builtins().list_extensions() {
                println!("{}", name);
            }
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("✗ {}", e);
        process::exit(1);
    }
}

fn run(workspace: PathBuf, request: &str, output: Option<PathBuf>) -> Result<(), String> {
    let store = load_workspace(&workspace).map_err(|e| e.to_string())?;
    let extensions = ExtensionRegistry::with_builtins();

    let orchestrator = ImportOrchestrator::new(Collaborators::from_store(&store), &extensions);
    let outcome = orchestrator.run(request);

    if let Some(path) = output {
        let file = File::create(&path)
            .map_err(|e| format!("Failed to create {}: {}", path.display(), e))?;
        let mut writer = NdjsonWriter::new(BufWriter::new(file));
        writer
            .write_records(&store.created_records())
            .map_err(|e| e.to_string())?;
        println!("  ℹ Wrote {} record(s) to {}", writer.written(), path.display());
    }

    for entry in store.run_logs().iter() {
        println!("── run log ({}) ──", entry.config_id);
        println!("{}", entry.text);
    }

    if outcome.success {
        println!("✓ {}", outcome.message);
        Ok(())
    } else {
        Err(outcome.message)
    }
}

fn validate(mapping: PathBuf) -> Result<(), String> {
    let raw = std::fs::read_to_string(&mapping)
        .map_err(|e| format!("Failed to read {}: {}", mapping.display(), e))?;
    let spec = MappingSpec::parse(&raw).map_err(|e| e.to_string())?;

    for m in spec.all_mappings() {
        println!("  {} -> {} ({})", m.label, m.destination_field, m.process);
    }
    println!("✓ {} mapping(s) valid", spec.len());
    Ok(())
}
