//! funnel-manager: export, import y preview de configuraciones de funnel.
//!
//! Códigos de salida: 0 ok, 2 uso, 3 entrada inválida, 4 no encontrado o
//! conflicto, 5 base de datos.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use funnel_core::catalog;
use funnel_core::transfer::{parse_upload, read_snapshot, SnapshotSummary};
use funnel_manager::{export_filename, export_funnel_config, format_export_for_download, import_funnel_config, AppError, Outcome};
use funnel_persistence::{build_dev_pool_from_env, init_dotenv, PgFunnelStore, PoolProvider};
use log::info;

#[derive(Parser, Debug)]
#[command(name = "funnel-manager")]
#[command(version, about = "Export and import complete funnel configurations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Export a funnel to a JSON file
    Export {
        /// Funnel id
        #[arg(long)]
        funnel: i64,

        /// Output directory
        #[arg(long, env = "FUNNEL_EXPORT_DIR", default_value = ".")]
        out: PathBuf,
    },

    /// Import a funnel from a JSON file
    Import {
        /// Path of the exported JSON document
        #[arg(long)]
        file: PathBuf,

        /// Overwrite the funnel that already targets the same product
        #[arg(long)]
        update_existing: bool,
    },

    /// Summarize a JSON file without touching the database
    Preview {
        #[arg(long)]
        file: PathBuf,
    },

    /// List stored funnels
    #[command(alias = "ls")]
    List,
}

fn open_store() -> Result<PgFunnelStore<PoolProvider>, AppError> {
    let pool = build_dev_pool_from_env()?;
    Ok(PgFunnelStore::from_pool(pool))
}

fn read_file(path: &Path) -> Result<Vec<u8>, AppError> {
    fs::read(path).map_err(|e| AppError::io(path, e))
}

fn run_export(funnel_id: i64, out: &Path) -> Result<()> {
    let store = open_store()?;
    let outcome = export_funnel_config(&store, funnel_id);
    let snapshot = match &outcome {
        Outcome::Success(snapshot) => snapshot,
        Outcome::Failure { kind, message } => {
            eprintln!("{}", format_export_for_download(&outcome));
            return Err(AppError::Transfer { kind: *kind,
                                            message: message.clone() }.into());
        }
    };

    fs::create_dir_all(out).map_err(|e| AppError::io(out, e))?;
    let path = out.join(export_filename(snapshot));
    fs::write(&path, format_export_for_download(&outcome)).map_err(|e| AppError::io(&path, e))?;
    info!("exported funnel {funnel_id} ({} steps, {} routes)", snapshot.steps.len(), snapshot.routes.len());
    println!("{}", path.display());
    Ok(())
}

fn run_import(file: &Path, update_existing: bool) -> Result<()> {
    let bytes = read_file(file)?;
    let document = parse_upload(&bytes).map_err(AppError::from)?;
    let store = open_store()?;
    let outcome = import_funnel_config(&store, &document, update_existing);
    println!("{}", serde_json::to_string_pretty(&outcome).context("render import report")?);
    match outcome.failure() {
        Some((kind, message)) => Err(AppError::Transfer { kind,
                                                          message: message.to_string() }.into()),
        None => Ok(()),
    }
}

fn run_preview(file: &Path) -> Result<()> {
    let bytes = read_file(file)?;
    let snapshot = read_snapshot(&bytes).map_err(AppError::from)?;
    println!("{}", SnapshotSummary::from(&snapshot));
    Ok(())
}

fn or_dash(id: Option<i64>) -> String {
    id.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

fn run_list() -> Result<()> {
    let store = open_store()?;
    let funnels = catalog::list_funnels(&store).map_err(AppError::from)?;
    for f in funnels {
        println!("{}\t{}\tproduct={}\tworkflow={}",
                 f.id,
                 f.name.as_deref().unwrap_or("-"),
                 or_dash(f.product_id),
                 or_dash(f.workflow_id));
    }
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<AppError>().map(AppError::exit_code).unwrap_or(1)
}

fn main() {
    init_dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Export { funnel, out } => run_export(*funnel, out),
        Commands::Import { file, update_existing } => run_import(file, *update_existing),
        Commands::Preview { file } => run_preview(file),
        Commands::List => run_list(),
    };

    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(exit_code(&err));
    }
}
