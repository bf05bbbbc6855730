//! `inklayer`: inspect and export ink kept in a file-backed stroke store.

use clap::{Parser, Subcommand};
use inklayer_core::{AttemptId, DocumentId, FileInkStorage, InkConfig, InkPersistence, SessionId};
use inklayer_render::{ExportOptions, export_attempt_png};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("storage: {0}")]
    Storage(#[from] inklayer_core::StorageError),
    #[error("config: {0}")]
    Config(#[from] inklayer_core::ConfigError),
    #[error("export: {0}")]
    Export(#[from] inklayer_render::ExportError),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Parser, Debug)]
#[command(name = "inklayer", about = "Inspect and export freehand ink stores")]
struct Cli {
    /// Base directory of the file-backed store.
    #[arg(long, env = "INKLAYER_STORE", default_value = "ink")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the strokes of one (session, document) pair.
    List {
        #[arg(long)]
        session: String,
        #[arg(long)]
        document: String,
    },
    /// Render every stroke of an attempt to a PNG file.
    Export {
        #[arg(long)]
        attempt: String,
        /// Output path; defaults to `attempt_<id prefix>.png`.
        #[arg(long)]
        out: Option<PathBuf>,
        /// JSON config providing export padding and scale.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

async fn list(storage: &FileInkStorage, session: String, document: String) -> Result<(), CliError> {
    let strokes = storage
        .list_by_session_and_document(&SessionId::from(session), &DocumentId::from(document))
        .await?;
    if strokes.is_empty() {
        log::warn!("No strokes stored for this context");
    }
    for s in &strokes {
        println!(
            "{}\t{}\t{}\t{} pts\t[{:.1}, {:.1}, {:.1}, {:.1}]",
            s.id,
            s.attempt_id,
            s.tool.name(),
            s.points.len(),
            s.bbox.min_x,
            s.bbox.min_y,
            s.bbox.max_x,
            s.bbox.max_y
        );
    }
    Ok(())
}

async fn export(
    storage: &FileInkStorage,
    attempt: String,
    out: Option<PathBuf>,
    config: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = match config {
        Some(path) => InkConfig::load(path)?,
        None => InkConfig::default(),
    };
    let attempt_id = AttemptId::from(attempt);
    let image = export_attempt_png(storage, &attempt_id, &ExportOptions::from_config(&config)).await?;
    let path = out.unwrap_or_else(|| PathBuf::from(&image.file_name));
    std::fs::write(&path, &image.png).map_err(|source| CliError::Write {
        path: path.clone(),
        source,
    })?;
    println!("{} ({}x{})", path.display(), image.width, image.height);
    Ok(())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let storage = FileInkStorage::new(&cli.store)?;
    match cli.command {
        Command::List { session, document } => list(&storage, session, document).await,
        Command::Export {
            attempt,
            out,
            config,
        } => export(&storage, attempt, out, config).await,
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    log::debug!("Using store at {}", cli.store.display());

    match pollster::block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("inklayer: {}", e);
            ExitCode::FAILURE
        }
    }
}
