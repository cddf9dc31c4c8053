use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use tracing::info;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use snapstore::cli::{Cli, Command};
use snapstore::config::Config;
use snapstore::{FileEntry, SnapshotStore};

fn setup_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Collect every regular file under `dir` as a relative file entry
fn collect_dir(dir: &std::path::Path) -> Result<Vec<FileEntry>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(dir)?;
        let path = rel
            .to_str()
            .ok_or_else(|| eyre!("Non-UTF-8 path: {}", rel.display()))?
            .replace(std::path::MAIN_SEPARATOR, "/");
        let content = std::fs::read_to_string(entry.path())
            .context(format!("Failed to read file: {}", entry.path().display()))?;
        files.push(FileEntry { path, content });
    }

    Ok(files)
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let store_path = cli.store.unwrap_or(config.store_path);

    info!(?store_path, "snapstore starting");
    let store = SnapshotStore::open(&store_path)?;

    match cli.command {
        Command::List => {
            let refs = store.list()?;
            if refs.is_empty() {
                println!("No snapshots found");
            } else {
                for snapshot_ref in refs {
                    println!("{}", snapshot_ref);
                }
            }
        }
        Command::Cat {
            snapshot_ref,
            path,
            json,
        } => {
            let mut files = store.extract(&snapshot_ref)?;
            if let Some(path) = path {
                files.retain(|f| f.path == path);
                if files.is_empty() {
                    return Err(eyre!("File not found in snapshot: {}", path));
                }
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&files)?);
            } else {
                for file in files {
                    println!("{}", format!("==> {} <==", file.path).yellow());
                    println!("{}", file.content);
                }
            }
        }
        Command::Pack { dir } => {
            let files = collect_dir(&dir)?;
            let snapshot_ref = store.store(&files)?;
            println!(
                "{} Packed {} file(s) to snapshot: {}",
                "✓".green(),
                files.len(),
                snapshot_ref.cyan()
            );
        }
        Command::Stats { snapshot_ref } => {
            let stats = store.stats(&snapshot_ref)?;
            println!("Snapshot: {}", snapshot_ref.cyan());
            println!("  Files: {}", stats.file_count);
            println!("  Content bytes: {}", stats.content_bytes);
            println!("  Archive bytes: {}", stats.archive_bytes);
        }
    }

    Ok(())
}
