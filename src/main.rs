//! Main entry point for the zipfolder CLI application.
//!
//! Walks a directory tree through the overlay filesystem, so ZIP archives
//! are descended into like ordinary folders.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

use zipfolder::{Cli, LocalStorage, OverlayFs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let storage = LocalStorage::new(cli.basedir.clone());
    let fs = OverlayFs::new(storage, cli.overlay_config());

    let result = walk(&fs, &cli).await;
    fs.close().await;
    result
}

/// Depth-first walk printing `[d] path` and `[f] path` lines.
async fn walk(fs: &OverlayFs<LocalStorage>, cli: &Cli) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut pending = vec![cli.path.clone()];

    while let Some(dir) = pending.pop() {
        let entries = fs
            .read_dir(&dir)
            .await
            .with_context(|| format!("Failed to list '{}'", display(&dir)))?;

        let mut subdirs = Vec::new();
        for entry in entries {
            let path = if dir.is_empty() {
                entry.name.clone()
            } else {
                format!("{}/{}", dir, entry.name)
            };

            if entry.is_dir() {
                stdout.write_all(format!("[d] {path}\n").as_bytes()).await?;
                subdirs.push(path);
                continue;
            }

            if cli.wants_contents(&entry.name) {
                let data = fs
                    .read_file(&path)
                    .await
                    .with_context(|| format!("Failed to read '{path}'"))?;
                stdout.write_all(&data).await?;
            }
            stdout.write_all(format!("[f] {path}\n").as_bytes()).await?;
        }
        // Reversed so the stack pops children in listing order.
        pending.extend(subdirs.into_iter().rev());
    }

    stdout.flush().await?;
    Ok(())
}

fn display(dir: &str) -> &str {
    if dir.is_empty() { "." } else { dir }
}
