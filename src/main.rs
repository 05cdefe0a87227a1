//! Binary entry point: resolve configuration, load the catalog, open the
//! favorites store, then run either the TUI or a one-shot subcommand.
use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use vampbook::catalog::load::{load_catalog, sample_catalog};
use vampbook::config::{Args, Command, Config, FavoritesAction};
use vampbook::{
    logging, run_app, search, App, CatalogIndex, FavoritesStore, PersistenceCoordinator,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::resolve(&args)?;
    logging::init(&config)?;

    let songs = match &config.catalog_path {
        Some(path) => load_catalog(path)?,
        None => sample_catalog().context("bundled catalog is invalid")?,
    };
    let index = CatalogIndex::build(songs);
    info!(
        "Catalog ready: {} songs in {} groups",
        index.len(),
        index.groups_sorted_by_letter().len()
    );

    let coordinator = Arc::new(PersistenceCoordinator::new(config.db_path.clone()));
    let store = FavoritesStore::new(Arc::clone(&coordinator));

    let result = dispatch(args.command, index, store).await;
    if let Err(err) = &result {
        error!("Exiting with error: {:#}", err);
    }

    coordinator
        .close()
        .await
        .context("failed to close favorites database")?;
    result
}

async fn dispatch(
    command: Option<Command>,
    index: CatalogIndex,
    store: FavoritesStore,
) -> Result<()> {
    match command {
        None => {
            let mut app = App::new(index, store);
            run_app(&mut app).await
        }
        Some(Command::Search { query }) => {
            let query = query.join(" ");
            for song in search(&index, &query) {
                println!("{:<24} {}", song.id(), song.display_title());
            }
            Ok(())
        }
        Some(Command::Favorites { action }) => {
            match action.unwrap_or(FavoritesAction::List) {
                FavoritesAction::List => {
                    for entry in store.list_entries().await? {
                        let title = index
                            .song(&entry.song_id)
                            .map(|song| song.display_title())
                            .unwrap_or_else(|| "(not in catalog)".to_string());
                        let added = entry
                            .added_at_utc()
                            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                            .unwrap_or_default();
                        println!("{:<24} {:<16} {}", entry.song_id, added, title);
                    }
                }
                FavoritesAction::Add { song_id } => {
                    if index.song(&song_id).is_none() {
                        anyhow::bail!("unknown song id {song_id:?}");
                    }
                    store.add(&song_id).await?;
                    println!("Added {song_id}");
                }
                FavoritesAction::Remove { song_id } => {
                    store.remove(&song_id).await?;
                    println!("Removed {song_id}");
                }
            }
            Ok(())
        }
        Some(Command::Export { path }) => {
            let blob = store.coordinator().export().await?;
            fs::write(&path, &blob)
                .with_context(|| format!("failed to write snapshot to {}", path.display()))?;
            println!("Exported {} bytes to {}", blob.len(), path.display());
            Ok(())
        }
        Some(Command::Import { path }) => {
            let blob = fs::read(&path)
                .with_context(|| format!("failed to read snapshot {}", path.display()))?;
            let imported = store.coordinator().import_from(blob).await?;
            println!("Imported {imported} favorites from {}", path.display());
            Ok(())
        }
    }
}
