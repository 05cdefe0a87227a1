//! Command-line arguments and resolved runtime configuration.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use directories::BaseDirs;

/// Folder name used beneath the user's home directory for application data.
const DATA_DIR_NAME: &str = ".vampbook";
/// SQLite file holding the favorites table.
const DB_FILE_NAME: &str = "favorites.sqlite";
/// Log file; the TUI owns the terminal so logs never go to stdout.
const LOG_FILE_NAME: &str = "vampbook.log";

#[derive(Parser, Debug)]
#[command(name = "vampbook", about = "Browse a song catalog and keep your favorites")]
pub struct Args {
    /// Path to the favorites database. Defaults to ~/.vampbook/favorites.sqlite.
    #[arg(long, env = "VAMPBOOK_DB")]
    pub db: Option<PathBuf>,

    /// JSON catalog to browse. The bundled sample catalog is used when absent.
    #[arg(long, env = "VAMPBOOK_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Where to append log output.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log filter, e.g. `info` or `vampbook=debug`. `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the songs matching a query.
    Search {
        /// Words are joined with spaces into one query.
        query: Vec<String>,
    },
    /// List or change favorites without opening the TUI.
    Favorites {
        #[command(subcommand)]
        action: Option<FavoritesAction>,
    },
    /// Write a snapshot of the favorites database to a file.
    Export { path: PathBuf },
    /// Replace the favorites with those in a snapshot file.
    Import { path: PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum FavoritesAction {
    List,
    Add { song_id: String },
    Remove { song_id: String },
}

/// Paths and settings after defaults have been applied.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub catalog_path: Option<PathBuf>,
    pub log_path: PathBuf,
    pub log_level: String,
}

impl Config {
    pub fn resolve(args: &Args) -> Result<Self> {
        let data_dir = match (&args.db, &args.log_file) {
            (Some(_), Some(_)) => None,
            _ => Some(data_dir()?),
        };
        let default_path = |name: &str| {
            data_dir
                .as_ref()
                .map(|dir| dir.join(name))
                .unwrap_or_else(|| PathBuf::from(name))
        };

        Ok(Self {
            db_path: args.db.clone().unwrap_or_else(|| default_path(DB_FILE_NAME)),
            catalog_path: args.catalog.clone(),
            log_path: args
                .log_file
                .clone()
                .unwrap_or_else(|| default_path(LOG_FILE_NAME)),
            log_level: args.log_level.clone(),
        })
    }
}

/// Resolve the application data directory inside the user's home.
fn data_dir() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new().ok_or_else(|| anyhow!("could not locate home directory"))?;
    Ok(base_dirs.home_dir().join(DATA_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_paths_win() {
        let args = Args::parse_from([
            "vampbook",
            "--db",
            "/tmp/fav.sqlite",
            "--log-file",
            "/tmp/vb.log",
            "--catalog",
            "songs.json",
        ]);
        let config = Config::resolve(&args).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/fav.sqlite"));
        assert_eq!(config.log_path, PathBuf::from("/tmp/vb.log"));
        assert_eq!(config.catalog_path, Some(PathBuf::from("songs.json")));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn parses_subcommands() {
        let args = Args::parse_from(["vampbook", "favorites", "add", "blue-monk"]);
        assert!(matches!(
            args.command,
            Some(Command::Favorites {
                action: Some(FavoritesAction::Add { ref song_id })
            }) if song_id == "blue-monk"
        ));

        let args = Args::parse_from(["vampbook", "search", "giant", "steps"]);
        assert!(matches!(args.command, Some(Command::Search { ref query }) if query.len() == 2));
    }
}
