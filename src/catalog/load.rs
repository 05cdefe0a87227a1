use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::CatalogError;
use crate::models::Song;

/// Bundled jazz standards used when no catalog file is configured.
const SAMPLE_CATALOG: &str = include_str!("../../data/sample_songs.json");

/// Read a JSON array of songs from disk.
pub fn load_catalog(path: &Path) -> Result<Vec<Song>, CatalogError> {
    let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let songs = parse_catalog(&raw)?;
    info!("Loaded {} songs from {}", songs.len(), path.display());
    Ok(songs)
}

/// Parse and validate a catalog document. Song records are validated while
/// deserializing; ids must also be unique across the whole document.
pub fn parse_catalog(raw: &str) -> Result<Vec<Song>, CatalogError> {
    let songs: Vec<Song> = serde_json::from_str(raw)?;

    let mut seen = HashSet::with_capacity(songs.len());
    for song in &songs {
        if !seen.insert(song.id()) {
            return Err(CatalogError::DuplicateId(song.id().to_string()));
        }
    }

    debug!("Parsed catalog with {} songs", songs.len());
    Ok(songs)
}

pub fn sample_catalog() -> Result<Vec<Song>, CatalogError> {
    parse_catalog(SAMPLE_CATALOG)
}

#[cfg(test)]
pub(crate) fn sample_index() -> super::CatalogIndex {
    super::CatalogIndex::build(sample_catalog().unwrap())
}
