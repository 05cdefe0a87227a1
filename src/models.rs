//! Domain models shared by the catalog, the search engine, and the favorites
//! store. Songs are immutable values validated at construction; favorite
//! entries mirror rows of the `favorites` table.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// A single catalog entry. The `id` is a stable slug that the favorites table
/// references, so it must never be reused for a different song.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSong", into = "RawSong")]
pub struct Song {
    id: String,
    title: String,
    composer: String,
    key: Option<String>,
    tempo: Option<String>,
    tags: Vec<String>,
}

impl Song {
    /// Build a song from its required fields. Blank ids or titles are rejected
    /// here so the rest of the crate can treat every `Song` as well formed.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        composer: impl Into<String>,
    ) -> Result<Self, CatalogError> {
        let id = id.into();
        let title = title.into();
        if id.trim().is_empty() {
            return Err(CatalogError::InvalidSong(format!(
                "song titled {title:?} has an empty id"
            )));
        }
        if title.trim().is_empty() {
            return Err(CatalogError::InvalidSong(format!(
                "song {id:?} has an empty title"
            )));
        }

        Ok(Self {
            id,
            title,
            composer: composer.into(),
            key: None,
            tempo: None,
            tags: Vec::new(),
        })
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = non_blank(key.into());
        self
    }

    pub fn with_tempo(mut self, tempo: impl Into<String>) -> Self {
        self.tempo = non_blank(tempo.into());
        self
    }

    /// Attach tags, keeping the first occurrence of each so the list behaves
    /// like an ordered set.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for tag in tags {
            let tag = tag.into();
            if !unique.contains(&tag) {
                unique.push(tag);
            }
        }
        self.tags = unique;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn composer(&self) -> &str {
        &self.composer
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn tempo(&self) -> Option<&str> {
        self.tempo.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Compose a `Title - Composer` string that omits the hyphen when the
    /// composer is blank.
    pub fn display_title(&self) -> String {
        if self.composer.trim().is_empty() {
            self.title.clone()
        } else {
            format!("{} - {}", self.title, self.composer)
        }
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Wire shape of a song in catalog files.
#[derive(Serialize, Deserialize)]
struct RawSong {
    id: String,
    title: String,
    composer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tempo: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
}

impl TryFrom<RawSong> for Song {
    type Error = CatalogError;

    fn try_from(raw: RawSong) -> Result<Self, Self::Error> {
        let mut song = Song::new(raw.id, raw.title, raw.composer)?.with_tags(raw.tags);
        if let Some(key) = raw.key {
            song = song.with_key(key);
        }
        if let Some(tempo) = raw.tempo {
            song = song.with_tempo(tempo);
        }
        Ok(song)
    }
}

impl From<Song> for RawSong {
    fn from(song: Song) -> Self {
        Self {
            id: song.id,
            title: song.title,
            composer: song.composer,
            key: song.key,
            tempo: song.tempo,
            tags: song.tags,
        }
    }
}

/// Row of the `favorites` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoriteEntry {
    /// Auto-incremented primary key.
    pub id: i64,
    /// Id of the favorited song. Not a foreign key: the catalog is not stored.
    pub song_id: String,
    /// Milliseconds since the Unix epoch.
    pub added_at: i64,
}

impl FavoriteEntry {
    pub fn added_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.added_at).single()
    }
}
