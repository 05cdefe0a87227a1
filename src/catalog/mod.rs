//! In-memory catalog index. The index is built once from a song list and never
//! mutated; a changed catalog means building a new index and swapping it in.

pub mod load;

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::models::Song;

/// Group key used for titles that contain no ASCII letter.
pub const NON_ALPHA_LETTER: char = '#';

/// Songs sharing the same leading letter, sorted by title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogGroup {
    pub letter: char,
    pub songs: Vec<Song>,
}

/// Read-only catalog plus its derived letter groups.
#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    songs: Vec<Song>,
    groups: Vec<CatalogGroup>,
    by_id: HashMap<String, usize>,
}

impl CatalogIndex {
    /// Index `songs`, keeping their input order for `all_songs` and deriving
    /// the letter groups up front.
    pub fn build(songs: Vec<Song>) -> Self {
        let mut grouped: BTreeMap<char, Vec<Song>> = BTreeMap::new();
        for song in &songs {
            grouped
                .entry(letter_for(song.title()))
                .or_default()
                .push(song.clone());
        }

        let groups = grouped
            .into_iter()
            .map(|(letter, mut songs)| {
                songs.sort_by(compare_titles);
                CatalogGroup { letter, songs }
            })
            .collect();

        let mut by_id = HashMap::with_capacity(songs.len());
        for (idx, song) in songs.iter().enumerate() {
            by_id.entry(song.id().to_string()).or_insert(idx);
        }

        Self {
            songs,
            groups,
            by_id,
        }
    }

    /// Every song in the order the catalog source supplied them.
    pub fn all_songs(&self) -> &[Song] {
        &self.songs
    }

    /// Letter groups in ascending letter order; `#` sorts before `A`.
    pub fn groups_sorted_by_letter(&self) -> &[CatalogGroup] {
        &self.groups
    }

    pub fn letters(&self) -> impl Iterator<Item = char> + '_ {
        self.groups.iter().map(|group| group.letter)
    }

    pub fn song(&self, id: &str) -> Option<&Song> {
        self.by_id.get(id).and_then(|idx| self.songs.get(*idx))
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }
}

/// Grouping letter for a title: its first ASCII letter uppercased, or `#`
/// when the title has none (leading punctuation such as `'Round Midnight` is
/// skipped).
pub fn letter_for(title: &str) -> char {
    title
        .chars()
        .find(|ch| ch.is_ascii_alphabetic())
        .map(|ch| ch.to_ascii_uppercase())
        .unwrap_or(NON_ALPHA_LETTER)
}

/// Dictionary order for titles: accents and case only break ties between
/// titles that are otherwise equal, so `Bésame` files next to `Besame`.
fn compare_titles(a: &Song, b: &Song) -> Ordering {
    primary_key(a.title())
        .cmp(&primary_key(b.title()))
        .then_with(|| a.title().to_lowercase().cmp(&b.title().to_lowercase()))
        .then_with(|| a.title().cmp(b.title()))
        .then_with(|| a.id().cmp(b.id()))
}

/// Lowercased title with diacritics stripped.
fn primary_key(title: &str) -> String {
    title
        .nfd()
        .filter(|ch| !is_combining_mark(*ch))
        .flat_map(char::to_lowercase)
        .collect()
}
