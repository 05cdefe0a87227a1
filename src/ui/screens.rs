use std::time::{Duration, Instant};

use crate::catalog::CatalogIndex;
use crate::models::{FavoriteEntry, Song};
use crate::search::search;

/// Quiet period after the last keystroke before a query is evaluated.
pub(crate) const SEARCH_DEBOUNCE: Duration = Duration::from_millis(150);

/// Clamp `selected + offset` into `0..len`.
fn offset_selection(selected: usize, offset: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let len = len as isize;
    let mut new = selected as isize + offset;
    if new < 0 {
        new = 0;
    }
    if new >= len {
        new = len - 1;
    }
    new as usize
}

/// Row rendered in the browse list (either a letter header or a song).
pub(crate) enum BrowseRow {
    Header(char),
    Song(Song),
}

/// Alphabetical browse view. Selection only ever lands on song rows.
pub(crate) struct BrowseScreen {
    pub(crate) rows: Vec<BrowseRow>,
    song_rows: Vec<usize>,
    selected: usize,
}

impl BrowseScreen {
    pub(crate) fn new(index: &CatalogIndex) -> Self {
        let mut rows = Vec::with_capacity(index.len() + index.groups_sorted_by_letter().len());
        let mut song_rows = Vec::with_capacity(index.len());
        for group in index.groups_sorted_by_letter() {
            rows.push(BrowseRow::Header(group.letter));
            for song in &group.songs {
                song_rows.push(rows.len());
                rows.push(BrowseRow::Song(song.clone()));
            }
        }
        Self {
            rows,
            song_rows,
            selected: 0,
        }
    }

    /// Index into `rows` of the highlighted song.
    pub(crate) fn selected_row(&self) -> Option<usize> {
        self.song_rows.get(self.selected).copied()
    }

    pub(crate) fn current_song(&self) -> Option<&Song> {
        match self.selected_row().and_then(|row| self.rows.get(row)) {
            Some(BrowseRow::Song(song)) => Some(song),
            _ => None,
        }
    }

    pub(crate) fn move_selection(&mut self, offset: isize) {
        self.selected = offset_selection(self.selected, offset, self.song_rows.len());
    }

    pub(crate) fn select_first(&mut self) {
        self.selected = 0;
    }

    pub(crate) fn select_last(&mut self) {
        self.selected = self.song_rows.len().saturating_sub(1);
    }

    /// Jump to the first song filed under `letter`. Returns false when the
    /// catalog has no such group.
    pub(crate) fn jump_to_letter(&mut self, letter: char) -> bool {
        let Some(header) = self
            .rows
            .iter()
            .position(|row| matches!(row, BrowseRow::Header(l) if *l == letter))
        else {
            return false;
        };
        match self.song_rows.iter().position(|row| *row > header) {
            Some(pos) => {
                self.selected = pos;
                true
            }
            None => false,
        }
    }
}

/// Search tab state. Keystrokes only edit `query`; results follow once the
/// query has been stable for [`SEARCH_DEBOUNCE`], so only the latest query
/// is ever evaluated.
pub(crate) struct SearchScreen {
    pub(crate) query: String,
    pub(crate) applied_query: String,
    pub(crate) results: Vec<Song>,
    edited_at: Option<Instant>,
    selected: usize,
}

impl SearchScreen {
    pub(crate) fn new(index: &CatalogIndex) -> Self {
        Self {
            query: String::new(),
            applied_query: String::new(),
            results: search(index, ""),
            edited_at: None,
            selected: 0,
        }
    }

    pub(crate) fn push_char(&mut self, ch: char, now: Instant) {
        self.query.push(ch);
        self.edited_at = Some(now);
    }

    pub(crate) fn pop_char(&mut self, now: Instant) {
        if self.query.pop().is_some() {
            self.edited_at = Some(now);
        }
    }

    pub(crate) fn clear(&mut self, now: Instant) {
        if !self.query.is_empty() {
            self.query.clear();
            self.edited_at = Some(now);
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.edited_at.is_some()
    }

    /// Evaluate the query if it has been quiet long enough. Returns whether
    /// the results changed.
    pub(crate) fn apply_if_due(&mut self, index: &CatalogIndex, now: Instant) -> bool {
        match self.edited_at {
            Some(edited) if now.duration_since(edited) >= SEARCH_DEBOUNCE => {
                self.flush(index);
                true
            }
            _ => false,
        }
    }

    /// Evaluate the current query immediately.
    pub(crate) fn flush(&mut self, index: &CatalogIndex) {
        self.results = search(index, &self.query);
        self.applied_query = self.query.clone();
        self.edited_at = None;
        self.selected = 0;
    }

    pub(crate) fn selected(&self) -> usize {
        self.selected
    }

    pub(crate) fn current_song(&self) -> Option<&Song> {
        self.results.get(self.selected)
    }

    pub(crate) fn move_selection(&mut self, offset: isize) {
        self.selected = offset_selection(self.selected, offset, self.results.len());
    }

    pub(crate) fn select_first(&mut self) {
        self.selected = 0;
    }

    pub(crate) fn select_last(&mut self) {
        self.selected = self.results.len().saturating_sub(1);
    }
}

/// Favorited songs, oldest first. Ids the catalog no longer knows are counted
/// but not shown.
pub(crate) struct FavoritesScreen {
    pub(crate) entries: Vec<FavoriteEntry>,
    pub(crate) songs: Vec<Song>,
    pub(crate) missing: usize,
    selected: usize,
}

impl FavoritesScreen {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            songs: Vec::new(),
            missing: 0,
            selected: 0,
        }
    }

    pub(crate) fn set_entries(&mut self, index: &CatalogIndex, entries: Vec<FavoriteEntry>) {
        self.songs = entries
            .iter()
            .filter_map(|entry| index.song(&entry.song_id).cloned())
            .collect();
        self.missing = entries.len() - self.songs.len();
        self.entries = entries;
        self.selected = self.selected.min(self.songs.len().saturating_sub(1));
    }

    pub(crate) fn contains(&self, song_id: &str) -> bool {
        self.entries.iter().any(|entry| entry.song_id == song_id)
    }

    pub(crate) fn entry(&self, song_id: &str) -> Option<&FavoriteEntry> {
        self.entries.iter().find(|entry| entry.song_id == song_id)
    }

    pub(crate) fn selected(&self) -> usize {
        self.selected
    }

    pub(crate) fn current_song(&self) -> Option<&Song> {
        self.songs.get(self.selected)
    }

    pub(crate) fn move_selection(&mut self, offset: isize) {
        self.selected = offset_selection(self.selected, offset, self.songs.len());
    }

    pub(crate) fn select_first(&mut self) {
        self.selected = 0;
    }

    pub(crate) fn select_last(&mut self) {
        self.selected = self.songs.len().saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::load::sample_index;

    #[test]
    fn browse_selection_skips_headers() {
        let index = sample_index();
        let mut browse = BrowseScreen::new(&index);
        assert_eq!(browse.selected_row(), Some(1));
        assert_eq!(browse.current_song().map(Song::id), Some("night-in-tunisia"));

        browse.move_selection(-3);
        assert_eq!(browse.selected_row(), Some(1));

        browse.select_last();
        assert_eq!(browse.current_song().map(Song::id), Some("tune-up"));
    }

    #[test]
    fn browse_jumps_to_letters() {
        let index = sample_index();
        let mut browse = BrowseScreen::new(&index);

        assert!(browse.jump_to_letter('R'));
        assert_eq!(browse.current_song().map(Song::id), Some("round-midnight"));
        assert!(!browse.jump_to_letter('Q'));
        assert_eq!(browse.current_song().map(Song::id), Some("round-midnight"));
    }

    #[test]
    fn search_waits_for_the_debounce_window() {
        let index = sample_index();
        let mut screen = SearchScreen::new(&index);
        let start = Instant::now();

        for ch in "monk".chars() {
            screen.push_char(ch, start);
        }
        assert!(!screen.apply_if_due(&index, start + Duration::from_millis(10)));
        assert_eq!(screen.results.len(), index.len());

        assert!(screen.apply_if_due(&index, start + SEARCH_DEBOUNCE));
        assert_eq!(screen.applied_query, "monk");
        let ids: Vec<&str> = screen.results.iter().map(Song::id).collect();
        assert_eq!(ids, vec!["blue-monk", "round-midnight"]);
        assert!(!screen.is_pending());
    }

    #[test]
    fn only_the_latest_query_is_evaluated() {
        let index = sample_index();
        let mut screen = SearchScreen::new(&index);
        let start = Instant::now();

        screen.push_char('x', start);
        screen.pop_char(start + Duration::from_millis(100));
        screen.push_char('k', start + Duration::from_millis(120));
        assert!(!screen.apply_if_due(&index, start + Duration::from_millis(200)));
        assert!(screen.apply_if_due(&index, start + Duration::from_millis(300)));
        assert_eq!(screen.applied_query, "k");
    }

    #[test]
    fn favorites_hide_unknown_ids() {
        let index = sample_index();
        let mut screen = FavoritesScreen::new();
        let entries = vec![
            FavoriteEntry { id: 1, song_id: "misty".into(), added_at: 1 },
            FavoriteEntry { id: 2, song_id: "gone".into(), added_at: 2 },
            FavoriteEntry { id: 3, song_id: "solar".into(), added_at: 3 },
        ];
        screen.set_entries(&index, entries);

        assert_eq!(screen.songs.len(), 2);
        assert_eq!(screen.missing, 1);
        assert!(screen.contains("gone"));
        screen.select_last();
        assert_eq!(screen.current_song().map(Song::id), Some("solar"));
    }
}
