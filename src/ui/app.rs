use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::prelude::*;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap};
use ratatui::Frame;
use tracing::{info, warn};

use crate::catalog::CatalogIndex;
use crate::db::FavoritesStore;
use crate::error::StoreError;
use crate::models::Song;

use super::helpers::{centered_rect, highlighted_spans, surface_error};
use super::screens::{BrowseRow, BrowseScreen, FavoritesScreen, SearchScreen};

/// Footer space reserved for status messages and instructions.
const FOOTER_HEIGHT: u16 = 3;
/// How often the favorites file is checked for writes from other instances.
const EXTERNAL_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Marker drawn next to favorited songs.
const FAVORITE_MARK: &str = "♥";

/// Top-level tabs, in display order.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Tab {
    Browse,
    Search,
    Favorites,
}

impl Tab {
    const ALL: [Tab; 3] = [Tab::Browse, Tab::Search, Tab::Favorites];

    fn position(self) -> usize {
        match self {
            Tab::Browse => 0,
            Tab::Search => 1,
            Tab::Favorites => 2,
        }
    }

    fn cycle(self, offset: isize) -> Tab {
        let len = Self::ALL.len() as isize;
        let next = (self.position() as isize + offset).rem_euclid(len);
        Self::ALL[next as usize]
    }
}

/// Fine-grained modes layered over the current tab.
enum Mode {
    Normal,
    /// Keystrokes edit the search query.
    Typing,
    /// Song detail popup.
    Detail(Song),
}

/// Holds the footer message text plus its severity.
struct StatusMessage {
    text: String,
    kind: StatusKind,
}

/// Severity levels shown in the footer.
enum StatusKind {
    Info,
    Warning,
}

impl StatusKind {
    fn style(&self) -> Style {
        match self {
            StatusKind::Info => Style::default().fg(Color::Green),
            StatusKind::Warning => Style::default().fg(Color::Red),
        }
    }
}

/// Central application state shared across the TUI.
pub struct App {
    index: CatalogIndex,
    store: FavoritesStore,
    tab: Tab,
    mode: Mode,
    browse: BrowseScreen,
    search: SearchScreen,
    favorites: FavoritesScreen,
    status: Option<StatusMessage>,
    last_poll: Instant,
}

impl App {
    pub fn new(index: CatalogIndex, store: FavoritesStore) -> Self {
        Self {
            browse: BrowseScreen::new(&index),
            search: SearchScreen::new(&index),
            favorites: FavoritesScreen::new(),
            index,
            store,
            tab: Tab::Browse,
            mode: Mode::Normal,
            status: None,
            last_poll: Instant::now(),
        }
    }

    /// Pull the favorites list from the store.
    pub async fn reload_favorites(&mut self) {
        match self.store.list_entries().await {
            Ok(entries) => self.favorites.set_entries(&self.index, entries),
            Err(err) => self.report_store_error(err),
        }
    }

    pub async fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> Result<bool> {
        let mut exit = false;
        let mode = std::mem::replace(&mut self.mode, Mode::Normal);

        self.mode = match mode {
            Mode::Normal => self.handle_normal_key(code, &mut exit).await?,
            Mode::Typing => self.handle_typing_key(code, modifiers),
            Mode::Detail(song) => self.handle_detail_key(code, song).await?,
        };

        Ok(exit)
    }

    /// Periodic work: apply the debounced search and pick up favorites
    /// written by other instances.
    pub async fn on_tick(&mut self) -> Result<()> {
        let now = Instant::now();
        self.search.apply_if_due(&self.index, now);

        if now.duration_since(self.last_poll) >= EXTERNAL_POLL_INTERVAL {
            self.last_poll = now;
            match self.store.has_external_changes().await {
                Ok(true) => {
                    info!("Favorites changed in another instance, reloading");
                    self.reload_favorites().await;
                }
                Ok(false) => {}
                Err(err) => self.report_store_error(err),
            }
        }
        Ok(())
    }

    async fn handle_normal_key(&mut self, code: KeyCode, exit: &mut bool) -> Result<Mode> {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => *exit = true,
            KeyCode::Tab => self.switch_tab(self.tab.cycle(1)),
            KeyCode::BackTab => self.switch_tab(self.tab.cycle(-1)),
            KeyCode::Char('1') => self.switch_tab(Tab::Browse),
            KeyCode::Char('2') => self.switch_tab(Tab::Search),
            KeyCode::Char('3') => self.switch_tab(Tab::Favorites),
            KeyCode::Char('/') => {
                self.switch_tab(Tab::Search);
                return Ok(Mode::Typing);
            }
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Down => self.move_selection(1),
            KeyCode::PageUp => self.move_selection(-5),
            KeyCode::PageDown => self.move_selection(5),
            KeyCode::Home => self.select_first(),
            KeyCode::End => self.select_last(),
            KeyCode::Enter => {
                if let Some(song) = self.current_song().cloned() {
                    self.clear_status();
                    return Ok(Mode::Detail(song));
                }
                self.set_status("No song selected.", StatusKind::Warning);
            }
            KeyCode::Char('f') | KeyCode::Char(' ') => {
                if let Some(song) = self.current_song().cloned() {
                    self.toggle_favorite(&song).await;
                } else {
                    self.set_status("No song selected.", StatusKind::Warning);
                }
            }
            KeyCode::Char('r') => {
                self.reload_favorites().await;
                if self.status.is_none() {
                    self.set_status("Favorites reloaded.", StatusKind::Info);
                }
            }
            KeyCode::Char(letter) if letter.is_ascii_uppercase() && self.tab == Tab::Browse => {
                if !self.browse.jump_to_letter(letter) {
                    self.set_status(format!("No songs under {letter}."), StatusKind::Warning);
                }
            }
            _ => {}
        }
        Ok(Mode::Normal)
    }

    fn handle_typing_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> Mode {
        let now = Instant::now();
        match code {
            KeyCode::Esc | KeyCode::Enter | KeyCode::Tab => {
                self.search.flush(&self.index);
                return Mode::Normal;
            }
            KeyCode::Up => self.search.move_selection(-1),
            KeyCode::Down => self.search.move_selection(1),
            KeyCode::Backspace => self.search.pop_char(now),
            KeyCode::Char('u') if modifiers.contains(KeyModifiers::CONTROL) => {
                self.search.clear(now)
            }
            KeyCode::Char(ch) if !ch.is_control() => self.search.push_char(ch, now),
            _ => {}
        }
        Mode::Typing
    }

    async fn handle_detail_key(&mut self, code: KeyCode, song: Song) -> Result<Mode> {
        match code {
            KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => Ok(Mode::Normal),
            KeyCode::Char('f') | KeyCode::Char(' ') => {
                self.toggle_favorite(&song).await;
                Ok(Mode::Detail(song))
            }
            _ => Ok(Mode::Detail(song)),
        }
    }

    /// Flip the favorite state and wait for the store before showing it.
    async fn toggle_favorite(&mut self, song: &Song) {
        match self.store.toggle(song.id()).await {
            Ok(true) => self.set_status(
                format!("Added {} to favorites.", song.title()),
                StatusKind::Info,
            ),
            Ok(false) => self.set_status(
                format!("Removed {} from favorites.", song.title()),
                StatusKind::Info,
            ),
            Err(err) => self.report_store_error(err),
        }
        self.reload_favorites().await;
    }

    fn report_store_error(&mut self, err: StoreError) {
        warn!("Favorites storage error: {}", err);
        self.set_status(
            format!(
                "Favorites will only last this session: {}",
                surface_error(&err)
            ),
            StatusKind::Warning,
        );
    }

    fn switch_tab(&mut self, tab: Tab) {
        self.tab = tab;
        self.clear_status();
    }

    fn current_song(&self) -> Option<&Song> {
        match self.tab {
            Tab::Browse => self.browse.current_song(),
            Tab::Search => self.search.current_song(),
            Tab::Favorites => self.favorites.current_song(),
        }
    }

    fn move_selection(&mut self, offset: isize) {
        match self.tab {
            Tab::Browse => self.browse.move_selection(offset),
            Tab::Search => self.search.move_selection(offset),
            Tab::Favorites => self.favorites.move_selection(offset),
        }
    }

    fn select_first(&mut self) {
        match self.tab {
            Tab::Browse => self.browse.select_first(),
            Tab::Search => self.search.select_first(),
            Tab::Favorites => self.favorites.select_first(),
        }
    }

    fn select_last(&mut self) {
        match self.tab {
            Tab::Browse => self.browse.select_last(),
            Tab::Search => self.search.select_last(),
            Tab::Favorites => self.favorites.select_last(),
        }
    }

    fn set_status<S: Into<String>>(&mut self, text: S, kind: StatusKind) {
        self.status = Some(StatusMessage {
            text: text.into(),
            kind,
        });
    }

    fn clear_status(&mut self) {
        self.status = None;
    }

    pub(crate) fn draw(&self, frame: &mut Frame) {
        let area = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(FOOTER_HEIGHT),
            ])
            .split(area);

        self.draw_tabs(frame, chunks[0]);
        match self.tab {
            Tab::Browse => self.draw_browse(frame, chunks[1]),
            Tab::Search => self.draw_search(frame, chunks[1]),
            Tab::Favorites => self.draw_favorites(frame, chunks[1]),
        }
        self.draw_footer(frame, chunks[2]);

        if let Mode::Detail(song) = &self.mode {
            self.draw_detail(frame, area, song);
        }
    }

    fn draw_tabs(&self, frame: &mut Frame, area: Rect) {
        let titles = vec![
            Line::from("1 Browse"),
            Line::from("2 Search"),
            Line::from(format!("3 Favorites ({})", self.favorites.songs.len())),
        ];
        let tabs = Tabs::new(titles)
            .block(Block::default().borders(Borders::ALL).title("Vampbook"))
            .select(self.tab.position())
            .highlight_style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            );
        frame.render_widget(tabs, area);
    }

    fn draw_browse(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!("All Songs ({})", self.index.len()));
        if self.index.is_empty() {
            let message = Paragraph::new("The catalog is empty.")
                .alignment(Alignment::Center)
                .block(block);
            frame.render_widget(message, area);
            return;
        }

        let items: Vec<ListItem> = self
            .browse
            .rows
            .iter()
            .map(|row| match row {
                BrowseRow::Header(letter) => ListItem::new(Line::from(Span::styled(
                    letter.to_string(),
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ))),
                BrowseRow::Song(song) => ListItem::new(self.song_line(song, "")),
            })
            .collect();

        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().fg(Color::Yellow))
            .highlight_symbol("▶ ");
        let mut state = ListState::default();
        state.select(self.browse.selected_row());
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_search(&self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(area);

        let typing = matches!(self.mode, Mode::Typing);
        let input_block = Block::default()
            .borders(Borders::ALL)
            .title("Search songs, composers, keys, tags")
            .border_style(if typing {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            });
        let input = Paragraph::new(Span::raw(format!("Search: {}", self.search.query)))
            .block(input_block.clone());
        frame.render_widget(input, chunks[0]);
        if typing {
            let inner = input_block.inner(chunks[0]);
            let typed = ("Search: ".len() + self.search.query.chars().count()) as u16;
            let cursor_x = (inner.x + typed).min(inner.right().saturating_sub(1));
            frame.set_cursor_position((cursor_x, inner.y));
        }

        let count = self.search.results.len();
        let noun = if count == 1 { "song" } else { "songs" };
        let mut title = format!("{count} {noun}");
        if self.search.is_pending() {
            title.push_str(" • searching…");
        }
        let block = Block::default().borders(Borders::ALL).title(title);

        if self.search.results.is_empty() {
            let message = Paragraph::new(vec![
                Line::from("No songs found"),
                Line::from(Span::styled(
                    "Try a different search term",
                    Style::default().fg(Color::Gray),
                )),
            ])
            .alignment(Alignment::Center)
            .block(block);
            frame.render_widget(message, chunks[1]);
            return;
        }

        let query = self.search.applied_query.as_str();
        let items: Vec<ListItem> = self
            .search
            .results
            .iter()
            .map(|song| ListItem::new(self.song_line(song, query)))
            .collect();
        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("▶ ");
        let mut state = ListState::default();
        state.select(Some(self.search.selected()));
        frame.render_stateful_widget(list, chunks[1], &mut state);
    }

    fn draw_favorites(&self, frame: &mut Frame, area: Rect) {
        let mut title = format!("Your Favorites ({})", self.favorites.songs.len());
        if self.favorites.missing > 0 {
            title.push_str(&format!(" • {} not in catalog", self.favorites.missing));
        }
        let block = Block::default().borders(Borders::ALL).title(title);

        if self.favorites.songs.is_empty() {
            let message = Paragraph::new("No favorites yet. Press 'f' on a song to add it.")
                .alignment(Alignment::Center)
                .block(block);
            frame.render_widget(message, area);
            return;
        }

        let items: Vec<ListItem> = self
            .favorites
            .songs
            .iter()
            .map(|song| ListItem::new(self.song_line(song, "")))
            .collect();
        let list = List::new(items)
            .block(block)
            .highlight_style(Style::default().fg(Color::Yellow))
            .highlight_symbol("▶ ");
        let mut state = ListState::default();
        state.select(Some(self.favorites.selected()));
        frame.render_stateful_widget(list, area, &mut state);
    }

    /// One list row: favorite marker, title, composer, and key badge.
    fn song_line(&self, song: &Song, query: &str) -> Line<'static> {
        let mut spans = Vec::new();
        if self.favorites.contains(song.id()) {
            spans.push(Span::styled(
                format!("{FAVORITE_MARK} "),
                Style::default().fg(Color::Red),
            ));
        } else {
            spans.push(Span::raw("  "));
        }
        spans.extend(highlighted_spans(
            song.title(),
            query,
            Style::default().add_modifier(Modifier::BOLD),
        ));
        if !song.composer().trim().is_empty() {
            spans.push(Span::raw(" - "));
            spans.extend(highlighted_spans(
                song.composer(),
                query,
                Style::default().fg(Color::Gray),
            ));
        }
        if let Some(key) = song.key() {
            spans.push(Span::raw("  "));
            spans.push(Span::styled(
                format!("[{key}]"),
                Style::default().fg(Color::Cyan),
            ));
        }
        Line::from(spans)
    }

    fn draw_detail(&self, frame: &mut Frame, area: Rect, song: &Song) {
        let popup_area = centered_rect(60, 50, area);
        frame.render_widget(Clear, popup_area);

        let label = Style::default().fg(Color::Gray);
        let mut lines = vec![
            Line::from(Span::styled(
                song.title().to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(vec![
                Span::styled("Composer  ", label),
                Span::raw(song.composer().to_string()),
            ]),
        ];
        if let Some(key) = song.key() {
            lines.push(Line::from(vec![
                Span::styled("Key       ", label),
                Span::styled(key.to_string(), Style::default().fg(Color::Cyan)),
            ]));
        }
        if let Some(tempo) = song.tempo() {
            lines.push(Line::from(vec![
                Span::styled("Tempo     ", label),
                Span::raw(tempo.to_string()),
            ]));
        }
        if !song.tags().is_empty() {
            lines.push(Line::from(vec![
                Span::styled("Tags      ", label),
                Span::raw(song.tags().join(", ")),
            ]));
        }

        lines.push(Line::from(""));
        let favorite_line = match self.favorites.entry(song.id()) {
            Some(entry) => {
                let since = entry
                    .added_at_utc()
                    .map(|at| format!(" since {}", at.format("%Y-%m-%d")))
                    .unwrap_or_default();
                Line::from(Span::styled(
                    format!("{FAVORITE_MARK} Favorite{since}"),
                    Style::default().fg(Color::Red),
                ))
            }
            None => Line::from(Span::styled("Not a favorite", label)),
        };
        lines.push(favorite_line);

        let block = Block::default().title("Song").borders(Borders::ALL);
        let paragraph = Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, popup_area);
    }

    fn draw_footer(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::TOP);
        frame.render_widget(block.clone(), area);
        let inner = block.inner(area);

        let status_line = if let Some(status) = &self.status {
            Line::from(vec![Span::styled(status.text.clone(), status.kind.style())])
        } else {
            Line::from("")
        };

        let instructions = self.footer_instructions();

        let paragraph = Paragraph::new(vec![status_line, instructions]).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);
    }

    fn footer_instructions(&self) -> Line<'static> {
        let key_style = Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD);
        let pairs: &[(&str, &str)] = match (&self.mode, self.tab) {
            (Mode::Detail(_), _) => &[("[f]", " Favorite   "), ("[Esc]", " Close")],
            (Mode::Typing, _) => &[
                ("[↑↓]", " Navigate   "),
                ("[Ctrl+U]", " Clear   "),
                ("[Enter/Esc]", " Done"),
            ],
            (Mode::Normal, Tab::Browse) => &[
                ("[↑↓]", " Navigate   "),
                ("[A-Z]", " Jump   "),
                ("[Enter]", " Details   "),
                ("[f]", " Favorite   "),
                ("[/]", " Search   "),
                ("[Tab]", " Next tab   "),
                ("[q]", " Quit"),
            ],
            (Mode::Normal, _) => &[
                ("[↑↓]", " Navigate   "),
                ("[Enter]", " Details   "),
                ("[f]", " Favorite   "),
                ("[/]", " Search   "),
                ("[r]", " Reload   "),
                ("[Tab]", " Next tab   "),
                ("[q]", " Quit"),
            ],
        };

        let spans: Vec<Span<'static>> = pairs
            .iter()
            .flat_map(|(key, label)| {
                [
                    Span::styled(key.to_string(), key_style),
                    Span::raw(label.to_string()),
                ]
            })
            .collect();
        Line::from(spans)
    }
}
