//! Ratatui front end: tabs for browsing, searching, and favorites.

mod app;
mod helpers;
mod screens;
mod terminal;

pub use app::App;
pub use terminal::run_app;
