//! Song catalog browser with locally persisted favorites.
//!
//! The catalog is read-only and lives in memory; favorites are kept in a
//! SQLite file that several instances may share.
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod search;
pub mod ui;

pub use catalog::{CatalogGroup, CatalogIndex};
pub use db::{ConnectionState, FavoritesStore, PersistenceCoordinator};
pub use error::{CatalogError, StoreError, StoreResult};
pub use models::{FavoriteEntry, Song};
pub use search::{highlight, search, HighlightSpan};

/// The interactive application entry point and state container.
pub use ui::{run_app, App};
