//! Persistence module split across logical submodules: the connection
//! coordinator, the favorites schema, and the favorites store built on both.

mod connection;
mod favorites;
mod schema;

pub use connection::{ConnectionState, PersistenceCoordinator};
pub use favorites::FavoritesStore;
pub use schema::SCHEMA_VERSION;
