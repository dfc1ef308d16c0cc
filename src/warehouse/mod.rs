mod load_strategy;
mod schema;
mod store;

pub use load_strategy::LoadStrategy;
pub use schema::{table_for, ALBUMS_TABLE, ARTISTS_TABLE, TRACKS_TABLE, WAREHOUSE_SCHEMA};
pub use store::{LoadError, SqliteWarehouse};
