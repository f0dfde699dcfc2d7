//! Data ingestion and storage
//!
//! Source adapters for play-by-play feeds and SQLite storage of the
//! reconstructed tables.

pub mod database;
pub mod sources;

pub use database::Database;
pub use sources::{DateRange, GameInput, InputDir, RawEvent, SourceFormat};
