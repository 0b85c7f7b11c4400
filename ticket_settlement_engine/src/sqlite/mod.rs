//! SQLite database module for the ticket settlement engine.

mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
