//! Storage layer: SQLite persistence for sessions and users.

pub mod db;

pub use db::Database;
