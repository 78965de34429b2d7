//! Persistent storage: settings, on-disk layout, and the SQLite database

pub mod db;
pub mod layout;
pub mod projects;
pub mod settings;
