//! Tracker module - records who speaks in LINE groups and answers commands.

pub mod commands;
pub mod database;
pub mod dispatcher;
pub mod event;
pub mod line;
pub mod membership;
pub mod profile;
pub mod signature;

#[cfg(test)]
pub(crate) mod fake;

pub use database::Database;
pub use dispatcher::{Dispatcher, TrackerConfig};
pub use line::{LineClient, Platform};
