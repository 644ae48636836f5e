//! LINE bot that tracks who is active in each group and reports lurkers.

pub mod config;
pub mod server;
pub mod tracker;
