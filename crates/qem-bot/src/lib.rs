//! The `qem-bot` command runners and their configuration.
//!
//! The binary in `main.rs` wires the HTTP clients from `qem-client` into the
//! runners in [`commands`]; tests wire in fakes instead.

pub mod commands;
pub mod config;

pub use config::{BotConfig, load_products};

#[cfg(test)]
mod tests;
