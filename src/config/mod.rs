//! Configuration handling

pub mod config;

pub use config::Config;
