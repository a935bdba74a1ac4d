//! CLI support for the `comex` binary

pub mod commands;
pub mod error;

pub use error::CliError;
