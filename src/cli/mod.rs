//! CLI module for msgloop - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for consuming, stopping
//! workers, inspecting worker metadata and queueing messages.

pub mod commands;

pub use commands::Cli;
