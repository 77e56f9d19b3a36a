//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - consume: run a worker
//! - stop-workers: signal every running worker to stop
//! - metadata: show what a worker would consume
//! - send: queue a message

use clap::{Args, Parser, Subcommand};
use msgloop::options::{RawOptions, resolver};
use std::path::PathBuf;

/// msgloop - consume queued messages until a stop condition is reached
#[derive(Parser, Debug)]
#[command(name = "msgloop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Consume messages from one or more receivers
    Consume {
        /// Receivers to consume, highest priority first (defaults to the config's list)
        receivers: Vec<String>,

        #[command(flatten)]
        options: WorkerArgs,
    },

    /// Stop workers gracefully after their current message
    StopWorkers,

    /// Describe the receivers and bus a worker would use
    Metadata {
        /// Receivers to describe (defaults to the config's list)
        receivers: Vec<String>,

        #[command(flatten)]
        options: WorkerArgs,
    },

    /// Queue a message on a receiver
    Send {
        /// Queue name
        queue: String,

        /// Message type used for bus routing
        message_type: String,

        /// JSON body
        #[arg(default_value = "{}")]
        body: String,

        /// Dispatch on this bus instead of routing by type
        #[arg(long)]
        bus: Option<String>,
    },
}

/// Worker options, mirroring the option map keys
#[derive(Args, Debug, Default, Clone)]
pub struct WorkerArgs {
    /// Limit the number of received messages
    #[arg(short, long)]
    pub limit: Option<String>,

    /// The number of failed messages the worker can consume
    #[arg(short, long)]
    pub failure_limit: Option<String>,

    /// The memory limit the worker can consume (e.g. 128M)
    #[arg(short, long)]
    pub memory_limit: Option<String>,

    /// The time limit in seconds the worker can handle new messages
    #[arg(short, long)]
    pub time_limit: Option<String>,

    /// Seconds to sleep before asking for new messages after no messages were found
    #[arg(long)]
    pub sleep: Option<f64>,

    /// Name of the bus to which received messages should be dispatched
    #[arg(short, long)]
    pub bus: Option<String>,

    /// Limit receivers to only consume from the specified queues
    #[arg(long)]
    pub queues: Vec<String>,

    /// Do not reset services after each message
    #[arg(long)]
    pub no_reset: bool,
}

impl WorkerArgs {
    /// Flags that were given, as an option map to overlay on the config's.
    pub fn to_options(&self) -> RawOptions {
        let mut options = RawOptions::new();
        if let Some(limit) = &self.limit {
            options.set(resolver::LIMIT, limit.as_str());
        }
        if let Some(limit) = &self.failure_limit {
            options.set(resolver::FAILURE_LIMIT, limit.as_str());
        }
        if let Some(limit) = &self.memory_limit {
            options.set(resolver::MEMORY_LIMIT, limit.as_str());
        }
        if let Some(limit) = &self.time_limit {
            options.set(resolver::TIME_LIMIT, limit.as_str());
        }
        if let Some(sleep) = self.sleep {
            options.set(resolver::SLEEP, sleep);
        }
        if let Some(bus) = &self.bus {
            options.set(resolver::BUS, bus.as_str());
        }
        if !self.queues.is_empty() {
            options.set(resolver::QUEUES, self.queues.clone());
        }
        if self.no_reset {
            options.set(resolver::NO_RESET, true);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgloop::options::resolve;

    #[test]
    fn test_parse_consume() {
        let cli = Cli::parse_from([
            "msgloop", "consume", "high", "low", "--limit", "10", "--memory-limit", "128M", "--sleep",
            "0.5", "--queues", "low", "--no-reset",
        ]);
        let Commands::Consume { receivers, options } = cli.command else {
            panic!("expected consume");
        };
        assert_eq!(receivers, vec!["high".to_string(), "low".to_string()]);

        let resolved = resolve(&options.to_options()).unwrap();
        assert_eq!(resolved.limit, Some(10));
        assert_eq!(resolved.memory_limit.unwrap().raw(), "128M");
        assert_eq!(resolved.queues, Some(vec!["low".to_string()]));
        assert!(resolved.no_reset);
    }

    #[test]
    fn test_parse_stop_workers() {
        let cli = Cli::parse_from(["msgloop", "stop-workers"]);
        assert!(matches!(cli.command, Commands::StopWorkers));
    }

    #[test]
    fn test_parse_send_with_default_body() {
        let cli = Cli::parse_from(["msgloop", "send", "async", "Ping"]);
        let Commands::Send { queue, message_type, body, bus } = cli.command else {
            panic!("expected send");
        };
        assert_eq!(queue, "async");
        assert_eq!(message_type, "Ping");
        assert_eq!(body, "{}");
        assert!(bus.is_none());
    }

    #[test]
    fn test_unset_flags_leave_options_empty() {
        assert_eq!(WorkerArgs::default().to_options(), RawOptions::new());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["msgloop", "-v", "--config", "/tmp/m.yml", "stop-workers"]);
        assert!(cli.is_verbose());
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/m.yml")));
    }
}
