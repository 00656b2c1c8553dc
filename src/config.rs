//! Operator configuration
//!
//! Parsed from flags with environment fallbacks, so the same binary can be
//! configured from a Deployment's `env` block.

use clap::{Args, ValueEnum};

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable text
    Text,
}

/// Settings shared by every command
#[derive(Args, Clone, Debug, Default)]
pub struct OperatorConfig {
    /// Cluster name reported to the agent as Kubernetes metadata
    #[arg(long, env = "NEW_RELIC_CLUSTER_NAME", global = true)]
    pub cluster_name: Option<String>,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json, global = true)]
    pub log_format: LogFormat,
}
