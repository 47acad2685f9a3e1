//! CLI module for reqguard
//!
//! Provides the command-line interface for the server and the signing helper.

pub mod serve;
pub mod sign;

use clap::{Parser, Subcommand};

/// reqguard - Signed-request authentication and audit logging server
#[derive(Parser, Debug)]
#[command(name = "reqguard")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    REQGUARD_HOST                   Bind address (default: 0.0.0.0)
    REQGUARD_PORT                   Listen port (default: 8080)
    REQGUARD_MODE                   debug | release (default: release)
    REQGUARD_LOG_LEVEL              Log level filter (default: info)
    REQGUARD_SIGNATURE_APP_KEY      Accepted app_key (required when signing is enabled)
    REQGUARD_SIGNATURE_APP_SECRET   Shared signing secret (required when signing is enabled)
    REQGUARD_SIGNATURE_EXPIRE       Freshness window in seconds (default: 300)
    REQGUARD_SIGNATURE_ENABLED      Enforce request signatures (default: true)
    REQGUARD_SIGNATURE_NONCE_CACHE  Reject reused nonces (default: false)
    REQGUARD_JWT_SECRET             JWT signing key (auto-generated if not set)
    REQGUARD_JWT_EXPIRE             Session lifetime in seconds (default: 86400)
    REQGUARD_LOGGER_DIR             Log directory (default: logs)
"#)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server
    Serve(serve::ServeArgs),
    /// Print signed API parameters for a request
    Sign(sign::SignArgs),
}
