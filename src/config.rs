//! Configuration management for Snap Vault.
//!
//! This module provides a configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `SNAP_VAULT_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Commands
//!
//! - `snap-vault serve` - Run the HTTP API
//! - `snap-vault sign` - Mint a bearer token for a user id
//!
//! # Environment Variables
//!
//! - `SNAP_VAULT_HOST` - Server bind address (default: 0.0.0.0)
//! - `SNAP_VAULT_PORT` - Server port (default: 4000)
//! - `SNAP_VAULT_DATA_DIR` - Directory for image payloads (default: ./data/images)
//! - `SNAP_VAULT_AUTH_SECRET` - HMAC secret for bearer tokens (required)
//! - `SNAP_VAULT_CORS_ORIGINS` - Allowed CORS origins, comma-separated
//! - `SNAP_VAULT_MAX_UPLOAD_BYTES` - Upload size limit (default: 20 MiB)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::server::DEFAULT_MAX_UPLOAD_BYTES;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 4000;

/// Default payload directory.
pub const DEFAULT_DATA_DIR: &str = "./data/images";

/// Default token lifetime for `sign` (24 hours).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 86400;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Snap Vault - image galleries with public and owner-only access.
#[derive(Parser, Debug)]
#[command(name = "snap-vault")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP API.
    Serve(Config),

    /// Mint a bearer token for a user id.
    Sign(SignConfig),
}

/// Server configuration.
#[derive(Args, Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "SNAP_VAULT_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "SNAP_VAULT_PORT")]
    pub port: u16,

    // =========================================================================
    // Storage Configuration
    // =========================================================================
    /// Directory where image payloads are written.
    #[arg(long, default_value = DEFAULT_DATA_DIR, env = "SNAP_VAULT_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Largest accepted upload in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, env = "SNAP_VAULT_MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: usize,

    // =========================================================================
    // Authentication Configuration
    // =========================================================================
    /// Secret key for HMAC-SHA256 bearer tokens.
    #[arg(long, env = "SNAP_VAULT_AUTH_SECRET")]
    pub auth_secret: Option<String>,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "SNAP_VAULT_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable tower-http request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        match self.auth_secret.as_deref() {
            None | Some("") => {
                return Err(
                    "No auth secret provided. Set --auth-secret or SNAP_VAULT_AUTH_SECRET"
                        .to_string(),
                )
            }
            Some(_) => {}
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err("data_dir must not be empty".to_string());
        }

        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The auth secret, or an empty string when unset (call validate() first).
    pub fn auth_secret_or_empty(&self) -> &str {
        self.auth_secret.as_deref().unwrap_or("")
    }
}

/// Token minting configuration.
#[derive(Args, Debug, Clone)]
pub struct SignConfig {
    /// User id the token identifies.
    #[arg(long)]
    pub user_id: i64,

    /// Secret key for HMAC-SHA256 bearer tokens.
    #[arg(long, env = "SNAP_VAULT_AUTH_SECRET")]
    pub secret: String,

    /// Token lifetime in seconds.
    #[arg(long, default_value_t = DEFAULT_TOKEN_TTL_SECS)]
    pub ttl: u64,
}

impl SignConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.secret.is_empty() {
            return Err("Secret must not be empty".to_string());
        }
        if self.ttl == 0 {
            return Err("ttl must be greater than 0".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
