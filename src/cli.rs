//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

/// Application Connectivity Validator - client certificate authorization gateway
#[derive(Parser, Debug)]
#[command(name = "connectivity-validator")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "CONNECTIVITY_VALIDATOR_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "CONNECTIVITY_VALIDATOR_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "CONNECTIVITY_VALIDATOR_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "CONNECTIVITY_VALIDATOR_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "CONNECTIVITY_VALIDATOR_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Required `OU` of presented certificates (needs --tenant too)
    #[arg(long, global = true)]
    pub group: Option<String>,

    /// Required `O` of presented certificates (needs --group too)
    #[arg(long, global = true)]
    pub tenant: Option<String>,

    /// Route v2 events to the event mesh
    #[arg(long, global = true)]
    pub mesh_enabled: Option<bool>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Apply command-line overrides on top of loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ref host) = self.host {
            config.server.host.clone_from(host);
        }
        if let Some(ref group) = self.group {
            config.validation.group.clone_from(group);
        }
        if let Some(ref tenant) = self.tenant {
            config.validation.tenant.clone_from(tenant);
        }
        if let Some(mesh_enabled) = self.mesh_enabled {
            config.backends.mesh_enabled = Some(mesh_enabled);
        }
    }
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway server (default)
    Serve,

    /// Load and validate the configuration, then print it as YAML
    CheckConfig,
}
