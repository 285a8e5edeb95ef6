//! Application Connectivity Validator
//!
//! Gateway in front of the in-cluster event and metadata services. It
//! authorizes callers by the client-certificate subjects forwarded in
//! `X-Forwarded-Client-Cert` and proxies accepted requests to the backend
//! selected by path prefix.
//!
//! # Request pipeline
//!
//! 1. Extract `Subject="..."` entries from the forwarded certificate header
//! 2. Resolve the application's client IDs (cached, backed by the Kubernetes API)
//! 3. Authorize the subjects against the selected policy
//! 4. Route by path prefix to the event service, event mesh or app registry
//! 5. Forward with the certificate header stripped and relay the response

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod identity;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber
                .with(fmt::layer().json())
                .try_init()
                .map_err(|e| Error::Internal(e.to_string()))?;
        }
        _ => {
            subscriber
                .with(fmt::layer())
                .try_init()
                .map_err(|e| Error::Internal(e.to_string()))?;
        }
    }

    Ok(())
}
