//! Request validation pipeline
//!
//! ```text
//! certificate header -> application -> identity -> authorize -> route -> forward
//! ```
//!
//! Every stage returns its error immediately; nothing reaches a backend
//! unless all stages succeed.

use std::net::IpAddr;

use axum::{extract::Request, response::Response};
use connectivity_core::{Policy, RouteTable, parse_subjects};
use tracing::{debug, info};

use super::proxy::{FORWARDED_CLIENT_CERT, ProxyDispatcher};
use crate::config::ValidationConfig;
use crate::identity::IdentityResolver;
use crate::{Error, Result};

/// Header name as reported in errors
const FORWARDED_CLIENT_CERT_DISPLAY: &str = "X-Forwarded-Client-Cert";

/// Validates callers and forwards authorized requests
pub struct GatewayHandler {
    resolver: IdentityResolver,
    routes: RouteTable,
    dispatcher: ProxyDispatcher,
    validation: ValidationConfig,
    mesh_enabled: bool,
}

impl GatewayHandler {
    /// Assemble the pipeline
    #[must_use]
    pub fn new(
        resolver: IdentityResolver,
        routes: RouteTable,
        dispatcher: ProxyDispatcher,
        validation: ValidationConfig,
        mesh_enabled: bool,
    ) -> Self {
        Self {
            resolver,
            routes,
            dispatcher,
            validation,
            mesh_enabled,
        }
    }

    /// Run the pipeline for one request
    pub async fn handle(
        &self,
        application: Option<&str>,
        request: Request,
        client: Option<IpAddr>,
    ) -> Result<Response> {
        // Non-ASCII bytes (UTF-8 DNs) are kept; an empty value counts as absent
        let certificate = request
            .headers()
            .get(FORWARDED_CLIENT_CERT)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .filter(|value| !value.is_empty())
            .ok_or(Error::MissingCertificateHeader(FORWARDED_CLIENT_CERT_DISPLAY))?;

        let application = application
            .filter(|name| !name.is_empty())
            .ok_or(Error::MissingApplication)?;

        let path = request.uri().path().to_owned();
        info!(application, path = %path, "Validating request");

        let identity = self.resolver.resolve(application).await?;

        let subjects = parse_subjects(&certificate);
        let policy = Policy::select(
            &identity,
            application,
            &self.validation.group,
            &self.validation.tenant,
        );
        debug!(
            application,
            policy = policy.name(),
            subjects = subjects.len(),
            "Authorizing subjects"
        );
        if !policy.authorize(&subjects) {
            return Err(Error::Forbidden);
        }

        let destination = self.routes.route(&path, application, self.mesh_enabled)?;
        debug!(application, destination = %destination, "Routed request");

        self.dispatcher.forward(destination, request, client).await
    }
}
