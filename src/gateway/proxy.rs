//! Reverse proxying to the backend services.
//!
//! Each [`RouteDestination`] gets one [`ForwardingProxy`], built at startup
//! and bound to a backend host plus an ordered list of [`RequestTransform`]
//! steps. The steps are pure functions over an [`OutboundRequest`], so the
//! rewriting rules can be tested without any network.
//!
//! Bodies are streamed in both directions and the backend's status, headers
//! and body are relayed as-is. The only gateway-generated response is a
//! `502` when the backend cannot be reached at all.

use std::collections::HashMap;
use std::net::IpAddr;

use axum::{
    body::{Body, HttpBody},
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue, Method, Uri, header},
    response::Response,
};
use connectivity_core::RouteDestination;
use tracing::{info, warn};
use url::Url;

use crate::config::BackendsConfig;
use crate::{Error, Result};

/// Header carrying the forwarded client certificate details
pub const FORWARDED_CLIENT_CERT: &str = "x-forwarded-client-cert";

/// Scheme used for cluster-internal traffic
pub const INTERNAL_SCHEME: &str = "http";

/// Hop-by-hop headers never forwarded in either direction
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Request about to be sent to a backend
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute target URL
    pub url: Url,
    /// Headers to send
    pub headers: HeaderMap,
}

impl OutboundRequest {
    /// Point an inbound request at `target`, keeping its path and query
    #[must_use]
    pub fn new(target: &Url, method: Method, uri: &Uri, headers: HeaderMap) -> Self {
        let mut url = target.clone();
        url.set_path(uri.path());
        url.set_query(uri.query());
        Self {
            method,
            url,
            headers,
        }
    }
}

/// One request mutation applied before forwarding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTransform {
    /// Drop the caller's `Host`; the outgoing one comes from the target URL
    ClearHost,
    /// Force the URL scheme
    ForceScheme(&'static str),
    /// Remove a header
    StripHeader(HeaderName),
    /// Replace the path with a fixed one, keeping the query
    RewritePath(String),
}

impl RequestTransform {
    /// Apply this step
    pub fn apply(&self, request: &mut OutboundRequest) {
        match self {
            Self::ClearHost => {
                request.headers.remove(header::HOST);
            }
            Self::ForceScheme(scheme) => {
                // Only fails for non-special schemes, which targets never have
                let _ = request.url.set_scheme(scheme);
            }
            Self::StripHeader(name) => {
                request.headers.remove(name);
            }
            Self::RewritePath(path) => request.url.set_path(path),
        }
    }
}

/// Steps every proxy applies, in order
#[must_use]
pub fn common_transforms() -> Vec<RequestTransform> {
    vec![
        RequestTransform::ClearHost,
        RequestTransform::ForceScheme(INTERNAL_SCHEME),
        RequestTransform::StripHeader(HeaderName::from_static(FORWARDED_CLIENT_CERT)),
    ]
}

/// Remove hop-by-hop headers, including any listed in `Connection`
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// Append the caller's address to `X-Forwarded-For`
pub fn append_forwarded_for(headers: &mut HeaderMap, client: IpAddr) {
    let value = match headers
        .get(X_FORWARDED_FOR)
        .and_then(|existing| existing.to_str().ok())
    {
        Some(existing) if !existing.trim().is_empty() => format!("{existing}, {client}"),
        _ => client.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// Parse a configured `host[:port]` (or full URL) into a base URL
fn target_url(host: &str) -> Result<Url> {
    let raw = if host.contains("://") {
        host.to_owned()
    } else {
        format!("{INTERNAL_SCHEME}://{host}")
    };
    let url = Url::parse(&raw).map_err(|e| Error::Config(format!("invalid backend host {host}: {e}")))?;
    if url.cannot_be_a_base() || url.host().is_none() {
        return Err(Error::Config(format!("invalid backend host {host}")));
    }
    Ok(url)
}

/// Forwarder bound to a single backend
#[derive(Debug, Clone)]
pub struct ForwardingProxy {
    destination: RouteDestination,
    target: Url,
    transforms: Vec<RequestTransform>,
    client: reqwest::Client,
}

impl ForwardingProxy {
    /// Create a proxy for `destination` targeting `host`
    pub fn new(
        destination: RouteDestination,
        host: &str,
        transforms: Vec<RequestTransform>,
        client: reqwest::Client,
    ) -> Result<Self> {
        Ok(Self {
            destination,
            target: target_url(host)?,
            transforms,
            client,
        })
    }

    /// Mutation steps, in application order
    #[must_use]
    pub fn transforms(&self) -> &[RequestTransform] {
        &self.transforms
    }

    /// Build the outbound request description without sending it
    #[must_use]
    pub fn prepare(
        &self,
        method: Method,
        uri: &Uri,
        headers: HeaderMap,
        client: Option<IpAddr>,
    ) -> OutboundRequest {
        let mut outbound = OutboundRequest::new(&self.target, method, uri, headers);
        for transform in &self.transforms {
            transform.apply(&mut outbound);
        }
        strip_hop_by_hop(&mut outbound.headers);
        if let Some(client) = client {
            append_forwarded_for(&mut outbound.headers, client);
        }
        outbound
    }

    /// Forward `request` and relay the backend's response
    pub async fn forward(&self, request: Request, client: Option<IpAddr>) -> Result<Response> {
        let (parts, body) = request.into_parts();
        let outbound = self.prepare(parts.method, &parts.uri, parts.headers, client);

        info!(destination = %self.destination, url = %outbound.url, "Forwarding request");

        let mut builder = self
            .client
            .request(outbound.method, outbound.url)
            .headers(outbound.headers);
        if body.size_hint().exact() != Some(0) {
            builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream = builder.send().await.map_err(|e| {
            warn!(destination = %self.destination, error = %e, "Backend unreachable");
            Error::Upstream {
                destination: self.destination.to_string(),
                message: e.to_string(),
            }
        })?;

        let status = upstream.status();
        info!(destination = %self.destination, status = status.as_u16(), "Backend responded");

        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// One forwarding proxy per destination
#[derive(Debug, Clone)]
pub struct ProxyDispatcher {
    proxies: HashMap<RouteDestination, ForwardingProxy>,
}

impl ProxyDispatcher {
    /// Build every proxy from the backend configuration
    pub fn new(backends: &BackendsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        let mut proxies = HashMap::new();
        for destination in RouteDestination::ALL {
            let mut transforms = common_transforms();
            let host = match destination {
                RouteDestination::EventServiceV1 | RouteDestination::EventServiceV2 => {
                    &backends.event_service_host
                }
                RouteDestination::EventMesh => {
                    transforms.push(RequestTransform::RewritePath(
                        backends.event_mesh_destination_path.clone(),
                    ));
                    &backends.event_mesh_host
                }
                RouteDestination::AppRegistry => &backends.app_registry_host,
            };
            let proxy = ForwardingProxy::new(destination, host, transforms, client.clone())?;
            proxies.insert(destination, proxy);
        }

        Ok(Self { proxies })
    }

    /// Proxy for a destination
    #[must_use]
    pub fn proxy(&self, destination: RouteDestination) -> Option<&ForwardingProxy> {
        self.proxies.get(&destination)
    }

    /// Forward `request` to `destination`
    pub async fn forward(
        &self,
        destination: RouteDestination,
        request: Request,
        client: Option<IpAddr>,
    ) -> Result<Response> {
        let proxy = self
            .proxy(destination)
            .ok_or_else(|| Error::Internal(format!("no proxy for destination {destination}")))?;
        proxy.forward(request, client).await
    }
}
