//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use connectivity_core::RouteTable;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::handler::GatewayHandler;
use super::proxy::ProxyDispatcher;
use super::router::{AppState, create_router};
use crate::cache::{Cache, TtlCache};
use crate::config::{Config, DirectoryConfig};
use crate::directory::{ApplicationDirectory, KubeDirectory, StaticDirectory};
use crate::identity::{Identity, IdentityResolver};
use crate::{Error, Result};

/// Connectivity validator server
pub struct Gateway {
    /// Configuration
    config: Config,
    /// Identity cache, swept by the janitor while running
    cache: Arc<TtlCache<Identity>>,
    /// Router with the validation pipeline
    app: Router,
}

impl Gateway {
    /// Create a new gateway
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let directory: Arc<dyn ApplicationDirectory> = match &config.directory {
            DirectoryConfig::Kubernetes(kube) => {
                let directory = KubeDirectory::new(kube)
                    .map_err(|e| Error::Config(format!("Kubernetes directory: {e}")))?;
                info!(api_server = %kube.api_server, "Using Kubernetes application directory");
                Arc::new(directory)
            }
            DirectoryConfig::Static(fixed) => {
                info!(
                    applications = fixed.applications.len(),
                    "Using static application directory"
                );
                Arc::new(StaticDirectory::new(&fixed.applications))
            }
        };
        Self::with_directory(config, directory)
    }

    /// Create a gateway over an explicit directory
    pub fn with_directory(config: Config, directory: Arc<dyn ApplicationDirectory>) -> Result<Self> {
        let cache = Arc::new(TtlCache::new(config.cache.expiration));
        let shared: Arc<dyn Cache<Identity>> = cache.clone();
        let resolver = IdentityResolver::new(directory, shared);
        let dispatcher = ProxyDispatcher::new(&config.backends)?;
        let routes = RouteTable::new(&config.routes.prefixes());

        let handler = GatewayHandler::new(
            resolver,
            routes,
            dispatcher,
            config.validation.clone(),
            config.backends.mesh_enabled(),
        );
        let app = create_router(Arc::new(AppState { handler }));

        Ok(Self { config, cache, app })
    }

    /// Router serving the gateway, for embedding or in-process tests
    #[must_use]
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    /// Run the gateway until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `shutdown` completes
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, _) = broadcast::channel(1);

        let janitor = self
            .cache
            .spawn_janitor(self.config.cache.cleanup_interval, shutdown_tx.subscribe());

        let routes = &self.config.routes;
        let backends = &self.config.backends;
        info!("============================================================");
        info!("CONNECTIVITY VALIDATOR v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(address = %listener.local_addr()?, "Listening");
        info!(
            group = %self.config.validation.group,
            tenant = %self.config.validation.tenant,
            "Subject scoping"
        );
        info!("  {} -> {}", routes.event_service_v1_prefix, backends.event_service_host);
        info!(
            "  {} -> {}",
            routes.event_service_v2_prefix,
            if backends.mesh_enabled() {
                &backends.event_mesh_host
            } else {
                &backends.event_service_host
            }
        );
        info!(
            "  {} -> {}{}",
            routes.event_mesh_prefix, backends.event_mesh_host, backends.event_mesh_destination_path
        );
        info!("  {} -> {}", routes.app_registry_prefix, backends.app_registry_host);
        info!("============================================================");

        let mut drain_rx = shutdown_tx.subscribe();
        let signal_tx = shutdown_tx.clone();
        let app = self
            .app
            .into_make_service_with_connect_info::<SocketAddr>();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown.await;
                    info!("Shutdown signal received");
                    let _ = signal_tx.send(());
                })
                .await
        });

        let served = tokio::select! {
            result = &mut server => result,
            _ = drain_rx.recv() => {
                match tokio::time::timeout(self.config.server.shutdown_timeout, &mut server).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            timeout = ?self.config.server.shutdown_timeout,
                            "Graceful shutdown timed out, dropping open connections"
                        );
                        server.abort();
                        Ok(Ok(()))
                    }
                }
            }
        };

        // Stops the janitor if the server exited on its own
        let _ = shutdown_tx.send(());
        if let Some(janitor) = janitor {
            let _ = janitor.await;
        }

        served
            .map_err(|e| Error::Internal(format!("server task failed: {e}")))?
            .map_err(Error::Io)
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
