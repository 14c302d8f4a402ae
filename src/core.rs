use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::app::AppContext;
use crate::health;
use crate::http::{AuthRoutes, DashboardRoutes, PlanRoutes, RouteModule, WebhookRoutes};

/// The plangate HTTP application
pub struct App {
    router: Router<AppContext>,
    context: AppContext,
}

impl App {
    /// App with the health endpoint and every API module registered.
    pub fn new(context: AppContext) -> Self {
        Self::bare(context)
            .register_module(AuthRoutes)
            .register_module(PlanRoutes)
            .register_module(DashboardRoutes)
            .register_module(WebhookRoutes)
    }

    /// Only `/health`; add modules with [`register_module`](Self::register_module).
    pub fn bare(context: AppContext) -> Self {
        let router = Router::<AppContext>::new().route("/health", get(health::health_handler));
        Self { router, context }
    }

    pub fn register_module<M: RouteModule>(mut self, module: M) -> Self {
        self.router = module.register(self.router);
        self
    }

    /// Router with state and tracing applied, ready to serve or test.
    pub fn into_router(self) -> Router {
        self.router
            .layer(TraceLayer::new_for_http())
            .with_state(self.context)
    }

    /// Serve until Ctrl+C or SIGTERM.
    pub async fn serve(self, addr: SocketAddr) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(addr).await?;

        tracing::info!("Server starting on http://{}", addr);
        tracing::info!("Health check available at http://{}/health", addr);

        axum::serve(listener, self.into_router())
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give in-flight requests a moment to finish
    tokio::time::sleep(Duration::from_secs(1)).await;
    tracing::info!("Shutdown complete");
}
