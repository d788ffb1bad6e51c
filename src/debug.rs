use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use eyre::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Runs the debug HTTP server until `shutdown` flips, draining in-flight
/// requests within the grace period.
pub async fn run(addr: SocketAddr, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/debug/info", get(info));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind debug server on {addr}"))?;

    info!("debug server listening on {addr}");

    let graceful = {
        let mut shutdown = shutdown.clone();
        async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        }
    };

    let server = axum::serve(listener, router).with_graceful_shutdown(graceful);

    tokio::select! {
        r = server => r.context("debug server failed"),

        () = async {
            let _ = shutdown.wait_for(|stop| *stop).await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => {
            warn!("debug server did not drain within the grace period");

            Ok(())
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn info() -> String {
    format!("{} {}\n", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}
