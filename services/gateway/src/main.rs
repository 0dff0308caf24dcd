mod auth;
mod error;
mod handlers;
mod models;
mod router;
mod state;
mod store;

use anyhow::Context;
use exchange::{ExchangeConfig, WorkerSettings};
use market_data::BroadcastHub;
use router::create_router;
use state::{AppState, Exchange};
use std::future::Future;
use std::sync::Arc;
use store::{Store, Stream};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Starting Gateway API service");

    let config = ExchangeConfig::load().context("loading exchange config")?;
    let addr = config.socket_addr()?;

    let store = Store::open(config.journal_dir.as_deref())?;
    let stream = Stream::open(config.journal_dir.as_deref()).await?;

    let hub = Arc::new(BroadcastHub::new(config.broadcast.channel_capacity));
    let exchange = Arc::new(Exchange::new(
        Arc::new(store),
        Arc::new(stream),
        hub.clone(),
        WorkerSettings::from(&config),
    ));
    for symbol in config.symbols()? {
        exchange.add_instrument(symbol).await?;
    }

    let state = AppState::new(exchange.clone(), hub, config.session);
    let app = create_router(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(exchange))
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM once the instrument workers have drained,
/// so the HTTP server stops after the pipeline
async fn shutdown_signal(exchange: Arc<Exchange>) {
    drain_after(stop_requested(), exchange).await
}

/// Future that resolves on Ctrl-C or SIGTERM
///
/// The SIGTERM handler is installed before this returns, so a signal sent
/// right after is not lost.
fn stop_requested() -> impl Future<Output = ()> {
    #[cfg(unix)]
    let terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate());

    async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match terminate {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Ctrl-C received"),
            _ = terminate => tracing::info!("SIGTERM received"),
        }
    }
}

async fn drain_after(stop: impl Future<Output = ()>, exchange: Arc<Exchange>) {
    stop.await;
    tracing::info!("Shutdown requested");

    for report in exchange.shutdown().await {
        match &report.error {
            None => tracing::info!(symbol = %report.symbol, stats = ?report.stats, "Worker stopped"),
            Some(e) => tracing::error!(symbol = %report.symbol, error = %e, "Worker stopped with error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exchange::ServiceError;
    use persistence::{MemoryStore, MemoryStream};
    use std::time::Duration;
    use store::{Store, Stream};
    use types::ids::{Symbol, UserId};
    use types::numeric::{Price, Quantity};
    use types::order::{Order, Side};

    async fn exchange() -> Arc<Exchange> {
        let exchange = Arc::new(Exchange::new(
            Arc::new(Store::Memory(MemoryStore::new())),
            Arc::new(Stream::Memory(MemoryStream::new())),
            Arc::new(BroadcastHub::default()),
            WorkerSettings::default(),
        ));
        exchange.add_instrument(Symbol::new("AAPL")).await.unwrap();
        exchange
    }

    #[tokio::test]
    async fn test_drain_stops_workers_before_returning() {
        let exchange = exchange().await;
        drain_after(async {}, exchange.clone()).await;

        assert!(exchange.instruments().await.is_empty());
        let order = Order::limit(
            UserId::new(),
            Symbol::new("AAPL"),
            Side::BUY,
            Price::from_u64(100),
            Quantity::from_u64(1),
            1,
        );
        assert!(matches!(
            exchange.submit_order(order).await,
            Err(ServiceError::ShuttingDown)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_requests_stop() {
        let stop = stop_requested();
        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), stop)
            .await
            .expect("SIGTERM did not resolve the stop future");
    }
}
