//! Exchange service facade
//!
//! Owns the instrument registry: one spawned [`InstrumentWorker`] per
//! instrument. Submissions and cancels are only enqueued here; their
//! outcome reaches the user on the private channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use market_data::Broadcaster;
use persistence::{CommandStream, PersistenceAdapter, StreamError};
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info};
use types::command::Command;
use types::ids::{CommandId, OrderId, Symbol, UserId};
use types::order::Order;

use crate::pipeline::{InstrumentWorker, PipelineError, WorkerReport, WorkerSettings};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(Symbol),

    #[error("Instrument {0} is halted")]
    InstrumentHalted(Symbol),

    #[error("Service is shutting down")]
    ShuttingDown,

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

struct InstrumentHandle {
    halted: Arc<AtomicBool>,
    task: JoinHandle<WorkerReport>,
}

pub struct ExchangeService<P, Q, B> {
    store: Arc<P>,
    stream: Arc<Q>,
    broadcaster: Arc<B>,
    settings: WorkerSettings,
    instruments: RwLock<HashMap<Symbol, InstrumentHandle>>,
    shutdown: watch::Sender<bool>,
}

impl<P, Q, B> ExchangeService<P, Q, B>
where
    P: PersistenceAdapter,
    Q: CommandStream,
    B: Broadcaster,
{
    pub fn new(store: Arc<P>, stream: Arc<Q>, broadcaster: Arc<B>, settings: WorkerSettings) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            store,
            stream,
            broadcaster,
            settings,
            instruments: RwLock::new(HashMap::new()),
            shutdown,
        }
    }

    /// Register an instrument and start its worker
    ///
    /// Returns `false` when the instrument already exists.
    pub async fn add_instrument(&self, symbol: Symbol) -> Result<bool, ServiceError> {
        if *self.shutdown.borrow() {
            return Err(ServiceError::ShuttingDown);
        }

        let mut instruments = self.instruments.write().await;
        if instruments.contains_key(&symbol) {
            info!(%symbol, "Instrument already registered");
            return Ok(false);
        }

        let worker = InstrumentWorker::recover(
            symbol.clone(),
            self.store.clone(),
            self.stream.clone(),
            self.broadcaster.clone(),
            self.settings,
        )
        .await?;
        let halted = worker.halted_flag();
        let task = tokio::spawn(worker.run(self.shutdown.subscribe()));

        instruments.insert(symbol.clone(), InstrumentHandle { halted, task });
        info!(%symbol, "Instrument added");
        Ok(true)
    }

    /// Enqueue a new order; returns its command id
    pub async fn submit_order(&self, order: Order) -> Result<CommandId, ServiceError> {
        let symbol = order.symbol.clone();
        self.ensure_accepting(&symbol).await?;
        Ok(self.stream.enqueue(&symbol, Command::NewOrder(order)).await?)
    }

    /// Enqueue a cancel; returns its command id
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        symbol: Symbol,
        user_id: UserId,
    ) -> Result<CommandId, ServiceError> {
        self.ensure_accepting(&symbol).await?;
        let command = Command::CancelOrder {
            order_id,
            symbol: symbol.clone(),
            user_id,
        };
        Ok(self.stream.enqueue(&symbol, command).await?)
    }

    async fn ensure_accepting(&self, symbol: &Symbol) -> Result<(), ServiceError> {
        if *self.shutdown.borrow() {
            return Err(ServiceError::ShuttingDown);
        }
        let instruments = self.instruments.read().await;
        let handle = instruments
            .get(symbol)
            .ok_or_else(|| ServiceError::UnknownInstrument(symbol.clone()))?;
        if handle.halted.load(Ordering::SeqCst) || handle.task.is_finished() {
            return Err(ServiceError::InstrumentHalted(symbol.clone()));
        }
        Ok(())
    }

    /// Registered instruments, sorted
    pub async fn instruments(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.instruments.read().await.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Whether the instrument's worker has stopped consuming
    pub async fn is_halted(&self, symbol: &Symbol) -> bool {
        self.instruments
            .read()
            .await
            .get(symbol)
            .is_some_and(|handle| handle.halted.load(Ordering::SeqCst) || handle.task.is_finished())
    }

    /// Stop every worker after its in-flight command and collect the reports
    pub async fn shutdown(&self) -> Vec<WorkerReport> {
        info!("Stopping instrument workers");
        self.shutdown.send_replace(true);

        let handles: Vec<(Symbol, InstrumentHandle)> =
            self.instruments.write().await.drain().collect();
        let mut reports = Vec::with_capacity(handles.len());
        for (symbol, handle) in handles {
            match handle.task.await {
                Ok(report) => reports.push(report),
                Err(e) => error!(%symbol, error = %e, "Instrument worker panicked"),
            }
        }
        reports.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        info!(workers = reports.len(), "Instrument workers stopped");
        reports
    }
}
