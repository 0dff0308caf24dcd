//! Per-instrument ingestion pipeline
//!
//! One [`InstrumentWorker`] per instrument owns that instrument's matching
//! engine and processes its command stream strictly in order:
//!
//! 1. pull the next command
//! 2. skip and ack it if its command id is already committed
//! 3. apply it to the engine
//! 4. commit touched orders, trades and the command id (retried with backoff)
//! 5. ack
//! 6. publish book update, trades and private order events
//!
//! A crossed book halts the worker. On shutdown the in-flight command is
//! finished before the worker stops pulling.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use market_data::{BookFeed, Broadcaster};
use matching_engine::{EngineError, MatchingEngine, OrderEvent, SelfTradePolicy};
use persistence::{
    AckHandle, CommandStream, CommitBatch, CommitStatus, PersistenceAdapter, PersistenceError,
    StreamError,
};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use types::command::{Command, CommandEnvelope};
use types::ids::{CommandId, OrderId, Symbol, UserId};
use types::order::{Order, OrderStatus, RejectReason};
use types::time::now_nanos;
use types::trade::Trade;

use crate::config::RetryConfig;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Instrument {symbol} halted: {reason}")]
    Halted { symbol: Symbol, reason: String },

    #[error("Gave up committing command {command_id} after {attempts} attempts during shutdown")]
    CommitAbandoned { command_id: CommandId, attempts: u32 },
}

/// Settings shared by every worker
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub retry: RetryConfig,
    pub book_depth: usize,
    pub self_trade_policy: SelfTradePolicy,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            book_depth: 20,
            self_trade_policy: SelfTradePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Commands applied and committed
    pub processed: u64,
    /// Redelivered commands skipped because they were already committed
    pub duplicates_skipped: u64,
    pub orders_rejected: u64,
    pub cancels_rejected: u64,
    pub trades: u64,
    pub commit_retries: u64,
}

/// How a worker ended
#[derive(Debug)]
pub struct WorkerReport {
    pub symbol: Symbol,
    pub stats: WorkerStats,
    /// Set when the worker stopped for any reason other than shutdown
    pub error: Option<PipelineError>,
}

impl WorkerReport {
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of applying one command to the engine
struct Applied {
    batch: CommitBatch,
    trades: Vec<Trade>,
    events: Vec<OrderEvent>,
}

struct StoppedGuard {
    symbol: Symbol,
    halted: Arc<AtomicBool>,
}

impl Drop for StoppedGuard {
    fn drop(&mut self) {
        self.halted.store(true, Ordering::SeqCst);
        if std::thread::panicking() {
            error!(symbol = %self.symbol, "ALERT: instrument worker panicked");
        }
    }
}

pub struct InstrumentWorker<P, Q, B> {
    symbol: Symbol,
    engine: MatchingEngine,
    feed: BookFeed,
    store: Arc<P>,
    stream: Arc<Q>,
    broadcaster: Arc<B>,
    settings: WorkerSettings,
    halted: Arc<AtomicBool>,
    stats: WorkerStats,
}

impl<P, Q, B> InstrumentWorker<P, Q, B>
where
    P: PersistenceAdapter,
    Q: CommandStream,
    B: Broadcaster,
{
    /// Rebuild the instrument's book from the store and requeue whatever
    /// was consumed but never acknowledged
    pub async fn recover(
        symbol: Symbol,
        store: Arc<P>,
        stream: Arc<Q>,
        broadcaster: Arc<B>,
        settings: WorkerSettings,
    ) -> Result<Self, PipelineError> {
        let open_orders = store.load_open_orders(&symbol).await?;
        let last_sequence = store.last_trade_sequence(&symbol).await?;
        let resting = open_orders.len();
        let engine = MatchingEngine::from_open_orders(
            symbol.clone(),
            open_orders,
            last_sequence,
            settings.self_trade_policy,
        )?;
        let redelivered = stream.redeliver_unacked(&symbol).await?;

        info!(
            %symbol,
            resting,
            last_sequence,
            redelivered,
            "Instrument worker recovered"
        );

        let mut worker = Self {
            feed: BookFeed::new(symbol.clone()),
            symbol,
            engine,
            store,
            stream,
            broadcaster,
            settings,
            halted: Arc::new(AtomicBool::new(false)),
            stats: WorkerStats::default(),
        };
        worker.publish_book(now_nanos());
        Ok(worker)
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn engine(&self) -> &MatchingEngine {
        &self.engine
    }

    /// Flag raised once the worker stops consuming, whatever the cause
    pub fn halted_flag(&self) -> Arc<AtomicBool> {
        self.halted.clone()
    }

    /// Process commands until shutdown or a fatal error
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> WorkerReport {
        info!(symbol = %self.symbol, "Instrument worker started");
        // Raises the flag on every exit, panics included
        let _stopped = StoppedGuard {
            symbol: self.symbol.clone(),
            halted: self.halted.clone(),
        };
        let result = self.run_loop(&mut shutdown).await;

        match &result {
            Ok(()) => info!(symbol = %self.symbol, stats = ?self.stats, "Instrument worker stopped"),
            Err(PipelineError::Halted { reason, .. }) => {
                error!(symbol = %self.symbol, %reason, "ALERT: instrument halted")
            }
            Err(e) => error!(symbol = %self.symbol, error = %e, "ALERT: instrument worker failed"),
        }

        WorkerReport {
            symbol: self.symbol,
            stats: self.stats,
            error: result.err(),
        }
    }

    async fn run_loop(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<(), PipelineError> {
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            let (envelope, ack) = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    // A dropped sender also means stop
                    if changed.is_err() {
                        return Ok(());
                    }
                    continue;
                }
                next = self.stream.consume_next(&self.symbol) => next?,
            };

            self.process(envelope, ack, shutdown).await?;
        }
    }

    /// Apply, commit, ack and publish one command
    pub(crate) async fn process(
        &mut self,
        envelope: CommandEnvelope,
        ack: AckHandle,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<(), PipelineError> {
        let command_id = envelope.command_id;
        let retry = self.settings.retry;

        let committed = with_retry(&retry, shutdown, command_id, &mut self.stats, || {
            self.store.is_committed(&command_id)
        })
        .await?;
        if committed {
            info!(symbol = %self.symbol, %command_id, "Skipping already committed command");
            self.stats.duplicates_skipped += 1;
            self.ack(ack).await;
            return Ok(());
        }

        let timestamp = now_nanos();
        let applied = self.apply(envelope, shutdown, timestamp).await?;

        let status = with_retry(&retry, shutdown, command_id, &mut self.stats, || {
            self.store.commit(&applied.batch)
        })
        .await?;
        if status == CommitStatus::AlreadyCommitted {
            warn!(symbol = %self.symbol, %command_id, "Command was committed concurrently");
        }

        self.ack(ack).await;
        self.stats.processed += 1;
        self.stats.trades += applied.trades.len() as u64;

        self.publish(applied, timestamp);
        Ok(())
    }

    async fn apply(
        &mut self,
        envelope: CommandEnvelope,
        shutdown: &watch::Receiver<bool>,
        timestamp: i64,
    ) -> Result<Applied, PipelineError> {
        let command_id = envelope.command_id;
        let mut batch = CommitBatch::empty(command_id, self.symbol.clone(), timestamp);

        match envelope.command {
            Command::NewOrder(order) => {
                let retry = self.settings.retry;
                let order_id = order.order_id;
                let known = with_retry(&retry, shutdown, command_id, &mut self.stats, || {
                    self.store.load_order(&order_id)
                })
                .await?;
                if known.is_some() || self.engine.book().contains(&order_id) {
                    return Ok(self.reject_duplicate(order, batch, timestamp));
                }

                match self.engine.submit(order, timestamp) {
                    Ok(outcome) => {
                        if outcome.is_rejected() {
                            self.stats.orders_rejected += 1;
                        }
                        batch.orders = outcome.touched_orders();
                        batch.trades = outcome.trades.clone();
                        Ok(Applied {
                            batch,
                            trades: outcome.trades,
                            events: outcome.events,
                        })
                    }
                    Err(e) => Err(self.halt(e)),
                }
            }
            Command::CancelOrder {
                order_id,
                symbol,
                user_id,
            } => match self.engine.cancel(&order_id, &user_id, timestamp) {
                Ok(order) => {
                    batch.orders = vec![order.clone()];
                    Ok(Applied {
                        batch,
                        trades: Vec::new(),
                        events: vec![OrderEvent::Cancelled { order }],
                    })
                }
                Err(e @ (EngineError::OrderNotFound { .. } | EngineError::NotOwner { .. })) => {
                    self.stats.cancels_rejected += 1;
                    debug!(%symbol, %order_id, reason = %e, "Cancel rejected");
                    Ok(Applied {
                        batch,
                        trades: Vec::new(),
                        events: vec![cancel_rejected(order_id, symbol, user_id, &e)],
                    })
                }
                Err(e) => Err(self.halt(e)),
            },
        }
    }

    /// An order id that already exists is reported back but never stored
    fn reject_duplicate(&mut self, mut order: Order, batch: CommitBatch, timestamp: i64) -> Applied {
        warn!(symbol = %self.symbol, order_id = %order.order_id, "Duplicate order id rejected");
        self.stats.orders_rejected += 1;
        if order.reject(RejectReason::DuplicateOrder, timestamp).is_err() {
            order.status = OrderStatus::Rejected(RejectReason::DuplicateOrder);
            order.updated_at = timestamp;
        }
        Applied {
            batch,
            trades: Vec::new(),
            events: vec![OrderEvent::Rejected { order }],
        }
    }

    /// Stop accepting commands for this instrument
    fn halt(&self, cause: EngineError) -> PipelineError {
        self.halted.store(true, Ordering::SeqCst);
        PipelineError::Halted {
            symbol: self.symbol.clone(),
            reason: cause.to_string(),
        }
    }

    async fn ack(&self, ack: AckHandle) {
        let command_id = ack.command_id;
        // A failed ack only means the committed command is redelivered and skipped
        if let Err(e) = self.stream.ack(ack).await {
            warn!(symbol = %self.symbol, %command_id, error = %e, "Ack failed");
        }
    }

    fn publish(&mut self, applied: Applied, timestamp: i64) {
        for trade in &applied.trades {
            self.broadcaster.publish_trade(trade);
        }
        for event in applied.events {
            self.broadcaster.publish_user_event(event.user_id(), event);
        }
        self.publish_book(timestamp);
    }

    fn publish_book(&mut self, timestamp: i64) {
        let update = self.feed.next_update(
            self.engine.top_of_book(),
            self.engine.depth(self.settings.book_depth),
            timestamp,
        );
        self.broadcaster.publish_book_update(&self.symbol, update);
    }
}

fn cancel_rejected(order_id: OrderId, symbol: Symbol, user_id: UserId, cause: &EngineError) -> OrderEvent {
    let reason = match cause {
        EngineError::NotOwner { .. } => "order belongs to another user",
        _ => "order not found or already closed",
    };
    OrderEvent::CancelRejected {
        order_id,
        symbol,
        user_id,
        reason: reason.to_string(),
    }
}

/// Run a persistence call until it succeeds
///
/// Failures back off exponentially. Once shutdown is requested only
/// `shutdown_attempts` more failures are tolerated.
async fn with_retry<T, F, Fut>(
    retry: &RetryConfig,
    shutdown: &watch::Receiver<bool>,
    command_id: CommandId,
    stats: &mut WorkerStats,
    mut operation: F,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PersistenceError>>,
{
    let mut attempt: u32 = 0;
    let mut failures_after_shutdown: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if *shutdown.borrow() {
                    failures_after_shutdown += 1;
                    if failures_after_shutdown >= retry.shutdown_attempts {
                        error!(%command_id, attempts = attempt + 1, error = %e, "Persistence still failing at shutdown, leaving command unacknowledged");
                        return Err(PipelineError::CommitAbandoned {
                            command_id,
                            attempts: attempt + 1,
                        });
                    }
                }
                let delay = retry.backoff(attempt);
                warn!(%command_id, attempt = attempt + 1, ?delay, error = %e, "Persistence failed, retrying");
                stats.commit_retries += 1;
                attempt = attempt.saturating_add(1);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
