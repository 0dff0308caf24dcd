//! End-to-end pipeline behaviour through the service facade

use std::sync::Arc;
use std::time::Duration;

use exchange::{ExchangeService, PipelineError, ServiceError, WorkerSettings};
use market_data::hub::Subscription;
use market_data::{BookUpdate, BroadcastHub, Broadcaster, StreamPayload, Topic};
use matching_engine::OrderEvent;
use persistence::{
    JournalConfig, JournalStore, MemoryStore, MemoryStream, PersistenceAdapter,
};
use tokio::sync::broadcast::error::TryRecvError;
use types::ids::{OrderId, Symbol, UserId};
use types::numeric::{Price, Quantity};
use types::order::{CancelReason, Order, OrderStatus, RejectReason, Side};
use types::trade::Trade;

type MemoryService = ExchangeService<MemoryStore, MemoryStream, BroadcastHub>;

struct Harness {
    store: Arc<MemoryStore>,
    stream: Arc<MemoryStream>,
    hub: Arc<BroadcastHub>,
    service: MemoryService,
}

impl Harness {
    async fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new())).await
    }

    async fn with_store(store: Arc<MemoryStore>) -> Self {
        let stream = Arc::new(MemoryStream::new());
        let hub = Arc::new(BroadcastHub::new(256));
        let service = ExchangeService::new(
            store.clone(),
            stream.clone(),
            hub.clone(),
            WorkerSettings::default(),
        );
        assert!(service.add_instrument(aapl()).await.unwrap());
        Self {
            store,
            stream,
            hub,
            service,
        }
    }

    /// Wait until `count` commands are committed, acked and published
    async fn settle(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let mut drained = true;
                for symbol in self.service.instruments().await {
                    drained &= self.stream.pending_len(&symbol).await == 0
                        && self.stream.in_flight_len(&symbol).await == 0;
                }
                if drained && self.store.committed_count().await >= count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("pipeline did not settle");
    }

    async fn order(&self, order: &Order) -> Order {
        self.store.load_order(&order.order_id).await.unwrap().unwrap()
    }
}

fn aapl() -> Symbol {
    Symbol::new("AAPL")
}

fn msft() -> Symbol {
    Symbol::new("MSFT")
}

fn limit(user: UserId, side: Side, price: u64, qty: u64) -> Order {
    limit_on(aapl(), user, side, price, qty)
}

fn limit_on(symbol: Symbol, user: UserId, side: Side, price: u64, qty: u64) -> Order {
    Order::limit(user, symbol, side, Price::from_u64(price), Quantity::from_u64(qty), 1)
}

fn market(user: UserId, side: Side, qty: u64) -> Order {
    Order::market(user, aapl(), side, Quantity::from_u64(qty), 1)
}

/// Event names delivered for one order, in arrival order
fn names_for(events: &[OrderEvent], order: &Order) -> Vec<&'static str> {
    events
        .iter()
        .filter(|e| e.order_id() == order.order_id)
        .map(|e| e.name())
        .collect()
}

fn order_events(sub: &mut Subscription) -> Vec<OrderEvent> {
    let mut events = Vec::new();
    loop {
        match sub.receiver.try_recv() {
            Ok(event) => {
                if let StreamPayload::Order(order_event) = &event.payload {
                    events.push(order_event.clone());
                }
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return events,
            Err(TryRecvError::Lagged(_)) => continue,
        }
    }
}

#[tokio::test]
async fn test_full_cross_fills_both_sides() {
    let h = Harness::new().await;
    let a = limit(UserId::new(), Side::SELL, 100, 10);
    let b = limit(UserId::new(), Side::BUY, 100, 10);

    h.service.submit_order(a.clone()).await.unwrap();
    h.service.submit_order(b.clone()).await.unwrap();
    h.settle(2).await;

    let trades = h.store.trades(&aapl()).await;
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].price, Price::from_u64(100));
    assert_eq!(trades[0].quantity, Quantity::from_u64(10));
    assert_eq!(trades[0].resting_order_id, a.order_id);

    assert_eq!(h.order(&a).await.status, OrderStatus::Filled);
    assert_eq!(h.order(&b).await.status, OrderStatus::Filled);
    assert!(h.store.load_open_orders(&aapl()).await.unwrap().is_empty());

    let book = h.hub.latest_book(&aapl()).unwrap();
    assert!(book.snapshot.bids.is_empty() && book.snapshot.asks.is_empty());
}

#[tokio::test]
async fn test_market_order_walks_levels() {
    let h = Harness::new().await;
    let a = limit(UserId::new(), Side::SELL, 101, 5);
    let b = limit(UserId::new(), Side::SELL, 102, 5);
    let c = market(UserId::new(), Side::BUY, 8);

    for order in [&a, &b, &c] {
        h.service.submit_order(order.clone()).await.unwrap();
    }
    h.settle(3).await;

    let trades = h.store.trades(&aapl()).await;
    let fills: Vec<(Price, Quantity)> = trades.iter().map(|t| (t.price, t.quantity)).collect();
    assert_eq!(
        fills,
        vec![
            (Price::from_u64(101), Quantity::from_u64(5)),
            (Price::from_u64(102), Quantity::from_u64(3)),
        ]
    );
    assert_eq!(trades[0].sequence, 1);
    assert_eq!(trades[1].sequence, 2);

    assert_eq!(h.order(&a).await.status, OrderStatus::Filled);
    let b_after = h.order(&b).await;
    assert_eq!(b_after.remaining_quantity, Quantity::from_u64(2));
    assert_eq!(b_after.status, OrderStatus::PartiallyFilled);
    assert_eq!(h.order(&c).await.status, OrderStatus::Filled);

    let book = h.hub.latest_book(&aapl()).unwrap();
    assert_eq!(book.snapshot.asks.len(), 1);
    assert_eq!(book.snapshot.asks[0].price, Price::from_u64(102));
    assert_eq!(book.snapshot.asks[0].quantity, Quantity::from_u64(2));
}

#[tokio::test]
async fn test_rest_then_cancel() {
    let h = Harness::new().await;
    let user = UserId::new();
    let mut private = h.hub.subscribe(&Topic::User(user));
    let a = limit(user, Side::BUY, 99, 10);

    h.service.submit_order(a.clone()).await.unwrap();
    h.settle(1).await;
    assert_eq!(h.order(&a).await.status, OrderStatus::Open);
    assert_eq!(h.hub.latest_book(&aapl()).unwrap().snapshot.bids.len(), 1);

    h.service.cancel_order(a.order_id, aapl(), user).await.unwrap();
    h.settle(2).await;

    assert_eq!(
        h.order(&a).await.status,
        OrderStatus::Cancelled(CancelReason::UserRequested)
    );
    assert!(h.hub.latest_book(&aapl()).unwrap().snapshot.bids.is_empty());

    let names: Vec<&str> = order_events(&mut private).iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["ACCEPTED", "CANCELLED"]);
}

#[tokio::test]
async fn test_market_order_into_empty_book_rejected() {
    let h = Harness::new().await;
    let user = UserId::new();
    let mut private = h.hub.subscribe(&Topic::User(user));
    let a = market(user, Side::SELL, 5);

    h.service.submit_order(a.clone()).await.unwrap();
    h.settle(1).await;

    assert!(h.store.trades(&aapl()).await.is_empty());
    assert_eq!(
        h.order(&a).await.status,
        OrderStatus::Rejected(RejectReason::InsufficientLiquidity)
    );
    let events = order_events(&mut private);
    assert!(matches!(events.last(), Some(OrderEvent::Rejected { .. })));
}

#[tokio::test]
async fn test_invalid_order_rejected_and_stream_continues() {
    let h = Harness::new().await;
    let user = UserId::new();
    let bad = limit(user, Side::BUY, 100, 0);
    let good = limit(user, Side::BUY, 100, 1);

    h.service.submit_order(bad.clone()).await.unwrap();
    h.service.submit_order(good.clone()).await.unwrap();
    h.settle(2).await;

    assert_eq!(
        h.order(&bad).await.status,
        OrderStatus::Rejected(RejectReason::InvalidQuantity)
    );
    assert_eq!(h.order(&good).await.status, OrderStatus::Open);
    assert_eq!(h.stream.in_flight_len(&aapl()).await, 0);
}

#[tokio::test]
async fn test_cancel_rejections_reported_to_requester() {
    let h = Harness::new().await;
    let owner = UserId::new();
    let intruder = UserId::new();
    let mut private = h.hub.subscribe(&Topic::User(intruder));
    let a = limit(owner, Side::SELL, 105, 1);

    h.service.submit_order(a.clone()).await.unwrap();
    h.service.cancel_order(a.order_id, aapl(), intruder).await.unwrap();
    h.service
        .cancel_order(OrderId::new(), aapl(), intruder)
        .await
        .unwrap();
    h.settle(3).await;

    assert_eq!(h.order(&a).await.status, OrderStatus::Open);
    let events = order_events(&mut private);
    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|e| matches!(e, OrderEvent::CancelRejected { .. }) && e.user_id() == intruder));
}

#[tokio::test]
async fn test_add_instrument_is_idempotent() {
    let h = Harness::new().await;
    assert!(!h.service.add_instrument(aapl()).await.unwrap());
    assert!(h.service.add_instrument(Symbol::new("MSFT")).await.unwrap());
    assert_eq!(h.service.instruments().await, vec![aapl(), Symbol::new("MSFT")]);
}

#[tokio::test]
async fn test_unknown_instrument_refused() {
    let h = Harness::new().await;
    let order = Order::limit(
        UserId::new(),
        Symbol::new("TSLA"),
        Side::BUY,
        Price::from_u64(1),
        Quantity::from_u64(1),
        1,
    );
    assert!(matches!(
        h.service.submit_order(order).await,
        Err(ServiceError::UnknownInstrument(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_commit_failures_are_retried() {
    let h = Harness::new().await;
    h.store.fail_next_commits(3);
    let a = limit(UserId::new(), Side::BUY, 99, 1);

    h.service.submit_order(a.clone()).await.unwrap();
    h.settle(1).await;

    assert_eq!(h.store.commit_attempts(), 4);
    assert_eq!(h.order(&a).await.status, OrderStatus::Open);
    assert_eq!(h.stream.in_flight_len(&aapl()).await, 0);

    let reports = h.service.shutdown().await;
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_clean());
    assert_eq!(reports[0].stats.commit_retries, 3);
    assert_eq!(reports[0].stats.processed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_leaves_failing_command_unacked() {
    let store = Arc::new(MemoryStore::new());
    let h = Harness::with_store(store.clone()).await;
    store.fail_next_commits(usize::MAX);
    let a = limit(UserId::new(), Side::BUY, 99, 1);

    h.service.submit_order(a.clone()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.commit_attempts() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();

    let reports = h.service.shutdown().await;
    assert!(matches!(
        reports[0].error,
        Some(PipelineError::CommitAbandoned { .. })
    ));
    assert_eq!(h.stream.in_flight_len(&aapl()).await, 1);
    assert_eq!(store.committed_count().await, 0);

    // Store recovers; a fresh worker on the same stream gets the command again
    store.fail_next_commits(0);
    let service = ExchangeService::new(
        store.clone(),
        h.stream.clone(),
        h.hub.clone(),
        WorkerSettings::default(),
    );
    assert!(service.add_instrument(aapl()).await.unwrap());
    h.settle(1).await;
    assert_eq!(h.order(&a).await.status, OrderStatus::Open);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_waits_for_commit_that_recovers() {
    let h = Harness::new().await;
    h.store.fail_next_commits(2);
    let a = limit(UserId::new(), Side::BUY, 99, 1);

    h.service.submit_order(a.clone()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.store.commit_attempts() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();

    let reports = h.service.shutdown().await;
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_clean());
    assert_eq!(reports[0].stats.processed, 1);
    assert_eq!(h.store.commit_attempts(), 3);
    assert_eq!(h.store.committed_count().await, 1);
    assert_eq!(h.stream.in_flight_len(&aapl()).await, 0);
    assert_eq!(h.order(&a).await.status, OrderStatus::Open);
}

#[tokio::test]
async fn test_instruments_match_independently() {
    let h = Harness::new().await;
    assert!(h.service.add_instrument(msft()).await.unwrap());
    let u1 = UserId::new();
    let u2 = UserId::new();
    let mut private_1 = h.hub.subscribe(&Topic::User(u1));
    let mut private_2 = h.hub.subscribe(&Topic::User(u2));

    let a1 = limit_on(aapl(), u1, Side::SELL, 100, 10);
    let m1 = limit_on(msft(), u1, Side::SELL, 200, 5);
    let a2 = limit_on(aapl(), u2, Side::BUY, 100, 4);
    let m2 = limit_on(msft(), u1, Side::SELL, 201, 3);
    let a3 = limit_on(aapl(), u2, Side::BUY, 100, 6);
    let m3 = limit_on(msft(), u2, Side::BUY, 200, 5);
    let a4 = limit_on(aapl(), u2, Side::BUY, 99, 2);
    for order in [&a1, &m1, &a2, &m2, &a3, &m3, &a4] {
        h.service.submit_order(order.clone()).await.unwrap();
    }
    h.settle(7).await;

    let aapl_trades = h.store.trades(&aapl()).await;
    assert_eq!(aapl_trades.iter().map(|t| t.sequence).collect::<Vec<_>>(), vec![1, 2]);
    assert!(aapl_trades.iter().all(|t| t.resting_order_id == a1.order_id));
    let msft_trades = h.store.trades(&msft()).await;
    assert_eq!(msft_trades.len(), 1);
    assert_eq!(msft_trades[0].sequence, 1);
    assert_eq!(msft_trades[0].price, Price::from_u64(200));
    assert_eq!(msft_trades[0].resting_order_id, m1.order_id);

    let aapl_book = h.hub.latest_book(&aapl()).unwrap().snapshot;
    assert!(aapl_book.asks.is_empty());
    assert_eq!(aapl_book.bids.len(), 1);
    assert_eq!(aapl_book.bids[0].price, Price::from_u64(99));
    let msft_book = h.hub.latest_book(&msft()).unwrap().snapshot;
    assert!(msft_book.bids.is_empty());
    assert_eq!(msft_book.asks.len(), 1);
    assert_eq!(msft_book.asks[0].price, Price::from_u64(201));
    assert_eq!(msft_book.asks[0].quantity, Quantity::from_u64(3));

    let events_1 = order_events(&mut private_1);
    assert_eq!(names_for(&events_1, &a1), vec!["ACCEPTED", "PARTIALLY_FILLED", "FILLED"]);
    assert_eq!(names_for(&events_1, &m1), vec!["ACCEPTED", "FILLED"]);
    assert_eq!(names_for(&events_1, &m2), vec!["ACCEPTED"]);
    let events_2 = order_events(&mut private_2);
    assert_eq!(names_for(&events_2, &a2), vec!["ACCEPTED", "FILLED"]);
    assert_eq!(names_for(&events_2, &a3), vec!["ACCEPTED", "FILLED"]);
    assert_eq!(names_for(&events_2, &m3), vec!["ACCEPTED", "FILLED"]);
    assert_eq!(names_for(&events_2, &a4), vec!["ACCEPTED"]);
}

/// Publishes book and trade updates, panics on private events
struct PanicOnUserEvent;

impl Broadcaster for PanicOnUserEvent {
    fn publish_book_update(&self, _symbol: &Symbol, _update: BookUpdate) {}

    fn publish_trade(&self, _trade: &Trade) {}

    fn publish_user_event(&self, _user_id: UserId, _event: OrderEvent) {
        panic!("private channel unavailable");
    }
}

#[tokio::test]
async fn test_dead_worker_refuses_new_commands() {
    let stream = Arc::new(MemoryStream::new());
    let service = ExchangeService::new(
        Arc::new(MemoryStore::new()),
        stream.clone(),
        Arc::new(PanicOnUserEvent),
        WorkerSettings::default(),
    );
    service.add_instrument(aapl()).await.unwrap();
    assert!(!service.is_halted(&aapl()).await);

    service
        .submit_order(limit(UserId::new(), Side::BUY, 99, 1))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !service.is_halted(&aapl()).await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("worker did not stop");

    let result = service
        .submit_order(limit(UserId::new(), Side::BUY, 98, 1))
        .await;
    assert!(matches!(result, Err(ServiceError::InstrumentHalted(_))));
    let result = service.cancel_order(OrderId::new(), aapl(), UserId::new()).await;
    assert!(matches!(result, Err(ServiceError::InstrumentHalted(_))));
    assert_eq!(stream.pending_len(&aapl()).await, 0);

    // A panicked worker leaves no report
    assert!(service.shutdown().await.is_empty());
}

#[tokio::test]
async fn test_restart_rebuilds_book_from_store() {
    let store = Arc::new(MemoryStore::new());
    let seller = limit(UserId::new(), Side::SELL, 100, 10);
    {
        let h = Harness::with_store(store.clone()).await;
        h.service.submit_order(seller.clone()).await.unwrap();
        h.service
            .submit_order(limit(UserId::new(), Side::BUY, 100, 4))
            .await
            .unwrap();
        h.settle(2).await;
        assert!(h.service.shutdown().await.iter().all(|r| r.is_clean()));
    }

    let h = Harness::with_store(store.clone()).await;
    let book = h.hub.latest_book(&aapl()).unwrap();
    assert_eq!(book.snapshot.asks[0].quantity, Quantity::from_u64(6));

    h.service
        .submit_order(limit(UserId::new(), Side::BUY, 100, 6))
        .await
        .unwrap();
    h.settle(3).await;

    let trades = store.trades(&aapl()).await;
    assert_eq!(trades.iter().map(|t| t.sequence).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(h.order(&seller).await.status, OrderStatus::Filled);
}

#[tokio::test]
async fn test_crossed_persisted_book_refuses_instrument() {
    let store = Arc::new(MemoryStore::new());
    store.save_order(&limit(UserId::new(), Side::BUY, 101, 1)).await.unwrap();
    store.save_order(&limit(UserId::new(), Side::SELL, 100, 1)).await.unwrap();

    let service = ExchangeService::new(
        store,
        Arc::new(MemoryStream::new()),
        Arc::new(BroadcastHub::default()),
        WorkerSettings::default(),
    );
    let result = service.add_instrument(aapl()).await;
    assert!(matches!(result, Err(ServiceError::Pipeline(PipelineError::Engine(_)))));
    assert!(service.instruments().await.is_empty());
}

#[tokio::test]
async fn test_journal_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let resting = limit(UserId::new(), Side::BUY, 99, 10);
    {
        let store = Arc::new(JournalStore::open(JournalConfig::new(dir.path())).unwrap());
        let service = ExchangeService::new(
            store.clone(),
            Arc::new(MemoryStream::new()),
            Arc::new(BroadcastHub::default()),
            WorkerSettings::default(),
        );
        service.add_instrument(aapl()).await.unwrap();
        service.submit_order(resting.clone()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.load_order(&resting.order_id).await.unwrap().is_none() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        service.shutdown().await;
    }

    let store = Arc::new(JournalStore::open(JournalConfig::new(dir.path())).unwrap());
    let hub = Arc::new(BroadcastHub::default());
    let service = ExchangeService::new(
        store,
        Arc::new(MemoryStream::new()),
        hub.clone(),
        WorkerSettings::default(),
    );
    service.add_instrument(aapl()).await.unwrap();

    let book = hub.latest_book(&aapl()).unwrap();
    assert_eq!(book.snapshot.bids.len(), 1);
    assert_eq!(book.snapshot.bids[0].price, Price::from_u64(99));
}
