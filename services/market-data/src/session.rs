//! Subscriber session
//!
//! A session multiplexes every topic a client subscribed to into one
//! outbound stream of JSON messages. It owns:
//! - one broadcast receiver per topic, merged with a `StreamMap`
//! - the last sequence delivered per topic, to drop duplicates
//! - a bounded outbound queue with a drop policy
//!
//! Messages a receiver missed because it lagged are counted as dropped.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, info, warn};
use types::ids::{Symbol, UserId};

use crate::backpressure::{ClientQueue, DropPolicy, OutboundMessage};
use crate::channel::{
    parse_request, request_events, ChannelParams, ResponseBase, SymbolParams, Topic,
};
use crate::error::SubscriptionError;
use crate::events::StreamEvent;
use crate::hub::BroadcastHub;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_subscriptions: usize,
    pub queue_capacity: usize,
    pub drop_policy: DropPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_subscriptions: 50,
            queue_capacity: 256,
            drop_policy: DropPolicy::DropOldest,
        }
    }
}

pub struct Session {
    hub: Arc<BroadcastHub>,
    /// None for anonymous clients, which only see public channels
    user_id: Option<UserId>,
    config: SessionConfig,
    streams: StreamMap<Topic, BroadcastStream<Arc<StreamEvent>>>,
    last_delivered: HashMap<Topic, u64>,
    queue: ClientQueue,
    lagged: u64,
}

impl Session {
    pub fn new(hub: Arc<BroadcastHub>, user_id: Option<UserId>, config: SessionConfig) -> Self {
        Self {
            hub,
            user_id,
            config,
            streams: StreamMap::new(),
            last_delivered: HashMap::new(),
            queue: ClientQueue::new(config.queue_capacity, config.drop_policy),
            lagged: 0,
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn subscriptions(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.streams.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        self.streams.contains_key(topic)
    }

    /// Whether [`Session::recv`] can still yield anything
    pub fn is_active(&self) -> bool {
        !self.streams.is_empty() || !self.queue.is_empty()
    }

    /// Messages lost to lag or to the outbound queue's drop policy
    pub fn dropped(&self) -> u64 {
        self.lagged + self.queue.messages_dropped()
    }

    pub fn subscribe(&mut self, topic: Topic) -> Result<(), SubscriptionError> {
        if self.is_subscribed(&topic) {
            return Ok(());
        }
        if let Topic::User(owner) = &topic {
            if self.user_id != Some(*owner) {
                return Err(SubscriptionError::Unauthorized);
            }
        }
        if self.streams.len() >= self.config.max_subscriptions {
            return Err(SubscriptionError::TooManySubscriptions {
                max: self.config.max_subscriptions,
            });
        }

        let subscription = self.hub.subscribe(&topic);
        self.streams
            .insert(topic.clone(), BroadcastStream::new(subscription.receiver));
        if let Some(snapshot) = subscription.snapshot {
            self.offer(snapshot)?;
        }

        info!(%topic, user_id = ?self.user_id, "Session subscribed");
        Ok(())
    }

    pub fn unsubscribe(&mut self, topic: &Topic) -> Result<(), SubscriptionError> {
        if self.streams.remove(topic).is_none() {
            return Err(SubscriptionError::NotSubscribed(topic.clone()));
        }
        self.last_delivered.remove(topic);
        self.queue.purge(topic);
        self.hub.prune(topic);
        info!(%topic, user_id = ?self.user_id, "Session unsubscribed");
        Ok(())
    }

    /// Handle one client text frame and build the reply
    pub fn handle_message(&mut self, text: &str) -> ResponseBase {
        let request = match parse_request(text) {
            Ok(request) => request,
            Err(e) => return ResponseBase::error("error", &e),
        };
        match self.dispatch(&request.event, request.params) {
            Ok(()) => ResponseBase::ok(request.event),
            Err(e) => {
                debug!(event = %request.event, error = %e, "Request failed");
                ResponseBase::error(request.event, &e)
            }
        }
    }

    fn dispatch(&mut self, event: &str, params: serde_json::Value) -> Result<(), SubscriptionError> {
        match event {
            request_events::SUBSCRIBE | request_events::UNSUBSCRIBE => {
                let params: ChannelParams =
                    serde_json::from_value(params).map_err(|_| SubscriptionError::BadParams)?;
                let topics = params
                    .channels
                    .iter()
                    .map(|c| c.parse::<Topic>())
                    .collect::<Result<Vec<_>, _>>()?;
                for topic in topics {
                    if event == request_events::SUBSCRIBE {
                        self.subscribe(topic)?;
                    } else {
                        self.unsubscribe(&topic)?;
                    }
                }
                Ok(())
            }
            request_events::STREAM_INFO => {
                let params: SymbolParams =
                    serde_json::from_value(params).map_err(|_| SubscriptionError::BadParams)?;
                let symbol = Symbol::try_new(params.symbol).ok_or(SubscriptionError::BadParams)?;
                self.subscribe(Topic::Book(symbol.clone()))?;
                self.subscribe(Topic::Trades(symbol))
            }
            request_events::STREAM_USER_PRIVATE_INFO => {
                let user_id = self.user_id.ok_or(SubscriptionError::Unauthorized)?;
                self.subscribe(Topic::User(user_id))
            }
            request_events::PING => Ok(()),
            other => Err(SubscriptionError::UnsupportedEvent(other.to_string())),
        }
    }

    /// Next outbound JSON message
    ///
    /// Returns `None` once there is nothing subscribed and nothing queued.
    /// Cancel-safe.
    pub async fn recv(&mut self) -> Option<Result<String, SubscriptionError>> {
        loop {
            if let Some(message) = self.queue.pop() {
                return Some(Ok(message.payload));
            }

            match self.streams.next().await? {
                (_, Ok(event)) => {
                    if let Err(e) = self.offer(event) {
                        return Some(Err(e));
                    }
                }
                (topic, Err(BroadcastStreamRecvError::Lagged(missed))) => {
                    self.lagged += missed;
                    warn!(%topic, missed, user_id = ?self.user_id, "Subscriber lagged, messages dropped");
                }
            }
        }
    }

    /// Queue an event unless it was already delivered on its channel
    fn offer(&mut self, event: Arc<StreamEvent>) -> Result<(), SubscriptionError> {
        let last = self.last_delivered.get(&event.channel).copied().unwrap_or(0);
        if event.sequence <= last {
            debug!(channel = %event.channel, sequence = event.sequence, last, "Dropping duplicate");
            return Ok(());
        }

        let payload = event.to_json().map_err(|_| SubscriptionError::Internal)?;
        self.last_delivered.insert(event.channel.clone(), event.sequence);
        self.queue
            .enqueue(OutboundMessage {
                topic: event.channel.clone(),
                sequence: event.sequence,
                payload,
            })
            .map_err(|_| {
                warn!(user_id = ?self.user_id, "Outbound queue full, disconnecting client");
                SubscriptionError::SlowConsumer {
                    dropped: self.dropped(),
                }
            })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let topics: Vec<Topic> = self.streams.keys().cloned().collect();
        // Release the receivers first so the hub sees the topics as idle
        self.streams = StreamMap::new();
        for topic in &topics {
            self.hub.prune(topic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::BookFeed;
    use crate::events::StreamPayload;
    use crate::publisher::Broadcaster;
    use matching_engine::book::TopOfBook;
    use matching_engine::OrderEvent;
    use std::time::Duration;
    use types::ids::OrderId;
    use types::numeric::{Price, Quantity};
    use types::order::Side;
    use types::trade::Trade;

    fn trade(seq: u64) -> Trade {
        Trade::new(
            seq,
            Symbol::new("AAPL"),
            OrderId::new(),
            OrderId::new(),
            UserId::new(),
            UserId::new(),
            Side::BUY,
            Price::from_u64(100),
            Quantity::from_u64(1),
            seq as i64,
        )
    }

    fn json(message: Option<Result<String, SubscriptionError>>) -> serde_json::Value {
        serde_json::from_str(&message.unwrap().unwrap()).unwrap()
    }

    fn session(hub: &Arc<BroadcastHub>, user_id: Option<UserId>) -> Session {
        Session::new(hub.clone(), user_id, SessionConfig::default())
    }

    #[tokio::test]
    async fn test_receives_trades_in_order() {
        let hub = Arc::new(BroadcastHub::new(16));
        let mut session = session(&hub, None);
        session.subscribe("trades@AAPL".parse().unwrap()).unwrap();

        hub.publish_trade(&trade(1));
        hub.publish_trade(&trade(2));

        let first = json(session.recv().await);
        let second = json(session.recv().await);
        assert_eq!(first["sequence"], 1);
        assert_eq!(second["sequence"], 2);
        assert_eq!(second["payload"]["data"]["sequence"], 2);
    }

    #[tokio::test]
    async fn test_private_channel_requires_owner() {
        let hub = Arc::new(BroadcastHub::default());
        let owner = UserId::new();

        let mut anonymous = session(&hub, None);
        assert_eq!(
            anonymous.subscribe(Topic::User(owner)),
            Err(SubscriptionError::Unauthorized)
        );

        let mut other = session(&hub, Some(UserId::new()));
        assert_eq!(other.subscribe(Topic::User(owner)), Err(SubscriptionError::Unauthorized));

        let mut own = session(&hub, Some(owner));
        own.subscribe(Topic::User(owner)).unwrap();
        assert!(own.is_subscribed(&Topic::User(owner)));
    }

    #[tokio::test]
    async fn test_user_events_delivered() {
        let hub = Arc::new(BroadcastHub::default());
        let user_id = UserId::new();
        let mut session = session(&hub, Some(user_id));
        let reply = session.handle_message(r#"{"event":"exchange.stream_user_private_info"}"#);
        assert!(reply.success);

        hub.publish_user_event(
            user_id,
            OrderEvent::CancelRejected {
                order_id: OrderId::new(),
                symbol: Symbol::new("AAPL"),
                user_id,
                reason: "order not found".into(),
            },
        );
        let message = json(session.recv().await);
        assert_eq!(message["event"], "exchange.stream_user_private_info");
        assert_eq!(message["payload"]["data"]["type"], "CANCEL_REJECTED");
    }

    #[tokio::test]
    async fn test_subscription_cap() {
        let hub = Arc::new(BroadcastHub::default());
        let config = SessionConfig {
            max_subscriptions: 2,
            ..SessionConfig::default()
        };
        let mut session = Session::new(hub, None, config);
        session.subscribe("book@AAPL".parse().unwrap()).unwrap();
        session.subscribe("trades@AAPL".parse().unwrap()).unwrap();
        // Re-subscribing is a no-op, not a new slot
        session.subscribe("book@AAPL".parse().unwrap()).unwrap();
        assert_eq!(
            session.subscribe("book@MSFT".parse().unwrap()),
            Err(SubscriptionError::TooManySubscriptions { max: 2 })
        );
    }

    #[tokio::test]
    async fn test_snapshot_on_subscribe_then_updates() {
        let hub = Arc::new(BroadcastHub::new(16));
        let symbol = Symbol::new("AAPL");
        let mut feed = BookFeed::new(symbol.clone());
        hub.publish_book_update(&symbol, feed.next_update(TopOfBook::default(), Default::default(), 1));

        let mut session = session(&hub, None);
        let reply = session.handle_message(r#"{"event":"exchange.stream_info","params":{"symbol":"AAPL"}}"#);
        assert!(reply.success);
        assert_eq!(session.subscriptions().len(), 2);

        let snapshot = json(session.recv().await);
        assert_eq!(snapshot["channel"], "book@AAPL");
        assert_eq!(snapshot["sequence"], 1);

        hub.publish_book_update(&symbol, feed.next_update(TopOfBook::default(), Default::default(), 2));
        let update = json(session.recv().await);
        assert_eq!(update["sequence"], 2);
        assert_eq!(update["payload"]["data"]["version"], 2);
    }

    #[tokio::test]
    async fn test_duplicate_sequence_dropped() {
        let hub = Arc::new(BroadcastHub::new(16));
        let mut session = session(&hub, None);
        let topic: Topic = "trades@AAPL".parse().unwrap();
        session.subscribe(topic.clone()).unwrap();

        let event = hub.publish(topic, StreamPayload::Trade((&trade(1)).into())).unwrap();
        // The receiver holds the same event; only one copy may go out
        session.offer(event.clone()).unwrap();
        session.offer(event).unwrap();

        assert!(session.recv().await.is_some());
        let nothing_more = tokio::time::timeout(Duration::from_millis(20), session.recv()).await;
        assert!(nothing_more.is_err());
    }

    #[tokio::test]
    async fn test_lag_counts_as_dropped() {
        let hub = Arc::new(BroadcastHub::new(2));
        let mut session = session(&hub, None);
        session.subscribe("trades@AAPL".parse().unwrap()).unwrap();

        for seq in 1..=5 {
            hub.publish_trade(&trade(seq));
        }

        let first = json(session.recv().await);
        assert_eq!(first["sequence"], 4);
        assert_eq!(session.dropped(), 3);
    }

    #[tokio::test]
    async fn test_disconnect_policy_reports_slow_consumer() {
        let hub = Arc::new(BroadcastHub::new(16));
        let config = SessionConfig {
            queue_capacity: 1,
            drop_policy: DropPolicy::Disconnect,
            ..SessionConfig::default()
        };
        let mut session = Session::new(hub.clone(), None, config);
        let topic: Topic = "trades@AAPL".parse().unwrap();
        session.subscribe(topic.clone()).unwrap();

        let first = hub.publish(topic.clone(), StreamPayload::Trade((&trade(1)).into())).unwrap();
        let second = hub.publish(topic, StreamPayload::Trade((&trade(2)).into())).unwrap();
        session.offer(first).unwrap();
        assert!(matches!(
            session.offer(second),
            Err(SubscriptionError::SlowConsumer { .. })
        ));
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let hub = Arc::new(BroadcastHub::default());
        let mut session = session(&hub, None);

        let reply = session.handle_message("{");
        assert!(!reply.success);
        assert_eq!(reply.error_message.as_deref(), Some("The event field is an incorrect type."));

        let reply = session.handle_message(r#"{"event":"subscribe","params":{"channels":"book@AAPL"}}"#);
        assert_eq!(reply.error_message.as_deref(), Some("The params have incorrect field types."));

        let reply = session.handle_message(r#"{"event":"launch"}"#);
        assert_eq!(reply.error_message.as_deref(), Some("The event is unsupported."));

        let reply = session.handle_message(r#"{"event":"unsubscribe","params":{"channels":["book@AAPL"]}}"#);
        assert!(!reply.success);

        assert!(session.handle_message(r#"{"event":"ping"}"#).success);
        assert!(!session.is_active());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let hub = Arc::new(BroadcastHub::new(16));
        let mut session = session(&hub, None);
        let topic: Topic = "trades@AAPL".parse().unwrap();
        session.subscribe(topic.clone()).unwrap();
        hub.publish_trade(&trade(1));
        session.unsubscribe(&topic).unwrap();

        assert!(!session.is_active());
        assert!(session.recv().await.is_none());
        assert_eq!(hub.subscriber_count(&topic), 0);
        assert_eq!(hub.topic_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_session_releases_topics() {
        let hub = Arc::new(BroadcastHub::new(16));
        let user_id = UserId::new();
        let mut first = session(&hub, Some(user_id));
        let mut second = session(&hub, None);
        first.subscribe(Topic::User(user_id)).unwrap();
        first.subscribe("trades@AAPL".parse().unwrap()).unwrap();
        second.subscribe("trades@AAPL".parse().unwrap()).unwrap();
        assert_eq!(hub.topic_count(), 2);

        drop(first);
        // The trade channel still has a listener
        assert_eq!(hub.topic_count(), 1);
        assert_eq!(hub.subscriber_count(&Topic::User(user_id)), 0);

        drop(second);
        assert_eq!(hub.topic_count(), 0);
    }
}
