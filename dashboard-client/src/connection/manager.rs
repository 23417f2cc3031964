// dashboard-client/src/connection/manager.rs
//! Connection manager
//!
//! One background worker per dashboard owns the event stream, the reconnect
//! backoff, the polling fallback and the new-order highlight timers. Every
//! source is multiplexed through a single `select!`, so updates leave the
//! worker in the order they happened.

use super::SyncConfig;
use crate::api::OrderApi;
use crate::error::{ClientError, ClientResult};
use crate::sse::SseFrame;
use crate::types::{ConnectionState, SyncUpdate};
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesOrdered;
use shared::message::{self, OrderEvent};
use shared::order::Order;
use std::collections::HashMap;
use std::future::{Future, poll_fn};
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::time::{DelayQueue, delay_queue};

/// Handle to a running sync worker
///
/// Dropping the handle cancels the worker; `stop` also waits for it to exit.
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    store_id: String,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Spawn the worker and immediately connect to the store's event stream.
    ///
    /// Returns the handle and the receiving end of the ordered update channel.
    /// Must be called from within a tokio runtime.
    pub fn start(
        api: Arc<dyn OrderApi>,
        store_id: impl Into<String>,
        config: SyncConfig,
    ) -> (Self, mpsc::Receiver<SyncUpdate>) {
        let store_id = store_id.into();
        let (updates_tx, updates_rx) = mpsc::channel(config.update_buffer.max(1));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let shutdown = CancellationToken::new();

        let worker = Worker {
            api,
            store_id: store_id.clone(),
            config,
            updates: updates_tx,
            commands: commands_rx,
            state: state_tx,
            shutdown: shutdown.clone(),
            highlights: DelayQueue::new(),
            highlight_keys: HashMap::new(),
            refreshes: FuturesOrdered::new(),
            attempt: 0,
            mode: Mode::Streaming,
        };
        let task = tokio::spawn(worker.run());

        (
            Self {
                commands: commands_tx,
                state: state_rx,
                store_id,
                shutdown,
                task: Some(task),
            },
            updates_rx,
        )
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Store the manager is (or will next be) connected to
    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    /// Tear down the current connection (or retry timer, or polling) and
    /// restart against another store. Switching to the current store is a no-op.
    pub fn switch_store(&mut self, store_id: impl Into<String>) -> ClientResult<()> {
        let store_id = store_id.into();
        if store_id == self.store_id {
            return Ok(());
        }
        self.commands
            .send(Command::SwitchStore(store_id.clone()))
            .map_err(|_| ClientError::Closed)?;
        self.store_id = store_id;
        Ok(())
    }

    /// Fetch the full order list now and publish it as a snapshot.
    ///
    /// Works in every state; returns the number of orders fetched. The fetch
    /// runs beside the connection, so stream events and highlight expiries
    /// keep flowing while it is in flight, and it completes for the store that
    /// was current when it was requested.
    pub async fn refresh(&self) -> ClientResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Refresh(reply))
            .map_err(|_| ClientError::Closed)?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Close the connection, cancel pending timers and wait for the worker to exit
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(store_id = %self.store_id, "Order sync worker panicked: {e}");
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

type RefreshReply = oneshot::Sender<ClientResult<usize>>;

/// Full-list fetch requested through [`ConnectionManager::refresh`]
type RefreshFetch = BoxFuture<'static, (String, ClientResult<Vec<Order>>, RefreshReply)>;

enum Command {
    SwitchStore(String),
    Refresh(RefreshReply),
}

/// Why the current connection phase ended
enum Flow {
    Shutdown,
    /// Store changed; start over from a fresh stream
    Restart,
    Disconnected(ClientError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Streaming,
    Polling,
}

struct Worker {
    api: Arc<dyn OrderApi>,
    store_id: String,
    config: SyncConfig,
    updates: mpsc::Sender<SyncUpdate>,
    commands: mpsc::UnboundedReceiver<Command>,
    state: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
    /// (store_id, order_id) highlights waiting to expire
    highlights: DelayQueue<(String, String)>,
    highlight_keys: HashMap<(String, String), delay_queue::Key>,
    /// Manual refreshes in flight, completed in request order
    refreshes: FuturesOrdered<RefreshFetch>,
    /// Reconnects done since the last successful open
    attempt: u32,
    mode: Mode,
}

impl Worker {
    async fn run(mut self) {
        tracing::info!(store_id = %self.store_id, "Order sync started");

        loop {
            let flow = match self.mode {
                Mode::Streaming => self.stream_session().await,
                Mode::Polling => self.poll_session().await,
            };
            let flow = match flow {
                Flow::Disconnected(error) => match self.back_off(error).await {
                    Ok(()) => continue,
                    Err(flow) => flow,
                },
                flow => flow,
            };
            match flow {
                Flow::Restart => {
                    self.attempt = 0;
                    self.mode = Mode::Streaming;
                }
                _ => break,
            }
        }

        self.set_state(ConnectionState::Idle);
        tracing::info!(store_id = %self.store_id, "Order sync stopped");
    }

    /// Open the stream and forward its events until it fails or closes
    async fn stream_session(&mut self) -> Flow {
        self.set_state(ConnectionState::Connecting);

        let api = Arc::clone(&self.api);
        let store_id = self.store_id.clone();
        let open = pin!(async move { api.open_stream(&store_id).await });
        let mut stream = match self.until(open).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(error)) => return Flow::Disconnected(error),
            Err(flow) => return flow,
        };

        self.attempt = 0;
        self.set_state(ConnectionState::Connected);

        loop {
            let next = pin!(stream.next());
            let frame = match self.until(next).await {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(error))) => return Flow::Disconnected(error),
                Ok(None) => {
                    return Flow::Disconnected(ClientError::Stream(
                        "event stream closed by server".into(),
                    ));
                }
                Err(flow) => return flow,
            };
            if let Err(flow) = self.handle_frame(frame).await {
                return flow;
            }
        }
    }

    /// Replace the store's orders from the query endpoint on a fixed interval.
    ///
    /// Only a store switch or shutdown leaves this phase.
    async fn poll_session(&mut self) -> Flow {
        self.set_state(ConnectionState::DisconnectedPolling);

        let period = self.config.poll_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let tick = pin!(ticker.tick());
            if let Err(flow) = self.until(tick).await {
                return flow;
            }

            // A store switch drops the fetch before it can publish
            let api = Arc::clone(&self.api);
            let store_id = self.store_id.clone();
            let fetch = pin!(async move { api.fetch_orders(&store_id).await });
            match self.until(fetch).await {
                Ok(Ok(orders)) => {
                    tracing::debug!(
                        store_id = %self.store_id,
                        count = orders.len(),
                        "Polled order list"
                    );
                    let snapshot = SyncUpdate::Snapshot {
                        store_id: self.store_id.clone(),
                        orders,
                    };
                    if let Err(flow) = self.publish(snapshot).await {
                        return flow;
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        store_id = %self.store_id,
                        "Order poll failed, retrying on next tick: {e}"
                    );
                }
                Err(flow) => return flow,
            }
        }
    }

    /// Wait out the backoff delay, or switch to polling once retries are used up
    async fn back_off(&mut self, error: ClientError) -> Result<(), Flow> {
        if self.attempt >= self.config.max_retry_attempts {
            tracing::warn!(
                store_id = %self.store_id,
                attempt = self.attempt,
                "Event stream unavailable, falling back to periodic refresh: {error}"
            );
            self.mode = Mode::Polling;
            return Ok(());
        }

        let delay = self.config.retry_delay(self.attempt);
        self.attempt += 1;
        tracing::warn!(
            store_id = %self.store_id,
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            "Event stream disconnected, reconnecting: {error}"
        );
        self.set_state(ConnectionState::DisconnectedRetrying {
            attempt: self.attempt,
            delay,
        });

        let sleep = pin!(tokio::time::sleep(delay));
        self.until(sleep).await
    }

    /// Drive `fut` to completion while serving shutdown, commands and
    /// highlight expiries.
    async fn until<F: Future>(&mut self, mut fut: Pin<&mut F>) -> Result<F::Output, Flow> {
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => return Err(Flow::Shutdown),

                command = self.commands.recv() => match command {
                    Some(command) => {
                        if let Some(flow) = self.handle_command(command) {
                            return Err(flow);
                        }
                    }
                    // Handle dropped without cancelling
                    None => return Err(Flow::Shutdown),
                },

                Some(expired) = poll_fn(|cx| self.highlights.poll_expired(cx)),
                    if !self.highlights.is_empty() =>
                {
                    let (store_id, order_id) = expired.into_inner();
                    self.highlight_keys.remove(&(store_id.clone(), order_id.clone()));
                    self.publish(SyncUpdate::NewFlagExpired { store_id, order_id }).await?;
                }

                Some((store_id, fetched, reply)) = self.refreshes.next(),
                    if !self.refreshes.is_empty() =>
                {
                    self.finish_refresh(store_id, fetched, reply).await?;
                }

                output = fut.as_mut() => return Ok(output),
            }
        }
    }

    fn handle_command(&mut self, command: Command) -> Option<Flow> {
        match command {
            Command::SwitchStore(store_id) => {
                tracing::info!(from = %self.store_id, to = %store_id, "Switching store");
                self.store_id = store_id;
                self.set_state(ConnectionState::Idle);
                Some(Flow::Restart)
            }
            Command::Refresh(reply) => {
                let api = Arc::clone(&self.api);
                let store_id = self.store_id.clone();
                self.refreshes.push_back(Box::pin(async move {
                    let fetched = api.fetch_orders(&store_id).await;
                    (store_id, fetched, reply)
                }));
                None
            }
        }
    }

    async fn handle_frame(&mut self, frame: SseFrame) -> Result<(), Flow> {
        let event = match message::decode(frame.event.as_deref(), &frame.data) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    store_id = %self.store_id,
                    event_id = ?frame.id,
                    "Dropping undecodable order event: {e}"
                );
                return Ok(());
            }
        };

        if let OrderEvent::OrderCreated { order } = &event {
            self.highlight(order.order_id.clone());
        }
        tracing::debug!(
            store_id = %self.store_id,
            event_id = ?frame.id,
            kind = event.kind(),
            "Order event received"
        );

        self.publish(SyncUpdate::Event {
            store_id: self.store_id.clone(),
            event,
        })
        .await
    }

    /// Schedule the is-new expiry of a created order (re-created orders restart it)
    fn highlight(&mut self, order_id: String) {
        let ttl = self.config.new_order_highlight;
        let entry = (self.store_id.clone(), order_id);
        match self.highlight_keys.get(&entry) {
            Some(key) => self.highlights.reset(key, ttl),
            None => {
                let key = self.highlights.insert(entry.clone(), ttl);
                self.highlight_keys.insert(entry, key);
            }
        }
    }

    /// Publish a finished refresh under the store it was requested for
    async fn finish_refresh(
        &mut self,
        store_id: String,
        fetched: ClientResult<Vec<Order>>,
        reply: RefreshReply,
    ) -> Result<(), Flow> {
        let result = match fetched {
            Ok(orders) => {
                let count = orders.len();
                self.publish(SyncUpdate::Snapshot { store_id, orders }).await?;
                Ok(count)
            }
            Err(e) => {
                tracing::warn!(store_id = %store_id, "Order refresh failed: {e}");
                Err(e)
            }
        };
        // Caller may have given up waiting
        let _ = reply.send(result);
        Ok(())
    }

    async fn publish(&mut self, update: SyncUpdate) -> Result<(), Flow> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(Flow::Shutdown),
            sent = self.updates.send(update) => sent.map_err(|_| {
                tracing::debug!(
                    store_id = %self.store_id,
                    "Update receiver dropped, stopping order sync"
                );
                self.shutdown.cancel();
                Flow::Shutdown
            }),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::info!(store_id = %self.store_id, %state, "Connection state changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DeletedOrder, StatusChange};
    use crate::sse::FrameStream;
    use async_trait::async_trait;
    use futures::channel::mpsc as stream_channel;
    use shared::order::{Order, OrderStatus};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::{Instant, sleep};

    enum Open {
        Fail,
        Stream(stream_channel::UnboundedReceiver<String>),
    }

    /// Order API whose stream opens follow a script; opens past the end fail
    #[derive(Default)]
    struct ScriptedApi {
        script: Mutex<VecDeque<Open>>,
        opens: Mutex<Vec<(String, Instant)>>,
        fetches: Mutex<Vec<Instant>>,
        orders: Mutex<Vec<Order>>,
        /// How long each list fetch takes to answer
        fetch_delay: Duration,
    }

    impl ScriptedApi {
        fn with_script(script: Vec<Open>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            })
        }

        fn with_slow_fetch(script: Vec<Open>, fetch_delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fetch_delay,
                ..Default::default()
            })
        }

        fn open_offsets(&self, start: Instant) -> Vec<u64> {
            self.opens
                .lock()
                .unwrap()
                .iter()
                .map(|(_, at)| whole_secs(*at - start))
                .collect()
        }

        fn opened_stores(&self) -> Vec<String> {
            self.opens
                .lock()
                .unwrap()
                .iter()
                .map(|(store, _)| store.clone())
                .collect()
        }

        fn fetch_offsets(&self, start: Instant) -> Vec<u64> {
            self.fetches
                .lock()
                .unwrap()
                .iter()
                .map(|at| whole_secs(*at - start))
                .collect()
        }
    }

    #[async_trait]
    impl OrderApi for ScriptedApi {
        async fn open_stream(&self, store_id: &str) -> ClientResult<FrameStream> {
            self.opens
                .lock()
                .unwrap()
                .push((store_id.to_string(), Instant::now()));
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Open::Stream(rx)) => Ok(rx
                    .map(|data| {
                        Ok::<_, ClientError>(SseFrame {
                            data,
                            ..Default::default()
                        })
                    })
                    .boxed()),
                Some(Open::Fail) | None => Err(ClientError::Stream("connection refused".into())),
            }
        }

        async fn fetch_orders(&self, _store_id: &str) -> ClientResult<Vec<Order>> {
            self.fetches.lock().unwrap().push(Instant::now());
            if !self.fetch_delay.is_zero() {
                sleep(self.fetch_delay).await;
            }
            Ok(self.orders.lock().unwrap().clone())
        }

        async fn update_status(
            &self,
            order_id: &str,
            status: OrderStatus,
        ) -> ClientResult<StatusChange> {
            Ok(StatusChange {
                order_id: order_id.to_string(),
                status,
            })
        }

        async fn delete_order(&self, order_id: &str) -> ClientResult<DeletedOrder> {
            Err(ClientError::NotFound(order_id.to_string()))
        }
    }

    fn whole_secs(elapsed: Duration) -> u64 {
        (elapsed.as_millis() as u64 + 500) / 1000
    }

    fn live_stream() -> (stream_channel::UnboundedSender<String>, Open) {
        let (tx, rx) = stream_channel::unbounded();
        (tx, Open::Stream(rx))
    }

    fn created(order_id: &str, table: u32) -> String {
        serde_json::json!({
            "type": "order_created",
            "order": {
                "orderId": order_id,
                "tableId": table.to_string(),
                "tableNumber": table,
                "totalAmount": 6500,
                "status": "pending",
                "orderTime": "2025-03-01T12:00:00Z",
                "items": []
            }
        })
        .to_string()
    }

    fn updated(order_id: &str, status: &str) -> String {
        serde_json::json!({"type": "order_updated", "orderId": order_id, "status": status})
            .to_string()
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_then_polling_fallback() {
        let api = ScriptedApi::with_script(Vec::new());
        let start = Instant::now();
        let (manager, _updates) =
            ConnectionManager::start(api.clone(), "store-1", SyncConfig::default());

        sleep(Duration::from_millis(500)).await;
        assert_eq!(
            manager.state(),
            ConnectionState::DisconnectedRetrying {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
        );

        sleep(Duration::from_millis(59_500)).await;
        assert_eq!(api.open_offsets(start), vec![0, 1, 3, 7, 15, 31]);
        assert_eq!(manager.state(), ConnectionState::DisconnectedPolling);
        // First poll on entry, then every 10 s
        assert_eq!(api.fetch_offsets(start), vec![31, 41, 51]);

        // Polling never hands back to streaming on its own
        sleep(Duration::from_secs(120)).await;
        assert_eq!(api.opens.lock().unwrap().len(), 6);
        assert!(manager.state().is_polling());

        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_open_resets_backoff() {
        let (tx, open) = live_stream();
        let api = ScriptedApi::with_script(vec![Open::Fail, open]);
        let start = Instant::now();
        let (manager, _updates) =
            ConnectionManager::start(api.clone(), "store-1", SyncConfig::default());

        sleep(Duration::from_secs(5)).await;
        assert_eq!(manager.state(), ConnectionState::Connected);

        drop(tx);
        sleep(Duration::from_millis(500)).await;
        assert_eq!(
            manager.state(),
            ConnectionState::DisconnectedRetrying {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
        );

        sleep(Duration::from_secs(1)).await;
        assert_eq!(api.open_offsets(start), vec![0, 1, 6]);

        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_frame_is_dropped_and_connection_kept() {
        let (tx, open) = live_stream();
        let api = ScriptedApi::with_script(vec![open]);
        let (manager, mut updates) =
            ConnectionManager::start(api.clone(), "store-1", SyncConfig::default());

        tx.unbounded_send("not json".into()).unwrap();
        tx.unbounded_send(r#"{"type":"table_moved","tableId":"3"}"#.into())
            .unwrap();
        tx.unbounded_send(created("7", 3)).unwrap();

        let update = updates.recv().await.unwrap();
        match update {
            SyncUpdate::Event {
                store_id,
                event: OrderEvent::OrderCreated { order },
            } => {
                assert_eq!(store_id, "store-1");
                assert_eq!(order.order_id, "7");
            }
            other => panic!("unexpected update: {other:?}"),
        }
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(api.opens.lock().unwrap().len(), 1);

        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_order_highlight_expires_after_three_seconds() {
        let (tx, open) = live_stream();
        let api = ScriptedApi::with_script(vec![open]);
        let (manager, mut updates) =
            ConnectionManager::start(api, "store-1", SyncConfig::default());

        let created_at = Instant::now();
        tx.unbounded_send(created("7", 3)).unwrap();
        assert!(matches!(
            updates.recv().await,
            Some(SyncUpdate::Event { event: OrderEvent::OrderCreated { .. }, .. })
        ));

        // An unrelated update one second later does not restart the timer
        sleep(Duration::from_secs(1)).await;
        tx.unbounded_send(updated("7", "preparing")).unwrap();
        assert!(matches!(
            updates.recv().await,
            Some(SyncUpdate::Event { event: OrderEvent::OrderUpdated { .. }, .. })
        ));

        let expired = updates.recv().await.unwrap();
        assert_eq!(
            expired,
            SyncUpdate::NewFlagExpired {
                store_id: "store-1".into(),
                order_id: "7".into(),
            }
        );
        let elapsed = Instant::now().duration_since(created_at).as_millis();
        assert!((3000..=3001).contains(&elapsed), "expired after {elapsed}ms");

        // Exactly once
        sleep(Duration::from_secs(10)).await;
        assert!(updates.try_recv().is_err());

        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_store_tears_down_old_stream() {
        let (tx_a, open_a) = live_stream();
        let (tx_b, open_b) = live_stream();
        let api = ScriptedApi::with_script(vec![open_a, open_b]);
        let (mut manager, mut updates) =
            ConnectionManager::start(api.clone(), "store-a", SyncConfig::default());

        sleep(Duration::from_millis(10)).await;
        assert!(manager.state().is_connected());

        manager.switch_store("store-b").unwrap();
        assert_eq!(manager.store_id(), "store-b");
        sleep(Duration::from_millis(10)).await;

        assert!(tx_a.is_closed());
        assert!(!tx_b.is_closed());
        assert_eq!(api.opened_stores(), vec!["store-a", "store-b"]);
        assert_eq!(manager.state(), ConnectionState::Connected);

        tx_b.unbounded_send(created("1", 2)).unwrap();
        assert_eq!(updates.recv().await.unwrap().store_id(), "store-b");

        // Same store again is a no-op
        manager.switch_store("store-b").unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(api.opens.lock().unwrap().len(), 2);

        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_store_leaves_polling_and_cancels_retry() {
        let api = ScriptedApi::with_script(Vec::new());
        let (mut manager, _updates) = ConnectionManager::start(
            api.clone(),
            "store-a",
            SyncConfig::default().with_max_retry_attempts(0),
        );

        sleep(Duration::from_millis(10)).await;
        assert!(manager.state().is_polling());

        manager.switch_store("store-b").unwrap();
        sleep(Duration::from_millis(500)).await;

        // Fresh stream attempt for the new store, not another poll of the old one
        assert_eq!(api.opened_stores(), vec!["store-a", "store-b"]);
        assert!(manager.state().is_polling());
        assert_eq!(api.fetches.lock().unwrap().len(), 2);

        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_retry() {
        let api = ScriptedApi::with_script(Vec::new());
        let (manager, mut updates) =
            ConnectionManager::start(api.clone(), "store-1", SyncConfig::default());
        let mut state = manager.subscribe_state();

        sleep(Duration::from_millis(500)).await;
        assert!(manager.state().is_retrying());

        manager.stop().await;
        assert_eq!(*state.borrow_and_update(), ConnectionState::Idle);
        assert!(updates.recv().await.is_none());

        sleep(Duration::from_secs(60)).await;
        assert_eq!(api.opens.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_worker() {
        let (tx, open) = live_stream();
        let api = ScriptedApi::with_script(vec![open]);
        let (manager, mut updates) =
            ConnectionManager::start(api, "store-1", SyncConfig::default());

        sleep(Duration::from_millis(10)).await;
        drop(manager);

        assert!(updates.recv().await.is_none());
        assert!(tx.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_publishes_snapshot_while_streaming() {
        let (_tx, open) = live_stream();
        let api = ScriptedApi::with_script(vec![open]);
        *api.orders.lock().unwrap() = vec![
            serde_json::from_str::<OrderEvent>(&created("1", 3))
                .map(|event| match event {
                    OrderEvent::OrderCreated { order } => order,
                    _ => unreachable!(),
                })
                .unwrap(),
        ];
        let (manager, mut updates) =
            ConnectionManager::start(api.clone(), "store-1", SyncConfig::default());
        sleep(Duration::from_millis(10)).await;

        assert_eq!(manager.refresh().await.unwrap(), 1);
        match updates.recv().await.unwrap() {
            SyncUpdate::Snapshot { store_id, orders } => {
                assert_eq!(store_id, "store-1");
                assert_eq!(orders.len(), 1);
            }
            other => panic!("unexpected update: {other:?}"),
        }
        assert!(manager.state().is_connected());

        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_highlights_expire_per_order() {
        let (tx, open) = live_stream();
        let api = ScriptedApi::with_script(vec![open]);
        let (manager, mut updates) =
            ConnectionManager::start(api, "store-1", SyncConfig::default());
        let start = Instant::now();

        tx.unbounded_send(created("7", 3)).unwrap();
        sleep(Duration::from_millis(1500)).await;
        tx.unbounded_send(created("8", 4)).unwrap();
        sleep(Duration::from_millis(500)).await;
        tx.unbounded_send(updated("8", "preparing")).unwrap();

        let mut expired = Vec::new();
        let deadline = tokio::time::sleep(Duration::from_secs(10));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                update = updates.recv() => match update {
                    Some(SyncUpdate::NewFlagExpired { order_id, .. }) => {
                        expired.push((order_id, (Instant::now() - start).as_millis()));
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }

        assert_eq!(expired.len(), 2, "expiries: {expired:?}");
        assert_eq!(expired[0].0, "7");
        assert!((3000..=3001).contains(&expired[0].1), "7 expired at {}ms", expired[0].1);
        assert_eq!(expired[1].0, "8");
        assert!((4500..=4501).contains(&expired[1].1), "8 expired at {}ms", expired[1].1);

        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_store_abandons_slow_poll() {
        let api = ScriptedApi::with_slow_fetch(Vec::new(), Duration::from_secs(25));
        let start = Instant::now();
        let (mut manager, mut updates) = ConnectionManager::start(
            api.clone(),
            "a",
            SyncConfig::default().with_max_retry_attempts(0),
        );

        sleep(Duration::from_secs(1)).await;
        assert!(manager.state().is_polling());
        manager.switch_store("b").unwrap();
        sleep(Duration::from_millis(10)).await;

        // The new store's stream is tried right away, not after the old fetch
        assert_eq!(api.opened_stores(), vec!["a", "b"]);
        assert_eq!(api.open_offsets(start), vec![0, 1]);
        assert!(updates.try_recv().is_err());

        // Only the new store's poll ever publishes
        sleep(Duration::from_secs(29)).await;
        let mut snapshots = Vec::new();
        while let Ok(update) = updates.try_recv() {
            snapshots.push(update.store_id().to_string());
        }
        assert_eq!(snapshots, vec!["b"]);

        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_refresh_does_not_hold_back_highlight_expiry() {
        let (tx, open) = live_stream();
        let api = ScriptedApi::with_slow_fetch(vec![open], Duration::from_secs(5));
        let (manager, mut updates) =
            ConnectionManager::start(api.clone(), "store-1", SyncConfig::default());
        let start = Instant::now();

        tx.unbounded_send(created("7", 3)).unwrap();
        let (refreshed, expired_after) = tokio::join!(manager.refresh(), async {
            let mut expired_after = None;
            while let Some(update) = updates.recv().await {
                match update {
                    SyncUpdate::NewFlagExpired { .. } => {
                        expired_after = Some((Instant::now() - start).as_millis());
                    }
                    SyncUpdate::Snapshot { .. } => break,
                    SyncUpdate::Event { .. } => {}
                }
            }
            expired_after
        });

        assert_eq!(refreshed.unwrap(), 0);
        let expired_after = expired_after.unwrap();
        assert!((3000..=3001).contains(&expired_after), "expired after {expired_after}ms");
        assert!(manager.state().is_connected());

        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_keeps_store_it_was_requested_for() {
        let (_tx_a, open_a) = live_stream();
        let (_tx_b, open_b) = live_stream();
        let api = ScriptedApi::with_slow_fetch(vec![open_a, open_b], Duration::from_secs(2));
        let (mut manager, mut updates) =
            ConnectionManager::start(api.clone(), "store-a", SyncConfig::default());
        sleep(Duration::from_millis(10)).await;

        let (refreshed, _) = tokio::join!(manager.refresh(), async {
            sleep(Duration::from_millis(500)).await;
        });
        assert_eq!(refreshed.unwrap(), 0);
        assert_eq!(updates.recv().await.unwrap().store_id(), "store-a");

        let (tx, rx) = oneshot::channel();
        manager.commands.send(Command::Refresh(tx)).unwrap();
        manager.switch_store("store-b").unwrap();

        assert_eq!(rx.await.unwrap().unwrap(), 0);
        assert_eq!(updates.recv().await.unwrap().store_id(), "store-a");
        assert_eq!(api.opened_stores(), vec!["store-a", "store-b"]);

        manager.stop().await;
    }
}
