//! One event stream per network: connect, subscribe, dispatch, reconnect.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use stream::{
    parse_frame, Frame, FrameReader, ReconnectDecision, ReconnectionController, StreamConnection,
    Subscription,
};
use chain::TransactionEvent;
use sync::{BlockHeightTracker, CheckpointLifecycleEngine, EventDispatchRegistry};
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Websocket endpoints of one network.
#[derive(Debug, Clone)]
pub struct NetworkStream {
    pub name: String,
    /// Primary first; a failed connect moves on to the next.
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
}

struct NetworkHandle {
    stream: NetworkStream,
    conn: StreamConnection,
    controller: ReconnectionController,
    trigger: Notify,
    /// Events read off the socket, drained in order by the dispatch task.
    events: mpsc::UnboundedSender<TransactionEvent>,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<TransactionEvent>>>,
}

pub struct StreamOrchestrator {
    networks: HashMap<String, Arc<NetworkHandle>>,
    subscriptions: Vec<Subscription>,
    dispatch: Arc<EventDispatchRegistry>,
    tracker: Arc<BlockHeightTracker>,
    checkpoints: Option<Arc<CheckpointLifecycleEngine>>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StreamOrchestrator {
    pub fn new(
        networks: Vec<NetworkStream>,
        subscriptions: Vec<Subscription>,
        dispatch: Arc<EventDispatchRegistry>,
        tracker: Arc<BlockHeightTracker>,
        checkpoints: Option<Arc<CheckpointLifecycleEngine>>,
        config: OrchestratorConfig,
    ) -> Self {
        let networks = networks
            .into_iter()
            .filter(|stream| {
                if stream.urls.is_empty() {
                    error!(network = %stream.name, "no stream urls configured, network skipped");
                }
                !stream.urls.is_empty()
            })
            .map(|stream| {
                let (events, inbox) = mpsc::unbounded_channel();
                let handle = NetworkHandle {
                    conn: StreamConnection::new(&stream.name),
                    controller: ReconnectionController::new(
                        config.max_reconnect_attempts,
                        config.reconnect_interval,
                    ),
                    trigger: Notify::new(),
                    events,
                    inbox: Mutex::new(Some(inbox)),
                    stream,
                };
                (handle.stream.name.clone(), Arc::new(handle))
            })
            .collect();
        let (shutdown, _) = watch::channel(false);
        Self {
            networks,
            subscriptions,
            dispatch,
            tracker,
            checkpoints,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the stream loop and the dispatch task of every network.
    pub async fn start_listening(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;
        for handle in self.networks.values() {
            if let Some(inbox) = handle.inbox.lock().await.take() {
                let this = Arc::clone(self);
                let network = handle.stream.name.clone();
                let shutdown = self.shutdown.subscribe();
                tasks.push(tokio::spawn(async move {
                    this.dispatch_events(&network, inbox, shutdown).await
                }));
            }
            let this = Arc::clone(self);
            let handle = Arc::clone(handle);
            tasks.push(tokio::spawn(async move { this.run_network(handle).await }));
        }
        info!(networks = self.networks.len(), "stream orchestrator started");
    }

    /// Close every connection and wait for the stream loops to exit.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        for handle in self.networks.values() {
            if let Err(e) = handle.conn.disconnect().await {
                debug!(network = %handle.stream.name, err = %e, "error closing stream");
            }
        }
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        info!("stream orchestrator stopped");
    }

    /// Restart `network`'s connect cycle after its retry budget ran out.
    /// Returns false for an unknown network.
    pub fn trigger_reconnect(&self, network: &str) -> bool {
        match self.networks.get(network) {
            Some(handle) => {
                handle.trigger.notify_one();
                true
            }
            None => false,
        }
    }

    pub fn is_connected(&self, network: &str) -> bool {
        self.networks
            .get(network)
            .is_some_and(|h| h.conn.is_connected())
    }

    async fn run_network(&self, handle: Arc<NetworkHandle>) {
        let network = handle.stream.name.as_str();
        let mut shutdown = self.shutdown.subscribe();
        let mut url_index = 0usize;

        loop {
            if *shutdown.borrow() {
                break;
            }
            let url = &handle.stream.urls[url_index % handle.stream.urls.len()];
            match handle.conn.connect(url).await {
                Ok(reader) => {
                    self.on_open(&handle).await;
                    let stopped = self
                        .read_frames(&handle, reader, &mut shutdown)
                        .await;
                    handle.conn.mark_closed();
                    if stopped {
                        break;
                    }
                    self.tracker.mark_disconnected(network);
                    warn!(network, url, "stream closed");
                }
                Err(e) => {
                    self.tracker.mark_disconnected(network);
                    warn!(network, url, err = %e, "stream connect failed");
                    url_index += 1;
                }
            }

            match handle.controller.on_close() {
                ReconnectDecision::Retry { attempt, delay } => {
                    info!(network, attempt, "reconnecting");
                    match self.tracker.handle_reconnection(network).await {
                        Ok(range) => {
                            if let Some(r) = range {
                                info!(network, from = r.from, to = r.to, processed = r.processed, "reconciled while disconnected");
                            }
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = shutdown.changed() => break,
                            }
                        }
                        Err(e) => {
                            warn!(network, attempt, err = %e, "reconciliation failed, reconnecting now");
                        }
                    }
                }
                ReconnectDecision::GiveUp { attempts } => {
                    error!(
                        network,
                        attempts, "stream reconnection budget exhausted, ingestion paused"
                    );
                    tokio::select! {
                        _ = handle.trigger.notified() => {
                            info!(network, "external reconnect triggered");
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }
        debug!(network, "stream loop exited");
    }

    async fn on_open(&self, handle: &NetworkHandle) {
        let network = handle.stream.name.clone();
        handle.controller.on_open();
        self.tracker.mark_connected(&network);

        let tracker = Arc::clone(&self.tracker);
        let checkpoints = self.checkpoints.clone();
        tokio::spawn(async move {
            match tracker.handle_reconnection(&network).await {
                Ok(Some(r)) => info!(network = %network, from = r.from, to = r.to, processed = r.processed, "caught up on open"),
                Ok(None) => {}
                Err(e) => warn!(network = %network, err = %e, "catch-up on open failed"),
            }
            if let Some(engine) = checkpoints {
                if let Err(e) = engine.sync_historical_checkpoints(&network).await {
                    warn!(network = %network, err = %e, "historical checkpoint sync failed");
                }
            }
        });

        if let Err(e) = handle.conn.subscribe(&self.subscriptions).await {
            warn!(network = %handle.stream.name, err = %e, "subscribe failed");
        }
    }

    /// Queue frames in arrival order until the stream ends. Returns true if
    /// it ended because of shutdown.
    async fn read_frames(
        &self,
        handle: &NetworkHandle,
        mut reader: FrameReader,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let network = handle.stream.name.as_str();
        loop {
            let next = tokio::select! {
                next = reader.next_text() => next,
                _ = shutdown.changed() => return true,
            };
            match next {
                Some(Ok(text)) => Self::handle_frame(handle, &text),
                Some(Err(e)) => {
                    warn!(network, err = %e, "stream read error");
                    return false;
                }
                None => return false,
            }
        }
    }

    fn handle_frame(handle: &NetworkHandle, text: &str) {
        let network = handle.stream.name.as_str();
        match parse_frame(network, text) {
            Ok(Frame::Event(event)) => {
                if handle.events.send(*event).is_err() {
                    debug!(network, "dispatch task gone, dropping event");
                }
            }
            Ok(Frame::Ack { id }) => debug!(network, id = %id, "subscription acknowledged"),
            Ok(Frame::Error { id, message }) => {
                warn!(network, id = %id, message = %message, "stream returned error")
            }
            Err(e) => warn!(network, err = %e, "dropping unparsable frame"),
        }
    }

    /// Dispatch queued events one at a time, in the order they were read.
    /// The queue outlives individual connections.
    async fn dispatch_events(
        &self,
        network: &str,
        mut inbox: mpsc::UnboundedReceiver<TransactionEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        if *shutdown.borrow() {
            return;
        }
        loop {
            let event = tokio::select! {
                event = inbox.recv() => event,
                _ = shutdown.changed() => break,
            };
            let Some(event) = event else { break };
            tokio::select! {
                _ = self.dispatch.dispatch(&event) => {}
                _ = shutdown.changed() => break,
            }
        }
        debug!(network, "dispatch task exited");
    }
}
