//! Websocket connection to a node's event stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info};

use crate::error::StreamError;
use crate::subscription::Subscription;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Timeout for the websocket handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Write half of one network's stream. The read half is handed to the
/// caller as a [`FrameReader`] on every successful connect.
pub struct StreamConnection {
    network: String,
    writer: Mutex<Option<SplitSink<WsStream, Message>>>,
    connected: AtomicBool,
}

impl StreamConnection {
    pub fn new(network: &str) -> Self {
        Self {
            network: network.to_string(),
            writer: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    /// Open a websocket to `url`, replacing any previous connection.
    pub async fn connect(&self, url: &str) -> Result<FrameReader, StreamError> {
        let (ws, _resp) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| StreamError::ConnectTimeout(url.to_string()))??;
        let (sink, stream) = ws.split();

        let mut writer = self.writer.lock().await;
        if let Some(mut old) = writer.replace(sink) {
            if let Err(e) = old.close().await {
                debug!(network = %self.network, err = %e, "error closing previous stream");
            }
        }
        self.connected.store(true, Ordering::SeqCst);
        info!(network = %self.network, url, "stream connected");

        Ok(FrameReader { inner: stream })
    }

    pub async fn send(&self, message: &Value) -> Result<(), StreamError> {
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(StreamError::NotConnected)?;
        sink.send(Message::Text(message.to_string().into())).await?;
        Ok(())
    }

    /// Send a subscribe request for each of `subscriptions`.
    pub async fn subscribe(&self, subscriptions: &[Subscription]) -> Result<(), StreamError> {
        for sub in subscriptions {
            self.send(&sub.subscribe_request()).await?;
            debug!(network = %self.network, id = %sub.id, query = %sub.query, "subscribed");
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Record that the read side ended.
    pub fn mark_closed(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub async fn disconnect(&self) -> Result<(), StreamError> {
        self.connected.store(false, Ordering::SeqCst);
        let mut writer = self.writer.lock().await;
        if let Some(mut sink) = writer.take() {
            sink.close().await?;
        }
        Ok(())
    }
}

/// Read half of a connection.
pub struct FrameReader {
    inner: SplitStream<WsStream>,
}

impl FrameReader {
    /// Next text frame. `None` once the peer closed the connection.
    pub async fn next_text(&mut self) -> Option<Result<String, StreamError>> {
        while let Some(msg) = self.inner.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_string())),
                Ok(Message::Close(_)) => return None,
                Ok(_) => {} // pings are answered by tungstenite
                Err(e) => return Some(Err(e.into())),
            }
        }
        None
    }
}
