// src/channel.rs - Best-effort broadcast transports
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::pose::PosePayload;
use crate::wire::WireMessage;

/// Called once per inbound message, on the session's runtime.
pub type MessageHandler = Box<dyn FnMut(WireMessage) + Send + 'static>;

/// One shared topic. Publishing never blocks and is never acknowledged.
pub trait BroadcastChannel {
    fn publish(&self, payload: &PosePayload);

    /// Registers the inbound handler. Must run inside a tokio runtime.
    fn subscribe(&self, handler: MessageHandler) -> Result<(), TransportError>;
}

fn encode(payload: &PosePayload) -> Option<String> {
    match WireMessage::from_payload(payload).to_json() {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(error = %e, "failed to encode pose payload");
            None
        }
    }
}

fn decode(text: &str) -> Option<WireMessage> {
    match WireMessage::from_json(text) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(error = %e, "dropping undecodable broadcast");
            None
        }
    }
}

/// In-process relay. Every joined channel sees every message, including its own.
#[derive(Clone)]
pub struct LoopbackHub {
    sender: broadcast::Sender<String>,
}

impl LoopbackHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn join(&self) -> LoopbackChannel {
        LoopbackChannel {
            sender: self.sender.clone(),
        }
    }

    /// Pushes raw text onto the topic, bypassing the encoder.
    pub fn inject_raw(&self, text: impl Into<String>) {
        let _ = self.sender.send(text.into());
    }
}

pub struct LoopbackChannel {
    sender: broadcast::Sender<String>,
}

impl BroadcastChannel for LoopbackChannel {
    fn publish(&self, payload: &PosePayload) {
        if let Some(text) = encode(payload) {
            // No subscribers means nobody is listening; the message is simply lost.
            let _ = self.sender.send(text);
        }
    }

    fn subscribe(&self, mut handler: MessageHandler) -> Result<(), TransportError> {
        let mut receiver = self.sender.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(text) => {
                        if let Some(message) = decode(&text) {
                            handler(message);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "loopback subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(())
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Messages waiting for the relay writer before new publishes are dropped.
pub const OUTBOUND_CAPACITY: usize = 32;

/// Text-frame WebSocket relay client: one JSON object per frame.
pub struct WebSocketChannel {
    url: String,
    outbound: mpsc::Sender<String>,
    inbound: Mutex<Option<SplitStream<WsStream>>>,
    dropped: AtomicU64,
}

impl WebSocketChannel {
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        Self::connect_with_capacity(url, OUTBOUND_CAPACITY).await
    }

    /// Connects with at most `capacity` unsent messages queued for the relay.
    pub async fn connect_with_capacity(url: &str, capacity: usize) -> Result<Self, TransportError> {
        let (stream, _response) =
            tokio_tungstenite::connect_async(url)
                .await
                .map_err(|source| TransportError::Connect {
                    url: url.to_string(),
                    source,
                })?;
        info!(url, "connected to broadcast relay");

        let (mut sink, source) = stream.split();
        let (outbound, mut queue) = mpsc::channel::<String>(capacity.max(1));

        let writer_url = url.to_string();
        tokio::spawn(async move {
            while let Some(text) = queue.recv().await {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    warn!(url = %writer_url, error = %e, "relay send failed; further publishes are dropped");
                    break;
                }
            }
        });

        Ok(Self {
            url: url.to_string(),
            outbound,
            inbound: Mutex::new(Some(source)),
            dropped: AtomicU64::new(0),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Messages queued but not yet handed to the socket.
    pub fn pending(&self) -> usize {
        self.outbound.max_capacity() - self.outbound.capacity()
    }

    /// Publishes discarded because the relay was not keeping up.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl BroadcastChannel for WebSocketChannel {
    fn publish(&self, payload: &PosePayload) {
        let Some(text) = encode(payload) else {
            return;
        };
        match self.outbound.try_send(text) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(url = %self.url, dropped, "relay backlog full; pose dropped");
            }
            // Writer is gone after a send failure; it already logged.
            Err(TrySendError::Closed(_)) => {}
        }
    }

    fn subscribe(&self, mut handler: MessageHandler) -> Result<(), TransportError> {
        let mut source = self
            .inbound
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .ok_or(TransportError::AlreadySubscribed)?;

        let url = self.url.clone();
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if let Some(message) = decode(text.as_str()) {
                            handler(message);
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(url = %url, error = %e, "relay receive failed");
                        break;
                    }
                }
            }
            info!(url = %url, "broadcast relay closed");
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PeerIdentity;
    use crate::pose::Skeleton;
    use nalgebra::Vector3;
    use std::sync::Arc;

    fn payload(id: &str) -> PosePayload {
        let skeleton = Skeleton::new(std::array::from_fn(|i| Vector3::new(i as f64, 1.0, 2.0)));
        PosePayload::new(PeerIdentity::new(id), vec![skeleton])
    }

    fn collector() -> (MessageHandler, Arc<Mutex<Vec<WireMessage>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: MessageHandler = Box::new(move |message| sink.lock().unwrap().push(message));
        (handler, seen)
    }

    #[tokio::test]
    async fn loopback_delivers_to_every_subscriber_including_sender() {
        let hub = LoopbackHub::new(16);
        let alice = hub.join();
        let bob = hub.join();

        let (alice_handler, alice_seen) = collector();
        let (bob_handler, bob_seen) = collector();
        alice.subscribe(alice_handler).unwrap();
        bob.subscribe(bob_handler).unwrap();

        alice.publish(&payload("#aa0000"));
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(alice_seen.lock().unwrap().len(), 1);
        let bob_seen = bob_seen.lock().unwrap();
        assert_eq!(bob_seen.len(), 1);
        assert_eq!(bob_seen[0].user.as_str(), "#aa0000");
        assert_eq!(bob_seen[0].predictions[0].landmarks.len(), 21);
    }

    #[tokio::test]
    async fn loopback_drops_undecodable_text() {
        let hub = LoopbackHub::new(16);
        let channel = hub.join();
        let (handler, seen) = collector();
        channel.subscribe(handler).unwrap();

        hub.inject_raw("{ nope");
        channel.publish(&payload("#00ff00"));
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].user.as_str(), "#00ff00");
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let hub = LoopbackHub::new(4);
        hub.join().publish(&payload("#0000ff"));
    }

    #[tokio::test]
    async fn connect_to_closed_port_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = format!("ws://127.0.0.1:{port}/messages");
        let err = WebSocketChannel::connect(&url).await.err().unwrap();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[tokio::test]
    async fn stalled_relay_keeps_backlog_bounded() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Completes the handshake, then holds the socket without reading.
        let relay = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            std::future::pending::<()>().await;
            drop(ws);
        });

        let url = format!("ws://127.0.0.1:{port}/messages");
        let channel = WebSocketChannel::connect_with_capacity(&url, 8).await.unwrap();

        let hand = payload("#aa0000");
        for _ in 0..5_000 {
            channel.publish(&hand);
        }

        assert!(channel.pending() <= 8);
        assert!(channel.dropped() >= 5_000 - 8);

        // The writer drains into the socket buffer; publishing stays bounded.
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        for _ in 0..5_000 {
            channel.publish(&hand);
        }
        assert!(channel.pending() <= 8);

        relay.abort();
    }
}
