// src/telemetry/transport.rs
//
// WebSocket transport to a sensor bridge, decoupled from the session state
// machine: the socket callbacks become typed events on a channel and the
// session consumes them at its own pace.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::error::CoreError;

/// What the transport reports upward.
#[derive(Clone, Debug)]
pub enum TransportEvent {
    /// The connection is established and frames may flow
    Opened,
    /// One inbound text frame
    Frame(String),
    /// The peer closed the connection
    Closed,
    /// The connection failed mid-session
    Error(String),
}

/// A live connection: frames pushed into `outbound` go to the bridge,
/// everything the bridge does arrives on `events`.
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
pub trait BridgeTransport: Send + Sync {
    async fn open(&self, url: &str) -> Result<TransportLink, CoreError>;
}

/// Transport over tokio-tungstenite.
pub struct WsBridgeTransport;

#[async_trait]
impl BridgeTransport for WsBridgeTransport {
    async fn open(&self, url: &str) -> Result<TransportLink, CoreError> {
        let target = format!("bridge({})", url);

        let (socket, _response) = connect_async(url)
            .await
            .map_err(|e| CoreError::connection(&target, format!("Connect failed: {}", e)))?;

        let (mut sink, mut stream) = socket.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (evt_tx, evt_rx) = mpsc::unbounded_channel();

        let _ = evt_tx.send(TransportEvent::Opened);

        // Outbound pump: ends when the session drops its sender
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Inbound pump: socket frames become transport events
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(Message::Text(text)) => {
                        if evt_tx.send(TransportEvent::Frame(text.to_string())).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        let _ = evt_tx.send(TransportEvent::Closed);
                        return;
                    }
                    // Pings are answered by the library; binary frames are
                    // not part of the bridge protocol
                    Ok(_) => {}
                    Err(e) => {
                        let _ = evt_tx.send(TransportEvent::Error(e.to_string()));
                        return;
                    }
                }
            }
            let _ = evt_tx.send(TransportEvent::Closed);
        });

        Ok(TransportLink {
            outbound: out_tx,
            events: evt_rx,
        })
    }
}
