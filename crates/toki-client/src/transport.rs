//! Contract with the event-channel transport.
//!
//! The sync runtime never dials the socket itself.  Whatever owns the
//! connection holds a [`TransportEnd`]: it pushes decoded inbound events in
//! and drains outbound events to put on the wire.  Ordering is preserved in
//! both directions.
//!
//! The two directions must be serviced independently (separate tasks or one
//! `select!` loop).  The engine waits when the outbound queue is full, so a
//! transport that only drains outbound after a `deliver` returns can stall
//! both sides once the queues fill.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use toki_shared::error::ProtocolError;
use toki_shared::protocol::{InboundEvent, OutboundEvent};

/// Runtime side of the event channel, consumed by `spawn_runtime`.
#[derive(Debug)]
pub struct EventChannel {
    pub(crate) outbound: mpsc::Sender<OutboundEvent>,
    pub(crate) inbound: mpsc::Receiver<InboundEvent>,
}

/// Transport side of the event channel.
#[derive(Debug)]
pub struct TransportEnd {
    inbound: mpsc::Sender<InboundEvent>,
    outbound: mpsc::Receiver<OutboundEvent>,
}

impl EventChannel {
    /// Create both ends with room for `buffer` queued events per direction.
    pub fn pair(buffer: usize) -> (EventChannel, TransportEnd) {
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(buffer.max(1));
        (
            EventChannel {
                outbound: outbound_tx,
                inbound: inbound_rx,
            },
            TransportEnd {
                inbound: inbound_tx,
                outbound: outbound_rx,
            },
        )
    }
}

impl TransportEnd {
    /// Hand a decoded event to the runtime.
    pub async fn deliver(&self, event: InboundEvent) -> Result<(), ProtocolError> {
        let tag = event.tag();
        self.inbound
            .send(event)
            .await
            .map_err(|_| ProtocolError::Protocol(format!("runtime gone, dropped {tag}")))
    }

    /// Decode a raw `{event, data}` frame and hand it to the runtime.
    /// Frames that fail to decode are logged and reported, never forwarded.
    pub async fn deliver_json(&self, raw: &str) -> Result<(), ProtocolError> {
        let event = match InboundEvent::from_json(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, len = raw.len(), "undecodable inbound frame");
                return Err(e);
            }
        };
        debug!(event = event.tag(), "inbound frame decoded");
        self.deliver(event).await
    }

    /// Next event to put on the wire; `None` once the runtime has stopped.
    pub async fn next_outbound(&mut self) -> Option<OutboundEvent> {
        self.outbound.recv().await
    }

    /// Next outbound event already encoded as a wire frame.
    pub async fn next_outbound_json(&mut self) -> Option<Result<String, ProtocolError>> {
        self.next_outbound().await.map(|event| event.to_json())
    }
}
