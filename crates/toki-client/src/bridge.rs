use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use toki_shared::protocol::InboundEvent;

use crate::runtime::EngineMsg;

/// Spawn the loop that forwards transport events into the engine queue.
pub(crate) fn spawn_inbound_bridge(
    inbound: mpsc::Receiver<InboundEvent>,
    engine_tx: mpsc::Sender<EngineMsg>,
) -> JoinHandle<()> {
    tokio::spawn(inbound_loop(inbound, engine_tx))
}

/// Forward every inbound event, one at a time, in arrival order.
async fn inbound_loop(mut inbound: mpsc::Receiver<InboundEvent>, engine_tx: mpsc::Sender<EngineMsg>) {
    info!("Event channel bridge started");

    while let Some(event) = inbound.recv().await {
        debug!(event = event.tag(), "forwarding inbound event");
        if engine_tx.send(EngineMsg::Inbound(event)).await.is_err() {
            warn!("Sync engine stopped, bridge exiting");
            return;
        }
    }

    info!("Event channel closed, bridge exiting");
}
