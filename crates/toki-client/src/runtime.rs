//! Single-writer runtime.
//!
//! One tokio task owns the [`SyncEngine`].  Callers, the event-channel
//! bridge and background fetches all talk to it through one `mpsc` queue,
//! so every message is handled to completion before the next one starts.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use toki_shared::models::{Conversation, Message, Peer};
use toki_shared::protocol::{InboundEvent, OutboundEvent};
use toki_shared::types::{MessageId, PeerId, TempId};

use crate::api::{ApiError, HistoryApi};
use crate::bridge::spawn_inbound_bridge;
use crate::directory::PeerDirectory;
use crate::engine::{Effect, SyncEngine, SyncSnapshot};
use crate::error::{ClientError, Result};
use crate::transport::EventChannel;

// ---------------------------------------------------------------------------
// Message types
// ---------------------------------------------------------------------------

/// User actions routed to the engine.
#[derive(Debug)]
pub enum Action {
    SelectConversation(Peer),
    CloseConversation,
    RefreshConversations,
    SendMessage {
        peer_id: PeerId,
        content: String,
        reply: oneshot::Sender<Result<TempId>>,
    },
    EditMessage {
        message_id: MessageId,
        content: String,
        peer_id: PeerId,
        reply: oneshot::Sender<Result<()>>,
    },
}

impl Action {
    pub fn tag(&self) -> &'static str {
        match self {
            Action::SelectConversation(_) => "select_conversation",
            Action::CloseConversation => "close_conversation",
            Action::RefreshConversations => "refresh_conversations",
            Action::SendMessage { .. } => "send_message",
            Action::EditMessage { .. } => "edit_message",
        }
    }
}

/// Completions of work the runtime started outside the engine.
#[derive(Debug)]
pub enum InternalEvent {
    ConversationsLoaded(std::result::Result<Vec<Conversation>, ApiError>),
    HistoryLoaded {
        peer_id: PeerId,
        result: std::result::Result<Vec<Message>, ApiError>,
    },
    ConversationDeleted {
        peer_id: PeerId,
        done: oneshot::Sender<()>,
    },
    PeersFound(Vec<Peer>),
}

/// Everything the engine task receives.
#[derive(Debug)]
pub enum EngineMsg {
    Action(Action),
    Inbound(InboundEvent),
    Internal(InternalEvent),
    Snapshot(oneshot::Sender<SyncSnapshot>),
    Shutdown,
}

// ---------------------------------------------------------------------------
// Engine task
// ---------------------------------------------------------------------------

struct SyncRuntime<A: HistoryApi> {
    engine: SyncEngine,
    api: Arc<A>,
    /// Weak so background fetches never keep the queue open on their own.
    self_tx: mpsc::WeakSender<EngineMsg>,
    outbound: mpsc::Sender<OutboundEvent>,
}

impl<A: HistoryApi> SyncRuntime<A> {
    async fn run(mut self, mut rx: mpsc::Receiver<EngineMsg>) {
        info!(user = %self.engine.local_user(), "Sync engine started");

        self.engine.refresh_conversations();
        self.drain_effects().await;

        while let Some(msg) = rx.recv().await {
            if matches!(msg, EngineMsg::Shutdown) {
                info!("Sync engine shutdown requested");
                break;
            }
            self.handle(msg);
            self.drain_effects().await;
        }

        info!("Sync engine stopped");
    }

    fn handle(&mut self, msg: EngineMsg) {
        match msg {
            EngineMsg::Action(action) => {
                debug!(action = action.tag(), "action");
                self.handle_action(action);
            }
            EngineMsg::Inbound(event) => self.engine.handle_inbound(event),
            EngineMsg::Internal(event) => self.handle_internal(event),
            EngineMsg::Snapshot(reply) => {
                let _ = reply.send(self.engine.snapshot());
            }
            EngineMsg::Shutdown => {}
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::SelectConversation(peer) => self.engine.select_conversation(peer),
            Action::CloseConversation => self.engine.close_conversation(),
            Action::RefreshConversations => self.engine.refresh_conversations(),
            Action::SendMessage {
                peer_id,
                content,
                reply,
            } => {
                let _ = reply.send(self.engine.send_message(&peer_id, &content));
            }
            Action::EditMessage {
                message_id,
                content,
                peer_id,
                reply,
            } => {
                let _ = reply.send(self.engine.edit_message(&message_id, &content, &peer_id));
            }
        }
    }

    fn handle_internal(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::ConversationsLoaded(result) => self.engine.apply_conversations(result),
            InternalEvent::HistoryLoaded { peer_id, result } => {
                self.engine.apply_history(&peer_id, result)
            }
            InternalEvent::ConversationDeleted { peer_id, done } => {
                self.engine.complete_deletion(&peer_id);
                let _ = done.send(());
            }
            InternalEvent::PeersFound(peers) => self.engine.record_search_results(&peers),
        }
    }

    async fn drain_effects(&mut self) {
        for effect in self.engine.take_effects() {
            match effect {
                Effect::Emit(event) => self.emit(event).await,
                Effect::RefreshConversations => self.spawn_refresh(),
                Effect::FetchHistory(peer_id) => self.spawn_history(peer_id),
            }
        }
    }

    /// Hand an event to the transport.  A full queue is waited out, never
    /// dropped: losing a `send_message` would strand its optimistic copy.
    async fn emit(&self, event: OutboundEvent) {
        let tag = event.tag();
        let event = match self.outbound.try_send(event) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(event = tag, "event channel closed, outbound event dropped");
                return;
            }
            Err(mpsc::error::TrySendError::Full(event)) => event,
        };
        warn!(
            event = tag,
            capacity = self.outbound.max_capacity(),
            "outbound queue full, waiting for the transport to drain it"
        );
        if self.outbound.send(event).await.is_err() {
            warn!(event = tag, "event channel closed, outbound event dropped");
        }
    }

    fn spawn_refresh(&self) {
        let api = Arc::clone(&self.api);
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            let result = api.fetch_conversations().await;
            post(&tx, InternalEvent::ConversationsLoaded(result)).await;
        });
    }

    fn spawn_history(&self, peer_id: PeerId) {
        let api = Arc::clone(&self.api);
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            let result = api.fetch_history(&peer_id).await;
            post(&tx, InternalEvent::HistoryLoaded { peer_id, result }).await;
        });
    }
}

async fn post(tx: &mpsc::WeakSender<EngineMsg>, event: InternalEvent) {
    match tx.upgrade() {
        Some(tx) => {
            let _ = tx.send(EngineMsg::Internal(event)).await;
        }
        None => debug!("Sync engine gone, completion dropped"),
    }
}

/// Start the engine task and the inbound bridge.
///
/// The engine loads the conversation list immediately.  The task ends when
/// every [`SyncHandle`] is dropped and the transport has closed its inbound
/// side, or on [`SyncHandle::shutdown`].
pub fn spawn_runtime<A: HistoryApi>(
    local_user: PeerId,
    api: A,
    channel: EventChannel,
    buffer: usize,
) -> (SyncHandle<A>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel::<EngineMsg>(buffer.max(1));
    let api = Arc::new(api);
    let EventChannel { outbound, inbound } = channel;

    let runtime = SyncRuntime {
        engine: SyncEngine::new(local_user),
        api: Arc::clone(&api),
        self_tx: tx.downgrade(),
        outbound,
    };
    let task = tokio::spawn(runtime.run(rx));
    spawn_inbound_bridge(inbound, tx.clone());

    (SyncHandle { tx, api }, task)
}

// ---------------------------------------------------------------------------
// Caller surface
// ---------------------------------------------------------------------------

/// Cloneable handle to a running sync engine.
pub struct SyncHandle<A> {
    tx: mpsc::Sender<EngineMsg>,
    api: Arc<A>,
}

impl<A> Clone for SyncHandle<A> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            api: Arc::clone(&self.api),
        }
    }
}

impl<A: HistoryApi> SyncHandle<A> {
    async fn send(&self, msg: EngineMsg) -> Result<()> {
        self.tx.send(msg).await.map_err(|_| ClientError::EngineStopped)
    }

    async fn action(&self, action: Action) -> Result<()> {
        self.send(EngineMsg::Action(action)).await
    }

    pub async fn select_conversation(&self, peer: Peer) -> Result<()> {
        self.action(Action::SelectConversation(peer)).await
    }

    pub async fn close_conversation(&self) -> Result<()> {
        self.action(Action::CloseConversation).await
    }

    pub async fn refresh_conversations(&self) -> Result<()> {
        self.action(Action::RefreshConversations).await
    }

    /// Queue a send.  Resolves with the temporary id once the optimistic
    /// message is in the log and the request has been handed to the channel.
    pub async fn send_message(&self, peer_id: PeerId, content: impl Into<String>) -> Result<TempId> {
        let (reply, rx) = oneshot::channel();
        self.action(Action::SendMessage {
            peer_id,
            content: content.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ClientError::EngineStopped)?
    }

    pub async fn edit_message(
        &self,
        message_id: MessageId,
        content: impl Into<String>,
        peer_id: PeerId,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.action(Action::EditMessage {
            message_id,
            content: content.into(),
            peer_id,
            reply,
        })
        .await?;
        rx.await.map_err(|_| ClientError::EngineStopped)?
    }

    /// Delete a conversation on the backend, then locally.  A rejection is
    /// returned unchanged and local state is left alone.
    pub async fn delete_conversation(&self, peer_id: PeerId) -> Result<()> {
        if let Err(e) = self.api.delete_conversation(&peer_id).await {
            warn!(peer = %peer_id, status = ?e.status, error = %e, "conversation deletion rejected");
            return Err(ClientError::Rejected(e));
        }

        let (done, rx) = oneshot::channel();
        self.send(EngineMsg::Internal(InternalEvent::ConversationDeleted { peer_id, done }))
            .await?;
        rx.await.map_err(|_| ClientError::EngineStopped)
    }

    /// Search peers by name.  Queries shorter than two characters resolve to
    /// an empty list without a request.
    pub async fn search_peers(&self, query: &str) -> Result<Vec<Peer>> {
        if !PeerDirectory::is_searchable(query) {
            return Ok(Vec::new());
        }
        let peers = self.api.search_peers(query.trim()).await?;
        debug!(count = peers.len(), "peer search results");
        self.send(EngineMsg::Internal(InternalEvent::PeersFound(peers.clone())))
            .await?;
        Ok(peers)
    }

    pub async fn snapshot(&self) -> Result<SyncSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineMsg::Snapshot(reply)).await?;
        rx.await.map_err(|_| ClientError::EngineStopped)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(EngineMsg::Shutdown).await
    }
}
