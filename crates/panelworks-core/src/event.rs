use crate::types::{ActorId, MessageHandle, MessageId, PanelId, Symbol};
use serde::{Deserialize, Serialize};

/// Raw callback delivered by the transport into the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    ReactionAdded {
        message: MessageId,
        symbol: Symbol,
        actor: ActorId,
    },
    ReactionRemoved {
        message: MessageId,
        symbol: Symbol,
        actor: ActorId,
    },
    MessageDeleted {
        message: MessageId,
    },
}

impl TransportEvent {
    pub fn message(&self) -> &MessageId {
        match self {
            TransportEvent::ReactionAdded { message, .. }
            | TransportEvent::ReactionRemoved { message, .. }
            | TransportEvent::MessageDeleted { message } => message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Added,
    Removed,
}

/// An accepted interaction forwarded to a panel's `update`.
///
/// Only built by the event router after symbol and actor filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub kind: InteractionKind,
    pub symbol: Symbol,
    pub actor: ActorId,
    pub panel: PanelId,
    pub message: MessageHandle,
}

impl InteractionEvent {
    pub fn is_added(&self) -> bool {
        self.kind == InteractionKind::Added
    }
}
