use async_trait::async_trait;
use panelworks_core::types::{ActorId, ChannelId, Document, MessageHandle, Symbol};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport rejected request: {0}")]
    Rejected(String),
    #[error("message not found")]
    NotFound,
    #[error("send returned no message")]
    NoMessage,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Chat transport the engine renders into.
///
/// Event delivery is separate: the transport pushes
/// [`TransportEvent`](panelworks_core::event::TransportEvent)s into the
/// engine's event channel.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Post a document. A transport may split one document over several
    /// messages; the panel binds to the first handle returned.
    async fn send_message(
        &self,
        channel: &ChannelId,
        document: &Document,
    ) -> Result<Vec<MessageHandle>, TransportError>;

    async fn edit_message(
        &self,
        message: &MessageHandle,
        document: &Document,
    ) -> Result<(), TransportError>;

    async fn delete_message(&self, message: &MessageHandle) -> Result<(), TransportError>;

    async fn apply_symbol(
        &self,
        message: &MessageHandle,
        symbol: &Symbol,
    ) -> Result<(), TransportError>;

    async fn clear_symbols(&self, message: &MessageHandle) -> Result<(), TransportError>;

    /// The engine's own automated actor, used to filter self-reactions.
    fn self_actor(&self) -> ActorId;
}
