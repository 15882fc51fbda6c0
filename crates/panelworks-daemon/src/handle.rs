use panelworks_core::panel::{Panel, PanelControl};
use panelworks_core::types::{ChannelId, PanelId};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::engine::{EngineError, EngineNotification};

/// Request queued to the engine loop.
pub enum EngineCommand {
    Add {
        channel: ChannelId,
        panel: Box<dyn Panel>,
        reply: oneshot::Sender<Result<PanelId, EngineError>>,
    },
    Render {
        panel: PanelId,
    },
    Remove {
        panel: PanelId,
        delete_message: bool,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
}

impl std::fmt::Debug for EngineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineCommand::Add { channel, .. } => {
                f.debug_struct("Add").field("channel", channel).finish_non_exhaustive()
            }
            EngineCommand::Render { panel } => f.debug_struct("Render").field("panel", panel).finish(),
            EngineCommand::Remove {
                panel,
                delete_message,
            } => f
                .debug_struct("Remove")
                .field("panel", panel)
                .field("delete_message", delete_message)
                .finish(),
            EngineCommand::Count { .. } => f.write_str("Count"),
        }
    }
}

/// Cloneable front door to a running [`PanelEngine`](crate::engine::PanelEngine).
///
/// Every request is queued; the engine loop applies them one at a time.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineCommand>,
    notify_tx: broadcast::Sender<EngineNotification>,
    cancel: CancellationToken,
}

impl EngineHandle {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<EngineCommand>,
        notify_tx: broadcast::Sender<EngineNotification>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tx,
            notify_tx,
            cancel,
        }
    }

    /// Render `panel`, post it to `channel` and start tracking it.
    pub async fn add(&self, channel: ChannelId, panel: impl Panel) -> Result<PanelId, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Add {
                channel,
                panel: Box::new(panel),
                reply,
            })
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)?
    }

    pub fn trigger_render(&self, panel: PanelId) {
        if self.tx.send(EngineCommand::Render { panel }).is_err() {
            tracing::debug!(panel = %panel, "render request dropped, engine stopped");
        }
    }

    pub fn remove(&self, panel: PanelId, delete_message: bool) {
        let command = EngineCommand::Remove {
            panel,
            delete_message,
        };
        if self.tx.send(command).is_err() {
            tracing::debug!(panel = %panel, "remove request dropped, engine stopped");
        }
    }

    pub async fn panel_count(&self) -> Result<usize, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::Count { reply })
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    /// Lifecycle and failure notifications from the engine.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineNotification> {
        self.notify_tx.subscribe()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl PanelControl for EngineHandle {
    fn request_render(&self, panel: PanelId) {
        self.trigger_render(panel);
    }

    fn request_removal(&self, panel: PanelId, delete_message: bool) {
        self.remove(panel, delete_message);
    }
}
