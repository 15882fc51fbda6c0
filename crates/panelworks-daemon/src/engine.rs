//! Single-owner engine loop.
//!
//! `PanelEngine` owns the registry and is the only code that mutates it.
//! It drains three inputs sequentially:
//!
//! - commands from [`EngineHandle`]s (add, render, remove),
//! - transport events (reactions, deletions), see [`crate::router`],
//! - a periodic tick that resolves deferred renders and automatic refreshes.
//!
//! Render bookkeeping is committed before the transport edit is awaited,
//! so a request arriving right after a commit sees the new window and
//! defers.

use std::fmt;
use std::sync::Arc;

use panelworks_core::diff;
use panelworks_core::event::TransportEvent;
use panelworks_core::panel::{Panel, PanelContext, PanelControl, PanelError};
use panelworks_core::registry::{Registry, RegistryError, Rejected};
use panelworks_core::timing::{RenderGate, TickReason};
use panelworks_core::types::{ActorId, ChannelId, Document, MessageHandle, PanelId};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::handle::{EngineCommand, EngineHandle};
use crate::transport::{Transport, TransportError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("panel setup failed: {0}")]
    Setup(String),
    #[error("engine stopped")]
    Stopped,
}

/// Where a panel failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// Applying the initial symbols.
    Setup,
    Render,
    Update,
    /// The transport rejected a committed edit.
    Commit,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureStage::Setup => "setup",
            FailureStage::Render => "render",
            FailureStage::Update => "update",
            FailureStage::Commit => "commit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    Requested,
    MessageDeleted,
    Failed,
    Shutdown,
}

/// Broadcast to subscribers as panels come and go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineNotification {
    PanelAdded {
        panel: PanelId,
        message: MessageHandle,
    },
    Rendered {
        panel: PanelId,
    },
    PanelFailed {
        panel: PanelId,
        stage: FailureStage,
        error: String,
    },
    PanelRemoved {
        panel: PanelId,
        reason: RemovalReason,
    },
}

/// Result of the synchronous half of a render request.
#[derive(Debug)]
pub(crate) enum RenderOutcome {
    NotRegistered,
    Deferred,
    Unchanged,
    Commit {
        message: MessageHandle,
        document: Document,
    },
    Failed(PanelError),
}

pub struct PanelEngine {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) self_actor: ActorId,
    pub(crate) config: EngineConfig,
    pub(crate) registry: Registry<Box<dyn Panel>>,
    next_panel_id: u64,
    control: Arc<dyn PanelControl>,
    command_rx: mpsc::UnboundedReceiver<EngineCommand>,
    event_rx: mpsc::Receiver<TransportEvent>,
    notify_tx: broadcast::Sender<EngineNotification>,
    cancel: CancellationToken,
    started: Instant,
}

impl PanelEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: EngineConfig,
        event_rx: mpsc::Receiver<TransportEvent>,
    ) -> (Self, EngineHandle) {
        Self::with_cancel(transport, config, event_rx, CancellationToken::new())
    }

    /// Create an engine with an explicit cancellation token for graceful shutdown.
    pub fn with_cancel(
        transport: Arc<dyn Transport>,
        config: EngineConfig,
        event_rx: mpsc::Receiver<TransportEvent>,
        cancel: CancellationToken,
    ) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (notify_tx, _) = broadcast::channel(64);
        let handle = EngineHandle::new(command_tx, notify_tx.clone(), cancel.clone());
        let self_actor = transport.self_actor();

        let engine = Self {
            transport,
            self_actor,
            config,
            registry: Registry::new(),
            next_panel_id: 1,
            control: Arc::new(handle.clone()),
            command_rx,
            event_rx,
            notify_tx,
            cancel,
            started: Instant::now(),
        };
        (engine, handle)
    }

    /// Main event loop. Runs until the transport event channel is closed or
    /// the cancellation token is triggered; remaining panels are finalized.
    pub async fn run(&mut self) {
        info!(
            min_render_interval_ms = self.config.min_render_interval_ms,
            tick_interval_ms = self.config.tick_interval_ms(),
            "engine: event loop started"
        );
        let tick_interval = self.config.tick_interval();
        let mut next_tick = Instant::now() + tick_interval;

        loop {
            if self.cancel.is_cancelled() {
                info!("engine: cancellation requested, shutting down");
                break;
            }
            // Checked every iteration so a steady stream of events cannot
            // starve deferred renders.
            if Instant::now() >= next_tick {
                self.tick().await;
                next_tick = Instant::now() + tick_interval;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {}
                Some(command) = self.command_rx.recv() => {
                    self.handle_command(command).await;
                }
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            info!("engine: event channel closed, shutting down");
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(next_tick) => {}
            }
        }

        self.finalize_all();
    }

    pub(crate) fn now_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub(crate) fn notify(&self, notification: EngineNotification) {
        // No subscribers is fine.
        let _ = self.notify_tx.send(notification);
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Add {
                channel,
                panel,
                reply,
            } => {
                let result = self.add(channel, panel).await;
                if reply.send(result).is_err() {
                    debug!("engine: add caller went away before reply");
                }
            }
            EngineCommand::Render { panel } => self.trigger_render(panel).await,
            EngineCommand::Remove {
                panel,
                delete_message,
            } => self.remove(panel, delete_message).await,
            EngineCommand::Count { reply } => {
                let _ = reply.send(self.registry.len());
            }
        }
    }

    /// Initialize, render and post a new panel, then apply its symbols.
    pub(crate) async fn add(
        &mut self,
        channel: ChannelId,
        mut panel: Box<dyn Panel>,
    ) -> Result<PanelId, EngineError> {
        let panel_id = PanelId(self.next_panel_id);
        self.next_panel_id += 1;
        panel.initialize(PanelContext::new(panel_id, Arc::clone(&self.control)));

        let document = match panel.render() {
            Ok(document) => document,
            Err(e) => {
                warn!(panel = %panel_id, error = %e, "initial render failed");
                panel.finalize();
                return Err(EngineError::Setup(e.to_string()));
            }
        };

        let message = match self.transport.send_message(&channel, &document).await {
            Ok(handles) => handles.into_iter().next().ok_or(TransportError::NoMessage),
            Err(e) => Err(e),
        };
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!(panel = %panel_id, channel = %channel, error = %e, "sending panel failed");
                panel.finalize();
                return Err(e.into());
            }
        };

        let symbols = panel.target_symbols();
        let now = self.now_ms();
        if let Err(Rejected { error, mut panel }) =
            self.registry
                .attach(panel_id, panel, message.clone(), document, now)
        {
            warn!(panel = %panel_id, error = %error, "attach rejected");
            panel.finalize();
            return Err(error.into());
        }
        info!(panel = %panel_id, message = %message, "panel attached");
        self.notify(EngineNotification::PanelAdded {
            panel: panel_id,
            message: message.clone(),
        });

        for symbol in &symbols {
            if let Err(e) = self.transport.apply_symbol(&message, symbol).await {
                let error = format!("applying {symbol}: {e}");
                self.fail(panel_id, FailureStage::Setup, &error).await;
                return Err(EngineError::Setup(error));
            }
        }

        Ok(panel_id)
    }

    /// Rate-limit, render and diff. Commits bookkeeping for a changed
    /// document but leaves the transport edit to the caller.
    pub(crate) fn prepare_render(&mut self, panel_id: PanelId, now_ms: u64) -> RenderOutcome {
        let min_interval = self.config.min_render_interval_ms;
        let Some(entry) = self.registry.lookup_by_panel_mut(panel_id) else {
            return RenderOutcome::NotRegistered;
        };

        if entry.timing.gate(now_ms, min_interval) == RenderGate::Deferred {
            return RenderOutcome::Deferred;
        }

        let document = match entry.panel.render() {
            Ok(document) => document,
            Err(e) => return RenderOutcome::Failed(e),
        };

        if !diff::needs_commit(entry.last_rendered.as_ref(), &document) {
            return RenderOutcome::Unchanged;
        }
        if let Some(last) = &entry.last_rendered {
            debug!(
                panel = %panel_id,
                changed = ?diff::changed_fields(last, &document),
                "document changed"
            );
        }

        entry.last_rendered = Some(document.clone());
        entry.timing.commit(now_ms);
        RenderOutcome::Commit {
            message: entry.message.clone(),
            document,
        }
    }

    /// Render a panel now if its window allows, otherwise defer it to the
    /// tick. Unknown panels are ignored.
    pub(crate) async fn trigger_render(&mut self, panel_id: PanelId) {
        let now = self.now_ms();
        match self.prepare_render(panel_id, now) {
            RenderOutcome::NotRegistered => {
                debug!(panel = %panel_id, "render requested for unregistered panel");
            }
            RenderOutcome::Deferred => {
                debug!(panel = %panel_id, now_ms = now, "render deferred by rate limit");
            }
            RenderOutcome::Unchanged => {
                debug!(panel = %panel_id, "render unchanged, skipping edit");
            }
            RenderOutcome::Failed(e) => {
                self.fail(panel_id, FailureStage::Render, &e.to_string()).await;
            }
            RenderOutcome::Commit { message, document } => {
                match self.transport.edit_message(&message, &document).await {
                    Ok(()) => self.notify(EngineNotification::Rendered { panel: panel_id }),
                    Err(e) => {
                        self.fail(panel_id, FailureStage::Commit, &e.to_string()).await;
                    }
                }
            }
        }
    }

    /// Periodic scheduler pass over every live entry.
    pub(crate) async fn tick(&mut self) {
        let now = self.now_ms();
        let min_interval = self.config.min_render_interval_ms;
        let due: Vec<(PanelId, TickReason)> = self
            .registry
            .panel_ids()
            .into_iter()
            .filter_map(|id| {
                let entry = self.registry.lookup_by_panel(id)?;
                let reason = entry
                    .timing
                    .tick(now, min_interval, entry.panel.automatic_render())?;
                Some((id, reason))
            })
            .collect();

        for (panel_id, reason) in due {
            debug!(panel = %panel_id, reason = ?reason, "tick render");
            // Entries torn down earlier in this pass resolve to NotRegistered.
            self.trigger_render(panel_id).await;
        }
    }

    /// Error/teardown path. Terminal for the entry: the message shows the
    /// error notice, symbols are stripped and the panel is finalized.
    pub(crate) async fn fail(&mut self, panel_id: PanelId, stage: FailureStage, error: &str) {
        let Some(mut entry) = self.registry.detach_panel(panel_id) else {
            return;
        };
        warn!(
            panel = %panel_id,
            message = %entry.message,
            stage = %stage,
            error = %error,
            "panel failed, tearing down"
        );

        if let Err(e) = self
            .transport
            .edit_message(&entry.message, &Document::error_notice())
            .await
        {
            warn!(panel = %panel_id, error = %e, "failed to post error notice");
        }
        if let Err(e) = self.transport.clear_symbols(&entry.message).await {
            warn!(panel = %panel_id, error = %e, "failed to clear symbols");
        }
        entry.panel.finalize();

        self.notify(EngineNotification::PanelFailed {
            panel: panel_id,
            stage,
            error: error.to_owned(),
        });
        self.notify(EngineNotification::PanelRemoved {
            panel: panel_id,
            reason: RemovalReason::Failed,
        });
    }

    /// Explicit removal. Deleting the message is best-effort; otherwise the
    /// symbols are stripped and the finalized panel gets one last render.
    pub(crate) async fn remove(&mut self, panel_id: PanelId, delete_message: bool) {
        let Some(mut entry) = self.registry.detach_panel(panel_id) else {
            debug!(panel = %panel_id, "remove requested for unregistered panel");
            return;
        };
        entry.panel.finalize();
        info!(panel = %panel_id, delete_message, "panel removed");

        if delete_message {
            if let Err(e) = self.transport.delete_message(&entry.message).await {
                debug!(panel = %panel_id, error = %e, "message delete failed, ignoring");
            }
        } else {
            if let Err(e) = self.transport.clear_symbols(&entry.message).await {
                warn!(panel = %panel_id, error = %e, "failed to clear symbols");
            }
            let document = entry.panel.render().unwrap_or_else(|e| {
                warn!(panel = %panel_id, error = %e, "final render failed");
                Document::error_notice()
            });
            if diff::needs_commit(entry.last_rendered.as_ref(), &document) {
                if let Err(e) = self.transport.edit_message(&entry.message, &document).await {
                    warn!(panel = %panel_id, error = %e, "final edit failed");
                }
            }
        }

        self.notify(EngineNotification::PanelRemoved {
            panel: panel_id,
            reason: RemovalReason::Requested,
        });
    }

    /// Finalize every remaining panel without touching the transport.
    fn finalize_all(&mut self) {
        let entries = self.registry.drain();
        info!(count = entries.len(), "engine: finalizing remaining panels");
        for mut entry in entries {
            entry.panel.finalize();
            self.notify(EngineNotification::PanelRemoved {
                panel: entry.panel_id,
                reason: RemovalReason::Shutdown,
            });
        }
    }

    pub fn panel_count(&self) -> usize {
        self.registry.len()
    }
}
