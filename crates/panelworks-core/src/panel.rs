//! The panel contract.
//!
//! A panel is the polymorphic unit of UI: it renders a [`Document`],
//! declares the symbols it wants on its message and receives accepted
//! interactions. Optional hooks have no-op defaults.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::event::InteractionEvent;
use crate::types::{ActorId, Document, PanelId, Symbol};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PanelError {
    #[error("render failed: {0}")]
    Render(String),
    #[error("update failed: {0}")]
    Update(String),
}

/// Requests a panel can make of the engine that owns it.
///
/// Implemented by the daemon's engine handle. Calls are queued, never run
/// re-entrantly inside the panel hook that issued them.
pub trait PanelControl: Send + Sync {
    fn request_render(&self, panel: PanelId);
    fn request_removal(&self, panel: PanelId, delete_message: bool);
}

/// Identity plus engine access, handed to a panel in [`Panel::initialize`].
#[derive(Clone)]
pub struct PanelContext {
    id: PanelId,
    control: Arc<dyn PanelControl>,
}

impl PanelContext {
    pub fn new(id: PanelId, control: Arc<dyn PanelControl>) -> Self {
        Self { id, control }
    }

    pub fn id(&self) -> PanelId {
        self.id
    }

    /// Ask the scheduler to re-render this panel.
    pub fn trigger_render(&self) {
        self.control.request_render(self.id);
    }

    /// Remove this panel, keeping its message with a final render.
    pub fn terminate(&self) {
        self.control.request_removal(self.id, false);
    }

    /// Remove this panel and delete its message.
    pub fn terminate_and_delete(&self) {
        self.control.request_removal(self.id, true);
    }
}

impl fmt::Debug for PanelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanelContext").field("id", &self.id).finish()
    }
}

pub trait Panel: Send + 'static {
    /// Called once after identity assignment, before the first render.
    fn initialize(&mut self, _ctx: PanelContext) {}

    /// Produce the display document from current state. Must not do I/O.
    fn render(&self) -> Result<Document, PanelError>;

    /// Apply one accepted interaction.
    fn update(&mut self, event: &InteractionEvent) -> Result<(), PanelError>;

    /// Symbols tracked and auto-applied to the message, in order.
    fn target_symbols(&self) -> Vec<Symbol> {
        Vec::new()
    }

    fn is_participating(&self, _actor: &ActorId) -> bool {
        true
    }

    /// Re-render every time this much has elapsed since the last commit.
    fn automatic_render(&self) -> Option<Duration> {
        None
    }

    /// Called exactly once at teardown.
    fn finalize(&mut self) {}
}
