//! Reaction and deletion routing.
//!
//! Raw transport events are filtered by target-symbol membership and actor
//! eligibility before they reach a panel. The engine's own markers are
//! re-applied when someone else strips them.

use panelworks_core::event::{InteractionEvent, InteractionKind, TransportEvent};
use panelworks_core::types::{ActorId, MessageHandle, MessageId, PanelId, Symbol};
use tracing::{debug, info, warn};

use crate::engine::{EngineNotification, FailureStage, PanelEngine, RemovalReason};

/// What to do with one reaction event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Route {
    /// Untracked message, untracked symbol or ineligible actor.
    Ignore,
    /// Forward to the panel's `update`, then trigger a render.
    Forward(InteractionEvent),
    /// The engine's own marker was removed: put it back.
    Reapply { message: MessageHandle, symbol: Symbol },
}

impl PanelEngine {
    pub(crate) async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ReactionAdded {
                message,
                symbol,
                actor,
            } => {
                self.handle_reaction(InteractionKind::Added, &message, symbol, actor)
                    .await;
            }
            TransportEvent::ReactionRemoved {
                message,
                symbol,
                actor,
            } => {
                self.handle_reaction(InteractionKind::Removed, &message, symbol, actor)
                    .await;
            }
            TransportEvent::MessageDeleted { message } => self.handle_message_deleted(&message),
        }
    }

    /// Decide how a reaction is routed. Pure with respect to the transport.
    pub(crate) fn route(
        &self,
        kind: InteractionKind,
        message: &MessageId,
        symbol: Symbol,
        actor: ActorId,
    ) -> Route {
        let Some(entry) = self.registry.lookup_by_message(message) else {
            return Route::Ignore;
        };
        if !entry.panel.target_symbols().contains(&symbol) {
            return Route::Ignore;
        }

        let participating = entry.panel.is_participating(&actor);
        if is_eligible(&actor, &self.self_actor, participating) {
            Route::Forward(InteractionEvent {
                kind,
                symbol,
                actor,
                panel: entry.panel_id,
                message: entry.message.clone(),
            })
        } else if actor == self.self_actor && kind == InteractionKind::Removed {
            Route::Reapply {
                message: entry.message.clone(),
                symbol,
            }
        } else {
            Route::Ignore
        }
    }

    async fn handle_reaction(
        &mut self,
        kind: InteractionKind,
        message: &MessageId,
        symbol: Symbol,
        actor: ActorId,
    ) {
        match self.route(kind, message, symbol, actor) {
            Route::Ignore => {}
            Route::Forward(event) => {
                let panel_id = event.panel;
                debug!(
                    panel = %panel_id,
                    kind = ?event.kind,
                    symbol = %event.symbol,
                    actor = %event.actor,
                    "forwarding interaction"
                );
                if let Err(e) = self.forward(panel_id, &event) {
                    self.fail(panel_id, FailureStage::Update, &e).await;
                    return;
                }
                self.trigger_render(panel_id).await;
            }
            Route::Reapply { message, symbol } => {
                debug!(message = %message, symbol = %symbol, "re-applying stripped symbol");
                if let Err(e) = self.transport.apply_symbol(&message, &symbol).await {
                    warn!(message = %message, symbol = %symbol, error = %e, "re-apply failed");
                }
            }
        }
    }

    fn forward(&mut self, panel_id: PanelId, event: &InteractionEvent) -> Result<(), String> {
        match self.registry.lookup_by_panel_mut(panel_id) {
            Some(entry) => entry.panel.update(event).map_err(|e| e.to_string()),
            None => Ok(()),
        }
    }

    /// The backing message is gone: finalize and forget the panel. No
    /// transport calls.
    fn handle_message_deleted(&mut self, message: &MessageId) {
        let Some(mut entry) = self.registry.detach_message(message) else {
            return;
        };
        entry.panel.finalize();
        info!(panel = %entry.panel_id, message = %message, "message deleted, panel removed");
        self.notify(EngineNotification::PanelRemoved {
            panel: entry.panel_id,
            reason: RemovalReason::MessageDeleted,
        });
    }
}

/// Whether a reaction from `actor` should reach a panel that reports the
/// given participation.
pub(crate) fn is_eligible(actor: &ActorId, self_actor: &ActorId, participating: bool) -> bool {
    participating && actor != self_actor
}
