//! In-memory transport and a scriptable panel for engine tests.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use panelworks_core::event::{InteractionEvent, TransportEvent};
use panelworks_core::panel::{Panel, PanelContext, PanelError};
use panelworks_core::types::{
    ActorId, ChannelId, Document, MessageHandle, MessageId, PanelId, Symbol,
};
use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::engine::PanelEngine;
use crate::handle::EngineHandle;
use crate::transport::{Transport, TransportError};

pub(crate) const BOT: &str = "panelworks-bot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Send {
        channel: ChannelId,
        title: Option<String>,
    },
    Edit {
        message: MessageId,
        title: Option<String>,
    },
    Delete {
        message: MessageId,
    },
    Apply {
        message: MessageId,
        symbol: Symbol,
    },
    Clear {
        message: MessageId,
    },
}

#[derive(Default)]
struct TransportState {
    calls: Vec<Call>,
    next_message: u64,
    split: usize,
    fail_sends: bool,
    fail_edits: bool,
    fail_applies: bool,
    fail_deletes: bool,
    apply_delay: Option<Duration>,
}

/// Records every call, including the ones it is told to fail.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    state: Mutex<TransportState>,
}

impl RecordingTransport {
    fn with_state<T>(&self, f: impl FnOnce(&mut TransportState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Make each send produce `n` messages.
    pub(crate) fn split_sends(&self, n: usize) {
        self.with_state(|s| s.split = n);
    }

    pub(crate) fn fail_sends(&self, fail: bool) {
        self.with_state(|s| s.fail_sends = fail);
    }

    pub(crate) fn fail_edits(&self, fail: bool) {
        self.with_state(|s| s.fail_edits = fail);
    }

    pub(crate) fn fail_applies(&self, fail: bool) {
        self.with_state(|s| s.fail_applies = fail);
    }

    pub(crate) fn fail_deletes(&self, fail: bool) {
        self.with_state(|s| s.fail_deletes = fail);
    }

    /// Make each `apply_symbol` take `delay` before it is recorded.
    pub(crate) fn delay_applies(&self, delay: Duration) {
        self.with_state(|s| s.apply_delay = Some(delay));
    }

    pub(crate) fn clear(&self) {
        self.with_state(|s| s.calls.clear());
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.with_state(|s| s.calls.clone())
    }

    pub(crate) fn edit_count(&self) -> usize {
        self.with_state(|s| s.calls.iter().filter(|c| matches!(c, Call::Edit { .. })).count())
    }

    pub(crate) fn last_edit_title(&self) -> Option<String> {
        self.with_state(|s| {
            s.calls.iter().rev().find_map(|c| match c {
                Call::Edit { title, .. } => title.clone(),
                _ => None,
            })
        })
    }
}

fn rejected(what: &str) -> TransportError {
    TransportError::Rejected(format!("{what} refused by test transport"))
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_message(
        &self,
        channel: &ChannelId,
        document: &Document,
    ) -> Result<Vec<MessageHandle>, TransportError> {
        self.with_state(|s| {
            s.calls.push(Call::Send {
                channel: channel.clone(),
                title: document.title.clone(),
            });
            if s.fail_sends {
                return Err(rejected("send"));
            }
            let count = s.split.max(1);
            let handles = (0..count)
                .map(|_| {
                    s.next_message += 1;
                    MessageHandle::new(channel.clone(), format!("m{}", s.next_message))
                })
                .collect();
            Ok(handles)
        })
    }

    async fn edit_message(
        &self,
        message: &MessageHandle,
        document: &Document,
    ) -> Result<(), TransportError> {
        self.with_state(|s| {
            s.calls.push(Call::Edit {
                message: message.id().clone(),
                title: document.title.clone(),
            });
            if s.fail_edits { Err(rejected("edit")) } else { Ok(()) }
        })
    }

    async fn delete_message(&self, message: &MessageHandle) -> Result<(), TransportError> {
        self.with_state(|s| {
            s.calls.push(Call::Delete {
                message: message.id().clone(),
            });
            if s.fail_deletes { Err(TransportError::NotFound) } else { Ok(()) }
        })
    }

    async fn apply_symbol(
        &self,
        message: &MessageHandle,
        symbol: &Symbol,
    ) -> Result<(), TransportError> {
        if let Some(delay) = self.with_state(|s| s.apply_delay) {
            tokio::time::sleep(delay).await;
        }
        self.with_state(|s| {
            s.calls.push(Call::Apply {
                message: message.id().clone(),
                symbol: symbol.clone(),
            });
            if s.fail_applies { Err(rejected("reaction")) } else { Ok(()) }
        })
    }

    async fn clear_symbols(&self, message: &MessageHandle) -> Result<(), TransportError> {
        self.with_state(|s| {
            s.calls.push(Call::Clear {
                message: message.id().clone(),
            });
            Ok(())
        })
    }

    fn self_actor(&self) -> ActorId {
        ActorId::from(BOT)
    }
}

#[derive(Default)]
struct ProbeState {
    title: String,
    finalized_title: Option<String>,
    symbols: Vec<Symbol>,
    automatic: Option<Duration>,
    blocked: HashSet<ActorId>,
    fail_render: bool,
    fail_update: bool,
    context: Option<PanelContext>,
    finalized: usize,
    renders: usize,
    updates: Vec<InteractionEvent>,
}

/// Shared view into a [`ProbePanel`] after it has been boxed into the engine.
#[derive(Clone)]
pub(crate) struct Probe(Arc<Mutex<ProbeState>>);

impl Probe {
    fn with<T>(&self, f: impl FnOnce(&mut ProbeState) -> T) -> T {
        let mut state = self.0.lock().unwrap();
        f(&mut state)
    }

    pub(crate) fn initialized_with(&self) -> Option<PanelId> {
        self.with(|s| s.context.as_ref().map(PanelContext::id))
    }

    pub(crate) fn context(&self) -> Option<PanelContext> {
        self.with(|s| s.context.clone())
    }

    pub(crate) fn set_title(&self, title: &str) {
        self.with(|s| s.title = title.to_owned());
    }

    pub(crate) fn set_symbols(&self, symbols: &[&str]) {
        self.with(|s| s.symbols = symbols.iter().map(|name| Symbol::unicode(*name)).collect());
    }

    pub(crate) fn set_automatic(&self, period: Option<Duration>) {
        self.with(|s| s.automatic = period);
    }

    /// Title rendered once the panel has been finalized.
    pub(crate) fn set_finalized_title(&self, title: &str) {
        self.with(|s| s.finalized_title = Some(title.to_owned()));
    }

    pub(crate) fn fail_render(&self, fail: bool) {
        self.with(|s| s.fail_render = fail);
    }

    pub(crate) fn fail_update(&self, fail: bool) {
        self.with(|s| s.fail_update = fail);
    }

    pub(crate) fn block_actor(&self, actor: &str) {
        self.with(|s| {
            s.blocked.insert(ActorId::from(actor));
        });
    }

    pub(crate) fn render_count(&self) -> usize {
        self.with(|s| s.renders)
    }

    pub(crate) fn finalize_count(&self) -> usize {
        self.with(|s| s.finalized)
    }

    pub(crate) fn updates(&self) -> Vec<InteractionEvent> {
        self.with(|s| s.updates.clone())
    }
}

/// Panel whose behaviour is scripted through its [`Probe`].
pub(crate) struct ProbePanel(Probe);

impl ProbePanel {
    pub(crate) fn new(title: &str) -> (Self, Probe) {
        let probe = Probe(Arc::new(Mutex::new(ProbeState {
            title: title.to_owned(),
            ..ProbeState::default()
        })));
        (Self(probe.clone()), probe)
    }
}

impl Panel for ProbePanel {
    fn initialize(&mut self, ctx: PanelContext) {
        self.0.with(|s| s.context = Some(ctx));
    }

    fn render(&self) -> Result<Document, PanelError> {
        self.0.with(|s| {
            s.renders += 1;
            if s.fail_render {
                return Err(PanelError::Render("probe told to fail".into()));
            }
            let title = match (&s.finalized_title, s.finalized > 0) {
                (Some(title), true) => title.clone(),
                _ => s.title.clone(),
            };
            Ok(Document::new().title(title))
        })
    }

    fn update(&mut self, event: &InteractionEvent) -> Result<(), PanelError> {
        self.0.with(|s| {
            s.updates.push(event.clone());
            if s.fail_update {
                Err(PanelError::Update("probe told to fail".into()))
            } else {
                Ok(())
            }
        })
    }

    fn target_symbols(&self) -> Vec<Symbol> {
        self.0.with(|s| s.symbols.clone())
    }

    fn is_participating(&self, actor: &ActorId) -> bool {
        self.0.with(|s| !s.blocked.contains(actor))
    }

    fn automatic_render(&self) -> Option<Duration> {
        self.0.with(|s| s.automatic)
    }

    fn finalize(&mut self) {
        self.0.with(|s| s.finalized += 1);
    }
}

/// An engine over a fresh [`RecordingTransport`] with rate limit `min_interval_ms`.
pub(crate) fn engine_with(
    min_interval_ms: u64,
) -> (
    Arc<RecordingTransport>,
    PanelEngine,
    EngineHandle,
    mpsc::Sender<TransportEvent>,
) {
    let transport = Arc::new(RecordingTransport::default());
    let config = EngineConfig {
        min_render_interval_ms: min_interval_ms,
        ..EngineConfig::default()
    };
    let (events_tx, events_rx) = mpsc::channel(config.event_buffer);
    let (engine, handle) = PanelEngine::new(transport.clone(), config, events_rx);
    (transport, engine, handle, events_tx)
}
