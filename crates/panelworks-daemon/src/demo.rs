//! Demo panel driven from the console.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use panelworks_core::event::InteractionEvent;
use panelworks_core::panel::{Panel, PanelContext, PanelError};
use panelworks_core::types::{ActorId, Document, Symbol};
use tracing::debug;

pub const INCREMENT: &str = "➕";
pub const DECREMENT: &str = "➖";
pub const RESET: &str = "🔄";

const COUNTER_COLOR: u32 = 0x3498DB;
const CLOSED_COLOR: u32 = 0x95A5A6;

/// A shared counter. Each added ➕ or ➖ moves it by one and 🔄 resets it;
/// removing a reaction does nothing.
pub struct CounterPanel {
    title: String,
    count: i64,
    last_actor: Option<ActorId>,
    blocked: HashSet<ActorId>,
    refresh: Option<Duration>,
    goal: Option<i64>,
    clock: fn() -> DateTime<Utc>,
    ctx: Option<PanelContext>,
    closed: bool,
}

impl CounterPanel {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            count: 0,
            last_actor: None,
            blocked: HashSet::new(),
            refresh: None,
            goal: None,
            clock: Utc::now,
            ctx: None,
            closed: false,
        }
    }

    /// Reactions from `actor` are ignored.
    pub fn block(mut self, actor: impl Into<ActorId>) -> Self {
        self.blocked.insert(actor.into());
        self
    }

    /// Re-render every `period` to keep the "updated" clock current.
    pub fn refresh_every(mut self, period: Duration) -> Self {
        self.refresh = Some(period);
        self
    }

    /// Close the panel once the count reaches `goal`.
    pub fn close_at(mut self, goal: i64) -> Self {
        self.goal = Some(goal);
        self
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn count(&self) -> i64 {
        self.count
    }
}

impl Panel for CounterPanel {
    fn initialize(&mut self, ctx: PanelContext) {
        debug!(panel = %ctx.id(), title = %self.title, "counter initialized");
        self.ctx = Some(ctx);
    }

    fn render(&self) -> Result<Document, PanelError> {
        let mut doc = Document::new()
            .title(&self.title)
            .description(format!("count: **{}**", self.count));
        if let Some(actor) = &self.last_actor {
            doc = doc.field("last change", actor.to_string(), true);
        }

        if self.closed {
            return Ok(doc.color(CLOSED_COLOR).footer("closed"));
        }
        doc = doc
            .color(COUNTER_COLOR)
            .footer(format!("{INCREMENT} up  {DECREMENT} down  {RESET} reset"));
        if self.refresh.is_some() {
            doc = doc.timestamp((self.clock)());
        }
        Ok(doc)
    }

    fn update(&mut self, event: &InteractionEvent) -> Result<(), PanelError> {
        if !event.is_added() {
            return Ok(());
        }
        let next = match event.symbol.name() {
            INCREMENT => self.count.checked_add(1),
            DECREMENT => self.count.checked_sub(1),
            RESET => Some(0),
            _ => return Ok(()),
        };
        self.count = next.ok_or_else(|| PanelError::Update("counter overflow".into()))?;
        self.last_actor = Some(event.actor.clone());
        if self.goal == Some(self.count) {
            if let Some(ctx) = &self.ctx {
                debug!(panel = %ctx.id(), count = self.count, "goal reached, closing");
                ctx.terminate();
            }
        }
        Ok(())
    }

    fn target_symbols(&self) -> Vec<Symbol> {
        [INCREMENT, DECREMENT, RESET]
            .into_iter()
            .map(Symbol::unicode)
            .collect()
    }

    fn is_participating(&self, actor: &ActorId) -> bool {
        !self.blocked.contains(actor)
    }

    fn automatic_render(&self) -> Option<Duration> {
        self.refresh
    }

    fn finalize(&mut self) {
        self.closed = true;
        self.ctx = None;
    }
}
