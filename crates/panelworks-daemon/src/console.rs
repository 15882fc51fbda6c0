//! Terminal transport for running the engine by hand.
//!
//! Documents are printed to a writer (stdout in the binary) and reaction
//! events are typed as lines on stdin:
//!
//! ```text
//! react m1 ➕ alice
//! unreact m1 ➕
//! delete m1
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use panelworks_core::event::TransportEvent;
use panelworks_core::types::{ActorId, ChannelId, Document, MessageHandle, MessageId, Symbol};
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::transport::{Transport, TransportError};

/// Fields beyond this count spill over into continuation messages.
pub const MAX_FIELDS_PER_MESSAGE: usize = 25;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable blocks.
    #[default]
    Text,
    /// One JSON object per transport call.
    Json,
}

/// Transport call as printed in JSON mode.
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ConsoleRecord<'a> {
    Send {
        message: &'a MessageHandle,
        document: &'a Document,
    },
    Edit {
        message: &'a MessageHandle,
        document: &'a Document,
    },
    Delete {
        message: &'a MessageHandle,
    },
    Apply {
        message: &'a MessageHandle,
        symbol: &'a Symbol,
    },
    Clear {
        message: &'a MessageHandle,
    },
}

#[derive(Default)]
struct ConsoleState {
    next_message: u64,
    /// Live messages and the symbols applied to them.
    messages: HashMap<MessageId, Vec<Symbol>>,
}

pub struct ConsoleTransport<W> {
    out: tokio::sync::Mutex<W>,
    format: OutputFormat,
    self_actor: ActorId,
    state: Mutex<ConsoleState>,
}

impl<W> ConsoleTransport<W>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(out: W, format: OutputFormat, self_actor: ActorId) -> Self {
        Self {
            out: tokio::sync::Mutex::new(out),
            format,
            self_actor,
            state: Mutex::new(ConsoleState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ConsoleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_live(&self, message: &MessageHandle) -> Result<(), TransportError> {
        if self.state().messages.contains_key(message.id()) {
            Ok(())
        } else {
            Err(TransportError::NotFound)
        }
    }

    /// Mirror an input event into the console's own bookkeeping, so a
    /// stripped marker can be re-applied and a deleted message is gone.
    pub fn observe(&self, event: &TransportEvent) {
        let mut state = self.state();
        match event {
            TransportEvent::ReactionRemoved { symbol, actor, .. } if *actor == self.self_actor => {
                if let Some(symbols) = state.messages.get_mut(event.message()) {
                    symbols.retain(|s| s != symbol);
                }
            }
            TransportEvent::MessageDeleted { message } => {
                state.messages.remove(message);
            }
            _ => {}
        }
    }

    async fn emit(&self, record: ConsoleRecord<'_>) -> Result<(), TransportError> {
        let text = match self.format {
            OutputFormat::Text => format_text(&record),
            OutputFormat::Json => {
                let mut line = serde_json::to_string(&record)
                    .map_err(|e| TransportError::Rejected(e.to_string()))?;
                line.push('\n');
                line
            }
        };
        let mut out = self.out.lock().await;
        out.write_all(text.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<W> Transport for ConsoleTransport<W>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    async fn send_message(
        &self,
        channel: &ChannelId,
        document: &Document,
    ) -> Result<Vec<MessageHandle>, TransportError> {
        let parts = split_document(document);
        let handles: Vec<MessageHandle> = {
            let mut state = self.state();
            parts
                .iter()
                .map(|_| {
                    state.next_message += 1;
                    let id = MessageId::from(format!("m{}", state.next_message));
                    state.messages.insert(id.clone(), Vec::new());
                    MessageHandle::new(channel.clone(), id)
                })
                .collect()
        };
        for (handle, part) in handles.iter().zip(&parts) {
            self.emit(ConsoleRecord::Send {
                message: handle,
                document: part,
            })
            .await?;
        }
        Ok(handles)
    }

    async fn edit_message(
        &self,
        message: &MessageHandle,
        document: &Document,
    ) -> Result<(), TransportError> {
        self.ensure_live(message)?;
        self.emit(ConsoleRecord::Edit { message, document }).await
    }

    async fn delete_message(&self, message: &MessageHandle) -> Result<(), TransportError> {
        if self.state().messages.remove(message.id()).is_none() {
            return Err(TransportError::NotFound);
        }
        self.emit(ConsoleRecord::Delete { message }).await
    }

    async fn apply_symbol(
        &self,
        message: &MessageHandle,
        symbol: &Symbol,
    ) -> Result<(), TransportError> {
        {
            let mut state = self.state();
            let symbols = state
                .messages
                .get_mut(message.id())
                .ok_or(TransportError::NotFound)?;
            if symbols.contains(symbol) {
                return Ok(());
            }
            symbols.push(symbol.clone());
        }
        self.emit(ConsoleRecord::Apply { message, symbol }).await
    }

    async fn clear_symbols(&self, message: &MessageHandle) -> Result<(), TransportError> {
        {
            let mut state = self.state();
            let symbols = state
                .messages
                .get_mut(message.id())
                .ok_or(TransportError::NotFound)?;
            symbols.clear();
        }
        self.emit(ConsoleRecord::Clear { message }).await
    }

    fn self_actor(&self) -> ActorId {
        self.self_actor.clone()
    }
}

/// Break a document with many fields into a head message and field-only
/// continuation messages.
fn split_document(document: &Document) -> Vec<Document> {
    if document.fields.len() <= MAX_FIELDS_PER_MESSAGE {
        return vec![document.clone()];
    }
    let mut chunks = document.fields.chunks(MAX_FIELDS_PER_MESSAGE);
    let mut head = document.clone();
    head.fields = chunks.next().map(<[_]>::to_vec).unwrap_or_default();
    let mut parts = vec![head];
    parts.extend(chunks.map(|fields| Document {
        fields: fields.to_vec(),
        ..Document::new()
    }));
    parts
}

fn format_text(record: &ConsoleRecord<'_>) -> String {
    match record {
        ConsoleRecord::Send { message, document } => format_document("posted", message, document),
        ConsoleRecord::Edit { message, document } => format_document("edited", message, document),
        ConsoleRecord::Delete { message } => format!("[{message}] deleted\n"),
        ConsoleRecord::Apply { message, symbol } => format!("[{message}] + {symbol}\n"),
        ConsoleRecord::Clear { message } => format!("[{message}] symbols cleared\n"),
    }
}

fn format_document(verb: &str, message: &MessageHandle, document: &Document) -> String {
    let mut out = format!("--- [{message}] {verb} ---\n");
    if let Some(author) = &document.author {
        let _ = writeln!(out, "{}", author.name);
    }
    if let Some(title) = &document.title {
        let _ = writeln!(out, "# {title}");
    }
    if let Some(description) = &document.description {
        let _ = writeln!(out, "{description}");
    }
    for field in &document.fields {
        let marker = if field.inline { "·" } else { "•" };
        let _ = writeln!(out, "{marker} {}: {}", field.name, field.value);
    }
    if let Some(url) = &document.url {
        let _ = writeln!(out, "<{url}>");
    }
    match (&document.footer, document.timestamp) {
        (Some(footer), Some(ts)) => {
            let _ = writeln!(out, "{} | {}", footer.text, ts.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        (Some(footer), None) => {
            let _ = writeln!(out, "{}", footer.text);
        }
        (None, Some(ts)) => {
            let _ = writeln!(out, "{}", ts.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        (None, None) => {}
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing {0}")]
    MissingArgument(&'static str),
    #[error("unexpected trailing input: {0}")]
    Trailing(String),
}

/// Parse one console line into a transport event.
///
/// Blank lines and `#` comments yield `Ok(None)`. The actor defaults to
/// `default_actor` when omitted.
pub fn parse_line(line: &str, default_actor: &ActorId) -> Result<Option<TransportEvent>, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default();

    let event = match command {
        "react" | "unreact" => {
            let message = MessageId::from(words.next().ok_or(ParseError::MissingArgument("message"))?);
            let symbol = Symbol::parse(words.next().ok_or(ParseError::MissingArgument("symbol"))?);
            let actor = words.next().map_or_else(|| default_actor.clone(), ActorId::from);
            if command == "react" {
                TransportEvent::ReactionAdded {
                    message,
                    symbol,
                    actor,
                }
            } else {
                TransportEvent::ReactionRemoved {
                    message,
                    symbol,
                    actor,
                }
            }
        }
        "delete" => TransportEvent::MessageDeleted {
            message: MessageId::from(words.next().ok_or(ParseError::MissingArgument("message"))?),
        },
        other => return Err(ParseError::UnknownCommand(other.to_owned())),
    };

    let rest: Vec<&str> = words.collect();
    if !rest.is_empty() {
        return Err(ParseError::Trailing(rest.join(" ")));
    }
    Ok(Some(event))
}

/// Feed parsed lines from `reader` into the engine's event channel until
/// EOF or until the engine stops listening. Each event is shown to `console`
/// first.
pub async fn pump_events<R, W>(
    reader: R,
    events: mpsc::Sender<TransportEvent>,
    default_actor: ActorId,
    console: Arc<ConsoleTransport<W>>,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let event = match parse_line(&line, &default_actor) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                warn!(line = %line, error = %e, "console: ignoring input");
                continue;
            }
        };
        debug!(message = %event.message(), ?event, "console: event");
        console.observe(&event);
        if events.send(event).await.is_err() {
            debug!("console: engine stopped, no longer reading input");
            break;
        }
    }
    Ok(())
}
