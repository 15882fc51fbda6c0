//! panelworks-core: the pure half of the panel engine.
//!
//! Data model, the panel contract, document diffing, the dual-indexed
//! registry and render timing. No async and no I/O; the daemon crate owns
//! the transport and the event loop.

pub mod diff;
pub mod event;
pub mod panel;
pub mod registry;
pub mod timing;
pub mod types;
