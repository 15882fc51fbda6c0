//! Async engine that keeps reaction-driven panels in sync with their chat
//! messages.

pub mod config;
pub mod console;
pub mod demo;
pub mod engine;
pub mod handle;
pub mod router;
pub mod transport;

#[cfg(test)]
mod testing;
