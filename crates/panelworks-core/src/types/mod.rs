mod document;
mod ids;
mod symbol;

pub use document::{Author, Document, ERROR_COLOR, Field, Footer};
pub use ids::{ActorId, ChannelId, MessageHandle, MessageId, PanelId};
pub use symbol::Symbol;
