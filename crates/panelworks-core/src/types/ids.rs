use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity assigned to a panel when it is added to the engine.
/// Immutable for the panel's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PanelId(pub u64);

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panel-{}", self.0)
    }
}

/// Transport-assigned message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

/// Transport channel a panel message is posted to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

/// A user (or bot) that interacts with panel messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

macro_rules! string_id {
    ($($ty:ident),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $ty {
                fn from(s: &str) -> Self {
                    Self(s.to_owned())
                }
            }

            impl From<String> for $ty {
                fn from(s: String) -> Self {
                    Self(s)
                }
            }
        )*
    };
}

string_id!(MessageId, ChannelId, ActorId);

/// Handle to the transport message backing a panel.
///
/// Borrowed from the transport: the engine uses it for edit/delete/react
/// calls but never owns the message's lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    pub channel: ChannelId,
    pub message: MessageId,
}

impl MessageHandle {
    pub fn new(channel: impl Into<ChannelId>, message: impl Into<MessageId>) -> Self {
        Self {
            channel: channel.into(),
            message: message.into(),
        }
    }

    pub fn id(&self) -> &MessageId {
        &self.message
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel, self.message)
    }
}
