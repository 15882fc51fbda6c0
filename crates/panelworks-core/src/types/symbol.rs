use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A reaction marker a panel tracks on its message.
///
/// Unicode symbols compare by their text. Custom symbols are resources
/// owned by the transport and compare by resource id only, so a renamed
/// custom symbol is still the same symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Symbol {
    Unicode { name: String },
    Custom { id: String, name: String },
}

impl Symbol {
    pub fn unicode(name: impl Into<String>) -> Self {
        Symbol::Unicode { name: name.into() }
    }

    pub fn custom(id: impl Into<String>, name: impl Into<String>) -> Self {
        Symbol::Custom {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Human-readable name, regardless of kind.
    pub fn name(&self) -> &str {
        match self {
            Symbol::Unicode { name } | Symbol::Custom { name, .. } => name,
        }
    }

    /// Parse a textual reference. `<:name:id>` and `name:id` are custom
    /// symbols, anything else is taken as a unicode symbol.
    pub fn parse(s: &str) -> Self {
        let trimmed = s
            .strip_prefix("<:")
            .and_then(|rest| rest.strip_suffix('>'))
            .unwrap_or(s);
        match trimmed.rsplit_once(':') {
            Some((name, id))
                if !name.is_empty() && !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) =>
            {
                Symbol::custom(id, name)
            }
            _ => Symbol::unicode(s),
        }
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Symbol::Unicode { name: a }, Symbol::Unicode { name: b }) => a == b,
            (Symbol::Custom { id: a, .. }, Symbol::Custom { id: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Symbol::Unicode { name } => {
                0u8.hash(state);
                name.hash(state);
            }
            Symbol::Custom { id, .. } => {
                1u8.hash(state);
                id.hash(state);
            }
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Unicode { name } => f.write_str(name),
            Symbol::Custom { id, name } => write!(f, "<:{name}:{id}>"),
        }
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::unicode(s)
    }
}
