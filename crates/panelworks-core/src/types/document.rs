use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Color of the error notice.
pub const ERROR_COLOR: u32 = 0xE7_4C_3C;

const ERROR_TITLE: &str = "Panel error";
const ERROR_DESCRIPTION: &str =
    "This panel ran into an error and has stopped responding to reactions.";

/// Display payload a panel renders into its message.
///
/// Equality is structural over every display field (see [`crate::diff`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    pub title: Option<String>,
    pub description: Option<String>,
    pub author: Option<Author>,
    pub color: Option<u32>,
    pub footer: Option<Footer>,
    pub image: Option<String>,
    pub thumbnail: Option<String>,
    pub url: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub icon_url: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footer {
    pub text: String,
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fixed notice that replaces a panel's document when it fails.
    pub fn error_notice() -> Self {
        Self::new()
            .title(ERROR_TITLE)
            .description(ERROR_DESCRIPTION)
            .color(ERROR_COLOR)
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn author(mut self, name: impl Into<String>) -> Self {
        self.author = Some(Author {
            name: name.into(),
            icon_url: None,
            url: None,
        });
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(Footer {
            text: text.into(),
            icon_url: None,
        });
        self
    }

    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(url.into());
        self
    }

    pub fn thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail = Some(url.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at);
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(Field {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        crate::diff::equal(self, other)
    }
}

impl Eq for Document {}
