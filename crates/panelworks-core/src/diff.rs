//! Structural comparison of rendered documents.
//!
//! The scheduler only commits a render when the new document differs from
//! the last committed one; everything here is pure.

use crate::types::Document;

/// A display field of a [`Document`] that can differ between renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentField {
    Title,
    Description,
    Author,
    Color,
    Footer,
    Image,
    Thumbnail,
    Url,
    Timestamp,
    FieldCount,
    /// Field at the given position differs (name, value or inline flag).
    Field(usize),
}

/// True iff every display field is equal and the field lists match
/// element-wise in order.
pub fn equal(a: &Document, b: &Document) -> bool {
    a.title == b.title
        && a.description == b.description
        && a.author == b.author
        && a.color == b.color
        && a.footer == b.footer
        && a.image == b.image
        && a.thumbnail == b.thumbnail
        && a.url == b.url
        && a.timestamp == b.timestamp
        && a.fields.len() == b.fields.len()
        && a.fields.iter().zip(&b.fields).all(|(x, y)| x == y)
}

/// List the fields that differ between `a` and `b`.
///
/// When the field lists have different lengths only `FieldCount` is
/// reported for them; positional differences are reported otherwise.
pub fn changed_fields(a: &Document, b: &Document) -> Vec<DocumentField> {
    let mut changed = Vec::new();
    if a.title != b.title {
        changed.push(DocumentField::Title);
    }
    if a.description != b.description {
        changed.push(DocumentField::Description);
    }
    if a.author != b.author {
        changed.push(DocumentField::Author);
    }
    if a.color != b.color {
        changed.push(DocumentField::Color);
    }
    if a.footer != b.footer {
        changed.push(DocumentField::Footer);
    }
    if a.image != b.image {
        changed.push(DocumentField::Image);
    }
    if a.thumbnail != b.thumbnail {
        changed.push(DocumentField::Thumbnail);
    }
    if a.url != b.url {
        changed.push(DocumentField::Url);
    }
    if a.timestamp != b.timestamp {
        changed.push(DocumentField::Timestamp);
    }

    if a.fields.len() != b.fields.len() {
        changed.push(DocumentField::FieldCount);
    } else {
        changed.extend(
            a.fields
                .iter()
                .zip(&b.fields)
                .enumerate()
                .filter(|(_, (x, y))| x != y)
                .map(|(i, _)| DocumentField::Field(i)),
        );
    }
    changed
}

/// Whether `next` must be committed given the last committed document.
/// Nothing committed yet always counts as changed.
pub fn needs_commit(last: Option<&Document>, next: &Document) -> bool {
    last.is_none_or(|last| !equal(last, next))
}
