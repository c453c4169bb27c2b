//! Document model shared by the sync engine and the stores.
//!
//! The server owns documents. Clients hold a cached copy plus an editable
//! draft, and write back by replacing the whole body in one `PUT`.
//!
//! ## JSON shape
//!
//! ```json
//! {
//!   "id": "doc-1",
//!   "title": "Q3 Outlook",
//!   "body": [
//!     { "type": "text", "id": "0190…", "value": "<p>…</p>" },
//!     { "type": "attachment", "id": "0190…", "reference": "att-7",
//!       "filename": "chart.png", "contentType": "image/png",
//!       "url": "https://…/att-7" }
//!   ],
//!   "pinned": false,
//!   "revision": "2024-05-01T10:00:00.123Z",
//!   "createdAt": "…",
//!   "updatedAt": "…"
//! }
//! ```

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(SmolStr);

        impl $name {
            pub fn new(value: impl AsRef<str>) -> Self {
                Self(SmolStr::new(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(SmolStr::from(value))
            }
        }
    };
}

string_id!(
    /// Opaque document identifier.
    DocumentId
);

string_id!(
    /// Server-assigned revision marker.
    ///
    /// Only ever compared for equality. It may look like a timestamp but it is
    /// never parsed or ordered.
    Revision
);

string_id!(
    /// Identifier of a block within a document body.
    BlockId
);

string_id!(
    /// Identifier the attachment store assigns to an uploaded file.
    AttachmentId
);

impl BlockId {
    /// Fresh time-ordered block id.
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::now_v7().to_string())
    }
}

/// The primary content payload. A document has exactly one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBlock {
    pub id: BlockId,
    pub value: String,
}

/// An embedded binary attachment (image, export, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentBlock {
    pub id: BlockId,
    /// Attachment store id.
    pub reference: AttachmentId,
    pub filename: String,
    pub content_type: String,
    /// Resolvable URL, present once the server has confirmed the upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A typed content unit. Order matters for display only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Block {
    Text(TextBlock),
    Attachment(AttachmentBlock),
}

impl Block {
    pub fn id(&self) -> &BlockId {
        match self {
            Block::Text(text) => &text.id,
            Block::Attachment(attachment) => &attachment.id,
        }
    }

    pub fn as_text(&self) -> Option<&TextBlock> {
        match self {
            Block::Text(text) => Some(text),
            Block::Attachment(_) => None,
        }
    }

    pub fn as_attachment(&self) -> Option<&AttachmentBlock> {
        match self {
            Block::Attachment(attachment) => Some(attachment),
            Block::Text(_) => None,
        }
    }
}

/// A server document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    #[serde(default)]
    pub body: Vec<Block>,
    #[serde(default)]
    pub pinned: bool,
    pub revision: Revision,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Empty scaffold as created server-side: default title and a single empty
    /// text block.
    pub fn scaffold(id: DocumentId, revision: Revision, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: String::new(),
            body: vec![Block::Text(TextBlock {
                id: BlockId::generate(),
                value: String::new(),
            })],
            pinned: false,
            revision,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn text_block(&self) -> Option<&TextBlock> {
        self.body.iter().find_map(Block::as_text)
    }

    /// Flattened primary content: the text block's value, empty if the body
    /// has none.
    pub fn content(&self) -> &str {
        self.text_block().map(|t| t.value.as_str()).unwrap_or_default()
    }

    pub fn attachments(&self) -> impl Iterator<Item = &AttachmentBlock> {
        self.body.iter().filter_map(Block::as_attachment)
    }
}

/// Body of a replace-document write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    pub title: String,
    pub body: Vec<Block>,
    pub pinned: bool,
}

/// A file to attach to a document.
#[derive(Clone, Debug)]
pub struct AttachmentUpload {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

impl AttachmentUpload {
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data,
        }
    }
}

/// What the attachment store returns for a confirmed upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDescriptor {
    pub id: AttachmentId,
    pub url: String,
    pub filename: String,
    pub content_type: String,
    /// Document revision produced by attaching the file, when the store
    /// reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,
}

impl AttachmentDescriptor {
    /// Confirmed block for this attachment, keeping the given block id.
    pub fn to_block(&self, id: BlockId) -> AttachmentBlock {
        AttachmentBlock {
            id,
            reference: self.id.clone(),
            filename: self.filename.clone(),
            content_type: self.content_type.clone(),
            url: Some(self.url.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        let now = Utc::now();
        Document {
            id: "doc-1".into(),
            title: "Q3 Outlook".into(),
            body: vec![
                Block::Attachment(AttachmentBlock {
                    id: "b-att".into(),
                    reference: "att-1".into(),
                    filename: "chart.png".into(),
                    content_type: "image/png".into(),
                    url: Some("https://files.example/att-1".into()),
                }),
                Block::Text(TextBlock {
                    id: "b-text".into(),
                    value: "<p>hello</p>".into(),
                }),
            ],
            pinned: true,
            revision: "r7".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_content_is_text_block_value() {
        assert_eq!(sample().content(), "<p>hello</p>");
    }

    #[test]
    fn test_content_empty_without_text_block() {
        let mut doc = sample();
        doc.body.retain(|b| b.as_text().is_none());
        assert_eq!(doc.content(), "");
        assert_eq!(doc.attachments().count(), 1);
    }

    #[test]
    fn test_block_json_is_tagged() {
        let json = serde_json::to_value(&sample()).unwrap();
        assert_eq!(json["body"][0]["type"], "attachment");
        assert_eq!(json["body"][0]["contentType"], "image/png");
        assert_eq!(json["body"][1]["type"], "text");
        assert_eq!(json["revision"], "r7");
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_missing_body_defaults_empty() {
        let json = serde_json::json!({
            "id": "doc-2",
            "title": "",
            "revision": "r1",
            "createdAt": "2024-05-01T10:00:00Z",
            "updatedAt": "2024-05-01T10:00:00Z",
        });
        let doc: Document = serde_json::from_value(json).unwrap();
        assert!(doc.body.is_empty());
        assert!(!doc.pinned);
    }

    #[test]
    fn test_generated_block_ids_are_unique() {
        assert_ne!(BlockId::generate(), BlockId::generate());
    }
}
