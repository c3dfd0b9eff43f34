// src/message.rs

use google_gmail1::api;
use time::OffsetDateTime;

/// Opaque handle used to fetch one attachment's bytes from its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub message_id: String,
    pub attachment_id: String,
}

/// A part without children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafPart {
    pub mime_type: Option<String>,
    pub filename: Option<String>,
    pub attachment: Option<AttachmentRef>,
    pub size: Option<i32>,
}

/// One node of a message's MIME tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePart {
    Container {
        mime_type: Option<String>,
        parts: Vec<MessagePart>,
    },
    Leaf(LeafPart),
}

/// A message as fetched from a source, ready for extraction.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    pub id: String,
    /// When the source received the message; used only to rename on collision.
    pub received: OffsetDateTime,
    pub root: MessagePart,
}

impl MessagePart {
    #[cfg(test)]
    pub fn leaf(filename: Option<&str>, attachment: Option<AttachmentRef>) -> Self {
        MessagePart::Leaf(LeafPart {
            filename: filename.map(str::to_string),
            attachment,
            ..LeafPart::default()
        })
    }

    #[cfg(test)]
    pub fn container(parts: Vec<MessagePart>) -> Self {
        MessagePart::Container {
            mime_type: None,
            parts,
        }
    }

    /// Children of this part; empty for leaves.
    pub fn children(&self) -> &[MessagePart] {
        match self {
            MessagePart::Container { parts, .. } => parts,
            MessagePart::Leaf(_) => &[],
        }
    }

    pub fn filename(&self) -> Option<&str> {
        match self {
            MessagePart::Leaf(leaf) => leaf.filename.as_deref(),
            MessagePart::Container { .. } => None,
        }
    }

    pub fn attachment(&self) -> Option<&AttachmentRef> {
        match self {
            MessagePart::Leaf(leaf) => leaf.attachment.as_ref(),
            MessagePart::Container { .. } => None,
        }
    }

    /// Size the source reported for the body, if any.
    pub fn size(&self) -> Option<i32> {
        match self {
            MessagePart::Leaf(leaf) => leaf.size,
            MessagePart::Container { .. } => None,
        }
    }

    pub fn mime_type(&self) -> Option<&str> {
        match self {
            MessagePart::Leaf(leaf) => leaf.mime_type.as_deref(),
            MessagePart::Container { mime_type, .. } => mime_type.as_deref(),
        }
    }

    /// Build the typed tree from a Gmail payload.
    ///
    /// Gmail only hands out an `attachmentId` for parts whose body was not
    /// inlined, so inline bodies (text/plain, text/html) become leaves with no
    /// reference and are dropped by [`is_attachment`].
    pub fn from_gmail(message_id: &str, part: &api::MessagePart) -> Self {
        match part.parts.as_deref() {
            Some(children) if !children.is_empty() => MessagePart::Container {
                mime_type: part.mime_type.clone(),
                parts: children
                    .iter()
                    .map(|child| MessagePart::from_gmail(message_id, child))
                    .collect(),
            },
            _ => {
                let body = part.body.as_ref();
                MessagePart::Leaf(LeafPart {
                    mime_type: part.mime_type.clone(),
                    filename: part.filename.clone(),
                    attachment: body.and_then(|b| b.attachment_id.clone()).map(|id| {
                        AttachmentRef {
                            message_id: message_id.to_string(),
                            attachment_id: id,
                        }
                    }),
                    size: body.and_then(|b| b.size),
                })
            }
        }
    }
}

/// Depth-first iterator over the leaves of a MIME tree.
pub struct Leaves<'a> {
    stack: Vec<&'a MessagePart>,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = &'a MessagePart;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(part) = self.stack.pop() {
            let children = part.children();
            if children.is_empty() {
                return Some(part);
            }
            // reversed so the leftmost child is popped first
            self.stack.extend(children.iter().rev());
        }
        None
    }
}

/// Every leaf reachable from `root`, in document order.
///
/// A root without children yields itself.
pub fn flatten_parts(root: &MessagePart) -> Leaves<'_> {
    Leaves { stack: vec![root] }
}

/// A leaf with a non-empty filename and something to fetch.
pub fn is_attachment(part: &MessagePart) -> bool {
    part.filename().is_some_and(|name| !name.is_empty()) && part.attachment().is_some()
}
