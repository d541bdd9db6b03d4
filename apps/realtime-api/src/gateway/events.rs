//! Live update events and their server → client wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// What happened to the subject of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CommentCreated,
    CommentUpdated,
    CommentDeleted,
    FileUpdated,
    FileDeleted,
}

impl EventKind {
    /// Deletion events carry no payload.
    pub fn is_deletion(self) -> bool {
        matches!(self, EventKind::CommentDeleted | EventKind::FileDeleted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::CommentCreated => "comment_created",
            EventKind::CommentUpdated => "comment_updated",
            EventKind::CommentDeleted => "comment_deleted",
            EventKind::FileUpdated => "file_updated",
            EventKind::FileDeleted => "file_deleted",
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// An event published to every connection watching `topic`.
///
/// Fields are private so an event cannot change once it has been handed to
/// [`Hub::publish`](super::hub::Hub::publish).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "EventFields")]
pub struct Event {
    #[serde(rename = "type")]
    kind: EventKind,
    topic: String,
    subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// Wire shape of an incoming event, funneled through [`Event::new`].
#[derive(Deserialize)]
struct EventFields {
    #[serde(rename = "type")]
    kind: EventKind,
    topic: String,
    subject_id: String,
    #[serde(default)]
    data: Option<Value>,
}

impl From<EventFields> for Event {
    fn from(f: EventFields) -> Self {
        Event::new(f.kind, f.topic, f.subject_id, f.data)
    }
}

impl Event {
    /// Build an event. `data` is discarded for deletion kinds.
    pub fn new(
        kind: EventKind,
        topic: impl Into<String>,
        subject_id: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self {
            kind,
            topic: topic.into(),
            subject_id: subject_id.into(),
            data: if kind.is_deletion() { None } else { data },
        }
    }

    pub fn comment_created(file_id: &str, comment_id: &str, comment: Value) -> Self {
        Self::new(EventKind::CommentCreated, file_id, comment_id, Some(comment))
    }

    pub fn comment_updated(file_id: &str, comment_id: &str, comment: Value) -> Self {
        Self::new(EventKind::CommentUpdated, file_id, comment_id, Some(comment))
    }

    pub fn comment_deleted(file_id: &str, comment_id: &str) -> Self {
        Self::new(EventKind::CommentDeleted, file_id, comment_id, None)
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }
}
