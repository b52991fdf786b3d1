use std::fmt;

use crate::container::ContainerID;

use super::models::WireEvent;

/// Lifecycle transition reported by an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventStatus {
    Start,
    Stop,
    Other(String),
}

impl From<&str> for EventStatus {
    fn from(status: &str) -> Self {
        match status {
            "start" => EventStatus::Start,
            "stop" => EventStatus::Stop,
            other => EventStatus::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventStatus::Start => f.write_str("start"),
            EventStatus::Stop => f.write_str("stop"),
            EventStatus::Other(other) => f.write_str(other),
        }
    }
}

/// A container lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub status: EventStatus,
    pub container_id: ContainerID,
}

impl Event {
    pub fn new(status: EventStatus, container_id: ContainerID) -> Self {
        Self {
            status,
            container_id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed event `{line}`: {source}")]
    Json {
        line: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    ContainerID(#[from] crate::container::Error),
}

/// Decodes a single line of the event feed.
///
/// Returns `Ok(None)` for blank lines, events about other object types (images, networks, ...)
/// and events without a container id. Both the legacy `status`/`id` fields and the current
/// `Action`/`Actor.ID` fields are understood.
pub(super) fn decode_line(line: &[u8]) -> Result<Option<Event>, DecodeError> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let wire: WireEvent = serde_json::from_slice(line).map_err(|source| DecodeError::Json {
        line: String::from_utf8_lossy(line).into_owned(),
        source,
    })?;

    if wire.kind.as_deref().is_some_and(|kind| kind != "container") {
        return Ok(None);
    }
    let Some(status) = wire.status.as_deref().or(wire.action.as_deref()) else {
        return Ok(None);
    };
    let Some(id) = wire
        .id
        .as_deref()
        .or(wire.actor.as_ref().and_then(|actor| actor.id.as_deref()))
    else {
        return Ok(None);
    };

    Ok(Some(Event::new(status.into(), ContainerID::new(id)?)))
}

/// Splits a chunked byte stream into newline terminated lines.
#[derive(Debug, Default)]
pub(super) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Appends `chunk` and returns every line completed by it, without the terminator.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            lines.push(line);
        }
        lines
    }

    /// Returns the unterminated remainder, if any.
    pub fn finish(self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf)
        }
    }
}
