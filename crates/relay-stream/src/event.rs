//! Application events and their wire encoding.

use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::Result;

/// Connection-established marker for Server-Sent Events.
const SSE_CONNECTION_ACK: &[u8] = b":ok\n\n";

/// Keepalive comment frame for Server-Sent Events.
const SSE_KEEPALIVE: &[u8] = b":heartbeat\n\n";

/// Keepalive frame for raw streams.
const RAW_KEEPALIVE: &[u8] = b"\n";

/// Encoding applied to events and control frames before they reach the sink.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display)]
#[cfg_attr(feature = "config", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WireFormat {
    /// `text/event-stream` framing: one `data:` block per event.
    #[default]
    Sse,
    /// Payload bytes are passed through without any delimiters.
    Raw,
}

impl WireFormat {
    /// Returns the marker written once when the stream is established.
    #[must_use]
    pub fn connection_ack(self) -> Option<Bytes> {
        match self {
            Self::Sse => Some(Bytes::from_static(SSE_CONNECTION_ACK)),
            Self::Raw => None,
        }
    }

    /// Returns the no-op frame used to keep idle connections open.
    #[must_use]
    pub fn keepalive(self) -> Bytes {
        match self {
            Self::Sse => Bytes::from_static(SSE_KEEPALIVE),
            Self::Raw => Bytes::from_static(RAW_KEEPALIVE),
        }
    }

    /// Returns the `Content-Type` header value matching this encoding.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Sse => "text/event-stream",
            Self::Raw => "text/plain; charset=utf-8",
        }
    }
}

/// Event payload: either text passed through as-is or a JSON document.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Textual payload, written without further serialization.
    Text(String),
    /// Structured payload, serialized to compact JSON on encode.
    Json(serde_json::Value),
}

impl Payload {
    fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text),
            Self::Json(value) => Cow::Owned(value.to_string()),
        }
    }
}

/// One application event handed to a stream session.
#[derive(Debug, Clone, PartialEq)]
#[must_use = "events do nothing unless written to a stream"]
pub struct Event {
    name: Option<Cow<'static, str>>,
    payload: Payload,
}

impl Event {
    /// Creates a textual event.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            name: None,
            payload: Payload::Text(text.into()),
        }
    }

    /// Creates a structured event from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if `value` cannot be represented as JSON.
    pub fn json<T>(value: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value)?;
        Ok(Self::from(value))
    }

    /// Sets the event name (the SSE `event:` field).
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the event name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the event payload.
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Appends the wire representation of this event to `out`.
    pub fn encode(&self, format: WireFormat, out: &mut BytesMut) {
        let data = self.payload.as_text();

        match format {
            WireFormat::Raw => out.put_slice(data.as_bytes()),
            WireFormat::Sse => {
                if let Some(name) = self.name() {
                    out.put_slice(b"event: ");
                    let name = name.split(['\r', '\n']).next().unwrap_or_default();
                    out.put_slice(name.as_bytes());
                    out.put_u8(b'\n');
                }

                // Every payload line needs its own field, otherwise the client
                // would treat the line break as the end of the field value.
                // CRLF, LF and a bare CR all end a line.
                let data = if data.contains('\r') {
                    Cow::Owned(data.replace("\r\n", "\n").replace('\r', "\n"))
                } else {
                    Cow::Borrowed(&*data)
                };

                for line in data.split('\n') {
                    out.put_slice(b"data: ");
                    out.put_slice(line.as_bytes());
                    out.put_u8(b'\n');
                }

                out.put_u8(b'\n');
            }
        }
    }

    /// Returns the wire representation of this event as a standalone frame.
    #[must_use]
    pub fn to_bytes(&self, format: WireFormat) -> Bytes {
        let mut out = BytesMut::new();
        self.encode(format, &mut out);
        out.freeze()
    }
}

impl From<String> for Event {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

impl From<&String> for Event {
    fn from(text: &String) -> Self {
        Self::text(text.as_str())
    }
}

impl From<&str> for Event {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<serde_json::Value> for Event {
    fn from(value: serde_json::Value) -> Self {
        Self {
            name: None,
            payload: Payload::Json(value),
        }
    }
}
