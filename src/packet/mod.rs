//! Stanza types exchanged with the server.
//!
//! A [`Packet`] is the unit of traffic the dispatch engine moves around. It
//! carries a stable string id used for reply matching and filtering. Packets
//! are immutable once handed to inbound dispatch; outbound interceptors see
//! them mutably before the transport write.

mod filter;

pub use filter::{
    AllOf, AnyOf, FromContains, IdFilter, KindFilter, MessageTypeFilter, Not, PacketFilter,
};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Process-wide packet id counter.
static PACKET_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a packet id unique within this process.
pub fn next_packet_id() -> String {
    format!("pk{:x}", PACKET_COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// Top-level stanza discriminant, used by filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StanzaKind {
    Message,
    Presence,
    Iq,
}

impl fmt::Display for StanzaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StanzaKind::Message => write!(f, "message"),
            StanzaKind::Presence => write!(f, "presence"),
            StanzaKind::Iq => write!(f, "iq"),
        }
    }
}

/// Message sub-type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Normal,
    Chat,
    Groupchat,
    Headline,
    Error,
}

/// Presence sub-type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceType {
    #[default]
    Available,
    Unavailable,
    Subscribe,
    Subscribed,
    Unsubscribe,
    Unsubscribed,
    Error,
}

/// IQ sub-type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IqType {
    Get,
    Set,
    Result,
    Error,
}

/// A chat/normal/groupchat message stanza.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub message_type: MessageType,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub thread: Option<String>,
}

impl Message {
    /// Create a chat message to the given address.
    pub fn chat(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: next_packet_id(),
            from: None,
            to: Some(to.into()),
            message_type: MessageType::Chat,
            subject: None,
            body: Some(body.into()),
            thread: None,
        }
    }
}

/// A presence stanza.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    pub id: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub presence_type: PresenceType,
    pub status: Option<String>,
    pub priority: i8,
}

impl Presence {
    pub fn new(presence_type: PresenceType) -> Self {
        Self {
            id: next_packet_id(),
            from: None,
            to: None,
            presence_type,
            status: None,
            priority: 0,
        }
    }

    /// Initial available presence sent after login.
    pub fn available() -> Self {
        Self::new(PresenceType::Available)
    }

    /// Final presence sent during disconnect.
    pub fn unavailable() -> Self {
        Self::new(PresenceType::Unavailable)
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// An info/query stanza: a request/response pair matched by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iq {
    pub id: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub iq_type: IqType,
    pub payload: IqPayload,
}

impl Iq {
    pub fn get(payload: IqPayload) -> Self {
        Self {
            id: next_packet_id(),
            from: None,
            to: None,
            iq_type: IqType::Get,
            payload,
        }
    }

    pub fn set(payload: IqPayload) -> Self {
        Self {
            id: next_packet_id(),
            from: None,
            to: None,
            iq_type: IqType::Set,
            payload,
        }
    }

    /// Result reply carrying the request's id.
    pub fn result(request_id: impl Into<String>, payload: IqPayload) -> Self {
        Self {
            id: request_id.into(),
            from: None,
            to: None,
            iq_type: IqType::Result,
            payload,
        }
    }

    /// Error reply carrying the request's id and a condition token.
    pub fn error(request_id: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            id: request_id.into(),
            from: None,
            to: None,
            iq_type: IqType::Error,
            payload: IqPayload::Error {
                condition: condition.into(),
                text: None,
            },
        }
    }
}

/// Typed IQ payloads the engine itself understands, plus an escape hatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum IqPayload {
    /// Mechanism discovery (get) or credential submission (set). All fields
    /// optional: an all-empty set request is an anonymous login.
    Auth {
        username: Option<String>,
        password: Option<String>,
        resource: Option<String>,
    },
    /// Successful login result: the full address assigned by the server.
    Bound { jid: String },
    /// Roster query and result.
    Roster { items: Vec<RosterItem> },
    /// Error condition carried by an error-typed IQ.
    Error {
        condition: String,
        text: Option<String>,
    },
    /// Keepalive.
    Ping,
    /// Payloads the engine does not interpret.
    Raw { value: serde_json::Value },
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterItem {
    pub jid: String,
    pub name: Option<String>,
}

/// A unit of protocol traffic exchanged with the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stanza", rename_all = "lowercase")]
pub enum Packet {
    Message(Message),
    Presence(Presence),
    Iq(Iq),
}

impl Packet {
    /// Stable identity used for reply matching and filtering.
    pub fn id(&self) -> &str {
        match self {
            Packet::Message(m) => &m.id,
            Packet::Presence(p) => &p.id,
            Packet::Iq(iq) => &iq.id,
        }
    }

    pub fn kind(&self) -> StanzaKind {
        match self {
            Packet::Message(_) => StanzaKind::Message,
            Packet::Presence(_) => StanzaKind::Presence,
            Packet::Iq(_) => StanzaKind::Iq,
        }
    }

    pub fn from(&self) -> Option<&str> {
        match self {
            Packet::Message(m) => m.from.as_deref(),
            Packet::Presence(p) => p.from.as_deref(),
            Packet::Iq(iq) => iq.from.as_deref(),
        }
    }

    pub fn to(&self) -> Option<&str> {
        match self {
            Packet::Message(m) => m.to.as_deref(),
            Packet::Presence(p) => p.to.as_deref(),
            Packet::Iq(iq) => iq.to.as_deref(),
        }
    }

    pub fn set_from(&mut self, from: impl Into<String>) {
        let from = Some(from.into());
        match self {
            Packet::Message(m) => m.from = from,
            Packet::Presence(p) => p.from = from,
            Packet::Iq(iq) => iq.from = from,
        }
    }
}

impl From<Message> for Packet {
    fn from(message: Message) -> Self {
        Packet::Message(message)
    }
}

impl From<Presence> for Packet {
    fn from(presence: Presence) -> Self {
        Packet::Presence(presence)
    }
}

impl From<Iq> for Packet {
    fn from(iq: Iq) -> Self {
        Packet::Iq(iq)
    }
}
