//! Engine.IO v4 / Socket.IO v5 text packets.
//!
//! Only the subset the game room uses is understood: handshake, heartbeat,
//! namespace connect/disconnect and plain events. Binary attachments and
//! acknowledgements are not used by the backend.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,

    #[error("unknown packet type {0:?}")]
    UnknownType(String),

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("event without a name")]
    MissingEventName,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    Open(Handshake),
    Close,
    Ping,
    Pong,
    Noop,
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, payload: Value },
    ConnectError(Value),
}

impl Packet {
    pub fn event(name: &str, payload: Value) -> Self {
        Packet::Event {
            name: name.to_string(),
            payload,
        }
    }
}

pub fn decode(text: &str) -> Result<Packet, FrameError> {
    let mut chars = text.chars();
    let engine = chars.next().ok_or(FrameError::Empty)?;
    let rest = chars.as_str();
    match engine {
        '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '6' => Ok(Packet::Noop),
        '4' => decode_message(rest),
        other => Err(FrameError::UnknownType(other.to_string())),
    }
}

fn decode_message(text: &str) -> Result<Packet, FrameError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(FrameError::Empty)?;
    let body = strip_namespace(chars.as_str());
    match kind {
        '0' if body.is_empty() => Ok(Packet::Connect(None)),
        '0' => Ok(Packet::Connect(Some(serde_json::from_str(body)?))),
        '1' => Ok(Packet::Disconnect),
        '2' => {
            // An acknowledgement id may precede the array.
            let body = body.trim_start_matches(|c: char| c.is_ascii_digit());
            let mut items: Vec<Value> = serde_json::from_str(body)?;
            if items.is_empty() {
                return Err(FrameError::MissingEventName);
            }
            let name = match items.remove(0) {
                Value::String(name) => name,
                _ => return Err(FrameError::MissingEventName),
            };
            let payload = if items.is_empty() {
                Value::Null
            } else {
                items.remove(0)
            };
            Ok(Packet::Event { name, payload })
        }
        '4' => Ok(Packet::ConnectError(if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(body)?
        })),
        other => Err(FrameError::UnknownType(format!("4{}", other))),
    }
}

fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        match body.find(',') {
            Some(at) => &body[at + 1..],
            None => "",
        }
    } else {
        body
    }
}

pub fn encode(packet: &Packet) -> String {
    match packet {
        Packet::Open(handshake) => format!(
            "0{}",
            serde_json::json!({
                "sid": handshake.sid,
                "pingInterval": handshake.ping_interval,
                "pingTimeout": handshake.ping_timeout,
            })
        ),
        Packet::Close => "1".to_string(),
        Packet::Ping => "2".to_string(),
        Packet::Pong => "3".to_string(),
        Packet::Noop => "6".to_string(),
        Packet::Connect(None) => "40".to_string(),
        Packet::Connect(Some(auth)) => format!("40{}", auth),
        Packet::Disconnect => "41".to_string(),
        Packet::Event { name, payload } => {
            let items = if payload.is_null() {
                Value::Array(vec![Value::String(name.clone())])
            } else {
                Value::Array(vec![Value::String(name.clone()), payload.clone()])
            };
            format!("42{}", items)
        }
        Packet::ConnectError(reason) => format!("44{}", reason),
    }
}
