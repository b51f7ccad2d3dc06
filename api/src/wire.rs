//! Boundary decoding of loosely typed backend payloads.
//!
//! Everything pushed over the socket or returned by the REST API passes
//! through here once. Missing or malformed fields are coerced to safe
//! defaults so that one bad record never breaks a live feed.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    consts::UNKNOWN_WALLET,
    state::{ChatMessage, EventType, TradeEvent, WarId},
};

/// Timestamps above this are taken to be milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// The `{data: ...}` wrapper every REST response uses.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// A trade pushed on the shared socket room, tagged with its war.
#[derive(Clone, Debug, PartialEq)]
pub struct GameUpdate {
    pub war_id: WarId,
    pub event: TradeEvent,
}

/// Decode a socket `gameUpdate` payload.
pub fn decode_game_update(payload: &Value, received_at: i64) -> GameUpdate {
    GameUpdate {
        war_id: decode_war_id(payload),
        event: decode_trade(payload, received_at),
    }
}

/// Decode one trade record. `received_at` (epoch seconds) stands in for a
/// missing timestamp.
pub fn decode_trade(payload: &Value, received_at: i64) -> TradeEvent {
    let event_type = match field(payload, &["eventType", "event_type", "type"]) {
        Some(raw) => match raw.as_str().and_then(EventType::from_wire) {
            Some(event_type) => event_type,
            None => {
                tracing::warn!("Unrecognised trade event type {}, treating as deposit", raw);
                EventType::Deposit
            }
        },
        None => {
            tracing::warn!("Trade event without type, treating as deposit");
            EventType::Deposit
        }
    };

    let wallet_address = field(payload, &["walletAddress", "wallet_address", "wallet"])
        .and_then(as_string)
        .filter(|wallet| !wallet.is_empty())
        .unwrap_or_else(|| UNKNOWN_WALLET.to_string());

    TradeEvent {
        event_type,
        mint_address: field(payload, &["mintAddress", "mint_address", "mint"])
            .and_then(as_string)
            .unwrap_or_default(),
        amount: field(payload, &["amount"]).and_then(as_u64).unwrap_or(0),
        amount_in_base_currency: field(payload, &["amountInBaseCurrency", "amount_in_base_currency"])
            .and_then(as_f64),
        wallet_address,
        event_timestamp: field(payload, &["eventTimestamp", "event_timestamp", "timestamp"])
            .and_then(as_epoch_seconds)
            .unwrap_or(received_at),
        transaction_signature: field(
            payload,
            &["transactionSignature", "transaction_signature", "signature"],
        )
        .and_then(as_string)
        .filter(|signature| !signature.is_empty()),
    }
}

/// Decode one chat record, either pushed or listed. `received_at` stands in
/// for a missing send time.
pub fn decode_chat(payload: &Value, received_at: DateTime<Utc>) -> ChatMessage {
    ChatMessage {
        id: field(payload, &["id", "_id"])
            .and_then(as_string)
            .filter(|id| !id.is_empty()),
        sender_address: field(payload, &["senderAddress", "sender_address", "walletAddress"])
            .and_then(as_string)
            .filter(|sender| !sender.is_empty())
            .unwrap_or_else(|| UNKNOWN_WALLET.to_string()),
        body: field(payload, &["body", "message", "content"])
            .and_then(as_string)
            .unwrap_or_default(),
        sent_at: field(payload, &["sentAt", "sent_at", "createdAt"])
            .and_then(as_datetime)
            .unwrap_or(received_at),
        war_id: decode_war_id(payload),
    }
}

fn decode_war_id(payload: &Value) -> WarId {
    field(payload, &["warId", "war_id", "warAddress", "gameId"])
        .and_then(as_string)
        .map(WarId::from)
        .unwrap_or_default()
}

fn field<'a>(payload: &'a Value, names: &[&str]) -> Option<&'a Value> {
    let object = payload.as_object()?;
    names
        .iter()
        .filter_map(|name| object.get(*name))
        .find(|value| !value.is_null())
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64)),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

fn as_epoch_seconds(value: &Value) -> Option<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(s.trim()).ok().map(|t| t.timestamp())),
        _ => None,
    };
    parsed.map(|t| if t > MILLIS_THRESHOLD { t / 1_000 } else { t })
}

fn as_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => match DateTime::parse_from_rfc3339(s.trim()) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(_) => s.trim().parse::<i64>().ok().and_then(from_epoch),
        },
        Value::Number(n) => n.as_i64().and_then(from_epoch),
        _ => None,
    }
}

fn from_epoch(t: i64) -> Option<DateTime<Utc>> {
    if t > MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(t).single()
    } else {
        Utc.timestamp_opt(t, 0).single()
    }
}
