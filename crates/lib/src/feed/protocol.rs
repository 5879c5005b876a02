//! Feed WebSocket protocol: JSON text frames exchanged with the interceptor feed.
//!
//! Client → feed: `{ "kind": 2, "request": "db" }` on connect and
//! `{ "kind": 3, "msgNumber": "<id>", "data": "1" | "0" }` per decision.
//! Feed → client: `{ "msgNumber", "src", "dst", "payload" }` per message, plus bare control
//! frames such as the `{ "kind": 1 }` hello.

use crate::error::ReviewError;
use serde::{Deserialize, Serialize};

/// Feed greeting sent to every client right after the upgrade.
pub const KIND_HELLO: u8 = 1;
/// Client request (only `"db"` is defined: replay pending messages and keep streaming).
pub const KIND_REQUEST: u8 = 2;
/// Client decision on one message.
pub const KIND_RESPONSE: u8 = 3;

/// Subscription request identifying this client as a history subscriber.
pub const SUBSCRIBE_REQUEST: &str = "db";

/// One intercepted message as shown to the operator. `id` is the feed's dedup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub id: u64,
    pub source: String,
    pub destination: String,
    pub payload: String,
}

/// Control frame (`kind`-tagged). Field names follow the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlFrame {
    pub kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
}

/// Wire shape of a feed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub msg_number: MsgNumber,
    pub src: String,
    pub dst: String,
    pub payload: String,
}

/// Feeds emit the number either as a JSON integer or as a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MsgNumber {
    Int(u64),
    Text(String),
}

impl MsgNumber {
    fn to_id(&self) -> Result<u64, ReviewError> {
        match self {
            MsgNumber::Int(n) => Ok(*n),
            MsgNumber::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| ReviewError::Parse(format!("msgNumber {:?} is not a number", s))),
        }
    }
}

impl From<&InboundMessage> for WireMessage {
    fn from(msg: &InboundMessage) -> Self {
        Self {
            msg_number: MsgNumber::Int(msg.id),
            src: msg.source.clone(),
            dst: msg.destination.clone(),
            payload: msg.payload.clone(),
        }
    }
}

/// A decoded feed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFrame {
    Message(InboundMessage),
    Control(ControlFrame),
}

/// Classify and decode one feed frame. Objects with a `kind` and no `msgNumber` are control
/// frames; everything else must be a message.
pub fn decode_frame(text: &str) -> Result<FeedFrame, ReviewError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ReviewError::Parse(e.to_string()))?;
    if value.get("msgNumber").is_none() && value.get("kind").is_some() {
        let control: ControlFrame =
            serde_json::from_value(value).map_err(|e| ReviewError::Parse(e.to_string()))?;
        return Ok(FeedFrame::Control(control));
    }
    message_from_value(value).map(FeedFrame::Message)
}

/// Decode a feed message frame.
pub fn decode_inbound(text: &str) -> Result<InboundMessage, ReviewError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ReviewError::Parse(e.to_string()))?;
    message_from_value(value)
}

fn message_from_value(value: serde_json::Value) -> Result<InboundMessage, ReviewError> {
    let wire: WireMessage =
        serde_json::from_value(value).map_err(|e| ReviewError::Parse(e.to_string()))?;
    Ok(InboundMessage {
        id: wire.msg_number.to_id()?,
        source: wire.src,
        destination: wire.dst,
        payload: wire.payload,
    })
}

fn to_frame<T: Serialize>(value: &T) -> Result<String, ReviewError> {
    serde_json::to_string(value).map_err(|e| ReviewError::Encode(e.to_string()))
}

/// Encode an operator decision. Booleans travel as the strings `"1"` / `"0"`.
pub fn encode_decision(message_id: u64, approved: bool) -> Result<String, ReviewError> {
    let frame = ControlFrame {
        kind: KIND_RESPONSE,
        msg_number: Some(message_id.to_string()),
        data: Some(if approved { "1" } else { "0" }.to_string()),
        request: None,
    };
    to_frame(&frame)
}

/// Subscription request sent once the connection opens.
pub fn encode_subscribe() -> Result<String, ReviewError> {
    let frame = ControlFrame {
        kind: KIND_REQUEST,
        request: Some(SUBSCRIBE_REQUEST.to_string()),
        ..Default::default()
    };
    to_frame(&frame)
}

/// Feed greeting.
pub fn encode_hello() -> Result<String, ReviewError> {
    let frame = ControlFrame {
        kind: KIND_HELLO,
        ..Default::default()
    };
    to_frame(&frame)
}

/// Encode a message the way the feed sends it.
pub fn encode_inbound(msg: &InboundMessage) -> Result<String, ReviewError> {
    to_frame(&WireMessage::from(msg))
}
