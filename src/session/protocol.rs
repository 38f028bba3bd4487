// Control message protocol
// Inbound: flat JSON objects tagged by `type`. Outbound: `{ "type", "data" }`.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::relay::LockToken;

pub const PING: &str = "PING";
pub const LOCK: &str = "AUDIOSTREAMINGSERVICE_LOCK";
pub const UNLOCK: &str = "AUDIOSTREAMINGSERVICE_UNLOCK";

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("Expecting client text message to have a string `type` field")]
    MissingType,
    #[error("Unknown message type `{0}`")]
    UnknownType(String),
    #[error("Invalid `{kind}` message: {source}")]
    Invalid {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "PING")]
    Ping,
    #[serde(rename = "AUDIOSTREAMINGSERVICE_LOCK")]
    Lock,
    #[serde(rename = "AUDIOSTREAMINGSERVICE_UNLOCK")]
    Unlock {
        /// Token echoed back by the client, if it sends one
        #[serde(default, deserialize_with = "deserialize_token")]
        token: Option<LockToken>,
    },
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_string();

        if ![PING, LOCK, UNLOCK].contains(&kind.as_str()) {
            return Err(ProtocolError::UnknownType(kind));
        }

        serde_json::from_value(value).map_err(|source| ProtocolError::Invalid { kind, source })
    }
}

// Clients echo the token either as the number or as the string we sent them
fn deserialize_token<'de, D>(deserializer: D) -> Result<Option<LockToken>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawToken {
        Number(LockToken),
        Text(String),
    }

    match Option::<RawToken>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawToken::Number(token)) => Ok(Some(token)),
        Some(RawToken::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("token `{}` is not an unsigned integer", text))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyKind {
    #[serde(rename = "PONG")]
    Pong,
    #[serde(rename = "AUDIOSTREAMINGSERVICE_LOCKED")]
    Locked,
    #[serde(rename = "AUDIOSTREAMINGSERVICE_UNLOCKED")]
    Unlocked,
    #[serde(rename = "ERROR")]
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerReply {
    #[serde(rename = "type")]
    pub kind: ReplyKind,
    pub data: String,
}

impl ServerReply {
    pub fn pong() -> Self {
        Self {
            kind: ReplyKind::Pong,
            data: "PONG".to_string(),
        }
    }

    /// The issued token travels in `data` so the client can echo it on unlock.
    pub fn locked(token: LockToken) -> Self {
        Self {
            kind: ReplyKind::Locked,
            data: token.to_string(),
        }
    }

    pub fn unlocked() -> Self {
        Self {
            kind: ReplyKind::Unlocked,
            data: "Audio streaming service is unlocked successfully".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Error,
            data: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == ReplyKind::Error
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
