// Real-time wire events and the transport seam
// Server events are JSON objects discriminated by `type`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::MessageRecord;
use crate::error::{ClientError, ClientResult};
use crate::models::{Draft, MessageKind};

pub mod transport;
pub mod ws;

pub use transport::{Link, Transport};
pub use ws::WebSocketTransport;

/// Events pushed by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(alias = "message")]
    NewMessage(MessageRecord),
    #[serde(alias = "typing")]
    UserTyping {
        chat_room_id: String,
        user_id: String,
        #[serde(default)]
        username: Option<String>,
    },
    UserStoppedTyping {
        chat_room_id: String,
        user_id: String,
    },
    MessageRead {
        message_id: String,
        user_id: String,
    },
    MessageViewed {
        message_id: String,
        user_id: String,
    },
    MessageExpired {
        message_id: String,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    /// Room the event is scoped to, for events that carry one.
    pub fn room_id(&self) -> Option<&str> {
        match self {
            ServerEvent::NewMessage(record) => Some(&record.chat_room_id),
            ServerEvent::UserTyping { chat_room_id, .. } => Some(chat_room_id),
            ServerEvent::UserStoppedTyping { chat_room_id, .. } => Some(chat_room_id),
            _ => None,
        }
    }
}

/// Frames we push to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Persist and broadcast a message; the server echoes it back as `new_message`.
    SendMessage {
        chat_room_id: String,
        content: Option<String>,
        message_type: MessageKind,
        media_url: Option<String>,
        view_once: bool,
    },
    TypingStart { chat_room_id: String },
    TypingStop { chat_room_id: String },
    MarkRead { message_id: String },
    MarkViewed { message_id: String },
}

impl ClientFrame {
    pub fn send_message(chat_room_id: &str, draft: &Draft) -> Self {
        ClientFrame::SendMessage {
            chat_room_id: chat_room_id.to_string(),
            content: draft.content.clone(),
            message_type: draft.kind,
            media_url: draft.media_url.clone(),
            view_once: draft.view_once,
        }
    }

    pub fn encode(&self) -> ClientResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Decode one inbound frame. Accepts the flat shape
/// `{"type":"user_typing","chat_room_id":..}` and the enveloped shape
/// `{"type":"user_typing","payload":{"chat_room_id":..}}`.
pub fn decode_event(raw: &str) -> ClientResult<ServerEvent> {
    let mut value: Value = serde_json::from_str(raw)?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| ClientError::Decode("frame is not a JSON object".to_string()))?;

    if let Some(Value::Object(payload)) = object.remove("payload") {
        for (key, field) in payload {
            if key != "type" {
                object.insert(key, field);
            }
        }
    }

    Ok(serde_json::from_value(value)?)
}
