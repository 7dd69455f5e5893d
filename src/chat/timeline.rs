// Ordered, append-only message list of one room, with optimistic sends

use chrono::Utc;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::api::ApiClient;
use crate::error::ClientResult;
use crate::models::{DeliveryStatus, Draft, Message, TEMP_ID_PREFIX};

/// Handle of an optimistic entry awaiting confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSend {
    pub temp_id: String,
    pub draft: Draft,
}

impl PendingSend {
    /// Whether `echo` (a server record from the same sender) carries this draft.
    pub fn matches(&self, echo: &Message) -> bool {
        echo.kind == self.draft.kind
            && echo.content == self.draft.content
            && echo.media_url == self.draft.media_url
            && echo.view_once == self.draft.view_once
    }
}

/// What `confirm` did with the optimistic entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// Replaced in place by the server record.
    Superseded,
    /// The server record had already arrived on the socket; the temp entry was dropped.
    Deduplicated,
    /// The temp entry was gone (e.g. removed while in flight); nothing changed.
    Missing,
}

#[derive(Debug, Default)]
pub struct MessageTimeline {
    room_id: String,
    messages: Vec<Message>,
}

impl MessageTimeline {
    pub fn new(room_id: impl Into<String>) -> Self {
        MessageTimeline { room_id: room_id.into(), messages: Vec::new() }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn ids(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// One-shot load of the latest `limit` messages. The API returns newest
    /// first; the timeline keeps oldest first. Replaces current contents.
    pub async fn hydrate(&mut self, api: &dyn ApiClient, user_id: &str, limit: u32) -> ClientResult<&[Message]> {
        let mut fetched = api.fetch_messages(user_id, &self.room_id, limit).await?;
        fetched.reverse();

        self.messages.clear();
        for message in fetched {
            if message.room_id != self.room_id {
                warn!("Hydration returned message {} of room {}, skipping", message.id, message.room_id);
                continue;
            }
            self.append(message);
        }
        info!("Hydrated room {} with {} messages", self.room_id, self.messages.len());
        Ok(&self.messages)
    }

    /// Append at the end. Returns false (and changes nothing) for a duplicate id.
    pub fn append(&mut self, message: Message) -> bool {
        if self.contains(&message.id) {
            debug!("Ignoring duplicate message {}", message.id);
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<Message> {
        let index = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(index))
    }

    /// Returns true if the flag changed.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) if !message.read => {
                message.read = true;
                if message.delivery_status == DeliveryStatus::Sent {
                    message.delivery_status = DeliveryStatus::Read;
                }
                true
            }
            _ => false,
        }
    }

    /// Append a provisional record for `draft` under a temporary id.
    pub fn begin_send(&mut self, sender_id: &str, draft: Draft) -> (PendingSend, Message) {
        let temp_id = format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4());
        let provisional = Message {
            id: temp_id.clone(),
            room_id: self.room_id.clone(),
            sender_id: sender_id.to_string(),
            sender_username: None,
            kind: draft.kind,
            content: draft.content.clone(),
            media_url: draft.media_url.clone(),
            view_once: draft.view_once,
            created_at: Utc::now(),
            read: false,
            delivery_status: DeliveryStatus::Sending,
        };
        self.messages.push(provisional.clone());
        (PendingSend { temp_id, draft }, provisional)
    }

    /// Swap the optimistic entry for the server's record.
    pub fn confirm(&mut self, temp_id: &str, confirmed: Message) -> Confirmation {
        let Some(index) = self.messages.iter().position(|m| m.id == temp_id) else {
            debug!("Confirmed send {} no longer in timeline", temp_id);
            return Confirmation::Missing;
        };
        if self.contains(&confirmed.id) {
            self.messages.remove(index);
            return Confirmation::Deduplicated;
        }
        self.messages[index] = confirmed;
        Confirmation::Superseded
    }

    /// Undo a failed send. Returns the removed provisional record.
    pub fn rollback(&mut self, temp_id: &str) -> Option<Message> {
        let removed = self.remove(temp_id);
        if removed.is_some() {
            info!("Rolled back optimistic message {}", temp_id);
        }
        removed
    }
}
