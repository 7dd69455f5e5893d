use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix marking locally generated ids of optimistic messages.
pub const TEMP_ID_PREFIX: &str = "temp-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Video => "video",
        }
    }

    // Unknown kinds from the server are rendered as text
    pub fn parse(kind: &str) -> Self {
        match kind {
            "image" => MessageKind::Image,
            "video" => MessageKind::Video,
            _ => MessageKind::Text,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Sending, // Optimistic entry, waiting for the server echo
    Sent,    // Confirmed by the server
    Read,    // Read receipt seen
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_username: Option<String>,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub view_once: bool,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    pub delivery_status: DeliveryStatus,
}

impl Message {
    pub fn is_optimistic(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }
}

/// Content of a message the local user is about to send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub kind: MessageKind,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub view_once: bool,
}

impl Draft {
    pub fn text(content: impl Into<String>) -> Self {
        Draft {
            kind: MessageKind::Text,
            content: Some(content.into()),
            media_url: None,
            view_once: false,
        }
    }

    pub fn media(kind: MessageKind, media_url: impl Into<String>, view_once: bool) -> Self {
        Draft {
            kind,
            content: None,
            media_url: Some(media_url.into()),
            view_once,
        }
    }
}

/// Typing flag of one remote participant in one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingState {
    pub room_id: String,
    pub participant_id: String,
    pub typing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn parse(kind: &str) -> Self {
        if kind.eq_ignore_ascii_case("video") {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoryItem {
    pub id: String,
    pub owner_id: String,
    pub owner_username: Option<String>,
    pub media_url: String,
    pub media_kind: MediaKind,
    pub caption: Option<String>,
    pub viewed: bool,
    pub liked: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub from_username: Option<String>,
    pub story_id: Option<String>,
    pub message: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub is_following: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FollowStatus {
    pub is_following: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LikeStatus {
    pub is_liked: bool,
    pub like_count: i32,
}
