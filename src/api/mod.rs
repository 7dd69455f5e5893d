// REST collaborator used by the chat and story cores
// The trait is the seam; `http::HttpApiClient` talks to the real backend

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ClientResult;
use crate::models::{
    DeliveryStatus, FollowStatus, LikeStatus, MediaKind, Message, MessageKind, Notification,
    StoryItem, UserSummary,
};

pub mod http;

pub use http::HttpApiClient;

#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Newest first, at most `limit` records.
    async fn fetch_messages(&self, user_id: &str, room_id: &str, limit: u32) -> ClientResult<Vec<Message>>;
    /// REST route for opening a view-once message when no socket is up.
    async fn mark_message_viewed(&self, user_id: &str, message_id: &str) -> ClientResult<()>;

    async fn fetch_story_feed(&self, viewer_id: &str) -> ClientResult<Vec<StoryItem>>;
    async fn mark_story_viewed(&self, story_id: &str, viewer_id: &str) -> ClientResult<()>;
    async fn like_story(&self, story_id: &str, user_id: &str) -> ClientResult<LikeStatus>;
    async fn unlike_story(&self, story_id: &str, user_id: &str) -> ClientResult<LikeStatus>;

    async fn follow(&self, follower_id: &str, target_id: &str) -> ClientResult<FollowStatus>;
    async fn unfollow(&self, follower_id: &str, target_id: &str) -> ClientResult<FollowStatus>;
    async fn search_users(&self, viewer_id: &str, query: &str) -> ClientResult<Vec<UserSummary>>;

    async fn fetch_notifications(&self, user_id: &str) -> ClientResult<Vec<Notification>>;
    async fn mark_notification_read(&self, user_id: &str, notification_id: &str) -> ClientResult<()>;
}

/// Message as the backend serializes it, over REST and the socket alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub chat_room_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub sender_username: Option<String>,
    pub message_type: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub view_once: bool,
    pub created_at: String,
    #[serde(default)]
    pub is_read: bool,
}

impl From<MessageRecord> for Message {
    fn from(r: MessageRecord) -> Self {
        Message {
            created_at: parse_timestamp(&r.created_at),
            delivery_status: if r.is_read { DeliveryStatus::Read } else { DeliveryStatus::Sent },
            id: r.id,
            room_id: r.chat_room_id,
            sender_id: r.sender_id,
            sender_username: r.sender_username,
            kind: MessageKind::parse(&r.message_type),
            content: r.content,
            media_url: r.media_url,
            view_once: r.view_once,
            read: r.is_read,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoryRecord {
    pub id: String,
    pub user_id: String,
    pub media_url: String,
    pub media_type: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub is_viewed: Option<bool>,
    #[serde(default)]
    pub is_liked: Option<bool>,
}

impl From<StoryRecord> for StoryItem {
    fn from(r: StoryRecord) -> Self {
        StoryItem {
            media_kind: MediaKind::parse(&r.media_type),
            id: r.id,
            owner_id: r.user_id,
            owner_username: r.username,
            media_url: r.media_url,
            caption: r.caption,
            viewed: r.is_viewed.unwrap_or(false),
            liked: r.is_liked.unwrap_or(false),
        }
    }
}

/// Accepts RFC 3339 as well as the naive `YYYY-MM-DDTHH:MM:SS[.f]` form the
/// REST endpoints emit (taken as UTC).
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.with_timezone(&Utc);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f") {
        return naive.and_utc();
    }
    debug!("Unparseable timestamp '{}', using now", raw);
    Utc::now()
}
