// Common test utilities for integration tests
// In-memory doubles for the API, transport and session store

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{info, LevelFilter};
use tokio::sync::mpsc;

use glimpse::api::ApiClient;
use glimpse::error::{ClientError, ClientResult};
use glimpse::models::{
    DeliveryStatus, FollowStatus, LikeStatus, MediaKind, Message, MessageKind, Notification, StoryItem,
    UserSummary,
};
use glimpse::realtime::{Link, Transport};

static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

pub fn message(id: &str, room_id: &str, sender_id: &str) -> Message {
    Message {
        id: id.to_string(),
        room_id: room_id.to_string(),
        sender_id: sender_id.to_string(),
        sender_username: None,
        kind: MessageKind::Text,
        content: Some(format!("message {}", id)),
        media_url: None,
        view_once: false,
        created_at: Utc::now(),
        read: false,
        delivery_status: DeliveryStatus::Sent,
    }
}

pub fn story(id: &str, kind: MediaKind) -> StoryItem {
    StoryItem {
        id: id.to_string(),
        owner_id: "owner".to_string(),
        owner_username: Some("owner".to_string()),
        media_url: format!("https://cdn.example/{}", id),
        media_kind: kind,
        caption: None,
        viewed: false,
        liked: false,
    }
}

/// Scriptable ApiClient that records every call.
#[derive(Default)]
pub struct MockApi {
    /// Returned by fetch_messages as-is (newest first, like the server).
    pub history: Mutex<Vec<Message>>,
    pub stories: Mutex<Vec<StoryItem>>,
    pub fail_fetch: AtomicBool,
    pub fail_likes: AtomicBool,
    pub like_delay: Mutex<Duration>,
    pub likes_settled: AtomicUsize,
    pub calls: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(newest_first: Vec<Message>) -> Self {
        let api = Self::new();
        *api.history.lock().unwrap() = newest_first;
        api
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls().into_iter().filter(|c| c.starts_with(prefix)).collect()
    }

    fn record(&self, call: String) {
        info!("MockApi: {}", call);
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ApiClient for MockApi {
    async fn fetch_messages(&self, user_id: &str, room_id: &str, limit: u32) -> ClientResult<Vec<Message>> {
        self.record(format!("fetch_messages {} {} {}", user_id, room_id, limit));
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(ClientError::Network("connection reset".into()));
        }
        Ok(self.history.lock().unwrap().clone())
    }

    async fn mark_message_viewed(&self, user_id: &str, message_id: &str) -> ClientResult<()> {
        self.record(format!("mark_message_viewed {} {}", user_id, message_id));
        Ok(())
    }

    async fn fetch_story_feed(&self, viewer_id: &str) -> ClientResult<Vec<StoryItem>> {
        self.record(format!("fetch_story_feed {}", viewer_id));
        Ok(self.stories.lock().unwrap().clone())
    }

    async fn mark_story_viewed(&self, story_id: &str, viewer_id: &str) -> ClientResult<()> {
        self.record(format!("mark_story_viewed {} {}", story_id, viewer_id));
        Ok(())
    }

    async fn like_story(&self, story_id: &str, user_id: &str) -> ClientResult<LikeStatus> {
        self.record(format!("like_story {} {}", story_id, user_id));
        let delay = *self.like_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.likes_settled.fetch_add(1, Ordering::SeqCst);
        if self.fail_likes.load(Ordering::SeqCst) {
            return Err(ClientError::Status { status: 500, message: "boom".into() });
        }
        Ok(LikeStatus { is_liked: true, like_count: 1 })
    }

    async fn unlike_story(&self, story_id: &str, user_id: &str) -> ClientResult<LikeStatus> {
        self.record(format!("unlike_story {} {}", story_id, user_id));
        Ok(LikeStatus { is_liked: false, like_count: 0 })
    }

    async fn follow(&self, follower_id: &str, target_id: &str) -> ClientResult<FollowStatus> {
        self.record(format!("follow {} {}", follower_id, target_id));
        Ok(FollowStatus { is_following: true })
    }

    async fn unfollow(&self, follower_id: &str, target_id: &str) -> ClientResult<FollowStatus> {
        self.record(format!("unfollow {} {}", follower_id, target_id));
        Ok(FollowStatus { is_following: false })
    }

    async fn search_users(&self, viewer_id: &str, query: &str) -> ClientResult<Vec<UserSummary>> {
        self.record(format!("search_users {} {}", viewer_id, query));
        Ok(Vec::new())
    }

    async fn fetch_notifications(&self, user_id: &str) -> ClientResult<Vec<Notification>> {
        self.record(format!("fetch_notifications {}", user_id));
        Ok(Vec::new())
    }

    async fn mark_notification_read(&self, user_id: &str, notification_id: &str) -> ClientResult<()> {
        self.record(format!("mark_notification_read {} {}", user_id, notification_id));
        Ok(())
    }
}

/// Server end of a ChannelTransport link.
pub struct ServerEnd {
    pub to_client: mpsc::Sender<String>,
    pub from_client: mpsc::Receiver<String>,
}

impl ServerEnd {
    pub async fn push(&self, frame: &str) {
        self.to_client.send(frame.to_string()).await.expect("client end gone");
    }

    /// Next frame from the client, parsed.
    pub async fn next_frame(&mut self) -> serde_json::Value {
        let raw = tokio::time::timeout(Duration::from_secs(5), self.from_client.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("client end gone");
        serde_json::from_str(&raw).expect("client sent invalid JSON")
    }

    /// Frames sent by the client so far, without waiting.
    pub fn drain(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

/// Transport handing out one pre-built channel link.
pub struct ChannelTransport {
    client_end: Mutex<Option<(mpsc::Sender<String>, mpsc::Receiver<String>)>>,
    pub opened: AtomicUsize,
}

impl ChannelTransport {
    pub fn new() -> (Self, ServerEnd) {
        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);
        let transport = ChannelTransport {
            client_end: Mutex::new(Some((out_tx, in_rx))),
            opened: AtomicUsize::new(0),
        };
        (transport, ServerEnd { to_client: in_tx, from_client: out_rx })
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn open(&self, user_id: &str) -> ClientResult<Link> {
        info!("ChannelTransport: opening link for {}", user_id);
        self.opened.fetch_add(1, Ordering::SeqCst);
        let (out_tx, in_rx) = self
            .client_end
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ClientError::InvalidState("link already opened".into()))?;
        Ok(Link::new(out_tx, in_rx, None))
    }
}

/// Transport whose connect always fails.
pub struct RefusingTransport;

#[async_trait]
impl Transport for RefusingTransport {
    async fn open(&self, _user_id: &str) -> ClientResult<Link> {
        Err(ClientError::Network("connection refused".into()))
    }
}

pub fn new_message_frame(id: &str, room_id: &str, sender_id: &str) -> String {
    text_message_frame(id, room_id, sender_id, &format!("hello from {}", sender_id))
}

/// `new_message` broadcast as the server sends it, including to the sender.
pub fn text_message_frame(id: &str, room_id: &str, sender_id: &str, content: &str) -> String {
    serde_json::json!({
        "type": "new_message",
        "id": id,
        "chat_room_id": room_id,
        "sender_id": sender_id,
        "sender_username": sender_id,
        "message_type": "text",
        "content": content,
        "media_url": null,
        "media_thumbnail_url": null,
        "view_once": false,
        "created_at": "2024-05-01T09:30:00.000Z"
    })
    .to_string()
}

/// Receive the next event or panic after `secs` of (virtual) time.
pub async fn next_event<T>(rx: &mut mpsc::UnboundedReceiver<T>, secs: u64) -> T {
    tokio::time::timeout(Duration::from_secs(secs), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}
