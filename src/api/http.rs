// reqwest implementation of ApiClient against the backend's REST routes

use async_trait::async_trait;
use log::{debug, error};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::{ApiClient, MessageRecord, StoryRecord};
use crate::error::{ClientError, ClientResult};
use crate::models::{FollowStatus, LikeStatus, Message, Notification, StoryItem, UserSummary};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Deserialize)]
struct StoriesResponse {
    stories: Vec<StoryRecord>,
}

#[derive(Deserialize)]
struct NotificationResponse {
    notifications: Vec<Notification>,
}

#[derive(Clone)]
pub struct HttpApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(HttpApiClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute(&self, request: RequestBuilder) -> ClientResult<Response> {
        let response = self.authorize(request).send().await?;
        check_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        debug!("GET {}", path);
        let response = self.execute(self.http.get(self.url(path))).await?;
        Ok(response.json::<T>().await?)
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        debug!("POST {}", path);
        let response = self.execute(self.http.post(self.url(path))).await?;
        Ok(response.json::<T>().await?)
    }

    async fn post_empty(&self, path: &str) -> ClientResult<()> {
        debug!("POST {}", path);
        self.execute(self.http.post(self.url(path))).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        body
    };
    error!("Request failed with {}: {}", status, message);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::Unauthorized(message)),
        _ => Err(ClientError::Status { status: status.as_u16(), message }),
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn fetch_messages(&self, user_id: &str, room_id: &str, limit: u32) -> ClientResult<Vec<Message>> {
        let path = format!("/api/users/{}/chats/{}/messages?limit={}", user_id, room_id, limit);
        let records: Vec<MessageRecord> = self.get_json(&path).await?;
        Ok(records.into_iter().map(Message::from).collect())
    }

    async fn mark_message_viewed(&self, user_id: &str, message_id: &str) -> ClientResult<()> {
        self.post_empty(&format!("/api/users/{}/messages/{}/view", user_id, message_id)).await
    }

    async fn fetch_story_feed(&self, viewer_id: &str) -> ClientResult<Vec<StoryItem>> {
        let response: StoriesResponse = self.get_json(&format!("/api/stories/feed/{}", viewer_id)).await?;
        Ok(response.stories.into_iter().map(StoryItem::from).collect())
    }

    async fn mark_story_viewed(&self, story_id: &str, viewer_id: &str) -> ClientResult<()> {
        self.post_empty(&format!("/api/stories/{}/view/{}", story_id, viewer_id)).await
    }

    async fn like_story(&self, story_id: &str, user_id: &str) -> ClientResult<LikeStatus> {
        self.post_json(&format!("/api/social/like/{}/{}", story_id, user_id)).await
    }

    async fn unlike_story(&self, story_id: &str, user_id: &str) -> ClientResult<LikeStatus> {
        self.post_json(&format!("/api/social/unlike/{}/{}", story_id, user_id)).await
    }

    async fn follow(&self, follower_id: &str, target_id: &str) -> ClientResult<FollowStatus> {
        self.post_json(&format!("/api/social/follow/{}/{}", follower_id, target_id)).await
    }

    async fn unfollow(&self, follower_id: &str, target_id: &str) -> ClientResult<FollowStatus> {
        self.post_json(&format!("/api/social/unfollow/{}/{}", follower_id, target_id)).await
    }

    async fn search_users(&self, viewer_id: &str, query: &str) -> ClientResult<Vec<UserSummary>> {
        let path = format!("/api/discovery/search/{}", viewer_id);
        debug!("GET {} q={}", path, query);
        let request = self.http.get(self.url(&path)).query(&[("q", query)]);
        let response = self.execute(request).await?;
        Ok(response.json().await?)
    }

    async fn fetch_notifications(&self, user_id: &str) -> ClientResult<Vec<Notification>> {
        let response: NotificationResponse = self.get_json(&format!("/api/notifications/{}", user_id)).await?;
        Ok(response.notifications)
    }

    async fn mark_notification_read(&self, user_id: &str, notification_id: &str) -> ClientResult<()> {
        self.post_empty(&format!("/api/notifications/{}/{}/read", user_id, notification_id)).await
    }
}
