//! LINE Messaging API client.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_API_BASE: &str = "https://api.line.me";

/// The remote calls the bot makes against the messaging platform.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Profile of a user who has added the bot as a friend.
    async fn get_profile(&self, user_id: &str) -> Result<Profile, Error>;

    /// Profile of a group member.
    async fn get_group_member_profile(&self, group_id: &str, user_id: &str) -> Result<Profile, Error>;

    /// Profile of a multi-person chat (room) member.
    async fn get_room_member_profile(&self, room_id: &str, user_id: &str) -> Result<Profile, Error>;

    /// One page of a group's member IDs, with the continuation token if more remain.
    async fn get_group_member_ids(
        &self,
        group_id: &str,
        start: Option<&str>,
    ) -> Result<MemberIdsPage, Error>;

    /// Reply to an event using its one-time reply token.
    async fn reply_text(&self, reply_token: &str, text: &str) -> Result<(), Error>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub display_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberIdsPage {
    #[serde(rename = "memberIds")]
    pub member_ids: Vec<String>,
    pub next: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: Vec<TextMessage<'a>>,
}

#[derive(Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

/// LINE replies are capped at 5000 characters per text message.
const MAX_TEXT_CHARS: usize = 5000;

pub struct LineClient {
    access_token: String,
    api_base: String,
    http: reqwest::Client,
}

impl LineClient {
    pub fn new(access_token: String, api_base: String) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            access_token,
            api_base: api_base.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, Error> {
        debug!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api { status: status.as_u16(), body });
        }

        response.json().await.map_err(|e| Error::Parse(e.to_string()))
    }
}

#[async_trait]
impl Platform for LineClient {
    async fn get_profile(&self, user_id: &str) -> Result<Profile, Error> {
        let url = self.url(&format!("/v2/bot/profile/{}", urlencoding::encode(user_id)));
        self.get_json(url).await
    }

    async fn get_group_member_profile(&self, group_id: &str, user_id: &str) -> Result<Profile, Error> {
        let url = self.url(&format!(
            "/v2/bot/group/{}/member/{}",
            urlencoding::encode(group_id),
            urlencoding::encode(user_id)
        ));
        self.get_json(url).await
    }

    async fn get_room_member_profile(&self, room_id: &str, user_id: &str) -> Result<Profile, Error> {
        let url = self.url(&format!(
            "/v2/bot/room/{}/member/{}",
            urlencoding::encode(room_id),
            urlencoding::encode(user_id)
        ));
        self.get_json(url).await
    }

    async fn get_group_member_ids(
        &self,
        group_id: &str,
        start: Option<&str>,
    ) -> Result<MemberIdsPage, Error> {
        let mut url = self.url(&format!(
            "/v2/bot/group/{}/members/ids",
            urlencoding::encode(group_id)
        ));
        if let Some(start) = start {
            url.push_str(&format!("?start={}", urlencoding::encode(start)));
        }
        self.get_json(url).await
    }

    async fn reply_text(&self, reply_token: &str, text: &str) -> Result<(), Error> {
        let text = truncate_chars(text, MAX_TEXT_CHARS);
        let request = ReplyRequest {
            reply_token,
            messages: vec![TextMessage { kind: "text", text }],
        };

        let response = self
            .http
            .post(self.url("/v2/bot/message/reply"))
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api { status: status.as_u16(), body });
        }

        info!("💬 Replied ({} chars)", text.chars().count());
        Ok(())
    }
}

/// Cut a string to at most `max_chars` characters on a char boundary.
fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[derive(Debug)]
pub enum Error {
    Http(String),
    Api { status: u16, body: String },
    Parse(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api { status, body } => write!(f, "API error {status}: {body}"),
            Error::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for Error {}
