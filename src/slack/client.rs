use crate::backend::{ContactPerson, MessageDirection, PriorMessage};
use crate::bridge::ReplyTarget;
use crate::config::SlackConfig;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    ts: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsersInfoResponse {
    ok: bool,
    user: Option<SlackUser>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    name: Option<String>,
    real_name: Option<String>,
    #[serde(default)]
    profile: SlackProfile,
}

#[derive(Debug, Default, Deserialize)]
struct SlackProfile {
    email: Option<String>,
    real_name: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepliesResponse {
    ok: bool,
    #[serde(default)]
    messages: Vec<ThreadMessage>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ThreadMessage {
    ts: String,
    text: Option<String>,
    user: Option<String>,
    bot_id: Option<String>,
}

/// Slack Web API client (bot token).
///
/// Caches resolved user contacts for the lifetime of the process.
pub struct SlackClient {
    http: Client,
    api_base: String,
    bot_token: String,
    bot_user_id: Option<String>,
    default_contact_email: String,
    contacts: DashMap<String, ContactPerson>,
}

impl SlackClient {
    pub fn new(http: Client, config: &SlackConfig) -> Self {
        Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            bot_user_id: config.bot_user_id.clone(),
            default_contact_email: config.default_contact_email.clone(),
            contacts: DashMap::new(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    /// Post `text` to a channel, threaded under `thread_ts` when given.
    /// Returns the new message's ts.
    pub async fn post_message(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<String> {
        let mut payload = json!({
            "channel": channel,
            "text": text,
        });
        if let Some(thread_ts) = thread_ts {
            payload["thread_ts"] = Value::String(thread_ts.to_string());
        }

        let response = self
            .http
            .post(self.url("chat.postMessage"))
            .bearer_auth(&self.bot_token)
            .json(&payload)
            .send()
            .await
            .context("chat.postMessage request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("chat.postMessage returned HTTP {}", status.as_u16());
        }
        let body: PostMessageResponse = response
            .json()
            .await
            .context("Invalid chat.postMessage response")?;
        if !body.ok {
            bail!(
                "chat.postMessage failed: {}",
                body.error.as_deref().unwrap_or("unknown Slack error")
            );
        }

        body.ts
            .ok_or_else(|| anyhow!("chat.postMessage response missing ts"))
    }

    /// Contact details for a Slack user, falling back to the configured
    /// default email when the profile can't be read.
    pub async fn user_contact(&self, user: &str) -> ContactPerson {
        if let Some(cached) = self.contacts.get(user) {
            return cached.value().clone();
        }

        match self.fetch_user(user).await {
            Ok(contact) => {
                self.contacts.insert(user.to_string(), contact.clone());
                contact
            }
            Err(e) => {
                warn!(user = %user, error = %e, "Could not resolve Slack user, using default contact");
                self.fallback_contact()
            }
        }
    }

    pub fn fallback_contact(&self) -> ContactPerson {
        ContactPerson {
            name: None,
            email: self.default_contact_email.clone(),
        }
    }

    async fn fetch_user(&self, user: &str) -> Result<ContactPerson> {
        let response = self
            .http
            .get(self.url("users.info"))
            .bearer_auth(&self.bot_token)
            .query(&[("user", user)])
            .send()
            .await
            .context("users.info request failed")?;

        let body: UsersInfoResponse = response
            .json()
            .await
            .context("Invalid users.info response")?;
        if !body.ok {
            bail!(
                "users.info failed: {}",
                body.error.as_deref().unwrap_or("unknown Slack error")
            );
        }
        let user = body
            .user
            .ok_or_else(|| anyhow!("users.info response missing user"))?;

        let name = user
            .profile
            .real_name
            .or(user.real_name)
            .or(user.profile.display_name)
            .or(user.name)
            .filter(|name| !name.is_empty());
        let email = user
            .profile
            .email
            .filter(|email| !email.is_empty())
            .unwrap_or_else(|| self.default_contact_email.clone());

        Ok(ContactPerson { name, email })
    }

    /// Messages of a thread in order, without the message at `exclude_ts`.
    /// Bot-authored messages are marked outbound.
    pub async fn thread_history(
        &self,
        channel: &str,
        thread_ts: &str,
        exclude_ts: Option<&str>,
    ) -> Result<Vec<PriorMessage>> {
        let response = self
            .http
            .get(self.url("conversations.replies"))
            .bearer_auth(&self.bot_token)
            .query(&[("channel", channel), ("ts", thread_ts)])
            .send()
            .await
            .context("conversations.replies request failed")?;

        let body: RepliesResponse = response
            .json()
            .await
            .context("Invalid conversations.replies response")?;
        if !body.ok {
            bail!(
                "conversations.replies failed: {}",
                body.error.as_deref().unwrap_or("unknown Slack error")
            );
        }

        let mut history = Vec::with_capacity(body.messages.len());
        for message in body.messages {
            if Some(message.ts.as_str()) == exclude_ts {
                continue;
            }
            let content = match message.text {
                Some(text) if !text.trim().is_empty() => text,
                _ => continue,
            };
            let Some(timestamp) = parse_ts(&message.ts) else {
                debug!(ts = %message.ts, "Skipping thread message with unparseable ts");
                continue;
            };
            let from_bot = message.bot_id.is_some()
                || (message.user.is_some() && message.user == self.bot_user_id);

            history.push(PriorMessage {
                content,
                direction: if from_bot {
                    MessageDirection::Outbound
                } else {
                    MessageDirection::Inbound
                },
                timestamp,
            });
        }

        Ok(history)
    }
}

/// Parse a Slack message ts ("1700000000.000100") into a UTC timestamp
pub(crate) fn parse_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (seconds, fraction) = ts.split_once('.').unwrap_or((ts, "0"));
    let seconds: i64 = seconds.parse().ok()?;
    let micros: u32 = format!("{:0<6}", fraction).get(..6)?.parse().ok()?;
    DateTime::from_timestamp(seconds, micros * 1_000)
}

/// A Slack thread (or top-level DM) that agent replies are posted into
pub struct SlackThread {
    client: Arc<SlackClient>,
    channel: String,
    thread_ts: Option<String>,
    /// The message that opened the conversation; excluded from history
    trigger_ts: Option<String>,
}

impl SlackThread {
    pub fn new(
        client: Arc<SlackClient>,
        channel: String,
        thread_ts: Option<String>,
        trigger_ts: Option<String>,
    ) -> Self {
        Self {
            client,
            channel,
            thread_ts,
            trigger_ts,
        }
    }
}

#[async_trait]
impl ReplyTarget for SlackThread {
    async fn post_reply(&self, text: &str) -> Result<()> {
        self.client
            .post_message(&self.channel, self.thread_ts.as_deref(), text)
            .await
            .map(|_| ())
    }

    async fn thread_history(&self) -> Result<Vec<PriorMessage>> {
        match &self.thread_ts {
            Some(thread_ts) => {
                self.client
                    .thread_history(&self.channel, thread_ts, self.trigger_ts.as_deref())
                    .await
            }
            None => Ok(Vec::new()),
        }
    }

    fn describe(&self) -> String {
        match &self.thread_ts {
            Some(ts) => format!("slack:{}/{}", self.channel, ts),
            None => format!("slack:{}", self.channel),
        }
    }
}
