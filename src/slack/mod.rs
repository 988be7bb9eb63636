//! Slack Events API adapter.
//!
//! Turns `event_callback` payloads into [`InboundMessage`]s for the bridge and
//! posts agent replies back with the Web API.
//!
//! Thread keys:
//! - `app_mention`, or any message inside a thread: `{channel}:{thread_ts or ts}`
//! - top-level direct message: `{channel}` (the whole DM is one conversation)

mod client;
mod signature;


pub use client::{SlackClient, SlackThread};
pub use signature::{
    sign, verify_signature, SignatureError, MAX_REQUEST_AGE_SECONDS, SIGNATURE_HEADER,
    TIMESTAMP_HEADER,
};

use crate::bridge::{InboundMessage, ThreadKey};
use serde::Deserialize;
use std::sync::Arc;

/// Set by Slack on redeliveries of an event it considers unacknowledged
pub const RETRY_NUM_HEADER: &str = "X-Slack-Retry-Num";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SlackEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub event: Option<SlackEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SlackEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub channel_type: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
}

impl SlackEvent {
    /// Mentions anywhere, plus messages in direct-message channels
    pub fn is_addressed_to_bot(&self) -> bool {
        match self.kind.as_str() {
            "app_mention" => true,
            "message" => self.channel_type.as_deref() == Some("im"),
            _ => false,
        }
    }

    pub fn thread_key(&self) -> Option<ThreadKey> {
        let channel = self.channel.as_deref()?;
        match self.reply_thread_ts() {
            Some(ts) => Some(ThreadKey::new(format!("{}:{}", channel, ts))),
            None => Some(ThreadKey::new(channel)),
        }
    }

    /// Thread replies are posted under; `None` for top-level DMs
    fn reply_thread_ts(&self) -> Option<&str> {
        if let Some(thread_ts) = self.thread_ts.as_deref() {
            return Some(thread_ts);
        }
        if self.kind == "app_mention" {
            return self.ts.as_deref();
        }
        None
    }
}

/// Challenge to echo back for `url_verification` requests
pub fn extract_challenge(envelope: &SlackEnvelope) -> Option<&str> {
    if envelope.kind == "url_verification" {
        envelope.challenge.as_deref()
    } else {
        None
    }
}

/// Remove `<@U…>` mention tokens and surrounding whitespace
pub fn strip_mentions(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<@") {
        out.push_str(&rest[..start]);
        match rest[start..].find('>') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                rest = &rest[start..];
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// Build the bridge message for a Slack event.
///
/// Returns `None` for events the bridge never handles (not addressed to the
/// bot, or without a channel). Edits and bot posts are passed through so the
/// bridge can classify them; the user lookup is skipped for those.
pub async fn inbound_message(
    client: &Arc<SlackClient>,
    event: SlackEvent,
) -> Option<InboundMessage> {
    if !event.is_addressed_to_bot() {
        return None;
    }
    let thread = event.thread_key()?;
    let channel = event.channel.clone()?;
    let thread_ts = event.reply_thread_ts().map(str::to_string);
    let user_id = event.user.clone().unwrap_or_default();

    let contact = if event.subtype.is_none() && event.bot_id.is_none() && !user_id.is_empty() {
        client.user_contact(&user_id).await
    } else {
        client.fallback_contact()
    };

    let reply = Arc::new(SlackThread::new(
        Arc::clone(client),
        channel,
        thread_ts,
        event.ts.clone(),
    ));

    Some(InboundMessage {
        thread,
        user_id,
        text: strip_mentions(event.text.as_deref().unwrap_or_default()),
        subtype: event.subtype,
        bot_id: event.bot_id,
        contact,
        reply,
    })
}
