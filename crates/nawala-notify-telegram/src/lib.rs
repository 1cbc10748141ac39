// # nawala-notify-telegram
//
// Delivers `StatusChange` events to Telegram chats through the Bot API
// `sendMessage` method.
//
// ## Routing
//
// Every channel carries its own toggles:
//
// - `notify_on_block`: the target moved from a non-blocked into a blocked status
// - `notify_on_recover`: the target moved from a blocked into a non-blocked status
//
// A channel bound to a `group_id` only hears about targets of that group.
// Transitions between two blocked statuses (e.g. RST -> DNS_FILTERED) and
// between two non-blocked statuses (e.g. OK -> TIMEOUT) are never delivered.
//
// ## Security
//
// The bot token is part of the request path. It never appears in `Debug`
// output, and transport errors are stripped of their URL before they are
// logged or returned.

use async_trait::async_trait;
use nawala_core::events::StatusChange;
use nawala_core::model::{ProbeStatus, TargetGroupId};
use nawala_core::traits::Notifier;
use nawala_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Telegram Bot API base URL
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// HTTP timeout for one `sendMessage` call
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// One destination chat with its delivery toggles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramChannel {
    /// Chat, group or channel id (`-100...` for channels)
    pub chat_id: String,

    /// Restrict the channel to targets of one group
    #[serde(default)]
    pub group_id: Option<TargetGroupId>,

    #[serde(default = "default_true")]
    pub notify_on_block: bool,

    #[serde(default = "default_true")]
    pub notify_on_recover: bool,
}

fn default_true() -> bool {
    true
}

impl TelegramChannel {
    /// A channel that hears every block and every recovery
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            group_id: None,
            notify_on_block: true,
            notify_on_recover: true,
        }
    }

    /// Whether `change` should be delivered to this channel
    pub fn should_notify(&self, change: &StatusChange) -> bool {
        if let Some(group_id) = self.group_id {
            if change.group_id != Some(group_id) {
                return false;
            }
        }

        (self.notify_on_block && change.is_block())
            || (self.notify_on_recover && change.is_recovery())
    }
}

/// `sendMessage` request body
#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

/// Bot API envelope; only the failure fields are read
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram notifier
///
/// The `Debug` implementation does NOT expose the bot token.
pub struct TelegramNotifier {
    /// ⚠️ NEVER log this value
    bot_token: String,
    channels: Vec<TelegramChannel>,
    api_base: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("bot_token", &"<REDACTED>")
            .field("channels", &self.channels)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl TelegramNotifier {
    /// Create a notifier
    ///
    /// Fails with `Error::Config` when the token is empty or a channel has
    /// no chat id.
    pub fn new(bot_token: impl Into<String>, channels: Vec<TelegramChannel>) -> Result<Self> {
        let bot_token = bot_token.into();
        if bot_token.trim().is_empty() {
            return Err(Error::config("Telegram bot token cannot be empty"));
        }
        if let Some(channel) = channels.iter().find(|c| c.chat_id.trim().is_empty()) {
            return Err(Error::config(format!(
                "Telegram channel has an empty chat_id: {:?}",
                channel
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            bot_token,
            channels,
            api_base: TELEGRAM_API_BASE.to_string(),
            client,
        })
    }

    /// Point the notifier at another Bot API server (self-hosted or a test double)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Configured channels
    pub fn channels(&self) -> &[TelegramChannel] {
        &self.channels
    }

    /// Send a test message to every channel, ignoring the toggles
    pub async fn send_test(&self, message: &str) -> Result<()> {
        let text = format!("🔔 *Test Notification*\n\n{}", message);
        let mut failures = Vec::new();

        for channel in &self.channels {
            if let Err(e) = self.send_message(&channel.chat_id, &text).await {
                warn!(chat_id = %channel.chat_id, "Telegram test message failed: {}", e);
                failures.push(format!("{}: {}", channel.chat_id, e));
            }
        }

        into_result(failures)
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let body = SendMessage {
            chat_id,
            text,
            parse_mode: "Markdown",
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::notifier("telegram", format!("HTTP request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(chat_id, "Telegram message delivered");
            return Ok(());
        }

        // The API explains rejections in `description`
        let description = response
            .json::<ApiResponse>()
            .await
            .ok()
            .filter(|r| !r.ok)
            .and_then(|r| r.description)
            .unwrap_or_else(|| "no description".to_string());

        Err(match status.as_u16() {
            401 | 404 => Error::notifier(
                "telegram",
                format!("Bot token rejected. Status: {}", status),
            ),
            429 => Error::notifier(
                "telegram",
                format!("Rate limit exceeded: {}", description),
            ),
            _ => Error::notifier(
                "telegram",
                format!("sendMessage failed: {} - {}", status, description),
            ),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, change: &StatusChange) -> Result<()> {
        let interested: Vec<&TelegramChannel> = self
            .channels
            .iter()
            .filter(|c| c.should_notify(change))
            .collect();

        if interested.is_empty() {
            debug!(
                target_id = change.target_id,
                "No Telegram channel wants {} -> {}", change.old_status, change.new_status
            );
            return Ok(());
        }

        let text = build_message(change);
        let mut failures = Vec::new();

        for channel in interested {
            match self.send_message(&channel.chat_id, &text).await {
                Ok(()) => info!(
                    target_id = change.target_id,
                    chat_id = %channel.chat_id,
                    "Notified {} -> {}", change.old_status, change.new_status
                ),
                Err(e) => {
                    warn!(
                        target_id = change.target_id,
                        chat_id = %channel.chat_id,
                        "Telegram delivery failed: {}", e
                    );
                    failures.push(format!("{}: {}", channel.chat_id, e));
                }
            }
        }

        into_result(failures)
    }

    fn notifier_name(&self) -> &'static str {
        "telegram"
    }
}

fn into_result(failures: Vec<String>) -> Result<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::notifier("telegram", failures.join("; ")))
    }
}

/// Markdown body of a status-change alert
pub fn build_message(change: &StatusChange) -> String {
    let mut message = format!(
        "{} *Status Change Alert*\n\n\
         *Target:* `{}`\n\
         *Old Status:* {}\n\
         *New Status:* {}\n\
         *Time:* {}\n",
        status_emoji(change.new_status),
        change.target,
        status_text(change.old_status),
        status_text(change.new_status),
        change.changed_at.format("%Y-%m-%d %H:%M:%S"),
    );

    if let Some(notes) = change.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        message.push_str(&format!("\n*Notes:* {}", notes));
    }

    message
}

fn status_emoji(status: ProbeStatus) -> &'static str {
    match status {
        ProbeStatus::Ok => "✅",
        ProbeStatus::DnsFiltered => "🚫",
        ProbeStatus::HttpBlockpage => "⛔",
        ProbeStatus::HttpsSniBlock => "🔒",
        ProbeStatus::Timeout => "⏱️",
        ProbeStatus::Rst => "❌",
        ProbeStatus::Inconclusive | ProbeStatus::Unknown => "❓",
    }
}

fn status_text(status: ProbeStatus) -> &'static str {
    match status {
        ProbeStatus::Ok => "✅ OK",
        ProbeStatus::DnsFiltered => "🚫 DNS Filtered",
        ProbeStatus::HttpBlockpage => "⛔ HTTP Block Page",
        ProbeStatus::HttpsSniBlock => "🔒 HTTPS SNI Block",
        ProbeStatus::Timeout => "⏱️ Timeout",
        ProbeStatus::Rst => "❌ Connection Reset",
        ProbeStatus::Inconclusive => "❓ Inconclusive",
        ProbeStatus::Unknown => "❓ Unknown",
    }
}
