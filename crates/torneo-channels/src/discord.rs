//! Discord REST channel: message polling plus the `Messenger` surface.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use torneo_core::config::DiscordConfig;
use torneo_core::error::{Result, TorneoError};
use torneo_core::traits::{Member, Messenger};
use torneo_core::types::IncomingMessage;

const API_BASE: &str = "https://discord.com/api/v10";

/// Discord REST client. Cheap to clone behind an `Arc`.
pub struct DiscordChannel {
    config: DiscordConfig,
    client: reqwest::Client,
    /// user id → DM channel id, filled lazily.
    dm_channels: tokio::sync::Mutex<HashMap<String, String>>,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            dm_channels: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{API_BASE}{path}")
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.config.bot_token)
    }

    /// Identify the bot account; used as a connectivity check at startup.
    pub async fn get_me(&self) -> Result<DiscordUser> {
        let response = self
            .client
            .get(self.url("/users/@me"))
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| TorneoError::Channel(format!("get current user failed: {e}")))?;
        response
            .error_for_status()
            .map_err(|e| TorneoError::Channel(format!("get current user rejected: {e}")))?
            .json()
            .await
            .map_err(|e| TorneoError::Channel(format!("invalid user response: {e}")))
    }

    /// Messages in a channel strictly after `after` (a snowflake), oldest
    /// first. With `after = None`, just the newest message — used to seed
    /// the polling cursor without replaying history.
    pub async fn channel_messages(
        &self,
        channel_id: &str,
        after: Option<&str>,
    ) -> Result<Vec<DiscordMessage>> {
        let mut request = self
            .client
            .get(self.url(&format!("/channels/{channel_id}/messages")))
            .header("Authorization", self.auth());
        request = match after {
            Some(id) => request.query(&[("after", id), ("limit", "100")]),
            None => request.query(&[("limit", "1")]),
        };
        let response = request
            .send()
            .await
            .map_err(|e| TorneoError::Channel(format!("message fetch failed: {e}")))?;
        let mut messages: Vec<DiscordMessage> = response
            .error_for_status()
            .map_err(|e| TorneoError::Channel(format!("message fetch rejected: {e}")))?
            .json()
            .await
            .map_err(|e| TorneoError::Channel(format!("invalid messages response: {e}")))?;
        // the API returns newest first
        messages.sort_by_key(|m| m.id.parse::<u64>().unwrap_or(0));
        Ok(messages)
    }

    /// Open (or reuse) the DM channel with a user.
    async fn dm_channel(&self, user_id: &str) -> Result<String> {
        {
            let cache = self.dm_channels.lock().await;
            if let Some(id) = cache.get(user_id) {
                return Ok(id.clone());
            }
        }
        let response = self
            .client
            .post(self.url("/users/@me/channels"))
            .header("Authorization", self.auth())
            .json(&serde_json::json!({ "recipient_id": user_id }))
            .send()
            .await
            .map_err(|e| TorneoError::Channel(format!("DM channel open failed: {e}")))?;
        let channel: DiscordChannelObject = response
            .error_for_status()
            .map_err(|e| TorneoError::Delivery(format!("DM channel refused for {user_id}: {e}")))?
            .json()
            .await
            .map_err(|e| TorneoError::Channel(format!("invalid DM channel response: {e}")))?;
        self.dm_channels
            .lock()
            .await
            .insert(user_id.to_string(), channel.id.clone());
        Ok(channel.id)
    }

    async fn post_message(&self, channel_id: &str, text: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/channels/{channel_id}/messages")))
            .header("Authorization", self.auth())
            .json(&serde_json::json!({ "content": text }))
            .send()
            .await
            .map_err(|e| TorneoError::Channel(format!("message post failed: {e}")))?;
        response
            .error_for_status()
            .map_err(|e| TorneoError::Delivery(format!("message post rejected: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl Messenger for DiscordChannel {
    async fn send_dm(&self, user_id: &str, text: &str) -> Result<()> {
        let channel_id = self.dm_channel(user_id).await?;
        self.post_message(&channel_id, text).await
    }

    async fn send_channel(&self, channel_id: &str, text: &str) -> Result<()> {
        self.post_message(channel_id, text).await
    }

    async fn resolve_member(&self, guild_id: &str, user_id: &str) -> Result<Option<Member>> {
        let response = self
            .client
            .get(self.url(&format!("/guilds/{guild_id}/members/{user_id}")))
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| TorneoError::Channel(format!("member lookup failed: {e}")))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let member: DiscordGuildMember = response
            .error_for_status()
            .map_err(|e| TorneoError::Channel(format!("member lookup rejected: {e}")))?
            .json()
            .await
            .map_err(|e| TorneoError::Channel(format!("invalid member response: {e}")))?;
        Ok(Some(member.into_member()))
    }

    async fn list_members(&self, guild_id: &str) -> Result<Vec<Member>> {
        let mut members = Vec::new();
        let mut after = String::from("0");
        loop {
            let response = self
                .client
                .get(self.url(&format!("/guilds/{guild_id}/members")))
                .header("Authorization", self.auth())
                .query(&[("limit", "1000"), ("after", &after)])
                .send()
                .await
                .map_err(|e| TorneoError::Channel(format!("member list failed: {e}")))?;
            let page: Vec<DiscordGuildMember> = response
                .error_for_status()
                .map_err(|e| TorneoError::Channel(format!("member list rejected: {e}")))?
                .json()
                .await
                .map_err(|e| TorneoError::Channel(format!("invalid member list: {e}")))?;
            let Some(last) = page.last() else {
                break;
            };
            after = last.user.id.clone();
            let full_page = page.len() == 1000;
            members.extend(page.into_iter().filter(|m| !m.user.is_bot()).map(|m| m.into_member()));
            if !full_page {
                break;
            }
        }
        Ok(members)
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/channels/{channel_id}/messages/{message_id}")))
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| TorneoError::Channel(format!("message delete failed: {e}")))?;
        response
            .error_for_status()
            .map_err(|e| TorneoError::Channel(format!("message delete rejected: {e}")))?;
        Ok(())
    }
}

/// One channel the polling loop watches.
#[derive(Debug, Clone)]
struct WatchedChannel {
    channel_id: String,
    is_dm: bool,
}

/// Spawn the polling loop over the configured watch channels plus the
/// operator's DM channel, and return the message stream. The cursor for
/// each channel seeds from its newest message, so restarts never replay
/// old commands.
pub async fn start_polling(
    channel: Arc<DiscordChannel>,
    operator_id: &str,
) -> Result<mpsc::UnboundedReceiver<IncomingMessage>> {
    let me = channel.get_me().await?;
    tracing::info!("🤖 Discord bot connected as {}", me.display());

    let mut watched: Vec<WatchedChannel> = channel
        .config
        .watch_channels
        .iter()
        .map(|id| WatchedChannel { channel_id: id.clone(), is_dm: false })
        .collect();
    if !operator_id.is_empty() {
        match channel.dm_channel(operator_id).await {
            Ok(dm) => watched.push(WatchedChannel { channel_id: dm, is_dm: true }),
            Err(e) => tracing::warn!("operator DM channel unavailable: {e}"),
        }
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let bot_id = me.id;
    let poll_interval = std::time::Duration::from_secs(channel.config.poll_interval_secs);

    tokio::spawn(async move {
        let mut cursors: HashMap<String, Option<String>> =
            watched.iter().map(|w| (w.channel_id.clone(), None)).collect();
        tracing::info!(channels = watched.len(), "Discord polling loop started");

        loop {
            for w in &watched {
                let cursor = cursors.get(&w.channel_id).cloned().flatten();
                match channel.channel_messages(&w.channel_id, cursor.as_deref()).await {
                    Ok(messages) => {
                        if let Some(last) = messages.last() {
                            cursors.insert(w.channel_id.clone(), Some(last.id.clone()));
                        }
                        // first pass only seeds the cursor
                        if cursor.is_none() {
                            continue;
                        }
                        for m in messages {
                            if m.author.id == bot_id || m.author.is_bot() {
                                continue;
                            }
                            if tx.send(m.into_incoming(&w.channel_id, w.is_dm)).is_err() {
                                tracing::info!("Discord polling stopped (receiver dropped)");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(channel_id = %w.channel_id, "Discord poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    }
                }
            }
            tokio::time::sleep(poll_interval).await;
        }
    });

    Ok(rx)
}

// --- Discord API types ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    pub global_name: Option<String>,
    #[serde(default)]
    pub bot: Option<bool>,
}

impl DiscordUser {
    pub fn is_bot(&self) -> bool {
        self.bot.unwrap_or(false)
    }

    pub fn display(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordMessage {
    pub id: String,
    pub author: DiscordUser,
    pub content: String,
    pub timestamp: String,
}

impl DiscordMessage {
    fn into_incoming(self, channel_id: &str, is_dm: bool) -> IncomingMessage {
        let timestamp = chrono::DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|t| t.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now());
        IncomingMessage {
            channel_id: channel_id.to_string(),
            message_id: self.id,
            author_id: self.author.id,
            author_name: Some(
                self.author.global_name.unwrap_or(self.author.username),
            ),
            content: self.content,
            is_dm,
            timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DiscordChannelObject {
    id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordGuildMember {
    pub user: DiscordUser,
    pub nick: Option<String>,
}

impl DiscordGuildMember {
    /// Guild nickname wins, then the global display name, then the handle.
    fn into_member(self) -> Member {
        let display_name = self
            .nick
            .unwrap_or_else(|| self.user.global_name.clone().unwrap_or(self.user.username.clone()));
        Member { user_id: self.user.id, display_name }
    }
}
