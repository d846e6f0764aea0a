use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::error::{RelayError, Result};
use crate::request::ChannelMessageRef;

use super::{Channel, InboundEvent, Keyboard};

const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;
const POLL_TIMEOUT_SECS: &str = "30";
const POLL_UPDATE_KINDS: &str = r#"["message","callback_query"]"#;
const REFUSED_POLL_DELAY: Duration = Duration::from_secs(10);
const BACKOFF_FIRST: Duration = Duration::from_millis(500);
const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramChannel {
    http: reqwest::Client,
    bot_token: String,
    max_message_len: usize,
}

impl TelegramChannel {
    pub fn new(bot_token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            bot_token: bot_token.to_string(),
            max_message_len: TELEGRAM_MAX_MESSAGE_LEN,
        })
    }

    pub fn with_max_message_len(mut self, max: usize) -> Self {
        self.max_message_len = max.min(TELEGRAM_MAX_MESSAGE_LEN);
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }

    /// Call a Bot API method and return its `result`.
    async fn call(&self, method: &str, body: &Value) -> Result<Value> {
        let resp = self.http.post(self.api_url(method)).json(body).send().await?;
        let status = resp.status();
        let parsed: TelegramResponse = resp.json().await.map_err(|e| RelayError::Channel {
            reason: format!("telegram {method}: unreadable response (status={status}): {e}"),
        })?;
        if !parsed.ok {
            return Err(RelayError::Channel {
                reason: format!(
                    "telegram {method} failed: status={status} description={}",
                    parsed.description.unwrap_or_default()
                ),
            });
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    /// One long-poll round of `getUpdates` starting at `offset`.
    async fn get_updates(
        &self,
        offset: i64,
    ) -> std::result::Result<Vec<TelegramUpdate>, PollError> {
        let response = self
            .http
            .get(self.api_url("getUpdates"))
            .query(&[
                ("timeout", POLL_TIMEOUT_SECS),
                ("offset", &offset.to_string()),
                ("allowed_updates", POLL_UPDATE_KINDS),
            ])
            .send()
            .await
            .map_err(|e| PollError::Retry(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if is_transient_status(status) {
                PollError::Retry(format!("{status}: {body}"))
            } else {
                PollError::Refused(format!("{status}: {body}"))
            });
        }
        response
            .json::<TelegramUpdates>()
            .await
            .map(|updates| updates.result)
            .map_err(|e| PollError::Retry(format!("unreadable updates: {e}")))
    }

    /// Forward operator updates until the inbound queue closes. Poll errors
    /// never end the loop; they only delay the next round.
    #[tracing::instrument(level = "info", skip_all)]
    async fn poll_updates(&self, tx: mpsc::Sender<InboundEvent>) -> Result<()> {
        let mut offset = 0;
        let mut failures = 0;

        loop {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => {
                    failures = 0;
                    updates
                }
                Err(PollError::Retry(reason)) => {
                    failures += 1;
                    let delay = backoff(failures);
                    tracing::warn!(%reason, failures, ?delay, "update poll failed");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(PollError::Refused(reason)) => {
                    failures = 0;
                    tracing::error!(%reason, "telegram refused the update poll");
                    tokio::time::sleep(REFUSED_POLL_DELAY).await;
                    continue;
                }
            };

            for update in unseen(updates, offset) {
                // Acknowledge before handling; a bad update must not come back.
                offset = update.update_id.saturating_add(1);
                let Some(event) = inbound_from_update(update) else {
                    continue;
                };
                if tx.send(event).await.is_err() {
                    return Err(RelayError::Channel {
                        reason: "inbound queue closed".into(),
                    });
                }
            }
        }
    }
}

/// Why a poll round returned no updates.
#[derive(Debug)]
enum PollError {
    /// Network trouble, rate limiting or a server error.
    Retry(String),
    /// Telegram rejected the call itself, e.g. a revoked token.
    Refused(String),
}

#[async_trait]
impl Channel for TelegramChannel {
    async fn start(&self, tx: mpsc::Sender<InboundEvent>) -> Result<()> {
        let channel = self.clone();
        tokio::spawn(async move {
            if let Err(e) = channel.poll_updates(tx).await {
                tracing::error!(error = %e, "telegram polling stopped");
            }
        });
        Ok(())
    }

    async fn send(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<ChannelMessageRef> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = reply_markup(keyboard);
        }
        let result = self.call("sendMessage", &body).await?;
        let message_id = result
            .get("message_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| RelayError::Channel {
                reason: "telegram sendMessage returned no message_id".into(),
            })?;
        Ok(ChannelMessageRef {
            chat_id,
            message_id,
        })
    }

    async fn edit(
        &self,
        message: &ChannelMessageRef,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<()> {
        let empty = Keyboard::new();
        let body = json!({
            "chat_id": message.chat_id,
            "message_id": message.message_id,
            "text": text,
            "reply_markup": reply_markup(keyboard.unwrap_or(&empty)),
        });
        match self.call("editMessageText", &body).await {
            Ok(_) => Ok(()),
            Err(RelayError::Channel { reason }) if reason.contains("message is not modified") => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn answer_interaction(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = Value::String(text.to_string());
        }
        self.call("answerCallbackQuery", &body).await.map(|_| ())
    }

    async fn react(&self, message: &ChannelMessageRef, emoji: Option<&str>) -> Result<()> {
        let reaction = match emoji {
            Some(emoji) => json!([{ "type": "emoji", "emoji": emoji }]),
            None => json!([]),
        };
        let body = json!({
            "chat_id": message.chat_id,
            "message_id": message.message_id,
            "reaction": reaction,
        });
        self.call("setMessageReaction", &body).await.map(|_| ())
    }

    fn max_message_len(&self) -> usize {
        self.max_message_len
    }
}

fn reply_markup(keyboard: &Keyboard) -> Value {
    let rows: Vec<Vec<Value>> = keyboard
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| json!({ "text": b.text, "callback_data": b.data }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

/// Doubling delay after `failures` consecutive failed polls, capped.
fn backoff(failures: u32) -> Duration {
    let doublings = failures.saturating_sub(1).min(8);
    BACKOFF_FIRST.saturating_mul(1 << doublings).min(BACKOFF_CAP)
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

/// Updates at or past `offset`, oldest first.
fn unseen(mut updates: Vec<TelegramUpdate>, offset: i64) -> Vec<TelegramUpdate> {
    updates.retain(|u| u.update_id >= offset);
    updates.sort_by_key(|u| u.update_id);
    updates
}

fn inbound_from_update(update: TelegramUpdate) -> Option<InboundEvent> {
    if let Some(callback) = update.callback_query {
        let message = callback.message?;
        return Some(InboundEvent::Callback {
            callback_id: callback.id,
            message: ChannelMessageRef {
                chat_id: message.chat.id,
                message_id: message.message_id,
            },
            data: callback.data.unwrap_or_default(),
        });
    }

    let message = update.message?;
    let message_ref = ChannelMessageRef {
        chat_id: message.chat.id,
        message_id: message.message_id,
    };
    let reply_to = message.reply_to_message.as_ref().map(|m| m.message_id);
    if let Some(voice) = message.voice {
        return Some(InboundEvent::Voice {
            message: message_ref,
            reply_to,
            file_id: voice.file_id,
        });
    }
    let text = message.text?.trim().to_string();
    if text.is_empty() {
        return None;
    }
    Some(InboundEvent::Text {
        message: message_ref,
        reply_to,
        text,
    })
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdates {
    #[serde(default)]
    result: Vec<TelegramUpdate>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<TelegramMessage>,
    #[serde(default)]
    callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    message_id: i64,
    chat: TelegramChat,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    voice: Option<TelegramVoice>,
    #[serde(default)]
    reply_to_message: Option<Box<TelegramMessage>>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramVoice {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct TelegramCallbackQuery {
    id: String,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    message: Option<TelegramMessage>,
}
