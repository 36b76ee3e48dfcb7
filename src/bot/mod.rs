//! Telegram front end
//!
//! Long-polls the Bot API for messages. `/start` gets a greeting, any other
//! plain text is a scan request. Every request runs in its own task with its
//! own engine and reply sink, so polling continues while scans are running.

use crate::config::ScanConfig;
use crate::output::{self, ReplySink};
use crate::scanner::ScanEngine;
use crate::ScanError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const GREETING: &str = "Send a CIDR for a fast scan!";

/// Long-poll timeout passed to `getUpdates`, in seconds
const POLL_TIMEOUT_SECS: u64 = 30;
const RETRY_DELAY: Duration = Duration::from_secs(3);

/// `sendMessage` rejects longer texts
pub const MAX_MESSAGE_LEN: usize = 4096;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Serialize)]
struct GetUpdates<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

/// What an incoming update asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Start { chat_id: i64 },
    Scan { chat_id: i64, text: String },
    Ignored,
}

impl Incoming {
    pub fn from_update(update: &Update) -> Self {
        let Some(message) = &update.message else {
            return Incoming::Ignored;
        };
        let Some(text) = message.text.as_deref().map(str::trim) else {
            return Incoming::Ignored;
        };
        let chat_id = message.chat.id;

        if text.is_empty() {
            return Incoming::Ignored;
        }

        if let Some(command) = text.strip_prefix('/') {
            // "/start" or "/start@SomeBot"
            let name = command.split(|c: char| c == '@' || c.is_whitespace()).next();
            return match name {
                Some("start") => Incoming::Start { chat_id },
                _ => Incoming::Ignored,
            };
        }

        Incoming::Scan {
            chat_id,
            text: text.to_string(),
        }
    }
}

/// Thin Bot API client
#[derive(Clone)]
pub struct TelegramApi {
    client: reqwest::Client,
    base: String,
}

impl TelegramApi {
    pub fn new(token: &str, api_base: &str) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
            .build()?;

        Ok(Self {
            client,
            base: format!("{}/bot{}", api_base.trim_end_matches('/'), token),
        })
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> crate::Result<T>
    where
        B: Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{}", self.base, method);
        let response: ApiResponse<T> = self.client.post(&url).json(body).send().await?.json().await?;

        match (response.ok, response.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(ScanError::NetworkError(format!(
                "{} failed: {}",
                method,
                response.description.unwrap_or_else(|| "no description".to_string())
            ))),
        }
    }

    pub async fn get_updates(&self, offset: i64, timeout: u64) -> crate::Result<Vec<Update>> {
        let request = GetUpdates {
            offset,
            timeout,
            allowed_updates: &["message"],
        };
        self.call("getUpdates", &request).await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> crate::Result<()> {
        let _: serde_json::Value = self.call("sendMessage", &SendMessage { chat_id, text }).await?;
        Ok(())
    }
}

/// Replies of one request, delivered to the chat that sent it
pub struct ChatSink {
    api: TelegramApi,
    chat_id: i64,
}

impl ChatSink {
    pub fn new(api: TelegramApi, chat_id: i64) -> Self {
        Self { api, chat_id }
    }
}

#[async_trait]
impl ReplySink for ChatSink {
    async fn send(&mut self, text: String) -> crate::Result<()> {
        for piece in output::split_message(&text, MAX_MESSAGE_LEN) {
            self.api.send_message(self.chat_id, &piece).await?;
        }
        Ok(())
    }
}

/// Long-polling bot loop
pub struct TelegramBot {
    api: TelegramApi,
    scan_config: ScanConfig,
    offset: i64,
    poll_timeout: u64,
}

impl TelegramBot {
    pub fn new(token: &str, scan_config: ScanConfig) -> crate::Result<Self> {
        Self::with_api_base(token, DEFAULT_API_BASE, scan_config)
    }

    pub fn with_api_base(token: &str, api_base: &str, scan_config: ScanConfig) -> crate::Result<Self> {
        scan_config.validate()?;

        Ok(Self {
            api: TelegramApi::new(token, api_base)?,
            scan_config,
            offset: 0,
            poll_timeout: POLL_TIMEOUT_SECS,
        })
    }

    pub fn with_poll_timeout(mut self, seconds: u64) -> Self {
        self.poll_timeout = seconds;
        self
    }

    /// Poll forever, backing off briefly after transport errors
    pub async fn run(mut self) -> crate::Result<()> {
        loop {
            if let Err(e) = self.poll_once().await {
                log::warn!("Polling failed: {}", e);
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }

    /// Fetch one round of updates and dispatch them.
    ///
    /// Returns the handles of the scans started by this round.
    pub async fn poll_once(&mut self) -> crate::Result<Vec<JoinHandle<()>>> {
        let updates = self.api.get_updates(self.offset, self.poll_timeout).await?;
        let mut scans = Vec::new();

        for update in updates {
            self.offset = self.offset.max(update.update_id + 1);

            match Incoming::from_update(&update) {
                Incoming::Start { chat_id } => {
                    if let Err(e) = self.api.send_message(chat_id, GREETING).await {
                        log::warn!("Greeting chat {} failed: {}", chat_id, e);
                    }
                }
                Incoming::Scan { chat_id, text } => {
                    scans.push(self.spawn_scan(chat_id, text)?);
                }
                Incoming::Ignored => {
                    log::debug!("Ignoring update {}", update.update_id);
                }
            }
        }

        Ok(scans)
    }

    fn spawn_scan(&self, chat_id: i64, text: String) -> crate::Result<JoinHandle<()>> {
        let engine = ScanEngine::new(self.scan_config.clone())?;
        let mut sink = ChatSink::new(self.api.clone(), chat_id);

        Ok(tokio::spawn(async move {
            match engine.run(&text, &mut sink).await {
                Ok(_) => {}
                Err(e) if e.is_input_error() => {
                    log::debug!("Request from chat {} rejected: {}", chat_id, e);
                }
                Err(e) => log::error!("Scan for chat {} failed: {}", chat_id, e),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(text: Option<&str>) -> Update {
        Update {
            update_id: 7,
            message: Some(Message {
                chat: Chat { id: 42 },
                text: text.map(str::to_string),
            }),
        }
    }

    #[test]
    fn test_start_command() {
        assert_eq!(Incoming::from_update(&update(Some("/start"))), Incoming::Start { chat_id: 42 });
        assert_eq!(
            Incoming::from_update(&update(Some("/start@PortBot"))),
            Incoming::Start { chat_id: 42 }
        );
    }

    #[test]
    fn test_other_commands_ignored() {
        assert_eq!(Incoming::from_update(&update(Some("/help"))), Incoming::Ignored);
        assert_eq!(Incoming::from_update(&update(Some("/startle"))), Incoming::Ignored);
    }

    #[test]
    fn test_text_is_scan_request() {
        assert_eq!(
            Incoming::from_update(&update(Some("  10.0.0.0/24\n8.8.8.8 "))),
            Incoming::Scan {
                chat_id: 42,
                text: "10.0.0.0/24\n8.8.8.8".to_string()
            }
        );
    }

    #[test]
    fn test_non_text_ignored() {
        assert_eq!(Incoming::from_update(&update(None)), Incoming::Ignored);
        assert_eq!(Incoming::from_update(&update(Some("   "))), Incoming::Ignored);
        assert_eq!(
            Incoming::from_update(&Update {
                update_id: 1,
                message: None
            }),
            Incoming::Ignored
        );
    }

    #[test]
    fn test_update_deserialization() {
        let raw = r#"{"update_id": 10, "message": {"message_id": 1, "chat": {"id": -5, "type": "group"}, "text": "1.1.1.1"}}"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert_eq!(
            Incoming::from_update(&update),
            Incoming::Scan {
                chat_id: -5,
                text: "1.1.1.1".to_string()
            }
        );
    }
}
