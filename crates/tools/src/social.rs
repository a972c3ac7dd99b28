//! Outbound messaging actions: TELEGRAM_SEND, DISCORD_SEND, WHATSAPP_SEND.
//!
//! All three take `target | text | optional file`. Telegram and Discord
//! upload the file through their bot APIs; WhatsApp hands its path to the
//! local bridge.

use async_trait::async_trait;
use moltyclaw_core::action::ActionHandler;
use moltyclaw_core::error::ActionError;
use reqwest::multipart::{Form, Part};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

const TELEGRAM_API: &str = "https://api.telegram.org";
const DISCORD_API: &str = "https://discord.com/api/v10";

/// A parsed `target | text | file` parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub target: String,
    pub text: String,
    pub file: Option<String>,
}

/// An attachment read into memory for a multipart upload.
struct Upload {
    file_name: String,
    bytes: Vec<u8>,
}

impl Upload {
    fn part(self) -> Part {
        Part::bytes(self.bytes).file_name(self.file_name)
    }
}

impl Outbound {
    pub fn parse(action: &str, param: &str) -> Result<Self, ActionError> {
        let mut parts = param.splitn(3, '|').map(str::trim);
        let target = parts.next().unwrap_or_default().to_string();
        let text = parts.next().unwrap_or_default().to_string();
        let file = parts.next().filter(|f| !f.is_empty()).map(str::to_string);

        if target.is_empty() {
            return Err(ActionError::InvalidParam {
                action: action.into(),
                reason: "missing destination. Use 'destination | text | optional file'".into(),
            });
        }
        if text.is_empty() && file.is_none() {
            return Err(ActionError::InvalidParam {
                action: action.into(),
                reason: "provide at least a text or a file. Use 'destination | text | optional file'".into(),
            });
        }
        Ok(Self { target, text, file })
    }

    /// Read the named attachment.
    ///
    /// A missing file degrades to a text message; with no text left to send
    /// it is an error.
    async fn upload(&self, action: &str) -> Result<Option<Upload>, ActionError> {
        let Some(file) = &self.file else {
            return Ok(None);
        };
        match tokio::fs::read(file).await {
            Ok(bytes) => {
                let file_name = Path::new(file)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "attachment".into());
                Ok(Some(Upload { file_name, bytes }))
            }
            Err(e) if self.text.is_empty() => Err(ActionError::InvalidParam {
                action: action.into(),
                reason: format!("cannot read file '{file}': {e}"),
            }),
            Err(e) => {
                warn!(action = %action, file = %file, error = %e, "Attachment unreadable, sending text only");
                Ok(None)
            }
        }
    }

    /// Result text, naming an attachment that was not delivered.
    fn delivered(&self, channel: &str, uploaded: bool) -> String {
        match &self.file {
            Some(file) if !uploaded => format!(
                "Message sent on {channel} to {}. File '{file}' could not be read and was NOT sent.",
                self.target
            ),
            Some(_) => format!("Message and file sent on {channel} to {}.", self.target),
            None => format!("Message sent on {channel} to {}.", self.target),
        }
    }
}

/// Telegram method and form field for a file, chosen by extension.
pub fn telegram_method(file: &str) -> (&'static str, &'static str) {
    let ext = Path::new(file)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp3" | "ogg" | "wav" => ("sendVoice", "voice"),
        "png" | "jpg" | "jpeg" | "webp" => ("sendPhoto", "photo"),
        _ => ("sendDocument", "document"),
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to create HTTP client")
}

fn send_failed(action: &str, reason: impl Into<String>) -> ActionError {
    ActionError::ExecutionFailed {
        action: action.into(),
        reason: reason.into(),
    }
}

fn missing_token(action: &str, variable: &str) -> ActionError {
    ActionError::NotConfigured {
        action: action.into(),
        reason: format!("{variable} is not set"),
    }
}

pub struct TelegramSendAction {
    client: reqwest::Client,
    token: Option<String>,
    api_base: String,
}

impl TelegramSendAction {
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: http_client(),
            token: token.filter(|t| !t.is_empty()),
            api_base: TELEGRAM_API.into(),
        }
    }

    /// Point the action at another Bot API server.
    pub fn with_api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl ActionHandler for TelegramSendAction {
    fn name(&self) -> &str {
        "TELEGRAM_SEND"
    }

    fn description(&self) -> &str {
        "Send a Telegram message (optionally with a photo, voice note or document) through the bot"
    }

    fn param_hint(&self) -> &str {
        "chat_id | text | optional file path"
    }

    async fn execute(&self, param: &str) -> Result<String, ActionError> {
        let msg = Outbound::parse(self.name(), param)?;
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| missing_token(self.name(), "TELEGRAM_TOKEN"))?;
        let upload = msg.upload(self.name()).await?;
        let uploaded = upload.is_some();

        let request = match (upload, msg.file.as_deref()) {
            (Some(upload), Some(file)) => {
                let (method, field) = telegram_method(file);
                debug!(target = %msg.target, method, "Telegram upload");
                let mut form = Form::new().text("chat_id", msg.target.clone());
                if !msg.text.is_empty() {
                    form = form.text("caption", msg.text.clone());
                }
                self.client
                    .post(format!("{}/bot{token}/{method}", self.api_base))
                    .multipart(form.part(field, upload.part()))
            }
            _ => {
                debug!(target = %msg.target, "Telegram send");
                self.client
                    .post(format!("{}/bot{token}/sendMessage", self.api_base))
                    .json(&json!({ "chat_id": msg.target, "text": msg.text }))
            }
        };

        let resp = request
            .send()
            .await
            .map_err(|e| send_failed(self.name(), e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            Ok(msg.delivered("Telegram", uploaded))
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(send_failed(self.name(), format!("Telegram API (HTTP {}): {body}", status.as_u16())))
        }
    }
}

pub struct DiscordSendAction {
    client: reqwest::Client,
    token: Option<String>,
    api_base: String,
}

impl DiscordSendAction {
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: http_client(),
            token: token.filter(|t| !t.is_empty()),
            api_base: DISCORD_API.into(),
        }
    }

    /// Point the action at another Discord API root.
    pub fn with_api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl ActionHandler for DiscordSendAction {
    fn name(&self) -> &str {
        "DISCORD_SEND"
    }

    fn description(&self) -> &str {
        "Send a Discord direct message (optionally with a file) through the bot"
    }

    fn param_hint(&self) -> &str {
        "user_id | text | optional file path"
    }

    async fn execute(&self, param: &str) -> Result<String, ActionError> {
        let msg = Outbound::parse(self.name(), param)?;
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| missing_token(self.name(), "DISCORD_TOKEN"))?;
        let auth = format!("Bot {token}");
        let upload = msg.upload(self.name()).await?;
        let uploaded = upload.is_some();

        // Open (or reuse) the DM channel, then post into it
        let dm = self
            .client
            .post(format!("{}/users/@me/channels", self.api_base))
            .header("Authorization", &auth)
            .json(&json!({ "recipient_id": msg.target }))
            .send()
            .await
            .map_err(|e| send_failed(self.name(), e.to_string()))?;

        if !dm.status().is_success() {
            let status = dm.status().as_u16();
            let body = dm.text().await.unwrap_or_default();
            return Err(send_failed(self.name(), format!("opening DM failed (HTTP {status}): {body}")));
        }

        let dm: serde_json::Value = dm
            .json()
            .await
            .map_err(|e| send_failed(self.name(), e.to_string()))?;
        let channel_id = dm["id"]
            .as_str()
            .ok_or_else(|| send_failed(self.name(), "DM response carried no channel id"))?;

        debug!(target = %msg.target, channel = %channel_id, uploaded, "Discord send");
        let request = self
            .client
            .post(format!("{}/channels/{channel_id}/messages", self.api_base))
            .header("Authorization", &auth);
        let request = match upload {
            Some(upload) => {
                let mut payload = json!({});
                if !msg.text.is_empty() {
                    payload["content"] = json!(msg.text);
                }
                let payload = Part::text(payload.to_string())
                    .mime_str("application/json")
                    .map_err(|e| send_failed(self.name(), e.to_string()))?;
                request.multipart(Form::new().part("payload_json", payload).part("files[0]", upload.part()))
            }
            None => request.json(&json!({ "content": msg.text })),
        };

        let resp = request
            .send()
            .await
            .map_err(|e| send_failed(self.name(), e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            Ok(msg.delivered("Discord", uploaded))
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(send_failed(self.name(), format!("Discord API (HTTP {}): {body}", status.as_u16())))
        }
    }
}

pub struct WhatsAppSendAction {
    client: reqwest::Client,
    bridge_url: String,
}

impl WhatsAppSendAction {
    pub fn new(bridge_url: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            bridge_url: bridge_url.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Bridge chat ids look like `5511999998888@c.us`.
pub fn whatsapp_chat_id(target: &str) -> String {
    if target.ends_with("@c.us") {
        return target.to_string();
    }
    let digits: String = target
        .chars()
        .filter(|c| !matches!(c, '+' | '-' | ' '))
        .collect();
    format!("{digits}@c.us")
}

/// Bridge payload; the media path is absolute and only sent when the file exists.
pub fn whatsapp_payload(msg: &Outbound) -> serde_json::Value {
    let mut payload = json!({ "to": whatsapp_chat_id(&msg.target), "message": msg.text });
    if let Some(file) = &msg.file {
        let path = Path::new(file);
        if path.exists() {
            let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
            payload["mediaPath"] = json!(absolute.to_string_lossy());
        } else {
            warn!(file = %file, "WhatsApp attachment not found, sending text only");
        }
    }
    payload
}

#[async_trait]
impl ActionHandler for WhatsAppSendAction {
    fn name(&self) -> &str {
        "WHATSAPP_SEND"
    }

    fn description(&self) -> &str {
        "Send a WhatsApp message (optionally with a file) through the local bridge"
    }

    fn param_hint(&self) -> &str {
        "phone number | text | optional file path"
    }

    async fn execute(&self, param: &str) -> Result<String, ActionError> {
        let msg = Outbound::parse(self.name(), param)?;
        let payload = whatsapp_payload(&msg);

        debug!(to = %payload["to"], "WhatsApp send");
        let resp = self
            .client
            .post(format!("{}/send_whatsapp", self.bridge_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| send_failed(self.name(), format!("WhatsApp bridge unreachable at {}: {e}", self.bridge_url)))?;

        let status = resp.status();
        if status.is_success() {
            Ok("Message handed to the WhatsApp bridge.".into())
        } else {
            Err(send_failed(self.name(), format!("WhatsApp bridge reported HTTP {}", status.as_u16())))
        }
    }
}
