//! Outbound messaging channel (Telegram Bot API `sendMessage`).

use std::fmt;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum SendError {
    #[error("send request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("messaging api rejected message (status {status}): {description}")]
    Rejected { status: u16, description: String },
}

/// Pluggable delivery channel for rendered notifications.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), SendError>;
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramMessenger {
    http: reqwest::Client,
    endpoint: String,
}

impl fmt::Debug for TelegramMessenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramMessenger").finish_non_exhaustive()
    }
}

impl TelegramMessenger {
    pub fn new(api_base: &str, bot_token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let token = bot_token.trim();
        if token.is_empty() {
            anyhow::bail!("bot token is empty");
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building telegram client")?;
        Ok(Self {
            http,
            endpoint: send_message_endpoint(api_base, token),
        })
    }
}

fn send_message_endpoint(api_base: &str, token: &str) -> String {
    format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), token)
}

fn interpret_response(status: StatusCode, body: &str) -> Result<(), SendError> {
    let parsed = serde_json::from_str::<ApiResponse>(body).ok();
    match parsed {
        Some(resp) if status.is_success() && resp.ok => Ok(()),
        Some(resp) => Err(SendError::Rejected {
            status: status.as_u16(),
            description: resp
                .description
                .unwrap_or_else(|| "no description".to_string()),
        }),
        None if status.is_success() => Ok(()),
        None => Err(SendError::Rejected {
            status: status.as_u16(),
            description: body.chars().take(200).collect(),
        }),
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), SendError> {
        let payload = SendMessageRequest {
            chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };
        let resp = self.http.post(&self.endpoint).json(&payload).send().await?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let outcome = interpret_response(status, &body);
        if let Err(SendError::Rejected { description, .. }) = &outcome {
            warn!(%status, %description, "telegram rejected message");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_embeds_token_once() {
        assert_eq!(
            send_message_endpoint("https://api.telegram.org/", "123:abc"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn payload_requests_html_without_previews() {
        let payload = SendMessageRequest {
            chat_id: "-100123",
            text: "<b>hi</b>",
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["parse_mode"], "HTML");
        assert_eq!(json["disable_web_page_preview"], true);
        assert_eq!(json["chat_id"], "-100123");
    }

    #[test]
    fn api_failures_are_rejections() {
        assert!(interpret_response(StatusCode::OK, r#"{"ok":true,"result":{}}"#).is_ok());

        let err = interpret_response(
            StatusCode::BAD_REQUEST,
            r#"{"ok":false,"error_code":400,"description":"Bad Request: can't parse entities"}"#,
        )
        .expect_err("rejected");
        match err {
            SendError::Rejected {
                status,
                description,
            } => {
                assert_eq!(status, 400);
                assert!(description.contains("can't parse entities"));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(interpret_response(StatusCode::BAD_GATEWAY, "upstream down").is_err());
    }

    #[test]
    fn empty_token_is_a_startup_error() {
        assert!(TelegramMessenger::new(DEFAULT_TELEGRAM_API_BASE, "  ", Duration::from_secs(1)).is_err());
    }
}
