use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Longest text the webhook accepts in one message
pub const MAX_MESSAGE_CHARS: usize = 1800;

/// Where finished text blocks are delivered
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text`, split as needed. Returns how many parts failed;
    /// failures are logged and never retried.
    async fn push(&self, text: &str) -> usize;
}

#[derive(Serialize)]
struct TextMessage<'a> {
    msgtype: &'static str,
    text: TextContent<'a>,
}

#[derive(Serialize)]
struct TextContent<'a> {
    content: &'a str,
}

#[derive(Deserialize)]
struct WebhookResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// Group-chat robot webhook (`{"msgtype":"text"}` payloads)
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn send_chunk(&self, chunk: &str) -> Result<()> {
        let message = TextMessage {
            msgtype: "text",
            text: TextContent { content: chunk },
        };

        let response = self
            .client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .context("Failed to send webhook request")?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("Webhook returned error: {} - {}", status, body);
        }

        // The robot API answers 200 with an error code in the body
        if let Ok(reply) = serde_json::from_str::<WebhookResponse>(&body) {
            if reply.errcode != 0 {
                anyhow::bail!("Webhook rejected message: {} ({})", reply.errmsg, reply.errcode);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn push(&self, text: &str) -> usize {
        let chunks = split_message(text, MAX_MESSAGE_CHARS);
        info!(chars = text.chars().count(), chunks = chunks.len(), "pushing message");

        let mut failed = 0;
        for chunk in &chunks {
            if let Err(e) = self.send_chunk(chunk).await {
                error!(error = %e, "webhook push failed");
                failed += 1;
            }
        }

        if failed > 0 {
            warn!(failed, parts = chunks.len(), "message only partly delivered");
        }
        failed
    }
}

/// Prints messages instead of sending them (`--dry-run`)
pub struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn push(&self, text: &str) -> usize {
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            println!("----- message -----\n{}\n-------------------", chunk);
        }
        0
    }
}

/// Split on character boundaries into parts of at most `max_chars` characters.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.is_empty() || max_chars == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
