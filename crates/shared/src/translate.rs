use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;
use url::Url;

const MAX_CHARS: usize = 200;

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(rename = "responseStatus", default)]
    response_status: serde_json::Value,
    #[serde(rename = "responseData", default)]
    response_data: Option<ResponseData>,
}

#[derive(Deserialize)]
struct ResponseData {
    #[serde(rename = "translatedText", default)]
    translated_text: Option<String>,
}

/// English to Chinese title translation through the MyMemory API.
///
/// Translation is best effort: any failure returns the input unchanged.
pub struct Translator {
    client: Client,
    api_url: String,
}

impl Translator {
    pub fn new(api_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }

    /// Chinese rendering of `text`, or `None` when no translation was made
    pub async fn translate(&self, text: &str) -> Option<String> {
        if text.trim().is_empty() || contains_cjk(text) {
            return None;
        }

        let query = truncate_chars(text, MAX_CHARS);
        match self.request(&query).await {
            Ok(Some(translated)) if translated != query && translated != text => Some(translated),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "translation failed");
                None
            }
        }
    }

    async fn request(&self, query: &str) -> Result<Option<String>> {
        let url = Url::parse_with_params(&self.api_url, &[("q", query), ("langpair", "en|zh-CN")])
            .context("Invalid translation API URL")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send translation request")?;

        if !response.status().is_success() {
            anyhow::bail!("Translation API returned error: {}", response.status());
        }

        let body = response
            .json::<TranslateResponse>()
            .await
            .context("Failed to parse translation response")?;

        // The API reports the status as a number or a numeric string
        let ok = match &body.response_status {
            serde_json::Value::Number(n) => n.as_u64() == Some(200),
            serde_json::Value::String(s) => s == "200",
            _ => false,
        };
        if !ok {
            return Ok(None);
        }

        Ok(body
            .response_data
            .and_then(|d| d.translated_text)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()))
    }
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max).collect();
    truncated.push_str("...");
    truncated
}
