//! OpenAI-backed news analysis producer.
//!
//! One chat-completions call asks the model for a JSON array of scored
//! market-moving news items. The raw completion text is handed to the
//! normalizer untouched; models routinely wrap the array in commentary or
//! a code fence and the normalizer owns that cleanup.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{NewsProducer, ProducerOutput};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = "You are a financial news analyst. Find recent \
news with high impact on the US stock market. Return ONLY a JSON array of \
objects with fields: title (string), summary (string), url (string), \
published_date (YYYY-MM-DD), score (integer -10..10, signed market impact), \
tickers (array of affected symbols). No prose.";

pub struct OpenAiNewsProducer {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiNewsProducer {
    /// `model_override`: pass Some("gpt-4o") to override the default model.
    pub fn new(model_override: Option<&str>) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent("stock-news-notifier/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model: model_override.unwrap_or(DEFAULT_MODEL).to_string(),
        }
    }
}

#[async_trait::async_trait]
impl NewsProducer for OpenAiNewsProducer {
    async fn produce(&self) -> Result<ProducerOutput> {
        if self.api_key.is_empty() {
            anyhow::bail!("OPENAI_API_KEY is not set");
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: "Analyze today's US stock market news.",
                },
            ],
            temperature: 0.1,
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("openai request failed")?
            .error_for_status()
            .context("openai non-2xx")?;

        let body: Resp = resp.json().await.context("openai response body")?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        Ok(ProducerOutput::Text(content))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
