//! Expo push transport.
//!
//! Talks to the Expo push HTTP API. The bulk path posts one request for
//! the whole token list; Expo returns a ticket per message in input order.
//! A ticket with `status != "ok"` marks that token failed without
//! affecting the rest of the batch.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{PushTransport, TokenOutcome};

const EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

#[derive(Debug, Serialize)]
struct ExpoMessage<'a> {
    to: &'a str,
    title: &'a str,
    body: &'a str,
    data: &'a serde_json::Value,
    sound: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExpoResponse {
    data: Vec<ExpoTicket>,
}

#[derive(Debug, Deserialize)]
struct ExpoTicket {
    status: String,
    message: Option<String>,
}

pub struct ExpoPush {
    http: reqwest::Client,
    /// Optional access token for enhanced push security accounts.
    access_token: Option<String>,
}

impl ExpoPush {
    pub fn new(access_token: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("stock-news-notifier/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self { http, access_token }
    }

    fn messages<'a>(
        tokens: &'a [String],
        title: &'a str,
        body: &'a str,
        data: &'a serde_json::Value,
    ) -> Vec<ExpoMessage<'a>> {
        tokens
            .iter()
            .map(|to| ExpoMessage {
                to,
                title,
                body,
                data,
                sound: "default",
            })
            .collect()
    }

    async fn post(&self, payload: &impl Serialize) -> Result<ExpoResponse> {
        let mut req = self.http.post(EXPO_PUSH_URL).json(payload);
        if let Some(token) = &self.access_token {
            req = req.bearer_auth(token);
        }
        let resp = req
            .send()
            .await
            .context("expo push request failed")?
            .error_for_status()
            .context("expo push non-2xx")?;
        resp.json::<ExpoResponse>()
            .await
            .context("expo push response body")
    }
}

#[async_trait::async_trait]
impl PushTransport for ExpoPush {
    async fn send_bulk(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> Result<Vec<TokenOutcome>> {
        let response = self.post(&Self::messages(tokens, title, body, data)).await?;

        // Tickets come back in input order; missing tail tickets are
        // treated as failures by the fan-out aggregation.
        let outcomes = tokens
            .iter()
            .zip(response.data)
            .map(|(token, ticket)| TokenOutcome {
                token: token.clone(),
                ok: ticket.status == "ok",
                error: ticket.message,
            })
            .collect();
        Ok(outcomes)
    }

    async fn send_one(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> bool {
        let tokens = [token.to_string()];
        match self.post(&Self::messages(&tokens, title, body, data)).await {
            Ok(response) => response
                .data
                .first()
                .map(|t| t.status == "ok")
                .unwrap_or(false),
            Err(e) => {
                warn!(%token, error = %e, "individual expo send failed");
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "expo"
    }
}
