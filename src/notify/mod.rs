//! Push notification fan-out.
//!
//! One logical message goes to many device tokens. Outcomes are tracked
//! per token; a failure on one device never prevents delivery attempts to
//! the rest, and nothing here retries (retry policy belongs to callers).

pub mod expo;

use metrics::counter;
use serde::Serialize;
use tracing::{info, warn};

/// Per-token delivery result reported by a transport's bulk path.
#[derive(Debug, Clone)]
pub struct TokenOutcome {
    pub token: String,
    pub ok: bool,
    pub error: Option<String>,
}

/// Aggregated fan-out result. The same shape comes back from the bulk
/// path and the per-token fallback, so callers are transport-agnostic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FanoutSummary {
    pub success_count: usize,
    pub failure_count: usize,
    pub failed_tokens: Vec<String>,
}

/// Push delivery transport boundary.
///
/// `send_bulk` is the preferred path and must return one outcome per input
/// token; `send_one` is the degraded path used when the bulk call itself
/// fails at the transport level.
#[async_trait::async_trait]
pub trait PushTransport: Send + Sync {
    async fn send_bulk(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> anyhow::Result<Vec<TokenOutcome>>;

    async fn send_one(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> bool;

    fn name(&self) -> &'static str;
}

/// Deliver one message to every token, aggregating per-token outcomes.
///
/// An empty token list is a successful no-op: the transport is not
/// invoked at all.
pub async fn send_to_all(
    transport: &dyn PushTransport,
    tokens: &[String],
    title: &str,
    body: &str,
    data: &serde_json::Value,
) -> FanoutSummary {
    if tokens.is_empty() {
        return FanoutSummary::default();
    }

    let summary = match transport.send_bulk(tokens, title, body, data).await {
        Ok(outcomes) => aggregate(tokens, outcomes),
        Err(e) => {
            warn!(
                transport = transport.name(),
                error = %e,
                "bulk push failed, falling back to individual sends"
            );
            let mut summary = FanoutSummary::default();
            for token in tokens {
                if transport.send_one(token, title, body, data).await {
                    summary.success_count += 1;
                } else {
                    summary.failure_count += 1;
                    summary.failed_tokens.push(token.clone());
                }
            }
            summary
        }
    };

    // Failed tokens stay registered; delivery failures are often transient.
    for token in &summary.failed_tokens {
        warn!(%token, "push delivery failed for device token");
    }
    counter!("push_success_total").increment(summary.success_count as u64);
    counter!("push_failure_total").increment(summary.failure_count as u64);
    info!(
        transport = transport.name(),
        success = summary.success_count,
        failed = summary.failure_count,
        "push fan-out completed"
    );
    summary
}

fn aggregate(tokens: &[String], outcomes: Vec<TokenOutcome>) -> FanoutSummary {
    let mut summary = FanoutSummary::default();
    for outcome in &outcomes {
        if outcome.ok {
            summary.success_count += 1;
        } else {
            summary.failure_count += 1;
            summary.failed_tokens.push(outcome.token.clone());
        }
    }
    // A transport that reported fewer outcomes than tokens loses the tail;
    // count those as failures rather than silently dropping them.
    if outcomes.len() < tokens.len() {
        for token in &tokens[outcomes.len()..] {
            summary.failure_count += 1;
            summary.failed_tokens.push(token.clone());
        }
    }
    summary
}
