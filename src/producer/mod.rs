// src/producer/mod.rs
pub mod openai;

use anyhow::Result;

/// The shapes an external analysis producer is known to return.
///
/// The producer is an opaque process; its output is modelled as a tagged
/// union so the normalizer branches on variants instead of sniffing types
/// at runtime.
#[derive(Debug, Clone)]
pub enum ProducerOutput {
    /// Structured container exposing the payload under a `raw` or
    /// `output` field.
    Container(serde_json::Value),
    /// A bare list of entity-shaped mappings.
    Items(Vec<serde_json::Value>),
    /// A single entity-shaped mapping.
    Item(serde_json::Map<String, serde_json::Value>),
    /// Free-form text, possibly wrapping JSON in prose or code fences.
    Text(String),
}

#[async_trait::async_trait]
pub trait NewsProducer: Send + Sync {
    /// Run one analysis pass and return whatever the producer emitted.
    async fn produce(&self) -> Result<ProducerOutput>;
    fn name(&self) -> &'static str;
}

/// Canned producer for tests and local runs. With `output == None` every
/// call fails, which exercises the upstream-unavailable path.
#[derive(Debug, Clone)]
pub struct FixedProducer {
    output: Option<ProducerOutput>,
}

impl FixedProducer {
    pub fn new(output: ProducerOutput) -> Self {
        Self {
            output: Some(output),
        }
    }

    pub fn failing() -> Self {
        Self { output: None }
    }
}

#[async_trait::async_trait]
impl NewsProducer for FixedProducer {
    async fn produce(&self) -> Result<ProducerOutput> {
        match &self.output {
            Some(out) => Ok(out.clone()),
            None => anyhow::bail!("fixed producer configured to fail"),
        }
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}
