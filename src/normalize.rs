//! Entity normalizer.
//!
//! Converts an opaque producer result into canonical `NewsEntity` values.
//! This function never fails: unparseable input yields an empty batch and
//! the reasons are carried back as recoverable drop notes. A partially
//! valid batch still yields the whole valid subset.

use once_cell::sync::OnceCell;
use regex::Regex;
use serde_json::Value;

use crate::news::{NewsEntity, SCORE_MAX, SCORE_MIN};
use crate::producer::ProducerOutput;

/// Result of normalizing one producer batch.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub entities: Vec<NewsEntity>,
    /// Human-readable reasons for every element or payload that was
    /// discarded. Logged by the caller, never fatal.
    pub dropped: Vec<String>,
}

/// Normalize a producer result into a list of news entities.
pub fn normalize(output: ProducerOutput) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    match output {
        ProducerOutput::Container(value) => {
            let inner = unwrap_container(value);
            collect_value(inner, &mut batch);
        }
        ProducerOutput::Items(items) => {
            for item in items {
                coerce_into(&item, &mut batch);
            }
        }
        ProducerOutput::Item(map) => {
            coerce_into(&Value::Object(map), &mut batch);
        }
        ProducerOutput::Text(text) => collect_text(&text, &mut batch),
    }
    batch
}

/// Containers expose the payload under `raw` or `output`; anything else is
/// treated as the payload itself.
fn unwrap_container(value: Value) -> Value {
    if let Value::Object(mut map) = value {
        if let Some(inner) = map.remove("raw").or_else(|| map.remove("output")) {
            return inner;
        }
        return Value::Object(map);
    }
    value
}

fn collect_value(value: Value, batch: &mut NormalizedBatch) {
    match value {
        Value::String(text) => collect_text(&text, batch),
        other => collect_parsed(other, batch),
    }
}

fn collect_text(text: &str, batch: &mut NormalizedBatch) {
    let unfenced = strip_code_fences(text);
    let Some(json_slice) = extract_json_slice(&unfenced) else {
        batch
            .dropped
            .push("producer text contains no JSON array or object".to_string());
        return;
    };
    match serde_json::from_str::<Value>(json_slice) {
        Ok(parsed) => collect_parsed(parsed, batch),
        Err(e) => {
            batch
                .dropped
                .push(format!("producer text is not valid JSON: {e}"));
        }
    }
}

fn collect_parsed(value: Value, batch: &mut NormalizedBatch) {
    match value {
        // Common wrapper emitted by the analysis process.
        Value::Object(mut map) if map.contains_key("news_items") => {
            if let Some(inner) = map.remove("news_items") {
                collect_parsed(inner, batch);
            }
        }
        Value::Array(items) => {
            for item in items {
                coerce_into(&item, batch);
            }
        }
        obj @ Value::Object(_) => coerce_into(&obj, batch),
        other => {
            batch
                .dropped
                .push(format!("unexpected JSON payload shape: {other}"));
        }
    }
}

fn coerce_into(value: &Value, batch: &mut NormalizedBatch) {
    match coerce_entity(value) {
        Ok(entity) => batch.entities.push(entity),
        Err(reason) => batch.dropped.push(reason),
    }
}

/// Strict field-by-field construction of one entity. Field aliases cover
/// the shapes the analysis process has been observed to emit.
fn coerce_entity(value: &Value) -> Result<NewsEntity, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| format!("element is not an object: {value}"))?;

    let title = required_string(obj, "title")?;
    let url = required_string(obj, "url")?;
    let summary = obj
        .get("summary")
        .or_else(|| obj.get("summarize"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let score = match obj.get("score").or_else(|| obj.get("impact_score")) {
        None | Some(Value::Null) => 0,
        Some(v) => v
            .as_i64()
            .map(|n| (n as i32).clamp(SCORE_MIN, SCORE_MAX))
            .ok_or_else(|| format!("field `score` is not an integer in element for {url}"))?,
    };

    // Producer-supplied date; malformed values degrade to None rather than
    // dropping an otherwise valid element.
    let published_at = obj
        .get("published_at")
        .or_else(|| obj.get("published_date"))
        .and_then(Value::as_str)
        .and_then(parse_date);

    let tickers = obj
        .get("tickers")
        .or_else(|| obj.get("affected_tickers"))
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(NewsEntity {
        title,
        summary,
        url,
        published_at,
        score,
        tickers,
    })
}

fn required_string(
    obj: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<String, String> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| format!("missing required field `{field}`"))
}

fn parse_date(s: &str) -> Option<chrono::NaiveDate> {
    // Plain date, or the date part of an ISO 8601 timestamp.
    s.get(..10).and_then(|d| d.parse().ok())
}

/// Strip fenced code blocks regardless of the declared language tag,
/// keeping their contents. Text outside fences is preserved so the
/// bracket slicing below still sees the full payload.
fn strip_code_fences(s: &str) -> String {
    static RE_FENCE: OnceCell<Regex> = OnceCell::new();
    let re = RE_FENCE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*\n?(.*?)```").unwrap());
    if re.is_match(s) {
        re.replace_all(s, "$1").into_owned()
    } else {
        s.to_string()
    }
}

/// Locate the first balanced top-level JSON array or object by first/last
/// bracket position, discarding surrounding prose.
fn extract_json_slice(s: &str) -> Option<&str> {
    let array_start = s.find('[');
    let object_start = s.find('{');
    let (open, close) = match (array_start, object_start) {
        (Some(a), Some(o)) if a < o => (a, s.rfind(']')?),
        (Some(a), None) => (a, s.rfind(']')?),
        (_, Some(o)) => (o, s.rfind('}')?),
        (None, None) => return None,
    };
    if close <= open {
        return None;
    }
    Some(&s[open..=close])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ITEM: &str = r#"{"title":"Fed cuts rates","summary":"Surprise 50bp cut.","url":"https://x/fed","published_date":"2025-03-01","score":9,"tickers":["SPY","DIA"]}"#;

    fn bare_array() -> String {
        format!("[{ITEM}]")
    }

    #[test]
    fn fenced_json_with_prose_equals_bare_array() {
        let fenced = format!(
            "Here is the analysis you asked for:\n```json\n{}\n```\nLet me know if you need more.",
            bare_array()
        );
        let from_fenced = normalize(ProducerOutput::Text(fenced));
        let from_bare = normalize(ProducerOutput::Text(bare_array()));

        assert_eq!(from_fenced.entities, from_bare.entities);
        assert_eq!(from_fenced.entities.len(), 1);
        let e = &from_fenced.entities[0];
        assert_eq!(e.url, "https://x/fed");
        assert_eq!(e.score, 9);
        assert_eq!(e.tickers, vec!["SPY".to_string(), "DIA".to_string()]);
        assert_eq!(
            e.published_at,
            Some(chrono::NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())
        );
    }

    #[test]
    fn news_items_wrapper_equals_bare_list() {
        let wrapped = format!(r#"{{"news_items": [{ITEM}]}}"#);
        let a = normalize(ProducerOutput::Text(wrapped));
        let b = normalize(ProducerOutput::Text(bare_array()));
        assert_eq!(a.entities, b.entities);
    }

    #[test]
    fn container_raw_field_is_unwrapped() {
        let container = json!({ "raw": format!("```\n{}\n```", bare_array()) });
        let batch = normalize(ProducerOutput::Container(container));
        assert_eq!(batch.entities.len(), 1);

        let container = json!({ "output": [serde_json::from_str::<Value>(ITEM).unwrap()] });
        let batch = normalize(ProducerOutput::Container(container));
        assert_eq!(batch.entities.len(), 1);
    }

    #[test]
    fn single_object_becomes_one_element_list() {
        let map = serde_json::from_str::<Value>(ITEM)
            .unwrap()
            .as_object()
            .cloned()
            .unwrap();
        let batch = normalize(ProducerOutput::Item(map));
        assert_eq!(batch.entities.len(), 1);
    }

    #[test]
    fn invalid_element_is_dropped_but_siblings_survive() {
        let text = format!(
            r#"[{ITEM}, {{"title":"No url here","summary":"s","score":3}}, {{"title":"Bad score","url":"https://x/2","score":"abc"}}]"#
        );
        let batch = normalize(ProducerOutput::Text(text));
        assert_eq!(batch.entities.len(), 1);
        assert_eq!(batch.dropped.len(), 2);
        assert!(batch.dropped[0].contains("url"));
        assert!(batch.dropped[1].contains("score"));
    }

    #[test]
    fn unparseable_text_yields_empty_batch_not_panic() {
        let batch = normalize(ProducerOutput::Text("no json at all".to_string()));
        assert!(batch.entities.is_empty());
        assert_eq!(batch.dropped.len(), 1);

        let batch = normalize(ProducerOutput::Text("prose [not, valid json".to_string()));
        assert!(batch.entities.is_empty());
        assert!(!batch.dropped.is_empty());
    }

    #[test]
    fn field_aliases_are_accepted() {
        let text = r#"[{"title":"t","summarize":"old name","url":"https://x/3","published_at":"2025-01-02T08:00:00Z","impact_score":15,"affected_tickers":["AAPL"]}]"#;
        let batch = normalize(ProducerOutput::Text(text.to_string()));
        assert_eq!(batch.entities.len(), 1);
        let e = &batch.entities[0];
        assert_eq!(e.summary, "old name");
        // Out-of-range scores are clamped into -10..=10.
        assert_eq!(e.score, 10);
        assert_eq!(e.tickers, vec!["AAPL".to_string()]);
        assert_eq!(
            e.published_at,
            Some(chrono::NaiveDate::from_ymd_opt(2025, 1, 2).unwrap())
        );
    }

    #[test]
    fn missing_score_defaults_to_zero_and_bad_date_degrades() {
        let text = r#"[{"title":"t","summary":"s","url":"https://x/4","published_date":"soon"}]"#;
        let batch = normalize(ProducerOutput::Text(text.to_string()));
        assert_eq!(batch.entities.len(), 1);
        assert_eq!(batch.entities[0].score, 0);
        assert!(batch.entities[0].published_at.is_none());
    }
}
