//! Structured (JSON) generation on top of free-text completions
//!
//! Models are asked to answer with JSON only, but often wrap it in prose or a
//! code fence anyway. Extraction is therefore a best-effort scan for the first
//! balanced `{...}` or `[...]` span that parses. It fails loudly with an
//! [`ExtractionError`] rather than handing back an empty value; callers that
//! need schema conformance must still validate `data` themselves.

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ExtractionError, RelayError};
use crate::orchestrator::Orchestrator;
use crate::types::{ChatMessage, ChatRequest, StructuredResponse};

const JSON_ONLY_INSTRUCTION: &str = "Respond only with valid JSON. Do not include explanations, \
markdown code fences, or any text before or after the JSON value.";

/// Build the request sent for a structured generation
pub fn structured_request(prompt: &str, schema: Option<&str>, temperature: f32) -> ChatRequest {
    let system = match schema {
        Some(schema) => format!(
            "{}\n\nThe JSON must conform to this schema:\n{}",
            JSON_ONLY_INSTRUCTION, schema
        ),
        None => JSON_ONLY_INSTRUCTION.to_string(),
    };
    ChatRequest::new(vec![ChatMessage::user(prompt)])
        .with_system_prompt(system)
        .with_temperature(temperature)
}

impl Orchestrator {
    /// Generate a completion and parse the JSON value embedded in it
    pub async fn generate_structured(
        &self,
        prompt: &str,
        schema: Option<&str>,
    ) -> Result<StructuredResponse, RelayError> {
        self.generate_structured_with_cancel(prompt, schema, &CancellationToken::new())
            .await
    }

    pub async fn generate_structured_with_cancel(
        &self,
        prompt: &str,
        schema: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<StructuredResponse, RelayError> {
        let request = structured_request(prompt, schema, self.structured_temperature());
        let response = self.chat_completion_with_cancel(&request, cancel).await?;

        match extract_json(&response.content) {
            Ok(data) => {
                debug!("Extracted structured output from {}", response.provider);
                Ok(StructuredResponse {
                    data,
                    provider: response.provider,
                })
            }
            Err(e) => {
                warn!("Structured output from {} unusable: {}", response.provider, e);
                Err(e.into())
            }
        }
    }
}

/// Most opening brackets tried before giving up on a reply
const MAX_CANDIDATES: usize = 64;

/// Find and parse the JSON object or array embedded in `content`.
///
/// The first balanced span that parses wins, except that a one-element array
/// of a scalar (a citation marker such as `[1]`) only wins when nothing else
/// parses: `"per [1]: {\"a\":1}"` yields the object.
pub fn extract_json(content: &str) -> Result<Value, ExtractionError> {
    let bytes = content.as_bytes();
    let mut first_error = None;
    let mut first_marker = None;
    let mut candidates = 0;
    let mut pos = 0;

    while pos < bytes.len() {
        let Some(offset) = bytes[pos..].iter().position(|&b| b == b'{' || b == b'[') else {
            break;
        };
        let start = pos + offset;

        candidates += 1;
        if candidates > MAX_CANDIDATES {
            debug!("Stopped JSON scan after {} candidates", MAX_CANDIDATES);
            break;
        }

        match balanced_span_at(content, start) {
            Some(span) => {
                match serde_json::from_str::<Value>(span) {
                    Ok(value) if is_citation_marker(&value) => {
                        first_marker.get_or_insert(value);
                    }
                    Ok(value) => return Ok(value),
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
                // Don't dig into a span that was consumed as a whole
                pos = start + span.len();
            }
            None => pos = start + 1,
        }
    }

    if let Some(marker) = first_marker {
        return Ok(marker);
    }
    Err(match first_error {
        Some(e) => ExtractionError::parse(content, e),
        None => ExtractionError::not_found(content),
    })
}

fn is_citation_marker(value: &Value) -> bool {
    match value.as_array().map(Vec::as_slice) {
        Some([item]) => !(item.is_object() || item.is_array()),
        _ => false,
    }
}

/// The bracket-balanced span opening at byte `start`, skipping brackets inside
/// JSON strings. `None` if it never closes or closes with the wrong bracket.
fn balanced_span_at(content: &str, start: usize) -> Option<&str> {
    let mut expected: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in content.as_bytes()[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => expected.push(b'}'),
            b'[' => expected.push(b']'),
            b'}' | b']' => {
                if expected.pop() != Some(b) {
                    return None;
                }
                if expected.is_empty() {
                    return Some(&content[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ProviderRegistry;
    use crate::testing::{Behavior, ScriptedAdapter, call_log};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_extract_bare_object() {
        assert_eq!(extract_json(r#"{"a":1}"#).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_extract_object_wrapped_in_prose() {
        let content = "Sure! Here you go: {\"a\":1} — hope that helps";
        assert_eq!(extract_json(content).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_extract_from_code_fence() {
        let content = "```json\n[{\"name\": \"x\"}, {\"name\": \"y\"}]\n```";
        assert_eq!(
            extract_json(content).unwrap(),
            json!([{"name": "x"}, {"name": "y"}])
        );
    }

    #[test]
    fn test_brackets_inside_strings_are_ignored() {
        let content = r#"result: {"text": "a } b ] c", "escaped": "quote \" {"}"#;
        assert_eq!(
            extract_json(content).unwrap(),
            json!({"text": "a } b ] c", "escaped": "quote \" {"})
        );
    }

    #[test]
    fn test_skips_prose_brackets_before_json() {
        let content = r#"[note] the answer is {"a": [1, 2]}"#;
        assert_eq!(extract_json(content).unwrap(), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_does_not_return_fragment_of_broken_object() {
        let content = r#"{name: 'x', tags: ["a"]}"#;
        assert!(matches!(
            extract_json(content),
            Err(ExtractionError::Parse { .. })
        ));
    }

    #[test]
    fn test_no_json_is_not_found() {
        let err = extract_json("no json here").unwrap_err();
        assert!(matches!(err, ExtractionError::NotFound { .. }));
        assert_eq!(err.sample(), "no json here");
    }

    #[test]
    fn test_unclosed_object_is_not_found() {
        assert!(matches!(
            extract_json(r#"{"a": 1"#),
            Err(ExtractionError::NotFound { .. })
        ));
    }

    #[test]
    fn test_malformed_object_is_parse_error() {
        let err = extract_json(r#"here: {"a": }"#).unwrap_err();
        assert!(matches!(err, ExtractionError::Parse { .. }));
        assert!(err.sample().contains(r#"{"a": }"#));
    }

    #[test]
    fn test_citation_marker_does_not_shadow_payload() {
        let content = r#"per [1]: {"a":1} and see [2]"#;
        assert_eq!(extract_json(content).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_lone_citation_style_array_is_still_returned() {
        assert_eq!(extract_json("the answer is [1]").unwrap(), json!([1]));
        assert_eq!(extract_json(r#"["only"]"#).unwrap(), json!(["only"]));
    }

    #[test]
    fn test_single_object_array_is_payload() {
        let content = r#"[{"a":1}] then {"b":2}"#;
        assert_eq!(extract_json(content).unwrap(), json!([{"a": 1}]));
    }

    #[test]
    fn test_unclosed_brackets_do_not_hide_later_json() {
        let content = r#"{ oops { still open {"a": 1}"#;
        assert_eq!(extract_json(content).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_runaway_unclosed_brackets_stop_scanning() {
        let mut content = "{".repeat(200_000);
        content.push_str(r#"{"a": 1}"#);
        assert!(matches!(
            extract_json(&content),
            Err(ExtractionError::NotFound { .. })
        ));
    }

    #[test]
    fn test_out_of_range_structured_temperature_is_not_used() {
        let config = crate::config::RelayConfig::from_lookup(|key| {
            (key == "RELAY_STRUCTURED_TEMPERATURE").then(|| "2.5".to_string())
        });
        let orchestrator = Orchestrator::from_config(&config).unwrap();
        assert_eq!(
            orchestrator.structured_temperature(),
            crate::config::DEFAULT_STRUCTURED_TEMPERATURE
        );
    }

    #[test]
    fn test_structured_request_embeds_schema() {
        let req = structured_request("list colors", Some(r#"{"colors": ["string"]}"#), 0.3);
        let system = req.system_prompt.as_deref().unwrap();
        assert!(system.starts_with("Respond only with valid JSON"));
        assert!(system.contains(r#"{"colors": ["string"]}"#));
        assert_eq!(req.temperature, Some(0.3));
        assert_eq!(req.messages, vec![ChatMessage::user("list colors")]);

        let plain = structured_request("x", None, 0.3);
        assert!(!plain.system_prompt.unwrap().contains("schema"));
    }

    fn orchestrator_with(content: &str) -> (Orchestrator, Arc<ScriptedAdapter>) {
        let adapter = ScriptedAdapter::new(
            "c",
            "C",
            Behavior::Succeed {
                content: content.to_string(),
                delay: Duration::ZERO,
            },
            &call_log(),
        );
        let registry = ProviderRegistry::new().with_provider(adapter.clone(), Duration::from_secs(1));
        (Orchestrator::new(Arc::new(registry)), adapter)
    }

    #[tokio::test]
    async fn test_generate_structured_returns_data_and_provider() {
        let (orchestrator, adapter) = orchestrator_with("Sure! Here you go: {\"a\":1} — hope that helps");
        let out = orchestrator
            .generate_structured("give me a", Some("{\"a\": \"number\"}"))
            .await
            .unwrap();
        assert_eq!(out.data, json!({"a": 1}));
        assert_eq!(out.provider, "C");

        let sent = adapter.last_request().unwrap();
        assert_eq!(sent.temperature, Some(0.3));
        assert!(sent.system_prompt.unwrap().contains("{\"a\": \"number\"}"));
    }

    #[tokio::test]
    async fn test_generate_structured_uses_configured_temperature() {
        let (orchestrator, adapter) = orchestrator_with("[]");
        let orchestrator = orchestrator.with_structured_temperature(0.1);
        let out = orchestrator.generate_structured("x", None).await.unwrap();
        assert_eq!(out.data, json!([]));
        assert_eq!(adapter.last_request().unwrap().temperature, Some(0.1));
    }

    #[tokio::test]
    async fn test_generate_structured_without_json_fails() {
        let (orchestrator, _) = orchestrator_with("no json here");
        let err = orchestrator.generate_structured("x", None).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::Extraction(ExtractionError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_generate_structured_propagates_exhaustion() {
        let registry = ProviderRegistry::new().with_provider(
            ScriptedAdapter::new("a", "A", Behavior::Fail("down".to_string()), &call_log()),
            Duration::from_secs(1),
        );
        let orchestrator = Orchestrator::new(Arc::new(registry));
        let err = orchestrator.generate_structured("x", None).await.unwrap_err();
        assert!(matches!(err, RelayError::Exhausted(_)));
    }
}
