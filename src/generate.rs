//! Text-generation collaborator.
//!
//! The rhythm core never calls this itself; the explanation layer around it
//! does, sharing the same retry policy as the oracle.

mod command;

pub use command::{CommandGenerator, EXIT_TEMPFAIL};

use crate::concurrent::{map_tolerant, Outcome, ProgressObserver};
use crate::retry::{Retryable, RetryPolicy};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GenerateError {
    /// Rate limit, 5xx or timeout
    #[error("transient generation failure: {0}")]
    Transient(String),

    #[error("generation failed: {0}")]
    Fatal(String),
}

impl Retryable for GenerateError {
    fn is_transient(&self) -> bool {
        matches!(self, GenerateError::Transient(_))
    }

    fn exhausted(attempts: u32, last: Self) -> Self {
        GenerateError::Fatal(format!("gave up after {attempts} attempts: {last}"))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

#[async_trait(?Send)]
pub trait TextGenerator {
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, GenerateError>;
}

pub async fn generate_with_retry(
    generator: &dyn TextGenerator,
    request: &GenerateRequest,
    policy: &RetryPolicy,
) -> Result<String, GenerateError> {
    policy
        .run("generate", || {
            generator.generate(
                &request.prompt,
                &request.model,
                request.temperature,
                request.max_tokens,
            )
        })
        .await
}

/// Generates every request with at most `concurrency` calls in flight. A
/// request that still fails after retries is reported in its outcome instead
/// of failing the others.
pub async fn generate_all<K>(
    generator: &dyn TextGenerator,
    requests: &HashMap<K, GenerateRequest>,
    concurrency: usize,
    policy: &RetryPolicy,
    observer: &mut dyn ProgressObserver,
) -> HashMap<K, Outcome<String>>
where
    K: Eq + Hash + Clone,
{
    map_tolerant(requests.keys().cloned(), concurrency, observer, |key| async move {
        match requests.get(&key) {
            Some(request) => generate_with_retry(generator, request, policy)
                .await
                .map(|text| text.trim().to_string()),
            None => Err(GenerateError::Fatal("request vanished".into())),
        }
    })
    .await
}

/// First JSON object in a model reply: the whole text if it parses, else the
/// span from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let parse = |s: &str| {
        serde_json::from_str::<serde_json::Value>(s)
            .ok()
            .filter(serde_json::Value::is_object)
    };
    parse(text.trim()).or_else(|| {
        let start = text.find('{')?;
        let end = text.rfind('}')?;
        (start < end).then(|| parse(&text[start..=end])).flatten()
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrent::NoProgress;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FlakyGenerator {
        failures_left: RefCell<HashMap<String, u32>>,
    }

    #[async_trait(?Send)]
    impl TextGenerator for FlakyGenerator {
        async fn generate(
            &self,
            prompt: &str,
            model: &str,
            _temperature: f32,
            _max_tokens: Option<u32>,
        ) -> Result<String, GenerateError> {
            if prompt.contains("forbidden") {
                return Err(GenerateError::Fatal("blocked".into()));
            }
            let mut left = self.failures_left.borrow_mut();
            let n = left.entry(prompt.to_string()).or_insert(1);
            if *n > 0 {
                *n -= 1;
                return Err(GenerateError::Transient("429".into()));
            }
            Ok(format!(" {model}: {prompt} "))
        }
    }

    fn request(prompt: &str) -> GenerateRequest {
        GenerateRequest {
            prompt: prompt.to_string(),
            model: "m".to_string(),
            temperature: 0.25,
            max_tokens: Some(350),
        }
    }

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay_ms: 1,
            jitter_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_retry_then_succeed() {
        let generator = FlakyGenerator::default();
        let text = generate_with_retry(&generator, &request("hello"), &quick())
            .await
            .unwrap();
        assert_eq!(text, " m: hello ");
    }

    #[tokio::test]
    async fn test_one_failure_does_not_blank_the_rest() {
        let generator = FlakyGenerator::default();
        let mut requests = HashMap::new();
        requests.insert(1, request("line one"));
        requests.insert(2, request("forbidden line"));
        requests.insert(3, request("line three"));

        let out = generate_all(&generator, &requests, 2, &quick(), &mut NoProgress).await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[&1].value.as_deref(), Some("m: line one"));
        assert!(out[&2].value.is_none());
        assert!(out[&2].error.as_deref().unwrap().contains("blocked"));
        assert!(out[&3].is_ok());
    }

    #[test]
    fn test_extract_json_object() {
        let v = extract_json_object(r#"{"move_uci": "e2e4"}"#).unwrap();
        assert_eq!(v["move_uci"], "e2e4");
        let v = extract_json_object("Sure!\n```json\n{\"short_reason\": \"wins a piece\"}\n```").unwrap();
        assert_eq!(v["short_reason"], "wins a piece");
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("[1, 2]").is_none());
    }
}
