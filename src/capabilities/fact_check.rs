//! Claim verification backends
//!
//! - [`WolframFactChecker`] asks the Wolfram|Alpha Full Results API whether a
//!   claim is true and reads the answer pods.
//! - [`LlmFactChecker`] asks the configured LLM for a one-word verdict.

use crate::capabilities::{CapabilityError, FactChecker, Verdict};
use crate::llm::LLMClient;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Pods whose plaintext carries the answer to an "is it true that" query.
const ANSWER_PODS: &[&str] = &["Result", "Answer"];
/// Pods Wolfram|Alpha uses to flag a false statement.
const REFUTING_PODS: &[&str] = &["False", "Incorrect"];

// ============= Wolfram|Alpha =============

#[derive(Debug, Deserialize)]
struct WolframResponse {
    queryresult: QueryResult,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: serde_json::Value,
    #[serde(default)]
    pods: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    title: String,
    #[serde(default)]
    subpods: Vec<Subpod>,
}

#[derive(Debug, Deserialize)]
struct Subpod {
    #[serde(default)]
    plaintext: Option<String>,
}

/// [`FactChecker`] backed by the Wolfram|Alpha Full Results API.
pub struct WolframFactChecker {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
}

impl WolframFactChecker {
    pub fn new(base_url: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            app_id: app_id.into(),
        }
    }
}

#[async_trait]
impl FactChecker for WolframFactChecker {
    async fn verify(&self, claim: &str) -> Result<Verdict, CapabilityError> {
        let claim = claim.trim();
        if claim.is_empty() {
            return Err(CapabilityError::InvalidInput("empty claim".to_string()));
        }

        let input = format!("Is it true that {}?", claim);
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("input", input.as_str()),
                ("appid", self.app_id.as_str()),
                ("output", "json"),
                ("format", "plaintext"),
            ])
            .send()
            .await
            .map_err(|e| CapabilityError::Lookup(format!("Wolfram|Alpha request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(CapabilityError::Unavailable(format!(
                "Wolfram|Alpha rejected the app id ({})",
                status
            )));
        }
        if !status.is_success() {
            return Err(CapabilityError::Lookup(format!(
                "Wolfram|Alpha returned {}",
                status
            )));
        }

        let body: WolframResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::Lookup(format!("invalid Wolfram|Alpha response: {}", e)))?;

        interpret(&body.queryresult)
    }
}

fn interpret(result: &QueryResult) -> Result<Verdict, CapabilityError> {
    // `error` is `false` on success and an object describing the failure otherwise
    if let Some(error) = result.error.as_object() {
        let message = error
            .get("msg")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        return Err(CapabilityError::Unavailable(format!(
            "Wolfram|Alpha error: {}",
            message
        )));
    }

    if !result.success {
        return Ok(Verdict::Unverifiable);
    }

    if result
        .pods
        .iter()
        .any(|pod| REFUTING_PODS.contains(&pod.title.as_str()))
    {
        return Ok(Verdict::Refuted);
    }

    let answer = result
        .pods
        .iter()
        .filter(|pod| ANSWER_PODS.contains(&pod.title.as_str()))
        .flat_map(|pod| pod.subpods.iter())
        .find_map(|sub| sub.plaintext.as_deref())
        .map(|text| text.trim().to_lowercase());

    Ok(match answer.as_deref() {
        Some(text) if text.starts_with("true") || text.starts_with("yes") => Verdict::Supported,
        Some(text) if text.starts_with("false") || text.starts_with("no") => Verdict::Refuted,
        _ => Verdict::Unverifiable,
    })
}

// ============= LLM =============

const VERIFY_SYSTEM_PROMPT: &str = "You are a careful fact checker. Judge the claim using \
well-established knowledge only. Reply with exactly one word: SUPPORTED, REFUTED or UNVERIFIABLE.";

/// [`FactChecker`] that asks an [`LLMClient`] for a verdict.
pub struct LlmFactChecker {
    llm: Arc<dyn LLMClient>,
}

impl LlmFactChecker {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl FactChecker for LlmFactChecker {
    async fn verify(&self, claim: &str) -> Result<Verdict, CapabilityError> {
        let claim = claim.trim();
        if claim.is_empty() {
            return Err(CapabilityError::InvalidInput("empty claim".to_string()));
        }

        let reply = self
            .llm
            .generate_with_system(VERIFY_SYSTEM_PROMPT, &format!("Claim: {}", claim))
            .await
            .map_err(|e| CapabilityError::Inference(e.to_string()))?;

        Ok(parse_verdict(&reply))
    }
}

/// Read a verdict from free-form model output, defaulting to unverifiable.
pub fn parse_verdict(reply: &str) -> Verdict {
    let reply = reply.to_uppercase();
    if reply.contains("UNVERIFIABLE") {
        Verdict::Unverifiable
    } else if reply.contains("REFUTED") {
        Verdict::Refuted
    } else if reply.contains("SUPPORTED") {
        Verdict::Supported
    } else {
        Verdict::Unverifiable
    }
}
