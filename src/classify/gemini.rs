use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;

use crate::classify::{Classifier, build_prompt, parse_reply};
use crate::config::Config;
use crate::domain::email::ClassificationResult;

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

/// Google Gemini `generateContent`, one request per body, temperature 0.
pub struct GeminiClassifier {
    client: Client,
    api_base: String,
    model: String,
    api_key: String,
}

impl GeminiClassifier {
    pub fn new(
        api_base: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            api_base: api_base.into(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            cfg.settings.api_base.clone(),
            cfg.settings.model.clone(),
            cfg.credentials.gemini_api_key.clone(),
        )
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        )
    }

    fn classify_one(&self, body: &str) -> Result<ClassificationResult> {
        let request = json!({
            "contents": [{ "role": "user", "parts": [{ "text": build_prompt(body) }] }],
            "generationConfig": { "temperature": 0 },
        });

        let resp: GenerateResponse = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .context("sending generateContent request")?
            .error_for_status()?
            .json()
            .context("decoding generateContent response")?;

        parse_reply(&reply_text(resp)?)
    }
}

fn reply_text(resp: GenerateResponse) -> Result<String> {
    let content = resp
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or_else(|| anyhow!("model returned no candidates"))?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    if text.trim().is_empty() {
        return Err(anyhow!("model returned an empty reply"));
    }
    Ok(text)
}

impl Classifier for GeminiClassifier {
    fn classify(&self, bodies: &[String]) -> Result<Vec<ClassificationResult>> {
        let mut out = Vec::with_capacity(bodies.len());
        for (i, body) in bodies.iter().enumerate() {
            let result = self
                .classify_one(body)
                .with_context(|| format!("classifying email {} of {}", i + 1, bodies.len()))?;
            out.push(result);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::email::Urgency;

    #[test]
    fn endpoint_joins_base_and_model() {
        let c = GeminiClassifier::new("https://example.test/", "gemini-2.0-flash", "k").unwrap();
        assert_eq!(
            c.endpoint(),
            "https://example.test/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn reply_text_concatenates_parts() {
        let resp: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "```json\n{\"summary\":\"s\",\"category\":\"Compliance\"," },
                    { "text": "\"from_\":\"Legal\",\"urgency\":\"medium\"}\n```" }
                ]}
            }]
        }))
        .unwrap();
        let parsed = parse_reply(&reply_text(resp).unwrap()).unwrap();
        assert_eq!(parsed.urgency, Urgency::Medium);
        assert_eq!(parsed.from_, "Legal");
    }

    #[test]
    fn reply_without_candidates_is_an_error() {
        let resp: GenerateResponse = serde_json::from_value(json!({ "candidates": [] })).unwrap();
        assert!(reply_text(resp).is_err());
    }

    #[test]
    fn empty_batch_makes_no_requests() {
        // unroutable base: any request would fail
        let c = GeminiClassifier::new("http://127.0.0.1:9", "m", "k").unwrap();
        assert!(c.classify(&[]).unwrap().is_empty());
    }
}
