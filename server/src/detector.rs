//! PII detector adapter over an analyzer HTTP service
//!
//! Speaks the analyze protocol of Presidio-style detector services:
//! `POST /analyze` with `{"text": "...", "language": "..."}` returning
//! `[{"entity_type": "...", "start": 0, "end": 0, "score": 0.0}]`.

use async_trait::async_trait;
use sentinel_core::ports::PiiDetector;
use sentinel_core::types::{Detection, DetectionOutcome};
use sentinel_core::{Result, SentinelError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    text: &'a str,
    language: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnalyzeHit {
    entity_type: String,
    start: usize,
    end: usize,
    score: f32,
}

/// Detector client for an analyzer service
pub struct HttpPiiDetector {
    client: reqwest::Client,
    analyze_url: String,
    language: String,
}

impl HttpPiiDetector {
    /// New client against the given analyzer base URL
    pub fn new(base_url: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            analyze_url: format!("{}/analyze", base_url.into().trim_end_matches('/')),
            language: language.into(),
        }
    }
}

#[async_trait]
impl PiiDetector for HttpPiiDetector {
    async fn detect(&self, text: &str) -> Result<DetectionOutcome> {
        let request = AnalyzeRequest {
            text,
            language: &self.language,
        };
        let hits: Vec<AnalyzeHit> = self
            .client
            .post(&self.analyze_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SentinelError::detection(format!("analyzer unreachable: {}", e)))?
            .error_for_status()
            .map_err(|e| SentinelError::detection(format!("analyzer rejected request: {}", e)))?
            .json()
            .await
            .map_err(|e| SentinelError::detection(format!("analyzer bad payload: {}", e)))?;

        let entities: Vec<Detection> = hits
            .into_iter()
            .map(|h| Detection {
                pii_type_label: h.entity_type.clone(),
                pii_type: h.entity_type,
                start_position: h.start,
                end_position: h.end,
                confidence: h.score,
            })
            .collect();

        Ok(DetectionOutcome {
            entities,
            statistics: Default::default(),
        }
        .with_statistics())
    }
}
