// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Decision oracle reached over HTTP
//!
//! Request:  `{"image_base64": .., "media_type": "image/gif", "context": {..}}`
//! Response: `{"actions": ["UP"], "durations": [2], "text": "..", "success": true, "filtered": false}`

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ActionDecision, DecisionContext, DecisionOracle, OracleOutcome, VisualInput};

#[derive(Serialize)]
struct OracleRequest<'a> {
    image_base64: String,
    media_type: &'a str,
    context: &'a DecisionContext,
}

#[derive(Debug, Deserialize)]
struct OracleResponse {
    #[serde(default)]
    actions: Vec<String>,
    #[serde(default)]
    durations: Vec<u32>,
    #[serde(default)]
    text: String,
    success: bool,
    #[serde(default)]
    filtered: bool,
    #[serde(default)]
    error: Option<String>,
}

impl From<OracleResponse> for OracleOutcome {
    fn from(response: OracleResponse) -> Self {
        if response.filtered {
            return OracleOutcome::Fallback("safety filtered".to_string());
        }
        if !response.success {
            return OracleOutcome::Error(
                response
                    .error
                    .unwrap_or_else(|| "oracle reported failure".to_string()),
            );
        }
        OracleOutcome::Actions(ActionDecision {
            actions: response.actions,
            durations: response.durations,
            text: response.text,
        })
    }
}

pub struct HttpOracle {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpOracle {
    /// `timeout` bounds the HTTP exchange; the driver applies its own
    /// oracle timeout on top.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DecisionOracle for HttpOracle {
    async fn decide(&self, visual: &VisualInput, context: &DecisionContext) -> OracleOutcome {
        let body = OracleRequest {
            image_base64: BASE64.encode(&visual.bytes),
            media_type: visual.media_type,
            context,
        };

        let response = match self.client.post(&self.endpoint).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("[ORACLE] POST {} failed: {}", self.endpoint, e);
                return OracleOutcome::Error(format!("transport: {e}"));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return OracleOutcome::Error(format!("HTTP {status}"));
        }

        match response.json::<OracleResponse>().await {
            Ok(parsed) => {
                debug!("[ORACLE] {} action(s), filtered={}", parsed.actions.len(), parsed.filtered);
                OracleOutcome::from(parsed)
            }
            Err(e) => OracleOutcome::Error(format!("unreadable response: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> OracleOutcome {
        OracleOutcome::from(serde_json::from_str::<OracleResponse>(json).unwrap())
    }

    #[test]
    fn test_response_mapping() {
        assert_eq!(
            parse(r#"{"actions":["UP"],"text":"go","success":true}"#),
            OracleOutcome::Actions(ActionDecision {
                actions: vec!["UP".into()],
                durations: vec![],
                text: "go".into(),
            })
        );
        assert_eq!(
            parse(r#"{"actions":["A"],"success":true,"filtered":true}"#),
            OracleOutcome::Fallback("safety filtered".into())
        );
        assert_eq!(
            parse(r#"{"success":false,"error":"rate limited"}"#),
            OracleOutcome::Error("rate limited".into())
        );
    }
}
