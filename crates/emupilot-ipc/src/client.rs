// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Clip IPC client
//!
//! Opens a fresh connection per request. The timeout scales with the clip
//! length the caller should expect, which is the time since the last
//! successful clip (that is where the server's watermark sits).

use async_trait::async_trait;
use emupilot_config::IpcConfig;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::{IpcError, Result};
use crate::protocol::{BufferStatus, ClipPayload, IpcRequest, IpcResponse};
use crate::service::ClipSource;

/// Adaptive request timeout: `base + per_clip_sec * expected`, with a floor
/// for clips at or above `large_clip_threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutPolicy {
    pub base: Duration,
    pub per_clip_sec: Duration,
    pub large_clip_threshold_secs: f64,
    pub large_clip_min: Duration,
}

impl From<&IpcConfig> for TimeoutPolicy {
    fn from(config: &IpcConfig) -> Self {
        Self {
            base: Duration::from_secs_f64(config.base_timeout_secs.max(0.0)),
            per_clip_sec: Duration::from_secs_f64(config.timeout_per_clip_sec.max(0.0)),
            large_clip_threshold_secs: config.large_clip_threshold_secs,
            large_clip_min: Duration::from_secs_f64(config.large_clip_min_timeout_secs.max(0.0)),
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::from(&IpcConfig::default())
    }
}

impl TimeoutPolicy {
    pub fn timeout_for(&self, expected_clip_secs: f64) -> Duration {
        let expected = if expected_clip_secs.is_finite() {
            expected_clip_secs.max(0.0)
        } else {
            0.0
        };
        let scaled = self.base + self.per_clip_sec.mul_f64(expected);
        if expected >= self.large_clip_threshold_secs {
            scaled.max(self.large_clip_min)
        } else {
            scaled
        }
    }
}

pub struct ClipClient {
    address: String,
    policy: TimeoutPolicy,
    retries: u32,
    retry_backoff: Duration,
    last_success: Mutex<Option<Instant>>,
}

impl ClipClient {
    pub fn new(address: impl Into<String>, policy: TimeoutPolicy) -> Self {
        Self {
            address: address.into(),
            policy,
            retries: 0,
            retry_backoff: Duration::from_millis(250),
            last_success: Mutex::new(None),
        }
    }

    pub fn from_config(config: &IpcConfig) -> Self {
        Self::new(config.address(), TimeoutPolicy::from(config))
            .with_retries(config.retries, Duration::from_millis(config.retry_backoff_ms))
    }

    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.retry_backoff = backoff;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Expected clip length in seconds: time since the last successful clip,
    /// capped by the request's own limit.
    pub fn expected_clip_secs(&self, max_duration: Option<f64>) -> f64 {
        let since_last = self
            .last_success
            .lock()
            .map(|at| at.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        match max_duration {
            Some(max) if max > 0.0 => since_last.min(max),
            _ => since_last,
        }
    }

    pub async fn get_clip(&self, max_duration: Option<f64>) -> Result<ClipPayload> {
        let timeout = self.policy.timeout_for(self.expected_clip_secs(max_duration));
        let response = self
            .request_with_retry(&IpcRequest::GetClip { max_duration }, timeout)
            .await?;
        let clip = response.into_clip()?;
        *self.last_success.lock() = Some(Instant::now());
        Ok(clip)
    }

    pub async fn status(&self) -> Result<BufferStatus> {
        self.request_with_retry(&IpcRequest::Status, self.policy.base)
            .await?
            .into_status()
    }

    async fn request_with_retry(
        &self,
        request: &IpcRequest,
        timeout: Duration,
    ) -> Result<IpcResponse> {
        let mut backoff = self.retry_backoff;
        let mut attempt = 0;
        loop {
            match self.request_once(request, timeout).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        "[CLIP-CLIENT] Request to {} failed ({}), retry {}/{} in {:?}",
                        self.address, e, attempt, self.retries, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once(&self, request: &IpcRequest, timeout: Duration) -> Result<IpcResponse> {
        let exchange = async {
            let mut stream = TcpStream::connect(&self.address).await?;
            let mut line = serde_json::to_vec(request)?;
            line.push(b'\n');
            stream.write_all(&line).await?;
            stream.flush().await?;

            let mut reader = BufReader::new(stream);
            let mut response = String::new();
            if reader.read_line(&mut response).await? == 0 {
                return Err(IpcError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "clip server closed the connection without answering",
                )));
            }
            Ok(serde_json::from_str::<IpcResponse>(&response)?)
        };

        debug!("[CLIP-CLIENT] {:?} with timeout {:?}", request, timeout);
        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| IpcError::Timeout(timeout))?
    }
}

#[async_trait]
impl ClipSource for ClipClient {
    async fn fetch_clip(&self, max_duration: Option<f64>) -> Result<ClipPayload> {
        self.get_clip(max_duration).await
    }
}
