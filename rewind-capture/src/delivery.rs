//! Event shipping: steady-state POST with bounded retry, best-effort beacon
//! on hide/unload.
//!
//! Delivery is at-most-once. A batch that still fails after the last retry
//! is logged and dropped; nothing is reported back to the recorder.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use rewind_core::config::DeliveryConfig;
use rewind_core::WireBatch;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collector rejected batch ({code}): {body}")]
    Status { code: u16, body: String },

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Regular flush: asynchronous, retried.
    Steady,
    /// Page is going away: one best-effort attempt.
    Beacon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Dropped { attempts: usize },
}

/// Where the recorder hands finished batches.
pub trait Outbox {
    fn ship(&mut self, batch: WireBatch, mode: FlushMode);
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, batch: &WireBatch) -> Result<(), DeliveryError>;
}

pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    pub fn new(config: &DeliveryConfig) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.api_url.clone(),
        })
    }

    /// Post to `{base_url}/api/events` instead of the configured URL (tests).
    pub fn with_base_url(config: &DeliveryConfig, base_url: &str) -> Result<Self, DeliveryError> {
        let mut t = Self::new(config)?;
        t.url = format!("{}/api/events", base_url.trim_end_matches('/'));
        Ok(t)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, batch: &WireBatch) -> Result<(), DeliveryError> {
        let response = self.client.post(&self.url).json(batch).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(code = status.as_u16(), session = %batch.sid, "collector rejected batch");
            return Err(DeliveryError::Status {
                code: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl From<&DeliveryConfig> for RetryPolicy {
    fn from(c: &DeliveryConfig) -> Self {
        Self {
            max_retries: c.max_retries,
            base_delay_ms: c.retry_base_delay_ms,
            max_delay_ms: c.retry_max_delay_ms,
        }
    }
}

impl RetryPolicy {
    /// Delays before each retry: base, 2*base, 4*base ... capped, jittered.
    pub fn strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(2)
            .factor((self.base_delay_ms / 2).max(1))
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .map(jitter)
            .take(self.max_retries)
    }
}

/// Post with retry. Exhaustion is logged here; the caller drops the batch.
pub async fn deliver<T: Transport + ?Sized>(
    transport: &T,
    batch: &WireBatch,
    policy: &RetryPolicy,
) -> Result<(), DeliveryError> {
    let result = Retry::spawn(policy.strategy(), || transport.post(batch)).await;
    match result {
        Ok(()) => {
            tracing::debug!(session = %batch.sid, events = batch.events.len(), "batch delivered");
            Ok(())
        }
        Err(e) => {
            let attempts = policy.max_retries + 1;
            tracing::error!(
                attempts = attempts,
                session = %batch.sid,
                events = batch.events.len(),
                error = %e,
                "dropping batch after retries"
            );
            Err(DeliveryError::RetryExhausted { attempts })
        }
    }
}

/// Single best-effort attempt.
pub async fn deliver_once<T: Transport + ?Sized>(
    transport: &T,
    batch: &WireBatch,
) -> Result<(), DeliveryError> {
    transport.post(batch).await.map_err(|e| {
        tracing::debug!(session = %batch.sid, error = %e, "beacon delivery failed");
        e
    })
}

impl From<Result<(), DeliveryError>> for DeliveryOutcome {
    fn from(r: Result<(), DeliveryError>) -> Self {
        match r {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(DeliveryError::RetryExhausted { attempts }) => DeliveryOutcome::Dropped { attempts },
            Err(_) => DeliveryOutcome::Dropped { attempts: 1 },
        }
    }
}

const MAX_TRACKED_TASKS: usize = 256;

/// Outbox backed by HTTP. Inside a tokio runtime every batch is a spawned
/// task; without one, batches go out through a blocking client on a
/// background thread.
pub struct HttpOutbox {
    transport: Arc<dyn Transport>,
    url: String,
    timeout: Duration,
    policy: RetryPolicy,
    runtime: Option<Handle>,
    in_flight: Vec<JoinHandle<DeliveryOutcome>>,
}

impl HttpOutbox {
    pub fn new(config: &DeliveryConfig) -> Result<Self, DeliveryError> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: &DeliveryConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            url: config.api_url.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            policy: RetryPolicy::from(config),
            runtime: Handle::try_current().ok(),
            in_flight: Vec::new(),
        }
    }

    /// Wait for every spawned delivery and return their outcomes.
    pub async fn drain(&mut self) -> Vec<DeliveryOutcome> {
        let mut out = Vec::new();
        for handle in self.in_flight.drain(..) {
            match handle.await {
                Ok(outcome) => out.push(outcome),
                Err(e) => tracing::error!(error = %e, "delivery task failed"),
            }
        }
        out
    }

    fn ship_blocking(&self, batch: WireBatch, mode: FlushMode) {
        let url = self.url.clone();
        let timeout = self.timeout;
        let policy = self.policy;
        std::thread::spawn(move || {
            let client = match reqwest::blocking::Client::builder().timeout(timeout).build() {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!(error = %e, "could not build blocking client");
                    return;
                }
            };
            let post = || -> Result<(), DeliveryError> {
                let resp = client.post(&url).json(&batch).send()?;
                let status = resp.status();
                if status.is_success() {
                    Ok(())
                } else {
                    Err(DeliveryError::Status {
                        code: status.as_u16(),
                        body: resp.text().unwrap_or_default(),
                    })
                }
            };
            let delays: Vec<Duration> = match mode {
                FlushMode::Beacon => Vec::new(),
                FlushMode::Steady => policy.strategy().collect(),
            };
            let mut last = post();
            for delay in delays {
                if last.is_ok() {
                    break;
                }
                std::thread::sleep(delay);
                last = post();
            }
            if let Err(e) = last {
                tracing::error!(session = %batch.sid, error = %e, "dropping batch");
            }
        });
    }
}

impl Outbox for HttpOutbox {
    fn ship(&mut self, batch: WireBatch, mode: FlushMode) {
        if self.in_flight.len() >= MAX_TRACKED_TASKS {
            self.in_flight.retain(|h| !h.is_finished());
        }
        let Some(runtime) = self.runtime.clone() else {
            self.ship_blocking(batch, mode);
            return;
        };
        let transport = Arc::clone(&self.transport);
        let policy = self.policy;
        let handle = runtime.spawn(async move {
            let result = match mode {
                FlushMode::Steady => deliver(transport.as_ref(), &batch, &policy).await,
                FlushMode::Beacon => deliver_once(transport.as_ref(), &batch).await,
            };
            DeliveryOutcome::from(result)
        });
        self.in_flight.push(handle);
    }
}

/// Outbox that keeps every batch in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryOutbox {
    shipped: Arc<Mutex<Vec<(WireBatch, FlushMode)>>>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<(WireBatch, FlushMode)> {
        match self.shipped.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events(&self) -> Vec<rewind_core::Event> {
        self.batches()
            .into_iter()
            .flat_map(|(b, _)| b.events)
            .collect()
    }
}

impl Outbox for MemoryOutbox {
    fn ship(&mut self, batch: WireBatch, mode: FlushMode) {
        match self.shipped.lock() {
            Ok(mut guard) => guard.push((batch, mode)),
            Err(poisoned) => poisoned.into_inner().push((batch, mode)),
        }
    }
}
