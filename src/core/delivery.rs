//! Bundle delivery with retry and a durable failure store.
//!
//! The bundle is serialized once. Those exact bytes are what every attempt
//! sends, what lands in the failure store on exhaustion, and what a later
//! redelivery re-sends.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, instrument, warn};

use crate::adapters::DeliverySink;
use crate::core::retry::{CallError, RetryPolicy, RetryableCaller};
use crate::domain::DeliveryBundle;

const REDELIVERY_NOTE: &str = "Delivery failed; requires manual redelivery. The bundle field is the exact payload, re-POST it verbatim (lanepress redeliver <file>).";

/// A bundle that could not be delivered
#[derive(Debug, Serialize, Deserialize)]
pub struct FailedDelivery {
    /// Instructions for whoever finds the file
    pub note: String,

    /// Run date the bundle belongs to
    pub date: String,

    pub failed_at: DateTime<Utc>,

    /// Attempts made before giving up (0 when delivery was skipped)
    pub attempts: u32,

    pub last_error: String,

    /// Hex SHA-256 of the payload bytes
    pub payload_sha256: String,

    /// The payload, embedded verbatim
    pub bundle: Box<RawValue>,
}

impl FailedDelivery {
    /// Payload bytes exactly as originally serialized
    pub fn payload(&self) -> &[u8] {
        self.bundle.get().as_bytes()
    }

    /// Check the embedded payload against the recorded digest
    pub fn verify(&self) -> bool {
        sha256_hex(self.payload()) == self.payload_sha256
    }
}

/// How a delivery ended
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Sink answered 2xx
    Delivered { status: u16, attempts: u32 },

    /// Retries exhausted; bundle persisted for manual redelivery
    Deferred {
        path: PathBuf,
        attempts: u32,
        error: String,
    },

    /// Delivery not attempted
    Skipped {
        reason: String,
        persisted: Option<PathBuf>,
    },

    /// Delivery failed and the failure store could not be written either
    Unpersisted { error: String, persist_error: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Sends bundles to the sink
pub struct DeliveryClient {
    sink: Arc<dyn DeliverySink>,
    policy: RetryPolicy,
    store_dir: PathBuf,
}

impl DeliveryClient {
    pub fn new(sink: Arc<dyn DeliverySink>, policy: RetryPolicy, store_dir: impl Into<PathBuf>) -> Self {
        Self {
            sink,
            policy,
            store_dir: store_dir.into(),
        }
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Serialize a bundle into its delivery payload
    pub fn serialize(bundle: &DeliveryBundle) -> Result<String> {
        serde_json::to_string(bundle).context("Failed to serialize delivery bundle")
    }

    /// One outbound call, no retry
    pub async fn deliver(&self, payload: &[u8]) -> Result<u16, CallError> {
        self.sink.send(payload).await
    }

    /// Deliver with retry; on exhaustion persist the payload
    #[instrument(skip(self, bundle), fields(sink = self.sink.name(), articles = bundle.articles.len()))]
    pub async fn deliver_with_retry(&self, bundle: &DeliveryBundle, date: &str) -> DeliveryOutcome {
        let payload = match Self::serialize(bundle) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Bundle could not be serialized");
                return DeliveryOutcome::Unpersisted {
                    error: e.to_string(),
                    persist_error: "nothing to persist".to_string(),
                };
            }
        };

        self.send_payload(payload, date).await
    }

    async fn send_payload(&self, payload: String, date: &str) -> DeliveryOutcome {
        let caller = RetryableCaller::new(format!("delivery/{}", self.sink.name()), self.policy.clone());
        let bytes = payload.as_bytes();
        let mut attempts = 0;

        let result = caller
            .call(|attempt| {
                attempts = attempt;
                self.deliver(bytes)
            })
            .await;

        match result {
            Ok(status) => {
                info!(status, attempts, bytes = bytes.len(), "Bundle delivered");
                DeliveryOutcome::Delivered { status, attempts }
            }
            Err(failure) => {
                let error = failure.last_error.to_string();
                match self
                    .persist_failure(payload, date, failure.attempts, &error, REDELIVERY_NOTE)
                    .await
                {
                    Ok(path) => {
                        warn!(path = %path.display(), attempts = failure.attempts, "Delivery deferred to manual redelivery");
                        DeliveryOutcome::Deferred {
                            path,
                            attempts: failure.attempts,
                            error,
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to persist undelivered bundle");
                        DeliveryOutcome::Unpersisted {
                            error,
                            persist_error: format!("{:#}", e),
                        }
                    }
                }
            }
        }
    }

    /// Persist a bundle that is not being delivered at all
    pub async fn skip(&self, bundle: &DeliveryBundle, date: &str, reason: &str) -> DeliveryOutcome {
        let persisted = match Self::serialize(bundle) {
            Ok(payload) => match self.persist_failure(payload, date, 0, reason, REDELIVERY_NOTE).await {
                Ok(path) => Some(path),
                Err(e) => {
                    error!(error = %e, "Failed to persist skipped bundle");
                    None
                }
            },
            Err(e) => {
                error!(error = %e, "Bundle could not be serialized");
                None
            }
        };

        warn!(%reason, persisted = persisted.is_some(), "Delivery skipped");
        DeliveryOutcome::Skipped {
            reason: reason.to_string(),
            persisted,
        }
    }

    /// Write a failure record. Never overwrites an existing file.
    pub async fn persist_failure(
        &self,
        payload: String,
        date: &str,
        attempts: u32,
        last_error: &str,
        note: &str,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.store_dir)
            .await
            .with_context(|| format!("Failed to create failure store: {}", self.store_dir.display()))?;

        let record = FailedDelivery {
            note: note.to_string(),
            date: date.to_string(),
            failed_at: Utc::now(),
            attempts,
            last_error: last_error.to_string(),
            payload_sha256: sha256_hex(payload.as_bytes()),
            bundle: RawValue::from_string(payload).context("Payload is not valid JSON")?,
        };
        let json = serde_json::to_string_pretty(&record).context("Failed to serialize failure record")?;

        let mut suffix = 0u32;
        loop {
            let path = self.candidate_path(date, suffix);
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(mut file) => {
                    file.write_all(json.as_bytes())
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    file.flush().await?;
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    suffix += 1;
                    if suffix > 1000 {
                        bail!("Too many failure records for {}", date);
                    }
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to create {}", path.display()));
                }
            }
        }
    }

    fn candidate_path(&self, date: &str, suffix: u32) -> PathBuf {
        match suffix {
            0 => self.store_dir.join(format!("failed_{}.json", date)),
            1 => self
                .store_dir
                .join(format!("failed_{}_{}.json", date, Utc::now().format("%H%M%S"))),
            n => self
                .store_dir
                .join(format!("failed_{}_{}_{}.json", date, Utc::now().format("%H%M%S"), n)),
        }
    }

    /// Load a failure record and check its digest
    pub async fn load_failure(path: &Path) -> Result<FailedDelivery> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let record: FailedDelivery = serde_json::from_str(&content)
            .with_context(|| format!("Not a failure record: {}", path.display()))?;

        if !record.verify() {
            bail!("Payload digest mismatch in {}; refusing to redeliver", path.display());
        }
        Ok(record)
    }

    /// Re-send a persisted bundle byte for byte
    #[instrument(skip(self))]
    pub async fn redeliver(&self, path: &Path) -> Result<DeliveryOutcome> {
        let record = Self::load_failure(path).await?;
        let caller = RetryableCaller::new(format!("redelivery/{}", self.sink.name()), self.policy.clone());
        let bytes = record.payload();
        let mut attempts = 0;

        let result = caller
            .call(|attempt| {
                attempts = attempt;
                self.deliver(bytes)
            })
            .await;

        match result {
            Ok(status) => {
                info!(status, attempts, path = %path.display(), "Bundle redelivered");
                Ok(DeliveryOutcome::Delivered { status, attempts })
            }
            Err(failure) => {
                warn!(path = %path.display(), error = %failure, "Redelivery failed; record kept");
                Ok(DeliveryOutcome::Deferred {
                    path: path.to_path_buf(),
                    attempts: failure.attempts,
                    error: failure.last_error.to_string(),
                })
            }
        }
    }
}
