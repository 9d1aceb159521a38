//! Transaction Recorder - Best-Effort Bookkeeping
//!
//! After a deployment confirms on-chain, an entry is posted to the history
//! service. Recording is fire-and-forget: a failure here is logged and
//! swallowed, never allowed to fail an already-confirmed transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

const API_TIMEOUT_SECS: u64 = 5;

/// One recorded deployment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub user_address: String,
    pub tx_type: String,
    pub amount: String,
    pub protocol: String,
    pub chain_id: u64,
    pub tx_hash: String,
    pub from_chain_id: u64,
    pub to_chain_id: u64,
    pub token_address: String,
    pub token_decimals: u8,
    pub is_cross_chain: bool,
    pub timestamp: DateTime<Utc>,
}

/// Recorder collaborator. Implementations must not surface failures to the
/// pipeline.
#[async_trait]
pub trait TxRecorder: Send + Sync {
    async fn record_transaction(&self, record: &TransactionRecord);
}

/// POSTs records to the history service. Constructed with `None` it becomes
/// a no-op that only logs at debug level.
pub struct HttpRecorder {
    http_client: Client,
    endpoint: Option<String>,
}

impl HttpRecorder {
    pub fn new(endpoint: Option<String>) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            endpoint,
        }
    }
}

#[async_trait]
impl TxRecorder for HttpRecorder {
    async fn record_transaction(&self, record: &TransactionRecord) {
        let Some(endpoint) = &self.endpoint else {
            debug!(
                "Recorder disabled, skipping entry for {} ({})",
                record.tx_hash, record.protocol
            );
            return;
        };

        match self
            .http_client
            .post(endpoint)
            .json(record)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!("📝 Recorded transaction {}", record.tx_hash);
            }
            Ok(response) => {
                warn!(
                    "Recorder returned {} for {} (ignored)",
                    response.status(),
                    record.tx_hash
                );
            }
            Err(e) => {
                warn!("Recorder unreachable for {} (ignored): {}", record.tx_hash, e);
            }
        }
    }
}

// ============================================
// TESTS
// ============================================
