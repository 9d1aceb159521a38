//! The Execution Engine
//!
//! Top-level orchestrator for a cross-chain deployment:
//! payload preparation -> fee estimation -> approval -> freshness check ->
//! multicall assembly -> execution -> confirmation -> result recording.
//!
//! The pipeline is a linear, step-indexed state machine. Every stage sets its
//! step index on entry and funnels any failure through one `set_error` choke
//! point, so the caller always observes a structured `ExecutionState` rather
//! than an unhandled error. The library contract is the tagged
//! [`EngineError`]; the state keeps the collapsed message for display.
//!
//! Retry semantics: a retry re-runs the whole pipeline from step 0. Route
//! quotes expire, so a prepared payload is never reused across attempts -
//! the approval step stays cheap on retry because the allowance read is
//! idempotent.

pub mod approval;
pub mod fee;
pub mod payload;

pub use approval::ensure_allowance;
pub use fee::{FeeQuoter, RouterFeeQuoter};
pub use payload::{CcipTransactionData, PayloadPreparer, PrepareRequest};

use alloy_primitives::{
    utils::{format_units, parse_ether},
    Address, U256,
};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::directory::TokenDirectory;
use crate::discovery::Protocol;
use crate::recorder::{TransactionRecord, TxRecorder};
use crate::routing::YieldApi;
use crate::signer::{ChainSigner, TransactionSpec};
use payload::encode_deploy_call;

// ============================================
// STEPS
// ============================================

pub const STEP_PREPARING_PAYLOAD: usize = 0;
pub const STEP_ESTIMATING_FEE: usize = 1;
pub const STEP_APPROVING_SOURCE: usize = 2;
pub const STEP_VALIDATING_ROUTE: usize = 3;
pub const STEP_ASSEMBLING_MULTICALL: usize = 4;
pub const STEP_EXECUTING: usize = 5;

pub const TOTAL_STEPS: usize = 6;

fn default_step_descriptions() -> Vec<String> {
    vec![
        "Preparing cross-chain payload".to_string(),
        "Estimating messaging fee".to_string(),
        "Approving source token".to_string(),
        "Validating route data".to_string(),
        "Assembling multicall".to_string(),
        "Executing transaction".to_string(),
    ]
}

// ============================================
// STATE
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Error,
}

/// Externally observable pipeline state, owned by exactly one flow instance
#[derive(Debug, Clone)]
pub struct ExecutionState {
    pub is_loading: bool,
    pub current_step: usize,
    pub total_steps: usize,
    pub step_descriptions: Vec<String>,
    pub transaction_data: Option<CcipTransactionData>,
    pub estimated_fee: Option<String>,
    pub error_message: Option<String>,
    pub tx_hash: Option<String>,
    pub tx_status: Option<TxStatus>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self {
            is_loading: false,
            current_step: 0,
            total_steps: TOTAL_STEPS,
            step_descriptions: default_step_descriptions(),
            transaction_data: None,
            estimated_fee: None,
            error_message: None,
            tx_hash: None,
            tx_status: None,
        }
    }

    fn begin_run(&mut self) {
        *self = Self::new();
        self.is_loading = true;
    }

    fn enter_step(&mut self, step: usize) {
        self.current_step = step;
    }

    fn set_step_description(&mut self, step: usize, text: impl Into<String>) {
        if step < self.step_descriptions.len() {
            self.step_descriptions[step] = text.into();
        }
    }
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================
// ERRORS
// ============================================

/// Tagged pipeline failure. Each variant carries the underlying cause so
/// callers can branch on recoverability without string matching.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("payload preparation failed: {0}")]
    PreparationFailed(String),

    #[error("fee estimation failed: {0}")]
    FeeEstimationFailed(String),

    #[error("approval failed: {0}")]
    ApprovalFailed(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("prepared payload is {0}s old and its route quote may have expired; retry to regenerate")]
    StalePayload(u64),
}

// ============================================
// CONFIG & REQUEST
// ============================================

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Gas limit forwarded for the destination-side call
    pub dest_gas_limit: u64,

    /// Gas limit for the source-chain executor transaction
    pub source_tx_gas_limit: u64,

    /// Slippage tolerance for the destination route, in basis points
    pub slippage_bps: u32,

    /// Payloads older than this are rejected before the final send
    pub max_payload_age_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dest_gas_limit: 400_000,
            source_tx_gas_limit: 600_000,
            slippage_bps: 100,
            max_payload_age_secs: 120,
        }
    }
}

/// One deployment attempt: move `amount` of `source_token` into
/// `destination` on its chain
#[derive(Debug, Clone)]
pub struct DeployRequest<'a> {
    pub source_chain_id: u64,
    pub source_token: Address,
    pub amount: U256,
    pub destination: &'a Protocol,
}

// ============================================
// PROTOCOL LABELS
// ============================================

const PROTOCOL_LABELS: &[(&str, &str)] = &[
    ("aave", "Aave V3"),
    ("compound", "Compound V3"),
    ("morpho", "Morpho"),
    ("moonwell", "Moonwell"),
    ("spark", "Spark"),
    ("fluid", "Fluid"),
    ("radiant", "Radiant"),
    ("venus", "Venus"),
    ("benqi", "Benqi"),
];

const FALLBACK_PROTOCOL_LABEL: &str = "External Protocol";

/// Map a destination protocol's display name onto a known label for the
/// transaction record
pub fn infer_protocol_label(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    for (keyword, label) in PROTOCOL_LABELS {
        if lower.contains(keyword) {
            return label;
        }
    }
    FALLBACK_PROTOCOL_LABEL
}

/// Exact wei total for the final transaction: messaging fee plus the
/// payload's additional native value, both decimal strings
fn total_value(fee: &str, additional_eth: &str) -> Result<U256, EngineError> {
    let fee_wei = parse_ether(fee)
        .map_err(|e| EngineError::ExecutionFailed(format!("bad fee amount '{}': {}", fee, e)))?;
    let extra_wei = parse_ether(additional_eth).map_err(|e| {
        EngineError::ExecutionFailed(format!("bad additional value '{}': {}", additional_eth, e))
    })?;
    Ok(fee_wei + extra_wei)
}

// ============================================
// ENGINE
// ============================================

/// Sequences the full deployment pipeline over injected collaborators
pub struct ExecutionEngine<S, Y, F, R>
where
    S: ChainSigner,
    Y: YieldApi,
    F: FeeQuoter,
    R: TxRecorder,
{
    directory: Arc<TokenDirectory>,
    signer: S,
    yield_api: Y,
    fee_quoter: F,
    recorder: R,
    config: EngineConfig,
    state: ExecutionState,
}

impl<S, Y, F, R> ExecutionEngine<S, Y, F, R>
where
    S: ChainSigner,
    Y: YieldApi,
    F: FeeQuoter,
    R: TxRecorder,
{
    pub fn new(
        directory: Arc<TokenDirectory>,
        signer: S,
        yield_api: Y,
        fee_quoter: F,
        recorder: R,
        config: EngineConfig,
    ) -> Self {
        Self {
            directory,
            signer,
            yield_api,
            fee_quoter,
            recorder,
            config,
            state: ExecutionState::new(),
        }
    }

    /// Read-only snapshot of the pipeline state
    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    /// Back to initial values; abandons tracking of any in-flight tx but
    /// cannot cancel anything already broadcast
    pub fn reset(&mut self) {
        self.state = ExecutionState::new();
    }

    /// Run the whole pipeline. Returns the transaction hash on success, or
    /// `None` with the failure captured in [`ExecutionState`].
    pub async fn execute_full_flow(&mut self, req: &DeployRequest<'_>) -> Option<String> {
        self.state.begin_run();

        match self.run_pipeline(req).await {
            Ok(hash) => {
                self.state.is_loading = false;
                self.state.tx_hash = Some(hash.clone());
                self.state.tx_status = Some(TxStatus::Success);
                info!("✅ Deployment confirmed: {}", hash);
                Some(hash)
            }
            Err(e) => {
                warn!("Pipeline halted at step {}: {}", self.state.current_step, e);
                self.set_error(&e);
                None
            }
        }
    }

    async fn run_pipeline(&mut self, req: &DeployRequest<'_>) -> Result<String, EngineError> {
        let payload = self.prepare_payload(req).await?;
        let fee = self.estimate_fee(&payload).await?;
        self.approve_source(req, &payload).await?;
        self.validate_route_data(&payload)?;
        let spec = self.assemble_multicall(&payload, &fee)?;
        let hash = self.execute_transaction(spec).await?;
        self.record_deployment(req, &hash).await;
        Ok(hash)
    }

    /// Step 0: assemble a fresh payload (includes the destination route
    /// quote - the fee depends on its call data shape)
    pub async fn prepare_payload(
        &mut self,
        req: &DeployRequest<'_>,
    ) -> Result<CcipTransactionData, EngineError> {
        self.state.enter_step(STEP_PREPARING_PAYLOAD);

        let preparer = PayloadPreparer::new(
            self.directory.as_ref(),
            &self.yield_api,
            self.config.dest_gas_limit,
            self.config.slippage_bps,
        );
        let prepare_req = PrepareRequest {
            source_chain_id: req.source_chain_id,
            source_token: req.source_token,
            amount: req.amount,
            user_address: self.signer.address(),
            destination: req.destination,
        };

        let payload = preparer
            .prepare(&prepare_req)
            .await
            .map_err(|e| EngineError::PreparationFailed(e.to_string()))?;

        self.state.transaction_data = Some(payload.clone());
        Ok(payload)
    }

    /// Step 1: quote the messaging fee. A failure here is a hard stop before
    /// any approval or spend.
    pub async fn estimate_fee(
        &mut self,
        payload: &CcipTransactionData,
    ) -> Result<String, EngineError> {
        self.state.enter_step(STEP_ESTIMATING_FEE);

        let fee = self
            .fee_quoter
            .estimate_fee(payload)
            .await
            .map_err(|e| EngineError::FeeEstimationFailed(e.to_string()))?;

        info!("💸 Estimated messaging fee: {} native", fee);
        self.state.estimated_fee = Some(fee.clone());
        Ok(fee)
    }

    /// Step 2: check/raise the executor's allowance for the source token.
    /// Re-evaluated on every attempt, never cached.
    pub async fn approve_source(
        &mut self,
        req: &DeployRequest<'_>,
        payload: &CcipTransactionData,
    ) -> Result<(), EngineError> {
        self.state.enter_step(STEP_APPROVING_SOURCE);
        self.state.set_step_description(
            STEP_APPROVING_SOURCE,
            "⏳ Waiting for approval confirmation",
        );

        let owner = self.signer.address();
        ensure_allowance(
            &self.signer,
            owner,
            payload.executor_address,
            req.source_token,
            req.amount,
        )
        .await
        .map_err(|e| EngineError::ApprovalFailed(e.to_string()))?;

        Ok(())
    }

    /// Step 3: reject payloads whose route quote may have expired during
    /// the approval wait
    pub fn validate_route_data(&mut self, payload: &CcipTransactionData) -> Result<(), EngineError> {
        self.state.enter_step(STEP_VALIDATING_ROUTE);

        let age = payload.age_secs();
        if age > self.config.max_payload_age_secs {
            return Err(EngineError::StalePayload(age));
        }
        Ok(())
    }

    /// Step 4: encode the executor call and total up the native value
    /// (fee + additional), both computed fresh this attempt
    pub fn assemble_multicall(
        &mut self,
        payload: &CcipTransactionData,
        fee: &str,
    ) -> Result<TransactionSpec, EngineError> {
        self.state.enter_step(STEP_ASSEMBLING_MULTICALL);

        let value = total_value(fee, &payload.additional_eth)?;
        Ok(TransactionSpec {
            to: payload.executor_address,
            value,
            data: encode_deploy_call(payload),
            gas_limit: self.config.source_tx_gas_limit,
        })
    }

    /// Step 5: broadcast and wait for confirmation
    pub async fn execute_transaction(
        &mut self,
        spec: TransactionSpec,
    ) -> Result<String, EngineError> {
        self.state.enter_step(STEP_EXECUTING);

        let hash = self
            .signer
            .send_transaction(spec)
            .await
            .map_err(|e| EngineError::ExecutionFailed(e.to_string()))?;

        self.state.set_step_description(
            STEP_EXECUTING,
            format!("⏳ Waiting for confirmation of {:?}", hash),
        );

        let confirmed = self
            .signer
            .wait_for_receipt(hash)
            .await
            .map_err(|e| EngineError::ExecutionFailed(e.to_string()))?;
        if !confirmed {
            return Err(EngineError::ExecutionFailed(format!(
                "transaction {:?} reverted",
                hash
            )));
        }

        Ok(format!("{:?}", hash))
    }

    /// Best-effort bookkeeping after confirmation; never fails the pipeline
    async fn record_deployment(&mut self, req: &DeployRequest<'_>, hash: &str) {
        let decimals = self
            .directory
            .listing(req.source_chain_id, &req.source_token)
            .map(|l| l.decimals)
            .unwrap_or(18);
        let amount = format_units(req.amount, decimals).unwrap_or_else(|_| req.amount.to_string());

        let record = TransactionRecord {
            user_address: format!("{:?}", self.signer.address()),
            tx_type: "crosschain_deploy".to_string(),
            amount,
            protocol: infer_protocol_label(&req.destination.name).to_string(),
            chain_id: req.destination.chain_id,
            tx_hash: hash.to_string(),
            from_chain_id: req.source_chain_id,
            to_chain_id: req.destination.chain_id,
            token_address: format!("{:?}", req.source_token),
            token_decimals: decimals,
            is_cross_chain: req.source_chain_id != req.destination.chain_id,
            timestamp: Utc::now(),
        };

        self.recorder.record_transaction(&record).await;
    }

    /// Single choke point for failures: halts the pipeline, collapses the
    /// error into the display state, marks the current step
    fn set_error(&mut self, err: &EngineError) {
        self.state.is_loading = false;
        self.state.error_message = Some(err.to_string());
        self.state.tx_status = Some(TxStatus::Error);
        let step = self.state.current_step;
        self.state.set_step_description(step, format!("❌ {}", err));
    }
}

// ============================================
// TESTS
// ============================================
