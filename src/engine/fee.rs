//! Fee Estimator
//!
//! Quotes the native-currency fee the messaging protocol charges to deliver
//! a prepared payload. Pure read call against the router - no state change,
//! no transaction. A failure here halts the pipeline before any approval or
//! spend happens.

use alloy_primitives::{utils::format_ether, Address, Bytes, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use eyre::{eyre, Result};
use tracing::debug;

use super::payload::{build_ccip_message, CcipTransactionData, IRouterClient};

/// Fee-quoting seam. The production implementation asks the router; tests
/// inject canned quotes or failures.
#[async_trait]
pub trait FeeQuoter: Send + Sync {
    /// Fee in the source chain's native currency, as a decimal string
    async fn estimate_fee(&self, payload: &CcipTransactionData) -> Result<String>;
}

/// Quotes fees via the source chain router's `getFee` entry point
pub struct RouterFeeQuoter {
    rpc_url: String,
    router_address: Address,
}

impl RouterFeeQuoter {
    pub fn new(rpc_url: impl Into<String>, router_address: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            router_address,
        }
    }
}

#[async_trait]
impl FeeQuoter for RouterFeeQuoter {
    async fn estimate_fee(&self, payload: &CcipTransactionData) -> Result<String> {
        let message = build_ccip_message(payload);
        let call = IRouterClient::getFeeCall {
            destinationChainSelector: payload.destination_chain_selector,
            message,
        };

        let provider = ProviderBuilder::new().connect_http(self.rpc_url.parse()?);
        let tx = TransactionRequest::default()
            .to(self.router_address)
            .input(Bytes::from(call.abi_encode()).into());

        let ret = provider.call(tx).await?;
        if ret.len() < 32 {
            return Err(eyre!(
                "router {:?} returned {} bytes for getFee",
                self.router_address,
                ret.len()
            ));
        }

        let fee_wei = U256::from_be_slice(&ret[..32]);
        let fee = format_ether(fee_wei);
        debug!(
            "💸 Router fee quote for selector {}: {} native",
            payload.destination_chain_selector, fee
        );

        Ok(fee)
    }
}
