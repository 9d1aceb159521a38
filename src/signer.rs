//! Chain Signer - Wallet Collaborator
//!
//! The engine treats the wallet as an opaque signer: it hands over a
//! transaction request and gets back a hash. Key custody and chain switching
//! stay outside; the signer is assumed to already sit on the correct source
//! chain.
//!
//! ⚠️  SECURITY WARNING:
//! - Never log or expose private keys
//! - Use environment variables, not hardcoded keys

use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use eyre::{eyre, Result};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

sol! {
    /// Minimal ERC-20 surface the pipeline needs
    interface IERC20 {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address owner) external view returns (uint256);
    }
}

/// A fully specified transaction, ready to sign and broadcast
#[derive(Debug, Clone)]
pub struct TransactionSpec {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas_limit: u64,
}

/// Wallet collaborator interface: address, ERC-20 bindings, raw send,
/// receipt wait
#[async_trait]
pub trait ChainSigner: Send + Sync {
    fn address(&self) -> Address;

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256>;

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256>;

    /// Submit `approve(spender, amount)` and wait for one confirmation.
    /// Errors on signer rejection, revert or provider failure.
    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<B256>;

    /// Broadcast a signed transaction and return its hash
    async fn send_transaction(&self, spec: TransactionSpec) -> Result<B256>;

    /// Wait for the receipt; `true` means the transaction succeeded
    async fn wait_for_receipt(&self, hash: B256) -> Result<bool>;
}

// ============================================
// WALLET SIGNER (local key, EIP-1559)
// ============================================

/// Receipt polling cadence
const RECEIPT_POLL_MS: u64 = 3_000;

/// Give up waiting for a receipt after this many polls
const RECEIPT_MAX_POLLS: u32 = 60;

/// Gas limit used for plain approvals
const APPROVE_GAS_LIMIT: u64 = 80_000;

/// Locally-signing wallet over an HTTP provider
pub struct WalletSigner {
    signer: PrivateKeySigner,
    rpc_url: String,
    chain_id: u64,
}

impl WalletSigner {
    pub fn new(private_key: &str, rpc_url: impl Into<String>, chain_id: u64) -> Result<Self> {
        let key = private_key.trim_start_matches("0x");
        let signer = PrivateKeySigner::from_str(key)
            .map_err(|e| eyre!("Failed to parse private key: {}", e))?;

        info!("✓ Wallet signer loaded: {:?}", signer.address());

        Ok(Self {
            signer,
            rpc_url: rpc_url.into(),
            chain_id,
        })
    }

    /// Create from environment variables (DEPLOYER_PRIVATE_KEY, RPC_URL, CHAIN_ID)
    pub fn from_env() -> Result<Self> {
        let key = std::env::var("DEPLOYER_PRIVATE_KEY")
            .map_err(|_| eyre!("DEPLOYER_PRIVATE_KEY not set"))?;
        let rpc_url =
            std::env::var("RPC_URL").unwrap_or_else(|_| "https://eth.llamarpc.com".to_string());
        let chain_id = std::env::var("CHAIN_ID")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .unwrap_or(1);

        Self::new(&key, rpc_url, chain_id)
    }

    fn provider(&self) -> Result<impl Provider> {
        Ok(ProviderBuilder::new().connect_http(self.rpc_url.parse()?))
    }

    /// Read-only contract call returning the raw 32-byte word as U256
    async fn call_u256(&self, to: Address, calldata: Vec<u8>) -> Result<U256> {
        let provider = self.provider()?;
        let tx = TransactionRequest::default()
            .to(to)
            .input(Bytes::from(calldata).into());

        let ret = provider.call(tx).await?;
        if ret.len() < 32 {
            return Err(eyre!("short return from {:?}: {} bytes", to, ret.len()));
        }
        Ok(U256::from_be_slice(&ret[..32]))
    }

    /// Sign an EIP-1559 transaction and broadcast it raw
    async fn sign_and_send(&self, spec: &TransactionSpec) -> Result<B256> {
        let provider = self.provider()?;
        let from = self.signer.address();

        let nonce = provider.get_transaction_count(from).await?;
        let gas_price = provider.get_gas_price().await?;
        let max_fee = gas_price + gas_price / 5;
        let priority_fee = (gas_price / 10).max(1);

        let tx = TxEip1559 {
            chain_id: self.chain_id,
            nonce,
            gas_limit: spec.gas_limit,
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: priority_fee,
            to: alloy_primitives::TxKind::Call(spec.to),
            value: spec.value,
            input: spec.data.clone(),
            access_list: Default::default(),
        };

        let sig_hash = tx.signature_hash();
        let signature = self
            .signer
            .sign_hash(&sig_hash)
            .await
            .map_err(|e| eyre!("Failed to sign transaction: {}", e))?;

        let envelope = TxEnvelope::Eip1559(tx.into_signed(signature));
        let encoded = envelope.encoded_2718();

        let pending = provider.send_raw_transaction(&encoded).await?;
        let hash = *pending.tx_hash();

        debug!(
            "Broadcast EIP-1559 tx: to={:?}, nonce={}, gas_limit={}, value={}",
            spec.to, nonce, spec.gas_limit, spec.value
        );

        Ok(hash)
    }
}

#[async_trait]
impl ChainSigner for WalletSigner {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        let call = IERC20::allowanceCall { owner, spender };
        self.call_u256(token, call.abi_encode()).await
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        let call = IERC20::balanceOfCall { owner };
        self.call_u256(token, call.abi_encode()).await
    }

    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<B256> {
        let call = IERC20::approveCall { spender, amount };
        let spec = TransactionSpec {
            to: token,
            value: U256::ZERO,
            data: Bytes::from(call.abi_encode()),
            gas_limit: APPROVE_GAS_LIMIT,
        };

        let hash = self.sign_and_send(&spec).await?;
        info!("⏳ Approval submitted: {:?}", hash);

        if !self.wait_for_receipt(hash).await? {
            return Err(eyre!("approval transaction {:?} reverted", hash));
        }
        Ok(hash)
    }

    async fn send_transaction(&self, spec: TransactionSpec) -> Result<B256> {
        self.sign_and_send(&spec).await
    }

    async fn wait_for_receipt(&self, hash: B256) -> Result<bool> {
        let provider = self.provider()?;

        for _ in 0..RECEIPT_MAX_POLLS {
            if let Some(receipt) = provider.get_transaction_receipt(hash).await? {
                return Ok(receipt.status());
            }
            tokio::time::sleep(Duration::from_millis(RECEIPT_POLL_MS)).await;
        }

        warn!("No receipt for {:?} after {} polls", hash, RECEIPT_MAX_POLLS);
        Err(eyre!("timed out waiting for receipt of {:?}", hash))
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known anvil test key (DO NOT USE IN PRODUCTION)
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_wallet_from_key() {
        let signer = WalletSigner::new(TEST_KEY, "http://localhost:8545", 1).unwrap();
        assert_eq!(
            format!("{:?}", signer.address()).to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_bad_key_rejected() {
        assert!(WalletSigner::new("0xnothex", "http://localhost:8545", 1).is_err());
    }

    #[test]
    fn test_erc20_calldata_selectors() {
        let call = IERC20::approveCall {
            spender: Address::ZERO,
            amount: U256::from(1u64),
        };
        let encoded = call.abi_encode();
        // approve(address,uint256) selector
        assert_eq!(&encoded[..4], &[0x09, 0x5e, 0xa7, 0xb3]);

        let call = IERC20::allowanceCall {
            owner: Address::ZERO,
            spender: Address::ZERO,
        };
        assert_eq!(&call.abi_encode()[..4], &[0xdd, 0x62, 0xed, 0x3e]);
    }
}
