//! Approval Manager
//!
//! Inspects and, if necessary, raises the ERC-20 allowance for the executor
//! contract on the source chain. The allowance read happens on every attempt
//! and is never cached, which makes the whole step idempotent: a sufficient
//! allowance short-circuits with no transaction sent.

use alloy_primitives::{Address, U256};
use eyre::Result;
use tracing::{debug, info};

use crate::signer::ChainSigner;

/// Ensure `spender` may move at least `required` of `token` from `owner`.
///
/// Returns `true` once the allowance is in place. Errors propagate from the
/// signer on rejection, revert or provider failure; callers must not assume
/// any partial allowance was set.
pub async fn ensure_allowance<S: ChainSigner + ?Sized>(
    signer: &S,
    owner: Address,
    spender: Address,
    token: Address,
    required: U256,
) -> Result<bool> {
    let current = signer.allowance(token, owner, spender).await?;

    if current >= required {
        debug!(
            "Allowance sufficient ({} >= {}), no approval needed",
            current, required
        );
        return Ok(true);
    }

    info!(
        "Raising allowance for {:?}: {} -> {}",
        spender, current, required
    );
    let hash = signer.approve(token, spender, required).await?;
    info!("✓ Approval confirmed: {:?}", hash);

    Ok(true)
}

// ============================================
// TESTS
// ============================================
