//! Router price oracle
//!
//! Every whitelisted router is a black box answering
//! `getAmountsOut(amountIn, path)`. Two implementations:
//! - `V2Router`: a deployed Uniswap-V2 style router over JSON-RPC
//! - `MockRouter`: in-memory pricing for tests and the sandbox chain

mod mock;
mod v2_router;

pub use mock::{MockRouter, PairPricing, ONE_X};
pub use v2_router::V2Router;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum OracleError {
    /// The router reverted, usually because a hop has no pool
    #[error("router call reverted: {0}")]
    Reverted(String),

    #[error("router transport failure: {0}")]
    Transport(String),

    #[error("malformed router response: {0}")]
    Malformed(String),
}

/// A Uniswap-V2 style router
#[async_trait]
pub trait RouterQuoter: Send + Sync {
    fn address(&self) -> Address;

    /// Output amounts at every hop; `amounts[0] == amount_in`.
    async fn quote_amounts_out(
        &self,
        amount_in: U256,
        path: &[Address],
    ) -> Result<Vec<U256>, OracleError>;

    /// Swap an exact input along `path`, returning the realized output.
    async fn swap_exact_tokens(
        &self,
        amount_in: U256,
        amount_out_min: U256,
        path: &[Address],
        to: Address,
        deadline: u64,
    ) -> Result<U256, OracleError>;

    /// Pool reserves for each hop of `path`, oriented in swap direction.
    /// A hop is `None` when its reserves cannot be read.
    async fn hop_reserves(&self, path: &[Address]) -> Vec<Option<PairReserves>> {
        vec![None; path.len().saturating_sub(1)]
    }
}

/// Reserves of one hop's pool, input side first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairReserves {
    pub reserve_in: U256,
    pub reserve_out: U256,
}

/// Final hop output of a router quote.
pub async fn final_output(
    router: &dyn RouterQuoter,
    amount_in: U256,
    path: &[Address],
) -> Result<U256, OracleError> {
    let amounts = router.quote_amounts_out(amount_in, path).await?;
    if amounts.len() != path.len() {
        return Err(OracleError::Malformed(format!(
            "expected {} amounts, got {}",
            path.len(),
            amounts.len()
        )));
    }
    amounts
        .last()
        .copied()
        .ok_or_else(|| OracleError::Malformed("empty amounts".to_string()))
}

/// Maps a whitelisted router address to something that can quote it.
pub trait RouterResolver: Send + Sync {
    fn resolve(&self, router: Address) -> Option<Arc<dyn RouterQuoter>>;
}
