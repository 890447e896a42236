//! Chain-facing clients used by the swap executor
//!
//! `RpcChain` talks to a node through alloy; `Sandbox` is an in-memory chain
//! with the same surface for tests and dry runs.

pub mod rpc;
pub mod sandbox;
pub mod wallet;

pub use rpc::{RpcChain, TxOverrides, FALLBACK_GAS_LIMIT};
pub use sandbox::{ChainEvent, Sandbox};
pub use wallet::{generate_new_wallet, WalletManager};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::error::SwapError;
use crate::routing::Quote;
use crate::whitelist::{AdminOp, WhitelistSource};

/// A mined transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TxSummary {
    pub tx_hash: B256,
    pub gas_used: u64,
}

/// Arguments of `swapMultiSplit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapCall {
    pub amount_in: U256,
    pub token_in: Address,
    pub token_out: Address,
    pub intermediates: Vec<Address>,
    pub parts: u8,
    pub deadline: u64,
}

/// Confirmed swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapReceipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    /// From the `SwapExecuted` log, when the receipt carries one
    pub amount_out: Option<U256>,
}

/// ERC-20 and wrapped-native operations for the signing account.
///
/// Mutating calls return once the transaction is confirmed.
#[async_trait]
pub trait TokenClient: Send + Sync {
    /// The signing account
    fn account(&self) -> Address;

    async fn native_balance(&self, owner: Address) -> Result<U256, SwapError>;
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, SwapError>;
    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256, SwapError>;
    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<TxSummary, SwapError>;

    /// `deposit()` of `amount` native into `wrapped`
    async fn wrap(&self, wrapped: Address, amount: U256) -> Result<TxSummary, SwapError>;

    /// `withdraw(amount)` from `wrapped`
    async fn unwrap(&self, wrapped: Address, amount: U256) -> Result<TxSummary, SwapError>;
}

/// The on-chain aggregator contract.
#[async_trait]
pub trait AggregatorClient: WhitelistSource {
    fn aggregator(&self) -> Address;

    async fn weth(&self) -> Result<Address, SwapError>;
    async fn fee_bps(&self) -> Result<u16, SwapError>;
    async fn fee_receiver(&self) -> Result<Address, SwapError>;

    /// `None` once ownership is renounced
    async fn owner(&self) -> Result<Option<Address>, SwapError>;

    /// The contract's own `quote` view. Empty `intermediates` means the
    /// contract uses its stored set.
    async fn contract_quote(
        &self,
        amount_in: U256,
        token_in: Address,
        token_out: Address,
        intermediates: &[Address],
    ) -> Result<Quote, SwapError>;

    /// Send `swapMultiSplit`; returns once the node accepted the transaction.
    async fn submit_swap(&self, call: &SwapCall) -> Result<B256, SwapError>;

    /// Wait for a submitted swap to be mined
    async fn confirm_swap(&self, tx_hash: B256, timeout: Duration) -> Result<SwapReceipt, SwapError>;

    async fn admin(&self, op: AdminOp) -> Result<TxSummary, SwapError>;
}

/// Everything the executor needs from a chain
pub trait SwapChain: TokenClient + AggregatorClient {}

impl<T: TokenClient + AggregatorClient> SwapChain for T {}
