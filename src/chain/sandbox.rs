//! In-memory chain
//!
//! Holds ERC-20 balances and allowances, a wrapped-native token, a set of
//! mock routers and an aggregator whose `swapMultiSplit` behaves like the
//! deployed contract: every part is routed through the best whitelisted
//! router at that moment, the fee is skimmed to the fee receiver, and the
//! whole call reverts if any part fails. Transactions are mined instantly.

use alloy_primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use super::{AggregatorClient, SwapCall, SwapReceipt, TokenClient, TxSummary};
use crate::error::SwapError;
use crate::oracle::{MockRouter, RouterQuoter, RouterResolver};
use crate::routing::{generate_paths, Quote};
use crate::whitelist::{AdminOp, AggregatorSettings, WhitelistSource};

/// Most parts the aggregator accepts
pub const CONTRACT_MAX_PARTS: u8 = 10;

/// Execution tolerance the aggregator applies to each part's quote
pub const PART_SLIPPAGE_GUARD_BPS: u64 = 300;

const GAS_APPROVE: u64 = 46_000;
const GAS_WRAP: u64 = 28_000;
const GAS_SWAP_BASE: u64 = 90_000;
const GAS_SWAP_PER_PART: u64 = 110_000;

/// Something that happened on the sandbox chain, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ChainEvent {
    Wrapped { amount: U256 },
    Unwrapped { amount: U256 },
    Approved { token: Address, spender: Address, amount: U256 },
    Swapped { tx_hash: B256, amount_in: U256, amount_out: U256, parts: u8 },
    Admin(AdminOp),
}

#[derive(Debug)]
struct Ledger {
    native: HashMap<Address, U256>,
    balances: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
    settings: AggregatorSettings,
    receipts: HashMap<B256, Result<SwapReceipt, SwapError>>,
    history: Vec<ChainEvent>,
    nonce: u64,
    block: u64,
}

impl Ledger {
    fn balance(&self, token: Address, owner: Address) -> U256 {
        self.balances.get(&(token, owner)).copied().unwrap_or_default()
    }

    fn credit(&mut self, token: Address, owner: Address, amount: U256) {
        *self.balances.entry((token, owner)).or_default() += amount;
    }

    fn debit(&mut self, token: Address, owner: Address, amount: U256) -> Result<(), SwapError> {
        let balance = self.balance(token, owner);
        if balance < amount {
            return Err(SwapError::reverted("ERC20: transfer amount exceeds balance"));
        }
        self.balances.insert((token, owner), balance - amount);
        Ok(())
    }

    fn next_tx(&mut self) -> (B256, u64) {
        self.nonce += 1;
        self.block += 1;
        (keccak256(self.nonce.to_be_bytes()), self.block)
    }
}

pub struct Sandbox {
    account: Address,
    aggregator: Address,
    ledger: Mutex<Ledger>,
    routers: Mutex<Vec<Arc<MockRouter>>>,
    clock_offset: AtomicI64,
    reject_next: AtomicBool,
    offline: AtomicBool,
    stall_confirmations: AtomicBool,
    fail_approvals: AtomicBool,
}

impl Sandbox {
    pub fn new(account: Address, aggregator: Address, settings: AggregatorSettings) -> Self {
        Self {
            account,
            aggregator,
            ledger: Mutex::new(Ledger {
                native: HashMap::new(),
                balances: HashMap::new(),
                allowances: HashMap::new(),
                settings,
                receipts: HashMap::new(),
                history: Vec::new(),
                nonce: 0,
                block: 1,
            }),
            routers: Mutex::new(Vec::new()),
            clock_offset: AtomicI64::new(0),
            reject_next: AtomicBool::new(false),
            offline: AtomicBool::new(false),
            stall_confirmations: AtomicBool::new(false),
            fail_approvals: AtomicBool::new(false),
        }
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn deployed(&self) -> Vec<Arc<MockRouter>> {
        self.routers.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    // ============================================
    // SETUP & INSPECTION
    // ============================================

    /// Make a mock router callable at its address
    pub fn deploy_router(&self, router: Arc<MockRouter>) {
        self.routers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(router);
    }

    pub fn fund_native(&self, owner: Address, amount: U256) {
        *self.ledger().native.entry(owner).or_default() += amount;
    }

    pub fn mint(&self, token: Address, owner: Address, amount: U256) {
        self.ledger().credit(token, owner, amount);
    }

    pub fn settings(&self) -> AggregatorSettings {
        self.ledger().settings.clone()
    }

    pub fn history(&self) -> Vec<ChainEvent> {
        self.ledger().history.clone()
    }

    /// Current block timestamp
    pub fn now(&self) -> u64 {
        let now = chrono::Utc::now().timestamp() + self.clock_offset.load(Ordering::Relaxed);
        now.max(0) as u64
    }

    pub fn advance_time(&self, secs: i64) {
        self.clock_offset.fetch_add(secs, Ordering::Relaxed);
    }

    /// The next signing request is rejected by the wallet
    pub fn reject_next_signature(&self) {
        self.reject_next.store(true, Ordering::Relaxed);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Submitted swaps never get mined
    pub fn stall_confirmations(&self, stall: bool) {
        self.stall_confirmations.store(stall, Ordering::Relaxed);
    }

    /// `approve` transactions revert
    pub fn fail_approvals(&self, fail: bool) {
        self.fail_approvals.store(fail, Ordering::Relaxed);
    }

    fn reachable(&self) -> Result<(), SwapError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(SwapError::Network("sandbox node offline".to_string()));
        }
        Ok(())
    }

    /// Reachability plus wallet signature
    fn sign(&self) -> Result<(), SwapError> {
        self.reachable()?;
        if self.reject_next.swap(false, Ordering::Relaxed) {
            return Err(SwapError::UserRejected);
        }
        Ok(())
    }

    // ============================================
    // AGGREGATOR CONTRACT
    // ============================================

    /// Best route over whitelisted routers that have code. The second value
    /// is false when some whitelisted router has none.
    fn best_route(
        &self,
        settings: &AggregatorSettings,
        amount_in: U256,
        token_in: Address,
        token_out: Address,
        intermediates: &[Address],
    ) -> (Option<(Arc<MockRouter>, Vec<Address>, U256)>, bool) {
        let deployed = self.deployed();
        let mids: &[Address] = if intermediates.is_empty() {
            settings.intermediates.as_slice()
        } else {
            intermediates
        };
        let paths = generate_paths(token_in, token_out, mids, 3);

        let mut all_have_code = true;
        let mut best: Option<(Arc<MockRouter>, Vec<Address>, U256)> = None;
        for router_addr in settings.routers.as_slice() {
            let Some(router) = deployed.iter().find(|r| r.address() == *router_addr) else {
                all_have_code = false;
                continue;
            };
            for path in &paths {
                let Ok(amounts) = router.amounts_out(amount_in, path) else {
                    continue;
                };
                let out = amounts.last().copied().unwrap_or_default();
                if out > best.as_ref().map(|b| b.2).unwrap_or_default() {
                    best = Some((router.clone(), path.clone(), out));
                }
            }
        }
        (best, all_have_code)
    }

    fn swap_multi_split(&self, call: &SwapCall) -> Result<(U256, u64), SwapError> {
        if call.amount_in.is_zero() {
            return Err(SwapError::reverted("amountIn=0"));
        }
        if call.parts == 0 || call.parts > CONTRACT_MAX_PARTS {
            return Err(SwapError::reverted("invalid parts"));
        }
        if self.now() > call.deadline {
            return Err(SwapError::reverted("Expired"));
        }

        let mut ledger = self.ledger();
        let user = self.account;
        let allowance = ledger
            .allowances
            .get(&(call.token_in, user, self.aggregator))
            .copied()
            .unwrap_or_default();
        if allowance < call.amount_in {
            return Err(SwapError::reverted("ERC20: insufficient allowance"));
        }
        if ledger.balance(call.token_in, user) < call.amount_in {
            return Err(SwapError::reverted("ERC20: transfer amount exceeds balance"));
        }

        let settings = ledger.settings.clone();
        let deployed = self.deployed();
        let checkpoints: Vec<_> = deployed.iter().map(|r| r.checkpoint()).collect();

        let parts = U256::from(call.parts);
        let part = call.amount_in / parts;
        let remainder = call.amount_in - part * parts;

        let mut total_out = U256::ZERO;
        let mut failure = None;
        for i in 0..call.parts {
            // the last part also carries the remainder
            let amount = if i + 1 == call.parts { part + remainder } else { part };
            if amount.is_zero() {
                continue;
            }
            let (best, all_have_code) =
                self.best_route(&settings, amount, call.token_in, call.token_out, &call.intermediates);
            let Some((router, path, quoted)) = best else {
                let reason = if all_have_code { "No route" } else { "Router not allowed" };
                failure = Some(SwapError::reverted(reason));
                break;
            };
            let guard = quoted * U256::from(10_000 - PART_SLIPPAGE_GUARD_BPS) / U256::from(10_000);
            match router.execute(amount, guard, &path) {
                Ok(out) => {
                    debug!("part {} of {}: {} -> {} via {:?}", i + 1, call.parts, amount, out, router.address());
                    total_out += out;
                }
                Err(_) => {
                    failure = Some(SwapError::reverted("Insufficient output"));
                    break;
                }
            }
        }

        if let Some(err) = failure {
            for (router, pairs) in deployed.iter().zip(checkpoints) {
                router.rollback(pairs);
            }
            return Err(err);
        }

        let fee = total_out * U256::from(settings.fee_bps) / U256::from(10_000);
        let allowance = ledger
            .allowances
            .entry((call.token_in, user, self.aggregator))
            .or_default();
        if *allowance != U256::MAX {
            *allowance -= call.amount_in;
        }
        ledger.debit(call.token_in, user, call.amount_in)?;
        ledger.credit(call.token_out, settings.fee_receiver, fee);
        ledger.credit(call.token_out, user, total_out - fee);

        let gas = GAS_SWAP_BASE + GAS_SWAP_PER_PART * u64::from(call.parts);
        Ok((total_out - fee, gas))
    }

    fn mine(&self, ledger: &mut Ledger, gas_used: u64, event: Option<ChainEvent>) -> TxSummary {
        let (tx_hash, _) = ledger.next_tx();
        if let Some(event) = event {
            ledger.history.push(event);
        }
        TxSummary { tx_hash, gas_used }
    }
}

#[async_trait]
impl WhitelistSource for Sandbox {
    async fn routers(&self) -> Result<Vec<Address>, SwapError> {
        self.reachable()?;
        Ok(self.ledger().settings.routers.to_vec())
    }

    async fn intermediates(&self) -> Result<Vec<Address>, SwapError> {
        self.reachable()?;
        Ok(self.ledger().settings.intermediates.to_vec())
    }
}

impl RouterResolver for Sandbox {
    fn resolve(&self, router: Address) -> Option<Arc<dyn RouterQuoter>> {
        self.deployed()
            .into_iter()
            .find(|r| r.address() == router)
            .map(|r| r as Arc<dyn RouterQuoter>)
    }
}

#[async_trait]
impl TokenClient for Sandbox {
    fn account(&self) -> Address {
        self.account
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, SwapError> {
        self.reachable()?;
        Ok(self.ledger().native.get(&owner).copied().unwrap_or_default())
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, SwapError> {
        self.reachable()?;
        Ok(self.ledger().balance(token, owner))
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256, SwapError> {
        self.reachable()?;
        Ok(self
            .ledger()
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default())
    }

    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<TxSummary, SwapError> {
        self.sign()?;
        if self.fail_approvals.load(Ordering::Relaxed) {
            return Err(SwapError::reverted("approve reverted"));
        }
        let mut ledger = self.ledger();
        ledger.allowances.insert((token, self.account, spender), amount);
        Ok(self.mine(&mut ledger, GAS_APPROVE, Some(ChainEvent::Approved { token, spender, amount })))
    }

    async fn wrap(&self, wrapped: Address, amount: U256) -> Result<TxSummary, SwapError> {
        self.sign()?;
        let mut ledger = self.ledger();
        let native = ledger.native.get(&self.account).copied().unwrap_or_default();
        if native < amount {
            return Err(SwapError::reverted("insufficient funds for transaction"));
        }
        ledger.native.insert(self.account, native - amount);
        ledger.credit(wrapped, self.account, amount);
        Ok(self.mine(&mut ledger, GAS_WRAP, Some(ChainEvent::Wrapped { amount })))
    }

    async fn unwrap(&self, wrapped: Address, amount: U256) -> Result<TxSummary, SwapError> {
        self.sign()?;
        let mut ledger = self.ledger();
        ledger.debit(wrapped, self.account, amount)?;
        *ledger.native.entry(self.account).or_default() += amount;
        Ok(self.mine(&mut ledger, GAS_WRAP, Some(ChainEvent::Unwrapped { amount })))
    }
}

#[async_trait]
impl AggregatorClient for Sandbox {
    fn aggregator(&self) -> Address {
        self.aggregator
    }

    async fn weth(&self) -> Result<Address, SwapError> {
        self.reachable()?;
        Ok(self.ledger().settings.weth)
    }

    async fn fee_bps(&self) -> Result<u16, SwapError> {
        self.reachable()?;
        Ok(self.ledger().settings.fee_bps)
    }

    async fn fee_receiver(&self) -> Result<Address, SwapError> {
        self.reachable()?;
        Ok(self.ledger().settings.fee_receiver)
    }

    async fn owner(&self) -> Result<Option<Address>, SwapError> {
        self.reachable()?;
        Ok(self.ledger().settings.owner)
    }

    async fn contract_quote(
        &self,
        amount_in: U256,
        token_in: Address,
        token_out: Address,
        intermediates: &[Address],
    ) -> Result<Quote, SwapError> {
        self.reachable()?;
        let settings = self.settings();
        let (best, _) = self.best_route(&settings, amount_in, token_in, token_out, intermediates);
        Ok(match best {
            Some((router, path, amount_out)) => Quote {
                amount_out,
                router: router.address(),
                path,
            },
            None => Quote::no_route(),
        })
    }

    async fn submit_swap(&self, call: &SwapCall) -> Result<B256, SwapError> {
        self.sign()?;
        let result = self.swap_multi_split(call);

        let mut ledger = self.ledger();
        let (tx_hash, block) = ledger.next_tx();
        let receipt = match result {
            Ok((amount_out, gas_used)) => {
                info!("Sandbox swap {:?}: {} -> {}", tx_hash, call.amount_in, amount_out);
                ledger.history.push(ChainEvent::Swapped {
                    tx_hash,
                    amount_in: call.amount_in,
                    amount_out,
                    parts: call.parts,
                });
                Ok(SwapReceipt {
                    tx_hash,
                    block_number: Some(block),
                    gas_used,
                    amount_out: Some(amount_out),
                })
            }
            Err(SwapError::Reverted { reason, .. }) => Err(SwapError::Reverted {
                reason,
                tx_hash: Some(tx_hash),
            }),
            Err(other) => Err(other),
        };
        ledger.receipts.insert(tx_hash, receipt);
        Ok(tx_hash)
    }

    async fn confirm_swap(&self, tx_hash: B256, timeout: Duration) -> Result<SwapReceipt, SwapError> {
        if self.stall_confirmations.load(Ordering::Relaxed) {
            tokio::time::sleep(timeout).await;
            return Err(SwapError::Timeout(format!("{:?} not mined after {:?}", tx_hash, timeout)));
        }
        self.reachable()?;
        self.ledger()
            .receipts
            .get(&tx_hash)
            .cloned()
            .unwrap_or_else(|| Err(SwapError::Network(format!("unknown transaction {:?}", tx_hash))))
    }

    async fn admin(&self, op: AdminOp) -> Result<TxSummary, SwapError> {
        self.sign()?;
        let mut ledger = self.ledger();
        ledger
            .settings
            .apply(self.account, op)
            .map_err(|e| SwapError::reverted(e.to_string()))?;
        Ok(self.mine(&mut ledger, 50_000, Some(ChainEvent::Admin(op))))
    }
}
