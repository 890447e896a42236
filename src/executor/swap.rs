//! Swap execution state machine
//!
//! Idle → Wrapping? → Approving → Submitting → Confirming → Unwrapping? → Done,
//! with `Failed(kind)` reachable from anywhere. Steps are strictly sequential:
//! each one waits for its transaction to confirm before the next starts.

use alloy_primitives::{Address, B256, U256};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::allowance::AllowanceCache;
use super::intent::SwapIntent;
use super::state::SwapState;
use crate::chain::{AggregatorClient, SwapChain, TokenClient, TxSummary};
use crate::error::SwapError;
use crate::oracle::{final_output, OracleError, RouterResolver};
use crate::tokens::is_native;
use crate::whitelist::WhitelistSource;

#[derive(Debug, Clone, Copy)]
pub struct ExecutorSettings {
    pub wrapped_native: Address,
    pub confirm_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapOutcome {
    pub tx_hash: B256,
    /// Realized output of the swap itself
    pub amount_out: U256,
    /// Native amount withdrawn after a swap into native
    pub unwrapped: Option<U256>,
    pub wrap_tx: Option<B256>,
    pub approval_tx: Option<B256>,
    pub gas_used: u64,
    pub trail: Vec<SwapState>,
}

/// A failed run together with the states it went through
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct SwapFailure {
    pub error: SwapError,
    pub trail: Vec<SwapState>,
}

struct Tracker<'a> {
    trail: Vec<SwapState>,
    progress: &'a watch::Sender<SwapState>,
}

impl Tracker<'_> {
    fn enter(&mut self, state: SwapState) {
        debug!("Swap state -> {}", state);
        self.trail.push(state);
        self.progress.send_replace(state);
    }
}

#[derive(Default)]
struct Receipts {
    wrap_tx: Option<B256>,
    approval_tx: Option<B256>,
    gas_used: u64,
}

impl Receipts {
    fn add(&mut self, tx: &TxSummary) {
        self.gas_used += tx.gas_used;
    }
}

pub struct SwapExecutor {
    chain: Arc<dyn SwapChain>,
    routers: Arc<dyn RouterResolver>,
    allowances: Arc<AllowanceCache>,
    settings: ExecutorSettings,
    progress: watch::Sender<SwapState>,
}

impl SwapExecutor {
    pub fn new(
        chain: Arc<dyn SwapChain>,
        routers: Arc<dyn RouterResolver>,
        allowances: Arc<AllowanceCache>,
        settings: ExecutorSettings,
    ) -> Self {
        let (progress, _) = watch::channel(SwapState::Idle);
        Self {
            chain,
            routers,
            allowances,
            settings,
            progress,
        }
    }

    /// Receiver that follows state transitions of every run
    pub fn subscribe(&self) -> watch::Receiver<SwapState> {
        self.progress.subscribe()
    }

    pub fn allowances(&self) -> &AllowanceCache {
        &self.allowances
    }

    /// Run one intent to completion
    pub async fn execute(&self, intent: &SwapIntent) -> Result<SwapOutcome, SwapFailure> {
        let mut tracker = Tracker {
            trail: Vec::new(),
            progress: &self.progress,
        };
        tracker.enter(SwapState::Idle);

        match self.run(intent, &mut tracker).await {
            Ok(finished) => Ok(finished.finish(tracker.trail)),
            Err(error) => {
                tracker.enter(SwapState::Failed(error.kind()));
                error!("Swap failed ({}): {}", error.kind(), error);
                Err(SwapFailure {
                    error,
                    trail: tracker.trail,
                })
            }
        }
    }

    async fn run(&self, intent: &SwapIntent, tracker: &mut Tracker<'_>) -> Result<Finished, SwapError> {
        let wrapped = self.settings.wrapped_native;
        intent.validate(wrapped)?;
        let shape = intent.shape()?;
        let call = intent.swap_call(wrapped);
        let account = self.chain.account();

        self.preflight(intent).await?;
        self.probe(intent).await?;

        let mut receipts = Receipts::default();

        if shape.wraps() {
            tracker.enter(SwapState::Wrapping);
            let before = self.chain.balance_of(wrapped, account).await?;
            let tx = self.chain.wrap(wrapped, intent.amount_in).await?;
            let after = self.chain.balance_of(wrapped, account).await?;
            if after.saturating_sub(before) != intent.amount_in {
                return Err(SwapError::reverted(format!(
                    "wrap credited {} instead of {}",
                    after.saturating_sub(before),
                    intent.amount_in
                )));
            }
            receipts.add(&tx);
            receipts.wrap_tx = Some(tx.tx_hash);
        }

        tracker.enter(SwapState::Approving);
        if let Some(tx) = self.ensure_allowance(call.token_in, intent.amount_in).await? {
            receipts.add(&tx);
            receipts.approval_tx = Some(tx.tx_hash);
        }

        let out_before = self.chain.balance_of(call.token_out, account).await?;

        tracker.enter(SwapState::Submitting);
        let tx_hash = self.chain.submit_swap(&call).await.map_err(|e| self.after_swap_error(&call.token_in, e))?;
        info!("Swap submitted: {:?}", tx_hash);

        tracker.enter(SwapState::Confirming);
        let receipt = self
            .chain
            .confirm_swap(tx_hash, self.confirm_timeout(intent.deadline))
            .await
            .map_err(|e| self.after_swap_error(&call.token_in, e))?;
        receipts.gas_used += receipt.gas_used;

        let out_after = self.chain.balance_of(call.token_out, account).await?;
        let delta = out_after.saturating_sub(out_before);
        let amount_out = receipt.amount_out.unwrap_or(delta);
        info!("Swap confirmed: {:?} out={}", tx_hash, amount_out);

        let mut unwrapped = None;
        if shape.unwraps() {
            tracker.enter(SwapState::Unwrapping);
            if !delta.is_zero() {
                let tx = self.chain.unwrap(wrapped, delta).await?;
                receipts.add(&tx);
            }
            unwrapped = Some(delta);
        }

        tracker.enter(SwapState::Done);
        Ok(Finished {
            tx_hash,
            amount_out,
            unwrapped,
            receipts,
        })
    }

    /// Router still whitelisted and wrapped-native config agrees
    async fn preflight(&self, intent: &SwapIntent) -> Result<(), SwapError> {
        let routers = self.chain.routers().await?;
        if !routers.contains(&intent.router) {
            return Err(SwapError::ConfigMismatch(format!(
                "router {:?} is not whitelisted",
                intent.router
            )));
        }

        if is_native(intent.token_in) || is_native(intent.token_out) {
            let onchain = self.chain.weth().await?;
            if onchain != self.settings.wrapped_native {
                return Err(SwapError::ConfigMismatch(format!(
                    "aggregator WETH {:?} != configured {:?}",
                    onchain, self.settings.wrapped_native
                )));
            }
        }
        Ok(())
    }

    /// Re-quote the chosen route before spending anything
    async fn probe(&self, intent: &SwapIntent) -> Result<(), SwapError> {
        let router = self.routers.resolve(intent.router).ok_or_else(|| {
            SwapError::ConfigMismatch(format!("no router implementation at {:?}", intent.router))
        })?;

        let no_route = || SwapError::NoRoute {
            token_in: intent.token_in,
            token_out: intent.token_out,
        };
        let expected = match final_output(router.as_ref(), intent.amount_in, &intent.path).await {
            Ok(out) => out,
            Err(OracleError::Transport(e)) => return Err(SwapError::Network(e)),
            Err(e) => {
                warn!("Probe failed: {}", e);
                return Err(no_route());
            }
        };

        if expected.is_zero() {
            return Err(no_route());
        }
        if expected < intent.min_out {
            return Err(SwapError::reverted(
                "Slippage too high: expected output below minOut",
            ));
        }
        debug!("Probe ok: expected {} >= minOut {}", expected, intent.min_out);
        Ok(())
    }

    /// Approve the aggregator for `amount` of `token` unless already allowed.
    async fn ensure_allowance(&self, token: Address, amount: U256) -> Result<Option<TxSummary>, SwapError> {
        let owner = self.chain.account();
        let spender = self.chain.aggregator();

        match self.approve_if_needed(owner, token, spender, amount).await {
            Ok(tx) => Ok(tx),
            Err(e) => {
                self.allowances.invalidate(owner, token, spender);
                Err(e.into_approval())
            }
        }
    }

    async fn approve_if_needed(
        &self,
        owner: Address,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<Option<TxSummary>, SwapError> {
        if self.allowances.is_sufficient(owner, token, spender, amount) == Some(true) {
            debug!("Allowance cache hit, skipping approval");
            return Ok(None);
        }

        let current = self.chain.allowance(token, owner, spender).await?;
        self.allowances.set(owner, token, spender, current);
        if current >= amount {
            return Ok(None);
        }

        info!("Approving {:?} for the aggregator", token);
        self.allowances.invalidate(owner, token, spender);
        let tx = self.chain.approve(token, spender, U256::MAX).await?;
        self.allowances.record_approval(owner, token, spender, U256::MAX);
        Ok(Some(tx))
    }

    /// A swap that failed on allowance means the cached entry lied
    fn after_swap_error(&self, token_in: &Address, err: SwapError) -> SwapError {
        if let SwapError::Reverted { reason, .. } = &err {
            if reason.to_lowercase().contains("allowance") {
                self.allowances
                    .invalidate(self.chain.account(), *token_in, self.chain.aggregator());
            }
        }
        err
    }

    /// Configured timeout, cut short by the intent deadline
    fn confirm_timeout(&self, deadline: u64) -> Duration {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let remaining = Duration::from_secs(deadline.saturating_sub(now));
        self.settings.confirm_timeout.min(remaining)
    }
}

struct Finished {
    tx_hash: B256,
    amount_out: U256,
    unwrapped: Option<U256>,
    receipts: Receipts,
}

impl Finished {
    fn finish(self, trail: Vec<SwapState>) -> SwapOutcome {
        SwapOutcome {
            tx_hash: self.tx_hash,
            amount_out: self.amount_out,
            unwrapped: self.unwrapped,
            wrap_tx: self.receipts.wrap_tx,
            approval_tx: self.receipts.approval_tx,
            gas_used: self.receipts.gas_used,
            trail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainEvent, Sandbox};
    use crate::error::FailureKind;
    use crate::executor::state::SwapShape;
    use crate::oracle::{MockRouter, ONE_X};
    use crate::tokens::NATIVE_SENTINEL;
    use crate::whitelist::{AdminOp, AggregatorSettings};

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    const USER: u8 = 0x01;
    const AGG: u8 = 0xa9;
    const WETH: u8 = 0xaa;
    const TIN: u8 = 0x0a;
    const TOUT: u8 = 0x0b;
    const ROUTER: u8 = 0xe1;
    const FEE_SINK: u8 = 0xfe;

    struct Fixture {
        sandbox: Arc<Sandbox>,
        executor: SwapExecutor,
    }

    fn fixture(wrapped: Address) -> Fixture {
        let router = Arc::new(MockRouter::new(addr(ROUTER)));
        router.set_price_mul(addr(TIN), addr(TOUT), U256::from(ONE_X));
        router.set_price_mul(addr(WETH), addr(TOUT), U256::from(ONE_X));
        router.set_price_mul(addr(TIN), addr(WETH), U256::from(ONE_X * 2));

        let mut settings = AggregatorSettings::new(addr(USER), addr(WETH), [addr(ROUTER)], [], 25).unwrap();
        settings
            .apply(addr(USER), AdminOp::SetFeeReceiver(addr(FEE_SINK)))
            .unwrap();
        let sandbox = Arc::new(Sandbox::new(addr(USER), addr(AGG), settings));
        sandbox.deploy_router(router);

        let executor = SwapExecutor::new(
            sandbox.clone(),
            sandbox.clone(),
            Arc::new(AllowanceCache::default()),
            ExecutorSettings {
                wrapped_native: wrapped,
                confirm_timeout: Duration::from_millis(50),
            },
        );
        Fixture { sandbox, executor }
    }

    fn intent(amount: u64, token_in: Address, token_out: Address, path: Vec<Address>) -> SwapIntent {
        SwapIntent {
            amount_in: U256::from(amount),
            token_in,
            token_out,
            path,
            router: addr(ROUTER),
            parts: 1,
            min_out: U256::ZERO,
            deadline: deadline_in(600),
        }
    }

    fn deadline_in(secs: u64) -> u64 {
        chrono::Utc::now().timestamp() as u64 + secs
    }

    fn approvals(sb: &Sandbox) -> usize {
        sb.history()
            .iter()
            .filter(|e| matches!(e, ChainEvent::Approved { .. }))
            .count()
    }

    #[tokio::test]
    async fn test_native_in_wraps_before_approving() {
        let f = fixture(addr(WETH));
        f.sandbox.fund_native(addr(USER), U256::from(1));

        let intent = intent(1, NATIVE_SENTINEL, addr(TOUT), vec![addr(WETH), addr(TOUT)]);
        let outcome = f.executor.execute(&intent).await.unwrap();

        assert_eq!(outcome.trail, SwapShape::NativeToToken.happy_path());
        assert!(outcome.wrap_tx.is_some());

        let history = f.sandbox.history();
        assert_eq!(history[0], ChainEvent::Wrapped { amount: U256::from(1) });
        assert!(matches!(&history[1], ChainEvent::Approved { token, .. } if *token == addr(WETH)));
        assert!(matches!(history[2], ChainEvent::Swapped { .. }));

        assert_eq!(f.sandbox.native_balance(addr(USER)).await.unwrap(), U256::ZERO);
        assert_eq!(
            f.sandbox.balance_of(addr(TOUT), addr(USER)).await.unwrap(),
            outcome.amount_out
        );
    }

    #[tokio::test]
    async fn test_native_out_unwraps_observed_delta() {
        let f = fixture(addr(WETH));
        f.sandbox.mint(addr(TIN), addr(USER), U256::from(1_000));

        let intent = intent(1_000, addr(TIN), NATIVE_SENTINEL, vec![addr(TIN), addr(WETH)]);
        let outcome = f.executor.execute(&intent).await.unwrap();

        // 2000 gross minus 25 bps fee
        assert_eq!(outcome.amount_out, U256::from(1_995));
        assert_eq!(outcome.unwrapped, Some(U256::from(1_995)));
        assert_eq!(outcome.trail, SwapShape::TokenToNative.happy_path());
        assert_eq!(f.sandbox.native_balance(addr(USER)).await.unwrap(), U256::from(1_995));
        assert_eq!(f.sandbox.balance_of(addr(WETH), addr(USER)).await.unwrap(), U256::ZERO);
        assert_eq!(f.sandbox.balance_of(addr(WETH), addr(FEE_SINK)).await.unwrap(), U256::from(5));
    }

    #[tokio::test]
    async fn test_cached_allowance_skips_approval() {
        let f = fixture(addr(WETH));
        f.sandbox.mint(addr(TIN), addr(USER), U256::from(2_000));
        let intent = intent(1_000, addr(TIN), addr(TOUT), vec![addr(TIN), addr(TOUT)]);

        let first = tokio_test::assert_ok!(f.executor.execute(&intent).await);
        assert!(first.approval_tx.is_some());
        let second = tokio_test::assert_ok!(f.executor.execute(&intent).await);
        assert!(second.approval_tx.is_none());

        assert_eq!(approvals(&f.sandbox), 1);
        assert_eq!(
            f.executor.allowances().get(addr(USER), addr(TIN), addr(AGG)),
            Some(U256::MAX)
        );
    }

    #[tokio::test]
    async fn test_approval_failure_invalidates_cache() {
        let f = fixture(addr(WETH));
        f.sandbox.mint(addr(TIN), addr(USER), U256::from(1_000));
        f.sandbox.fail_approvals(true);

        let intent = intent(1_000, addr(TIN), addr(TOUT), vec![addr(TIN), addr(TOUT)]);
        let failure = f.executor.execute(&intent).await.unwrap_err();

        assert_eq!(failure.error.kind(), FailureKind::ApprovalError);
        assert_eq!(
            failure.trail.last(),
            Some(&SwapState::Failed(FailureKind::ApprovalError))
        );
        assert_eq!(f.executor.allowances().get(addr(USER), addr(TIN), addr(AGG)), None);
    }

    #[tokio::test]
    async fn test_router_removed_from_whitelist() {
        let f = fixture(addr(WETH));
        f.sandbox.mint(addr(TIN), addr(USER), U256::from(1_000));
        f.sandbox.admin(AdminOp::RemoveRouter(addr(ROUTER))).await.unwrap();

        let intent = intent(1_000, addr(TIN), addr(TOUT), vec![addr(TIN), addr(TOUT)]);
        let failure = f.executor.execute(&intent).await.unwrap_err();

        assert_eq!(failure.error.kind(), FailureKind::ConfigMismatch);
        assert_eq!(approvals(&f.sandbox), 0);
    }

    #[tokio::test]
    async fn test_wrapped_native_mismatch() {
        let f = fixture(addr(0xab));
        f.sandbox.fund_native(addr(USER), U256::from(10));

        let intent = intent(10, NATIVE_SENTINEL, addr(TOUT), vec![addr(0xab), addr(TOUT)]);
        let failure = f.executor.execute(&intent).await.unwrap_err();

        assert_eq!(failure.error.kind(), FailureKind::ConfigMismatch);
        assert_eq!(failure.trail, vec![SwapState::Idle, SwapState::Failed(FailureKind::ConfigMismatch)]);
        assert!(f.sandbox.history().is_empty());
    }

    #[tokio::test]
    async fn test_probe_below_min_out() {
        let f = fixture(addr(WETH));
        f.sandbox.mint(addr(TIN), addr(USER), U256::from(1_000));

        let mut intent = intent(1_000, addr(TIN), addr(TOUT), vec![addr(TIN), addr(TOUT)]);
        intent.min_out = U256::from(1_001);
        let failure = f.executor.execute(&intent).await.unwrap_err();

        assert!(failure.error.is_slippage());
        assert!(failure.error.to_string().contains("expected output below minOut"));
        assert!(f.sandbox.history().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_swap_signature() {
        let f = fixture(addr(WETH));
        f.sandbox.mint(addr(TIN), addr(USER), U256::from(1_000));
        f.sandbox.approve(addr(TIN), addr(AGG), U256::MAX).await.unwrap();
        f.sandbox.reject_next_signature();

        let intent = intent(1_000, addr(TIN), addr(TOUT), vec![addr(TIN), addr(TOUT)]);
        let failure = f.executor.execute(&intent).await.unwrap_err();

        assert!(matches!(failure.error, SwapError::UserRejected));
        let n = failure.trail.len();
        assert_eq!(failure.trail[n - 2], SwapState::Submitting);
        assert_eq!(approvals(&f.sandbox), 1);
    }

    #[tokio::test]
    async fn test_confirmation_timeout() {
        let f = fixture(addr(WETH));
        f.sandbox.mint(addr(TIN), addr(USER), U256::from(1_000));
        f.sandbox.stall_confirmations(true);

        let mut progress = f.executor.subscribe();
        let intent = intent(1_000, addr(TIN), addr(TOUT), vec![addr(TIN), addr(TOUT)]);
        let failure = f.executor.execute(&intent).await.unwrap_err();

        assert_eq!(failure.error.kind(), FailureKind::Timeout);
        assert_eq!(*progress.borrow_and_update(), SwapState::Failed(FailureKind::Timeout));
    }

    #[tokio::test]
    async fn test_stale_allowance_entry_is_dropped_after_revert() {
        let f = fixture(addr(WETH));
        f.sandbox.mint(addr(TIN), addr(USER), U256::from(1_000));
        f.executor
            .allowances()
            .set(addr(USER), addr(TIN), addr(AGG), U256::MAX);

        let intent = intent(1_000, addr(TIN), addr(TOUT), vec![addr(TIN), addr(TOUT)]);
        let failure = f.executor.execute(&intent).await.unwrap_err();

        assert_eq!(failure.error.kind(), FailureKind::Reverted);
        assert_eq!(f.executor.allowances().get(addr(USER), addr(TIN), addr(AGG)), None);

        // the retry reads the chain and approves
        f.executor.execute(&intent).await.unwrap();
        assert_eq!(approvals(&f.sandbox), 1);
    }
}
