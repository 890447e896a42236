//! In-memory router used by tests and the sandbox chain.
//!
//! Mirrors the behaviour of a mock Uniswap-V2 router contract: per-pair
//! pricing, an optional execution-only slippage, and an optional size-based
//! impact so split sizing has something to optimize.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{OracleError, PairReserves, RouterQuoter};

const BPS: u64 = 10_000;

/// 1.0 in the multiplier fixed-point scale
pub const ONE_X: u128 = 1_000_000_000_000_000_000;

/// How a single directed hop is priced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairPricing {
    /// out = in * mul / 1e18
    Multiplier(U256),
    /// Constant product with the 0.3% V2 fee; reserves move on swaps
    Reserves { reserve_in: U256, reserve_out: U256 },
}

impl PairPricing {
    fn amount_out(&self, amount_in: U256) -> Result<U256, OracleError> {
        match *self {
            PairPricing::Multiplier(mul) => Ok(amount_in * mul / U256::from(ONE_X)),
            PairPricing::Reserves { reserve_in, reserve_out } => {
                if reserve_in.is_zero() || reserve_out.is_zero() {
                    return Err(OracleError::Reverted(
                        "UniswapV2Library: INSUFFICIENT_LIQUIDITY".to_string(),
                    ));
                }
                // amountOut = (amountIn * 997 * reserveOut) / (reserveIn * 1000 + amountIn * 997)
                let amount_in_with_fee = amount_in * U256::from(997);
                let numerator = amount_in_with_fee * reserve_out;
                let denominator = reserve_in * U256::from(1000) + amount_in_with_fee;
                Ok(numerator / denominator)
            }
        }
    }
}

#[derive(Debug, Default)]
struct RouterBook {
    pairs: HashMap<(Address, Address), PairPricing>,
    /// Extra impact once a single swap reaches `threshold`
    impact: Option<(U256, u32)>,
}

pub struct MockRouter {
    address: Address,
    book: Mutex<RouterBook>,
    exec_slippage_bps: AtomicU32,
    offline: AtomicBool,
    quote_calls: AtomicUsize,
}

impl MockRouter {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            book: Mutex::new(RouterBook::default()),
            exec_slippage_bps: AtomicU32::new(0),
            offline: AtomicBool::new(false),
            quote_calls: AtomicUsize::new(0),
        }
    }

    /// Price `token_in -> token_out` at `mul / 1e18`
    pub fn set_price_mul(&self, token_in: Address, token_out: Address, mul: U256) {
        self.book()
            .pairs
            .insert((token_in, token_out), PairPricing::Multiplier(mul));
    }

    /// Register a constant-product pool usable in both directions
    pub fn set_reserves(&self, token_a: Address, token_b: Address, reserve_a: U256, reserve_b: U256) {
        let mut book = self.book();
        book.pairs.insert(
            (token_a, token_b),
            PairPricing::Reserves { reserve_in: reserve_a, reserve_out: reserve_b },
        );
        book.pairs.insert(
            (token_b, token_a),
            PairPricing::Reserves { reserve_in: reserve_b, reserve_out: reserve_a },
        );
    }

    /// Slippage applied at execution only, never in quotes
    pub fn set_exec_slippage_bps(&self, bps: u32) {
        self.exec_slippage_bps.store(bps, Ordering::Relaxed);
    }

    /// Haircut of `bps` on quotes and swaps whose input is at least `threshold`
    pub fn set_size_impact(&self, threshold: U256, bps: u32) {
        self.book().impact = Some((threshold, bps));
    }

    /// Simulate an unreachable node
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    fn book(&self) -> MutexGuard<'_, RouterBook> {
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::Relaxed)
    }

    /// Synchronous `getAmountsOut`, not counted in `quote_calls`
    pub(crate) fn amounts_out(&self, amount_in: U256, path: &[Address]) -> Result<Vec<U256>, OracleError> {
        if path.len() < 2 {
            return Err(OracleError::Reverted("UniswapV2Library: INVALID_PATH".to_string()));
        }
        if amount_in.is_zero() {
            return Err(OracleError::Reverted(
                "UniswapV2Library: INSUFFICIENT_INPUT_AMOUNT".to_string(),
            ));
        }

        let book = self.book();
        let mut amounts = Vec::with_capacity(path.len());
        amounts.push(amount_in);
        let mut current = amount_in;
        for hop in path.windows(2) {
            let pricing = book
                .pairs
                .get(&(hop[0], hop[1]))
                .ok_or_else(|| OracleError::Reverted("pair does not exist".to_string()))?;
            current = pricing.amount_out(current)?;
            amounts.push(current);
        }

        if let Some((threshold, bps)) = book.impact {
            if amount_in >= threshold {
                if let Some(last) = amounts.last_mut() {
                    *last = haircut(*last, bps);
                }
            }
        }
        Ok(amounts)
    }

    /// Synchronous swap: realized output after execution slippage; moves
    /// reserves of constant-product pools.
    pub(crate) fn execute(
        &self,
        amount_in: U256,
        amount_out_min: U256,
        path: &[Address],
    ) -> Result<U256, OracleError> {
        let amounts = self.amounts_out(amount_in, path)?;
        let quoted = amounts.last().copied().unwrap_or_default();
        let realized = haircut(quoted, self.exec_slippage_bps.load(Ordering::Relaxed));
        if realized < amount_out_min {
            return Err(OracleError::Reverted(
                "UniswapV2Router: INSUFFICIENT_OUTPUT_AMOUNT".to_string(),
            ));
        }
        self.apply_swap(&amounts, path);
        Ok(realized)
    }

    /// Pool state to restore if a batch of swaps has to be undone
    pub(crate) fn checkpoint(&self) -> HashMap<(Address, Address), PairPricing> {
        self.book().pairs.clone()
    }

    pub(crate) fn rollback(&self, pairs: HashMap<(Address, Address), PairPricing>) {
        self.book().pairs = pairs;
    }

    fn apply_swap(&self, amounts: &[U256], path: &[Address]) {
        let mut book = self.book();
        for (i, hop) in path.windows(2).enumerate() {
            let (amount_in, amount_out) = (amounts[i], amounts[i + 1]);
            if let Some(PairPricing::Reserves { reserve_in, reserve_out }) =
                book.pairs.get(&(hop[0], hop[1])).copied()
            {
                let new_in = reserve_in + amount_in;
                let new_out = reserve_out.saturating_sub(amount_out);
                book.pairs.insert(
                    (hop[0], hop[1]),
                    PairPricing::Reserves { reserve_in: new_in, reserve_out: new_out },
                );
                book.pairs.insert(
                    (hop[1], hop[0]),
                    PairPricing::Reserves { reserve_in: new_out, reserve_out: new_in },
                );
            }
        }
    }
}

fn haircut(amount: U256, bps: u32) -> U256 {
    let bps = U256::from(u64::from(bps).min(BPS));
    amount * (U256::from(BPS) - bps) / U256::from(BPS)
}

#[async_trait]
impl RouterQuoter for MockRouter {
    fn address(&self) -> Address {
        self.address
    }

    async fn quote_amounts_out(
        &self,
        amount_in: U256,
        path: &[Address],
    ) -> Result<Vec<U256>, OracleError> {
        self.quote_calls.fetch_add(1, Ordering::Relaxed);
        if self.offline.load(Ordering::Relaxed) {
            return Err(OracleError::Transport("connection refused".to_string()));
        }
        self.amounts_out(amount_in, path)
    }

    async fn swap_exact_tokens(
        &self,
        amount_in: U256,
        amount_out_min: U256,
        path: &[Address],
        _to: Address,
        _deadline: u64,
    ) -> Result<U256, OracleError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(OracleError::Transport("connection refused".to_string()));
        }
        self.execute(amount_in, amount_out_min, path)
    }

    async fn hop_reserves(&self, path: &[Address]) -> Vec<Option<PairReserves>> {
        let book = self.book();
        path.windows(2)
            .map(|hop| match book.pairs.get(&(hop[0], hop[1])) {
                Some(PairPricing::Reserves { reserve_in, reserve_out }) => Some(PairReserves {
                    reserve_in: *reserve_in,
                    reserve_out: *reserve_out,
                }),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mul(x: f64) -> U256 {
        U256::from((x * 1e6) as u128) * U256::from(1_000_000_000_000u128)
    }

    #[tokio::test]
    async fn test_multiplier_path() {
        let (a, b, c) = (Address::repeat_byte(1), Address::repeat_byte(2), Address::repeat_byte(3));
        let router = MockRouter::new(Address::repeat_byte(0xee));
        router.set_price_mul(a, c, mul(1.1));
        router.set_price_mul(c, b, mul(1.2));

        let amounts = router.quote_amounts_out(U256::from(1000), &[a, c, b]).await.unwrap();
        assert_eq!(amounts, vec![U256::from(1000), U256::from(1100), U256::from(1320)]);

        let missing = router.quote_amounts_out(U256::from(1000), &[a, b]).await;
        assert!(matches!(missing, Err(OracleError::Reverted(_))));
        assert_eq!(router.quote_calls(), 2);
    }

    #[tokio::test]
    async fn test_constant_product_moves_reserves() {
        let (a, b) = (Address::repeat_byte(1), Address::repeat_byte(2));
        let router = MockRouter::new(Address::repeat_byte(0xee));
        router.set_reserves(a, b, U256::from(1_000_000u64), U256::from(1_000_000u64));

        let before = router.quote_amounts_out(U256::from(10_000), &[a, b]).await.unwrap()[1];
        // 10000 * 997 * 1e6 / (1e6 * 1000 + 10000 * 997)
        assert_eq!(before, U256::from(9871));

        let got = router
            .swap_exact_tokens(U256::from(10_000), U256::ZERO, &[a, b], Address::ZERO, 0)
            .await
            .unwrap();
        assert_eq!(got, before);

        let after = router.quote_amounts_out(U256::from(10_000), &[a, b]).await.unwrap()[1];
        assert!(after < before);
    }

    #[tokio::test]
    async fn test_exec_slippage_only_on_swap() {
        let (a, b) = (Address::repeat_byte(1), Address::repeat_byte(2));
        let router = MockRouter::new(Address::repeat_byte(0xee));
        router.set_price_mul(a, b, U256::from(ONE_X));
        router.set_exec_slippage_bps(200);

        let quoted = router.quote_amounts_out(U256::from(1000), &[a, b]).await.unwrap()[1];
        assert_eq!(quoted, U256::from(1000));

        let realized = router
            .swap_exact_tokens(U256::from(1000), U256::ZERO, &[a, b], Address::ZERO, 0)
            .await
            .unwrap();
        assert_eq!(realized, U256::from(980));

        let too_tight = router
            .swap_exact_tokens(U256::from(1000), U256::from(990), &[a, b], Address::ZERO, 0)
            .await;
        assert!(too_tight.is_err());
    }
}
