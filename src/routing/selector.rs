//! Best-quote selection across paths and whitelisted routers

use alloy_primitives::{Address, U256};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::paths::{generate_paths, Path};
use super::slippage::{price_impact, PriceImpact};
use super::split::{optimize_parts, PartsPlan};
use crate::error::SwapError;
use crate::oracle::{final_output, RouterResolver};
use crate::tokens::{normalize, prepare_intermediates};
use crate::whitelist::WhitelistSource;

/// Best route found for an amount
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub amount_out: U256,
    pub router: Address,
    pub path: Path,
}

impl Quote {
    /// Definitive "no liquidity" answer
    pub fn no_route() -> Self {
        Self {
            amount_out: U256::ZERO,
            router: Address::ZERO,
            path: Vec::new(),
        }
    }

    pub fn is_no_route(&self) -> bool {
        self.amount_out.is_zero()
    }

    /// Interior tokens of the path
    pub fn intermediates(&self) -> &[Address] {
        if self.path.len() <= 2 {
            &[]
        } else {
            &self.path[1..self.path.len() - 1]
        }
    }
}

/// Knobs the engine needs from configuration
#[derive(Debug, Clone)]
pub struct RoutingParams {
    pub wrapped_native: Address,
    pub max_hops: usize,
    pub max_parts: usize,
    pub multisplit_auto: bool,
}

pub struct QuoteEngine {
    whitelist: Arc<dyn WhitelistSource>,
    routers: Arc<dyn RouterResolver>,
    params: RoutingParams,
}

impl QuoteEngine {
    pub fn new(
        whitelist: Arc<dyn WhitelistSource>,
        routers: Arc<dyn RouterResolver>,
        params: RoutingParams,
    ) -> Self {
        Self {
            whitelist,
            routers,
            params,
        }
    }

    pub fn params(&self) -> &RoutingParams {
        &self.params
    }

    /// Best `{amountOut, router, path}` for swapping `amount_in`.
    ///
    /// Every (path, router) pair is quoted concurrently; failures are
    /// skipped. Results are folded in enumeration order and only a strict
    /// improvement replaces the current best.
    pub async fn quote(
        &self,
        amount_in: U256,
        token_in: Address,
        token_out: Address,
        intermediates: &[Address],
    ) -> Result<Quote, SwapError> {
        if amount_in.is_zero() {
            return Err(SwapError::InvalidInput("amountIn must be > 0".to_string()));
        }
        if token_in == Address::ZERO || token_out == Address::ZERO {
            return Err(SwapError::InvalidInput("token address is zero".to_string()));
        }

        let wrapped = self.params.wrapped_native;
        let token_in = normalize(token_in, wrapped);
        let token_out = normalize(token_out, wrapped);
        if token_in == token_out {
            return Ok(Quote::no_route());
        }

        let routers = self.whitelist.routers().await?;
        let mut candidates = intermediates.to_vec();
        candidates.extend(self.whitelist.intermediates().await?);
        let mids = prepare_intermediates(&candidates, token_in, token_out, wrapped);

        let paths = generate_paths(token_in, token_out, &mids, self.params.max_hops);

        let mut jobs = Vec::with_capacity(paths.len() * routers.len());
        for path in &paths {
            for &router in &routers {
                match self.routers.resolve(router) {
                    Some(quoter) => jobs.push((router, path, quoter)),
                    None => debug!("No quoter for router {:?}, skipping", router),
                }
            }
        }

        let results = join_all(
            jobs.iter()
                .map(|(_, path, quoter)| final_output(quoter.as_ref(), amount_in, path)),
        )
        .await;

        let mut best = Quote::no_route();
        for ((router, path, _), result) in jobs.iter().zip(results) {
            match result {
                Ok(out) if out > best.amount_out => {
                    best = Quote {
                        amount_out: out,
                        router: *router,
                        path: (*path).clone(),
                    };
                }
                Ok(_) => {}
                Err(e) => debug!("{:?} via {:?}: {}", path, router, e),
            }
        }

        info!(
            "Quote: {} paths x {} routers -> out {} via {:?}",
            paths.len(),
            routers.len(),
            best.amount_out,
            best.router
        );
        Ok(best)
    }

    /// `quote` that gives up when `cancel` fires; `None` means superseded.
    pub async fn quote_cancellable(
        &self,
        amount_in: U256,
        token_in: Address,
        token_out: Address,
        intermediates: &[Address],
        cancel: &CancellationToken,
    ) -> Result<Option<Quote>, SwapError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(None),
            result = self.quote(amount_in, token_in, token_out, intermediates) => result.map(Some),
        }
    }

    /// Advisory split count for an already selected quote.
    pub async fn plan_parts(&self, quote: &Quote, amount_in: U256) -> PartsPlan {
        if !self.params.multisplit_auto || self.params.max_parts <= 1 || quote.is_no_route() {
            return PartsPlan::single();
        }
        let Some(router) = self.routers.resolve(quote.router) else {
            return PartsPlan::single();
        };
        optimize_parts(router.as_ref(), &quote.path, amount_in, self.params.max_parts).await
    }

    /// Display-only price impact of a quote
    pub async fn price_impact(
        &self,
        quote: &Quote,
        amount_in: U256,
        input_decimals: u8,
        fee_bps: u16,
    ) -> PriceImpact {
        let Some(router) = self.routers.resolve(quote.router) else {
            return price_impact(&[], &[amount_in], input_decimals, fee_bps);
        };
        let reserves = router.hop_reserves(&quote.path).await;
        let hop_amounts = router
            .quote_amounts_out(amount_in, &quote.path)
            .await
            .unwrap_or_else(|_| vec![amount_in]);
        price_impact(&reserves, &hop_amounts, input_decimals, fee_bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{MockRouter, RouterQuoter, ONE_X};
    use crate::oracle::OracleError;
    use crate::whitelist::StaticWhitelist;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    fn mul(num: u128, den: u128) -> U256 {
        U256::from(ONE_X * num / den)
    }

    struct Routers(HashMap<Address, Arc<MockRouter>>);

    impl RouterResolver for Routers {
        fn resolve(&self, router: Address) -> Option<Arc<dyn RouterQuoter>> {
            self.0.get(&router).map(|r| r.clone() as Arc<dyn RouterQuoter>)
        }
    }

    fn engine(routers: Vec<Arc<MockRouter>>, mids: Vec<Address>) -> QuoteEngine {
        let whitelist = StaticWhitelist::new(routers.iter().map(|r| r.address()), mids);
        let resolver = Routers(routers.into_iter().map(|r| (r.address(), r)).collect());
        QuoteEngine::new(
            Arc::new(whitelist),
            Arc::new(resolver),
            RoutingParams {
                wrapped_native: addr(0xaa),
                max_hops: 3,
                max_parts: 3,
                multisplit_auto: true,
            },
        )
    }

    const TKA: u8 = 0x0a;
    const TKB: u8 = 0x0b;
    const TKC: u8 = 0x0c;

    #[tokio::test]
    async fn test_prefers_multi_hop_when_better() {
        let router = Arc::new(MockRouter::new(addr(0xe1)));
        router.set_price_mul(addr(TKA), addr(TKB), mul(100, 100));
        router.set_price_mul(addr(TKA), addr(TKC), mul(130, 100));
        router.set_price_mul(addr(TKC), addr(TKB), mul(100, 100));

        let engine = engine(vec![router.clone()], vec![]);
        let q = engine
            .quote(U256::from(1000), addr(TKA), addr(TKB), &[addr(TKC)])
            .await
            .unwrap();

        let path = vec![addr(TKA), addr(TKC), addr(TKB)];
        let expected = router.quote_amounts_out(U256::from(1000), &path).await.unwrap();
        assert_eq!(q.path, path);
        assert_eq!(q.amount_out, *expected.last().unwrap());
        assert_eq!(q.intermediates(), &[addr(TKC)]);
    }

    #[tokio::test]
    async fn test_picks_better_router() {
        let r1 = Arc::new(MockRouter::new(addr(0xe1)));
        let r2 = Arc::new(MockRouter::new(addr(0xe2)));
        r1.set_price_mul(addr(TKA), addr(TKB), mul(100, 100));
        r2.set_price_mul(addr(TKA), addr(TKB), mul(105, 100));

        let engine = engine(vec![r1, r2.clone()], vec![]);
        let q = engine
            .quote(U256::from(1000), addr(TKA), addr(TKB), &[])
            .await
            .unwrap();
        assert_eq!(q.router, r2.address());
        assert_eq!(q.amount_out, U256::from(1050));
    }

    #[tokio::test]
    async fn test_best_is_at_least_every_combination() {
        let r1 = Arc::new(MockRouter::new(addr(0xe1)));
        let r2 = Arc::new(MockRouter::new(addr(0xe2)));
        r1.set_reserves(addr(TKA), addr(TKB), U256::from(50_000u64), U256::from(60_000u64));
        r1.set_reserves(addr(TKA), addr(TKC), U256::from(40_000u64), U256::from(90_000u64));
        r1.set_reserves(addr(TKC), addr(TKB), U256::from(80_000u64), U256::from(70_000u64));
        r2.set_reserves(addr(TKA), addr(TKB), U256::from(70_000u64), U256::from(75_000u64));

        let engine = engine(vec![r1.clone(), r2.clone()], vec![addr(TKC)]);
        let amount = U256::from(5_000u64);
        let q = engine.quote(amount, addr(TKA), addr(TKB), &[]).await.unwrap();

        for router in [&r1, &r2] {
            for path in generate_paths(addr(TKA), addr(TKB), &[addr(TKC)], 3) {
                if let Ok(out) = final_output(router.as_ref(), amount, &path).await {
                    assert!(q.amount_out >= out);
                }
            }
        }

        // idempotent while reserves are untouched
        let again = engine.quote(amount, addr(TKA), addr(TKB), &[]).await.unwrap();
        assert_eq!(q, again);
    }

    #[tokio::test]
    async fn test_same_token_is_no_route_without_oracle_calls() {
        let router = Arc::new(MockRouter::new(addr(0xe1)));
        let engine = engine(vec![router.clone()], vec![addr(TKC)]);

        // native sentinel normalizes to the wrapped token
        let q = engine
            .quote(U256::from(1000), crate::tokens::NATIVE_SENTINEL, addr(0xaa), &[])
            .await
            .unwrap();
        assert!(q.is_no_route());
        assert_eq!(q.router, Address::ZERO);
        assert!(q.path.is_empty());
        assert_eq!(router.quote_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_input() {
        let engine = engine(vec![], vec![]);
        let err = engine
            .quote(U256::ZERO, addr(TKA), addr(TKB), &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::InvalidInput);

        let err = engine
            .quote(U256::from(1), Address::ZERO, addr(TKB), &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_no_liquidity_is_not_an_error() {
        let router = Arc::new(MockRouter::new(addr(0xe1)));
        let engine = engine(vec![router.clone()], vec![addr(TKC)]);
        let q = engine
            .quote(U256::from(1000), addr(TKA), addr(TKB), &[])
            .await
            .unwrap();
        assert_eq!(q, Quote::no_route());
        assert!(router.quote_calls() > 0);
    }

    #[tokio::test]
    async fn test_plan_parts_respects_auto_flag() {
        let router = Arc::new(MockRouter::new(addr(0xe1)));
        router.set_reserves(addr(TKA), addr(TKB), U256::from(10_000u64), U256::from(10_000u64));
        let mut engine = engine(vec![router.clone()], vec![]);

        let amount = U256::from(5_000u64);
        let q = engine.quote(amount, addr(TKA), addr(TKB), &[]).await.unwrap();
        let plan = engine.plan_parts(&q, amount).await;
        assert_eq!(plan.table.len(), 3);
        assert_eq!(plan.best_parts, 3);

        engine.params.multisplit_auto = false;
        let calls = router.quote_calls();
        assert_eq!(engine.plan_parts(&q, amount).await, PartsPlan::single());
        assert_eq!(router.quote_calls(), calls);
    }

    #[tokio::test]
    async fn test_cancelled_quote_returns_none() {
        let router = Arc::new(MockRouter::new(addr(0xe1)));
        router.set_price_mul(addr(TKA), addr(TKB), mul(1, 1));
        let engine = engine(vec![router], vec![]);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let res = engine
            .quote_cancellable(U256::from(1000), addr(TKA), addr(TKB), &[], &cancel)
            .await
            .unwrap();
        assert!(res.is_none());
    }

    /// Answers quotes only after `delay`
    struct Laggard {
        inner: Arc<MockRouter>,
        delay: Duration,
    }

    #[async_trait]
    impl RouterQuoter for Laggard {
        fn address(&self) -> Address {
            self.inner.address()
        }

        async fn quote_amounts_out(
            &self,
            amount_in: U256,
            path: &[Address],
        ) -> Result<Vec<U256>, OracleError> {
            tokio::time::sleep(self.delay).await;
            self.inner.quote_amounts_out(amount_in, path).await
        }

        async fn swap_exact_tokens(
            &self,
            amount_in: U256,
            amount_out_min: U256,
            path: &[Address],
            to: Address,
            deadline: u64,
        ) -> Result<U256, OracleError> {
            self.inner
                .swap_exact_tokens(amount_in, amount_out_min, path, to, deadline)
                .await
        }
    }

    struct Quoters(HashMap<Address, Arc<dyn RouterQuoter>>);

    impl RouterResolver for Quoters {
        fn resolve(&self, router: Address) -> Option<Arc<dyn RouterQuoter>> {
            self.0.get(&router).cloned()
        }
    }

    fn engine_in_order(order: &[Address], quoters: Vec<Arc<dyn RouterQuoter>>) -> QuoteEngine {
        QuoteEngine::new(
            Arc::new(StaticWhitelist::new(order.iter().copied(), [])),
            Arc::new(Quoters(quoters.into_iter().map(|q| (q.address(), q)).collect())),
            RoutingParams {
                wrapped_native: addr(0xaa),
                max_hops: 3,
                max_parts: 3,
                multisplit_auto: true,
            },
        )
    }

    #[tokio::test]
    async fn test_equal_quotes_keep_first_whitelisted_router() {
        let r1 = Arc::new(MockRouter::new(addr(0xe1)));
        let r2 = Arc::new(MockRouter::new(addr(0xe2)));
        r1.set_price_mul(addr(TKA), addr(TKB), mul(1, 1));
        r2.set_price_mul(addr(TKA), addr(TKB), mul(1, 1));

        // the first router answers last, the fold still keeps it
        let slow_first: Arc<dyn RouterQuoter> = Arc::new(Laggard {
            inner: r1.clone(),
            delay: Duration::from_millis(30),
        });
        let fast_second: Arc<dyn RouterQuoter> = r2.clone();
        let engine = engine_in_order(
            &[r1.address(), r2.address()],
            vec![slow_first.clone(), fast_second.clone()],
        );
        let q = engine
            .quote(U256::from(1000), addr(TKA), addr(TKB), &[])
            .await
            .unwrap();
        assert_eq!(q.router, r1.address());
        assert_eq!(q.amount_out, U256::from(1000));

        let engine = engine_in_order(&[r2.address(), r1.address()], vec![slow_first, fast_second]);
        let q = engine
            .quote(U256::from(1000), addr(TKA), addr(TKB), &[])
            .await
            .unwrap();
        assert_eq!(q.router, r2.address());
    }

    #[tokio::test]
    async fn test_equal_paths_keep_direct_route() {
        let router = Arc::new(MockRouter::new(addr(0xe1)));
        router.set_price_mul(addr(TKA), addr(TKB), mul(1, 1));
        router.set_price_mul(addr(TKA), addr(TKC), mul(1, 1));
        router.set_price_mul(addr(TKC), addr(TKB), mul(1, 1));

        let engine = engine(vec![router], vec![addr(TKC)]);
        let q = engine
            .quote(U256::from(1000), addr(TKA), addr(TKB), &[])
            .await
            .unwrap();
        assert_eq!(q.path, vec![addr(TKA), addr(TKB)]);
        assert_eq!(q.amount_out, U256::from(1000));
    }
}
