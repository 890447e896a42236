//! Split sizing
//!
//! Brute-force over part counts on a fixed router and path. Each `n` is
//! quoted independently with `amountIn / n`; the remainder is not swapped.

use alloy_primitives::{Address, U256};
use futures::future::join_all;
use serde::Serialize;
use tracing::debug;

use crate::oracle::{final_output, RouterQuoter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartsRow {
    pub n: usize,
    pub out_per_part: U256,
    pub total_out: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartsPlan {
    pub table: Vec<PartsRow>,
    pub best_parts: usize,
}

impl PartsPlan {
    /// Single swap, nothing evaluated
    pub fn single() -> Self {
        Self {
            table: Vec::new(),
            best_parts: 1,
        }
    }

    pub fn best_row(&self) -> Option<&PartsRow> {
        self.table.iter().find(|row| row.n == self.best_parts)
    }
}

/// Evaluate `n = 1..=max_parts` splits of `amount_in` along `path`.
///
/// A failing `n` is recorded as zeros. `best_parts` maximizes `total_out`
/// with ties going to the smaller `n`, and is 1 when nothing produced output.
pub async fn optimize_parts(
    router: &dyn RouterQuoter,
    path: &[Address],
    amount_in: U256,
    max_parts: usize,
) -> PartsPlan {
    let sizes: Vec<(usize, U256)> = (1..=max_parts.max(1))
        .map(|n| (n, amount_in / U256::from(n)))
        .take_while(|(_, part)| !part.is_zero())
        .collect();

    let outputs = join_all(
        sizes
            .iter()
            .map(|(_, part)| final_output(router, *part, path)),
    )
    .await;

    let table: Vec<PartsRow> = sizes
        .iter()
        .zip(outputs)
        .map(|(&(n, part), result)| {
            let out_per_part = match result {
                Ok(out) => out,
                Err(e) => {
                    debug!("split n={} part={} failed: {}", n, part, e);
                    U256::ZERO
                }
            };
            PartsRow {
                n,
                out_per_part,
                total_out: out_per_part * U256::from(n),
            }
        })
        .collect();

    let mut best_parts = 1;
    let mut best_total = U256::ZERO;
    for row in &table {
        if row.total_out > best_total {
            best_total = row.total_out;
            best_parts = row.n;
        }
    }

    PartsPlan { table, best_parts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockRouter;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    #[tokio::test]
    async fn test_split_beats_single_under_size_impact() {
        let (a, b) = (addr(1), addr(2));
        let router = MockRouter::new(addr(0xee));
        router.set_price_mul(a, b, U256::from(crate::oracle::ONE_X));
        // 200 bps only when the whole 1000 goes in one shot
        router.set_size_impact(U256::from(1000), 200);

        let plan = optimize_parts(&router, &[a, b], U256::from(1000), 2).await;
        assert_eq!(plan.table.len(), 2);
        assert_eq!(plan.table[0].total_out, U256::from(980));
        assert_eq!(plan.table[1].out_per_part, U256::from(500));
        assert!(plan.table[1].total_out >= plan.table[0].total_out);
        assert_eq!(plan.best_parts, 2);
    }

    #[tokio::test]
    async fn test_ties_prefer_fewer_parts() {
        let (a, b) = (addr(1), addr(2));
        let router = MockRouter::new(addr(0xee));
        router.set_price_mul(a, b, U256::from(crate::oracle::ONE_X));

        // 1200 divides evenly by 1..=4, so every row ties
        let plan = optimize_parts(&router, &[a, b], U256::from(1200), 4).await;
        assert_eq!(plan.table.len(), 4);
        assert!(plan.table.iter().all(|r| r.total_out == U256::from(1200)));
        assert_eq!(plan.best_parts, 1);

        // dust dropped by n=3 leaves n=1 and n=2 tied at the top
        let plan = optimize_parts(&router, &[a, b], U256::from(1000), 3).await;
        assert_eq!(plan.table[2].total_out, U256::from(999));
        assert_eq!(plan.best_parts, 1);
    }

    #[tokio::test]
    async fn test_constant_product_prefers_splitting() {
        let (a, b) = (addr(1), addr(2));
        let router = MockRouter::new(addr(0xee));
        router.set_reserves(a, b, U256::from(10_000u64), U256::from(10_000u64));

        let plan = optimize_parts(&router, &[a, b], U256::from(5_000u64), 3).await;
        // each row is quoted on the same reserves, so smaller slices fare better
        assert_eq!(plan.best_parts, 3);
        assert!(plan.best_row().unwrap().total_out > plan.table[0].total_out);
    }

    #[tokio::test]
    async fn test_stops_when_part_is_zero() {
        let (a, b) = (addr(1), addr(2));
        let router = MockRouter::new(addr(0xee));
        router.set_price_mul(a, b, U256::from(crate::oracle::ONE_X));

        let plan = optimize_parts(&router, &[a, b], U256::from(3), 10).await;
        assert_eq!(plan.table.len(), 3);
    }

    #[tokio::test]
    async fn test_failures_never_selected() {
        let (a, b) = (addr(1), addr(2));
        let router = MockRouter::new(addr(0xee));

        let plan = optimize_parts(&router, &[a, b], U256::from(1000), 3).await;
        assert!(plan.table.iter().all(|r| r.total_out.is_zero()));
        assert_eq!(plan.best_parts, 1);
    }
}
