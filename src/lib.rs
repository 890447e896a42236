//! splitswap: multi-route, multi-split swap quoting and execution
//!
//! Quotes a swap across every whitelisted Uniswap-V2-style router and every
//! path through a small set of intermediate tokens, sizes a split of the
//! trade into equal parts, and executes it through the on-chain
//! `AggregatorMultiSplit` contract.

pub mod chain;
pub mod config;
pub mod error;
pub mod executor;
pub mod oracle;
pub mod routing;
pub mod tokens;
pub mod whitelist;

pub use error::{FailureKind, SwapError};
