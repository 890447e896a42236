//! The Executor
//!
//! Turns a quote into a frozen swap intent and drives it through the
//! wrap / approve / swap / unwrap transaction sequence:
//! - Intents carry minOut, parts and an absolute deadline
//! - Approvals go through a TTL cache of on-chain allowances
//! - Every state transition is published on a watch channel
//!
//! ⚠️  WARNING: With an `RpcChain` this module spends real funds!

mod allowance;
mod intent;
mod state;
mod swap;

pub use allowance::{
    AllowanceCache,
    CacheStats,
    DEFAULT_MAX_ENTRIES,
    DEFAULT_TTL,
    MAX_ALLOWANCE_TTL,
};

pub use intent::{clamp_parts, deadline_from_now, IntentParams, SwapIntent};

pub use state::{SwapShape, SwapState};

pub use swap::{ExecutorSettings, SwapExecutor, SwapFailure, SwapOutcome};
