//! Quote pipeline: path enumeration, best-quote selection, split sizing
//! and supersedable quote sessions.

pub mod paths;
pub mod selector;
pub mod session;
pub mod slippage;
pub mod split;

pub use paths::{generate_paths, Path, MAX_SUPPORTED_HOPS};
pub use selector::{Quote, QuoteEngine, RoutingParams};
pub use session::{QuoteRequest, QuoteSession};
pub use slippage::{format_units, min_out, parse_units, price_impact, PriceImpact};
pub use split::{optimize_parts, PartsPlan, PartsRow};
