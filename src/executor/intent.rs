//! Swap intents
//!
//! Built once per user action from a quote and frozen before submission.

use alloy_primitives::{Address, U256};
use serde::Serialize;

use super::state::SwapShape;
use crate::chain::SwapCall;
use crate::error::SwapError;
use crate::routing::{min_out, Quote};
use crate::tokens::{is_native, normalize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapIntent {
    pub amount_in: U256,
    /// As requested; may be the native sentinel
    pub token_in: Address,
    pub token_out: Address,
    pub path: Vec<Address>,
    pub router: Address,
    pub parts: u8,
    pub min_out: U256,
    /// Absolute unix timestamp
    pub deadline: u64,
}

/// How an intent is derived from a quote
#[derive(Debug, Clone, Copy)]
pub struct IntentParams {
    pub slippage_bps: u16,
    pub fee_bps: u16,
    pub max_parts: usize,
    pub deadline_secs: u64,
}

/// `now + secs` as a unix timestamp
pub fn deadline_from_now(secs: u64) -> u64 {
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    now + secs
}

/// Requested parts clamped to `1..=max_parts`
pub fn clamp_parts(requested: usize, max_parts: usize) -> u8 {
    let cap = max_parts.clamp(1, u8::MAX as usize);
    requested.clamp(1, cap) as u8
}

impl SwapIntent {
    pub fn from_quote(
        quote: &Quote,
        amount_in: U256,
        token_in: Address,
        token_out: Address,
        parts: usize,
        params: IntentParams,
    ) -> Result<Self, SwapError> {
        if quote.is_no_route() {
            return Err(SwapError::NoRoute { token_in, token_out });
        }
        Ok(Self {
            amount_in,
            token_in,
            token_out,
            path: quote.path.clone(),
            router: quote.router,
            parts: clamp_parts(parts, params.max_parts),
            min_out: min_out(quote.amount_out, params.slippage_bps, params.fee_bps),
            deadline: deadline_from_now(params.deadline_secs),
        })
    }

    pub fn shape(&self) -> Result<SwapShape, SwapError> {
        SwapShape::of(is_native(self.token_in), is_native(self.token_out))
            .ok_or_else(|| SwapError::InvalidInput("native to native is not a swap".to_string()))
    }

    /// Path interior
    pub fn intermediates(&self) -> Vec<Address> {
        if self.path.len() <= 2 {
            Vec::new()
        } else {
            self.path[1..self.path.len() - 1].to_vec()
        }
    }

    /// Structural checks before anything touches the chain
    pub fn validate(&self, wrapped_native: Address) -> Result<(), SwapError> {
        if self.amount_in.is_zero() {
            return Err(SwapError::InvalidInput("amountIn must be > 0".to_string()));
        }
        if self.parts == 0 {
            return Err(SwapError::InvalidInput("parts must be >= 1".to_string()));
        }
        if self.token_in == Address::ZERO || self.token_out == Address::ZERO {
            return Err(SwapError::InvalidInput("token address is zero".to_string()));
        }
        let token_in = normalize(self.token_in, wrapped_native);
        let token_out = normalize(self.token_out, wrapped_native);
        if token_in == token_out {
            return Err(SwapError::InvalidInput("tokenIn and tokenOut are the same".to_string()));
        }
        if self.path.first() != Some(&token_in) || self.path.last() != Some(&token_out) {
            return Err(SwapError::InvalidInput("path does not connect tokenIn to tokenOut".to_string()));
        }
        self.shape().map(|_| ())
    }

    /// `swapMultiSplit` arguments; native legs go through the wrapped token
    pub fn swap_call(&self, wrapped_native: Address) -> SwapCall {
        SwapCall {
            amount_in: self.amount_in,
            token_in: normalize(self.token_in, wrapped_native),
            token_out: normalize(self.token_out, wrapped_native),
            intermediates: self.intermediates(),
            parts: self.parts,
            deadline: self.deadline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::NATIVE_SENTINEL;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    const WETH: u8 = 0xaa;

    fn params() -> IntentParams {
        IntentParams {
            slippage_bps: 200,
            fee_bps: 25,
            max_parts: 3,
            deadline_secs: 900,
        }
    }

    fn quote(path: Vec<Address>) -> Quote {
        Quote {
            amount_out: U256::from(10_000),
            router: addr(0xe1),
            path,
        }
    }

    #[test]
    fn test_from_quote() {
        let q = quote(vec![addr(WETH), addr(0x0c), addr(0x0b)]);
        let intent =
            SwapIntent::from_quote(&q, U256::from(1), NATIVE_SENTINEL, addr(0x0b), 7, params()).unwrap();

        assert_eq!(intent.parts, 3);
        assert_eq!(intent.min_out, U256::from(9_775));
        assert!(intent.deadline >= deadline_from_now(0) + 899);
        assert_eq!(intent.shape().unwrap(), SwapShape::NativeToToken);
        intent.validate(addr(WETH)).unwrap();

        let call = intent.swap_call(addr(WETH));
        assert_eq!(call.token_in, addr(WETH));
        assert_eq!(call.intermediates, vec![addr(0x0c)]);
    }

    #[test]
    fn test_no_route_quote_is_rejected() {
        let err = SwapIntent::from_quote(&Quote::no_route(), U256::from(1), addr(1), addr(2), 1, params())
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::NoRoute);
    }

    #[test]
    fn test_validate() {
        let q = quote(vec![addr(1), addr(2)]);
        let mut intent = SwapIntent::from_quote(&q, U256::from(5), addr(1), addr(2), 1, params()).unwrap();
        intent.validate(addr(WETH)).unwrap();

        intent.amount_in = U256::ZERO;
        assert!(intent.validate(addr(WETH)).is_err());
        intent.amount_in = U256::from(5);

        intent.token_out = addr(3);
        assert!(intent.validate(addr(WETH)).is_err());
    }

    #[test]
    fn test_clamp_parts() {
        assert_eq!(clamp_parts(0, 3), 1);
        assert_eq!(clamp_parts(2, 3), 2);
        assert_eq!(clamp_parts(9, 3), 3);
        assert_eq!(clamp_parts(5, 0), 1);
    }
}
