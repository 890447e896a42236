//! Token definitions for the swap engine
//!
//! Harmony mainnet registry plus the native-currency handling every
//! quote and swap goes through:
//! - Native ONE is addressed by a sentinel and routed as WONE
//! - Paths only ever contain ERC-20 addresses
//! - Known routers carry a friendly name for display

use alloy_primitives::{address, Address};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sentinel address for the chain's native currency.
pub const NATIVE_SENTINEL: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

/// Wrapped ONE on Harmony mainnet
pub const WONE: Address = address!("cF664087a5bB0237a0BAd6742852ec6c8d69A27a");

/// Represents a token the engine can route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub is_native: bool,
}

impl Token {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
            is_native: false,
        }
    }

    /// The chain's native currency (ONE)
    pub fn native(symbol: impl Into<String>) -> Self {
        Self {
            address: NATIVE_SENTINEL,
            symbol: symbol.into(),
            decimals: 18,
            is_native: true,
        }
    }

    /// Address to use in paths and quotes
    pub fn routing_address(&self, wrapped_native: Address) -> Address {
        if self.is_native {
            wrapped_native
        } else {
            normalize(self.address, wrapped_native)
        }
    }
}

/// Translate the native sentinel to the wrapped-native address.
pub fn normalize(token: Address, wrapped_native: Address) -> Address {
    if is_native(token) {
        wrapped_native
    } else {
        token
    }
}

pub fn is_native(token: Address) -> bool {
    token == NATIVE_SENTINEL
}

/// Both sides route as the same token, so a swap between them is a no-op.
pub fn same_asset(a: &Token, b: &Token, wrapped_native: Address) -> bool {
    a.routing_address(wrapped_native) == b.routing_address(wrapped_native)
}

/// Normalize candidate intermediates: native → wrapped, drop duplicates,
/// drop zero addresses and anything equal to either endpoint.
///
/// Order of first appearance is preserved.
pub fn prepare_intermediates(
    candidates: &[Address],
    token_in: Address,
    token_out: Address,
    wrapped_native: Address,
) -> Vec<Address> {
    let mut out: Vec<Address> = Vec::with_capacity(candidates.len());
    for &candidate in candidates {
        let mid = normalize(candidate, wrapped_native);
        if mid == Address::ZERO || mid == token_in || mid == token_out || out.contains(&mid) {
            continue;
        }
        out.push(mid);
    }
    out
}

// ============================================
// HARMONY REGISTRY
// ============================================

lazy_static! {
    static ref HARMONY_TOKENS: Vec<Token> = vec![
        Token::new(WONE, "WONE", 18),
        Token::new(address!("72Cb10C6bfA5624dD07Ef608027E366bd690048F"), "JEWEL", 18),
        Token::new(address!("2A719aF848bf365489E548BE5edbEC1D65858e59"), "FIRA", 18),
        Token::new(address!("Ea589E93Ff18b1a1F1e9BaC7EF3E86Ab62addc79"), "VIPER", 18),
        Token::new(address!("1e05C8B69e4128949FcEf16811a819eF2f55D33E"), "SONIC", 18),
    ];

    static ref BY_ADDRESS: HashMap<Address, &'static Token> =
        HARMONY_TOKENS.iter().map(|t| (t.address, t)).collect();

    /// Uniswap-V2 style routers deployed on Harmony
    static ref KNOWN_ROUTERS: Vec<(&'static str, Address)> = vec![
        ("ViperSwap", address!("f012702a5f0e54015362cBCA26a26fc90AA832a3")),
        ("SushiSwap", address!("1b02dA8Cb0d097eB8D57A175b88c7D8b47997506")),
        ("DeFi Kingdoms", address!("24ad62502d1C652Cc7684081169D04896aC20f30")),
    ];
}

/// All registry tokens
pub fn harmony_tokens() -> &'static [Token] {
    &HARMONY_TOKENS
}

/// Fallback intermediates used when none are configured
pub fn fallback_intermediates() -> Vec<Address> {
    ["JEWEL", "FIRA", "VIPER", "SONIC"]
        .iter()
        .filter_map(|s| find_by_symbol(s).map(|t| t.address))
        .collect()
}

pub fn find_by_address(addr: &Address) -> Option<&'static Token> {
    BY_ADDRESS.get(addr).copied()
}

pub fn find_by_symbol(symbol: &str) -> Option<&'static Token> {
    HARMONY_TOKENS
        .iter()
        .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
}

/// Resolve a CLI token argument: "native"/"ONE", a registry symbol, or a raw address.
pub fn resolve(arg: &str) -> Option<Token> {
    let trimmed = arg.trim();
    if trimmed.eq_ignore_ascii_case("native") || trimmed.eq_ignore_ascii_case("one") {
        return Some(Token::native("ONE"));
    }
    if let Some(token) = find_by_symbol(trimmed) {
        return Some(token.clone());
    }
    let addr: Address = trimmed.parse().ok()?;
    if is_native(addr) {
        return Some(Token::native("ONE"));
    }
    Some(
        find_by_address(&addr)
            .cloned()
            .unwrap_or_else(|| Token::new(addr, short_address(&addr), 18)),
    )
}

/// Named Uniswap-V2 style routers on Harmony
pub fn known_routers() -> &'static [(&'static str, Address)] {
    &KNOWN_ROUTERS
}

pub fn router_name(router: &Address) -> &'static str {
    KNOWN_ROUTERS
        .iter()
        .find(|(_, addr)| addr == router)
        .map(|(name, _)| *name)
        .unwrap_or("Unknown")
}

fn short_address(addr: &Address) -> String {
    format!("0x{}...", &format!("{:?}", addr)[2..8])
}

/// Render a path as `ONE → VIPER → 0x3c2b8b...`
pub fn format_route(path: &[Address], wrapped_native: Address) -> String {
    path.iter()
        .map(|addr| {
            if *addr == wrapped_native {
                "ONE".to_string()
            } else {
                find_by_address(addr)
                    .map(|t| t.symbol.clone())
                    .unwrap_or_else(|| short_address(addr))
            }
        })
        .collect::<Vec<_>>()
        .join(" → ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_normalizes_to_wrapped() {
        let one = Token::native("ONE");
        assert_eq!(one.routing_address(WONE), WONE);
        assert_eq!(normalize(NATIVE_SENTINEL, WONE), WONE);

        let viper = find_by_symbol("viper").unwrap();
        assert_eq!(viper.routing_address(WONE), viper.address);
    }

    #[test]
    fn test_same_asset() {
        let one = Token::native("ONE");
        let wone = find_by_symbol("WONE").unwrap();
        let jewel = find_by_symbol("JEWEL").unwrap();

        assert!(same_asset(&one, wone, WONE));
        assert!(same_asset(jewel, jewel, WONE));
        assert!(!same_asset(&one, jewel, WONE));
    }

    #[test]
    fn test_prepare_intermediates() {
        let a = Address::repeat_byte(0xa1);
        let b = Address::repeat_byte(0xb2);
        let c = Address::repeat_byte(0xc3);

        let mids = prepare_intermediates(
            &[c, a, NATIVE_SENTINEL, c, Address::ZERO, b],
            a,
            b,
            WONE,
        );
        assert_eq!(mids, vec![c, WONE]);
    }

    #[test]
    fn test_resolve_arguments() {
        assert!(resolve("native").unwrap().is_native);
        assert_eq!(resolve("JEWEL").unwrap().symbol, "JEWEL");

        let raw = resolve("0x0000000000000000000000000000000000000abc").unwrap();
        assert!(!raw.is_native);
        assert!(resolve("not-a-token").is_none());
    }

    #[test]
    fn test_format_route() {
        let viper = find_by_symbol("VIPER").unwrap().address;
        let route = format_route(&[WONE, viper], WONE);
        assert_eq!(route, "ONE → VIPER");
        assert_eq!(router_name(&Address::repeat_byte(1)), "Unknown");
    }
}
