//! Router whitelist, intermediate set and aggregator administration
//!
//! The aggregator contract owns two admin-curated lists (routers allowed for
//! quoting/execution and candidate intermediate tokens) plus fee settings.
//! `AggregatorSettings` models that storage with owner-only mutations; the
//! engine never holds on to a copy, it asks a `WhitelistSource` every time.

use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use thiserror::Error;

use crate::error::SwapError;

/// Upper bound for the aggregator fee
pub const MAX_FEE_BPS: u16 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminError {
    #[error("Ownable: caller is not the owner")]
    NotOwner(Address),

    #[error("zero address")]
    ZeroAddress,

    #[error("already listed: {0:?}")]
    AlreadyListed(Address),

    #[error("not listed: {0:?}")]
    NotListed(Address),

    #[error("Fee too high")]
    FeeTooHigh(u16),
}

// ============================================
// ADDRESS SET
// ============================================

/// Insertion-ordered set of addresses.
///
/// Order matters: quoting enumerates routers and intermediates in this
/// order and ties go to whichever was seen first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressSet(Vec<Address>);

pub type RouterWhitelist = AddressSet;
pub type IntermediateSet = AddressSet;

impl AddressSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if already present
    pub fn insert(&mut self, addr: Address) -> bool {
        if self.0.contains(&addr) {
            return false;
        }
        self.0.push(addr);
        true
    }

    /// Returns false if absent
    pub fn remove(&mut self, addr: &Address) -> bool {
        match self.0.iter().position(|a| a == addr) {
            Some(idx) => {
                self.0.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, addr: &Address) -> bool {
        self.0.contains(addr)
    }

    pub fn as_slice(&self) -> &[Address] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<Address> {
        self.0.clone()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Address> for AddressSet {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        let mut set = AddressSet::new();
        for addr in iter {
            set.insert(addr);
        }
        set
    }
}

// ============================================
// ADMIN OPERATIONS
// ============================================

/// A privileged mutation of the aggregator's settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "arg", rename_all = "camelCase")]
pub enum AdminOp {
    AddRouter(Address),
    RemoveRouter(Address),
    AddIntermediate(Address),
    RemoveIntermediate(Address),
    SetFeeBps(u16),
    SetFeeReceiver(Address),
    #[serde(rename = "setWETH")]
    SetWeth(Address),
    TransferOwnership(Address),
    RenounceOwnership,
}

impl std::fmt::Display for AdminOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdminOp::AddRouter(a) => write!(f, "addRouter({:?})", a),
            AdminOp::RemoveRouter(a) => write!(f, "removeRouter({:?})", a),
            AdminOp::AddIntermediate(a) => write!(f, "addIntermediate({:?})", a),
            AdminOp::RemoveIntermediate(a) => write!(f, "removeIntermediate({:?})", a),
            AdminOp::SetFeeBps(bps) => write!(f, "setFeeBps({})", bps),
            AdminOp::SetFeeReceiver(a) => write!(f, "setFeeReceiver({:?})", a),
            AdminOp::SetWeth(a) => write!(f, "setWETH({:?})", a),
            AdminOp::TransferOwnership(a) => write!(f, "transferOwnership({:?})", a),
            AdminOp::RenounceOwnership => write!(f, "renounceOwnership()"),
        }
    }
}

// ============================================
// AGGREGATOR SETTINGS
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorSettings {
    /// `None` once ownership has been renounced
    pub owner: Option<Address>,
    pub weth: Address,
    pub fee_bps: u16,
    pub fee_receiver: Address,
    pub routers: RouterWhitelist,
    pub intermediates: IntermediateSet,
}

impl AggregatorSettings {
    /// Deploy-time settings; the fee receiver starts as the owner.
    pub fn new(
        owner: Address,
        weth: Address,
        routers: impl IntoIterator<Item = Address>,
        intermediates: impl IntoIterator<Item = Address>,
        fee_bps: u16,
    ) -> Result<Self, AdminError> {
        if owner == Address::ZERO || weth == Address::ZERO {
            return Err(AdminError::ZeroAddress);
        }
        if fee_bps > MAX_FEE_BPS {
            return Err(AdminError::FeeTooHigh(fee_bps));
        }
        Ok(Self {
            owner: Some(owner),
            weth,
            fee_bps,
            fee_receiver: owner,
            routers: routers.into_iter().filter(|a| *a != Address::ZERO).collect(),
            intermediates: intermediates
                .into_iter()
                .filter(|a| *a != Address::ZERO)
                .collect(),
        })
    }

    fn only_owner(&self, caller: Address) -> Result<(), AdminError> {
        match self.owner {
            Some(owner) if owner == caller => Ok(()),
            _ => Err(AdminError::NotOwner(caller)),
        }
    }

    /// Apply an admin mutation on behalf of `caller`
    pub fn apply(&mut self, caller: Address, op: AdminOp) -> Result<(), AdminError> {
        self.only_owner(caller)?;

        match op {
            AdminOp::AddRouter(router) => {
                non_zero(router)?;
                if !self.routers.insert(router) {
                    return Err(AdminError::AlreadyListed(router));
                }
            }
            AdminOp::RemoveRouter(router) => {
                if !self.routers.remove(&router) {
                    return Err(AdminError::NotListed(router));
                }
            }
            AdminOp::AddIntermediate(token) => {
                non_zero(token)?;
                if !self.intermediates.insert(token) {
                    return Err(AdminError::AlreadyListed(token));
                }
            }
            AdminOp::RemoveIntermediate(token) => {
                if !self.intermediates.remove(&token) {
                    return Err(AdminError::NotListed(token));
                }
            }
            AdminOp::SetFeeBps(bps) => {
                if bps > MAX_FEE_BPS {
                    return Err(AdminError::FeeTooHigh(bps));
                }
                self.fee_bps = bps;
            }
            AdminOp::SetFeeReceiver(receiver) => {
                non_zero(receiver)?;
                self.fee_receiver = receiver;
            }
            AdminOp::SetWeth(weth) => {
                non_zero(weth)?;
                self.weth = weth;
            }
            AdminOp::TransferOwnership(new_owner) => {
                non_zero(new_owner)?;
                self.owner = Some(new_owner);
            }
            AdminOp::RenounceOwnership => {
                self.owner = None;
            }
        }
        Ok(())
    }
}

fn non_zero(addr: Address) -> Result<(), AdminError> {
    if addr == Address::ZERO {
        Err(AdminError::ZeroAddress)
    } else {
        Ok(())
    }
}

// ============================================
// WHITELIST SOURCE
// ============================================

/// Current routers and intermediates, read fresh on every call.
#[async_trait]
pub trait WhitelistSource: Send + Sync {
    async fn routers(&self) -> Result<Vec<Address>, SwapError>;
    async fn intermediates(&self) -> Result<Vec<Address>, SwapError>;
}

/// Locally held lists, mutable at runtime
#[derive(Debug, Default)]
pub struct StaticWhitelist {
    routers: RwLock<RouterWhitelist>,
    intermediates: RwLock<IntermediateSet>,
}

impl StaticWhitelist {
    pub fn new(
        routers: impl IntoIterator<Item = Address>,
        intermediates: impl IntoIterator<Item = Address>,
    ) -> Self {
        Self {
            routers: RwLock::new(routers.into_iter().collect()),
            intermediates: RwLock::new(intermediates.into_iter().collect()),
        }
    }

    pub fn add_router(&self, router: Address) -> bool {
        self.routers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(router)
    }

    pub fn remove_router(&self, router: &Address) -> bool {
        self.routers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(router)
    }
}

#[async_trait]
impl WhitelistSource for StaticWhitelist {
    async fn routers(&self) -> Result<Vec<Address>, SwapError> {
        Ok(self.routers.read().unwrap_or_else(|p| p.into_inner()).to_vec())
    }

    async fn intermediates(&self) -> Result<Vec<Address>, SwapError> {
        Ok(self
            .intermediates
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    fn settings() -> AggregatorSettings {
        AggregatorSettings::new(addr(1), addr(2), [addr(0x10), addr(0x11)], [addr(0x20)], 25).unwrap()
    }

    #[test]
    fn test_initial_config() {
        let s = settings();
        assert_eq!(s.owner, Some(addr(1)));
        assert_eq!(s.fee_receiver, addr(1));
        assert_eq!(s.routers.as_slice(), &[addr(0x10), addr(0x11)]);
        assert_eq!(s.intermediates.as_slice(), &[addr(0x20)]);
        assert_eq!(s.fee_bps, 25);
    }

    #[test]
    fn test_admin_updates() {
        let mut s = settings();
        let owner = addr(1);

        s.apply(owner, AdminOp::SetFeeReceiver(addr(3))).unwrap();
        assert_eq!(s.fee_receiver, addr(3));

        s.apply(owner, AdminOp::AddRouter(addr(0x12))).unwrap();
        assert!(s.routers.contains(&addr(0x12)));
        s.apply(owner, AdminOp::RemoveRouter(addr(0x12))).unwrap();
        assert!(!s.routers.contains(&addr(0x12)));

        s.apply(owner, AdminOp::AddIntermediate(addr(0x21))).unwrap();
        s.apply(owner, AdminOp::RemoveIntermediate(addr(0x21))).unwrap();
        assert_eq!(s.intermediates.len(), 1);

        assert_eq!(
            s.apply(owner, AdminOp::AddRouter(addr(0x10))),
            Err(AdminError::AlreadyListed(addr(0x10)))
        );
        assert_eq!(
            s.apply(owner, AdminOp::RemoveRouter(addr(0x99))),
            Err(AdminError::NotListed(addr(0x99)))
        );
    }

    #[test]
    fn test_fee_bounds() {
        let mut s = settings();
        s.apply(addr(1), AdminOp::SetFeeBps(0)).unwrap();
        assert_eq!(s.fee_bps, 0);

        let err = s.apply(addr(1), AdminOp::SetFeeBps(2000)).unwrap_err();
        assert_eq!(err.to_string(), "Fee too high");
        assert_eq!(s.fee_bps, 0);
    }

    #[test]
    fn test_only_owner() {
        let mut s = settings();
        assert_eq!(
            s.apply(addr(9), AdminOp::AddRouter(addr(0x12))),
            Err(AdminError::NotOwner(addr(9)))
        );

        assert_ok!(s.apply(addr(1), AdminOp::TransferOwnership(addr(9))));
        assert_err!(s.apply(addr(1), AdminOp::SetFeeBps(10)));
        assert_ok!(s.apply(addr(9), AdminOp::RenounceOwnership));
        assert_err!(s.apply(addr(9), AdminOp::SetFeeBps(10)));
        assert_eq!(s.owner, None);
    }

    #[tokio::test]
    async fn test_static_whitelist_reads_current_state() {
        let wl = StaticWhitelist::new([addr(0x10)], [addr(0x20), addr(0x20)]);
        assert_eq!(wl.intermediates().await.unwrap(), vec![addr(0x20)]);

        wl.add_router(addr(0x11));
        wl.remove_router(&addr(0x10));
        assert_eq!(wl.routers().await.unwrap(), vec![addr(0x11)]);
    }
}
