//! Wallet loading
//!
//! ⚠️  SECURITY WARNING:
//! - Never log or expose private keys
//! - Use environment variables, not hardcoded keys

use alloy_network::EthereumWallet;
use alloy_primitives::Address;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::SwapError;

/// The account that signs approvals, wraps and swaps
pub struct WalletManager {
    signer: Option<PrivateKeySigner>,
    chain_id: u64,
}

impl WalletManager {
    /// `None` gives a read-only manager that cannot sign.
    pub fn new(private_key: Option<&str>, chain_id: u64) -> Result<Self, SwapError> {
        let signer = match private_key {
            Some(key) => {
                let signer = parse_key(key)?;
                info!("✓ Wallet loaded: {:?}", signer.address());
                Some(signer.with_chain_id(Some(chain_id)))
            }
            None => {
                debug!("No wallet key (read-only)");
                None
            }
        };
        Ok(Self { signer, chain_id })
    }

    pub fn has_wallet(&self) -> bool {
        self.signer.is_some()
    }

    pub fn address(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Signing wallet for a provider
    pub fn ethereum_wallet(&self) -> Option<EthereumWallet> {
        self.signer.clone().map(EthereumWallet::from)
    }
}

fn parse_key(key: &str) -> Result<PrivateKeySigner, SwapError> {
    PrivateKeySigner::from_str(key.trim().trim_start_matches("0x"))
        .map_err(|e| SwapError::InvalidInput(format!("invalid private key: {}", e)))
}

/// Generate a new random wallet
pub fn generate_new_wallet() -> (String, Address) {
    let signer = PrivateKeySigner::random();
    let address = signer.address();
    let private_key = format!("0x{}", hex::encode(signer.credential().to_bytes()));
    (private_key, address)
}
