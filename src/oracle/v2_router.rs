//! Uniswap-V2 router over JSON-RPC
//!
//! Quotes are plain `eth_call`s against `getAmountsOut`. Reserves for the
//! price-impact estimate are read through the router's factory; pair
//! addresses and `token0` are immutable, so both are cached per instance.

use alloy_primitives::{Address, U256};
use alloy_provider::{DynProvider, Provider};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};

use super::{OracleError, PairReserves, RouterQuoter};

// ============================================
// SOLIDITY INTERFACES
// ============================================

sol! {
    #[derive(Debug)]
    interface IUniswapV2Router02 {
        function factory() external view returns (address);
        function getAmountsOut(uint256 amountIn, address[] calldata path)
            external view returns (uint256[] memory amounts);
        function swapExactTokensForTokens(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external returns (uint256[] memory amounts);
    }

    #[derive(Debug)]
    interface IUniswapV2Factory {
        function getPair(address tokenA, address tokenB) external view returns (address pair);
    }

    #[derive(Debug)]
    interface IUniswapV2Pair {
        function getReserves() external view returns (
            uint112 reserve0,
            uint112 reserve1,
            uint32 blockTimestampLast
        );
        function token0() external view returns (address);
    }
}

pub struct V2Router {
    address: Address,
    provider: DynProvider,
    factory: RwLock<Option<Address>>,
    /// (tokenA, tokenB) -> (pair, token0)
    pairs: RwLock<HashMap<(Address, Address), (Address, Address)>>,
}

impl V2Router {
    pub fn new(address: Address, provider: DynProvider) -> Self {
        Self {
            address,
            provider,
            factory: RwLock::new(None),
            pairs: RwLock::new(HashMap::new()),
        }
    }

    async fn call_contract(&self, to: Address, calldata: Vec<u8>) -> Result<Vec<u8>, OracleError> {
        let tx = TransactionRequest::default().to(to).input(calldata.into());

        let result = self
            .provider
            .call(tx)
            .await
            .map_err(|e| call_error(e.to_string()))?;

        Ok(result.to_vec())
    }

    async fn factory(&self) -> Result<Address, OracleError> {
        if let Some(factory) = *self.factory.read().unwrap_or_else(|p| p.into_inner()) {
            return Ok(factory);
        }

        let output = self
            .call_contract(self.address, IUniswapV2Router02::factoryCall {}.abi_encode())
            .await?;
        let factory = IUniswapV2Router02::factoryCall::abi_decode_returns(&output)
            .map_err(|e| OracleError::Malformed(format!("factory: {}", e)))?;

        *self.factory.write().unwrap_or_else(|p| p.into_inner()) = Some(factory);
        debug!("Router {:?} uses factory {:?}", self.address, factory);
        Ok(factory)
    }

    /// Pair and its token0 (CACHED - immutable per pair)
    async fn pair_of(&self, a: Address, b: Address) -> Result<Option<(Address, Address)>, OracleError> {
        let key = if a < b { (a, b) } else { (b, a) };
        if let Some(hit) = self.pairs.read().unwrap_or_else(|p| p.into_inner()).get(&key) {
            return Ok(Some(*hit));
        }

        let factory = self.factory().await?;
        let calldata = IUniswapV2Factory::getPairCall { tokenA: a, tokenB: b }.abi_encode();
        let output = self.call_contract(factory, calldata).await?;
        let pair = IUniswapV2Factory::getPairCall::abi_decode_returns(&output)
            .map_err(|e| OracleError::Malformed(format!("getPair: {}", e)))?;
        if pair == Address::ZERO {
            return Ok(None);
        }

        let output = self
            .call_contract(pair, IUniswapV2Pair::token0Call {}.abi_encode())
            .await?;
        let token0 = IUniswapV2Pair::token0Call::abi_decode_returns(&output)
            .map_err(|e| OracleError::Malformed(format!("token0: {}", e)))?;

        self.pairs
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key, (pair, token0));
        Ok(Some((pair, token0)))
    }
}

impl V2Router {
    async fn read_reserves(&self, a: Address, b: Address) -> Result<Option<PairReserves>, OracleError> {
        let Some((pair, token0)) = self.pair_of(a, b).await? else {
            return Ok(None);
        };

        let output = self
            .call_contract(pair, IUniswapV2Pair::getReservesCall {}.abi_encode())
            .await?;
        let reserves = IUniswapV2Pair::getReservesCall::abi_decode_returns(&output)
            .map_err(|e| OracleError::Malformed(format!("getReserves: {}", e)))?;

        let r0 = U256::from(reserves.reserve0.to::<u128>());
        let r1 = U256::from(reserves.reserve1.to::<u128>());
        let (reserve_in, reserve_out) = if a == token0 { (r0, r1) } else { (r1, r0) };
        Ok(Some(PairReserves { reserve_in, reserve_out }))
    }
}

/// Node errors carry "execution reverted" for contract failures; anything
/// else is treated as a transport problem.
fn call_error(message: String) -> OracleError {
    if message.to_lowercase().contains("revert") {
        OracleError::Reverted(message)
    } else {
        OracleError::Transport(message)
    }
}

#[async_trait]
impl RouterQuoter for V2Router {
    fn address(&self) -> Address {
        self.address
    }

    async fn quote_amounts_out(
        &self,
        amount_in: U256,
        path: &[Address],
    ) -> Result<Vec<U256>, OracleError> {
        let calldata = IUniswapV2Router02::getAmountsOutCall {
            amountIn: amount_in,
            path: path.to_vec(),
        }
        .abi_encode();

        let output = self.call_contract(self.address, calldata).await?;
        IUniswapV2Router02::getAmountsOutCall::abi_decode_returns(&output)
            .map_err(|e| OracleError::Malformed(format!("getAmountsOut: {}", e)))
    }

    async fn swap_exact_tokens(
        &self,
        amount_in: U256,
        amount_out_min: U256,
        path: &[Address],
        to: Address,
        deadline: u64,
    ) -> Result<U256, OracleError> {
        let calldata = IUniswapV2Router02::swapExactTokensForTokensCall {
            amountIn: amount_in,
            amountOutMin: amount_out_min,
            path: path.to_vec(),
            to,
            deadline: U256::from(deadline),
        }
        .abi_encode();

        // Dry run first for the realized amounts and an early revert reason
        let simulated = self.call_contract(self.address, calldata.clone()).await?;
        let amounts = IUniswapV2Router02::swapExactTokensForTokensCall::abi_decode_returns(&simulated)
            .map_err(|e| OracleError::Malformed(format!("swapExactTokensForTokens: {}", e)))?;

        let tx = TransactionRequest::default().to(self.address).input(calldata.into());
        let receipt = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| call_error(e.to_string()))?
            .get_receipt()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        if !receipt.status() {
            return Err(OracleError::Reverted(format!(
                "swap {:?} reverted",
                receipt.transaction_hash
            )));
        }

        amounts
            .last()
            .copied()
            .ok_or_else(|| OracleError::Malformed("empty amounts".to_string()))
    }

    async fn hop_reserves(&self, path: &[Address]) -> Vec<Option<PairReserves>> {
        let mut hops = Vec::with_capacity(path.len().saturating_sub(1));
        for hop in path.windows(2) {
            match self.read_reserves(hop[0], hop[1]).await {
                Ok(reserves) => hops.push(reserves),
                Err(e) => {
                    warn!("Failed to get reserves for {:?}-{:?}: {}", hop[0], hop[1], e);
                    hops.push(None);
                }
            }
        }
        hops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_error_classification() {
        assert!(matches!(
            call_error("server returned an error response: execution reverted".into()),
            OracleError::Reverted(_)
        ));
        assert!(matches!(
            call_error("error sending request for url".into()),
            OracleError::Transport(_)
        ));
    }

    #[test]
    fn test_get_amounts_out_encoding() {
        let path = vec![Address::repeat_byte(1), Address::repeat_byte(2)];
        let calldata = IUniswapV2Router02::getAmountsOutCall {
            amountIn: U256::from(1000),
            path: path.clone(),
        }
        .abi_encode();
        assert_eq!(&calldata[..4], &IUniswapV2Router02::getAmountsOutCall::SELECTOR);

        let decoded = IUniswapV2Router02::getAmountsOutCall::abi_decode(&calldata).unwrap();
        assert_eq!(decoded.path, path);
    }
}
