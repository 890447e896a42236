//! JSON-RPC chain client
//!
//! Reads go through `eth_call` with hand-encoded `sol!` calldata, writes
//! through a wallet-filled provider. Receipts are polled until a timeout.

use alloy_network::TransactionBuilder;
use alloy_primitives::{Address, B256, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types::{TransactionReceipt, TransactionRequest};
use alloy_sol_types::{sol, SolCall};
use alloy_transport::TransportError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::wallet::WalletManager;
use super::{AggregatorClient, SwapCall, SwapReceipt, TokenClient, TxSummary};
use crate::error::SwapError;
use crate::oracle::{RouterQuoter, RouterResolver, V2Router};
use crate::routing::Quote;
use crate::whitelist::{AdminOp, WhitelistSource};

/// Gas limit used when none is configured
pub const FALLBACK_GAS_LIMIT: u64 = 600_000;

/// How long approvals and wraps may take to confirm
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(180);

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// EIP-1193 "user rejected request"
const USER_REJECTED_CODE: i64 = 4001;

// ============================================
// SOLIDITY INTERFACES
// ============================================

sol! {
    #[derive(Debug)]
    interface IAggregatorMultiSplit {
        function quote(uint256 amountIn, address tokenIn, address tokenOut, address[] calldata intermediates)
            external view returns (uint256 bestOut, address bestRouter, address[] memory bestPath);

        function swapMultiSplit(
            uint256 amountIn,
            address tokenIn,
            address tokenOut,
            address[] calldata intermediates,
            uint8 parts,
            uint256 deadline
        ) external;

        function getRouters() external view returns (address[] memory);
        function getIntermediates() external view returns (address[] memory);
        function feeBps() external view returns (uint256);
        function feeReceiver() external view returns (address);
        function WETH() external view returns (address);
        function owner() external view returns (address);

        function addRouter(address router) external;
        function removeRouter(address router) external;
        function addIntermediate(address token) external;
        function removeIntermediate(address token) external;
        function setFeeBps(uint256 bps) external;
        function setFeeReceiver(address receiver) external;
        function setWETH(address weth) external;
        function transferOwnership(address newOwner) external;
        function renounceOwnership() external;

        event SwapExecuted(
            address indexed user,
            address indexed tokenIn,
            address indexed tokenOut,
            uint256 amountIn,
            uint256 amountOut,
            uint8 parts
        );
    }

    #[derive(Debug)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    #[derive(Debug)]
    interface IWETH {
        function deposit() external payable;
        function withdraw(uint256 amount) external;
    }
}

/// Gas settings applied to every transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxOverrides {
    pub gas_limit: u64,
    /// Legacy gas price; `None` lets the node fill it
    pub gas_price_wei: Option<u128>,
}

impl Default for TxOverrides {
    fn default() -> Self {
        Self {
            gas_limit: FALLBACK_GAS_LIMIT,
            gas_price_wei: None,
        }
    }
}

/// Map a node/signer error onto the failure taxonomy
fn classify_rpc(err: TransportError) -> SwapError {
    if let Some(payload) = err.as_error_resp() {
        if payload.code == USER_REJECTED_CODE {
            return SwapError::UserRejected;
        }
        return SwapError::classify(&payload.message);
    }
    SwapError::classify(&err.to_string())
}

pub struct RpcChain {
    provider: DynProvider,
    account: Option<Address>,
    aggregator: Address,
    overrides: TxOverrides,
    routers: RwLock<HashMap<Address, Arc<V2Router>>>,
}

impl RpcChain {
    /// Connect to `rpc_url`; without a wallet only reads are possible.
    pub fn connect(
        rpc_url: &str,
        aggregator: Address,
        wallet: &WalletManager,
        overrides: TxOverrides,
    ) -> Result<Self, SwapError> {
        let url = rpc_url
            .parse()
            .map_err(|e| SwapError::InvalidInput(format!("invalid RPC_URL: {}", e)))?;

        let provider = match wallet.ethereum_wallet() {
            Some(signer) => ProviderBuilder::new().wallet(signer).connect_http(url).erased(),
            None => ProviderBuilder::new().connect_http(url).erased(),
        };

        Ok(Self {
            provider,
            account: wallet.address(),
            aggregator,
            overrides,
            routers: RwLock::new(HashMap::new()),
        })
    }

    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }

    pub async fn chain_id(&self) -> Result<u64, SwapError> {
        self.provider.get_chain_id().await.map_err(classify_rpc)
    }

    pub async fn block_number(&self) -> Result<u64, SwapError> {
        self.provider.get_block_number().await.map_err(classify_rpc)
    }

    /// Whether `addr` has deployed code
    pub async fn has_code(&self, addr: Address) -> Result<bool, SwapError> {
        let code = self.provider.get_code_at(addr).await.map_err(classify_rpc)?;
        Ok(!code.is_empty())
    }

    fn signer(&self) -> Result<Address, SwapError> {
        self.account
            .ok_or_else(|| SwapError::InvalidInput("no wallet configured (WALLET_PRIVATE_KEY)".to_string()))
    }

    async fn call_contract(&self, to: Address, calldata: Vec<u8>) -> Result<Vec<u8>, SwapError> {
        let mut tx = TransactionRequest::default().to(to).input(calldata.into());
        if let Some(from) = self.account {
            tx = tx.from(from);
        }

        let result = self.provider.call(tx).await.map_err(classify_rpc)?;
        Ok(result.to_vec())
    }

    async fn read<C: SolCall>(&self, to: Address, call: C) -> Result<C::Return, SwapError> {
        let output = self.call_contract(to, call.abi_encode()).await?;
        C::abi_decode_returns(&output)
            .map_err(|e| SwapError::Network(format!("failed to decode {}: {}", C::SIGNATURE, e)))
    }

    fn build_tx(&self, from: Address, to: Address, calldata: Vec<u8>, value: U256) -> TransactionRequest {
        let mut tx = TransactionRequest::default()
            .from(from)
            .to(to)
            .input(calldata.into())
            .value(value)
            .gas_limit(self.overrides.gas_limit);
        if let Some(price) = self.overrides.gas_price_wei {
            tx.set_gas_price(price);
        }
        tx
    }

    /// Dry-run then broadcast; returns the transaction hash.
    async fn submit(&self, to: Address, calldata: Vec<u8>, value: U256) -> Result<B256, SwapError> {
        let from = self.signer()?;
        let tx = self.build_tx(from, to, calldata, value);

        // Surface the revert reason before paying for gas
        self.provider.call(tx.clone()).await.map_err(classify_rpc)?;

        let pending = self.provider.send_transaction(tx).await.map_err(classify_rpc)?;
        let hash = *pending.tx_hash();
        debug!("Transaction sent: {:?} -> {:?}", hash, to);
        Ok(hash)
    }

    async fn wait_receipt(&self, hash: B256, timeout: Duration) -> Result<TransactionReceipt, SwapError> {
        let started = Instant::now();
        loop {
            match self.provider.get_transaction_receipt(hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(e) => warn!("Receipt poll for {:?} failed: {}", hash, e),
            }
            if started.elapsed() >= timeout {
                return Err(SwapError::Timeout(format!(
                    "{:?} not mined after {}s",
                    hash,
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }

    /// Submit and wait for a successful receipt
    async fn send(&self, to: Address, calldata: Vec<u8>, value: U256) -> Result<TxSummary, SwapError> {
        let hash = self.submit(to, calldata, value).await?;
        let receipt = self.wait_receipt(hash, CONFIRM_TIMEOUT).await?;
        if !receipt.status() {
            return Err(SwapError::Reverted {
                reason: "transaction reverted".to_string(),
                tx_hash: Some(hash),
            });
        }
        Ok(TxSummary {
            tx_hash: hash,
            gas_used: receipt.gas_used,
        })
    }
}

#[async_trait]
impl WhitelistSource for RpcChain {
    async fn routers(&self) -> Result<Vec<Address>, SwapError> {
        self.read(self.aggregator, IAggregatorMultiSplit::getRoutersCall {}).await
    }

    async fn intermediates(&self) -> Result<Vec<Address>, SwapError> {
        self.read(self.aggregator, IAggregatorMultiSplit::getIntermediatesCall {}).await
    }
}

impl RouterResolver for RpcChain {
    fn resolve(&self, router: Address) -> Option<Arc<dyn RouterQuoter>> {
        if let Some(hit) = self.routers.read().unwrap_or_else(|p| p.into_inner()).get(&router) {
            return Some(hit.clone() as Arc<dyn RouterQuoter>);
        }
        let quoter = Arc::new(V2Router::new(router, self.provider.clone()));
        self.routers
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(router, quoter.clone());
        Some(quoter as Arc<dyn RouterQuoter>)
    }
}

#[async_trait]
impl TokenClient for RpcChain {
    fn account(&self) -> Address {
        self.account.unwrap_or(Address::ZERO)
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, SwapError> {
        self.provider.get_balance(owner).await.map_err(classify_rpc)
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, SwapError> {
        self.read(token, IERC20::balanceOfCall { owner }).await
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256, SwapError> {
        self.read(token, IERC20::allowanceCall { owner, spender }).await
    }

    async fn approve(&self, token: Address, spender: Address, amount: U256) -> Result<TxSummary, SwapError> {
        info!("Approving {:?} for {:?}", token, spender);
        let calldata = IERC20::approveCall { spender, amount }.abi_encode();
        self.send(token, calldata, U256::ZERO).await
    }

    async fn wrap(&self, wrapped: Address, amount: U256) -> Result<TxSummary, SwapError> {
        info!("Wrapping {} native into {:?}", amount, wrapped);
        self.send(wrapped, IWETH::depositCall {}.abi_encode(), amount).await
    }

    async fn unwrap(&self, wrapped: Address, amount: U256) -> Result<TxSummary, SwapError> {
        info!("Unwrapping {} from {:?}", amount, wrapped);
        self.send(wrapped, IWETH::withdrawCall { amount }.abi_encode(), U256::ZERO).await
    }
}

#[async_trait]
impl AggregatorClient for RpcChain {
    fn aggregator(&self) -> Address {
        self.aggregator
    }

    async fn weth(&self) -> Result<Address, SwapError> {
        self.read(self.aggregator, IAggregatorMultiSplit::WETHCall {}).await
    }

    async fn fee_bps(&self) -> Result<u16, SwapError> {
        let bps = self.read(self.aggregator, IAggregatorMultiSplit::feeBpsCall {}).await?;
        Ok(u16::try_from(bps).unwrap_or(u16::MAX))
    }

    async fn fee_receiver(&self) -> Result<Address, SwapError> {
        self.read(self.aggregator, IAggregatorMultiSplit::feeReceiverCall {}).await
    }

    async fn owner(&self) -> Result<Option<Address>, SwapError> {
        let owner = self.read(self.aggregator, IAggregatorMultiSplit::ownerCall {}).await?;
        Ok((owner != Address::ZERO).then_some(owner))
    }

    async fn contract_quote(
        &self,
        amount_in: U256,
        token_in: Address,
        token_out: Address,
        intermediates: &[Address],
    ) -> Result<Quote, SwapError> {
        let ret = self
            .read(
                self.aggregator,
                IAggregatorMultiSplit::quoteCall {
                    amountIn: amount_in,
                    tokenIn: token_in,
                    tokenOut: token_out,
                    intermediates: intermediates.to_vec(),
                },
            )
            .await?;
        Ok(Quote {
            amount_out: ret.bestOut,
            router: ret.bestRouter,
            path: ret.bestPath,
        })
    }

    async fn submit_swap(&self, call: &SwapCall) -> Result<B256, SwapError> {
        let calldata = IAggregatorMultiSplit::swapMultiSplitCall {
            amountIn: call.amount_in,
            tokenIn: call.token_in,
            tokenOut: call.token_out,
            intermediates: call.intermediates.clone(),
            parts: call.parts,
            deadline: U256::from(call.deadline),
        }
        .abi_encode();
        info!(
            "Executing swapMultiSplit: amountIn={} parts={} deadline={}",
            call.amount_in, call.parts, call.deadline
        );
        self.submit(self.aggregator, calldata, U256::ZERO).await
    }

    async fn confirm_swap(&self, tx_hash: B256, timeout: Duration) -> Result<SwapReceipt, SwapError> {
        let receipt = self.wait_receipt(tx_hash, timeout).await?;
        if !receipt.status() {
            return Err(SwapError::Reverted {
                reason: "swap reverted on-chain".to_string(),
                tx_hash: Some(tx_hash),
            });
        }

        let amount_out = receipt.inner.logs().iter().find_map(|log| {
            log.log_decode::<IAggregatorMultiSplit::SwapExecuted>()
                .ok()
                .map(|decoded| decoded.inner.data.amountOut)
        });

        Ok(SwapReceipt {
            tx_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            amount_out,
        })
    }

    async fn admin(&self, op: AdminOp) -> Result<TxSummary, SwapError> {
        use IAggregatorMultiSplit as Agg;

        let calldata = match op {
            AdminOp::AddRouter(router) => Agg::addRouterCall { router }.abi_encode(),
            AdminOp::RemoveRouter(router) => Agg::removeRouterCall { router }.abi_encode(),
            AdminOp::AddIntermediate(token) => Agg::addIntermediateCall { token }.abi_encode(),
            AdminOp::RemoveIntermediate(token) => Agg::removeIntermediateCall { token }.abi_encode(),
            AdminOp::SetFeeBps(bps) => Agg::setFeeBpsCall { bps: U256::from(bps) }.abi_encode(),
            AdminOp::SetFeeReceiver(receiver) => Agg::setFeeReceiverCall { receiver }.abi_encode(),
            AdminOp::SetWeth(weth) => Agg::setWETHCall { weth }.abi_encode(),
            AdminOp::TransferOwnership(new_owner) => {
                Agg::transferOwnershipCall { newOwner: new_owner }.abi_encode()
            }
            AdminOp::RenounceOwnership => Agg::renounceOwnershipCall {}.abi_encode(),
        };
        info!("Admin: {}", op);
        self.send(self.aggregator, calldata, U256::ZERO).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolEvent;

    #[test]
    fn test_swap_multi_split_encoding() {
        let call = IAggregatorMultiSplit::swapMultiSplitCall {
            amountIn: U256::from(1000),
            tokenIn: Address::repeat_byte(1),
            tokenOut: Address::repeat_byte(2),
            intermediates: vec![Address::repeat_byte(3)],
            parts: 2,
            deadline: U256::from(1_700_000_000u64),
        };
        let data = call.abi_encode();
        assert_eq!(&data[..4], &IAggregatorMultiSplit::swapMultiSplitCall::SELECTOR);

        let decoded = IAggregatorMultiSplit::swapMultiSplitCall::abi_decode(&data).unwrap();
        assert_eq!(decoded.parts, 2);
        assert_eq!(decoded.intermediates, vec![Address::repeat_byte(3)]);
    }

    #[test]
    fn test_swap_executed_signature() {
        assert_eq!(
            IAggregatorMultiSplit::SwapExecuted::SIGNATURE,
            "SwapExecuted(address,address,address,uint256,uint256,uint8)"
        );
    }

    #[test]
    fn test_default_overrides() {
        let overrides = TxOverrides::default();
        assert_eq!(overrides.gas_limit, FALLBACK_GAS_LIMIT);
        assert!(overrides.gas_price_wei.is_none());
    }

    #[test]
    fn test_read_only_chain_refuses_to_sign() {
        let wallet = WalletManager::new(None, 1666600000).unwrap();
        let chain = RpcChain::connect(
            "http://127.0.0.1:8545",
            Address::repeat_byte(9),
            &wallet,
            TxOverrides::default(),
        )
        .unwrap();
        assert_eq!(chain.account(), Address::ZERO);
        assert_eq!(
            chain.signer().unwrap_err().kind(),
            crate::error::FailureKind::InvalidInput
        );
        assert!(chain.resolve(Address::repeat_byte(5)).is_some());
    }
}
