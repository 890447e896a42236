//! Preflight Check Utility
//!
//! Run with: cargo run --bin preflight
//!
//! Verifies RPC, wallet, aggregator contract, wrapped-native config and
//! whitelist before a live swap.

use alloy_primitives::Address;
use splitswap::chain::{AggregatorClient, RpcChain, TokenClient, WalletManager};
use splitswap::config::Config;
use splitswap::routing::format_units;
use splitswap::tokens;
use splitswap::whitelist::WhitelistSource;

#[derive(Default)]
struct Report {
    issues: Vec<String>,
    warnings: Vec<String>,
}

impl Report {
    fn issue(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        println!("   ❌ {}", msg);
        self.issues.push(msg);
    }

    fn warn(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        println!("   ⚠️  {}", msg);
        self.warnings.push(msg);
    }
}

#[tokio::main]
async fn main() {
    println!();
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║          SPLITSWAP PREFLIGHT CHECK                         ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();

    let mut report = Report::default();
    run_checks(&mut report).await;
    print_summary(&report);
}

async fn run_checks(report: &mut Report) {
    // ==========================================
    // CHECK 1: Configuration
    // ==========================================
    println!("⚙️  CHECKING CONFIGURATION...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            report.issue(format!("Could not load configuration: {}", e));
            return;
        }
    };
    if let Err(e) = config.validate() {
        report.issue(format!("Invalid configuration: {}", e));
        return;
    }
    println!("   ✅ Configuration valid");
    println!();

    // ==========================================
    // CHECK 2: Wallet
    // ==========================================
    println!("🔐 CHECKING WALLET...");

    let wallet = match WalletManager::new(config.wallet_private_key.as_deref(), config.chain_id) {
        Ok(wallet) => wallet,
        Err(e) => {
            report.issue(format!("WALLET_PRIVATE_KEY: {}", e));
            return;
        }
    };
    match wallet.address() {
        Some(addr) => println!("   ✅ WALLET: {:?}", addr),
        None => {
            report.warn("WALLET_PRIVATE_KEY not set (quotes only)");
            println!("   💡 Run: cargo run --bin generate-wallet");
        }
    }
    println!();

    // ==========================================
    // CHECK 3: RPC
    // ==========================================
    println!("📡 CHECKING RPC CONNECTION...");

    let aggregator = match config.aggregator() {
        Ok(addr) => addr,
        Err(e) => {
            report.issue(e.to_string());
            return;
        }
    };
    let chain = match RpcChain::connect(&config.rpc_url, aggregator, &wallet, config.tx_overrides()) {
        Ok(chain) => chain,
        Err(e) => {
            report.issue(format!("RPC_URL: {}", e));
            return;
        }
    };
    match chain.block_number().await {
        Ok(block) => println!("   ✅ RPC connected, current block: {}", block),
        Err(e) => {
            report.issue(format!("RPC connection failed: {}", e));
            return;
        }
    }
    match chain.chain_id().await {
        Ok(id) if id == config.chain_id => println!("   ✅ Chain ID: {}", id),
        Ok(id) => report.issue(format!("Node chain ID {} != CHAIN_ID {}", id, config.chain_id)),
        Err(e) => report.warn(format!("Could not read chain ID: {}", e)),
    }
    if let Some(addr) = wallet.address() {
        match chain.native_balance(addr).await {
            Ok(balance) if balance.is_zero() => report.warn("Wallet has no native balance for gas"),
            Ok(balance) => println!("   ✅ Native balance: {}", format_units(balance, 18)),
            Err(e) => report.warn(format!("Could not read balance: {}", e)),
        }
    }
    println!();

    // ==========================================
    // CHECK 4: Aggregator contract
    // ==========================================
    println!("📜 CHECKING AGGREGATOR CONTRACT...");

    match chain.has_code(aggregator).await {
        Ok(true) => println!("   ✅ AGGREGATOR: {:?} (code exists)", aggregator),
        Ok(false) => {
            report.issue(format!("AGGREGATOR: {:?} has no code", aggregator));
            return;
        }
        Err(e) => report.warn(format!("Could not verify aggregator: {}", e)),
    }

    match (chain.weth().await, config.wrapped_native()) {
        (Ok(onchain), Ok(configured)) if onchain == configured => {
            println!("   ✅ WETH matches WRAPPED_NATIVE_ADDRESS ({:?})", onchain)
        }
        (Ok(onchain), Ok(configured)) => report.issue(format!(
            "Aggregator WETH {:?} != WRAPPED_NATIVE_ADDRESS {:?}",
            onchain, configured
        )),
        (Err(e), _) => report.issue(format!("Could not read WETH(): {}", e)),
        (_, Err(e)) => report.issue(e.to_string()),
    }

    match chain.fee_bps().await {
        Ok(fee) if fee == config.contract_fee_bps => println!("   ✅ Fee: {} bps", fee),
        Ok(fee) => report.warn(format!(
            "On-chain fee {} bps != CONTRACT_FEE_BPS {}",
            fee, config.contract_fee_bps
        )),
        Err(e) => report.warn(format!("Could not read feeBps(): {}", e)),
    }

    match chain.owner().await {
        Ok(Some(owner)) => {
            let mine = wallet.address() == Some(owner);
            println!("   ℹ️  Owner: {:?}{}", owner, if mine { " (this wallet)" } else { "" });
        }
        Ok(None) => println!("   ℹ️  Owner: renounced"),
        Err(e) => report.warn(format!("Could not read owner(): {}", e)),
    }
    println!();

    // ==========================================
    // CHECK 5: Whitelist
    // ==========================================
    println!("🧭 CHECKING WHITELIST...");

    match chain.routers().await {
        Ok(routers) if routers.is_empty() => report.issue("No whitelisted routers"),
        Ok(routers) => {
            for router in routers {
                check_router(&chain, router, report).await;
            }
        }
        Err(e) => report.issue(format!("Could not read routers: {}", e)),
    }

    match chain.intermediates().await {
        Ok(mids) if mids.is_empty() => {
            report.warn("No stored intermediates (multi-hop uses INTERMEDIATE_TOKENS only)")
        }
        Ok(mids) => {
            let names: Vec<String> = mids
                .iter()
                .map(|m| tokens::format_route(&[*m], Address::ZERO))
                .collect();
            println!("   ✅ Intermediates: {}", names.join(", "));
        }
        Err(e) => report.warn(format!("Could not read intermediates: {}", e)),
    }
    println!();
}

async fn check_router(chain: &RpcChain, router: Address, report: &mut Report) {
    let name = tokens::router_name(&router);
    match chain.has_code(router).await {
        Ok(true) => println!("   ✅ Router {} {:?}", name, router),
        Ok(false) => report.issue(format!("Router {} {:?} has no code (swaps revert)", name, router)),
        Err(e) => report.warn(format!("Could not verify router {:?}: {}", router, e)),
    }
}

fn print_summary(report: &Report) {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    if report.issues.is_empty() && report.warnings.is_empty() {
        println!("✅ ALL CHECKS PASSED!");
        println!();
        println!("   Ready to swap.");
    } else if report.issues.is_empty() {
        println!("⚠️  READY WITH WARNINGS ({} warnings)", report.warnings.len());
        println!();
        for w in &report.warnings {
            println!("   • {}", w);
        }
    } else {
        println!(
            "❌ NOT READY ({} issues, {} warnings)",
            report.issues.len(),
            report.warnings.len()
        );
        println!();
        println!("   MUST FIX:");
        for i in &report.issues {
            println!("   • {}", i);
        }
        if !report.warnings.is_empty() {
            println!();
            println!("   WARNINGS:");
            for w in &report.warnings {
                println!("   • {}", w);
            }
        }
    }

    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
}
