//! splitswap CLI
//!
//! Run with: cargo run -- <command>
//!
//! - `quote`     best route, split table and price impact
//! - `swap`      quote then execute through the aggregator
//! - `whitelist` routers and intermediates the aggregator allows
//! - `admin`     owner-only aggregator settings
//! - `simulate`  the whole flow against an in-memory chain

use alloy_primitives::{Address, U256};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use splitswap::chain::{
    generate_new_wallet, AggregatorClient, RpcChain, Sandbox, SwapChain, TokenClient, WalletManager,
};
use splitswap::config::Config;
use splitswap::executor::{IntentParams, SwapExecutor, SwapIntent, SwapOutcome};
use splitswap::oracle::{MockRouter, RouterQuoter, RouterResolver};
use splitswap::routing::{
    format_units, min_out, parse_units, PartsPlan, PriceImpact, Quote, QuoteEngine, QuoteRequest,
    QuoteSession,
};
use splitswap::tokens::{self, Token, WONE};
use splitswap::whitelist::{AdminOp, AggregatorSettings, WhitelistSource};

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-route, multi-split swap engine")]
struct Cli {
    /// TOML config file (environment and .env otherwise)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Machine-readable output
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Quote a swap without sending anything
    Quote {
        /// Symbol, address or "native"
        token_in: String,
        token_out: String,
        /// Human amount, e.g. 1.5
        amount: String,
        /// Extra intermediate tokens, comma separated
        #[arg(long, value_delimiter = ',')]
        via: Vec<Address>,
        /// Also ask the aggregator's own quote view
        #[arg(long, default_value_t = false)]
        contract: bool,
    },

    /// Quote and execute a swap
    Swap {
        token_in: String,
        token_out: String,
        amount: String,
        #[arg(long, value_delimiter = ',')]
        via: Vec<Address>,
        /// Parts to split into (optimizer's choice otherwise)
        #[arg(long)]
        parts: Option<usize>,
    },

    /// Show the aggregator's whitelist and fee settings
    Whitelist,

    /// Owner-only aggregator mutation
    Admin {
        #[command(subcommand)]
        op: AdminCommand,
    },

    /// Run quote, split and swap end-to-end on an in-memory chain
    Simulate {
        /// Native amount to sell
        #[arg(default_value = "1000")]
        amount: String,
    },

    /// Print the effective configuration
    Config {
        /// Write it to a TOML file (the private key is never written)
        #[arg(long)]
        save: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum AdminCommand {
    AddRouter { address: Address },
    RemoveRouter { address: Address },
    AddIntermediate { address: Address },
    RemoveIntermediate { address: Address },
    SetFeeBps { bps: u16 },
    SetFeeReceiver { address: Address },
    SetWeth { address: Address },
    TransferOwnership { address: Address },
    RenounceOwnership,
}

impl From<AdminCommand> for AdminOp {
    fn from(cmd: AdminCommand) -> Self {
        match cmd {
            AdminCommand::AddRouter { address } => AdminOp::AddRouter(address),
            AdminCommand::RemoveRouter { address } => AdminOp::RemoveRouter(address),
            AdminCommand::AddIntermediate { address } => AdminOp::AddIntermediate(address),
            AdminCommand::RemoveIntermediate { address } => AdminOp::RemoveIntermediate(address),
            AdminCommand::SetFeeBps { bps } => AdminOp::SetFeeBps(bps),
            AdminCommand::SetFeeReceiver { address } => AdminOp::SetFeeReceiver(address),
            AdminCommand::SetWeth { address } => AdminOp::SetWeth(address),
            AdminCommand::TransferOwnership { address } => AdminOp::TransferOwnership(address),
            AdminCommand::RenounceOwnership => AdminOp::RenounceOwnership,
        }
    }
}

// ============================================
// ENGINE WIRING
// ============================================

/// Quote engine and executor over one chain
struct Stack {
    chain: Arc<dyn SwapChain>,
    engine: Arc<QuoteEngine>,
    executor: SwapExecutor,
    config: Config,
}

impl Stack {
    fn new<C>(chain: Arc<C>, config: &Config) -> Result<Self>
    where
        C: SwapChain + RouterResolver + 'static,
    {
        let engine = Arc::new(QuoteEngine::new(
            chain.clone(),
            chain.clone(),
            config.routing_params()?,
        ));
        let executor = SwapExecutor::new(
            chain.clone(),
            chain.clone(),
            Arc::new(config.allowance_cache()),
            config.executor_settings()?,
        );
        Ok(Self {
            chain,
            engine,
            executor,
            config: config.clone(),
        })
    }

    fn wrapped(&self) -> Address {
        self.engine.params().wrapped_native
    }

    /// On-chain fee, or the configured assumption when unreadable
    async fn fee_bps(&self) -> u16 {
        match self.chain.fee_bps().await {
            Ok(fee) => fee,
            Err(e) => {
                warn!("Could not read feeBps ({}), assuming {}", e, self.config.contract_fee_bps);
                self.config.contract_fee_bps
            }
        }
    }
}

fn connect(config: &Config) -> Result<Arc<RpcChain>> {
    let wallet = WalletManager::new(config.wallet_private_key.as_deref(), config.chain_id)?;
    let chain = RpcChain::connect(&config.rpc_url, config.aggregator()?, &wallet, config.tx_overrides())?;
    Ok(Arc::new(chain))
}

/// What the user asked to trade
struct Trade {
    token_in: Token,
    token_out: Token,
    amount_in: U256,
    via: Vec<Address>,
}

impl Trade {
    fn parse(token_in: &str, token_out: &str, amount: &str, via: Vec<Address>, config: &Config) -> Result<Self> {
        let token_in = tokens::resolve(token_in).ok_or_else(|| eyre!("unknown token '{}'", token_in))?;
        let token_out = tokens::resolve(token_out).ok_or_else(|| eyre!("unknown token '{}'", token_out))?;
        let amount_in = parse_units(amount, token_in.decimals)
            .ok_or_else(|| eyre!("invalid amount '{}'", amount))?;
        let via = if via.is_empty() { config.intermediates() } else { via };
        Ok(Self {
            token_in,
            token_out,
            amount_in,
            via,
        })
    }
}

// ============================================
// QUOTE
// ============================================

#[derive(Debug, Serialize)]
struct QuoteReport {
    quote: Quote,
    route: String,
    router_name: &'static str,
    parts: PartsPlan,
    price_impact: PriceImpact,
    fee_bps: u16,
    slippage_bps: u16,
    min_out: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    contract_quote: Option<Quote>,
}

async fn quote_trade(stack: &Stack, trade: &Trade, quote: Quote) -> QuoteReport {
    let fee_bps = stack.fee_bps().await;
    let parts = stack.engine.plan_parts(&quote, trade.amount_in).await;
    let price_impact = stack
        .engine
        .price_impact(&quote, trade.amount_in, trade.token_in.decimals, fee_bps)
        .await;

    QuoteReport {
        route: tokens::format_route(&quote.path, stack.wrapped()),
        router_name: tokens::router_name(&quote.router),
        min_out: min_out(quote.amount_out, stack.config.slippage_bps, fee_bps),
        quote,
        parts,
        price_impact,
        fee_bps,
        slippage_bps: stack.config.slippage_bps,
        contract_quote: None,
    }
}

fn print_quote(report: &QuoteReport, trade: &Trade) {
    let decimals = trade.token_out.decimals;
    if report.quote.is_no_route() {
        println!("{} No route with liquidity for {} → {}", style("✗").red(), trade.token_in.symbol, trade.token_out.symbol);
        return;
    }

    println!();
    println!("{}", style("═══ QUOTE ═══").blue().bold());
    println!(
        "  {} {} → {} {}",
        format_units(trade.amount_in, trade.token_in.decimals),
        trade.token_in.symbol,
        style(format_units(report.quote.amount_out, decimals)).green().bold(),
        trade.token_out.symbol
    );
    println!("  Route:        {}", report.route);
    println!("  Router:       {} ({:?})", report.router_name, report.quote.router);
    println!(
        "  Min received: {} {} ({} bps slippage + {} bps fee)",
        format_units(report.min_out, decimals),
        trade.token_out.symbol,
        report.slippage_bps,
        report.fee_bps
    );
    let impact = &report.price_impact;
    println!(
        "  Price impact: {:.2}%{}",
        impact.impact_pct,
        if impact.estimated { " (estimated)" } else { "" }
    );

    if !report.parts.table.is_empty() {
        println!();
        println!("  {:>5}  {:>24}  {:>24}", "parts", "per part", "total");
        for row in &report.parts.table {
            let line = format!(
                "  {:>5}  {:>24}  {:>24}",
                row.n,
                format_units(row.out_per_part, decimals),
                format_units(row.total_out, decimals)
            );
            if row.n == report.parts.best_parts {
                println!("{}", style(format!("{} ★", line)).green());
            } else {
                println!("{}", line);
            }
        }
    }
    println!("  Best parts:   {}", report.parts.best_parts);

    if let Some(contract) = &report.contract_quote {
        println!(
            "  Contract view: {} via {}",
            format_units(contract.amount_out, decimals),
            tokens::router_name(&contract.router)
        );
    }
    println!();
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================
// SWAP
// ============================================

async fn execute_trade(stack: &Stack, trade: &Trade, parts: Option<usize>, json: bool) -> Result<SwapOutcome> {
    let quote = stack
        .engine
        .quote(trade.amount_in, trade.token_in.address, trade.token_out.address, &trade.via)
        .await?;
    let report = quote_trade(stack, trade, quote).await;
    if !json {
        print_quote(&report, trade);
    }

    let params = IntentParams {
        fee_bps: report.fee_bps,
        ..stack.config.intent_params()
    };
    let intent = SwapIntent::from_quote(
        &report.quote,
        trade.amount_in,
        trade.token_in.address,
        trade.token_out.address,
        parts.unwrap_or(report.parts.best_parts),
        params,
    )?;
    info!("Executing {} part(s), minOut {}", intent.parts, intent.min_out);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(120));

    let mut progress = stack.executor.subscribe();
    let follower = {
        let spinner = spinner.clone();
        tokio::spawn(async move {
            while progress.changed().await.is_ok() {
                let state = *progress.borrow_and_update();
                spinner.set_message(state.to_string());
                if state.is_terminal() {
                    break;
                }
            }
        })
    };

    let result = stack.executor.execute(&intent).await;
    follower.abort();
    spinner.finish_and_clear();

    match result {
        Ok(outcome) => {
            if json {
                emit(&outcome)?;
            } else {
                println!(
                    "{} Swapped for {} {} in {:?}",
                    style("✓").green(),
                    style(format_units(outcome.amount_out, trade.token_out.decimals)).green().bold(),
                    trade.token_out.symbol,
                    outcome.tx_hash
                );
                println!("  Gas used: {}", outcome.gas_used);
            }
            Ok(outcome)
        }
        Err(failure) => {
            let trail: Vec<String> = failure.trail.iter().map(|s| s.to_string()).collect();
            println!("{} {}", style("✗").red(), style(failure.error.user_message()).red().bold());
            println!("  States: {}", trail.join(" → "));
            Err(failure.error.into())
        }
    }
}

// ============================================
// WHITELIST & ADMIN
// ============================================

#[derive(Debug, Serialize)]
struct WhitelistReport {
    aggregator: Address,
    owner: Option<Address>,
    weth: Address,
    fee_bps: u16,
    fee_receiver: Address,
    routers: Vec<Address>,
    intermediates: Vec<Address>,
}

async fn whitelist_report(chain: &dyn SwapChain) -> Result<WhitelistReport> {
    let (routers, intermediates) = futures::try_join!(chain.routers(), chain.intermediates())?;
    Ok(WhitelistReport {
        aggregator: chain.aggregator(),
        owner: chain.owner().await?,
        weth: chain.weth().await?,
        fee_bps: chain.fee_bps().await?,
        fee_receiver: chain.fee_receiver().await?,
        routers,
        intermediates,
    })
}

fn print_whitelist(report: &WhitelistReport) {
    println!();
    println!("{}", style("═══ AGGREGATOR ═══").blue().bold());
    println!("  Address:      {:?}", report.aggregator);
    match report.owner {
        Some(owner) => println!("  Owner:        {:?}", owner),
        None => println!("  Owner:        {}", style("renounced").yellow()),
    }
    println!("  WETH:         {:?}", report.weth);
    println!("  Fee:          {} bps → {:?}", report.fee_bps, report.fee_receiver);
    println!();
    println!("  Routers ({}):", report.routers.len());
    for router in &report.routers {
        println!("    • {:<14} {:?}", tokens::router_name(router), router);
    }
    println!("  Intermediates ({}):", report.intermediates.len());
    for mid in &report.intermediates {
        let symbol = tokens::find_by_address(mid).map(|t| t.symbol.as_str()).unwrap_or("?");
        println!("    • {:<14} {:?}", symbol, mid);
    }
    println!();
}

// ============================================
// SIMULATION
// ============================================

fn e18(units: u64) -> U256 {
    U256::from(units) * U256::from(10u64).pow(U256::from(18))
}

/// Two routers with different depth on the ONE/JEWEL market, VIPER as a
/// second hop and the account funded with native ONE.
fn demo_sandbox(config: &Config, account: Address) -> Result<Sandbox> {
    let jewel = tokens::find_by_symbol("JEWEL").ok_or_else(|| eyre!("JEWEL missing from registry"))?;
    let viper = tokens::find_by_symbol("VIPER").ok_or_else(|| eyre!("VIPER missing from registry"))?;
    let known = tokens::known_routers();
    if known.len() < 2 {
        return Err(eyre!("need two known routers for the simulation"));
    }

    let deep = Arc::new(MockRouter::new(known[0].1));
    deep.set_reserves(WONE, jewel.address, e18(2_000_000), e18(100_000));
    deep.set_reserves(WONE, viper.address, e18(1_000_000), e18(5_000_000));
    deep.set_reserves(viper.address, jewel.address, e18(5_000_000), e18(260_000));

    let shallow = Arc::new(MockRouter::new(known[1].1));
    shallow.set_reserves(WONE, jewel.address, e18(200_000), e18(10_600));
    shallow.set_exec_slippage_bps(10);

    let settings = AggregatorSettings::new(
        account,
        WONE,
        [deep.address(), shallow.address()],
        [viper.address],
        config.contract_fee_bps,
    )?;
    let sandbox = Sandbox::new(account, Address::repeat_byte(0xa9), settings);
    sandbox.deploy_router(deep);
    sandbox.deploy_router(shallow);
    sandbox.fund_native(account, e18(1_000_000));
    Ok(sandbox)
}

async fn simulate(config: &Config, amount: &str, json: bool) -> Result<()> {
    let mut config = config.clone();
    config.wrapped_native_address = format!("{:?}", WONE);
    config.validate()?;

    let (_, account) = generate_new_wallet();
    let sandbox = Arc::new(demo_sandbox(&config, account)?);
    let stack = Stack::new(sandbox.clone(), &config)?;

    let whitelist = whitelist_report(stack.chain.as_ref()).await?;
    if !json {
        print_whitelist(&whitelist);
    }

    // quote through a session the way an interactive client would
    let buy = Trade::parse("native", "JEWEL", amount, vec![], &config)?;
    let session = QuoteSession::new(stack.engine.clone(), config.quote_debounce());
    let quote = session
        .request(QuoteRequest {
            amount_in: buy.amount_in,
            token_in: buy.token_in.address,
            token_out: buy.token_out.address,
            intermediates: buy.via.clone(),
        })
        .await?
        .ok_or_else(|| eyre!("quote superseded"))?;
    let report = quote_trade(&stack, &buy, quote).await;
    if json {
        emit(&report)?;
    } else {
        print_quote(&report, &buy);
    }

    let bought = execute_trade(&stack, &buy, None, json).await?;

    let sell_amount = format_units(bought.amount_out / U256::from(2), buy.token_out.decimals);
    let sell = Trade::parse("JEWEL", "native", &sell_amount, vec![], &config)?;
    execute_trade(&stack, &sell, Some(1), json).await?;

    if json {
        return emit(&sandbox.history());
    }

    let native = sandbox.native_balance(account).await?;
    let jewel = sandbox.balance_of(buy.token_out.address, account).await?;
    println!("{}", style("═══ BALANCES ═══").blue().bold());
    println!("  ONE:   {}", format_units(native, 18));
    println!("  JEWEL: {}", format_units(jewel, buy.token_out.decimals));
    println!("  Transactions: {}", sandbox.history().len());
    println!("  Allowance cache: {:?}", stack.executor.allowances().stats());
    Ok(())
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🔀 SPLITSWAP - Multi-route, multi-split swaps").cyan().bold()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("splitswap=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;

    if !cli.json {
        print_banner();
    }

    match cli.command {
        Command::Quote {
            token_in,
            token_out,
            amount,
            via,
            contract,
        } => {
            let chain = connect(&config)?;
            let stack = Stack::new(chain, &config)?;
            let trade = Trade::parse(&token_in, &token_out, &amount, via, &config)?;

            let quote = stack
                .engine
                .quote(trade.amount_in, trade.token_in.address, trade.token_out.address, &trade.via)
                .await?;
            let mut report = quote_trade(&stack, &trade, quote).await;
            if contract {
                let wrapped = stack.wrapped();
                report.contract_quote = Some(
                    stack
                        .chain
                        .contract_quote(
                            trade.amount_in,
                            trade.token_in.routing_address(wrapped),
                            trade.token_out.routing_address(wrapped),
                            &trade.via,
                        )
                        .await?,
                );
            }

            if cli.json {
                emit(&report)?;
            } else {
                print_quote(&report, &trade);
            }
        }

        Command::Swap {
            token_in,
            token_out,
            amount,
            via,
            parts,
        } => {
            let trade = Trade::parse(&token_in, &token_out, &amount, via, &config)?;
            if tokens::same_asset(&trade.token_in, &trade.token_out, config.wrapped_native()?) {
                println!(
                    "{} {} and {} are the same asset, nothing to swap",
                    style("•").dim(),
                    trade.token_in.symbol,
                    trade.token_out.symbol
                );
                return Ok(());
            }
            if config.wallet_private_key.is_none() {
                return Err(eyre!("WALLET_PRIVATE_KEY is required to swap"));
            }
            let chain = connect(&config)?;
            let stack = Stack::new(chain, &config)?;
            execute_trade(&stack, &trade, parts, cli.json).await?;
        }

        Command::Whitelist => {
            let chain = connect(&config)?;
            let report = whitelist_report(chain.as_ref()).await?;
            if cli.json {
                emit(&report)?;
            } else {
                print_whitelist(&report);
            }
        }

        Command::Admin { op } => {
            let op = AdminOp::from(op);
            let chain = connect(&config)?;
            info!("Sending {}", op);
            let tx = chain.admin(op).await?;
            if cli.json {
                emit(&tx)?;
            } else {
                println!("{} {} mined in {:?}", style("✓").green(), op, tx.tx_hash);
            }
        }

        Command::Simulate { amount } => simulate(&config, &amount, cli.json).await?,

        Command::Config { save } => {
            config.print_summary();
            if let Some(path) = save {
                config.save_to_file(&path)?;
                println!("{} Saved to {}", style("✓").green(), path);
            }
        }
    }

    Ok(())
}
