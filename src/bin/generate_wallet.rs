//! Wallet Generation Utility
//!
//! Run with: cargo run --bin generate-wallet
//!
//! Generates a fresh signing key for the swap account.

use splitswap::chain::generate_new_wallet;

fn main() {
    println!();
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║          SPLITSWAP WALLET GENERATOR                        ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();

    let (private_key, address) = generate_new_wallet();

    println!("🔑 NEW WALLET GENERATED");
    println!();
    println!("   Address:     {:?}", address);
    println!("   Private Key: {}", private_key);
    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("⚠️  SECURITY WARNINGS:");
    println!();
    println!("   1. NEVER share your private key with anyone");
    println!("   2. NEVER commit it to git or any public repository");
    println!("   3. Keep only trading balances on this account");
    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("📝 TO USE THIS WALLET (add to .env):");
    println!();
    println!("   WALLET_PRIVATE_KEY={}", private_key);
    println!();
    println!("   Fund it with ONE for gas, then run:");
    println!("   cargo run --bin preflight");
    println!();
}
