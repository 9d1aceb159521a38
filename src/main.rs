//! Crossflow - Cross-Chain Yield Deployment Engine
//!
//! Run with: cargo run -- <command>
//!
//! Commands:
//! - routes:   show which chains a token can bridge to
//! - discover: rank yield protocols reachable from a source token
//! - deploy:   execute a full cross-chain deployment

use alloy_primitives::utils::parse_units;
use color_eyre::eyre::{eyre, Result};
use clap::{Parser, Subcommand};
use console::style;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cache;
mod config;
mod directory;
mod discovery;
mod engine;
mod recorder;
mod routing;
mod signer;

use config::Config;
use directory::TokenDirectory;
use discovery::{DiscoveryService, Protocol};
use engine::{DeployRequest, ExecutionEngine, RouterFeeQuoter};
use recorder::HttpRecorder;
use routing::HttpYieldApi;
use signer::WalletSigner;

// ============================================
// CLI
// ============================================

#[derive(Parser)]
#[command(name = "crossflow", about = "Cross-chain yield deployment engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the destination chains a token can bridge to
    Routes {
        /// Token symbol, e.g. USDC
        #[arg(long, default_value = "USDC")]
        token: String,

        /// Source chain ID
        #[arg(long)]
        chain_id: Option<u64>,
    },

    /// Discover and rank yield protocols reachable from a source token
    Discover {
        /// Token symbol, e.g. USDC
        #[arg(long, default_value = "USDC")]
        token: String,

        /// Source chain ID
        #[arg(long)]
        chain_id: Option<u64>,
    },

    /// Deploy funds into the highest-APY protocol (or a chosen one)
    Deploy {
        /// Token symbol, e.g. USDC
        #[arg(long, default_value = "USDC")]
        token: String,

        /// Human amount, e.g. "100" for 100 USDC
        #[arg(long)]
        amount: String,

        /// Target protocol id from `discover`; highest APY if omitted
        #[arg(long)]
        protocol: Option<String>,
    },
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🌉 CROSSFLOW - Cross-Chain Yield Deployment Engine")
            .cyan()
            .bold()
    );
    println!(
        "{}",
        style("    CCIP Lanes | Yield Discovery | One-Transaction Deploys").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crossflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn print_protocols(protocols: &[Protocol], directory: &TokenDirectory) {
    if protocols.is_empty() {
        println!("  (no protocols passed the filters)");
        return;
    }
    for (i, p) in protocols.iter().enumerate() {
        let network = directory
            .entry(p.chain_id)
            .map(|e| e.network_name)
            .unwrap_or("unknown");
        println!(
            "  {:>2}. {:<28} {:>6.2}% APY  ${:>14.0} TVL  [{} / chain {}]",
            i + 1,
            p.name,
            p.apy,
            p.tvl,
            network,
            p.chain_id
        );
    }
}

// ============================================
// COMMANDS
// ============================================

fn cmd_routes(directory: &TokenDirectory, token: &str, chain_id: u64) -> Result<()> {
    let entry = directory
        .entry(chain_id)
        .ok_or_else(|| eyre!("chain {} is not in the token directory", chain_id))?;
    let listing = entry
        .listing_by_symbol(token)
        .ok_or_else(|| eyre!("{} is not listed on chain {}", token, chain_id))?;

    println!(
        "Routes for {} from {} (chain {}):",
        style(token).bold(),
        entry.network_name,
        chain_id
    );

    let routes = directory.resolve_routes(chain_id, &listing.token_address);
    if routes.is_empty() {
        println!("  (no destination chains list this token)");
        return Ok(());
    }
    for route in routes {
        let dest = directory
            .entry(route.chain_id)
            .expect("route candidates come from directory entries");
        println!(
            "  → {:<12} chain {:<8} {} pool  token {:?}",
            dest.network_name, route.chain_id, route.pool_type, route.token_address
        );
    }
    Ok(())
}

async fn cmd_discover(
    config: &Config,
    directory: Arc<TokenDirectory>,
    token: &str,
    chain_id: u64,
) -> Result<()> {
    let entry = directory
        .entry(chain_id)
        .ok_or_else(|| eyre!("chain {} is not in the token directory", chain_id))?;
    let listing = entry
        .listing_by_symbol(token)
        .ok_or_else(|| eyre!("{} is not listed on chain {}", token, chain_id))?;
    let token_address = listing.token_address;

    let yield_api = HttpYieldApi::new(config.yield_api_url.clone());
    let service = DiscoveryService::new(yield_api, directory.clone(), config.discovery_config());

    info!("🔍 Discovering yield for {} across bridgeable chains...", token);
    let protocols = service.discover_routes(chain_id, token_address).await;

    println!(
        "Yield protocols reachable from {} on chain {} ({} found):",
        style(token).bold(),
        chain_id,
        protocols.len()
    );
    print_protocols(&protocols, &directory);
    Ok(())
}

/// Pick the deployment destination from the discovery results.
///
/// Discovery spans the source chain too, but a deploy always bridges:
/// source-chain protocols are skipped for the default pick (the list is
/// already APY-descending) and an explicitly requested one is rejected with
/// a clear message instead of failing later in payload preparation.
fn select_destination<'a>(
    protocols: &'a [Protocol],
    source_chain_id: u64,
    protocol_id: Option<&str>,
) -> Result<&'a Protocol> {
    match protocol_id {
        Some(id) => {
            let chosen = protocols
                .iter()
                .find(|p| p.id == id)
                .ok_or_else(|| eyre!("protocol '{}' not found; run `discover` first", id))?;
            if chosen.chain_id == source_chain_id {
                return Err(eyre!(
                    "protocol '{}' is on the source chain {}; deploy targets a remote chain",
                    id,
                    source_chain_id
                ));
            }
            Ok(chosen)
        }
        None => protocols
            .iter()
            .find(|p| p.chain_id != source_chain_id)
            .ok_or_else(|| {
                eyre!(
                    "no eligible protocols found outside chain {}",
                    source_chain_id
                )
            }),
    }
}

async fn cmd_deploy(
    config: &Config,
    directory: Arc<TokenDirectory>,
    token: &str,
    amount: &str,
    protocol_id: Option<String>,
) -> Result<()> {
    config.validate()?;

    let chain_id = config.chain_id;
    let entry = directory
        .entry(chain_id)
        .ok_or_else(|| eyre!("chain {} is not in the token directory", chain_id))?;
    let listing = entry
        .listing_by_symbol(token)
        .ok_or_else(|| eyre!("{} is not listed on chain {}", token, chain_id))?;
    let token_address = listing.token_address;
    let router_address = entry.router_address;

    let amount_wei = parse_units(amount, listing.decimals)
        .map_err(|e| eyre!("bad amount '{}': {}", amount, e))?
        .get_absolute();

    // pick the destination before spinning up the signer
    let yield_api = HttpYieldApi::new(config.yield_api_url.clone());
    let service = DiscoveryService::new(
        yield_api.clone(),
        directory.clone(),
        config.discovery_config(),
    );
    let protocols = service.discover_routes(chain_id, token_address).await;
    let destination = select_destination(&protocols, chain_id, protocol_id.as_deref())?;

    println!(
        "Deploying {} {} → {} ({:.2}% APY, chain {})",
        amount,
        token,
        style(&destination.name).bold(),
        destination.apy,
        destination.chain_id
    );

    let private_key = config
        .private_key
        .as_deref()
        .ok_or_else(|| eyre!("DEPLOYER_PRIVATE_KEY must be set to deploy"))?;
    let signer = WalletSigner::new(private_key, config.rpc_url.clone(), chain_id)?;
    let fee_quoter = RouterFeeQuoter::new(config.rpc_url.clone(), router_address);
    let recorder = HttpRecorder::new(config.recorder_url.clone());

    let mut engine = ExecutionEngine::new(
        directory,
        signer,
        yield_api,
        fee_quoter,
        recorder,
        config.engine_config(),
    );

    let request = DeployRequest {
        source_chain_id: chain_id,
        source_token: token_address,
        amount: amount_wei,
        destination,
    };

    let result = engine.execute_full_flow(&request).await;
    let state = engine.state();

    println!();
    for (i, desc) in state.step_descriptions.iter().enumerate() {
        let marker = if i < state.current_step || result.is_some() {
            "✓"
        } else if i == state.current_step {
            "•"
        } else {
            " "
        };
        println!("  {} [{}/{}] {}", marker, i + 1, state.total_steps, desc);
    }
    println!();

    match result {
        Some(hash) => {
            println!("{} Deployment sent: {}", style("✅").green(), hash);
            if let Some(fee) = &state.estimated_fee {
                println!("   Messaging fee: {} native", fee);
            }
            Ok(())
        }
        None => {
            let message = state
                .error_message
                .clone()
                .unwrap_or_else(|| "unknown failure".to_string());
            warn!("Deployment failed at step {}: {}", state.current_step, message);
            Err(eyre!(message))
        }
    }
}

// ============================================
// ENTRY POINT
// ============================================

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();
    print_banner();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    config.print_summary();

    let directory = Arc::new(TokenDirectory::mainnet());
    info!(
        "📒 Token directory {} loaded: {} listings across {} chains",
        directory.version,
        directory.listing_count(),
        directory.entries().len()
    );

    match cli.command {
        Command::Routes { token, chain_id } => {
            let chain = chain_id.unwrap_or(config.chain_id);
            cmd_routes(&directory, &token, chain)
        }
        Command::Discover { token, chain_id } => {
            let chain = chain_id.unwrap_or(config.chain_id);
            cmd_discover(&config, directory, &token, chain).await
        }
        Command::Deploy {
            token,
            amount,
            protocol,
        } => cmd_deploy(&config, directory, &token, &amount, protocol).await,
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;

    fn protocol(id: &str, name: &str, apy: f64, chain_id: u64) -> Protocol {
        Protocol {
            id: id.to_string(),
            name: name.to_string(),
            apy,
            tvl: 50_000_000.0,
            chain_id,
            token_address: Address::repeat_byte(0x99),
            decimals: 6,
            protocol_slug: name.to_lowercase().replace(' ', "-"),
            underlying_tokens: vec![],
        }
    }

    #[test]
    fn test_default_destination_skips_source_chain_winner() {
        // APY-descending as discovery returns them; the top entry is local
        let protocols = vec![
            protocol("moonwell-8453", "Moonwell", 7.2, 8453),
            protocol("aave-v3-42161", "Aave V3", 4.1, 42161),
            protocol("compound-v3-1", "Compound V3", 3.0, 1),
        ];

        let picked = select_destination(&protocols, 8453, None).unwrap();
        assert_eq!(picked.id, "aave-v3-42161");
    }

    #[test]
    fn test_explicit_source_chain_protocol_is_rejected() {
        let protocols = vec![
            protocol("moonwell-8453", "Moonwell", 7.2, 8453),
            protocol("aave-v3-42161", "Aave V3", 4.1, 42161),
        ];

        let err = select_destination(&protocols, 8453, Some("moonwell-8453")).unwrap_err();
        assert!(err.to_string().contains("source chain"));

        // a remote pick still works
        let picked = select_destination(&protocols, 8453, Some("aave-v3-42161")).unwrap();
        assert_eq!(picked.chain_id, 42161);
    }

    #[test]
    fn test_all_local_results_error_instead_of_bad_lane() {
        let protocols = vec![protocol("moonwell-8453", "Moonwell", 7.2, 8453)];
        assert!(select_destination(&protocols, 8453, None).is_err());
    }

    #[test]
    fn test_unknown_protocol_id_errors() {
        let protocols = vec![protocol("aave-v3-42161", "Aave V3", 4.1, 42161)];
        assert!(select_destination(&protocols, 8453, Some("nope")).is_err());
    }
}
