//! Token Directory - Versioned CCIP Lane Metadata
//!
//! Static per-chain table of everything the engine needs to talk to the
//! messaging protocol:
//! - Router / risk management / token admin registry addresses
//! - Protocol chain selectors (distinct from public chain ids)
//! - Bridgeable token listings with their pool type
//!
//! The directory is loaded once and never mutated. Adding a chain or a token
//! is a data change here, not a code change in the resolver.

use alloy_primitives::Address;
use std::str::FromStr;

/// Directory snapshot version, bumped whenever a lane or listing changes.
pub const DIRECTORY_VERSION: &str = "2026-08-1";

/// Token bridging model used by the lane's token pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolType {
    /// Tokens are burned on the source chain and minted on the destination
    BurnMint,

    /// Tokens are escrowed on the source chain and released from a
    /// pre-funded destination pool
    LockRelease,
}

impl std::fmt::Display for PoolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolType::BurnMint => write!(f, "Burn/Mint"),
            PoolType::LockRelease => write!(f, "Lock/Release"),
        }
    }
}

/// One bridgeable token on one chain
#[derive(Debug, Clone)]
pub struct TokenListing {
    pub symbol: &'static str,
    pub token_address: Address,
    pub token_pool_address: Address,
    pub network_name: &'static str,
    pub decimals: u8,
    pub pool_type: PoolType,
}

/// Per-chain protocol metadata plus the chain's bridgeable tokens
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub chain_id: u64,
    pub network_name: &'static str,
    pub router_address: Address,
    pub chain_selector: u64,
    pub risk_management_address: Address,
    pub token_admin_registry_address: Address,
    pub fee_token_address: Address,
    pub wrapped_native: Address,
    /// Deployed cross-yield executor contract on this chain. Acts as the
    /// message sender on the source side and the receiver on the destination.
    pub executor_address: Address,
    pub tokens: Vec<TokenListing>,
}

impl DirectoryEntry {
    /// Find a listing by token address
    pub fn listing(&self, token: &Address) -> Option<&TokenListing> {
        self.tokens.iter().find(|t| t.token_address == *token)
    }

    /// Find a listing by display symbol. Symbols are NOT unique within a
    /// chain, so this returns the first declared match only.
    pub fn listing_by_symbol(&self, symbol: &str) -> Option<&TokenListing> {
        self.tokens.iter().find(|t| t.symbol == symbol)
    }
}

/// A candidate destination produced by route resolution.
///
/// Symbol equality is the only matching rule, so a candidate is exactly that:
/// a candidate. Decimals may differ across chains and callers must rescale
/// amounts using each side's own listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteCandidate {
    pub chain_id: u64,
    pub token_address: Address,
    pub pool_type: PoolType,
}

/// The immutable multi-chain token directory
#[derive(Debug)]
pub struct TokenDirectory {
    pub version: &'static str,
    entries: Vec<DirectoryEntry>,
}

impl TokenDirectory {
    /// Build a directory from explicit entries (tests, alternate snapshots)
    pub fn new(version: &'static str, entries: Vec<DirectoryEntry>) -> Self {
        Self { version, entries }
    }

    /// Entry for a chain id
    pub fn entry(&self, chain_id: u64) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|e| e.chain_id == chain_id)
    }

    /// All entries in declaration order
    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    /// Listing lookup across the directory
    pub fn listing(&self, chain_id: u64, token: &Address) -> Option<&TokenListing> {
        self.entry(chain_id).and_then(|e| e.listing(token))
    }

    /// Resolve every candidate destination for a source-chain token.
    ///
    /// Looks up the token's symbol on the source chain, then scans every
    /// other chain for a listing with the identical symbol. The source chain
    /// and same-address matches are excluded. Output order is directory
    /// declaration order; callers needing a stable order sort explicitly.
    ///
    /// An unknown token yields an empty vec - absence is a normal outcome,
    /// not an error.
    pub fn resolve_routes(&self, source_chain_id: u64, token: &Address) -> Vec<RouteCandidate> {
        let symbol = match self.listing(source_chain_id, token) {
            Some(listing) => listing.symbol,
            None => return Vec::new(),
        };

        let mut candidates = Vec::new();
        for entry in &self.entries {
            if entry.chain_id == source_chain_id {
                continue;
            }
            for listing in &entry.tokens {
                if listing.symbol == symbol && listing.token_address != *token {
                    candidates.push(RouteCandidate {
                        chain_id: entry.chain_id,
                        token_address: listing.token_address,
                        pool_type: listing.pool_type,
                    });
                    // one candidate per matching chain
                    break;
                }
            }
        }
        candidates
    }

    /// Total number of listings across all chains
    pub fn listing_count(&self) -> usize {
        self.entries.iter().map(|e| e.tokens.len()).sum()
    }
}

fn addr(s: &str) -> Address {
    Address::from_str(s).unwrap()
}

// ============================================
// MAINNET SNAPSHOT
// ============================================

fn ethereum_entry() -> DirectoryEntry {
    DirectoryEntry {
        chain_id: 1,
        network_name: "ethereum-mainnet",
        router_address: addr("0x80226fc0Ee2b096224EeAc085Bb9a8cba1146f7D"),
        chain_selector: 5009297550715157269,
        risk_management_address: addr("0x411dE17f12D1A34ecC7F45f49844626267c75e81"),
        token_admin_registry_address: addr("0xb22764f98dD05c789929716D677382Df22C05Cb6"),
        fee_token_address: addr("0x514910771AF9Ca656af840dff83E8264EcF986CA"), // LINK
        wrapped_native: addr("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),    // WETH
        executor_address: addr("0x4d7f3b5a19e8c2de41f0a6b59c31d0784efc2a11"),
        tokens: vec![
            TokenListing {
                symbol: "USDC",
                token_address: addr("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
                token_pool_address: addr("0x9a2c5d1e0f8b7a6354c2d9e8f1a0b3c4d5e6f701"),
                network_name: "ethereum-mainnet",
                decimals: 6,
                pool_type: PoolType::LockRelease,
            },
            TokenListing {
                symbol: "WETH",
                token_address: addr("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
                token_pool_address: addr("0x1b3c5d7e9f0a2b4c6d8e0f1a3b5c7d9e1f2a3b4c"),
                network_name: "ethereum-mainnet",
                decimals: 18,
                pool_type: PoolType::LockRelease,
            },
            TokenListing {
                symbol: "LINK",
                token_address: addr("0x514910771AF9Ca656af840dff83E8264EcF986CA"),
                token_pool_address: addr("0x2c4d6e8f0a1b3c5d7e9f1a2b4c6d8e0f2a3b4c5d"),
                network_name: "ethereum-mainnet",
                decimals: 18,
                pool_type: PoolType::BurnMint,
            },
        ],
    }
}

fn base_entry() -> DirectoryEntry {
    DirectoryEntry {
        chain_id: 8453,
        network_name: "base-mainnet",
        router_address: addr("0x881e3A65B4d4a04dD529061dd0071cf975F58bCD"),
        chain_selector: 15971525489660198786,
        risk_management_address: addr("0xc4b1e4d5f6a7b8c9d0e1f2a3b4c5d6e7f8a9b0c1"),
        token_admin_registry_address: addr("0x6f0b3d2c1a9e8d7c6b5a4f3e2d1c0b9a8f7e6d5c"),
        fee_token_address: addr("0x88Fb150BDc53A65fe94Dea0c9BA0a6dAf8C6e196"), // LINK
        wrapped_native: addr("0x4200000000000000000000000000000000000006"),
        executor_address: addr("0x8e2a1b3c4d5f6a7b8c9d0e1f2a3b4c5d6e7f8091"),
        tokens: vec![
            TokenListing {
                symbol: "USDC",
                token_address: addr("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
                token_pool_address: addr("0x3d5e7f9a1b2c4d6e8f0a2b3c5d7e9f1a3b4c5d6e"),
                network_name: "base-mainnet",
                decimals: 6,
                pool_type: PoolType::BurnMint,
            },
            TokenListing {
                symbol: "WETH",
                token_address: addr("0x4200000000000000000000000000000000000006"),
                token_pool_address: addr("0x4e6f8a0b1c3d5e7f9a1b3c4d6e8f0a2b4c5d6e7f"),
                network_name: "base-mainnet",
                decimals: 18,
                pool_type: PoolType::BurnMint,
            },
            TokenListing {
                symbol: "LINK",
                token_address: addr("0x88Fb150BDc53A65fe94Dea0c9BA0a6dAf8C6e196"),
                token_pool_address: addr("0x5f7a9b1c2d4e6f8a0b2c3d5e7f9a1b3c5d6e7f8a"),
                network_name: "base-mainnet",
                decimals: 18,
                pool_type: PoolType::BurnMint,
            },
        ],
    }
}

fn arbitrum_entry() -> DirectoryEntry {
    DirectoryEntry {
        chain_id: 42161,
        network_name: "arbitrum-mainnet",
        router_address: addr("0x141fa059441E0ca23ce184B6A78bafD2A517DdE8"),
        chain_selector: 4949039107694359620,
        risk_management_address: addr("0xa1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6e7f8a9b0"),
        token_admin_registry_address: addr("0x1c2d3e4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b9c0d"),
        fee_token_address: addr("0xf97f4df75117a78c1A5a0DBb814Af92458539FB4"), // LINK
        wrapped_native: addr("0x82aF49447D8a07e3bd95BD0d56f35241523fBab1"),    // WETH
        executor_address: addr("0x9f0a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6e7f80"),
        tokens: vec![
            TokenListing {
                symbol: "USDC",
                token_address: addr("0xaf88d065e77c8cC2239327C5EDb3A432268e5831"),
                token_pool_address: addr("0x6a8b0c2d3e5f7a9b1c3d4e6f8a0b2c4d5e7f8a9b"),
                network_name: "arbitrum-mainnet",
                decimals: 6,
                pool_type: PoolType::BurnMint,
            },
            TokenListing {
                symbol: "WETH",
                token_address: addr("0x82aF49447D8a07e3bd95BD0d56f35241523fBab1"),
                token_pool_address: addr("0x7b9c1d3e4f6a8b0c2d4e5f7a9b1c3d5e6f8a9b0c"),
                network_name: "arbitrum-mainnet",
                decimals: 18,
                pool_type: PoolType::BurnMint,
            },
            TokenListing {
                symbol: "LINK",
                token_address: addr("0xf97f4df75117a78c1A5a0DBb814Af92458539FB4"),
                token_pool_address: addr("0x8c0d2e4f5a7b9c1d3e5f6a8b0c2d4e6f7a9b0c1d"),
                network_name: "arbitrum-mainnet",
                decimals: 18,
                pool_type: PoolType::BurnMint,
            },
        ],
    }
}

fn optimism_entry() -> DirectoryEntry {
    DirectoryEntry {
        chain_id: 10,
        network_name: "optimism-mainnet",
        router_address: addr("0x3206695CaE29952f4b0c22a169725a865bc8Ce0f"),
        chain_selector: 3734403246176062136,
        risk_management_address: addr("0xb2c3d4e5f6a7b8c9d0e1f2a3b4c5d6e7f8a9b0c2"),
        token_admin_registry_address: addr("0x2d3e4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b9c0d1e"),
        fee_token_address: addr("0x350a791Bfc2C21F9Ed5d10980Dad2e2638ffa7f6"), // LINK
        wrapped_native: addr("0x4200000000000000000000000000000000000006"),
        executor_address: addr("0x0a1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6e7f8a90"),
        tokens: vec![
            TokenListing {
                symbol: "USDC",
                token_address: addr("0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85"),
                token_pool_address: addr("0x9d1e3f5a6b8c0d2e4f6a7b9c1d3e5f7a8b0c2d3e"),
                network_name: "optimism-mainnet",
                decimals: 6,
                pool_type: PoolType::BurnMint,
            },
            TokenListing {
                symbol: "LINK",
                token_address: addr("0x350a791Bfc2C21F9Ed5d10980Dad2e2638ffa7f6"),
                token_pool_address: addr("0x0e2f4a6b7c9d1e3f5a7b8c0d2e4f6a8b9c1d3e4f"),
                network_name: "optimism-mainnet",
                decimals: 18,
                pool_type: PoolType::BurnMint,
            },
        ],
    }
}

fn avalanche_entry() -> DirectoryEntry {
    DirectoryEntry {
        chain_id: 43114,
        network_name: "avalanche-mainnet",
        router_address: addr("0xF4c7E640EdA248ef95972845a62bdC74237805dB"),
        chain_selector: 6433500567565415381,
        risk_management_address: addr("0xc3d4e5f6a7b8c9d0e1f2a3b4c5d6e7f8a9b0c1d2"),
        token_admin_registry_address: addr("0x3e4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b9c0d1e2f"),
        fee_token_address: addr("0x5947BB275c521040051D82396192181b413227A3"), // LINK
        wrapped_native: addr("0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7"),    // WAVAX
        executor_address: addr("0x1b2c3d4e5f6a7b8c9d0e1f2a3b4c5d6e7f8a90a1"),
        tokens: vec![
            TokenListing {
                symbol: "USDC",
                token_address: addr("0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"),
                token_pool_address: addr("0x2f4a5b7c8d0e2f4a6b8c9d1e3f5a7b9c0d2e4f5a"),
                network_name: "avalanche-mainnet",
                decimals: 6,
                pool_type: PoolType::BurnMint,
            },
            TokenListing {
                symbol: "LINK",
                token_address: addr("0x5947BB275c521040051D82396192181b413227A3"),
                token_pool_address: addr("0x3a5b6c8d9e1f3a5b7c9d0e2f4a6b8c0d1e3f5a6b"),
                network_name: "avalanche-mainnet",
                decimals: 18,
                pool_type: PoolType::BurnMint,
            },
        ],
    }
}

impl TokenDirectory {
    /// The production directory snapshot
    pub fn mainnet() -> Self {
        Self::new(
            DIRECTORY_VERSION,
            vec![
                ethereum_entry(),
                base_entry(),
                arbitrum_entry(),
                optimism_entry(),
                avalanche_entry(),
            ],
        )
    }
}

// ============================================
// TESTS
// ============================================
