//! Protocol Yield Discovery
//!
//! Queries the yield aggregator for lending/yield positions over one or many
//! (token, chain) pairs. The multi-chain loop is deliberately sequential with
//! a fixed inter-request delay - the upstream is rate limited and this is
//! throttling, not parallelism. A single pair failing is logged and skipped;
//! discovery continues with the remaining pairs.

use alloy_primitives::Address;
use eyre::Result;
use lazy_static::lazy_static;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::directory::TokenDirectory;
use crate::routing::{TokenDataQuery, UnderlyingToken, YieldApi};

lazy_static! {
    /// Protocol families we trust enough to deploy into. Anything else the
    /// aggregator reports is silently dropped.
    static ref KNOWN_PROTOCOL_FAMILIES: Vec<&'static str> = vec![
        "aave",
        "compound",
        "morpho",
        "moonwell",
        "spark",
        "fluid",
        "radiant",
        "venus",
        "benqi",
    ];
}

/// Sentinel address the aggregator uses for the chain's native asset
fn native_asset_sentinel() -> Address {
    Address::from_str("0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE").unwrap()
}

/// A yield opportunity. Transient - created per discovery call, never
/// persisted; apy/tvl are point-in-time snapshots.
#[derive(Debug, Clone)]
pub struct Protocol {
    pub id: String,
    pub name: String,
    pub apy: f64,
    pub tvl: f64,
    pub chain_id: u64,
    pub token_address: Address,
    pub decimals: u8,
    pub protocol_slug: String,
    pub underlying_tokens: Vec<UnderlyingToken>,
}

/// Discovery tuning knobs
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Delay inserted between successive per-chain requests
    pub delay_ms: u64,

    /// Positions below this TVL are dropped as thin liquidity
    pub min_tvl_usd: f64,

    /// TTL for cached per-pair results
    pub cache_ttl_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1_000,
            min_tvl_usd: 1_000_000.0,
            cache_ttl_secs: 120,
        }
    }
}

/// Sequential multi-chain yield discovery over an injected aggregator client
pub struct DiscoveryService<Y: YieldApi> {
    yield_api: Y,
    directory: Arc<TokenDirectory>,
    config: DiscoveryConfig,
    cache: RwLock<TtlCache<(Address, u64), Vec<Protocol>>>,
    /// Single-flight guard for the multi-chain loop. A second run while one
    /// is active is a no-op, not queued and not an error.
    in_flight: Mutex<()>,
}

impl<Y: YieldApi> DiscoveryService<Y> {
    pub fn new(yield_api: Y, directory: Arc<TokenDirectory>, config: DiscoveryConfig) -> Self {
        Self::with_clock(yield_api, directory, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        yield_api: Y,
        directory: Arc<TokenDirectory>,
        config: DiscoveryConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ttl = Duration::from_secs(config.cache_ttl_secs);
        Self {
            yield_api,
            directory,
            config,
            cache: RwLock::new(TtlCache::new(ttl, clock)),
            in_flight: Mutex::new(()),
        }
    }

    /// Discover yield positions for one (token, chain) pair.
    ///
    /// For the chain's wrapped native asset, both the wrapped address and the
    /// native sentinel are passed as underlying filters. Results outside the
    /// protocol allow-list, below the TVL floor, or with non-positive APY are
    /// dropped without error.
    pub async fn discover_single(&self, token: Address, chain_id: u64) -> Result<Vec<Protocol>> {
        if let Some(cached) = self.cache.read().await.get(&(token, chain_id)) {
            debug!("Cache hit for {:?} on chain {}", token, chain_id);
            return Ok(cached);
        }

        let mut underlying = vec![token];
        if let Some(entry) = self.directory.entry(chain_id) {
            if entry.wrapped_native == token {
                underlying.push(native_asset_sentinel());
            }
        }

        let query = TokenDataQuery {
            underlying_tokens_exact: underlying,
            chain_id,
        };

        let records = self.yield_api.get_token_data(&query).await?;
        let total = records.len();

        let protocols: Vec<Protocol> = records
            .into_iter()
            .filter(|r| {
                is_known_protocol(&r.name) && r.tvl > self.config.min_tvl_usd && r.apy > 0.0
            })
            .map(|r| Protocol {
                id: format!("{}-{}-{:?}", r.protocol_slug, chain_id, r.address),
                name: r.name,
                apy: r.apy,
                tvl: r.tvl,
                chain_id,
                token_address: r.address,
                decimals: r.decimals,
                protocol_slug: r.protocol_slug,
                underlying_tokens: r.underlying_tokens,
            })
            .collect();

        debug!(
            "Chain {}: kept {}/{} yield records for {:?}",
            chain_id,
            protocols.len(),
            total,
            token
        );

        self.cache
            .write()
            .await
            .insert((token, chain_id), protocols.clone());

        Ok(protocols)
    }

    /// Discover across many pairs, strictly sequentially.
    ///
    /// Results are deduplicated by (name, chain_id) keeping the first
    /// occurrence, then sorted by APY descending. Per-pair failures are
    /// logged and skipped. If another multi-chain run is already in flight
    /// this returns an empty vec immediately.
    pub async fn discover(&self, pairs: &[(Address, u64)]) -> Vec<Protocol> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("Discovery already in flight, ignoring duplicate run");
            return Vec::new();
        };

        let mut collected: Vec<Protocol> = Vec::new();

        for (i, (token, chain_id)) in pairs.iter().enumerate() {
            if i > 0 && self.config.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
            }

            match self.discover_single(*token, *chain_id).await {
                Ok(protocols) => collected.extend(protocols),
                Err(e) => {
                    warn!(
                        "Discovery failed for {:?} on chain {} (skipping): {}",
                        token, chain_id, e
                    );
                }
            }
        }

        let mut seen: HashSet<(String, u64)> = HashSet::new();
        let mut deduped: Vec<Protocol> = Vec::with_capacity(collected.len());
        for protocol in collected {
            if seen.insert((protocol.name.clone(), protocol.chain_id)) {
                deduped.push(protocol);
            }
        }

        deduped.sort_by(|a, b| b.apy.partial_cmp(&a.apy).unwrap_or(std::cmp::Ordering::Equal));

        info!(
            "🔍 Discovery complete: {} protocols across {} pairs",
            deduped.len(),
            pairs.len()
        );

        deduped
    }

    /// Cross-chain mode: resolve every destination candidate for a source
    /// token, then discover over the source pair plus each candidate.
    pub async fn discover_routes(&self, source_chain_id: u64, token: Address) -> Vec<Protocol> {
        let mut pairs = vec![(token, source_chain_id)];
        for candidate in self.directory.resolve_routes(source_chain_id, &token) {
            pairs.push((candidate.token_address, candidate.chain_id));
        }
        self.discover(&pairs).await
    }
}

fn is_known_protocol(name: &str) -> bool {
    let lower = name.to_lowercase();
    KNOWN_PROTOCOL_FAMILIES.iter().any(|f| lower.contains(f))
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{RouteQuote, RouteRequest, TokenDataQuery, TokenYieldRecord};
    use async_trait::async_trait;
    use eyre::eyre;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn test_config() -> DiscoveryConfig {
        DiscoveryConfig {
            delay_ms: 0,
            min_tvl_usd: 1_000_000.0,
            cache_ttl_secs: 120,
        }
    }

    fn record(name: &str, apy: f64, tvl: f64) -> TokenYieldRecord {
        TokenYieldRecord {
            address: Address::repeat_byte(0x11),
            symbol: "aTEST".to_string(),
            decimals: 6,
            apy,
            tvl,
            protocol_slug: name.to_lowercase().replace(' ', "-"),
            name: name.to_string(),
            icon: None,
            underlying_tokens: vec![],
        }
    }

    /// Aggregator double: canned records per chain, optional failing chains,
    /// request log for call-shape assertions.
    struct MockYieldApi {
        responses: StdMutex<std::collections::HashMap<u64, Vec<TokenYieldRecord>>>,
        failing_chains: Vec<u64>,
        calls: AtomicUsize,
        queries: StdMutex<Vec<TokenDataQuery>>,
    }

    impl MockYieldApi {
        fn new() -> Self {
            Self {
                responses: StdMutex::new(std::collections::HashMap::new()),
                failing_chains: Vec::new(),
                calls: AtomicUsize::new(0),
                queries: StdMutex::new(Vec::new()),
            }
        }

        fn with_response(self, chain_id: u64, records: Vec<TokenYieldRecord>) -> Self {
            self.responses.lock().unwrap().insert(chain_id, records);
            self
        }

        fn failing_on(mut self, chain_id: u64) -> Self {
            self.failing_chains.push(chain_id);
            self
        }
    }

    #[async_trait]
    impl YieldApi for MockYieldApi {
        async fn get_token_data(&self, query: &TokenDataQuery) -> Result<Vec<TokenYieldRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.clone());

            if self.failing_chains.contains(&query.chain_id) {
                return Err(eyre!("upstream 429 for chain {}", query.chain_id));
            }
            Ok(self
                .responses
                .lock()
                .unwrap()
                .get(&query.chain_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn route(&self, _request: &RouteRequest) -> Result<RouteQuote> {
            unimplemented!("not used by discovery")
        }
    }

    fn service(api: MockYieldApi) -> DiscoveryService<MockYieldApi> {
        DiscoveryService::new(api, Arc::new(TokenDirectory::mainnet()), test_config())
    }

    #[tokio::test]
    async fn test_filters_unknown_thin_and_zero_apy() {
        let api = MockYieldApi::new().with_response(
            8453,
            vec![
                record("Aave V3", 4.2, 50_000_000.0),
                record("RugFarm 9000", 950.0, 80_000_000.0), // unknown family
                record("Compound V3", 3.1, 500_000.0),       // thin liquidity
                record("Moonwell", 0.0, 20_000_000.0),       // zero apy
            ],
        );
        let svc = service(api);

        let protocols = svc
            .discover_single(Address::repeat_byte(0xaa), 8453)
            .await
            .unwrap();

        assert_eq!(protocols.len(), 1);
        assert_eq!(protocols[0].name, "Aave V3");
        assert_eq!(protocols[0].chain_id, 8453);
    }

    #[tokio::test]
    async fn test_wrapped_native_adds_sentinel_filter() {
        let api = MockYieldApi::new().with_response(8453, vec![]);
        let svc = service(api);

        // Base WETH
        let weth = Address::from_str("0x4200000000000000000000000000000000000006").unwrap();
        svc.discover_single(weth, 8453).await.unwrap();

        let queries = svc.yield_api.queries.lock().unwrap();
        assert_eq!(queries[0].underlying_tokens_exact.len(), 2);
        assert_eq!(queries[0].underlying_tokens_exact[1], native_asset_sentinel());
    }

    #[tokio::test]
    async fn test_single_result_is_cached() {
        let api = MockYieldApi::new()
            .with_response(8453, vec![record("Aave V3", 4.0, 10_000_000.0)]);
        let svc = service(api);
        let token = Address::repeat_byte(0xbb);

        svc.discover_single(token, 8453).await.unwrap();
        svc.discover_single(token, 8453).await.unwrap();

        assert_eq!(svc.yield_api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_one_failing_pair_does_not_abort_loop() {
        let api = MockYieldApi::new()
            .with_response(1, vec![record("Aave V3", 2.0, 10_000_000.0)])
            .with_response(42161, vec![record("Compound V3", 5.0, 10_000_000.0)])
            .failing_on(8453);
        let svc = service(api);

        let pairs = vec![
            (Address::repeat_byte(0x01), 1),
            (Address::repeat_byte(0x02), 8453),
            (Address::repeat_byte(0x03), 42161),
        ];
        let protocols = svc.discover(&pairs).await;

        assert_eq!(protocols.len(), 2);
        assert!(protocols.iter().any(|p| p.chain_id == 1));
        assert!(protocols.iter().any(|p| p.chain_id == 42161));
        // all three pairs were attempted
        assert_eq!(svc.yield_api.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dedup_keeps_first_and_sorts_by_apy_desc() {
        let api = MockYieldApi::new()
            .with_response(
                1,
                vec![
                    record("Aave V3", 2.0, 10_000_000.0),
                    record("Spark", 6.5, 10_000_000.0),
                ],
            )
            .with_response(42161, vec![record("Compound V3", 5.0, 10_000_000.0)]);
        let svc = service(api);

        let pairs = vec![
            (Address::repeat_byte(0x01), 1),
            (Address::repeat_byte(0x02), 42161),
        ];

        let first = svc.discover(&pairs).await;
        let second = svc.discover(&pairs).await;

        let keys = |ps: &[Protocol]| -> Vec<(String, u64)> {
            ps.iter().map(|p| (p.name.clone(), p.chain_id)).collect()
        };

        // idempotent under dedup, identically sorted
        assert_eq!(keys(&first), keys(&second));
        assert_eq!(
            keys(&first),
            vec![
                ("Spark".to_string(), 1),
                ("Compound V3".to_string(), 42161),
                ("Aave V3".to_string(), 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_name_chain_pairs_collapse() {
        let api = MockYieldApi::new().with_response(
            1,
            vec![
                record("Aave V3", 2.0, 10_000_000.0),
                record("Aave V3", 9.0, 10_000_000.0),
            ],
        );
        let svc = service(api);

        let protocols = svc.discover(&[(Address::repeat_byte(0x01), 1)]).await;

        assert_eq!(protocols.len(), 1);
        // first occurrence wins
        assert_eq!(protocols[0].apy, 2.0);
    }

    #[tokio::test]
    async fn test_concurrent_discover_is_noop() {
        let api = MockYieldApi::new().with_response(1, vec![record("Aave V3", 2.0, 10_000_000.0)]);
        let svc = service(api);

        let _held = svc.in_flight.lock().await;
        let protocols = svc.discover(&[(Address::repeat_byte(0x01), 1)]).await;

        assert!(protocols.is_empty());
        assert_eq!(svc.yield_api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_discover_routes_fans_out_over_candidates() {
        let api = MockYieldApi::new()
            .with_response(8453, vec![])
            .with_response(1, vec![])
            .with_response(42161, vec![])
            .with_response(10, vec![])
            .with_response(43114, vec![]);
        let svc = service(api);

        // Base USDC routes to the four other chains in the mainnet snapshot
        let usdc = Address::from_str("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913").unwrap();
        svc.discover_routes(8453, usdc).await;

        assert_eq!(svc.yield_api.calls.load(Ordering::SeqCst), 5);
    }
}
