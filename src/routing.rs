//! Routing / Yield Aggregator Client
//!
//! The external service that (a) reports yield opportunities for a token on
//! a chain and (b) quotes the on-chain path that converts an asset into a
//! position in a target protocol. Specified here only by interface; the
//! engine and discovery loop inject anything that implements [`YieldApi`].

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use eyre::{eyre, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Timeout for aggregator calls
const API_TIMEOUT_SECS: u64 = 10;

// ============================================
// REQUEST / RESPONSE TYPES
// ============================================

/// Query for yield-bearing records over exact underlying tokens
#[derive(Debug, Clone)]
pub struct TokenDataQuery {
    pub underlying_tokens_exact: Vec<Address>,
    pub chain_id: u64,
}

#[derive(Debug, Clone)]
pub struct UnderlyingToken {
    pub address: Address,
    pub symbol: String,
}

/// One yield-bearing token as reported by the aggregator
#[derive(Debug, Clone)]
pub struct TokenYieldRecord {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub apy: f64,
    pub tvl: f64,
    pub protocol_slug: String,
    pub name: String,
    pub icon: Option<String>,
    pub underlying_tokens: Vec<UnderlyingToken>,
}

/// Request for a swap/deposit route on the destination chain
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub chain_id: u64,
    pub from_address: Address,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub slippage_bps: u32,
    pub receiver: Address,
    pub spender: Address,
}

/// The transaction fragment a route quote wants executed
#[derive(Debug, Clone)]
pub struct RouteTx {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct RouteQuote {
    pub tx: RouteTx,
    pub price_impact: f64,
    pub amount_out: U256,
}

// ============================================
// TRAIT SEAM
// ============================================

/// The routing/yield aggregator collaborator
#[async_trait]
pub trait YieldApi: Send + Sync {
    /// Yield records whose underlying tokens match the query exactly
    async fn get_token_data(&self, query: &TokenDataQuery) -> Result<Vec<TokenYieldRecord>>;

    /// Best on-chain path converting `token_in` into `token_out`
    async fn route(&self, request: &RouteRequest) -> Result<RouteQuote>;
}

// ============================================
// HTTP IMPLEMENTATION
// ============================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenDataBody {
    underlying_tokens_exact: Vec<String>,
    chain_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnderlyingTokenDto {
    address: String,
    symbol: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenYieldRecordDto {
    address: String,
    symbol: String,
    decimals: u8,
    apy: f64,
    tvl: f64,
    protocol_slug: String,
    name: String,
    icon: Option<String>,
    #[serde(default)]
    underlying_tokens: Vec<UnderlyingTokenDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RouteBody {
    chain_id: u64,
    from_address: String,
    token_in: String,
    token_out: String,
    amount_in: String,
    slippage_bps: u32,
    receiver: String,
    spender: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteTxDto {
    to: String,
    value: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteQuoteDto {
    tx: RouteTxDto,
    price_impact: f64,
    amount_out: String,
}

fn parse_address(s: &str, context: &str) -> Result<Address> {
    Address::from_str(s).map_err(|e| eyre!("bad {} address '{}': {}", context, s, e))
}

fn parse_u256(s: &str, context: &str) -> Result<U256> {
    let trimmed = s.trim_start_matches("0x");
    if s.starts_with("0x") {
        U256::from_str_radix(trimmed, 16)
    } else {
        U256::from_str_radix(trimmed, 10)
    }
    .map_err(|e| eyre!("bad {} amount '{}': {}", context, s, e))
}

/// HTTP client against the yield/routing aggregator
#[derive(Clone)]
pub struct HttpYieldApi {
    http_client: Client,
    base_url: String,
}

impl HttpYieldApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl YieldApi for HttpYieldApi {
    async fn get_token_data(&self, query: &TokenDataQuery) -> Result<Vec<TokenYieldRecord>> {
        let url = format!("{}/v1/tokens", self.base_url);
        let body = TokenDataBody {
            underlying_tokens_exact: query
                .underlying_tokens_exact
                .iter()
                .map(|a| format!("{:?}", a))
                .collect(),
            chain_id: query.chain_id,
        };

        debug!(
            "Fetching token data for chain {} ({} underlying filters)",
            query.chain_id,
            body.underlying_tokens_exact.len()
        );

        let response = self.http_client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(eyre!(
                "yield service returned {} for chain {}",
                response.status(),
                query.chain_id
            ));
        }

        let dtos: Vec<TokenYieldRecordDto> = response.json().await?;
        let mut records = Vec::with_capacity(dtos.len());
        for dto in dtos {
            let mut underlying = Vec::with_capacity(dto.underlying_tokens.len());
            for u in dto.underlying_tokens {
                underlying.push(UnderlyingToken {
                    address: parse_address(&u.address, "underlying token")?,
                    symbol: u.symbol,
                });
            }
            records.push(TokenYieldRecord {
                address: parse_address(&dto.address, "token")?,
                symbol: dto.symbol,
                decimals: dto.decimals,
                apy: dto.apy,
                tvl: dto.tvl,
                protocol_slug: dto.protocol_slug,
                name: dto.name,
                icon: dto.icon,
                underlying_tokens: underlying,
            });
        }

        Ok(records)
    }

    async fn route(&self, request: &RouteRequest) -> Result<RouteQuote> {
        let url = format!("{}/v1/route", self.base_url);
        let body = RouteBody {
            chain_id: request.chain_id,
            from_address: format!("{:?}", request.from_address),
            token_in: format!("{:?}", request.token_in),
            token_out: format!("{:?}", request.token_out),
            amount_in: request.amount_in.to_string(),
            slippage_bps: request.slippage_bps,
            receiver: format!("{:?}", request.receiver),
            spender: format!("{:?}", request.spender),
        };

        let response = self.http_client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(eyre!(
                "routing service returned {} for chain {}",
                response.status(),
                request.chain_id
            ));
        }

        let dto: RouteQuoteDto = response.json().await?;
        let data = hex::decode(dto.tx.data.trim_start_matches("0x"))
            .map_err(|e| eyre!("bad route calldata: {}", e))?;

        Ok(RouteQuote {
            tx: RouteTx {
                to: parse_address(&dto.tx.to, "route target")?,
                value: parse_u256(&dto.tx.value, "route value")?,
                data: Bytes::from(data),
            },
            price_impact: dto.price_impact,
            amount_out: parse_u256(&dto.amount_out, "route output")?,
        })
    }
}

// ============================================
// TESTS
// ============================================
