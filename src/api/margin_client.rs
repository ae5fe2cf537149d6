//! Binance cross-margin REST client.
//!
//! Signed endpoints follow the exchange's HMAC-SHA256 scheme: the query
//! string (including a millisecond timestamp) is signed with the API secret
//! and the signature appended as the final parameter.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tracing::debug;

use crate::models::{AccountSnapshot, AssetBalance, Side};

use super::types::*;
use super::{ApiError, ExchangeApi, UNKNOWN_SYMBOL_CODE};

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const RECV_WINDOW_MS: u32 = 5_000;

type HmacSha256 = Hmac<Sha256>;

/// REST client for the Binance cross-margin endpoints.
pub struct BinanceMarginClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl BinanceMarginClient {
    /// Create a new client with default settings.
    pub fn new(api_key: &str, api_secret: &str) -> Result<Self, ApiError> {
        Self::with_base_url(api_key, api_secret, DEFAULT_BASE_URL.to_string())
    }

    /// Create with a custom base URL (for testing).
    pub fn with_base_url(
        api_key: &str,
        api_secret: &str,
        base_url: String,
    ) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;

        Ok(Self {
            http,
            base_url,
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        })
    }

    /// HMAC-SHA256 of the query string, hex-encoded.
    fn sign(secret: &str, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn build_query(params: &[(&str, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Call an endpoint that needs the API key header but no signature.
    async fn keyed_request<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let mut url = format!("{}{}", self.base_url, path);
        if !params.is_empty() {
            url = format!("{}?{}", url, Self::build_query(params));
        }

        debug!(url = %url, "exchange request");

        let response = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        Self::decode_response(response).await
    }

    /// Call a signed endpoint. Binance accepts parameters in the query
    /// string for both GET and POST.
    async fn signed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let mut all: Vec<(&str, String)> = params.to_vec();
        let timestamp = Utc::now().timestamp_millis().to_string();
        let recv_window = RECV_WINDOW_MS.to_string();
        all.push(("recvWindow", recv_window));
        all.push(("timestamp", timestamp));

        let query = Self::build_query(&all);
        let signature = Self::sign(&self.api_secret, &query);
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        debug!(path = %path, method = %method, "signed exchange request");

        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        Self::decode_response(response).await
    }

    /// Map the response to the expected type, or to the exchange's typed
    /// rejection when the status is an error.
    async fn decode_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(err) => Err(ApiError::rejected(err.code, err.msg)),
                Err(_) => Err(ApiError::Decode(format!("{}: {}", status, body))),
            };
        }

        serde_json::from_str(&body).map_err(|e| ApiError::Decode(format!("{}: {}", e, body)))
    }
}

#[async_trait]
impl ExchangeApi for BinanceMarginClient {
    async fn symbol_info(&self, pair: &str) -> Result<SymbolInfo, ApiError> {
        let info: ExchangeInfo = self
            .keyed_request("/api/v3/exchangeInfo", &[("symbol", pair.to_string())])
            .await?;

        info.symbols
            .into_iter()
            .find(|s| s.symbol == pair)
            .ok_or_else(|| ApiError::rejected(UNKNOWN_SYMBOL_CODE, "Invalid symbol."))
    }

    async fn margin_account(&self) -> Result<AccountSnapshot, ApiError> {
        let account: MarginAccountResponse = self
            .signed_request(Method::GET, "/sapi/v1/margin/account", &[])
            .await?;

        let balances: HashMap<String, AssetBalance> = account
            .user_assets
            .into_iter()
            .map(|a| {
                (
                    a.asset,
                    AssetBalance {
                        free: a.free,
                        borrowed: a.borrowed,
                    },
                )
            })
            .collect();

        Ok(AccountSnapshot::new(balances))
    }

    async fn price_index(&self, pair: &str) -> Result<Decimal, ApiError> {
        let index: PriceIndex = self
            .keyed_request("/sapi/v1/margin/priceIndex", &[("symbol", pair.to_string())])
            .await?;

        Ok(index.price)
    }

    async fn max_loan(&self, asset: &str) -> Result<Decimal, ApiError> {
        let max: MaxBorrowable = self
            .signed_request(
                Method::GET,
                "/sapi/v1/margin/maxBorrowable",
                &[("asset", asset.to_string())],
            )
            .await?;

        Ok(max.amount)
    }

    async fn create_loan(&self, asset: &str, amount: Decimal) -> Result<(), ApiError> {
        let tx: MarginTransaction = self
            .signed_request(
                Method::POST,
                "/sapi/v1/margin/loan",
                &[
                    ("asset", asset.to_string()),
                    ("amount", amount.normalize().to_string()),
                ],
            )
            .await?;

        debug!(asset = %asset, amount = %amount, tran_id = tx.tran_id, "margin loan created");
        Ok(())
    }

    async fn repay_loan(&self, asset: &str, amount: Decimal) -> Result<(), ApiError> {
        let tx: MarginTransaction = self
            .signed_request(
                Method::POST,
                "/sapi/v1/margin/repay",
                &[
                    ("asset", asset.to_string()),
                    ("amount", amount.normalize().to_string()),
                ],
            )
            .await?;

        debug!(asset = %asset, amount = %amount, tran_id = tx.tran_id, "margin loan repaid");
        Ok(())
    }

    async fn market_order(
        &self,
        pair: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<MarginOrder, ApiError> {
        self.signed_request(
            Method::POST,
            "/sapi/v1/margin/order",
            &[
                ("symbol", pair.to_string()),
                ("side", side.as_str().to_string()),
                ("type", "MARKET".to_string()),
                ("quantity", quantity.normalize().to_string()),
                ("newOrderRespType", "FULL".to_string()),
            ],
        )
        .await
    }
}
