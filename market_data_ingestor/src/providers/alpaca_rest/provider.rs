use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use nonzero_ext::nonzero;
use reqwest::{Client, header};
use secrecy::{ExposeSecret, SecretString};
use shared_utils::env::get_env_var;
use snafu::ResultExt;
use tracing::debug;

use crate::{
    models::request_params::BarsRequest,
    providers::{
        ApiSnafu, BarPage, ClientBuildSnafu, DataProvider, InvalidApiKeySnafu,
        MissingCredentialSnafu, ProviderError, ProviderInitError, ReqwestSnafu,
        alpaca_rest::{
            params::{Feed, construct_params, validate_timeframe},
            response::AlpacaBarsResponse,
        },
    },
};

pub const DATA_URL: &str = "https://data.alpaca.markets";

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Key pair for the Alpaca APIs.
#[derive(Clone)]
pub struct AlpacaCredentials {
    pub api_key: SecretString,
    pub secret_key: SecretString,
}

impl AlpacaCredentials {
    /// Reads `APCA_API_KEY_ID` and `APCA_API_SECRET_KEY`.
    pub fn from_env() -> Result<Self, ProviderInitError> {
        let api_key = get_env_var("APCA_API_KEY_ID").context(MissingCredentialSnafu)?;
        let secret_key = get_env_var("APCA_API_SECRET_KEY").context(MissingCredentialSnafu)?;
        Ok(Self {
            api_key: SecretString::from(api_key),
            secret_key: SecretString::from(secret_key),
        })
    }
}

pub struct AlpacaProvider {
    client: Client,
    data_url: String,
    feed: Feed,
    limiter: Limiter,
}

impl AlpacaProvider {
    /// Creates a new Alpaca provider authenticated with `credentials`.
    ///
    /// Requests are throttled to 200 per minute, the free-plan allowance.
    pub fn new(credentials: &AlpacaCredentials) -> Result<Self, ProviderInitError> {
        let mut headers = header::HeaderMap::new();
        let mut key = header::HeaderValue::from_str(credentials.api_key.expose_secret())
            .context(InvalidApiKeySnafu)?;
        key.set_sensitive(true);
        let mut secret = header::HeaderValue::from_str(credentials.secret_key.expose_secret())
            .context(InvalidApiKeySnafu)?;
        secret.set_sensitive(true);
        headers.insert("APCA-API-KEY-ID", key);
        headers.insert("APCA-API-SECRET-KEY", secret);

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            data_url: DATA_URL.to_string(),
            feed: Feed::default(),
            limiter: RateLimiter::direct(Quota::per_minute(nonzero!(200u32))),
        })
    }

    /// Creates a provider from the `APCA_API_KEY_ID` and `APCA_API_SECRET_KEY`
    /// environment variables.
    pub fn from_env() -> Result<Self, ProviderInitError> {
        Self::new(&AlpacaCredentials::from_env()?)
    }

    /// Points the provider at another data host (e.g., a proxy).
    pub fn with_data_url(mut self, url: impl Into<String>) -> Self {
        self.data_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_feed(mut self, feed: Feed) -> Self {
        self.feed = feed;
        self
    }

    async fn fetch_page(
        &self,
        request: &BarsRequest,
        page_token: Option<&str>,
    ) -> Result<AlpacaBarsResponse, ProviderError> {
        let query = construct_params(request, self.feed, page_token)?;
        let url = format!("{}/v2/stocks/{}/bars", self.data_url, request.symbol);

        self.limiter.until_ready().await;
        debug!(symbol = %request.symbol, timeframe = %request.timeframe, "requesting bars");

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .context(ReqwestSnafu)?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown API error".to_string());
            return ApiSnafu {
                status: status.as_u16(),
                message,
            }
            .fail();
        }

        response
            .json::<AlpacaBarsResponse>()
            .await
            .context(ReqwestSnafu)
    }
}

#[async_trait]
impl DataProvider for AlpacaProvider {
    async fn get_bars(&self, request: BarsRequest) -> Result<BarPage, ProviderError> {
        validate_timeframe(&request.timeframe)?;
        let page = self.fetch_page(&request, None).await?.into_page()?;
        debug!(
            symbol = %request.symbol,
            rows = page.frame.len(),
            more = page.next_page_token.is_some(),
            "received bars"
        );
        Ok(page)
    }
}
