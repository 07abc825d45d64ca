//! Provider abstraction for market data sources.
//!
//! This module defines the [`DataProvider`] trait, a unified interface for fetching
//! one page of historical bars from a market data vendor. Each concrete provider
//! handles its vendor-specific API logic and validation and hands back a raw
//! [`BarFrame`]; schema mapping happens downstream.
//!
//! The trait is async and object safe, so callers can hold an `Arc<dyn DataProvider>`
//! and pick the vendor at runtime.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use market_data_ingestor::models::{bar_frame::BarFrame, request_params::BarsRequest};
//! use market_data_ingestor::providers::{BarPage, DataProvider, ProviderError};
//!
//! struct MyProvider;
//!
//! #[async_trait]
//! impl DataProvider for MyProvider {
//!     async fn get_bars(&self, _request: BarsRequest) -> Result<BarPage, ProviderError> {
//!         Ok(BarPage::last(BarFrame::indexed(["open", "close"])))
//!     }
//! }
//! ```

pub mod alpaca_rest;

use async_trait::async_trait;
use shared_utils::env::MissingEnvVarError;
use snafu::{Backtrace, Snafu};

use crate::models::{bar_frame::BarFrame, request_params::BarsRequest};

/// One page of bars returned by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct BarPage {
    pub frame: BarFrame,
    /// Set when the provider has more rows for the same request.
    pub next_page_token: Option<String>,
}

impl BarPage {
    /// A page with nothing after it.
    pub fn last(frame: BarFrame) -> Self {
        Self {
            frame,
            next_page_token: None,
        }
    }
}

/// Trait for fetching historical bars from a market data provider.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Fetches a single page of bars for one symbol.
    ///
    /// # Returns
    ///
    /// * `Ok(BarPage)` - The bars, oldest first, plus a continuation token if the
    ///   provider truncated the result at `request.limit`.
    /// * `Err(ProviderError)` - Transport, API, or validation failure.
    async fn get_bars(&self, request: BarsRequest) -> Result<BarPage, ProviderError>;
}

/// Errors that can occur during the creation of a provider instance.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// A credential was neither configured nor present in the environment.
    #[snafu(display("Missing credential: {source}"))]
    MissingCredential {
        source: MissingEnvVarError,
        backtrace: Backtrace,
    },

    /// Failed to init the reqwest client.
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// API key contains characters that are not valid in a header.
    #[snafu(display("Invalid API key format: {source}"))]
    InvalidApiKey {
        source: reqwest::header::InvalidHeaderValue,
        backtrace: Backtrace,
    },
}

/// Errors that can occur within a `DataProvider` implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    /// Network failure, timeout, or undecodable body.
    #[snafu(display("API request failed: {source}"))]
    Reqwest {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The provider's API answered with a non-success status.
    #[snafu(display("API error ({status}): {message}"))]
    Api {
        status: u16,
        message: String,
        backtrace: Backtrace,
    },

    /// The request parameters were invalid for this specific provider.
    #[snafu(display("Invalid parameters for provider: {message}"))]
    Validation {
        message: String,
        backtrace: Backtrace,
    },

    /// The provider returned data it could not turn into a frame.
    #[snafu(display("Internal provider error: {message}"))]
    Internal {
        message: String,
        backtrace: Backtrace,
    },
}

impl ProviderError {
    /// Transport failures, rate limiting and 5xx answers are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Reqwest { source, .. } => source.is_timeout() || source.is_connect(),
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Validation { .. } | ProviderError::Internal { .. } => false,
        }
    }
}
