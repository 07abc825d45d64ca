//! Alpaca market data REST API (v2 stock bars).

pub mod params;
pub mod provider;
pub mod response;
