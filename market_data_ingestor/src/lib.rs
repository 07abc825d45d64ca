//! Market-data feed side of the workspace.
//!
//! - [`models`]: raw bar record shapes (streamed and tabular), the timeframe model,
//!   and request parameters.
//! - [`providers`]: the [`providers::DataProvider`] trait and the Alpaca REST
//!   implementation.

pub mod models;
pub mod providers;
