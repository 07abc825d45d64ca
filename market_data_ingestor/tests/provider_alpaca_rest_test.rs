#![cfg(test)]
use chrono::{Duration, Utc};
use market_data_ingestor::{
    models::{
        request_params::{Adjustment, BarsRequest},
        timeframe::TimeFrame,
    },
    providers::{DataProvider, ProviderError, alpaca_rest::provider::AlpacaProvider},
};
use serial_test::serial;

fn provider() -> Option<AlpacaProvider> {
    dotenvy::dotenv().ok();
    match AlpacaProvider::from_env() {
        Ok(p) => Some(p),
        Err(e) => {
            println!("Skipping live Alpaca test: {e}");
            None
        }
    }
}

#[tokio::test]
#[serial]
#[ignore]
async fn fetches_a_single_page_of_daily_bars() {
    let Some(provider) = provider() else { return };

    let request = BarsRequest {
        symbol: "AAPL".to_string(),
        timeframe: TimeFrame::days(1).unwrap(),
        start: Utc::now() - Duration::days(30),
        end: Some(Utc::now() - Duration::days(1)),
        limit: 5,
        adjustment: Adjustment::Raw,
    };

    let page = provider
        .get_bars(request)
        .await
        .expect("get_bars returned an error");

    assert!(!page.frame.is_empty(), "expected at least one bar for AAPL");
    assert!(page.frame.len() <= 5, "expected at most 5 bars due to limit");
    assert!(page.next_page_token.is_some(), "30 days of bars exceed one page of 5");

    let stamps: Vec<_> = page.frame.rows().filter_map(|r| r.index()).collect();
    assert!(stamps.windows(2).all(|w| w[0] < w[1]), "bars must be ascending");
}

#[tokio::test]
#[serial]
#[ignore]
async fn unsupported_timeframe_fails_before_any_request() {
    let Some(provider) = provider() else { return };

    let request = BarsRequest {
        symbol: "AAPL".to_string(),
        timeframe: TimeFrame::days(2).unwrap(),
        start: Utc::now() - Duration::days(30),
        end: None,
        limit: 10,
        adjustment: Adjustment::Raw,
    };

    let err = provider.get_bars(request).await.unwrap_err();
    assert!(matches!(err, ProviderError::Validation { .. }));
}
