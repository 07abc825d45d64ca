mod common;

use std::sync::Arc;

use common::{frame, sqlite_store, writer};
use market_data_ingestor::models::bar::StreamBar;
use ohlcv_sync::{
    config::load_config_str,
    engine::{EngineSettings, SeriesEngine, open_store},
    locks::KeyLocks,
    query::SeriesQuery,
    store::{MemoryStore, SharedStore},
    trim::{RetentionPolicy, RetentionTrimmer},
};

async fn write_query_trim(store: SharedStore) {
    let w = writer(Arc::clone(&store));
    let res = w.write_batch("TEST", "1Min", &frame(&[100, 200, 300])).await.unwrap();
    assert_eq!(res.key, "TEST/1Min/OHLCV");
    assert_eq!(res.rows_written, 3);

    let query = SeriesQuery::new(Arc::clone(&store));
    let bars = query.query("TEST", "1Min", None, None).await.unwrap();
    assert_eq!(bars.iter().map(|b| b.epoch).collect::<Vec<_>>(), [100, 200, 300]);
    assert!((bars[0].open - 10.0).abs() < 1e-4);
    assert!((bars[2].close - 12.5).abs() < 1e-4);
    assert_eq!(bars[1].volume, 1_000);

    let trimmer = RetentionTrimmer::new(Arc::clone(&store), Arc::new(KeyLocks::new()));
    let report = trimmer
        .trim(&RetentionPolicy::new().with("1Min", 2))
        .await
        .unwrap();
    assert_eq!(report.examined, 1);
    assert_eq!(report.trimmed.len(), 1);
    assert_eq!((report.trimmed[0].before, report.trimmed[0].after), (3, 2));

    let bars = query.query("TEST", "1Min", None, None).await.unwrap();
    assert_eq!(bars.iter().map(|b| b.epoch).collect::<Vec<_>>(), [200, 300]);
    assert!((bars[0].open - 11.0).abs() < 1e-4);

    let bounded = query.query("TEST", "1Min", Some(250), None).await.unwrap();
    assert_eq!(bounded.len(), 1);
}

#[tokio::test]
async fn memory_store_write_query_trim() {
    write_query_trim(MemoryStore::shared()).await;
}

#[tokio::test]
async fn sqlite_store_write_query_trim() {
    let (_dir, store) = sqlite_store();
    write_query_trim(Arc::new(store)).await;
}

#[tokio::test]
async fn stream_bars_round_trip_within_f32_tolerance() {
    let engine = SeriesEngine::connect(MemoryStore::shared(), EngineSettings::default())
        .await
        .unwrap();
    let bar: StreamBar = serde_json::from_str(
        r#"{"S":"AAPL","t":"2021-02-22T19:15:00Z","o":388.985,"h":389.13,
            "l":388.975,"c":389.12,"v":49378,"vw":389.062639,"n":461}"#,
    )
    .unwrap();

    engine.write_stream(&bar).await.unwrap();
    let bars = engine.query("AAPL", "1Min", None, None).await.unwrap();

    assert_eq!(bars.len(), 1);
    let got = bars[0];
    assert_eq!(got.epoch, bar.timestamp.timestamp());
    for (stored, sent) in [
        (got.open, bar.open),
        (got.high, bar.high),
        (got.low, bar.low),
        (got.close, bar.close),
    ] {
        assert!((f64::from(stored) - sent).abs() < 1e-3, "{stored} vs {sent}");
    }
    assert_eq!(got.volume, 49_378);
}

#[tokio::test]
async fn missing_series_queries_empty() {
    let query = SeriesQuery::new(MemoryStore::shared());
    assert!(query.query("NOPE", "1D", None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn clear_destroys_listed_timeframes_only() {
    let store = MemoryStore::shared();
    let engine = SeriesEngine::connect(store.clone(), EngineSettings::default())
        .await
        .unwrap();
    engine.write_batch("SPY", "1D", &frame(&[1, 2])).await.unwrap();
    engine.write_batch("SPY", "1Min", &frame(&[1, 2])).await.unwrap();
    engine.write_batch("QQQ", "1D", &frame(&[1])).await.unwrap();

    let cleared = engine.clear(&["1D".to_string()]).await.unwrap();

    assert_eq!(cleared, ["QQQ/1D/OHLCV", "SPY/1D/OHLCV"]);
    assert_eq!(store.keys(), ["SPY/1Min/OHLCV"]);
}

#[tokio::test]
async fn close_and_volume_schema_writes_and_queries() {
    let cfg = load_config_str(
        r#"
        [store]
        backend = "memory"

        [schema]
        fields = [
            { name = "Epoch", type = "i8" },
            { name = "Close", type = "f8" },
            { name = "Volume", type = "i8" },
        ]
        "#,
    )
    .unwrap();
    let engine = SeriesEngine::connect(
        open_store(&cfg).unwrap(),
        EngineSettings::from_config(&cfg).unwrap(),
    )
    .await
    .unwrap();

    let res = engine.write_batch("TEST", "1Min", &frame(&[100, 200])).await.unwrap();
    assert_eq!(res.rows_written, 2);

    let bars = engine.query("TEST", "1Min", None, None).await.unwrap();
    assert_eq!(bars.iter().map(|b| b.epoch).collect::<Vec<_>>(), [100, 200]);
    assert_eq!(bars[1].close, 11.5);
    assert_eq!((bars[1].open, bars[1].high, bars[1].low, bars[1].vwap), (11.5, 11.5, 11.5, 11.5));
    assert_eq!(bars[0].volume, 1_000);
    assert_eq!(bars[0].trade_count, None);
}
