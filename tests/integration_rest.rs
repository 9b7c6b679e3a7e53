//! Integration tests for the REST snapshot endpoint.
//!
//! These tests run against Binance's public market data API. No credentials
//! are needed, but they hit the network, so they are skipped unless
//! `DEPTH_SYNC_LIVE` is set.
//!
//! # Running
//!
//! ```bash
//! DEPTH_SYNC_LIVE=1 cargo test --test integration_rest
//! ```
//!
//! Set `DEPTH_SYNC_TESTNET=1` as well to use the spot testnet instead.

use depth_sync::client::RestClient;
use depth_sync::config::Environment;
use depth_sync::orderbook::{OrderBook, SnapshotSource};
use depth_sync::{Config, Error};

/// Helper to create a config if live tests are enabled
fn create_config(symbol: &str) -> Option<Config> {
    std::env::var("DEPTH_SYNC_LIVE").ok()?;

    let environment = if std::env::var("DEPTH_SYNC_TESTNET").is_ok() {
        Environment::Testnet
    } else {
        Environment::Production
    };
    Some(Config::new(symbol).with_environment(environment))
}

/// Skip test if live tests are not enabled
macro_rules! require_live {
    ($symbol:expr) => {
        match create_config($symbol) {
            Some(c) => c,
            None => {
                eprintln!("Skipping test: DEPTH_SYNC_LIVE not set");
                return;
            }
        }
    };
}

#[tokio::test]
async fn test_get_depth() {
    let config = require_live!("BTCUSDT");
    let client = RestClient::new(&config).unwrap();

    let snapshot = client.get_depth("BTCUSDT", 100).await;
    assert!(snapshot.is_ok(), "Failed to get depth: {:?}", snapshot);

    let snapshot = snapshot.unwrap();
    println!(
        "Snapshot {}: {} bids, {} asks",
        snapshot.last_update_id,
        snapshot.bids.len(),
        snapshot.asks.len()
    );
    assert!(snapshot.last_update_id > 0);
    assert!(snapshot.bids.len() <= 100);
    assert!(snapshot.asks.len() <= 100);
}

#[tokio::test]
async fn test_snapshot_builds_uncrossed_book() {
    let config = require_live!("ETHUSDT").with_snapshot_limit(1000);
    let client = RestClient::new(&config).unwrap();

    let snapshot = client.fetch_snapshot(config.symbol()).await.unwrap();

    let mut book = OrderBook::new(config.symbol());
    book.set_snapshot(&snapshot.bids, &snapshot.asks, snapshot.last_update_id);

    assert!(!book.is_crossed());
    if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
        println!("Best bid {} / best ask {}", bid.price, ask.price);
        assert!(bid.price < ask.price);
    }
}

#[tokio::test]
async fn test_unknown_symbol_is_api_error() {
    let config = require_live!("BTCUSDT");
    let client = RestClient::new(&config).unwrap();

    let result = client.get_depth("NOTAREALPAIR", 5).await;
    match result {
        Err(Error::Api(err)) => {
            println!("API error: {:?}", err);
            assert!(err.is_client_error());
            assert!(err.code.is_some());
        }
        other => panic!("Expected API error, got {:?}", other),
    }
}
