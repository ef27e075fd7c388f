//! Determinism tests for the book cache
//!
//! The same journal replayed twice must publish the same books, and a gap
//! in the update ids must never leak a half-synced book to readers.

use std::io::Write;
use std::sync::Arc;

use market_data::replay::ReplaySource;
use market_data::{BookState, IngestError, IngestOutcome, MarketDataSource, SymbolBookCache};
use types::symbol::Symbol;

const JOURNAL: &[&str] = &[
    r#"{"symbol":"BTCUSDT","kind":"snapshot","last_update_id":100,"bids":[["50000","1"],["49990","2"]],"asks":[["50010","1"]]}"#,
    r#"{"symbol":"ETHUSDT","kind":"snapshot","last_update_id":7,"bids":[["1800","2"]],"asks":[["1801","3"]]}"#,
    r#"{"symbol":"BTCUSDT","kind":"diff","first_update_id":95,"last_update_id":101,"bids":[["50000","0"],["49995","4"]]}"#,
    r#"{"symbol":"BTCUSDT","kind":"diff","first_update_id":102,"last_update_id":103,"asks":[["50005","0.5"]]}"#,
    r#"{"symbol":"BTCUSDT","kind":"diff","first_update_id":90,"last_update_id":99,"bids":[["1","1"]]}"#,
    r#"{"symbol":"ETHUSDT","kind":"diff","first_update_id":8,"last_update_id":8,"asks":[["1801","0"],["1802","1"]]}"#,
];

fn write_journal(lines: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file.flush().unwrap();
    file
}

async fn replay_into_cache(path: &std::path::Path) -> (SymbolBookCache, Vec<Result<IngestOutcome, IngestError>>) {
    let cache = SymbolBookCache::default();
    let mut source = ReplaySource::open(path, None).await.unwrap();
    let mut outcomes = Vec::new();
    while let Some(event) = source.next_update().await {
        outcomes.push(cache.ingest(&event.symbol, &event.update));
    }
    (cache, outcomes)
}

fn sym(s: &str) -> Symbol {
    Symbol::parse(s).unwrap()
}

fn books(cache: &SymbolBookCache) -> Vec<Arc<BookState>> {
    cache
        .symbols()
        .iter()
        .map(|symbol| cache.snapshot(symbol).unwrap())
        .collect()
}

#[tokio::test]
async fn test_dual_replay_produces_identical_books() {
    let journal = write_journal(JOURNAL);

    let (first, _) = replay_into_cache(journal.path()).await;
    let (second, _) = replay_into_cache(journal.path()).await;

    assert_eq!(books(&first), books(&second));
    assert_eq!(first.symbols(), vec![sym("BTCUSDT"), sym("ETHUSDT")]);
}

#[tokio::test]
async fn test_replayed_book_contents() {
    let journal = write_journal(JOURNAL);
    let (cache, outcomes) = replay_into_cache(journal.path()).await;

    // The 90..=99 diff is older than the book and is dropped.
    assert_eq!(outcomes[4], Ok(IngestOutcome::Ignored));

    let btc = cache.snapshot(&sym("BTCUSDT")).unwrap();
    assert_eq!(btc.version, 3);
    assert_eq!(serde_json::to_value(&btc.bids).unwrap(), serde_json::json!([["49995", "4"], ["49990", "2"]]));
    assert_eq!(serde_json::to_value(&btc.asks).unwrap(), serde_json::json!([["50005", "0.5"], ["50010", "1"]]));

    let eth = cache.snapshot(&sym("ETHUSDT")).unwrap();
    assert_eq!(eth.version, 2);
    assert_eq!(serde_json::to_value(&eth.asks).unwrap(), serde_json::json!([["1802", "1"]]));
}

#[tokio::test]
async fn test_missing_update_holds_book_until_snapshot() {
    let journal = write_journal(&[
        r#"{"symbol":"BTCUSDT","kind":"snapshot","last_update_id":10,"bids":[["100","1"]]}"#,
        // 11 never arrives
        r#"{"symbol":"BTCUSDT","kind":"diff","first_update_id":12,"last_update_id":12,"bids":[["101","1"]]}"#,
        r#"{"symbol":"BTCUSDT","kind":"diff","first_update_id":13,"last_update_id":13,"bids":[["102","1"]]}"#,
        r#"{"symbol":"BTCUSDT","kind":"snapshot","last_update_id":20,"bids":[["105","1"]]}"#,
        r#"{"symbol":"BTCUSDT","kind":"diff","first_update_id":21,"last_update_id":21,"bids":[["106","1"]]}"#,
    ]);
    let (cache, outcomes) = replay_into_cache(journal.path()).await;

    assert_eq!(outcomes[1], Err(IngestError::SequenceGap { expected: 11, actual: 12 }));
    assert_eq!(outcomes[2], Err(IngestError::OutOfSync));
    assert!(matches!(outcomes[3], Ok(IngestOutcome::Applied(_))));

    let book = cache.snapshot(&sym("BTCUSDT")).unwrap();
    assert_eq!(book.version, 3);
    assert_eq!(serde_json::to_value(&book.bids).unwrap(), serde_json::json!([["106", "1"], ["105", "1"]]));
    assert_eq!(cache.updates_rejected(), 2);
}

#[tokio::test]
async fn test_high_volatility_burst() {
    let lines: Vec<String> = std::iter::once(
        r#"{"symbol":"SOLUSDT","kind":"snapshot","last_update_id":0}"#.to_string(),
    )
    .chain((1..=5_000u64).map(|i| {
        let price = 100 + (i % 50);
        let qty = i % 4;
        format!(
            r#"{{"symbol":"SOLUSDT","kind":"diff","first_update_id":{i},"last_update_id":{i},"bids":[["{price}","{qty}"]],"asks":[["{ask}","{qty}"]]}}"#,
            ask = price + 100
        )
    }))
    .collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    let journal = write_journal(&refs);

    let (cache, outcomes) = replay_into_cache(journal.path()).await;
    assert!(outcomes.iter().all(|o| matches!(o, Ok(IngestOutcome::Applied(_)))));

    let book = cache.snapshot(&sym("SOLUSDT")).unwrap();
    assert_eq!(book.version, 5_001);
    assert!(book.bids.len() <= cache.max_depth());
    assert!(book.bids.windows(2).all(|w| w[0].price() > w[1].price()));
    assert!(book.asks.windows(2).all(|w| w[0].price() < w[1].price()));
    assert!(book.best_bid() < book.best_ask());
}
