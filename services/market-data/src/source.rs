//! Upstream market data sources
//!
//! The cache does not care what feed sits behind it. A source is anything
//! that yields `SourceEvent`s in order until it is exhausted.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::events::SourceEvent;

/// Opaque producer of per-symbol book updates.
#[async_trait]
pub trait MarketDataSource: Send {
    /// Next update, or `None` once the source is exhausted.
    async fn next_update(&mut self) -> Option<SourceEvent>;

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// In-process source fed through a bounded channel.
pub struct ChannelSource {
    rx: mpsc::Receiver<SourceEvent>,
}

impl ChannelSource {
    /// Create the source together with the sender that feeds it.
    pub fn new(capacity: usize) -> (mpsc::Sender<SourceEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl MarketDataSource for ChannelSource {
    async fn next_update(&mut self) -> Option<SourceEvent> {
        self.rx.recv().await
    }

    fn name(&self) -> &str {
        "channel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BookUpdate;
    use types::symbol::Symbol;

    #[tokio::test]
    async fn test_channel_source_yields_in_order_then_ends() {
        let (tx, mut source) = ChannelSource::new(4);
        let symbol = Symbol::parse("BTCUSDT").unwrap();

        for id in 1..=3 {
            tx.send(SourceEvent {
                symbol: symbol.clone(),
                update: BookUpdate::diff(vec![], vec![]).with_update_ids(id, id),
            })
            .await
            .unwrap();
        }
        drop(tx);

        let mut ids = Vec::new();
        while let Some(event) = source.next_update().await {
            ids.extend(event.update.last_update_id);
        }
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(source.name(), "channel");
    }
}
