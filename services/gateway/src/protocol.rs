//! WebSocket wire protocol
//!
//! Client → server: one JSON string per message, the symbol to watch
//! (`"BTCUSDT"`).
//!
//! Server → client: either a full book `{"bids":[[p,q],...],"asks":[...]}`
//! or an error `{"error":"..."}`. Prices and quantities are decimal strings.

use market_data::BookState;
use serde::{Deserialize, Serialize};
use types::errors::StreamError;
use types::numeric::Level;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Book { bids: Vec<Level>, asks: Vec<Level> },
    Error { error: String },
}

impl ServerFrame {
    pub fn book(state: &BookState) -> Self {
        ServerFrame::Book {
            bids: state.bids.clone(),
            asks: state.asks.clone(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error {
            error: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Extract the requested symbol from an inbound text frame.
///
/// Anything other than a JSON string is a transport fault.
pub fn parse_client_message(text: &str) -> Result<String, StreamError> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::String(symbol)) => Ok(symbol),
        Ok(other) => Err(StreamError::TransportFault(format!(
            "expected a JSON string, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(StreamError::TransportFault(format!("malformed message: {}", e))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::numeric::{Price, Quantity};
    use types::symbol::Symbol;

    #[test]
    fn test_book_frame_shape() {
        let state = BookState {
            symbol: Symbol::parse("ETHUSDT").unwrap(),
            bids: vec![Level::new(Price::from_u64(1800), Quantity::from_u64(2))],
            asks: vec![Level::new(Price::from_u64(1801), Quantity::from_u64(3))],
            version: 1,
        };

        let json = ServerFrame::book(&state).to_json().unwrap();
        assert_eq!(json, r#"{"bids":[["1800","2"]],"asks":[["1801","3"]]}"#);
    }

    #[test]
    fn test_error_frame_shape() {
        let json = ServerFrame::error("no data yet for ETHUSDT").to_json().unwrap();
        assert_eq!(json, r#"{"error":"no data yet for ETHUSDT"}"#);
    }

    #[test]
    fn test_frames_parse_back_by_shape() {
        let book: ServerFrame = serde_json::from_str(r#"{"bids":[],"asks":[["1","1"]]}"#).unwrap();
        assert!(matches!(book, ServerFrame::Book { .. }));

        let error: ServerFrame = serde_json::from_str(r#"{"error":"boom"}"#).unwrap();
        assert_eq!(error, ServerFrame::error("boom"));
    }

    #[test]
    fn test_parse_client_message() {
        assert_eq!(parse_client_message(r#""btcusdt""#).unwrap(), "btcusdt");
        assert_eq!(parse_client_message(r#"  "BTCUSDT"  "#).unwrap(), "BTCUSDT");
    }

    #[test]
    fn test_non_string_messages_are_faults() {
        for input in ["BTCUSDT", "42", r#"{"symbol":"BTCUSDT"}"#, "[]", ""] {
            let err = parse_client_message(input).unwrap_err();
            assert!(matches!(err, StreamError::TransportFault(_)), "input {:?}", input);
            assert!(!err.is_recoverable());
        }
    }
}
