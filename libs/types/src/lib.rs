//! Types library for the order book stream gateway
//!
//! Core type definitions shared by the book cache and the gateway, so both
//! sides agree on identity, symbol normalization and level encoding.
//!
//! # Modules
//! - `ids`: Session identifiers (SessionId)
//! - `symbol`: Normalized instrument identifiers (Symbol)
//! - `numeric`: Fixed-point decimal types (Price, Quantity, Level)
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod symbol;
pub mod numeric;
pub mod errors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::symbol::*;
    pub use crate::numeric::*;
    pub use crate::errors::*;
}
