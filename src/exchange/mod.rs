//! Venue integrations for Polymarket bracket markets.
//!
//! ## CLOB
//! - REST order books and fill-or-kill order submission (`ClobClient`)
//! - Market WebSocket best-ask cache (`BookStream`)
//!
//! ## Gamma
//! - Date-based discovery of the day's bracket outcomes (`GammaDiscovery`)
//!
//! ## Paper
//! - Synthetic fills for dry runs (`PaperGateway`)

mod client;
pub mod discovery;
mod paper;
pub mod traits;
mod types;
mod websocket;

pub use client::ClobClient;
pub use discovery::GammaDiscovery;
pub use paper::PaperGateway;
pub use traits::{MarketDiscovery, OrderBookProvider, OrderGateway};
pub use types::*;
pub use websocket::BookStream;

#[cfg(test)]
pub use traits::{MockMarketDiscovery, MockOrderBookProvider, MockOrderGateway};
