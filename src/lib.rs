//! # Bracket Trader
//!
//! Budget-constrained trading on daily passenger-volume bracket markets.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `error`: Error taxonomy shared by every module
//! - `exchange`: Polymarket CLOB client (REST + WebSocket), Gamma discovery, paper gateway
//! - `feed`: Passenger-volume data source
//! - `strategy`: Bracket matching, signal generation, budget allocation, and execution
//! - `session`: Trading window state machine and control loop
//! - `utils`: Shared utilities and decimal arithmetic

pub mod config;
pub mod error;
pub mod exchange;
pub mod feed;
pub mod session;
pub mod strategy;
pub mod utils;

pub use config::Config;
pub use error::{Result, TraderError};
