//! Session lifecycle: window schedule, state machine, and the control loop.
//!
//! One `Session` exists per trading day. The controller creates it when the
//! day's market is resolved, resets its budget and strategy state exactly
//! once when the window opens, and drops it when the session closes.

mod controller;
mod fetch;
mod observer;
mod runner;
mod window;

pub use controller::{Session, SessionController, SessionDeps, SessionPhase};
pub use fetch::TickFetcher;
pub use observer::{CloseReason, SessionObserver, SessionSummary, TracingObserver};
pub use runner::{build, build_discovery, build_strategy, run, Wiring};
pub use window::SessionWindow;
