//! Transfer module - the bridge model and the flows that drive it
//!
//! This module provides:
//! - The single bridge state object and the pure primary-action derivation
//! - Balance, minimum and allowance reads
//! - Debounced fee estimation
//! - The orchestrator running connect, approve, bridge and deploy

pub mod estimator;
pub mod fetcher;
pub mod orchestrator;
pub mod state;

pub use orchestrator::{BridgeView, Orchestrator};
