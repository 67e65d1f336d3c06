//! # Gateway manager
//!
//! The public façade over one shard worker.

pub mod manager;

pub use manager::GatewayManager;
