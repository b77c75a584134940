//! Shared service infrastructure for the ecloud issuer and consuming services.
//!
//! This crate provides the components both sides of the permission pipeline use:
//! - Event bus (durable named consumers with ack/nak, in-memory or SQLite backed)
//! - TTL cache with an injectable clock
//! - SQLite connection setup
//! - HTTP plumbing (bearer extraction, health checks, server runner)
//! - Process lifecycle (logging, panic hook, graceful shutdown)

pub mod bus;
pub mod cache;
pub mod database;
pub mod http;
pub mod process;

// Re-export key types for convenience
pub use bus::{BusConfig, ConsumerSpec, DynBus, EventBus, MemoryBus, Message, SqliteBus, Subscription};
pub use cache::{Clock, Epoch, ManualClock, SystemClock, TtlCache};
