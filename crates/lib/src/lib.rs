//! Huddle core library: webhook ingestion, debounced reordering, and
//! per-conversation delivery, plus the gateway that hosts them.

pub mod aggregator;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod gateway;
pub mod ingest;
pub mod init;
pub mod sinks;
pub mod verify;
