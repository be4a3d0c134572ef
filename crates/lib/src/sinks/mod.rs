//! Per-conversation delivery targets.
//!
//! A surface (e.g. a WebSocket observer) implements [`Sink`] and registers itself
//! for one conversation id. The dispatcher looks sinks up on every delivery.

pub(crate) mod registry;

pub use registry::{RegistryError, Sink, SinkRegistry};
