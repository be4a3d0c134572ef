//! Gateway: webhook receiver + WebSocket surfaces on a single HTTP port.
//!
//! `POST /webhooks/message` ingests provider events; `GET /ws` registers a
//! per-conversation surface sink for as long as the socket is open.

mod protocol;
mod server;
mod surface;

pub use protocol::{SurfaceEvent, SurfaceParams};
pub use server::{build_state, router, run_gateway, GatewayState};
pub use surface::WsSink;
