//! The WebSocket gateway (spec §4.9, §6): accepts client connections,
//! rate-limits and validates requests, drives the planner and
//! orchestrator, and streams progress back over the socket.

mod client;
mod protocol;
mod rate_limit;
mod state;
mod ws;

pub use client::{ClientConnection, ClientState};
pub use protocol::{Envelope, EnvelopeType, RequestPayload};
pub use rate_limit::RateLimiter;
pub use state::{GatewayConfig, GatewayState};
pub use ws::router;
