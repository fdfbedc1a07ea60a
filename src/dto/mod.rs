//! Wire types exchanged over HTTP, SSE and WebSocket.

pub mod command;
pub mod health;
pub mod session;
pub mod sse;
pub mod validation;
pub mod ws;
