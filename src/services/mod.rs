/// Command intake: validation and dispatch to session lanes.
pub mod command_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Session snapshots, connection counts and resets.
pub mod session_service;
/// Background eviction of idle sessions.
pub mod session_sweeper;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
