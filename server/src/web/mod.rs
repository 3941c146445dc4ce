//! WebSocket/HTTP transport adapter for the relay engine.

pub mod app_state;
pub mod router;
pub mod ws_handler;
