//! WebSocket bridge between a browser client and a discussion runtime.

pub mod protocol;
mod session;

pub use session::ws_handler;
