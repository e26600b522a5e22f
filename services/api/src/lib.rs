//! Crossfire API Library Crate
//!
//! This library contains the web service around the discussion engine:
//! configuration, application state, prompt loading, REST handlers, the
//! WebSocket session bridge, and routing. The binaries are thin wrappers
//! around it.

pub mod config;
pub mod handlers;
pub mod models;
pub mod prompts;
pub mod router;
pub mod state;
pub mod telemetry;
pub mod ws;
