//! # Torneo Gateway
//! The HTTP face of the control plane. Thin by construction: handlers
//! translate JSON to bridge calls and bridge errors to status codes, and
//! every mutation funnels into the same lock the chat loop uses.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
