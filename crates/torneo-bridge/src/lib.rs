//! # Torneo Bridge
//! The serialization chokepoint. Every mutating intent — whether it came
//! from a chat command, a free-text trigger, or the HTTP gateway — passes
//! through one `Bridge`, which authorizes it, translates entry-point
//! identifiers to canonical participant ids, and runs the full
//! read-modify-write under a single `tokio::sync::Mutex`.

pub mod bridge;
pub mod commands;

pub use bridge::Bridge;
pub use commands::{Command, parse_command, parse_member_token, parse_when};
