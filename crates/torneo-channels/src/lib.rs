//! # Torneo Channels
//! The Discord side of the control plane: REST calls out, a polling loop in.
//!
//! Everything the rest of the system needs from Discord goes through the
//! `Messenger` trait, so nothing above this crate knows about tokens,
//! snowflakes, or rate limits.

pub mod discord;

pub use discord::{DiscordChannel, start_polling};
