//! # Torneo Capture
//! Bounded multi-turn input collection: bulk joke/trivia ingestion and
//! sequential field prompts.
//!
//! The engine never talks to a transport. Input arrives on an injected
//! `mpsc::Receiver<IncomingMessage>` (filled by the session registry from
//! the live event loop, or by a test directly); user-facing output leaves
//! through an injected reply sink. Every await carries a timeout.

pub mod registry;
pub mod session;

pub use registry::{SessionGuard, SessionKey, SessionRegistry};
pub use session::{await_reply, collect_delimited, collect_free_form, prompt_fields};
