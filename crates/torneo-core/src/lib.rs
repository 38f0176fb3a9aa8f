//! # Torneo Core
//! Shared foundation for the tournament control plane: configuration,
//! the error taxonomy, domain types, and the messaging collaborator trait.
//!
//! Everything that touches tournament state goes through the command bridge
//! (`torneo-bridge`); this crate only defines the vocabulary the other
//! crates speak.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::TorneoConfig;
pub use error::{Result, TorneoError};
