//! Error taxonomy for the whole workspace.

use thiserror::Error;

/// Convenience alias used across all torneo crates.
pub type Result<T> = std::result::Result<T, TorneoError>;

/// All the ways a tournament operation can fail.
#[derive(Debug, Error)]
pub enum TorneoError {
    /// Wrong identity or wrong channel. The chat path rejects silently,
    /// the HTTP path maps this to 401.
    #[error("not authorized")]
    Authorization,

    /// Malformed user input: bad time, non-future schedule, unparseable
    /// number, malformed capture line.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Unresolvable member, guild, or record.
    #[error("not found: {0}")]
    NotFound(String),

    /// `advance_stage` targeted a stage with no configured cutoff.
    #[error("stage {0} has no configured cutoff")]
    UnconfiguredStage(u32),

    /// `retreat_stage` called at the first stage.
    #[error("already at the first stage")]
    AtFloor,

    /// A single recipient DM failed. Logged, never propagated past the
    /// scheduler tick.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// A capture session ran out of time waiting for input.
    #[error("timed out waiting for a reply")]
    Timeout,

    /// Persistence fault. Fatal to the enclosing operation only.
    #[error("storage error: {0}")]
    Storage(String),

    /// Chat platform API fault.
    #[error("channel error: {0}")]
    Channel(String),

    /// Configuration load/parse fault.
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
