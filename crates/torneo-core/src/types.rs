//! Domain types shared across the workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message arriving from the chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub channel_id: String,
    pub message_id: String,
    pub author_id: String,
    pub author_name: Option<String>,
    pub content: String,
    /// True for a direct-message channel with the bot.
    pub is_dm: bool,
    pub timestamp: DateTime<Utc>,
}

/// A tournament participant. Identity is an opaque stable user id; the
/// display name is whatever the caller knew at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    pub display_name: String,
    /// May go negative — deductions are allowed and never clamped.
    pub points: i64,
    /// Symbolic reward total.
    pub medals: i64,
    /// Current stage number (≥ 1, always a configured stage).
    pub stage: u32,
    /// Achievement tags; order carries no meaning.
    #[serde(default)]
    pub badges: Vec<String>,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    /// Fresh record at the given stage with zero totals.
    pub fn new(user_id: &str, display_name: &str, stage: u32) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            points: 0,
            medals: 0,
            stage,
            badges: Vec::new(),
            joined_at: Utc::now(),
        }
    }
}

/// A scheduled one-shot notification row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub scheduled_time: DateTime<Utc>,
    /// Raw recipient specifier as stored; parsed lazily by the scheduler.
    pub recipients: String,
    pub message: String,
}

impl Notification {
    pub fn recipient_spec(&self) -> RecipientSpec {
        RecipientSpec::parse(&self.recipients)
    }
}

/// Who a scheduled notification targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientSpec {
    /// Full guild membership snapshot at delivery time.
    Everyone,
    /// Every participant currently at the given stage.
    Stage(u32),
    /// Anything unrecognized — resolves to no recipients, not an error.
    Unknown(String),
}

impl RecipientSpec {
    /// Parse a stored specifier string. Matching is case-insensitive and
    /// whitespace-tolerant; anything that does not match is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        let norm = raw.trim().to_lowercase();
        if norm == "everyone" {
            return Self::Everyone;
        }
        if let Some(rest) = norm.strip_prefix("stage")
            && let Ok(n) = rest.trim().parse::<u32>()
        {
            return Self::Stage(n);
        }
        Self::Unknown(raw.trim().to_string())
    }
}

impl std::fmt::Display for RecipientSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Everyone => write!(f, "everyone"),
            Self::Stage(n) => write!(f, "stage {n}"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// A display-only calendar entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: i64,
    pub event_time: DateTime<Utc>,
    pub description: String,
}

/// One trivia bank entry, as committed by a delimited capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriviaEntry {
    pub question: String,
    pub answer: String,
    pub hint: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_spec_parsing() {
        assert_eq!(RecipientSpec::parse("everyone"), RecipientSpec::Everyone);
        assert_eq!(RecipientSpec::parse(" Everyone "), RecipientSpec::Everyone);
        assert_eq!(RecipientSpec::parse("stage 3"), RecipientSpec::Stage(3));
        assert_eq!(RecipientSpec::parse("Stage3"), RecipientSpec::Stage(3));
        assert_eq!(
            RecipientSpec::parse("winners"),
            RecipientSpec::Unknown("winners".into())
        );
        // a stage without a number is not a stage spec
        assert_eq!(
            RecipientSpec::parse("stage x"),
            RecipientSpec::Unknown("stage x".into())
        );
    }
}
