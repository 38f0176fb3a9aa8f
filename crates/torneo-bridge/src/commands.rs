//! Chat command parsing: prefix-stripped text → `Command`.
//!
//! Member references accept mention syntax (`<@123>`, `<@!123>`) and bare
//! numeric ids; both collapse to the canonical participant id. Times use
//! the fixed `dd/mm/yyyy hh:mm` format and are read as UTC wall clock.

use chrono::{DateTime, NaiveDateTime, Utc};
use torneo_core::error::{Result, TorneoError};

/// A fully parsed chat command. Mutating variants are operator-only.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `points <member> <delta>` — delta may be negative.
    Points { user_id: String, delta: i64 },
    /// `medals <member> <amount>`
    Medals { user_id: String, amount: i64 },
    /// `score` — the sender's own totals. Unrestricted.
    Score,
    /// `rankings` — full leaderboard. Unrestricted.
    Rankings,
    /// `advance`
    Advance,
    /// `retreat`
    Retreat,
    /// `setstage <n>`
    SetStage(u32),
    /// `remove <member>`
    Remove { user_id: String },
    /// `notify <dd/mm/yyyy> <hh:mm> <spec> <message…>` — spec is one token
    /// (`everyone`, `stage3`, …).
    Notify { at: DateTime<Utc>, recipients: String, message: String },
    /// `event <dd/mm/yyyy> <hh:mm> <description…>`
    Event { at: DateTime<Utc>, description: String },
    /// `events` — upcoming calendar. Unrestricted.
    Events,
    /// `trivia` — quiz the channel with a random question.
    Trivia,
    /// `joke` — a random joke. Unrestricted.
    Joke,
    /// `addtrivia` — interactive question/answer/hint prompts.
    AddTrivia,
    /// `bulkjokes` — free-form bulk capture, operator DM only.
    BulkJokes,
    /// `bulktrivia` — delimited bulk capture, operator DM only.
    BulkTrivia,
}

impl Command {
    /// Whether any identity may issue this command.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Score | Self::Rankings | Self::Events | Self::Joke)
    }

    /// Whether this command may only start in the operator's DM channel.
    pub fn dm_only(&self) -> bool {
        matches!(self, Self::BulkJokes | Self::BulkTrivia)
    }
}

/// Parse the text after the command prefix. `Ok(None)` for words that are
/// not commands at all (the message falls through to free-text handling);
/// `Err(Validation)` for a recognized command with bad arguments.
pub fn parse_command(text: &str) -> Result<Option<Command>> {
    let mut tokens = text.split_whitespace();
    let Some(verb) = tokens.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = tokens.collect();

    let cmd = match verb.to_lowercase().as_str() {
        "points" => {
            let (member, delta) = two_args(&rest, "points <member> <delta>")?;
            Command::Points { user_id: member_arg(member)?, delta: int_arg(delta)? }
        }
        "medals" => {
            let (member, amount) = two_args(&rest, "medals <member> <amount>")?;
            Command::Medals { user_id: member_arg(member)?, amount: int_arg(amount)? }
        }
        "score" => Command::Score,
        "rankings" | "ranking" => Command::Rankings,
        "advance" => Command::Advance,
        "retreat" => Command::Retreat,
        "setstage" => {
            let [stage] = rest.as_slice() else {
                return Err(TorneoError::Validation("usage: setstage <n>".into()));
            };
            let n: u32 = stage
                .parse()
                .map_err(|_| TorneoError::Validation(format!("`{stage}` is not a stage number")))?;
            Command::SetStage(n)
        }
        "remove" => {
            let [member] = rest.as_slice() else {
                return Err(TorneoError::Validation("usage: remove <member>".into()));
            };
            Command::Remove { user_id: member_arg(member)? }
        }
        "notify" => {
            if rest.len() < 4 {
                return Err(TorneoError::Validation(
                    "usage: notify <dd/mm/yyyy> <hh:mm> <recipients> <message>".into(),
                ));
            }
            Command::Notify {
                at: parse_when(rest[0], rest[1])?,
                recipients: rest[2].to_string(),
                message: rest[3..].join(" "),
            }
        }
        "event" => {
            if rest.len() < 3 {
                return Err(TorneoError::Validation(
                    "usage: event <dd/mm/yyyy> <hh:mm> <description>".into(),
                ));
            }
            Command::Event { at: parse_when(rest[0], rest[1])?, description: rest[2..].join(" ") }
        }
        "events" => Command::Events,
        "trivia" => Command::Trivia,
        "joke" => Command::Joke,
        "addtrivia" => Command::AddTrivia,
        "bulkjokes" => Command::BulkJokes,
        "bulktrivia" => Command::BulkTrivia,
        _ => return Ok(None),
    };
    Ok(Some(cmd))
}

/// Collapse a member reference to the canonical user id: `<@123>`,
/// `<@!123>`, or a bare numeric id.
pub fn parse_member_token(token: &str) -> Option<String> {
    let inner = token
        .strip_prefix("<@!")
        .or_else(|| token.strip_prefix("<@"))
        .map(|s| s.strip_suffix('>').unwrap_or(s))
        .unwrap_or(token);
    if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit()) {
        Some(inner.to_string())
    } else {
        None
    }
}

/// Parse `dd/mm/yyyy hh:mm` into a UTC timestamp.
pub fn parse_when(date: &str, time: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%d/%m/%Y %H:%M")
        .map_err(|_| {
            TorneoError::Validation(format!("`{date} {time}` is not a valid dd/mm/yyyy hh:mm"))
        })?;
    Ok(naive.and_utc())
}

fn member_arg(token: &str) -> Result<String> {
    parse_member_token(token)
        .ok_or_else(|| TorneoError::Validation(format!("`{token}` is not a member reference")))
}

fn int_arg(token: &str) -> Result<i64> {
    token
        .parse()
        .map_err(|_| TorneoError::Validation(format!("`{token}` is not a number")))
}

fn two_args<'a>(rest: &[&'a str], usage: &str) -> Result<(&'a str, &'a str)> {
    match rest {
        [a, b] => Ok((a, b)),
        _ => Err(TorneoError::Validation(format!("usage: {usage}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_tokens_collapse_to_ids() {
        assert_eq!(parse_member_token("<@123>").as_deref(), Some("123"));
        assert_eq!(parse_member_token("<@!123>").as_deref(), Some("123"));
        assert_eq!(parse_member_token("123").as_deref(), Some("123"));
        assert_eq!(parse_member_token("@name"), None);
        assert_eq!(parse_member_token(""), None);
    }

    #[test]
    fn points_with_negative_delta() {
        let cmd = parse_command("points <@42> -5").unwrap().unwrap();
        assert_eq!(cmd, Command::Points { user_id: "42".into(), delta: -5 });
    }

    #[test]
    fn bad_arguments_are_validation_errors() {
        assert!(matches!(
            parse_command("points <@42>"),
            Err(TorneoError::Validation(_))
        ));
        assert!(matches!(
            parse_command("points notamention 5"),
            Err(TorneoError::Validation(_))
        ));
        assert!(matches!(
            parse_command("setstage many"),
            Err(TorneoError::Validation(_))
        ));
    }

    #[test]
    fn unknown_words_are_not_commands() {
        assert!(parse_command("hello there").unwrap().is_none());
        assert!(parse_command("").unwrap().is_none());
    }

    #[test]
    fn notify_parses_time_spec_and_message() {
        let cmd = parse_command("notify 24/12/2030 18:00 stage3 Finals start soon")
            .unwrap()
            .unwrap();
        let Command::Notify { at, recipients, message } = cmd else {
            panic!("wrong variant");
        };
        assert_eq!(recipients, "stage3");
        assert_eq!(message, "Finals start soon");
        assert_eq!(at.format("%d/%m/%Y %H:%M").to_string(), "24/12/2030 18:00");
    }

    #[test]
    fn malformed_times_are_rejected() {
        assert!(matches!(
            parse_command("notify someday soon everyone hi"),
            Err(TorneoError::Validation(_))
        ));
        assert!(matches!(
            parse_command("event 31/02/2030 10:00 impossible"),
            Err(TorneoError::Validation(_))
        ));
    }

    #[test]
    fn open_commands_are_marked() {
        assert!(Command::Score.is_open());
        assert!(Command::Rankings.is_open());
        assert!(Command::Events.is_open());
        assert!(!Command::Advance.is_open());
        assert!(Command::BulkJokes.dm_only());
        assert!(!Command::AddTrivia.dm_only());
    }
}
