//! Session protocols: await one reply, collect bulk entries, or walk a
//! fixed prompt sequence. All of them abort with `Timeout` when the input
//! feed stays quiet past the configured window; a timeout never commits
//! partial work — the caller discards whatever was collected.

use std::time::Duration;

use tokio::sync::mpsc;
use torneo_core::error::{Result, TorneoError};
use torneo_core::types::{IncomingMessage, TriviaEntry};

/// Wait for the next routed message, bounded by `timeout`.
pub async fn await_reply(
    rx: &mut mpsc::Receiver<IncomingMessage>,
    timeout: Duration,
) -> Result<IncomingMessage> {
    match tokio::time::timeout(timeout, rx.recv()).await {
        Ok(Some(msg)) => Ok(msg),
        Ok(None) => Err(TorneoError::Channel("session input feed closed".into())),
        Err(_) => Err(TorneoError::Timeout),
    }
}

/// Free-form bulk collection: every non-blank line of every message is one
/// entry, until the sentinel arrives. Bounded per message, not per session.
pub async fn collect_free_form(
    rx: &mut mpsc::Receiver<IncomingMessage>,
    timeout: Duration,
    sentinel: &str,
) -> Result<Vec<String>> {
    let mut entries = Vec::new();
    loop {
        let msg = await_reply(rx, timeout).await?;
        if is_sentinel(&msg.content, sentinel) {
            return Ok(entries);
        }
        for line in msg.content.lines() {
            let line = line.trim();
            if !line.is_empty() {
                entries.push(line.to_string());
            }
        }
    }
}

/// Delimited bulk collection: each non-blank line must split into exactly
/// three parts on `delimiter`. A malformed line gets an immediate reply on
/// `replies` and is skipped — the session keeps going.
pub async fn collect_delimited(
    rx: &mut mpsc::Receiver<IncomingMessage>,
    timeout: Duration,
    sentinel: &str,
    delimiter: &str,
    replies: &mpsc::Sender<String>,
) -> Result<Vec<TriviaEntry>> {
    let mut entries = Vec::new();
    loop {
        let msg = await_reply(rx, timeout).await?;
        if is_sentinel(&msg.content, sentinel) {
            return Ok(entries);
        }
        for line in msg.content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split(delimiter).collect();
            if parts.len() == 3 {
                entries.push(TriviaEntry {
                    question: parts[0].trim().to_string(),
                    answer: parts[1].trim().to_string(),
                    hint: parts[2].trim().to_string(),
                });
            } else {
                let _ = replies
                    .send(format!(
                        "⚠️ Skipped `{line}` — expected `question{delimiter}answer{delimiter}hint`."
                    ))
                    .await;
            }
        }
    }
}

/// Ask a fixed sequence of questions and collect one reply per question.
/// Any timeout abandons the whole sequence; nothing partial survives.
pub async fn prompt_fields(
    rx: &mut mpsc::Receiver<IncomingMessage>,
    timeout: Duration,
    prompts: &[&str],
    replies: &mpsc::Sender<String>,
) -> Result<Vec<String>> {
    let mut answers = Vec::with_capacity(prompts.len());
    for prompt in prompts {
        let _ = replies.send(prompt.to_string()).await;
        let msg = await_reply(rx, timeout).await?;
        answers.push(msg.content.trim().to_string());
    }
    Ok(answers)
}

fn is_sentinel(content: &str, sentinel: &str) -> bool {
    content.trim().eq_ignore_ascii_case(sentinel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(content: &str) -> IncomingMessage {
        IncomingMessage {
            channel_id: "ch".into(),
            message_id: "m".into(),
            author_id: "u".into(),
            author_name: None,
            content: content.into(),
            is_dm: false,
            timestamp: Utc::now(),
        }
    }

    fn feed(
        contents: &[&str],
    ) -> (mpsc::Sender<IncomingMessage>, mpsc::Receiver<IncomingMessage>) {
        let (tx, rx) = mpsc::channel(32);
        for c in contents {
            tx.try_send(msg(c)).unwrap();
        }
        (tx, rx)
    }

    #[tokio::test]
    async fn free_form_collects_until_sentinel() {
        let (_tx, mut rx) = feed(&["joke A", "joke B", "done"]);
        let entries = collect_free_form(&mut rx, Duration::from_secs(5), "done")
            .await
            .unwrap();
        assert_eq!(entries, vec!["joke A".to_string(), "joke B".to_string()]);
    }

    #[tokio::test]
    async fn free_form_splits_lines_and_skips_blanks() {
        let (_tx, mut rx) = feed(&["one\n\n  two  \nthree", "DONE"]);
        let entries = collect_free_form(&mut rx, Duration::from_secs(5), "done")
            .await
            .unwrap();
        assert_eq!(entries, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn free_form_sentinel_with_nothing_collected() {
        let (_tx, mut rx) = feed(&["done"]);
        let entries = collect_free_form(&mut rx, Duration::from_secs(5), "done")
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn free_form_timeout_aborts_without_partial_result() {
        let (_tx, mut rx) = mpsc::channel::<IncomingMessage>(4);
        let err = collect_free_form(&mut rx, Duration::from_secs(300), "done")
            .await
            .unwrap_err();
        assert!(matches!(err, TorneoError::Timeout));
    }

    #[tokio::test]
    async fn delimited_skips_malformed_lines_but_keeps_going() {
        let (reply_tx, mut reply_rx) = mpsc::channel(8);
        let (_tx, mut rx) = feed(&[
            "Q1::A1::H1",
            "this line is broken",
            "Q2::A2::H2",
            "done",
        ]);
        let entries = collect_delimited(
            &mut rx,
            Duration::from_secs(5),
            "done",
            "::",
            &reply_tx,
        )
        .await
        .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].question, "Q1");
        assert_eq!(entries[1].hint, "H2");
        // exactly one format complaint went out
        let complaint = reply_rx.try_recv().unwrap();
        assert!(complaint.contains("this line is broken"));
        assert!(reply_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn delimited_rejects_wrong_arity() {
        let (reply_tx, mut reply_rx) = mpsc::channel(8);
        let (_tx, mut rx) = feed(&["a::b", "a::b::c::d", "done"]);
        let entries = collect_delimited(
            &mut rx,
            Duration::from_secs(5),
            "done",
            "::",
            &reply_tx,
        )
        .await
        .unwrap();
        assert!(entries.is_empty());
        assert!(reply_rx.try_recv().is_ok());
        assert!(reply_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn prompt_sequence_collects_in_order() {
        let (reply_tx, mut reply_rx) = mpsc::channel(8);
        let (_tx, mut rx) = feed(&["What is Rust?", "A language", "Starts with R"]);
        let answers = prompt_fields(
            &mut rx,
            Duration::from_secs(5),
            &["Question?", "Answer?", "Hint?"],
            &reply_tx,
        )
        .await
        .unwrap();
        assert_eq!(answers, vec!["What is Rust?", "A language", "Starts with R"]);
        assert_eq!(reply_rx.try_recv().unwrap(), "Question?");
    }

    #[tokio::test(start_paused = true)]
    async fn prompt_sequence_timeout_drops_everything() {
        let (reply_tx, _reply_rx) = mpsc::channel(8);
        let (tx, mut rx) = mpsc::channel(4);
        tx.try_send(msg("only the first answer")).unwrap();
        let err = prompt_fields(
            &mut rx,
            Duration::from_secs(60),
            &["Question?", "Answer?", "Hint?"],
            &reply_tx,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TorneoError::Timeout));
    }
}
