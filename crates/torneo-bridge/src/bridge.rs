//! The bridge proper: one struct, one lock, three entry points.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};
use torneo_capture::{
    SessionGuard, SessionKey, SessionRegistry, collect_delimited, collect_free_form, prompt_fields,
};
use torneo_core::TorneoConfig;
use torneo_core::error::{Result, TorneoError};
use torneo_core::traits::Messenger;
use torneo_core::types::{IncomingMessage, TriviaEntry};
use torneo_state::{StagePartition, TournamentState};

use crate::commands::{Command, parse_command};

/// The command bridge. Cheap to clone — everything is shared.
#[derive(Clone)]
pub struct Bridge {
    shared: Arc<Mutex<TournamentState>>,
    messenger: Arc<dyn Messenger>,
    registry: Arc<SessionRegistry>,
    config: Arc<TorneoConfig>,
}

impl Bridge {
    pub fn new(
        shared: Arc<Mutex<TournamentState>>,
        messenger: Arc<dyn Messenger>,
        config: TorneoConfig,
    ) -> Self {
        Self {
            shared,
            messenger,
            registry: Arc::new(SessionRegistry::new()),
            config: Arc::new(config),
        }
    }

    /// The shared tournament lock, for wiring the scheduler onto the same
    /// serialization point.
    pub fn shared(&self) -> Arc<Mutex<TournamentState>> {
        self.shared.clone()
    }

    // ─── Chat entry point ──────────────────────────────────

    /// Handle one incoming chat message: live capture sessions get first
    /// claim, then prefix commands, then free-text triggers.
    pub async fn handle_message(&self, msg: IncomingMessage) {
        if self.registry.route(&msg) {
            return;
        }
        if let Some(text) = msg.content.strip_prefix(&self.config.command_prefix) {
            match parse_command(text) {
                Ok(Some(cmd)) => self.dispatch(msg, cmd).await,
                Ok(None) => {}
                Err(e) => {
                    let _ = self.messenger.send_channel(&msg.channel_id, &format!("❌ {e}")).await;
                }
            }
        } else {
            self.free_text(&msg).await;
        }
    }

    async fn dispatch(&self, msg: IncomingMessage, cmd: Command) {
        let is_operator = msg.author_id == self.config.operator_id;
        if !cmd.is_open() {
            // Authorization failures on the chat path are silent: scrub the
            // invoking message, say nothing.
            if !is_operator || (cmd.dm_only() && !msg.is_dm) {
                self.scrub(&msg).await;
                return;
            }
            if !msg.is_dm {
                // the original system scrubbed operator commands from
                // public channels too
                self.scrub(&msg).await;
            }
        }

        let reply = match self.execute(&msg, cmd).await {
            Ok(reply) => reply,
            Err(e @ TorneoError::Validation(_))
            | Err(e @ TorneoError::UnconfiguredStage(_))
            | Err(e @ TorneoError::AtFloor)
            | Err(e @ TorneoError::NotFound(_)) => Some(format!("❌ {e}")),
            Err(e) => {
                tracing::error!("command failed: {e}");
                Some("❌ Something went wrong, the operation was aborted.".into())
            }
        };
        if let Some(text) = reply {
            let _ = self.messenger.send_channel(&msg.channel_id, &text).await;
        }
    }

    async fn execute(&self, msg: &IncomingMessage, cmd: Command) -> Result<Option<String>> {
        match cmd {
            Command::Points { user_id, delta } => {
                let name = self.display_name(&user_id).await;
                let state = self.shared.lock().await;
                let total = state.adjust_score(&user_id, &name, delta)?;
                Ok(Some(format!("✅ {name} now has {total} points.")))
            }
            Command::Medals { user_id, amount } => {
                let name = self.display_name(&user_id).await;
                let state = self.shared.lock().await;
                let total = state.award_medals(&user_id, &name, amount)?;
                Ok(Some(format!("✅ {name} now has {total} medals.")))
            }
            Command::Score => Ok(Some(self.own_score(&msg.author_id).await?)),
            Command::Rankings => {
                let state = self.shared.lock().await;
                let ranked = state.rankings()?;
                if ranked.is_empty() {
                    return Ok(Some("No participants yet.".into()));
                }
                let mut out = String::from("🏆 **Rankings**\n");
                for (p, rank) in ranked {
                    out.push_str(&format!("{rank}. {} — {} pts\n", p.display_name, p.points));
                }
                Ok(Some(out))
            }
            Command::Advance => {
                let partition = {
                    let mut state = self.shared.lock().await;
                    state.advance_stage()?
                };
                self.announce_partition(&partition).await;
                let name = {
                    let state = self.shared.lock().await;
                    state.stage_name(partition.new_stage).unwrap_or("?").to_string()
                };
                Ok(Some(format!(
                    "🏁 Stage {} ({}): {} advanced, {} eliminated.",
                    partition.new_stage,
                    name,
                    partition.advanced.len(),
                    partition.eliminated.len()
                )))
            }
            Command::Retreat => {
                let mut state = self.shared.lock().await;
                let stage = state.retreat_stage()?;
                Ok(Some(format!("↩️ Back to stage {stage}; everyone reset.")))
            }
            Command::SetStage(n) => {
                let mut state = self.shared.lock().await;
                state.set_stage(n)?;
                Ok(Some(format!("✅ Stage counter set to {n}.")))
            }
            Command::Remove { user_id } => {
                let state = self.shared.lock().await;
                state.remove_participant(&user_id)?;
                Ok(Some(format!("✅ <@{user_id}> removed from the tournament.")))
            }
            Command::Notify { at, recipients, message } => {
                let id = self.schedule_notification(at, &recipients, &message, true).await?;
                Ok(Some(format!(
                    "✅ Notification #{id} scheduled for {}.",
                    at.format("%d/%m/%Y %H:%M")
                )))
            }
            Command::Event { at, description } => {
                let state = self.shared.lock().await;
                state.db().insert_calendar_event(at, &description)?;
                Ok(Some(format!(
                    "✅ Event created: {} — {description}",
                    at.format("%d/%m/%Y %H:%M")
                )))
            }
            Command::Events => {
                let state = self.shared.lock().await;
                let events = state.db().upcoming_events(Utc::now())?;
                if events.is_empty() {
                    return Ok(Some("📅 No upcoming events.".into()));
                }
                let mut out = String::from("📅 **Upcoming events**\n");
                for e in events {
                    out.push_str(&format!(
                        "📌 {} — {}\n",
                        e.event_time.format("%d/%m/%Y %H:%M"),
                        e.description
                    ));
                }
                Ok(Some(out))
            }
            Command::Joke => {
                let state = self.shared.lock().await;
                Ok(Some(match state.db().random_joke()? {
                    Some(joke) => joke,
                    None => "The joke bank is empty. `bulkjokes` fixes that.".into(),
                }))
            }
            Command::Trivia => {
                self.start_trivia_quiz(msg).await;
                Ok(None)
            }
            Command::AddTrivia => {
                self.start_add_trivia(msg).await;
                Ok(None)
            }
            Command::BulkJokes => {
                self.start_bulk(msg, BulkKind::Jokes).await;
                Ok(None)
            }
            Command::BulkTrivia => {
                self.start_bulk(msg, BulkKind::Trivia).await;
                Ok(None)
            }
        }
    }

    /// Free-text triggers: non-command messages answered in place.
    async fn free_text(&self, msg: &IncomingMessage) {
        let lower = msg.content.to_lowercase();
        let reply = if lower.contains("my score") {
            self.own_score(&msg.author_id).await.ok()
        } else if lower.contains("next event") {
            let state = self.shared.lock().await;
            match state.db().upcoming_events(Utc::now()) {
                Ok(events) => Some(match events.first() {
                    Some(e) => format!(
                        "📌 Next up: {} — {}",
                        e.event_time.format("%d/%m/%Y %H:%M"),
                        e.description
                    ),
                    None => "📅 Nothing on the calendar.".into(),
                }),
                Err(_) => None,
            }
        } else {
            None
        };
        if let Some(text) = reply {
            let _ = self.messenger.send_channel(&msg.channel_id, &text).await;
        }
    }

    async fn own_score(&self, author_id: &str) -> Result<String> {
        let state = self.shared.lock().await;
        Ok(match state.db().get_participant(author_id)? {
            Some(p) => {
                let stage = state.stage_name(p.stage).unwrap_or("?");
                format!(
                    "You have {} points and {} medals — stage {} ({stage}).",
                    p.points, p.medals, p.stage
                )
            }
            None => "You are not in the tournament yet.".into(),
        })
    }

    // ─── Scheduling intents ────────────────────────────────

    /// Persist a notification. The command-driven path enforces a strictly
    /// future time; internal dispatch may pass `enforce_future = false`.
    pub async fn schedule_notification(
        &self,
        at: DateTime<Utc>,
        recipients: &str,
        message: &str,
        enforce_future: bool,
    ) -> Result<i64> {
        if enforce_future && at <= Utc::now() {
            return Err(TorneoError::Validation(
                "the scheduled time must be in the future".into(),
            ));
        }
        let state = self.shared.lock().await;
        state.db().insert_notification(at, &recipients.to_lowercase(), message)
    }

    // ─── HTTP entry point ──────────────────────────────────
    // Bearer-token auth happened at the gateway; these only translate ids
    // and hold the lock. Member resolution failing outright is the 404.

    pub async fn api_adjust_score(&self, member_id: &str, points: i64) -> Result<i64> {
        if member_id.is_empty() || !member_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(TorneoError::Validation(format!(
                "`{member_id}` is not a member id"
            )));
        }
        let name = match self
            .messenger
            .resolve_member(&self.config.guild_id, member_id)
            .await
        {
            Ok(Some(member)) => member.display_name,
            Ok(None) => return Err(TorneoError::NotFound(format!("member {member_id}"))),
            // collaborator down: the state machine only needs a stable id
            Err(_) => member_id.to_string(),
        };
        let state = self.shared.lock().await;
        state.adjust_score(member_id, &name, points)
    }

    pub async fn api_remove_member(&self, member_id: &str) -> Result<()> {
        if member_id.is_empty() || !member_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(TorneoError::Validation(format!(
                "`{member_id}` is not a member id"
            )));
        }
        let state = self.shared.lock().await;
        state.remove_participant(member_id)
    }

    pub async fn api_set_stage(&self, stage: u32) -> Result<()> {
        let mut state = self.shared.lock().await;
        state.set_stage(stage)
    }

    // ─── Capture sessions ──────────────────────────────────

    async fn start_bulk(&self, msg: &IncomingMessage, kind: BulkKind) {
        let key = SessionKey {
            channel_id: msg.channel_id.clone(),
            author_id: Some(msg.author_id.clone()),
        };
        let Some((guard, rx)) = self.registry.claim(key) else {
            let _ = self
                .messenger
                .send_channel(&msg.channel_id, "⚠️ A capture session is already running here.")
                .await;
            return;
        };
        let intro = match kind {
            BulkKind::Jokes => format!(
                "📝 Paste jokes, one per line. Say `{}` when you are finished.",
                self.config.capture.sentinel
            ),
            BulkKind::Trivia => format!(
                "📝 Paste trivia as `question{d}answer{d}hint`, one per line. Say `{}` to finish.",
                self.config.capture.sentinel,
                d = self.config.capture.delimiter
            ),
        };
        let _ = self.messenger.send_channel(&msg.channel_id, &intro).await;

        let bridge = self.clone();
        let channel_id = msg.channel_id.clone();
        tokio::spawn(async move {
            bridge.run_bulk(guard, rx, channel_id, kind).await;
        });
    }

    async fn run_bulk(
        &self,
        guard: SessionGuard,
        mut rx: mpsc::Receiver<IncomingMessage>,
        channel_id: String,
        kind: BulkKind,
    ) {
        let sentinel = self.config.capture.sentinel.clone();
        let outcome = match kind {
            BulkKind::Jokes => {
                let timeout = Duration::from_secs(self.config.capture.joke_timeout_secs);
                match collect_free_form(&mut rx, timeout, &sentinel).await {
                    Ok(entries) if entries.is_empty() => Ok(0),
                    Ok(entries) => {
                        let state = self.shared.lock().await;
                        state.db().insert_jokes(&entries)
                    }
                    Err(e) => Err(e),
                }
            }
            BulkKind::Trivia => {
                let timeout = Duration::from_secs(self.config.capture.trivia_timeout_secs);
                let (reply_tx, reply_rx) = mpsc::channel(16);
                let forwarder = self.spawn_reply_forwarder(channel_id.clone(), reply_rx);
                let collected = collect_delimited(
                    &mut rx,
                    timeout,
                    &sentinel,
                    &self.config.capture.delimiter,
                    &reply_tx,
                )
                .await;
                drop(reply_tx);
                let _ = forwarder.await;
                match collected {
                    Ok(entries) if entries.is_empty() => Ok(0),
                    Ok(entries) => {
                        let state = self.shared.lock().await;
                        state.db().insert_trivia(&entries)
                    }
                    Err(e) => Err(e),
                }
            }
        };

        let report = match outcome {
            Ok(0) => "Nothing added.".to_string(),
            Ok(n) => format!("✅ Added {n} entr{}.", if n == 1 { "y" } else { "ies" }),
            Err(TorneoError::Timeout) => {
                // collected-but-uncommitted entries are dropped on timeout
                "⏰ Session timed out — nothing was saved.".to_string()
            }
            Err(e) => {
                tracing::error!("bulk capture failed: {e}");
                "❌ The session failed; nothing was saved.".to_string()
            }
        };
        let _ = self.messenger.send_channel(&channel_id, &report).await;
        drop(guard);
    }

    async fn start_add_trivia(&self, msg: &IncomingMessage) {
        let key = SessionKey {
            channel_id: msg.channel_id.clone(),
            author_id: Some(msg.author_id.clone()),
        };
        let Some((guard, mut rx)) = self.registry.claim(key) else {
            let _ = self
                .messenger
                .send_channel(&msg.channel_id, "⚠️ A capture session is already running here.")
                .await;
            return;
        };
        let bridge = self.clone();
        let channel_id = msg.channel_id.clone();
        tokio::spawn(async move {
            let timeout = Duration::from_secs(bridge.config.capture.prompt_timeout_secs);
            let (reply_tx, reply_rx) = mpsc::channel(8);
            let forwarder = bridge.spawn_reply_forwarder(channel_id.clone(), reply_rx);
            let fields = prompt_fields(
                &mut rx,
                timeout,
                &["❓ Question?", "✅ Answer?", "💡 Hint?"],
                &reply_tx,
            )
            .await;
            drop(reply_tx);
            let _ = forwarder.await;

            let report = match fields {
                Ok(fields) => {
                    let entry = TriviaEntry {
                        question: fields[0].clone(),
                        answer: fields[1].clone(),
                        hint: fields[2].clone(),
                    };
                    let state = bridge.shared.lock().await;
                    match state.db().insert_trivia(std::slice::from_ref(&entry)) {
                        Ok(_) => "✅ Trivia entry saved.".to_string(),
                        Err(e) => {
                            tracing::error!("trivia insert failed: {e}");
                            "❌ Could not save the entry.".to_string()
                        }
                    }
                }
                // timeout drops all three fields, never a partial entry
                Err(_) => "⏰ Timed out — start over with `addtrivia`.".to_string(),
            };
            let _ = bridge.messenger.send_channel(&channel_id, &report).await;
            drop(guard);
        });
    }

    async fn start_trivia_quiz(&self, msg: &IncomingMessage) {
        let question = {
            let state = self.shared.lock().await;
            match state.db().random_trivia() {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    let _ = self
                        .messenger
                        .send_channel(&msg.channel_id, "The trivia bank is empty.")
                        .await;
                    return;
                }
                Err(e) => {
                    tracing::error!("trivia pick failed: {e}");
                    return;
                }
            }
        };
        // any author may answer
        let key = SessionKey { channel_id: msg.channel_id.clone(), author_id: None };
        let Some((guard, mut rx)) = self.registry.claim(key) else {
            let _ = self
                .messenger
                .send_channel(&msg.channel_id, "⚠️ A capture session is already running here.")
                .await;
            return;
        };
        let _ = self
            .messenger
            .send_channel(&msg.channel_id, &format!("❓ {} (hint: {})", question.question, question.hint))
            .await;

        let bridge = self.clone();
        let channel_id = msg.channel_id.clone();
        tokio::spawn(async move {
            let timeout = Duration::from_secs(bridge.config.capture.prompt_timeout_secs);
            loop {
                match torneo_capture::await_reply(&mut rx, timeout).await {
                    Ok(reply) => {
                        if reply.content.trim().eq_ignore_ascii_case(question.answer.trim()) {
                            let name = reply
                                .author_name
                                .clone()
                                .unwrap_or_else(|| reply.author_id.clone());
                            let report = {
                                let state = bridge.shared.lock().await;
                                match state.adjust_score(&reply.author_id, &name, 1) {
                                    Ok(total) => {
                                        format!("🎉 {name} got it! +1 point ({total} total).")
                                    }
                                    Err(e) => {
                                        tracing::error!("trivia award failed: {e}");
                                        format!("🎉 {name} got it!")
                                    }
                                }
                            };
                            let _ = bridge.messenger.send_channel(&channel_id, &report).await;
                            break;
                        }
                        // wrong answers keep the round open
                    }
                    Err(_) => {
                        let _ = bridge
                            .messenger
                            .send_channel(
                                &channel_id,
                                &format!("⏰ Time's up! The answer was: {}", question.answer),
                            )
                            .await;
                        break;
                    }
                }
            }
            drop(guard);
        });
    }

    // ─── Helpers ───────────────────────────────────────────

    fn spawn_reply_forwarder(
        &self,
        channel_id: String,
        mut reply_rx: mpsc::Receiver<String>,
    ) -> tokio::task::JoinHandle<()> {
        let messenger = self.messenger.clone();
        tokio::spawn(async move {
            while let Some(text) = reply_rx.recv().await {
                let _ = messenger.send_channel(&channel_id, &text).await;
            }
        })
    }

    /// DM the advancement outcome to every affected participant. Best
    /// effort: failures are logged and never block each other.
    async fn announce_partition(&self, partition: &StagePartition) {
        let stage = partition.new_stage;
        let sends = partition
            .advanced
            .iter()
            .map(|p| (p.user_id.clone(), format!("🎉 You advanced to stage {stage}!")))
            .chain(partition.eliminated.iter().map(|p| {
                (p.user_id.clone(), "🪦 You have been eliminated. Thanks for playing!".to_string())
            }));
        let futures: Vec<_> = sends
            .map(|(user_id, text)| {
                let messenger = self.messenger.clone();
                async move {
                    if let Err(e) = messenger.send_dm(&user_id, &text).await {
                        tracing::warn!(user_id = %user_id, "stage DM failed: {e}");
                    }
                }
            })
            .collect();
        futures::future::join_all(futures).await;
    }

    async fn display_name(&self, user_id: &str) -> String {
        match self
            .messenger
            .resolve_member(&self.config.guild_id, user_id)
            .await
        {
            Ok(Some(member)) => member.display_name,
            _ => user_id.to_string(),
        }
    }

    async fn scrub(&self, msg: &IncomingMessage) {
        if let Err(e) = self
            .messenger
            .delete_message(&msg.channel_id, &msg.message_id)
            .await
        {
            tracing::debug!("could not scrub message: {e}");
        }
    }
}

/// Which bulk capture flavor a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BulkKind {
    Jokes,
    Trivia,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use torneo_core::config::{StageRule, TournamentConfig};
    use torneo_core::traits::Member;
    use torneo_db::TournamentDb;

    #[derive(Default)]
    struct FakeMessenger {
        dms: StdMutex<Vec<(String, String)>>,
        channel: StdMutex<Vec<(String, String)>>,
        deleted: StdMutex<Vec<String>>,
        members: Vec<Member>,
    }

    #[async_trait]
    impl Messenger for FakeMessenger {
        async fn send_dm(&self, user_id: &str, text: &str) -> torneo_core::error::Result<()> {
            self.dms.lock().unwrap().push((user_id.into(), text.into()));
            Ok(())
        }
        async fn send_channel(&self, channel_id: &str, text: &str) -> torneo_core::error::Result<()> {
            self.channel.lock().unwrap().push((channel_id.into(), text.into()));
            Ok(())
        }
        async fn resolve_member(
            &self,
            _guild_id: &str,
            user_id: &str,
        ) -> torneo_core::error::Result<Option<Member>> {
            Ok(self.members.iter().find(|m| m.user_id == user_id).cloned())
        }
        async fn list_members(&self, _guild_id: &str) -> torneo_core::error::Result<Vec<Member>> {
            Ok(self.members.clone())
        }
        async fn delete_message(
            &self,
            _channel_id: &str,
            message_id: &str,
        ) -> torneo_core::error::Result<()> {
            self.deleted.lock().unwrap().push(message_id.into());
            Ok(())
        }
    }

    impl FakeMessenger {
        fn channel_texts(&self) -> Vec<String> {
            self.channel.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
        }
    }

    const OPERATOR: &str = "1";

    fn build(members: Vec<Member>) -> (Bridge, Arc<FakeMessenger>) {
        let db = Arc::new(TournamentDb::open_in_memory().unwrap());
        let mut config = TorneoConfig::default();
        config.operator_id = OPERATOR.into();
        config.guild_id = "g1".into();
        config.tournament = TournamentConfig {
            stages: vec![
                StageRule { number: 1, name: "Open".into(), cutoff: 4 },
                StageRule { number: 2, name: "Top".into(), cutoff: 2 },
            ],
        };
        let state = TournamentState::new(db, &config.tournament).unwrap();
        let messenger = Arc::new(FakeMessenger { members, ..Default::default() });
        let bridge = Bridge::new(
            Arc::new(Mutex::new(state)),
            messenger.clone() as Arc<dyn Messenger>,
            config,
        );
        (bridge, messenger)
    }

    fn chat(author: &str, content: &str) -> IncomingMessage {
        IncomingMessage {
            channel_id: "c1".into(),
            message_id: "m1".into(),
            author_id: author.into(),
            author_name: Some(format!("user-{author}")),
            content: content.into(),
            is_dm: false,
            timestamp: Utc::now(),
        }
    }

    fn dm(author: &str, content: &str) -> IncomingMessage {
        IncomingMessage { is_dm: true, channel_id: format!("dm-{author}"), ..chat(author, content) }
    }

    /// Wait (up to two seconds) for a spawned session task to post a reply
    /// matching `needle`.
    async fn wait_for_reply(messenger: &FakeMessenger, needle: &str) -> String {
        for _ in 0..200 {
            if let Some(t) = messenger.channel_texts().iter().find(|t| t.contains(needle)) {
                return t.clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no reply containing {needle:?}; got {:?}", messenger.channel_texts());
    }

    #[tokio::test]
    async fn operator_points_command_adjusts_scrubs_and_replies() {
        let (bridge, messenger) = build(vec![Member { user_id: "7".into(), display_name: "Lea".into() }]);
        bridge.handle_message(chat(OPERATOR, "!points <@7> 5")).await;

        let state = bridge.shared();
        let p = state.lock().await.db().get_participant("7").unwrap().unwrap();
        assert_eq!(p.points, 5);
        assert_eq!(p.display_name, "Lea");
        // command message scrubbed from the public channel
        assert_eq!(*messenger.deleted.lock().unwrap(), vec!["m1".to_string()]);
        assert!(messenger.channel_texts().iter().any(|t| t.contains("Lea now has 5 points")));
    }

    #[tokio::test]
    async fn non_operator_mutating_command_is_silently_scrubbed() {
        let (bridge, messenger) = build(vec![]);
        bridge.handle_message(chat("99", "!points <@7> 5")).await;

        assert!(messenger.channel_texts().is_empty());
        assert_eq!(*messenger.deleted.lock().unwrap(), vec!["m1".to_string()]);
        let state = bridge.shared();
        assert!(state.lock().await.db().get_participant("7").unwrap().is_none());
    }

    #[tokio::test]
    async fn score_and_rankings_are_open_to_anyone() {
        let (bridge, messenger) = build(vec![]);
        {
            let state = bridge.shared();
            let state = state.lock().await;
            state.adjust_score("99", "Max", 3).unwrap();
        }
        bridge.handle_message(chat("99", "!score")).await;
        assert!(messenger.channel_texts().iter().any(|t| t.contains("3 points")));

        bridge.handle_message(chat("99", "!rankings")).await;
        assert!(messenger.channel_texts().iter().any(|t| t.contains("1. Max")));
        // open commands are not scrubbed
        assert!(messenger.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn bulk_capture_refuses_public_channels() {
        let (bridge, messenger) = build(vec![]);
        bridge.handle_message(chat(OPERATOR, "!bulkjokes")).await;
        // wrong venue is a silent rejection, same as wrong identity
        assert!(messenger.channel_texts().is_empty());
        assert_eq!(*messenger.deleted.lock().unwrap(), vec!["m1".to_string()]);
    }

    #[tokio::test]
    async fn notify_rejects_past_times() {
        let (bridge, messenger) = build(vec![]);
        bridge
            .handle_message(dm(OPERATOR, "!notify 01/01/2020 10:00 everyone hello"))
            .await;
        assert!(messenger.channel_texts().iter().any(|t| t.contains("future")));
        let state = bridge.shared();
        assert!(state.lock().await.db().list_notifications().unwrap().is_empty());
    }

    #[tokio::test]
    async fn notify_persists_normalized_recipient_spec() {
        let (bridge, messenger) = build(vec![]);
        bridge
            .handle_message(dm(OPERATOR, "!notify 01/01/2099 10:00 Stage2 finals soon"))
            .await;
        assert!(messenger.channel_texts().iter().any(|t| t.contains("scheduled")));
        let state = bridge.shared();
        let rows = state.lock().await.db().list_notifications().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].recipients, "stage2");
        assert_eq!(rows[0].message, "finals soon");
    }

    #[tokio::test]
    async fn bulk_jokes_session_collects_and_commits() {
        let (bridge, messenger) = build(vec![]);
        bridge.handle_message(dm(OPERATOR, "!bulkjokes")).await;
        assert!(messenger.channel_texts().iter().any(|t| t.contains("one per line")));

        bridge.handle_message(dm(OPERATOR, "first joke")).await;
        bridge.handle_message(dm(OPERATOR, "second joke")).await;
        bridge.handle_message(dm(OPERATOR, "done")).await;

        wait_for_reply(&messenger, "Added 2").await;
        let state = bridge.shared();
        assert!(state.lock().await.db().random_joke().unwrap().is_some());
    }

    #[tokio::test]
    async fn bulk_session_with_no_entries_adds_nothing() {
        let (bridge, messenger) = build(vec![]);
        bridge.handle_message(dm(OPERATOR, "!bulkjokes")).await;
        bridge.handle_message(dm(OPERATOR, "done")).await;

        wait_for_reply(&messenger, "Nothing added").await;
        let state = bridge.shared();
        assert!(state.lock().await.db().random_joke().unwrap().is_none());
    }

    #[tokio::test]
    async fn trivia_quiz_awards_a_point_to_the_first_correct_answer() {
        let (bridge, messenger) = build(vec![]);
        {
            let state = bridge.shared();
            let state = state.lock().await;
            state
                .db()
                .insert_trivia(&[TriviaEntry {
                    question: "Capital of Peru?".into(),
                    answer: "Lima".into(),
                    hint: "starts with L".into(),
                }])
                .unwrap();
        }
        bridge.handle_message(chat(OPERATOR, "!trivia")).await;
        assert!(messenger.channel_texts().iter().any(|t| t.contains("Capital of Peru?")));

        bridge.handle_message(chat("55", "Cusco")).await;
        bridge.handle_message(chat("55", "lima")).await;

        wait_for_reply(&messenger, "got it").await;
        let state = bridge.shared();
        let p = state.lock().await.db().get_participant("55").unwrap().unwrap();
        assert_eq!(p.points, 1);
    }

    #[tokio::test]
    async fn api_adjust_resolves_names_and_rejects_unknown_members() {
        let (bridge, _messenger) =
            build(vec![Member { user_id: "7".into(), display_name: "Lea".into() }]);

        assert_eq!(bridge.api_adjust_score("7", 5).await.unwrap(), 5);
        let state = bridge.shared();
        assert_eq!(
            state.lock().await.db().get_participant("7").unwrap().unwrap().display_name,
            "Lea"
        );

        let err = bridge.api_adjust_score("8", 1).await.unwrap_err();
        assert!(matches!(err, TorneoError::NotFound(_)));
        let err = bridge.api_adjust_score("not-an-id", 1).await.unwrap_err();
        assert!(matches!(err, TorneoError::Validation(_)));
    }

    #[tokio::test]
    async fn api_remove_is_idempotent() {
        let (bridge, _messenger) = build(vec![]);
        {
            let state = bridge.shared();
            state.lock().await.adjust_score("7", "Lea", 5).unwrap();
        }
        bridge.api_remove_member("7").await.unwrap();
        bridge.api_remove_member("7").await.unwrap();
        let state = bridge.shared();
        assert!(state.lock().await.db().get_participant("7").unwrap().is_none());
    }

    #[tokio::test]
    async fn free_text_score_trigger_answers_in_place() {
        let (bridge, messenger) = build(vec![]);
        {
            let state = bridge.shared();
            state.lock().await.adjust_score("42", "Ana", 7).unwrap();
        }
        bridge.handle_message(chat("42", "hey bot, what's my score?")).await;
        assert!(messenger.channel_texts().iter().any(|t| t.contains("7 points")));
    }
}
