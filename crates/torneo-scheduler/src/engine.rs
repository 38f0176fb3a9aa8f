//! The scheduler engine — the periodic check-and-deliver loop.
//! Uses tokio::interval for ticking; the tick itself takes `now` as a
//! parameter so tests can drive it with a fake clock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{Mutex, watch};
use torneo_core::traits::Messenger;
use torneo_core::types::RecipientSpec;
use torneo_state::TournamentState;

/// What one tick did. Mostly for logs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickReport {
    /// Notification rows read and retired.
    pub processed: usize,
    /// Individual DMs that went through.
    pub delivered: usize,
    /// Individual DMs that failed (logged, never propagated).
    pub failed: usize,
}

/// The notification scheduler. Shares the tournament lock with the command
/// bridge so a tick can never interleave with a manual edit of the same row.
pub struct NotificationScheduler {
    shared: Arc<Mutex<TournamentState>>,
    messenger: Arc<dyn Messenger>,
    guild_id: String,
}

impl NotificationScheduler {
    pub fn new(
        shared: Arc<Mutex<TournamentState>>,
        messenger: Arc<dyn Messenger>,
        guild_id: &str,
    ) -> Self {
        Self {
            shared,
            messenger,
            guild_id: guild_id.to_string(),
        }
    }

    /// Process everything due at `now`. Holds the tournament lock for the
    /// whole read → deliver → delete sequence.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let state = self.shared.lock().await;
        let due = match state.db().due_notifications(now) {
            Ok(due) => due,
            Err(e) => {
                tracing::error!("notification query failed: {e}");
                return TickReport::default();
            }
        };

        let mut report = TickReport::default();
        for noti in due {
            let recipients = self.resolve_recipients(&state, noti.recipient_spec()).await;

            // Deliveries are independent and fire concurrently, but every
            // attempt is awaited before the row is retired.
            let sends = recipients
                .iter()
                .map(|user_id| self.messenger.send_dm(user_id, &noti.message));
            for (user_id, result) in recipients.iter().zip(join_all(sends).await) {
                match result {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(notification = noti.id, user_id = %user_id, "delivery failed: {e}");
                    }
                }
            }

            // At-most-once: retire regardless of delivery outcomes.
            if let Err(e) = state.db().delete_notification(noti.id) {
                tracing::error!(notification = noti.id, "failed to retire notification: {e}");
            }
            report.processed += 1;
        }
        report
    }

    async fn resolve_recipients(
        &self,
        state: &TournamentState,
        spec: RecipientSpec,
    ) -> Vec<String> {
        match spec {
            RecipientSpec::Everyone => match self.messenger.list_members(&self.guild_id).await {
                Ok(members) => members.into_iter().map(|m| m.user_id).collect(),
                Err(e) => {
                    // Counts as a failed delivery pass; the row is still
                    // retired by the caller.
                    tracing::warn!("member snapshot failed: {e}");
                    Vec::new()
                }
            },
            RecipientSpec::Stage(n) => state.db().participants_at_stage(n).unwrap_or_else(|e| {
                tracing::warn!(stage = n, "stage query failed: {e}");
                Vec::new()
            }),
            RecipientSpec::Unknown(raw) => {
                tracing::debug!(spec = %raw, "unrecognized recipient spec, dropping");
                Vec::new()
            }
        }
    }
}

/// Run the scheduler loop until the stop signal flips. The interval is the
/// only suspension point besides the tick itself.
pub async fn spawn_scheduler(
    scheduler: Arc<NotificationScheduler>,
    tick_secs: u64,
    mut stop: watch::Receiver<bool>,
) {
    tracing::info!("scheduler started (check every {tick_secs}s)");
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(tick_secs));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = scheduler.tick(Utc::now()).await;
                if report.processed > 0 {
                    tracing::info!(
                        processed = report.processed,
                        delivered = report.delivered,
                        failed = report.failed,
                        "notifications dispatched"
                    );
                }
            }
            _ = stop.changed() => {
                tracing::info!("scheduler stopped");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex as StdMutex;
    use torneo_core::config::{StageRule, TournamentConfig};
    use torneo_core::error::{Result, TorneoError};
    use torneo_core::traits::Member;
    use torneo_db::TournamentDb;

    /// Records every DM; ids listed in `failing` error on send.
    #[derive(Default)]
    struct FakeMessenger {
        members: Vec<Member>,
        failing: Vec<String>,
        sent: StdMutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Messenger for FakeMessenger {
        async fn send_dm(&self, user_id: &str, text: &str) -> Result<()> {
            if self.failing.iter().any(|f| f == user_id) {
                return Err(TorneoError::Delivery(format!("dm to {user_id} refused")));
            }
            self.sent
                .lock()
                .unwrap()
                .push((user_id.to_string(), text.to_string()));
            Ok(())
        }
        async fn send_channel(&self, _channel_id: &str, _text: &str) -> Result<()> {
            Ok(())
        }
        async fn resolve_member(&self, _guild_id: &str, user_id: &str) -> Result<Option<Member>> {
            Ok(self.members.iter().find(|m| m.user_id == user_id).cloned())
        }
        async fn list_members(&self, _guild_id: &str) -> Result<Vec<Member>> {
            Ok(self.members.clone())
        }
        async fn delete_message(&self, _channel_id: &str, _message_id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn member(id: &str) -> Member {
        Member { user_id: id.into(), display_name: id.into() }
    }

    fn setup(messenger: FakeMessenger) -> (Arc<Mutex<TournamentState>>, NotificationScheduler) {
        let db = Arc::new(TournamentDb::open_in_memory().unwrap());
        let cfg = TournamentConfig {
            stages: vec![
                StageRule { number: 1, name: "Open".into(), cutoff: 8 },
                StageRule { number: 2, name: "Top".into(), cutoff: 4 },
                StageRule { number: 3, name: "Elite".into(), cutoff: 2 },
            ],
        };
        let state = Arc::new(Mutex::new(TournamentState::new(db, &cfg).unwrap()));
        let scheduler = NotificationScheduler::new(state.clone(), Arc::new(messenger), "g1");
        (state, scheduler)
    }

    #[tokio::test]
    async fn due_notification_is_processed_once_and_removed() {
        let messenger = FakeMessenger {
            members: vec![member("1"), member("2")],
            ..Default::default()
        };
        let (state, scheduler) = setup(messenger);
        let now = Utc::now();
        {
            let s = state.lock().await;
            s.db()
                .insert_notification(now - Duration::minutes(1), "everyone", "hello")
                .unwrap();
        }

        let report = scheduler.tick(now).await;
        assert_eq!(report.processed, 1);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 0);

        // re-running with nothing due is a no-op
        let report = scheduler.tick(now).await;
        assert_eq!(report.processed, 0);
        let s = state.lock().await;
        assert!(s.db().list_notifications().unwrap().is_empty());
    }

    #[tokio::test]
    async fn future_notifications_wait_their_turn() {
        let messenger = FakeMessenger {
            members: vec![member("1")],
            ..Default::default()
        };
        let (state, scheduler) = setup(messenger);
        let now = Utc::now();
        {
            let s = state.lock().await;
            s.db()
                .insert_notification(now + Duration::minutes(10), "everyone", "later")
                .unwrap();
        }

        assert_eq!(scheduler.tick(now).await.processed, 0);
        // the very next tick after the time passes picks it up
        let report = scheduler.tick(now + Duration::minutes(11)).await;
        assert_eq!(report.processed, 1);
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn stage_spec_targets_exactly_that_stage() {
        let messenger = FakeMessenger::default();
        let (state, scheduler) = setup(messenger);
        let now = Utc::now();
        {
            let s = state.lock().await;
            for id in ["a", "b"] {
                s.adjust_score(id, id, 1).unwrap();
            }
            let mut c = torneo_core::types::Participant::new("c", "c", 3);
            c.points = 5;
            s.db().upsert_participant(&c).unwrap();
            s.db()
                .insert_notification(now - Duration::minutes(1), "stage 3", "finals soon")
                .unwrap();
        }

        let report = scheduler.tick(now).await;
        assert_eq!(report.processed, 1);
        // only "c" sits at stage 3
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn unknown_spec_delivers_nothing_but_still_retires() {
        let messenger = FakeMessenger {
            members: vec![member("1")],
            ..Default::default()
        };
        let (state, scheduler) = setup(messenger);
        let now = Utc::now();
        {
            let s = state.lock().await;
            s.db()
                .insert_notification(now - Duration::minutes(1), "vip-table", "psst")
                .unwrap();
        }

        let report = scheduler.tick(now).await;
        assert_eq!(report.processed, 1);
        assert_eq!(report.delivered, 0);
        assert_eq!(report.failed, 0);
        let s = state.lock().await;
        assert!(s.db().list_notifications().unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_failing_recipient_blocks_nothing() {
        let messenger = FakeMessenger {
            members: vec![member("ok1"), member("bad"), member("ok2")],
            failing: vec!["bad".into()],
            ..Default::default()
        };
        let (state, scheduler) = setup(messenger);
        let now = Utc::now();
        {
            let s = state.lock().await;
            s.db()
                .insert_notification(now - Duration::minutes(1), "everyone", "round starts")
                .unwrap();
        }

        let report = scheduler.tick(now).await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        // the row is retired despite the failure
        let s = state.lock().await;
        assert!(s.db().list_notifications().unwrap().is_empty());
    }
}
