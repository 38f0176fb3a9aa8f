//! # Torneo State
//! The tournament state machine: one process-wide stage counter, the static
//! stage → cutoff mapping, and every scoring / advancement operation.
//!
//! Nothing here locks. The command bridge owns the single
//! `tokio::sync::Mutex` around this struct and every caller goes through it,
//! so each method can assume it holds the whole read-modify-write window.

use std::collections::BTreeMap;
use std::sync::Arc;

use torneo_core::config::{StageRule, TournamentConfig};
use torneo_core::error::{Result, TorneoError};
use torneo_core::types::Participant;
use torneo_db::TournamentDb;

const STAGE_KEY: &str = "current_stage";

/// Outcome of `advance_stage`: who moved up and who stayed behind.
/// `advanced.len() + eliminated.len()` always equals the participant count.
#[derive(Debug, Clone)]
pub struct StagePartition {
    pub new_stage: u32,
    pub advanced: Vec<Participant>,
    pub eliminated: Vec<Participant>,
}

/// The process-wide tournament singleton.
pub struct TournamentState {
    current_stage: u32,
    rules: BTreeMap<u32, StageRule>,
    db: Arc<TournamentDb>,
}

impl TournamentState {
    /// Build from config, restoring the stage counter from the store if a
    /// previous run left one behind.
    pub fn new(db: Arc<TournamentDb>, config: &TournamentConfig) -> Result<Self> {
        let current_stage = match db.get_meta(STAGE_KEY)? {
            Some(v) => v.parse::<u32>().unwrap_or(1),
            None => {
                db.set_meta(STAGE_KEY, "1")?;
                1
            }
        };
        Ok(Self {
            current_stage,
            rules: config.rules(),
            db,
        })
    }

    pub fn current_stage(&self) -> u32 {
        self.current_stage
    }

    /// Display name of a stage, if configured.
    pub fn stage_name(&self, stage: u32) -> Option<&str> {
        self.rules.get(&stage).map(|r| r.name.as_str())
    }

    pub fn db(&self) -> &TournamentDb {
        &self.db
    }

    /// Add `delta` (possibly negative, never clamped) to a participant's
    /// point total, creating the record at the current stage on first touch.
    /// Returns the new total.
    pub fn adjust_score(&self, user_id: &str, display_name: &str, delta: i64) -> Result<i64> {
        let mut p = self.read_or_create(user_id, display_name)?;
        p.points += delta;
        self.db.upsert_participant(&p)?;
        tracing::debug!(user_id, delta, total = p.points, "score adjusted");
        Ok(p.points)
    }

    /// Same pattern as `adjust_score`, against the symbolic-reward field.
    pub fn award_medals(&self, user_id: &str, display_name: &str, amount: i64) -> Result<i64> {
        let mut p = self.read_or_create(user_id, display_name)?;
        p.medals += amount;
        self.db.upsert_participant(&p)?;
        Ok(p.medals)
    }

    /// Ranked participants, best first, with 1-based ranks. Points sort
    /// descending; ties keep registration order — a deterministic but
    /// otherwise arbitrary tie-break.
    pub fn rankings(&self) -> Result<Vec<(Participant, usize)>> {
        let mut participants = self.db.list_participants()?;
        participants.sort_by_key(|p| std::cmp::Reverse(p.points));
        Ok(participants
            .into_iter()
            .enumerate()
            .map(|(i, p)| (p, i + 1))
            .collect())
    }

    /// Move the tournament to the next stage. The cutoff of the stage being
    /// left decides how many top-ranked participants advance (stage field
    /// updated and persisted); the rest are returned as eliminated with
    /// their records untouched.
    ///
    /// Atomic on the configuration check: if the next stage number is not
    /// configured the counter is not incremented and no participant changes.
    pub fn advance_stage(&mut self) -> Result<StagePartition> {
        let next = self.current_stage + 1;
        if !self.rules.contains_key(&next) {
            return Err(TorneoError::UnconfiguredStage(next));
        }
        let cutoff = self
            .rules
            .get(&self.current_stage)
            .ok_or(TorneoError::UnconfiguredStage(self.current_stage))?
            .cutoff;

        let ranked = self.rankings()?;
        let mut advanced = Vec::new();
        let mut eliminated = Vec::new();
        for (idx, (mut p, _rank)) in ranked.into_iter().enumerate() {
            if idx < cutoff {
                p.stage = next;
                self.db.upsert_participant(&p)?;
                advanced.push(p);
            } else {
                eliminated.push(p);
            }
        }

        self.current_stage = next;
        self.db.set_meta(STAGE_KEY, &next.to_string())?;
        tracing::info!(
            stage = next,
            advanced = advanced.len(),
            eliminated = eliminated.len(),
            "stage advanced"
        );
        Ok(StagePartition { new_stage: next, advanced, eliminated })
    }

    /// Step the tournament back one stage and put *every* participant at the
    /// new stage, regardless of where they were. Intentionally asymmetric
    /// with advancement: retreat never re-ranks.
    pub fn retreat_stage(&mut self) -> Result<u32> {
        if self.current_stage <= 1 {
            return Err(TorneoError::AtFloor);
        }
        let new_stage = self.current_stage - 1;
        self.db.set_all_stages(new_stage)?;
        self.current_stage = new_stage;
        self.db.set_meta(STAGE_KEY, &new_stage.to_string())?;
        tracing::info!(stage = new_stage, "stage retreated");
        Ok(new_stage)
    }

    /// Unconditional override of the stage counter. No participant fields
    /// are touched.
    pub fn set_stage(&mut self, stage: u32) -> Result<()> {
        self.current_stage = stage;
        self.db.set_meta(STAGE_KEY, &stage.to_string())?;
        Ok(())
    }

    /// Remove a participant record. Absent participants are a no-op.
    pub fn remove_participant(&self, user_id: &str) -> Result<()> {
        self.db.delete_participant(user_id)
    }

    fn read_or_create(&self, user_id: &str, display_name: &str) -> Result<Participant> {
        match self.db.get_participant(user_id)? {
            Some(p) => Ok(p),
            None => Ok(Participant::new(user_id, display_name, self.current_stage)),
        }
    }
}
