//! Append-only attendance ledger.
//!
//! Present is recorded at most once per identity per day. Absent is
//! appended on every run by default, so repeated runs on one day build up
//! duplicate Absent rows; [`AbsentPolicy::OncePerDay`] deduplicates them
//! the same way Present is.

use crate::lock;
use crate::matcher::FrameMatch;
use crate::types::{AttendanceEvent, AttendanceStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("unknown identity: {0}")]
    UnknownIdentity(u64),
    #[error("identity {0} is marked more than once in one run")]
    RepeatedInRun(u64),
}

/// How repeated Absent marks on the same day are recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AbsentPolicy {
    #[default]
    Append,
    OncePerDay,
}

impl AbsentPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Some(AbsentPolicy::Append),
            "once-per-day" | "once_per_day" => Some(AbsentPolicy::OncePerDay),
            _ => None,
        }
    }
}

pub struct AttendanceLedger {
    events: RwLock<HashMap<u64, Vec<AttendanceEvent>>>,
    absent_policy: AbsentPolicy,
}

impl Default for AttendanceLedger {
    fn default() -> Self {
        Self::new(AbsentPolicy::default())
    }
}

/// Whether `status` for `(identity, date)` would add a row to `history`.
fn should_append(
    history: &[AttendanceEvent],
    status: AttendanceStatus,
    date: NaiveDate,
    absent_policy: AbsentPolicy,
) -> bool {
    let already_marked = || history.iter().any(|e| e.date == date && e.status == status);
    match status {
        AttendanceStatus::Present => !already_marked(),
        AttendanceStatus::Absent => match absent_policy {
            AbsentPolicy::Append => true,
            AbsentPolicy::OncePerDay => !already_marked(),
        },
    }
}

impl AttendanceLedger {
    pub fn new(absent_policy: AbsentPolicy) -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            absent_policy,
        }
    }

    /// Rebuild a ledger from persisted identities and events. Events keep
    /// their given order within each identity.
    pub fn restore(
        absent_policy: AbsentPolicy,
        identity_ids: impl IntoIterator<Item = u64>,
        events: impl IntoIterator<Item = AttendanceEvent>,
    ) -> Result<Self, LedgerError> {
        let mut map: HashMap<u64, Vec<AttendanceEvent>> =
            identity_ids.into_iter().map(|id| (id, Vec::new())).collect();
        for event in events {
            map.get_mut(&event.identity_id)
                .ok_or(LedgerError::UnknownIdentity(event.identity_id))?
                .push(event);
        }
        Ok(Self {
            events: RwLock::new(map),
            absent_policy,
        })
    }

    pub fn absent_policy(&self) -> AbsentPolicy {
        self.absent_policy
    }

    /// Start an empty history for a newly registered identity. Existing
    /// history is left alone.
    pub fn init(&self, identity_id: u64) {
        lock::write(&self.events).entry(identity_id).or_default();
    }

    pub fn contains(&self, identity_id: u64) -> bool {
        lock::read(&self.events).contains_key(&identity_id)
    }

    /// Record one status mark. Returns whether a row was appended.
    pub fn apply(
        &self,
        identity_id: u64,
        status: AttendanceStatus,
        date: NaiveDate,
    ) -> Result<bool, LedgerError> {
        let mut events = lock::write(&self.events);
        let history = events
            .get_mut(&identity_id)
            .ok_or(LedgerError::UnknownIdentity(identity_id))?;
        if !should_append(history, status, date, self.absent_policy) {
            return Ok(false);
        }
        history.push(AttendanceEvent::new(identity_id, date, status));
        Ok(true)
    }

    /// Apply a whole attendance run. Either every mark is applied or, when
    /// an identity is unknown, listed more than once, or `before_commit`
    /// fails, none are. Returns the appended rows.
    pub fn apply_run<E, F>(
        &self,
        run: &FrameMatch,
        date: NaiveDate,
        before_commit: F,
    ) -> Result<Vec<AttendanceEvent>, E>
    where
        E: From<LedgerError>,
        F: FnOnce(&[AttendanceEvent]) -> Result<(), E>,
    {
        let mut events = lock::write(&self.events);
        let planned = self.plan_locked(&events, run, date)?;
        before_commit(&planned)?;

        for event in &planned {
            if let Some(history) = events.get_mut(&event.identity_id) {
                history.push(event.clone());
            }
        }
        Ok(planned)
    }

    fn plan_locked(
        &self,
        events: &HashMap<u64, Vec<AttendanceEvent>>,
        run: &FrameMatch,
        date: NaiveDate,
    ) -> Result<Vec<AttendanceEvent>, LedgerError> {
        let marks = run
            .present
            .iter()
            .map(|&id| (id, AttendanceStatus::Present))
            .chain(run.absent.iter().map(|&id| (id, AttendanceStatus::Absent)));

        let mut planned = Vec::new();
        let mut marked = HashSet::new();
        for (id, status) in marks {
            let history = events.get(&id).ok_or(LedgerError::UnknownIdentity(id))?;
            // One mark per identity per run; only then is the committed
            // history enough to decide.
            if !marked.insert(id) {
                return Err(LedgerError::RepeatedInRun(id));
            }
            if should_append(history, status, date, self.absent_policy) {
                planned.push(AttendanceEvent::new(id, date, status));
            }
        }
        Ok(planned)
    }

    /// Events for one identity in the order they were recorded.
    pub fn history(&self, identity_id: u64) -> Result<Vec<AttendanceEvent>, LedgerError> {
        lock::read(&self.events)
            .get(&identity_id)
            .cloned()
            .ok_or(LedgerError::UnknownIdentity(identity_id))
    }
}
