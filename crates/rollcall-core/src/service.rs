//! Operations exposed to the transport layer.
//!
//! `AttendanceService` owns the roster and the ledger. Mutations (register,
//! take attendance) are serialized by one writer lock and journaled before
//! they become visible; reads go straight to the stores.

use crate::aggregate::{self, Bucket, Granularity};
use crate::journal::{Journal, JournalError, NullJournal};
use crate::ledger::{AbsentPolicy, AttendanceLedger, LedgerError};
use crate::lock;
use crate::matcher::{self, MatchDecision, MatchError, MatchPolicy, DEFAULT_TOLERANCE};
use crate::report::{AttendanceReport, Recipient};
use crate::roster::{RosterError, SignatureStore};
use crate::types::{AttendanceEvent, Identity, IdentitySummary, Signature};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttendanceError {
    #[error("no face detected; upload a clear front-facing photo")]
    NoFaceDetected,
    #[error("no identities registered")]
    EmptyRoster,
    #[error("unknown identity: {0}")]
    UnknownIdentity(u64),
    #[error("malformed signature: {0}")]
    Decode(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Journal(#[from] JournalError),
}

impl From<MatchError> for AttendanceError {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::EmptyRoster => AttendanceError::EmptyRoster,
            e @ (MatchError::DimensionMismatch { .. } | MatchError::MalformedSignature { .. }) => {
                AttendanceError::Decode(e.to_string())
            }
        }
    }
}

impl From<RosterError> for AttendanceError {
    fn from(err: RosterError) -> Self {
        match err {
            RosterError::UnknownIdentity(id) => AttendanceError::UnknownIdentity(id),
            e => AttendanceError::Decode(e.to_string()),
        }
    }
}

impl From<LedgerError> for AttendanceError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::UnknownIdentity(id) => AttendanceError::UnknownIdentity(id),
            e @ LedgerError::RepeatedInRun(_) => AttendanceError::InvalidInput(e.to_string()),
        }
    }
}

/// Matching and ledger behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tolerance: f64,
    pub match_policy: MatchPolicy,
    pub absent_policy: AbsentPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            match_policy: MatchPolicy::default(),
            absent_policy: AbsentPolicy::default(),
        }
    }
}

/// Result of one attendance run, by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSheet {
    pub date: NaiveDate,
    pub present: Vec<String>,
    pub absent: Vec<String>,
    pub decisions: Vec<MatchDecision>,
    /// Ledger rows this run appended.
    pub recorded: usize,
}

pub struct AttendanceService {
    roster: SignatureStore,
    ledger: AttendanceLedger,
    journal: Box<dyn Journal>,
    settings: Settings,
    writer: Mutex<()>,
}

impl AttendanceService {
    /// In-memory service with nothing registered.
    pub fn new(settings: Settings) -> Self {
        Self::with_journal(settings, Box::new(NullJournal))
    }

    pub fn with_journal(settings: Settings, journal: Box<dyn Journal>) -> Self {
        Self {
            roster: SignatureStore::new(),
            ledger: AttendanceLedger::new(settings.absent_policy),
            journal,
            settings,
            writer: Mutex::new(()),
        }
    }

    /// Rebuild from persisted identities and events.
    pub fn restore(
        settings: Settings,
        identities: Vec<Identity>,
        events: Vec<AttendanceEvent>,
        journal: Box<dyn Journal>,
    ) -> Result<Self, AttendanceError> {
        let ids: Vec<u64> = identities.iter().map(|i| i.id).collect();
        let roster = SignatureStore::restore(identities)?;
        let ledger = AttendanceLedger::restore(settings.absent_policy, ids, events)?;
        tracing::info!(identities = roster.len(), "attendance state restored");
        Ok(Self {
            roster,
            ledger,
            journal,
            settings,
            writer: Mutex::new(()),
        })
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Register a person from the extractor's output. `None` means the
    /// extractor found no face in the registration photo.
    pub fn register_identity(
        &self,
        name: &str,
        signature: Option<Signature>,
    ) -> Result<u64, AttendanceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AttendanceError::InvalidInput("name required".into()));
        }
        let signature = signature.ok_or(AttendanceError::NoFaceDetected)?;

        let _guard = lock::lock(&self.writer);
        let identity = self.roster.add_with(name, signature, Utc::now(), |identity| {
            self.journal.identity_added(identity)?;
            self.ledger.init(identity.id);
            Ok::<(), AttendanceError>(())
        })?;

        tracing::info!(id = identity.id, name = %identity.name, "identity registered");
        Ok(identity.id)
    }

    /// Match a frame's signatures against the roster and record the run
    /// in the ledger for `date`.
    pub fn take_attendance(
        &self,
        frame_signatures: &[Signature],
        date: NaiveDate,
    ) -> Result<AttendanceSheet, AttendanceError> {
        let _guard = lock::lock(&self.writer);
        let roster = self.roster.list();
        let run = matcher::match_frame(
            self.settings.match_policy.matcher(),
            frame_signatures,
            &roster,
            self.settings.tolerance,
        )?;

        let recorded = self.ledger.apply_run(&run, date, |events| {
            self.journal.events_appended(events)?;
            Ok::<(), AttendanceError>(())
        })?;

        let names: HashMap<u64, &str> = roster.iter().map(|i| (i.id, i.name.as_str())).collect();
        let to_names = |ids: &[u64]| -> Vec<String> {
            ids.iter()
                .filter_map(|id| names.get(id).map(|n| n.to_string()))
                .collect()
        };

        let sheet = AttendanceSheet {
            date,
            present: to_names(&run.present),
            absent: to_names(&run.absent),
            decisions: run.decisions,
            recorded: recorded.len(),
        };
        tracing::info!(
            %date,
            faces = frame_signatures.len(),
            present = sheet.present.len(),
            absent = sheet.absent.len(),
            recorded = sheet.recorded,
            "attendance taken"
        );
        Ok(sheet)
    }

    pub fn list_identities(&self) -> Vec<IdentitySummary> {
        self.roster.list().iter().map(Identity::summary).collect()
    }

    pub fn identity_count(&self) -> usize {
        self.roster.len()
    }

    pub fn signature_dimension(&self) -> Option<usize> {
        self.roster.dimension()
    }

    pub fn history(&self, identity_id: u64) -> Result<Vec<AttendanceEvent>, AttendanceError> {
        Ok(self.ledger.history(identity_id)?)
    }

    /// Present/absent counts per day or month, for charting.
    pub fn series(
        &self,
        identity_id: u64,
        granularity: Granularity,
    ) -> Result<Vec<Bucket>, AttendanceError> {
        let history = self.ledger.history(identity_id)?;
        Ok(aggregate::bucket(&history, granularity))
    }

    pub fn summary_report(
        &self,
        identity_id: u64,
        recipient: Recipient,
    ) -> Result<AttendanceReport, AttendanceError> {
        let identity = self.roster.get(identity_id)?;
        let history = self.ledger.history(identity_id)?;
        Ok(AttendanceReport {
            identity_id,
            name: identity.name,
            recipient,
            generated_at: Utc::now(),
            summary: aggregate::summary(&history),
            history,
        })
    }
}
