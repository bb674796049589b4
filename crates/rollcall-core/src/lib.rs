//! rollcall-core — Attendance matching and ledger engine.
//!
//! Matches face signatures from a camera frame against a roster of
//! registered identities, keeps a per-day attendance ledger, and
//! aggregates it for charts and reports. Signature extraction happens
//! outside this crate.

pub mod aggregate;
pub mod journal;
pub mod ledger;
mod lock;
pub mod matcher;
pub mod report;
pub mod roster;
pub mod service;
pub mod types;

pub use aggregate::{Bucket, Granularity, Summary};
pub use journal::{Journal, JournalError, NullJournal};
pub use ledger::{AbsentPolicy, AttendanceLedger, LedgerError};
pub use matcher::{FirstWithinTolerance, FrameMatch, MatchDecision, MatchPolicy, Matcher, Nearest, DEFAULT_TOLERANCE};
pub use report::{AttendanceReport, Recipient};
pub use roster::{RosterError, SignatureStore};
pub use service::{AttendanceError, AttendanceService, AttendanceSheet, Settings};
pub use types::{AttendanceEvent, AttendanceStatus, Identity, IdentitySummary, Signature};
