//! SQLite persistence for identities and attendance rows.
//!
//! The daemon restores its in-memory state from here at startup and writes
//! every change through [`Journal`] before it becomes visible.

use chrono::{DateTime, NaiveDate, Utc};
use rollcall_core::{AttendanceEvent, AttendanceStatus, Identity, Journal, JournalError, Signature};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS identities (
    id            INTEGER PRIMARY KEY,
    name          TEXT NOT NULL,
    signature     BLOB NOT NULL,
    registered_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS attendance (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    identity_id INTEGER NOT NULL REFERENCES identities(id),
    date        TEXT NOT NULL,
    status      TEXT NOT NULL CHECK (status IN ('Present', 'Absent'))
);
CREATE INDEX IF NOT EXISTS idx_attendance_identity ON attendance(identity_id, seq);
";

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub struct SqliteJournal {
    conn: Mutex<Connection>,
}

impl SqliteJournal {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Database that lives only as long as the returned value.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All identities ordered by id, and all attendance rows in the order
    /// they were recorded.
    pub fn load(&self) -> Result<(Vec<Identity>, Vec<AttendanceEvent>), StoreError> {
        let conn = self.conn();

        let mut stmt =
            conn.prepare("SELECT id, name, signature, registered_at FROM identities ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut identities = Vec::new();
        for row in rows {
            let (id, name, blob, registered_at) = row?;
            identities.push(Identity {
                id: to_id(id)?,
                name,
                signature: decode_signature(&blob)?,
                registered_at: DateTime::parse_from_rfc3339(&registered_at)
                    .map_err(|e| StoreError::Corrupt(format!("identity {id} registered_at: {e}")))?
                    .with_timezone(&Utc),
            });
        }

        let mut stmt =
            conn.prepare("SELECT identity_id, date, status FROM attendance ORDER BY seq")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut events = Vec::new();
        for row in rows {
            let (identity_id, date, status) = row?;
            events.push(AttendanceEvent {
                identity_id: to_id(identity_id)?,
                date: NaiveDate::parse_from_str(&date, DATE_FORMAT)
                    .map_err(|e| StoreError::Corrupt(format!("attendance date {date:?}: {e}")))?,
                status: AttendanceStatus::parse(&status)
                    .ok_or_else(|| StoreError::Corrupt(format!("attendance status {status:?}")))?,
            });
        }

        tracing::debug!(identities = identities.len(), events = events.len(), "store loaded");
        Ok((identities, events))
    }

    fn insert_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO identities (id, name, signature, registered_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                identity.id as i64,
                identity.name,
                encode_signature(&identity.signature),
                identity.registered_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn insert_events(&self, events: &[AttendanceEvent]) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO attendance (identity_id, date, status) VALUES (?1, ?2, ?3)",
            )?;
            for event in events {
                stmt.execute(params![
                    event.identity_id as i64,
                    event.date.format(DATE_FORMAT).to_string(),
                    event.status.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

impl Journal for SqliteJournal {
    fn identity_added(&self, identity: &Identity) -> Result<(), JournalError> {
        self.insert_identity(identity).map_err(|e| {
            tracing::error!(id = identity.id, error = %e, "failed to persist identity");
            JournalError::new(e)
        })
    }

    fn events_appended(&self, events: &[AttendanceEvent]) -> Result<(), JournalError> {
        if events.is_empty() {
            return Ok(());
        }
        self.insert_events(events).map_err(|e| {
            tracing::error!(count = events.len(), error = %e, "failed to persist attendance rows");
            JournalError::new(e)
        })
    }
}

fn to_id(raw: i64) -> Result<u64, StoreError> {
    u64::try_from(raw).map_err(|_| StoreError::Corrupt(format!("negative id {raw}")))
}

/// Signatures are stored as packed little-endian f64s.
fn encode_signature(signature: &Signature) -> Vec<u8> {
    signature.values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_signature(blob: &[u8]) -> Result<Signature, StoreError> {
    if blob.is_empty() || blob.len() % 8 != 0 {
        return Err(StoreError::Corrupt(format!("signature blob of {} bytes", blob.len())));
    }
    let values = blob
        .chunks_exact(8)
        .map(|chunk| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            f64::from_le_bytes(bytes)
        })
        .collect();
    Ok(Signature::new(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::{AttendanceService, Settings};

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn identity(id: u64, name: &str, values: &[f64]) -> Identity {
        Identity {
            id,
            name: name.into(),
            signature: Signature::new(values.to_vec()),
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn test_signature_blob_is_lossless() {
        let sig = Signature::new(vec![0.1, -2.5, 1e-300, f64::MAX]);
        assert_eq!(decode_signature(&encode_signature(&sig)).unwrap(), sig);
    }

    #[test]
    fn test_truncated_signature_blob_rejected() {
        assert!(matches!(decode_signature(&[0u8; 12]), Err(StoreError::Corrupt(_))));
        assert!(matches!(decode_signature(&[]), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_journal_writes_are_loaded_back_in_order() {
        let store = SqliteJournal::open_in_memory().unwrap();
        store.identity_added(&identity(1, "Ada", &[0.0, 1.0])).unwrap();
        store.identity_added(&identity(2, "Bo", &[1.0, 0.0])).unwrap();
        store
            .events_appended(&[
                AttendanceEvent::new(2, day("2024-01-01"), AttendanceStatus::Absent),
                AttendanceEvent::new(1, day("2024-01-01"), AttendanceStatus::Present),
            ])
            .unwrap();
        store
            .events_appended(&[AttendanceEvent::new(2, day("2024-01-02"), AttendanceStatus::Present)])
            .unwrap();

        let (identities, events) = store.load().unwrap();
        let names: Vec<&str> = identities.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Ada", "Bo"]);
        assert_eq!(identities[0].signature.values, vec![0.0, 1.0]);
        assert_eq!(
            events,
            vec![
                AttendanceEvent::new(2, day("2024-01-01"), AttendanceStatus::Absent),
                AttendanceEvent::new(1, day("2024-01-01"), AttendanceStatus::Present),
                AttendanceEvent::new(2, day("2024-01-02"), AttendanceStatus::Present),
            ]
        );
    }

    #[test]
    fn test_duplicate_identity_id_fails() {
        let store = SqliteJournal::open_in_memory().unwrap();
        store.identity_added(&identity(1, "Ada", &[0.0])).unwrap();
        assert!(store.identity_added(&identity(1, "Ada again", &[0.0])).is_err());
    }

    #[test]
    fn test_events_for_unknown_identity_roll_back() {
        let store = SqliteJournal::open_in_memory().unwrap();
        store.identity_added(&identity(1, "Ada", &[0.0])).unwrap();
        let result = store.events_appended(&[
            AttendanceEvent::new(1, day("2024-01-01"), AttendanceStatus::Present),
            AttendanceEvent::new(9, day("2024-01-01"), AttendanceStatus::Absent),
        ]);
        assert!(result.is_err());
        assert!(store.load().unwrap().1.is_empty());
    }

    #[test]
    fn test_service_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/attendance.db");

        let first_id = {
            let service = AttendanceService::with_journal(
                Settings::default(),
                Box::new(SqliteJournal::open(&path).unwrap()),
            );
            let id = service
                .register_identity("Ada", Some(Signature::new(vec![0.0, 0.0])))
                .unwrap();
            service
                .register_identity("Bo", Some(Signature::new(vec![3.0, 0.0])))
                .unwrap();
            service
                .take_attendance(&[Signature::new(vec![0.1, 0.0])], day("2024-01-01"))
                .unwrap();
            id
        };

        let journal = SqliteJournal::open(&path).unwrap();
        let (identities, events) = journal.load().unwrap();
        let service =
            AttendanceService::restore(Settings::default(), identities, events, Box::new(journal))
                .unwrap();

        assert_eq!(service.identity_count(), 2);
        assert_eq!(service.history(first_id).unwrap().len(), 1);
        let next = service
            .register_identity("Cy", Some(Signature::new(vec![9.0, 0.0])))
            .unwrap();
        assert_eq!(next, 3);
    }
}
