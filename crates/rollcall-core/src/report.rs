//! Per-identity attendance report.

use crate::aggregate::Summary;
use crate::types::AttendanceEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Audience a report is addressed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recipient {
    Parent,
    #[default]
    Management,
}

impl Recipient {
    /// `"parent"` addresses a parent; anything else goes to management.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("parent") {
            Recipient::Parent
        } else {
            Recipient::Management
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Recipient::Parent => "Parent",
            Recipient::Management => "Management",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceReport {
    pub identity_id: u64,
    pub name: String,
    pub recipient: Recipient,
    pub generated_at: DateTime<Utc>,
    pub summary: Summary,
    pub history: Vec<AttendanceEvent>,
}

impl AttendanceReport {
    /// Plain-text rendering, one history row per line.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Attendance Report - {}", self.name);
        let _ = writeln!(out, "Generated on: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "Recipient: {}", self.recipient.title());
        let _ = writeln!(out);
        let _ = writeln!(out, "Total Present: {}", self.summary.total_present);
        let _ = writeln!(out, "Total Absent: {}", self.summary.total_absent);
        let _ = writeln!(out, "Attendance %: {:.2}%", self.summary.percentage);
        let _ = writeln!(out);
        let _ = writeln!(out, "Detailed Attendance:");
        for event in &self.history {
            let _ = writeln!(out, "{} - {}", event.date.format("%Y-%m-%d"), event.status);
        }
        out
    }
}
