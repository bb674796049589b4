//! Reduce an identity's ledger history into chart buckets and report totals.

use crate::types::{AttendanceEvent, AttendanceStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Daily,
    Monthly,
}

impl Granularity {
    /// Parse a view name. Anything other than `"monthly"` is daily.
    pub fn parse(view: &str) -> Self {
        if view.trim().eq_ignore_ascii_case("monthly") {
            Granularity::Monthly
        } else {
            Granularity::Daily
        }
    }

    fn label(&self, event: &AttendanceEvent) -> String {
        match self {
            Granularity::Daily => event.date.format("%Y-%m-%d").to_string(),
            Granularity::Monthly => event.date.format("%Y-%m").to_string(),
        }
    }
}

/// Present/absent counts for one day or month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub label: String,
    pub present: u32,
    pub absent: u32,
}

/// Group events into buckets sorted ascending by label.
pub fn bucket(history: &[AttendanceEvent], granularity: Granularity) -> Vec<Bucket> {
    let mut counts: BTreeMap<String, (u32, u32)> = BTreeMap::new();
    for event in history {
        let entry = counts.entry(granularity.label(event)).or_default();
        match event.status {
            AttendanceStatus::Present => entry.0 += 1,
            AttendanceStatus::Absent => entry.1 += 1,
        }
    }

    counts
        .into_iter()
        .map(|(label, (present, absent))| Bucket {
            label,
            present,
            absent,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_present: u32,
    pub total_absent: u32,
    /// Share of events that are Present, 0–100. Empty history is 0.
    pub percentage: f64,
}

pub fn summary(history: &[AttendanceEvent]) -> Summary {
    let total_present = history
        .iter()
        .filter(|e| e.status == AttendanceStatus::Present)
        .count() as u32;
    let total_absent = history.len() as u32 - total_present;
    let percentage = f64::from(total_present) / history.len().max(1) as f64 * 100.0;

    Summary {
        total_present,
        total_absent,
        percentage,
    }
}
