//! Frame-to-roster matching.
//!
//! Each signature extracted from a frame is compared against every
//! registered identity by Euclidean distance. A match requires a distance
//! strictly below the tolerance.

use crate::types::{Identity, Signature};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Distance below which two signatures are considered the same person.
pub const DEFAULT_TOLERANCE: f64 = 0.6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("no identities registered")]
    EmptyRoster,
    #[error("frame signature {index} has dimension {actual}, roster uses {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("frame signature {index} is empty or has non-finite values")]
    MalformedSignature { index: usize },
}

/// Outcome of comparing one frame signature against the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDecision {
    /// Identity the signature was attributed to, if any.
    pub identity_id: Option<u64>,
    /// Distance to the attributed identity, or the closest distance seen
    /// when nothing matched.
    pub distance: f64,
}

impl MatchDecision {
    pub fn matched(&self) -> bool {
        self.identity_id.is_some()
    }
}

/// Strategy for attributing a probe signature to a roster entry.
pub trait Matcher {
    fn compare(&self, probe: &Signature, roster: &[Identity], tolerance: f64) -> MatchDecision;
}

/// Scans the roster in registration order and takes the first entry within
/// tolerance, even when a later entry is closer.
pub struct FirstWithinTolerance;

impl Matcher for FirstWithinTolerance {
    fn compare(&self, probe: &Signature, roster: &[Identity], tolerance: f64) -> MatchDecision {
        let mut closest = f64::INFINITY;

        for identity in roster {
            let distance = probe.euclidean_distance(&identity.signature);
            if distance < tolerance {
                return MatchDecision {
                    identity_id: Some(identity.id),
                    distance,
                };
            }
            closest = closest.min(distance);
        }

        MatchDecision {
            identity_id: None,
            distance: closest,
        }
    }
}

/// Attributes the probe to the globally closest roster entry.
///
/// Ties on distance keep the earlier entry. Not the default: with
/// overlapping tolerances it can attribute a face to a different person
/// than [`FirstWithinTolerance`] would.
pub struct Nearest;

impl Matcher for Nearest {
    fn compare(&self, probe: &Signature, roster: &[Identity], tolerance: f64) -> MatchDecision {
        let mut best_distance = f64::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, identity) in roster.iter().enumerate() {
            let distance = probe.euclidean_distance(&identity.signature);
            if distance < best_distance {
                best_distance = distance;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_distance < tolerance => MatchDecision {
                identity_id: Some(roster[idx].id),
                distance: best_distance,
            },
            _ => MatchDecision {
                identity_id: None,
                distance: best_distance,
            },
        }
    }
}

/// Selectable matching policy, as read from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    #[default]
    First,
    Nearest,
}

impl MatchPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Some(MatchPolicy::First),
            "nearest" => Some(MatchPolicy::Nearest),
            _ => None,
        }
    }

    pub fn matcher(&self) -> &'static (dyn Matcher + Send + Sync) {
        match self {
            MatchPolicy::First => &FirstWithinTolerance,
            MatchPolicy::Nearest => &Nearest,
        }
    }
}

/// Presence decisions for one attendance run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameMatch {
    /// Identities seen in the frame, in order of first attribution.
    pub present: Vec<u64>,
    /// Roster identities not seen, in roster order.
    pub absent: Vec<u64>,
    /// One decision per frame signature, in frame order.
    pub decisions: Vec<MatchDecision>,
}

/// Match every frame signature against the roster.
///
/// An identity is counted present at most once per run, but every frame
/// signature still gets its own decision.
pub fn match_frame(
    matcher: &dyn Matcher,
    frame_signatures: &[Signature],
    roster: &[Identity],
    tolerance: f64,
) -> Result<FrameMatch, MatchError> {
    let first = roster.first().ok_or(MatchError::EmptyRoster)?;
    let expected = first.signature.dimension();

    for (index, probe) in frame_signatures.iter().enumerate() {
        if !probe.is_well_formed() {
            return Err(MatchError::MalformedSignature { index });
        }
        if probe.dimension() != expected {
            return Err(MatchError::DimensionMismatch {
                index,
                expected,
                actual: probe.dimension(),
            });
        }
    }

    let mut present = Vec::new();
    let mut seen = HashSet::new();
    let mut decisions = Vec::with_capacity(frame_signatures.len());

    for (index, probe) in frame_signatures.iter().enumerate() {
        let decision = matcher.compare(probe, roster, tolerance);
        tracing::debug!(
            index,
            identity_id = ?decision.identity_id,
            distance = decision.distance,
            "frame signature compared"
        );
        if let Some(id) = decision.identity_id {
            if seen.insert(id) {
                present.push(id);
            }
        }
        decisions.push(decision);
    }

    let absent = roster
        .iter()
        .map(|identity| identity.id)
        .filter(|id| !seen.contains(id))
        .collect();

    Ok(FrameMatch {
        present,
        absent,
        decisions,
    })
}
