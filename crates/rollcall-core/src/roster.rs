//! Registered identities and their signatures.

use crate::lock;
use crate::types::{Identity, Signature};
use chrono::{DateTime, Utc};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RosterError {
    #[error("signature must be non-empty and finite")]
    MalformedSignature,
    #[error("signature has dimension {actual}, roster uses {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("unknown identity: {0}")]
    UnknownIdentity(u64),
}

#[derive(Default)]
struct Inner {
    identities: Vec<Identity>,
    next_id: u64,
}

impl Inner {
    fn dimension(&self) -> Option<usize> {
        self.identities.first().map(|i| i.signature.dimension())
    }
}

/// One signature per registered identity, in registration order.
///
/// Ids come from a counter owned by the store and are never reused.
pub struct SignatureStore {
    inner: RwLock<Inner>,
}

impl Default for SignatureStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                identities: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Rebuild a store from persisted identities. Id assignment resumes
    /// after the highest restored id.
    pub fn restore(mut identities: Vec<Identity>) -> Result<Self, RosterError> {
        identities.sort_by_key(|i| i.id);
        let expected = identities.first().map(|i| i.signature.dimension());
        for identity in &identities {
            if !identity.signature.is_well_formed() {
                return Err(RosterError::MalformedSignature);
            }
            if let Some(expected) = expected {
                if identity.signature.dimension() != expected {
                    return Err(RosterError::DimensionMismatch {
                        expected,
                        actual: identity.signature.dimension(),
                    });
                }
            }
        }
        let next_id = identities.last().map_or(1, |i| i.id + 1);
        Ok(Self {
            inner: RwLock::new(Inner {
                identities,
                next_id,
            }),
        })
    }

    /// Register a new identity and return it with its assigned id.
    pub fn add(
        &self,
        name: &str,
        signature: Signature,
        registered_at: DateTime<Utc>,
    ) -> Result<Identity, RosterError> {
        self.add_with(name, signature, registered_at, |_| Ok::<(), RosterError>(()))
    }

    /// Register a new identity, running `before_commit` while the store is
    /// still write-locked. If the hook fails nothing is stored and the id is
    /// not consumed.
    pub fn add_with<E, F>(
        &self,
        name: &str,
        signature: Signature,
        registered_at: DateTime<Utc>,
        before_commit: F,
    ) -> Result<Identity, E>
    where
        E: From<RosterError>,
        F: FnOnce(&Identity) -> Result<(), E>,
    {
        if !signature.is_well_formed() {
            return Err(RosterError::MalformedSignature.into());
        }

        let mut inner = lock::write(&self.inner);
        if let Some(expected) = inner.dimension() {
            if signature.dimension() != expected {
                return Err(RosterError::DimensionMismatch {
                    expected,
                    actual: signature.dimension(),
                }
                .into());
            }
        }

        let identity = Identity {
            id: inner.next_id,
            name: name.to_string(),
            signature,
            registered_at,
        };
        before_commit(&identity)?;

        inner.next_id += 1;
        inner.identities.push(identity.clone());
        Ok(identity)
    }

    /// All identities in registration order.
    pub fn list(&self) -> Vec<Identity> {
        lock::read(&self.inner).identities.clone()
    }

    pub fn get(&self, id: u64) -> Result<Identity, RosterError> {
        lock::read(&self.inner)
            .identities
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or(RosterError::UnknownIdentity(id))
    }

    pub fn len(&self) -> usize {
        lock::read(&self.inner).identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signature dimension fixed by the first registration.
    pub fn dimension(&self) -> Option<usize> {
        lock::read(&self.inner).dimension()
    }
}
