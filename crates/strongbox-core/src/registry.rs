//! Protection registry
//!
//! Tracks which resource identifiers require an unlocked session to launch.
//! The whole set is rewritten on every change.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Result, StorageError};
use crate::storage::{SecureStorage, StoredValue, WriteBatch};

/// Storage key holding the protected set
pub const PROTECTED_KEY: &str = "protected_pkgs";

/// Opaque identifier of a launchable resource (e.g. an application package name)
pub type ResourceId = String;

/// Read-only view of protection membership
///
/// [`LaunchGate`](crate::gate::LaunchGate) decides through this trait so it
/// can be driven by the persisted registry or a plain set.
pub trait ProtectionLookup {
    /// Whether `id` requires an unlocked session
    fn is_protected(&self, id: &str) -> bool;
}

impl ProtectionLookup for BTreeSet<ResourceId> {
    fn is_protected(&self, id: &str) -> bool {
        self.contains(id)
    }
}

/// Owns the protected set inside secure storage
///
/// Mutations go through [`SecureStorage::update`], so any number of
/// registries over the same store serialize on the store itself.
#[derive(Clone)]
pub struct ProtectionRegistry {
    storage: Arc<dyn SecureStorage>,
}

impl ProtectionRegistry {
    /// Create a registry over `storage`
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Snapshot of all protected identifiers (order is not meaningful)
    pub fn protected(&self) -> Result<BTreeSet<ResourceId>> {
        Ok(self.storage.get_string_set(PROTECTED_KEY, BTreeSet::new())?)
    }

    /// Check if `id` is protected; an absent set counts as empty
    pub fn check(&self, id: &str) -> Result<bool> {
        Ok(self.protected()?.contains(id))
    }

    /// Protect or unprotect `id`
    ///
    /// Always performs a full read-modify-write, even when `id` is already in
    /// the requested state.
    pub fn set_protected(&self, id: &str, protect: bool) -> Result<()> {
        let mut changed = false;
        self.storage.update(PROTECTED_KEY, &mut |current| {
            let mut set = match current {
                None => BTreeSet::new(),
                Some(StoredValue::StringSet(set)) => set,
                Some(_) => {
                    return Err(StorageError::TypeMismatch {
                        key: PROTECTED_KEY.to_string(),
                        expected: "string set",
                    })
                }
            };
            changed = if protect {
                set.insert(id.to_string())
            } else {
                set.remove(id)
            };
            Ok(WriteBatch::new().put_string_set(PROTECTED_KEY, set))
        })?;

        if changed {
            info!(resource = id, protect, "protection updated");
        } else {
            debug!(resource = id, protect, "protection unchanged");
        }
        Ok(())
    }
}

impl ProtectionLookup for ProtectionRegistry {
    /// Fails closed: a storage error reports the resource as protected
    fn is_protected(&self, id: &str) -> bool {
        self.check(id).unwrap_or_else(|e| {
            tracing::warn!(resource = id, "could not read protected set: {}", e);
            true
        })
    }
}
