//! Decoy Vault - Per-Vault Access Gate
//!
//! File operations hold the shared side; key rotation holds the exclusive
//! side for the whole batch so no operation can observe a key mid-swap.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{VaultError, VaultResult};
use crate::index::VaultSelector;

struct Lane {
    lock: RwLock<()>,
    rotating: AtomicBool,
}

impl Lane {
    fn new() -> Self {
        Self {
            lock: RwLock::new(()),
            rotating: AtomicBool::new(false),
        }
    }
}

/// Read/write gate, one lane per vault selector
pub struct VaultGate {
    real: Lane,
    decoy: Lane,
}

impl Default for VaultGate {
    fn default() -> Self {
        Self::new()
    }
}

impl VaultGate {
    pub fn new() -> Self {
        Self {
            real: Lane::new(),
            decoy: Lane::new(),
        }
    }

    fn lane(&self, selector: VaultSelector) -> &Lane {
        match selector {
            VaultSelector::Real => &self.real,
            VaultSelector::Decoy => &self.decoy,
        }
    }

    /// Shared access; waits while a rotation holds the lane
    pub async fn enter(&self, selector: VaultSelector) -> RwLockReadGuard<'_, ()> {
        self.lane(selector).lock.read().await
    }

    /// Exclusive access for a rotation.
    ///
    /// Fails fast with `RotationInProgress` if another rotation already
    /// claimed the lane, otherwise waits for in-flight operations to drain.
    pub async fn begin_rotation(&self, selector: VaultSelector) -> VaultResult<RotationGuard<'_>> {
        let lane = self.lane(selector);
        if lane
            .rotating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(VaultError::RotationInProgress(selector.to_string()));
        }

        let write = lane.lock.write().await;
        Ok(RotationGuard {
            _write: write,
            flag: &lane.rotating,
        })
    }

    /// Whether a rotation currently holds `selector`
    pub fn is_rotating(&self, selector: VaultSelector) -> bool {
        self.lane(selector).rotating.load(Ordering::Acquire)
    }
}

/// Held for the duration of a rotation; clears the flag on drop
pub struct RotationGuard<'a> {
    _write: RwLockWriteGuard<'a, ()>,
    flag: &'a AtomicBool,
}

impl Drop for RotationGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
