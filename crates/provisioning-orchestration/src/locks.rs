//! Device lock registry
//!
//! The registry is the only cross-request mutable state in the crate. An
//! acquisition takes a whole set of identifiers atomically or nothing at all,
//! so two requests with overlapping sets can never deadlock each other by
//! holding a subset while waiting for the rest.

use crate::config::LockPolicy;
use crate::device::DeviceId;
use async_channel::{Receiver, Sender};
use command_executor::CancellationToken;
use futures_lite::future;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Reasons an acquisition did not produce a lease
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    /// Some identifiers are held by another operation
    #[error("device(s) busy: {}", join(.0))]
    Busy(Vec<DeviceId>),

    /// The caller cancelled while waiting
    #[error("cancelled while waiting for device lock")]
    Cancelled,
}

fn join<'a>(ids: impl IntoIterator<Item = &'a DeviceId>) -> String {
    ids.into_iter()
        .map(DeviceId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Registry of held device identifiers
///
/// Cloning is cheap; clones share the same state.
#[derive(Debug, Clone)]
pub struct DeviceLockRegistry {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    policy: LockPolicy,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    held: BTreeSet<DeviceId>,
    // Closed and replaced on every release; waiters hold a receiver clone.
    release_tx: Sender<()>,
    release_rx: Receiver<()>,
}

impl State {
    fn busy(&self, ids: &BTreeSet<DeviceId>) -> Vec<DeviceId> {
        ids.intersection(&self.held).cloned().collect()
    }
}

impl DeviceLockRegistry {
    /// Create an empty registry with the given contention policy
    pub fn new(policy: LockPolicy) -> Self {
        let (release_tx, release_rx) = async_channel::bounded(1);
        Self {
            inner: Arc::new(Inner {
                policy,
                state: Mutex::new(State {
                    held: BTreeSet::new(),
                    release_tx,
                    release_rx,
                }),
            }),
        }
    }

    /// The contention policy
    pub fn policy(&self) -> LockPolicy {
        self.inner.policy
    }

    /// Acquire every identifier in `ids`, honouring the registry's policy
    ///
    /// Under [`LockPolicy::FailFast`] this returns [`AcquireError::Busy`] as
    /// soon as any identifier is held. Under [`LockPolicy::Queue`] it waits
    /// until the whole set is free; waiters are not served in FIFO order.
    pub async fn acquire(
        &self,
        ids: BTreeSet<DeviceId>,
        cancel: &CancellationToken,
    ) -> Result<DeviceLease, AcquireError> {
        loop {
            if cancel.is_cancelled() {
                return Err(AcquireError::Cancelled);
            }

            let released = {
                let mut state = self.lock_state();
                let busy = state.busy(&ids);
                if busy.is_empty() {
                    return Ok(self.grant(&mut state, ids));
                }
                if self.inner.policy == LockPolicy::FailFast {
                    debug!(busy = %join(&busy), "lock acquisition rejected");
                    return Err(AcquireError::Busy(busy));
                }
                trace!(busy = %join(&busy), "waiting for device lock");
                state.release_rx.clone()
            };

            let woke = future::or(
                async {
                    // Closed on release; either way something changed.
                    let _ = released.recv().await;
                    true
                },
                async {
                    cancel.cancelled().await;
                    false
                },
            )
            .await;

            if !woke {
                return Err(AcquireError::Cancelled);
            }
        }
    }

    /// Acquire every identifier in `ids` or fail immediately
    pub fn try_acquire(&self, ids: BTreeSet<DeviceId>) -> Result<DeviceLease, AcquireError> {
        let mut state = self.lock_state();
        let busy = state.busy(&ids);
        if !busy.is_empty() {
            return Err(AcquireError::Busy(busy));
        }
        Ok(self.grant(&mut state, ids))
    }

    /// Whether `id` is currently held
    pub fn is_held(&self, id: &DeviceId) -> bool {
        self.lock_state().held.contains(id)
    }

    /// Snapshot of every held identifier
    pub fn held(&self) -> BTreeSet<DeviceId> {
        self.lock_state().held.clone()
    }

    fn grant(&self, state: &mut State, ids: BTreeSet<DeviceId>) -> DeviceLease {
        // BTreeSet iteration is lexicographic, so insertion order is fixed.
        for id in &ids {
            state.held.insert(id.clone());
        }
        debug!(ids = %join(&ids), "device locks acquired");
        DeviceLease {
            registry: self.clone(),
            ids,
        }
    }

    fn release(&self, ids: &BTreeSet<DeviceId>) {
        let mut state = self.lock_state();
        for id in ids {
            assert!(
                state.held.remove(id),
                "device lock {id} released while not held"
            );
        }

        let (release_tx, release_rx) = async_channel::bounded(1);
        let previous = std::mem::replace(&mut state.release_tx, release_tx);
        state.release_rx = release_rx;
        previous.close();
        drop(state);

        debug!(ids = %join(ids), "device locks released");
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        // The state is a plain set; a panic elsewhere cannot leave it torn.
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DeviceLockRegistry {
    fn default() -> Self {
        Self::new(LockPolicy::default())
    }
}

/// Scoped ownership of a set of device identifiers
///
/// Every identifier is released when the lease is dropped, on every exit
/// path of the operation holding it.
#[derive(Debug)]
#[must_use = "the locks are released as soon as the lease is dropped"]
pub struct DeviceLease {
    registry: DeviceLockRegistry,
    ids: BTreeSet<DeviceId>,
}

impl DeviceLease {
    /// Identifiers covered by this lease
    pub fn ids(&self) -> &BTreeSet<DeviceId> {
        &self.ids
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.registry.release(&self.ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ids(paths: &[&str]) -> BTreeSet<DeviceId> {
        paths.iter().map(DeviceId::new).collect()
    }

    #[test]
    fn test_acquire_and_release() {
        let registry = DeviceLockRegistry::new(LockPolicy::FailFast);
        let lease = registry.try_acquire(ids(&["/dev/sdb", "/dev/sdb1"])).unwrap();

        assert!(registry.is_held(&DeviceId::new("/dev/sdb")));
        assert!(registry.is_held(&DeviceId::new("/DEV/SDB1/")));
        assert_eq!(lease.ids().len(), 2);

        drop(lease);
        assert!(registry.held().is_empty());
    }

    #[test]
    fn test_overlap_fails_without_partial_hold() {
        let registry = DeviceLockRegistry::new(LockPolicy::FailFast);
        let _held = registry.try_acquire(ids(&["/dev/sdb"])).unwrap();

        let err = registry
            .try_acquire(ids(&["/dev/sda", "/dev/sdb"]))
            .unwrap_err();
        assert_eq!(err, AcquireError::Busy(vec![DeviceId::new("/dev/sdb")]));
        assert!(!registry.is_held(&DeviceId::new("/dev/sda")));
    }

    #[test]
    fn test_disjoint_sets_coexist() {
        let registry = DeviceLockRegistry::new(LockPolicy::FailFast);
        let _a = registry.try_acquire(ids(&["/dev/sda"])).unwrap();
        let _b = registry.try_acquire(ids(&["/dev/sdb"])).unwrap();
        assert_eq!(registry.held().len(), 2);
    }

    #[test]
    fn test_fail_fast_acquire() {
        futures_lite::future::block_on(async {
            let registry = DeviceLockRegistry::new(LockPolicy::FailFast);
            let _held = registry.try_acquire(ids(&["/mnt/data"])).unwrap();

            let result = registry
                .acquire(ids(&["/mnt/data/"]), &CancellationToken::new())
                .await;
            assert!(matches!(result, Err(AcquireError::Busy(_))));
        });
    }

    #[smol_potat::test]
    async fn test_queue_waits_for_release() {
        let registry = DeviceLockRegistry::new(LockPolicy::Queue);
        let held = registry.try_acquire(ids(&["/dev/sdb"])).unwrap();

        let waiter = {
            let registry = registry.clone();
            smol::spawn(async move {
                registry
                    .acquire(ids(&["/dev/sdb", "/dev/sdc"]), &CancellationToken::new())
                    .await
            })
        };

        smol::Timer::after(Duration::from_millis(50)).await;
        // Nothing partial while waiting.
        assert!(!registry.is_held(&DeviceId::new("/dev/sdc")));

        drop(held);
        let lease = waiter.await.unwrap();
        assert!(registry.is_held(&DeviceId::new("/dev/sdc")));
        drop(lease);
        assert!(registry.held().is_empty());
    }

    #[smol_potat::test]
    async fn test_queue_wait_is_cancellable() {
        let registry = DeviceLockRegistry::new(LockPolicy::Queue);
        let _held = registry.try_acquire(ids(&["/dev/sdb"])).unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let canceller = smol::spawn(async move {
            smol::Timer::after(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = registry.acquire(ids(&["/dev/sdb"]), &cancel).await;
        canceller.await;
        assert!(matches!(result, Err(AcquireError::Cancelled)));
    }

    #[test]
    fn test_release_survives_panic() {
        let registry = DeviceLockRegistry::new(LockPolicy::FailFast);
        let cloned = registry.clone();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _lease = cloned.try_acquire(ids(&["/dev/sdd"])).unwrap();
            panic!("operation blew up");
        }));

        assert!(outcome.is_err());
        assert!(!registry.is_held(&DeviceId::new("/dev/sdd")));
    }
}
