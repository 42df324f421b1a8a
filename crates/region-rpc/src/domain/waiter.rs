//! Waiter bookkeeping.
//!
//! A waiter is a caller blocked until some connection registers for one of
//! the identities it is interested in. The table keeps a primary map from
//! waiter id to its completion slot and a per-identity index. Both are
//! always updated together: removing a waiter by any route removes it from
//! every identity it was indexed under.

use shared_types::RackIdentity;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Handle of one installed waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaiterId(u64);

impl fmt::Display for WaiterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "waiter-{}", self.0)
    }
}

struct Entry<S> {
    identities: Vec<RackIdentity>,
    slot: S,
}

/// Waiters keyed by id and indexed by identity.
///
/// `S` is the completion slot (a oneshot sender in the registry).
pub struct WaiterTable<S> {
    next_id: u64,
    waiters: BTreeMap<WaiterId, Entry<S>>,
    by_identity: HashMap<RackIdentity, BTreeSet<WaiterId>>,
}

impl<S> Default for WaiterTable<S> {
    fn default() -> Self {
        Self {
            next_id: 0,
            waiters: BTreeMap::new(),
            by_identity: HashMap::new(),
        }
    }
}

impl<S> WaiterTable<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a waiter interested in `identities`.
    pub fn insert(&mut self, identities: Vec<RackIdentity>, slot: S) -> WaiterId {
        let id = WaiterId(self.next_id);
        self.next_id += 1;

        for identity in &identities {
            self.by_identity
                .entry(identity.clone())
                .or_default()
                .insert(id);
        }
        self.waiters.insert(id, Entry { identities, slot });
        id
    }

    /// Remove one waiter from every index. `None` if it was already gone.
    pub fn remove(&mut self, id: WaiterId) -> Option<S> {
        let entry = self.waiters.remove(&id)?;
        self.unindex(id, &entry.identities);
        Some(entry.slot)
    }

    /// Remove and return every waiter interested in `identity`, oldest first.
    pub fn take_for(&mut self, identity: &RackIdentity) -> Vec<S> {
        let Some(ids) = self.by_identity.remove(identity) else {
            return Vec::new();
        };

        let mut slots = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = self.waiters.remove(&id) {
                self.unindex(id, &entry.identities);
                slots.push(entry.slot);
            }
        }
        slots
    }

    /// Remove and return every waiter.
    pub fn drain(&mut self) -> Vec<S> {
        self.by_identity.clear();
        std::mem::take(&mut self.waiters)
            .into_values()
            .map(|entry| entry.slot)
            .collect()
    }

    /// Number of installed waiters.
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Number of waiters interested in `identity`.
    pub fn count_for(&self, identity: &RackIdentity) -> usize {
        self.by_identity.get(identity).map_or(0, BTreeSet::len)
    }

    fn unindex(&mut self, id: WaiterId, identities: &[RackIdentity]) {
        for identity in identities {
            if let Some(ids) = self.by_identity.get_mut(identity) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_identity.remove(identity);
                }
            }
        }
    }
}
