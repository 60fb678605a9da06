//! Bounded, deduplicating, TTL-expiring peer cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::{CacheEntry, EvictionPolicy, PeerId, PeerRecord};
use crate::ports::{RandomSource, TimeSource};

/// Rejection-sampling draws allowed per requested element before the
/// remaining slots are drawn by shuffling the unpicked indices.
const DRAWS_PER_SAMPLE: usize = 8;

/// Store of peer records gossiped between nodes.
///
/// # Invariants
///
/// - Never holds an entry for `local_id`.
/// - At most one entry per peer id; the fresher entry wins.
/// - `len() <= capacity` once any mutation returns.
///
/// Every operation takes the single internal lock, so readers never see a
/// half-merged state. Readers receive clones.
pub struct PeerCache {
    local_id: PeerId,
    capacity: usize,
    protocol_version: u32,
    eviction: EvictionPolicy,
    entries: Mutex<Vec<CacheEntry>>,
    time: Arc<dyn TimeSource>,
    random: Arc<dyn RandomSource>,
}

impl fmt::Debug for PeerCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerCache")
            .field("local_id", &self.local_id)
            .field("capacity", &self.capacity)
            .field("eviction", &self.eviction)
            .field("len", &self.len())
            .finish()
    }
}

impl PeerCache {
    pub fn new(
        local_id: PeerId,
        capacity: usize,
        protocol_version: u32,
        eviction: EvictionPolicy,
        time: Arc<dyn TimeSource>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            local_id,
            capacity,
            protocol_version,
            eviction,
            entries: Mutex::new(Vec::with_capacity(capacity + 1)),
            time,
            random,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        self.eviction
    }

    /// Insert or refresh one entry, then trim to capacity.
    ///
    /// Returns `false` if the entry was dropped (self entry, or an older
    /// copy of a peer already cached).
    pub fn add(&self, entry: CacheEntry) -> bool {
        if entry.id() == self.local_id {
            return false;
        }
        let mut entries = self.entries.lock();
        let stored = upsert(&mut entries, entry, false);
        self.trim(&mut entries, self.capacity, None);
        stored
    }

    /// Bulk merge followed by a full [`cleanup`](Self::cleanup).
    pub fn add_all(&self, incoming: impl IntoIterator<Item = CacheEntry>) {
        let mut entries = self.entries.lock();
        for entry in incoming {
            if entry.id() != self.local_id {
                upsert(&mut entries, entry, false);
            }
        }
        self.cleanup_locked(&mut entries);
    }

    /// Up to `n` distinct entries, sampled uniformly without replacement.
    ///
    /// Returns the whole cache when `n >= len()`.
    pub fn select_random(&self, n: usize) -> Vec<CacheEntry> {
        let entries = self.entries.lock();
        let len = entries.len();
        if n >= len {
            return entries.clone();
        }

        let mut chosen = vec![false; len];
        let mut picked = Vec::with_capacity(n);
        let mut draws = 0;
        while picked.len() < n && draws < n * DRAWS_PER_SAMPLE {
            draws += 1;
            let index = self.random.random_usize(len);
            if !chosen[index] {
                chosen[index] = true;
                picked.push(index);
            }
        }
        // Degenerate random sources stall rejection sampling; finish with a
        // partial Fisher-Yates over the indices not yet drawn
        let mut rest: Vec<usize> = (0..len).filter(|&i| !chosen[i]).collect();
        let missing = n - picked.len();
        for i in 0..missing {
            let j = i + self.random.random_usize(rest.len() - i);
            rest.swap(i, j);
            picked.push(rest[i]);
        }

        picked.into_iter().map(|i| entries[i].clone()).collect()
    }

    pub fn select_random_entry(&self) -> Option<CacheEntry> {
        let entries = self.entries.lock();
        if entries.is_empty() {
            return None;
        }
        Some(entries[self.random.random_usize(entries.len())].clone())
    }

    /// Entry with the highest `age`, left in place.
    pub fn select_oldest_entry(&self) -> Option<CacheEntry> {
        let entries = self.entries.lock();
        oldest_index(&entries, None).map(|i| entries[i].clone())
    }

    pub fn remove_random(&self) -> Option<CacheEntry> {
        let mut entries = self.entries.lock();
        if entries.is_empty() {
            return None;
        }
        let index = self.random.random_usize(entries.len());
        Some(entries.remove(index))
    }

    /// Remove the entry with the highest `age`.
    pub fn remove_oldest(&self) -> Option<CacheEntry> {
        let mut entries = self.entries.lock();
        let index = oldest_index(&entries, None)?;
        Some(entries.remove(index))
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.entries.lock().iter().any(|e| e.id() == *id)
    }

    /// Upsert `entry`, then trim to `max_size` without evicting it.
    ///
    /// Used by the fallback cache, where the peer just contacted must
    /// survive the trim.
    pub fn replace(&self, entry: CacheEntry, max_size: usize) {
        if entry.id() == self.local_id {
            return;
        }
        let id = entry.id();
        let mut entries = self.entries.lock();
        upsert(&mut entries, entry, true);
        self.trim(&mut entries, max_size.max(1), Some(id));
    }

    /// Sweep the cache.
    ///
    /// Drops self entries, duplicates (keeping the freshest), expired
    /// entries and entries speaking another protocol version, then trims
    /// to capacity. Running it twice in a row changes nothing the second
    /// time.
    pub fn cleanup(&self) {
        let mut entries = self.entries.lock();
        self.cleanup_locked(&mut entries);
    }

    /// One more round survived by every entry.
    pub fn increment_ages(&self) {
        for entry in self.entries.lock().iter_mut() {
            entry.age = entry.age.saturating_add(1);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Snapshot of every entry.
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.entries.lock().clone()
    }

    /// Snapshot of every cached record.
    pub fn records(&self) -> Vec<PeerRecord> {
        self.entries.lock().iter().map(|e| e.record.clone()).collect()
    }

    fn cleanup_locked(&self, entries: &mut Vec<CacheEntry>) {
        let now = self.time.now();

        let mut best: HashMap<PeerId, usize> = HashMap::with_capacity(entries.len());
        let mut kept: Vec<CacheEntry> = Vec::with_capacity(entries.len());
        for entry in entries.drain(..) {
            if entry.id() == self.local_id
                || entry.is_expired(now)
                || entry.record.protocol_version != self.protocol_version
            {
                continue;
            }
            match best.get(&entry.id()) {
                Some(&slot) => {
                    if entry.is_newer_than(&kept[slot]) {
                        kept[slot] = entry;
                    }
                }
                None => {
                    best.insert(entry.id(), kept.len());
                    kept.push(entry);
                }
            }
        }
        *entries = kept;

        self.trim(entries, self.capacity, None);
    }

    fn trim(&self, entries: &mut Vec<CacheEntry>, max_size: usize, protect: Option<PeerId>) {
        while entries.len() > max_size {
            let victim = match self.eviction {
                EvictionPolicy::Random => random_index(entries, protect, self.random.as_ref()),
                EvictionPolicy::Oldest => oldest_index(entries, protect),
            };
            match victim {
                Some(index) => {
                    entries.remove(index);
                }
                None => break,
            }
        }
    }
}

/// Insert `entry` or update the cached copy of the same peer.
///
/// With `force` the incoming entry replaces any cached copy that is not
/// strictly fresher; otherwise only a strictly fresher entry replaces it.
fn upsert(entries: &mut Vec<CacheEntry>, entry: CacheEntry, force: bool) -> bool {
    match entries.iter_mut().find(|e| e.id() == entry.id()) {
        Some(existing) => {
            let wins = if force {
                !existing.is_newer_than(&entry)
            } else {
                entry.is_newer_than(existing)
            };
            if wins {
                *existing = entry;
            }
            wins
        }
        None => {
            entries.push(entry);
            true
        }
    }
}

fn random_index(
    entries: &[CacheEntry],
    protect: Option<PeerId>,
    random: &dyn RandomSource,
) -> Option<usize> {
    let protected = protect.and_then(|id| entries.iter().position(|e| e.id() == id));
    let candidates = entries.len() - usize::from(protected.is_some());
    if candidates == 0 {
        return None;
    }
    let pick = random.random_usize(candidates);
    Some(match protected {
        Some(p) if pick >= p => pick + 1,
        _ => pick,
    })
}

fn oldest_index(entries: &[CacheEntry], protect: Option<PeerId>) -> Option<usize> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, e)| Some(e.id()) != protect)
        .fold(None, |best: Option<(usize, u32)>, (i, e)| match best {
            Some((_, age)) if age >= e.age => best,
            _ => Some((i, e.age)),
        })
        .map(|(i, _)| i)
}
