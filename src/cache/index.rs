//! Ordered index: key lookup plus a recency list with O(1) promotion and tail eviction.
//!
//! Entries live in a slot arena and are linked by slot indices rather than pointers.
//! The key map stores generation-checked handles, so a handle to a freed and reused
//! slot resolves to nothing instead of to the wrong entry.
//!
//! ```text
//!   head (MRU) ──► [c] ◄──► [a] ◄──► [b] ◄── tail (LRU)
//! ```

use crate::errors::CacheError;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

/// Null link in the arena list.
const NIL: usize = usize::MAX;

/// One cached record.
#[derive(Debug, Clone)]
pub struct Entry<K, V> {
    key: K,
    value: V,
    cost: u64,
    last_access: Duration,
}

impl<K, V> Entry<K, V> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }

    pub fn last_access(&self) -> Duration {
        self.last_access
    }

    pub fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Handle {
    slot: usize,
    generation: u64,
}

#[derive(Debug)]
struct Slot<K, V> {
    entry: Option<Entry<K, V>>,
    generation: u64,
    prev: usize,
    // Doubles as the free-list link while the slot is vacant.
    next: usize,
}

/// Hash index plus recency order over live entries.
pub struct OrderedIndex<K, V> {
    map: HashMap<K, Handle>,
    slots: Vec<Slot<K, V>>,
    head: usize,
    tail: usize,
    free: usize,
    // Exact sum of live costs; reported clamped to u64.
    total_cost: u128,
}

impl<K, V> std::fmt::Debug for OrderedIndex<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedIndex")
            .field("len", &self.map.len())
            .field("total_cost", &self.total_cost)
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl<K: Hash + Eq + Clone, V> Default for OrderedIndex<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> OrderedIndex<K, V> {
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Sum of live entry costs, saturating at `u64::MAX`.
    pub fn total_cost(&self) -> u64 {
        u64::try_from(self.total_cost).unwrap_or(u64::MAX)
    }

    /// Empties the index, handing back every entry for deferred release.
    pub fn drain(&mut self) -> Vec<Entry<K, V>> {
        let entries = self.slots.drain(..).filter_map(|s| s.entry).collect();
        self.map.clear();
        self.head = NIL;
        self.tail = NIL;
        self.free = NIL;
        self.total_cost = 0;
        entries
    }

    pub fn clear(&mut self) {
        drop(self.drain());
    }
}

impl<K: Hash + Eq + Clone, V> OrderedIndex<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            head: NIL,
            tail: NIL,
            free: NIL,
            total_cost: 0,
        }
    }


    pub fn contains(&self, key: &K) -> bool {
        self.resolve(key).is_some()
    }

    /// Looks up an entry without touching recency.
    pub fn peek(&self, key: &K) -> Option<&Entry<K, V>> {
        self.resolve(key).and_then(|idx| self.slots[idx].entry.as_ref())
    }

    /// Least recently used entry, if any.
    pub fn peek_tail(&self) -> Option<&Entry<K, V>> {
        if self.tail == NIL { None } else { self.slots[self.tail].entry.as_ref() }
    }

    /// Most recently used entry, if any.
    pub fn peek_head(&self) -> Option<&Entry<K, V>> {
        if self.head == NIL { None } else { self.slots[self.head].entry.as_ref() }
    }

    /// Adds a new entry at the head.
    ///
    /// # Errors
    /// Returns [`CacheError::DuplicateKey`] if `key` is already present; use [`Self::upsert`]
    /// when the key may exist.
    pub fn insert_at_front(
        &mut self,
        key: K,
        value: V,
        cost: u64,
        now: Duration,
    ) -> Result<(), CacheError> {
        if self.contains(&key) {
            return Err(CacheError::DuplicateKey);
        }
        let handle = self.alloc(Entry { key: key.clone(), value, cost, last_access: now });
        self.push_head(handle.slot);
        self.map.insert(key, handle);
        self.total_cost += u128::from(cost);
        Ok(())
    }

    /// Inserts or replaces, promoting to the head either way.
    /// Returns the replaced value so the caller can release it outside any lock.
    pub fn upsert(&mut self, key: K, value: V, cost: u64, now: Duration) -> Option<V> {
        let Some(idx) = self.resolve(&key) else {
            let handle = self.alloc(Entry { key: key.clone(), value, cost, last_access: now });
            self.push_head(handle.slot);
            self.map.insert(key, handle);
            self.total_cost += u128::from(cost);
            return None;
        };
        self.move_to_head(idx);
        let entry = self.slots[idx].entry.as_mut()?;
        let old_cost = std::mem::replace(&mut entry.cost, cost);
        entry.last_access = now;
        let old = std::mem::replace(&mut entry.value, value);
        self.total_cost = self.total_cost - u128::from(old_cost) + u128::from(cost);
        Some(old)
    }

    /// Moves `key` to the head. Returns false if absent.
    pub fn promote(&mut self, key: &K) -> bool {
        match self.resolve(key) {
            Some(idx) => {
                self.move_to_head(idx);
                true
            }
            None => false,
        }
    }

    /// Promotes `key`, stamps it with `now` and returns its value.
    pub fn touch(&mut self, key: &K, now: Duration) -> Option<&V> {
        let idx = self.resolve(key)?;
        self.move_to_head(idx);
        let entry = self.slots[idx].entry.as_mut()?;
        entry.last_access = now;
        Some(&entry.value)
    }

    pub fn remove(&mut self, key: &K) -> Option<Entry<K, V>> {
        let idx = self.resolve(key)?;
        self.map.remove(key);
        self.detach(idx)
    }

    /// Removes and returns the least recently used entry.
    pub fn evict_tail(&mut self) -> Option<Entry<K, V>> {
        if self.tail == NIL {
            return None;
        }
        let idx = self.tail;
        if let Some(entry) = self.slots[idx].entry.as_ref() {
            self.map.remove(&entry.key);
        }
        self.detach(idx)
    }

    /// Live entries from most to least recently used.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter { index: self, cursor: self.head }
    }

    pub fn keys_mru(&self) -> Vec<K> {
        self.iter().map(|e| e.key.clone()).collect()
    }

    /// Walks the list and the key map and verifies they describe the same set,
    /// with matching aggregates and well-formed links.
    ///
    /// # Errors
    /// Returns [`CacheError::Corrupted`] describing the first violation found.
    pub fn check_invariants(&self) -> Result<(), CacheError> {
        let corrupted = |msg: String| Err(CacheError::Corrupted(msg));
        let mut seen = 0usize;
        let mut cost = 0u128;
        let mut prev = NIL;
        let mut cursor = self.head;
        while cursor != NIL {
            if seen > self.slots.len() {
                return corrupted("recency list has a cycle".into());
            }
            let slot = &self.slots[cursor];
            if slot.prev != prev {
                return corrupted(format!("slot {cursor} has stale prev link"));
            }
            let Some(entry) = slot.entry.as_ref() else {
                return corrupted(format!("vacant slot {cursor} is linked"));
            };
            match self.map.get(&entry.key) {
                Some(h) if h.slot == cursor && h.generation == slot.generation => {}
                _ => return corrupted(format!("slot {cursor} is not indexed by its key")),
            }
            seen += 1;
            cost += u128::from(entry.cost);
            prev = cursor;
            cursor = slot.next;
        }
        if self.tail != prev {
            return corrupted("tail does not terminate the recency list".into());
        }
        if seen != self.map.len() {
            return corrupted(format!("{} keys indexed, {} linked", self.map.len(), seen));
        }
        if cost != self.total_cost {
            return corrupted(format!("aggregate cost {} != sum {}", self.total_cost, cost));
        }
        Ok(())
    }

    fn resolve(&self, key: &K) -> Option<usize> {
        let handle = self.map.get(key)?;
        let slot = self.slots.get(handle.slot)?;
        (slot.generation == handle.generation && slot.entry.is_some()).then_some(handle.slot)
    }

    fn alloc(&mut self, entry: Entry<K, V>) -> Handle {
        if self.free != NIL {
            let idx = self.free;
            let slot = &mut self.slots[idx];
            self.free = slot.next;
            slot.entry = Some(entry);
            slot.prev = NIL;
            slot.next = NIL;
            return Handle { slot: idx, generation: slot.generation };
        }
        self.slots.push(Slot { entry: Some(entry), generation: 0, prev: NIL, next: NIL });
        Handle { slot: self.slots.len() - 1, generation: 0 }
    }

    /// Unlinks a slot whose key has already left the map, and recycles it.
    fn detach(&mut self, idx: usize) -> Option<Entry<K, V>> {
        self.unlink(idx);
        let slot = &mut self.slots[idx];
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        slot.next = self.free;
        self.free = idx;
        self.total_cost -= u128::from(entry.cost);
        Some(entry)
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.slots[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.slots[next].prev = prev;
        }
        self.slots[idx].prev = NIL;
        self.slots[idx].next = NIL;
    }

    fn push_head(&mut self, idx: usize) {
        self.slots[idx].prev = NIL;
        self.slots[idx].next = self.head;
        if self.head == NIL {
            self.tail = idx;
        } else {
            self.slots[self.head].prev = idx;
        }
        self.head = idx;
    }

    fn move_to_head(&mut self, idx: usize) {
        if self.head != idx {
            self.unlink(idx);
            self.push_head(idx);
        }
    }
}

/// MRU → LRU iterator over live entries.
pub struct Iter<'a, K, V> {
    index: &'a OrderedIndex<K, V>,
    cursor: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = &'a Entry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == NIL {
            return None;
        }
        let slot = &self.index.slots[self.cursor];
        self.cursor = slot.next;
        slot.entry.as_ref()
    }
}
