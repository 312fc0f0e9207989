//! Embedded TTL-indexed hash table (spec section 4.8).
//!
//! Open-addressed, chunk-allocated key/value store with bounded collision
//! chains and an overflow ("extra bucket") pool. This is the reference
//! storage design for session-like tables: [`crate::session_table`] reuses
//! the same bucket/chain/TTL machinery with a session-shaped value.
//!
//! `put`/`entry` take a `worker_id` parameter to keep the call shape
//! compatible with a sharded-index variant; this single-threaded
//! implementation does not partition the index by it.

use std::hash::{BuildHasher, BuildHasherDefault, Hasher};

/// Bucket struct size exported for the hardware-alignment contract (spec
/// section 4.8/9): callers embedding this table next to a cache-line
/// sized neighbor rely on this constant matching `size_of::<Bucket<K, V>>()`
/// for their own `(K, V)` choice at the documented reference size
/// (8-byte key digest + 8-byte value + 8 bytes of bookkeeping).
pub const FWMAP_BUCKET_SIZE_HINT: usize = 24;

/// Number of buckets per allocated chunk. Must be a power of two.
pub const FWMAP_CHUNK_INDEX_MAX_SIZE: usize = 4096;

/// Mask derived from [`FWMAP_CHUNK_INDEX_MAX_SIZE`]; `MASK + 1` must equal
/// the same power of two (spec section 4.8 invariant).
pub const FWMAP_CHUNK_INDEX_MASK: usize = FWMAP_CHUNK_INDEX_MAX_SIZE - 1;

const _: () = assert!(FWMAP_CHUNK_INDEX_MAX_SIZE.is_power_of_two());
const _: () = assert!(FWMAP_CHUNK_INDEX_MASK + 1 == FWMAP_CHUNK_INDEX_MAX_SIZE);

/// A single slot. `None` key means empty. `ttl == 0` is used as a tombstone
/// marker for entries explicitly removed (distinct from "never inserted").
#[derive(Debug, Clone)]
struct Bucket<K, V> {
    entry: Option<Entry<K, V>>,
}

#[derive(Debug, Clone)]
struct Entry<K, V> {
    key: K,
    value: V,
    insert_time: u32,
    ttl: u32,
}

impl<K, V> Entry<K, V> {
    fn expires_at(&self) -> u64 {
        self.insert_time as u64 + self.ttl as u64
    }

    fn is_live(&self, now: u32) -> bool {
        self.expires_at() > now as u64
    }
}

impl<K, V> Default for Bucket<K, V> {
    fn default() -> Self {
        Bucket { entry: None }
    }
}

/// One generation of backing storage (spec GLOSSARY: "Layer"). A chunked
/// table never moves existing chunks on plain growth; a full rehash (used
/// by [`crate::session_table::SessionTable::resize`]) allocates a fresh
/// `FwMap` and re-inserts, which is the "layer rotation" the glossary
/// describes.
pub struct FwMap<K, V, S = BuildHasherDefault<std::collections::hash_map::DefaultHasher>> {
    chunks: Vec<Vec<Bucket<K, V>>>,
    index_size: usize,
    extra_buckets: Vec<Bucket<K, V>>,
    extra_bucket_count: usize,
    max_chain_length: usize,
    hash_builder: S,
    total_elements: usize,
    max_deadline: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FwMapStats {
    pub index_size: usize,
    pub extra_bucket_count: usize,
    pub max_chain_length: usize,
    pub layer_count: usize,
    pub total_elements: usize,
    pub max_deadline: u64,
    pub memory_used: usize,
}

/// Zero-copy direct access handle. Returns the same logical slot for the
/// same key until expiry (spec section 4.8 invariant (c)).
pub struct EntryHandle<'a, K, V> {
    pub key: &'a K,
    pub value: &'a mut V,
    pub empty: bool,
}

impl<K, V, S> FwMap<K, V, S>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher + Default,
{
    /// `index_size` is rounded up to the next power of two (spec section
    /// 4.8). `max_chain_length` bounds collision chains before falling
    /// back to the extra-bucket pool.
    pub fn new(index_size: usize, extra_bucket_count: usize, max_chain_length: usize) -> Self {
        let index_size = index_size.max(1).next_power_of_two();
        Self {
            chunks: vec![vec![Bucket::default(); FWMAP_CHUNK_INDEX_MAX_SIZE.min(index_size)]],
            index_size,
            extra_buckets: vec![Bucket::default(); extra_bucket_count],
            extra_bucket_count,
            max_chain_length,
            hash_builder: S::default(),
            total_elements: 0,
            max_deadline: 0,
        }
    }

    fn hash_key(&self, key: &K) -> u64 {
        let mut hasher = self.hash_builder.build_hasher();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn bucket_index(&self, hash: u64) -> usize {
        (hash as usize) & (self.index_size - 1)
    }

    fn chunk_for(&self, idx: usize) -> (usize, usize) {
        (idx / FWMAP_CHUNK_INDEX_MAX_SIZE, idx % FWMAP_CHUNK_INDEX_MAX_SIZE)
    }

    fn ensure_chunk(&mut self, chunk_idx: usize) {
        while self.chunks.len() <= chunk_idx {
            self.chunks
                .push(vec![Bucket::default(); FWMAP_CHUNK_INDEX_MAX_SIZE]);
        }
    }

    /// Inserts or overwrites `key`. Walks up to `max_chain_length` linear
    /// probes from the hashed bucket; on chain exhaustion falls back to the
    /// extra-bucket pool. Returns `false` if both are full (the caller maps
    /// this to [`crate::error::BalancerError::SessionTableOverflow`]).
    pub fn put(&mut self, _worker_id: u32, now: u32, ttl: u32, key: K, value: V) -> bool {
        let hash = self.hash_key(&key);
        let start = self.bucket_index(hash);

        for step in 0..self.max_chain_length {
            let idx = (start + step) & (self.index_size - 1);
            let (chunk_idx, offset) = self.chunk_for(idx);
            self.ensure_chunk(chunk_idx);
            let bucket = &mut self.chunks[chunk_idx][offset];
            let occupied_by_other = matches!(&bucket.entry, Some(e) if e.key != key && e.is_live(now));
            if occupied_by_other {
                continue;
            }
            let was_live = matches!(&bucket.entry, Some(e) if e.is_live(now));
            bucket.entry = Some(Entry {
                key,
                value,
                insert_time: now,
                ttl,
            });
            if !was_live {
                self.total_elements += 1;
            }
            self.max_deadline = self.max_deadline.max(now as u64 + ttl as u64);
            return true;
        }

        for bucket in self.extra_buckets.iter_mut() {
            let occupied_by_other = matches!(&bucket.entry, Some(e) if e.key != key && e.is_live(now));
            if occupied_by_other {
                continue;
            }
            let was_live = matches!(&bucket.entry, Some(e) if e.is_live(now));
            bucket.entry = Some(Entry {
                key,
                value,
                insert_time: now,
                ttl,
            });
            if !was_live {
                self.total_elements += 1;
            }
            self.max_deadline = self.max_deadline.max(now as u64 + ttl as u64);
            return true;
        }

        false
    }

    /// Reads `key`, rejecting entries whose TTL has lapsed even if they
    /// have not yet been reclaimed by a sweep (spec section 4.8 invariant
    /// (a)).
    pub fn get(&self, now: u32, key: &K) -> Option<&V> {
        let hash = self.hash_key(key);
        let start = self.bucket_index(hash);

        for step in 0..self.max_chain_length {
            let idx = (start + step) & (self.index_size - 1);
            let (chunk_idx, offset) = self.chunk_for(idx);
            if chunk_idx >= self.chunks.len() {
                continue;
            }
            if let Some(entry) = &self.chunks[chunk_idx][offset].entry {
                if &entry.key == key {
                    return entry.is_live(now).then_some(&entry.value);
                }
            }
        }

        for bucket in &self.extra_buckets {
            if let Some(entry) = &bucket.entry {
                if &entry.key == key {
                    return entry.is_live(now).then_some(&entry.value);
                }
            }
        }

        None
    }

    /// Zero-copy direct-access handle (spec section 4.8 `entry`). Returns
    /// the same slot for the same key on repeated calls until expiry,
    /// creating one with `ttl` if absent. `None` if both the chain and the
    /// extra-bucket pool are exhausted (the same overflow condition `put`
    /// reports via its `bool` return).
    pub fn entry(&mut self, worker_id: u32, now: u32, ttl: u32, key: K) -> Option<EntryHandle<'_, K, V>>
    where
        V: Default,
    {
        let hash = self.hash_key(&key);
        let start = self.bucket_index(hash);
        let _ = worker_id;

        for step in 0..self.max_chain_length {
            let idx = (start + step) & (self.index_size - 1);
            let (chunk_idx, offset) = self.chunk_for(idx);
            self.ensure_chunk(chunk_idx);
            let bucket = &mut self.chunks[chunk_idx][offset];
            let hit = matches!(&bucket.entry, Some(e) if e.key == key && e.is_live(now));
            let empty_or_expired =
                matches!(&bucket.entry, None) || matches!(&bucket.entry, Some(e) if !e.is_live(now));
            if hit {
                let entry = bucket.entry.as_mut().unwrap();
                return Some(EntryHandle {
                    key: &entry.key,
                    value: &mut entry.value,
                    empty: false,
                });
            }
            if empty_or_expired {
                let was_live = false;
                bucket.entry = Some(Entry {
                    key: key.clone(),
                    value: V::default(),
                    insert_time: now,
                    ttl,
                });
                if !was_live {
                    self.total_elements += 1;
                }
                self.max_deadline = self.max_deadline.max(now as u64 + ttl as u64);
                let entry = bucket.entry.as_mut().unwrap();
                return Some(EntryHandle {
                    key: &entry.key,
                    value: &mut entry.value,
                    empty: true,
                });
            }
        }

        // Chain exhausted: fall back to the first free extra bucket.
        for bucket in self.extra_buckets.iter_mut() {
            let hit = matches!(&bucket.entry, Some(e) if e.key == key && e.is_live(now));
            if hit {
                let entry = bucket.entry.as_mut().unwrap();
                return Some(EntryHandle {
                    key: &entry.key,
                    value: &mut entry.value,
                    empty: false,
                });
            }
            let free = matches!(&bucket.entry, None) || matches!(&bucket.entry, Some(e) if !e.is_live(now));
            if free {
                bucket.entry = Some(Entry {
                    key: key.clone(),
                    value: V::default(),
                    insert_time: now,
                    ttl,
                });
                self.total_elements += 1;
                self.max_deadline = self.max_deadline.max(now as u64 + ttl as u64);
                let entry = bucket.entry.as_mut().unwrap();
                return Some(EntryHandle {
                    key: &entry.key,
                    value: &mut entry.value,
                    empty: true,
                });
            }
        }

        None
    }

    /// Removes expired entries, returning the count reclaimed.
    pub fn sweep(&mut self, now: u32) -> usize {
        let mut reclaimed = 0;
        for chunk in &mut self.chunks {
            for bucket in chunk.iter_mut() {
                if let Some(entry) = &bucket.entry {
                    if !entry.is_live(now) {
                        bucket.entry = None;
                        reclaimed += 1;
                    }
                }
            }
        }
        for bucket in &mut self.extra_buckets {
            if let Some(entry) = &bucket.entry {
                if !entry.is_live(now) {
                    bucket.entry = None;
                    reclaimed += 1;
                }
            }
        }
        self.total_elements = self.total_elements.saturating_sub(reclaimed);
        reclaimed
    }

    /// Live (non-expired) element count, recomputed exactly.
    pub fn live_count(&self, now: u32) -> usize {
        let in_chunks: usize = self
            .chunks
            .iter()
            .flat_map(|c| c.iter())
            .filter(|b| matches!(&b.entry, Some(e) if e.is_live(now)))
            .count();
        let in_extra = self
            .extra_buckets
            .iter()
            .filter(|b| matches!(&b.entry, Some(e) if e.is_live(now)))
            .count();
        in_chunks + in_extra
    }

    pub fn stats(&self) -> FwMapStats {
        let memory_used = self.chunks.iter().map(|c| c.len()).sum::<usize>()
            * std::mem::size_of::<Bucket<K, V>>()
            + self.extra_buckets.len() * std::mem::size_of::<Bucket<K, V>>();
        FwMapStats {
            index_size: self.index_size,
            extra_bucket_count: self.extra_bucket_count,
            max_chain_length: self.max_chain_length,
            layer_count: 1,
            total_elements: self.total_elements,
            max_deadline: self.max_deadline,
            memory_used,
        }
    }

    /// Iterates all live `(key, value)` pairs as of `now`. Used by
    /// [`crate::session_table::SessionTable::resize`] to rehash into a
    /// fresh layer.
    pub fn iter_live(&self, now: u32) -> impl Iterator<Item = (&K, &V, u32, u32)> {
        self.chunks
            .iter()
            .flat_map(|c| c.iter())
            .chain(self.extra_buckets.iter())
            .filter_map(move |b| {
                b.entry.as_ref().and_then(|e| {
                    e.is_live(now)
                        .then_some((&e.key, &e.value, e.insert_time, e.ttl))
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestMap = FwMap<u64, u64>;

    #[test]
    fn put_get_roundtrip() {
        let mut map = TestMap::new(16, 4, 8);
        assert!(map.put(0, 0, 100, 42, 1));
        assert_eq!(map.get(0, &42), Some(&1));
    }

    #[test]
    fn expired_entry_rejected_before_sweep() {
        let mut map = TestMap::new(16, 4, 8);
        map.put(0, 0, 10, 42, 1);
        assert_eq!(map.get(11, &42), None);
        // Not yet swept, but still correctly rejected by read-time check.
        assert_eq!(map.stats().total_elements, 1);
        map.sweep(11);
        assert_eq!(map.stats().total_elements, 0);
    }

    #[test]
    fn chain_overflow_falls_back_to_extra_buckets() {
        // index_size 1 forces every key into the same bucket chain of
        // length 1; the second insert must land in the extra pool.
        let mut map = TestMap::new(1, 2, 1);
        assert!(map.put(0, 0, 100, 1, 10));
        assert!(map.put(0, 0, 100, 2, 20));
        assert_eq!(map.get(0, &1), Some(&10));
        assert_eq!(map.get(0, &2), Some(&20));
    }

    #[test]
    fn overflow_when_both_chain_and_extra_full() {
        let mut map = TestMap::new(1, 1, 1);
        assert!(map.put(0, 0, 100, 1, 10));
        assert!(map.put(0, 0, 100, 2, 20));
        assert!(!map.put(0, 0, 100, 3, 30));
    }

    #[test]
    fn entry_returns_none_when_both_chain_and_extra_full() {
        let mut map = TestMap::new(1, 1, 1);
        assert!(map.entry(0, 0, 100, 1).is_some());
        assert!(map.entry(0, 0, 100, 2).is_some());
        assert!(map.entry(0, 0, 100, 3).is_none());
    }

    #[test]
    fn entry_handle_returns_same_slot_until_expiry() {
        let mut map: FwMap<u64, u64> = FwMap::new(16, 4, 8);
        {
            let h = map.entry(0, 0, 100, 7).expect("fresh insert always succeeds");
            assert!(h.empty);
            *h.value = 99;
        }
        let h2 = map.entry(0, 1, 100, 7).expect("same key re-entered before expiry");
        assert!(!h2.empty);
        assert_eq!(*h2.value, 99);
    }

    #[test]
    fn constants_are_consistent() {
        assert!(FWMAP_CHUNK_INDEX_MAX_SIZE.is_power_of_two());
        assert_eq!(FWMAP_CHUNK_INDEX_MASK + 1, FWMAP_CHUNK_INDEX_MAX_SIZE);
    }
}
