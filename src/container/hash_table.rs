//! A concurrent extendible hash table.
//!
//! The directory is a vector of `2^global_depth` shared bucket handles,
//! indexed by the low bits of the key's hash. A full bucket splits into two
//! buckets of higher local depth, doubling the directory when the bucket was
//! already at global depth, so growth never rehashes more than one bucket.
//!
//! Latching is two-level: a directory mutex guards the directory vector,
//! the global depth, and the bucket count; each bucket guards its own
//! entries and local depth. Lookups resolve the bucket under the directory
//! latch, drop it, and operate on the bucket alone; a miss re-checks that
//! the directory still binds the same bucket and restarts if a concurrent
//! split moved the slot. Hits need no re-check.

use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub struct ExtendibleHashTable<K, V> {
    bucket_size: usize,
    dir: Mutex<Directory<K, V>>,
}

struct Directory<K, V> {
    global_depth: usize,
    buckets: Vec<Arc<Bucket<K, V>>>,
    num_buckets: usize,
}

struct Bucket<K, V> {
    inner: Mutex<BucketInner<K, V>>,
}

struct BucketInner<K, V> {
    local_depth: usize,
    items: Vec<(K, V)>,
}

impl<K, V> Bucket<K, V> {
    fn new(local_depth: usize) -> Self {
        Self {
            inner: Mutex::new(BucketInner {
                local_depth,
                items: Vec::new(),
            }),
        }
    }
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0, "bucket size must be positive");
        Self {
            bucket_size,
            dir: Mutex::new(Directory {
                global_depth: 0,
                buckets: vec![Arc::new(Bucket::new(0))],
                num_buckets: 1,
            }),
        }
    }

    /// Look up `key`, returning a copy of its value.
    pub fn find(&self, key: &K) -> Option<V> {
        loop {
            let bucket = self.bucket_for(key);
            let found = {
                let inner = bucket.inner.lock();
                inner
                    .items
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, v)| v.clone())
            };
            // A hit is authoritative. A miss may have raced a split that
            // moved the entry to a sibling bucket.
            if found.is_some() || self.still_bound(key, &bucket) {
                return found;
            }
        }
    }

    /// Delete the entry for `key`. Returns whether an entry was removed.
    pub fn remove(&self, key: &K) -> bool {
        loop {
            let bucket = self.bucket_for(key);
            let removed = {
                let mut inner = bucket.inner.lock();
                let before = inner.items.len();
                inner.items.retain(|(k, _)| k != key);
                inner.items.len() < before
            };
            if removed || self.still_bound(key, &bucket) {
                return removed;
            }
        }
    }

    /// Insert `key → value`, overwriting any existing entry for `key`.
    /// Splits the target bucket (and doubles the directory when it is at
    /// global depth) until the entry fits.
    pub fn insert(&self, key: K, value: V) {
        loop {
            let mut dir = self.dir.lock();
            let index = Self::dir_index(&key, dir.global_depth);
            let bucket = Arc::clone(&dir.buckets[index]);
            let mut inner = bucket.inner.lock();

            if let Some(entry) = inner.items.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value;
                return;
            }
            if inner.items.len() < self.bucket_size {
                // The bucket latch was taken under the directory latch, so
                // no split can have rebound this slot in between.
                drop(dir);
                inner.items.push((key, value));
                return;
            }

            Self::split(&mut dir, index, &mut inner);
            // Latches drop here; retry against the regrown directory.
        }
    }

    pub fn global_depth(&self) -> usize {
        self.dir.lock().global_depth
    }

    pub fn local_depth(&self, dir_index: usize) -> usize {
        let bucket = {
            let dir = self.dir.lock();
            Arc::clone(&dir.buckets[dir_index])
        };
        let inner = bucket.inner.lock();
        inner.local_depth
    }

    pub fn num_buckets(&self) -> usize {
        self.dir.lock().num_buckets
    }

    /// Split the full bucket currently bound at `index`, rebinding every
    /// directory slot whose low `local_depth + 1` bits select the new
    /// sibling, then redistribute the entries between the pair.
    fn split(dir: &mut Directory<K, V>, index: usize, old_inner: &mut BucketInner<K, V>) {
        let local_depth = old_inner.local_depth;
        if local_depth == dir.global_depth {
            Self::grow_directory(dir);
        }

        let new_depth = local_depth + 1;
        let sibling = Arc::new(Bucket::new(new_depth));
        let sibling_bits = (index & low_bits_mask(local_depth)) | (1 << local_depth);

        for i in 0..dir.buckets.len() {
            if i & low_bits_mask(new_depth) == sibling_bits {
                dir.buckets[i] = Arc::clone(&sibling);
            }
        }
        old_inner.local_depth = new_depth;
        dir.num_buckets += 1;

        // The sibling is only reachable through the directory we hold, so
        // its latch is uncontended.
        let mut sibling_inner = sibling.inner.lock();
        let items = std::mem::take(&mut old_inner.items);
        for (k, v) in items {
            let target = Self::dir_index(&k, dir.global_depth);
            if target & low_bits_mask(new_depth) == sibling_bits {
                sibling_inner.items.push((k, v));
            } else {
                old_inner.items.push((k, v));
            }
        }
    }

    /// Double the directory, mirroring the low half into the new high half
    /// so every old slot and its partner refer to the same bucket.
    fn grow_directory(dir: &mut Directory<K, V>) {
        let old_len = dir.buckets.len();
        dir.buckets.extend_from_within(..old_len);
        dir.global_depth += 1;
    }

    fn bucket_for(&self, key: &K) -> Arc<Bucket<K, V>> {
        let dir = self.dir.lock();
        let index = Self::dir_index(key, dir.global_depth);
        Arc::clone(&dir.buckets[index])
    }

    fn still_bound(&self, key: &K, bucket: &Arc<Bucket<K, V>>) -> bool {
        let dir = self.dir.lock();
        let index = Self::dir_index(key, dir.global_depth);
        Arc::ptr_eq(&dir.buckets[index], bucket)
    }

    fn dir_index(key: &K, global_depth: usize) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) & low_bits_mask(global_depth)
    }
}

fn low_bits_mask(bits: usize) -> usize {
    (1usize << bits) - 1
}
