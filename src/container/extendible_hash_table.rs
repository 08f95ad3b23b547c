use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};

use parking_lot::Mutex;

use crate::common::{Result, SiltError};

/// A bucket holding up to `bucket_size` key-value entries.
/// `local_depth` is the number of low hash bits all resident keys share.
struct Bucket<K, V> {
    local_depth: usize,
    items: Vec<(K, V)>,
}

impl<K, V> Bucket<K, V> {
    fn new(local_depth: usize) -> Self {
        Self {
            local_depth,
            items: Vec::new(),
        }
    }
}

/// Directory state guarded by the table mutex.
///
/// `slots[i]` is an index into the `buckets` arena; several slots may refer
/// to the same bucket. Two slots refer to the same bucket exactly when they
/// agree on that bucket's low `local_depth` bits.
struct Directory<K, V> {
    global_depth: usize,
    num_buckets: usize,
    slots: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
}

/// Extendible Hash Table
///
/// A dynamically growing hash table that maps keys to values through a
/// directory of bucket references. Lookups touch a single bucket; when an
/// insert overflows a bucket, only that bucket is split - at most doubling
/// the directory when the bucket's local depth has caught up with the
/// global depth. Untouched buckets are never rehashed.
///
/// The hasher is parameterized like `std::collections::HashMap` so callers
/// that need deterministic bucket placement can supply their own
/// `BuildHasher`.
pub struct ExtendibleHashTable<K, V, S = RandomState> {
    bucket_size: usize,
    hash_builder: S,
    inner: Mutex<Directory<K, V>>,
}

impl<K, V> ExtendibleHashTable<K, V, RandomState>
where
    K: Hash + Eq,
{
    /// Creates a table with the given bucket capacity and the default hasher.
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, RandomState::new())
    }
}

impl<K, V, S> ExtendibleHashTable<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Creates a table with the given bucket capacity and hasher.
    /// Starts with a global depth of 1 and two empty buckets of local depth 1.
    pub fn with_hasher(bucket_size: usize, hash_builder: S) -> Self {
        assert!(bucket_size > 0, "bucket_size must be positive");
        Self {
            bucket_size,
            hash_builder,
            inner: Mutex::new(Directory {
                global_depth: 1,
                num_buckets: 2,
                slots: vec![0, 1],
                buckets: vec![Bucket::new(1), Bucket::new(1)],
            }),
        }
    }

    fn hash_of(&self, key: &K) -> u64 {
        self.hash_builder.hash_one(key)
    }

    /// Mask selecting the low `bits` bits of a hash.
    fn low_mask(bits: usize) -> u64 {
        if bits >= u64::BITS as usize {
            u64::MAX
        } else {
            (1u64 << bits) - 1
        }
    }

    fn slot_of(hash: u64, global_depth: usize) -> usize {
        (hash & Self::low_mask(global_depth)) as usize
    }

    /// Returns the directory index the key currently maps to.
    pub fn index_of(&self, key: &K) -> usize {
        let dir = self.inner.lock();
        Self::slot_of(self.hash_of(key), dir.global_depth)
    }

    /// Returns the current global depth of the directory.
    pub fn global_depth(&self) -> usize {
        self.inner.lock().global_depth
    }

    /// Returns the local depth of the bucket at the given directory index.
    pub fn local_depth(&self, dir_index: usize) -> usize {
        let dir = self.inner.lock();
        dir.buckets[dir.slots[dir_index]].local_depth
    }

    /// Returns the number of buckets created so far.
    pub fn num_buckets(&self) -> usize {
        self.inner.lock().num_buckets
    }

    /// Looks up the value associated with the key.
    pub fn find(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let dir = self.inner.lock();
        let bucket = dir.slots[Self::slot_of(self.hash_of(key), dir.global_depth)];
        dir.buckets[bucket]
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Removes the entry for the key. Returns whether an entry was removed.
    /// The directory never shrinks.
    pub fn remove(&self, key: &K) -> bool {
        let mut dir = self.inner.lock();
        let bucket = dir.slots[Self::slot_of(self.hash_of(key), dir.global_depth)];
        let items = &mut dir.buckets[bucket].items;
        match items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                items.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Inserts a key-value pair, overwriting the value if the key exists.
    ///
    /// A full target bucket is split, growing the directory when the bucket
    /// already discriminates on every directory bit, and the split repeats
    /// while the key's bucket stays full. Fails with
    /// [`SiltError::BucketOverflow`] when the incoming key's hash collides
    /// with every resident key's, since no amount of splitting can then
    /// free up space in the target bucket.
    pub fn insert(&self, key: K, value: V) -> Result<()> {
        let mut dir = self.inner.lock();
        let hash = self.hash_of(&key);

        let bucket = dir.slots[Self::slot_of(hash, dir.global_depth)];
        if let Some(entry) = dir.buckets[bucket]
            .items
            .iter_mut()
            .find(|(k, _)| *k == key)
        {
            entry.1 = value;
            return Ok(());
        }

        while self.target_is_full(&dir, hash) {
            self.split(&mut dir, hash)?;
        }

        let bucket = dir.slots[Self::slot_of(hash, dir.global_depth)];
        dir.buckets[bucket].items.push((key, value));
        Ok(())
    }

    fn target_is_full(&self, dir: &Directory<K, V>, hash: u64) -> bool {
        let bucket = dir.slots[Self::slot_of(hash, dir.global_depth)];
        dir.buckets[bucket].items.len() >= self.bucket_size
    }

    /// Splits the bucket the hash maps to, redistributing its entries over
    /// the split bit and repointing every directory slot that referred to it.
    fn split(&self, dir: &mut Directory<K, V>, hash: u64) -> Result<()> {
        let target = dir.slots[Self::slot_of(hash, dir.global_depth)];
        let depth = dir.buckets[target].local_depth;

        // Splitting only ever makes progress if the incoming key parts ways
        // with at least one resident key on some not-yet-consumed hash bit.
        if dir.buckets[target]
            .items
            .iter()
            .all(|(k, _)| self.hash_of(k) == hash)
        {
            return Err(SiltError::BucketOverflow);
        }

        if depth == dir.global_depth {
            // Double the directory; every new slot adopts the bucket of the
            // slot it aliases at the old depth.
            let old_len = dir.slots.len();
            dir.slots.extend_from_within(0..old_len);
            dir.global_depth += 1;
        }

        let split_bit = 1u64 << depth;
        let items = std::mem::take(&mut dir.buckets[target].items);

        // The low half reuses the retired bucket's arena slot; the high half
        // is appended.
        dir.buckets[target].local_depth = depth + 1;
        let high = dir.buckets.len();
        dir.buckets.push(Bucket::new(depth + 1));

        for (k, v) in items {
            if self.hash_of(&k) & split_bit == 0 {
                dir.buckets[target].items.push((k, v));
            } else {
                dir.buckets[high].items.push((k, v));
            }
        }
        dir.num_buckets += 1;

        let dir_bit = 1usize << depth;
        for slot in 0..dir.slots.len() {
            if dir.slots[slot] == target && slot & dir_bit != 0 {
                dir.slots[slot] = high;
            }
        }

        tracing::trace!(
            depth = depth + 1,
            global_depth = dir.global_depth,
            num_buckets = dir.num_buckets,
            "split hash table bucket"
        );
        Ok(())
    }
}
