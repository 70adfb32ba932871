use std::{
	collections::BTreeMap,
	ops::Bound::{Excluded, Included, Unbounded},
	sync::{Arc, RwLock}
};
use serde::{Serialize, Deserialize};
use super::{
	ring::{Digest, KeySpace},
	error::KeyError
};

pub type Key = String;
pub type Value = Vec<u8>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
	pub key: Key,
	pub value: Value
}

pub trait KVStore {
	fn get(&self, key: &str) -> Result<Value, KeyError>;
	fn put(&self, key: Key, value: Value);
	/// All entries whose bucket lies in (start, end]
	fn get_range(&self, start: Digest, end: Digest) -> Vec<Entry>;
}

// Collision chain of one bucket
type Bucket = Vec<Entry>;

/// Thread-safe key-value data store
///
/// Buckets are addressed by the ring position of the key,
/// so a range of the ring maps to a range of buckets.
#[derive(Clone)]
pub struct DataStore {
	keyspace: KeySpace,
	buckets: Arc<RwLock<BTreeMap<Digest, Bucket>>>
}

impl DataStore {
	pub fn new(keyspace: KeySpace) -> Self {
		DataStore {
			keyspace,
			buckets: Arc::new(RwLock::new(BTreeMap::new()))
		}
	}

	pub fn bucket_of(&self, key: &str) -> Digest {
		self.keyspace.hash(key.as_bytes())
	}

	/// Insert a batch of entries under a single lock
	pub fn merge(&self, entries: Vec<Entry>) {
		let mut buckets = self.buckets.write().unwrap();
		for entry in entries {
			let position = self.bucket_of(&entry.key);
			insert(buckets.entry(position).or_default(), entry);
		}
	}

	pub fn len(&self) -> usize {
		let buckets = self.buckets.read().unwrap();
		buckets.values().map(|b| b.len()).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

// Replace in chain or append
fn insert(bucket: &mut Bucket, entry: Entry) {
	match bucket.iter_mut().find(|e| e.key == entry.key) {
		Some(e) => e.value = entry.value,
		None => bucket.push(entry)
	};
}

impl KVStore for DataStore {
	fn get(&self, key: &str) -> Result<Value, KeyError> {
		let buckets = self.buckets.read().unwrap();
		buckets.get(&self.bucket_of(key))
			.and_then(|bucket| bucket.iter().find(|e| e.key == key))
			.map(|e| e.value.clone())
			.ok_or_else(|| KeyError::NotFound(key.to_string()))
	}

	fn put(&self, key: Key, value: Value) {
		let position = self.bucket_of(&key);
		let mut buckets = self.buckets.write().unwrap();
		insert(buckets.entry(position).or_default(), Entry { key, value });
	}

	fn get_range(&self, start: Digest, end: Digest) -> Vec<Entry> {
		let buckets = self.buckets.read().unwrap();
		let chains: Vec<&Bucket> = if start < end {
			buckets.range((Excluded(start), Included(end))).map(|(_, b)| b).collect()
		}
		else {
			// wraps past zero (start == end is the whole ring)
			buckets.range((Excluded(start), Unbounded))
				.chain(buckets.range((Unbounded, Included(end))))
				.map(|(_, b)| b)
				.collect()
		};
		chains.into_iter().flatten().cloned().collect()
	}
}
