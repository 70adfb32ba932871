use serde::{Serialize, Deserialize};
use super::error::{DhtError, DhtResult};

pub type Digest = u64;
// largest exponent whose key space still fits into a Digest
pub const MAX_BITS: u32 = 63;

// Strictly in range: id in (start, end)
// start == end covers the whole ring except start itself
pub fn in_range(id: Digest, start: Digest, end: Digest) -> bool {
	if end > start {
		// (start, id, end)
		id > start && id < end
	}
	else {
		// end <= start
		// case 1: (start, id, end + MAX_VAL)
		// case 2: (start, id + MAX_VAL, end + MAX_VAL)
		id > start || id < end
	}
}

// In range with end included: id in (start, end]
// start == end covers the whole ring
pub fn in_range_end_inclusive(id: Digest, start: Digest, end: Digest) -> bool {
	in_range(id, start, end) || id == end
}

/// Circular key space of size 2^bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpace {
	bits: u32
}

impl KeySpace {
	pub fn new(bits: u32) -> DhtResult<Self> {
		if bits == 0 || bits > MAX_BITS {
			return Err(DhtError::InvalidConfig(
				format!("keyspace exponent must be in [1, {}], got {}", MAX_BITS, bits)
			));
		}
		Ok(KeySpace { bits })
	}

	pub fn bits(&self) -> u32 {
		self.bits
	}

	/// Number of keys on the ring
	pub fn size(&self) -> u64 {
		1u64 << self.bits
	}

	/// Length of the finger table (never empty)
	pub fn num_fingers(&self) -> usize {
		(self.bits as usize - 1).max(1)
	}

	pub fn wrap(&self, id: u64) -> Digest {
		id & (self.size() - 1)
	}

	pub fn add(&self, id: Digest, offset: u64) -> Digest {
		self.wrap(id.wrapping_add(offset))
	}

	// Calculate start field of finger table (see Table 1)
	// k in [0, m)
	pub fn finger_start(&self, id: Digest, k: usize) -> Digest {
		self.add(id, 1u64 << k)
	}

	/// Position of arbitrary data on the ring
	pub fn hash(&self, data: &[u8]) -> Digest {
		self.wrap(super::calculate_hash(data))
	}
}
