use std::{default::Default, time::Duration};
use super::{
	ring::KeySpace,
	error::DhtResult
};

#[derive(Clone, Debug)]
pub struct Config {
	// keyspace exponent m (ring size is 2^m)
	pub bits: u32,
	// port of the outbound caller (0 means ephemeral)
	pub caller_port: u16,
	// intervals in ms (0 means disabling it)
	pub stabilize_interval: u64,
	pub fix_finger_interval: u64,
	pub check_predecessor_interval: u64,
	// delay before the next stabilize after the successor was found dead
	pub stabilize_backoff: u64,
	// timeouts in ms
	pub topology_timeout: u64,
	pub data_timeout: u64,
	pub key_range_timeout: u64,
	/// max number of in-flight calls per caller
	pub max_pending_calls: u64,
	/// max number of times a call can be forwarded
	pub max_forward_hops: u32
}

impl Config {
	pub fn keyspace(&self) -> DhtResult<KeySpace> {
		KeySpace::new(self.bits)
	}

	pub fn topology_timeout(&self) -> Duration {
		Duration::from_millis(self.topology_timeout)
	}

	pub fn data_timeout(&self) -> Duration {
		Duration::from_millis(self.data_timeout)
	}

	pub fn key_range_timeout(&self) -> Duration {
		Duration::from_millis(self.key_range_timeout)
	}
}

impl Default for Config {
	fn default() -> Self {
		Self {
			bits: 32,
			caller_port: 0,
			stabilize_interval: 200,
			fix_finger_interval: 200,
			check_predecessor_interval: 500,
			stabilize_backoff: 2000,
			topology_timeout: 1000,
			data_timeout: 5000,
			key_range_timeout: 30000,
			max_pending_calls: 4096,
			max_forward_hops: 64
		}
	}
}
