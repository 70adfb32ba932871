pub mod node;
pub mod node_caller;
pub mod protocol;
pub mod ring;
pub mod config;
pub mod data_store;
pub mod error;

pub use node::*;
pub use node_caller::NodeCaller;
pub use config::*;
pub use error::*;

use std::{
	collections::hash_map::DefaultHasher,
	hash::{Hash, Hasher}
};
use ring::KeySpace;

pub fn calculate_hash(data: &[u8]) -> u64 {
	let mut hasher = DefaultHasher::new();
	data.hash(&mut hasher);
	hasher.finish()
}

/// Node whose position on the ring is derived from its address
pub fn construct_node(addr: &str, keyspace: &KeySpace) -> Node {
	Node {
		addr: addr.to_string(),
		id: keyspace.hash(addr.as_bytes())
	}
}
